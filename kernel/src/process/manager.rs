//! Process table
//!
//! Fixed pool of `MAX_PROC` process control blocks. A PID is the index of
//! its record, so lookup by PID is direct indexing. Free records sit on a
//! free list that hands out low PIDs first (the scheduler process gets pid 0,
//! init gets pid 1) and reuses released PIDs LIFO.

use std::collections::VecDeque;

use hashbrown::HashSet;
use tinos_api::config::{MAX_FILEID, MAX_PROC};
use tinos_api::{Pid, ProcState};

use crate::stream::FcbId;
use crate::sync::CondVar;

use super::thread::ThreadId;

/// Process control block
pub struct Pcb {
    pub state: ProcState,
    /// Bumped on every release, so a [`ProcHandle`] never outlives its process
    generation: u32,
    /// Weak back-reference; `None` for the scheduler and init processes
    pub parent: Option<Pid>,
    pub exitval: i32,

    /// Owned copy of the argument buffer given to `Exec`
    pub args: Vec<u8>,

    /// Children that are still alive
    pub children: HashSet<Pid>,
    /// Zombie children in exit order
    pub exited: VecDeque<Pid>,
    pub child_exit: CondVar,

    pub fidt: [Option<FcbId>; MAX_FILEID],

    /// Thread records owned by the process, in the kernel-wide thread arena
    pub threads: HashSet<ThreadId>,
    /// Threads that have not exited yet
    pub thread_count: usize,
}

impl Pcb {
    fn new() -> Self {
        Self {
            state: ProcState::Free,
            generation: 0,
            parent: None,
            exitval: 0,
            args: Vec::new(),
            children: HashSet::new(),
            exited: VecDeque::new(),
            child_exit: CondVar::new(),
            fidt: [None; MAX_FILEID],
            threads: HashSet::new(),
            thread_count: 0,
        }
    }

    /// Reset to a pristine free record, invalidating old handles
    fn reset(&mut self) {
        debug_assert!(self.children.is_empty() && self.exited.is_empty());
        debug_assert!(self.fidt.iter().all(Option::is_none), "released process still holds files");
        debug_assert!(self.threads.is_empty(), "released process still owns threads");
        let generation = self.generation.wrapping_add(1);
        *self = Pcb::new();
        self.generation = generation;
    }
}

/// PID plus generation; resolves only to the process it was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcHandle {
    pub pid: Pid,
    generation: u32,
}

/// Process table with O(1) allocation and lookup
pub struct ProcTable {
    procs: Vec<Pcb>,
    free_list: Vec<usize>,
    live: usize,
}

fn slot(pid: Pid) -> Option<usize> {
    usize::try_from(pid).ok().filter(|&idx| idx < MAX_PROC)
}

impl ProcTable {
    pub fn new() -> Self {
        Self {
            procs: (0..MAX_PROC).map(|_| Pcb::new()).collect(),
            // Popped from the back: pid 0 comes out first
            free_list: (0..MAX_PROC).rev().collect(),
            live: 0,
        }
    }

    /// Number of live (non-free) identities
    pub fn live(&self) -> usize {
        self.live
    }

    /// Take a free identity and mark it alive; `None` when the table is full
    pub fn acquire(&mut self) -> Option<ProcHandle> {
        let idx = self.free_list.pop()?;
        let pcb = &mut self.procs[idx];
        debug_assert_eq!(pcb.state, ProcState::Free);
        pcb.state = ProcState::Alive;
        self.live += 1;
        Some(ProcHandle {
            pid: idx as Pid,
            generation: pcb.generation,
        })
    }

    /// Give an identity back to the free list.
    ///
    /// The record must no longer be linked from any children or exited queue.
    pub fn release(&mut self, pid: Pid) {
        let Some(idx) = slot(pid) else {
            return;
        };
        let pcb = &mut self.procs[idx];
        if pcb.state == ProcState::Free {
            return;
        }
        pcb.reset();
        self.free_list.push(idx);
        self.live -= 1;
    }

    /// Live record at `pid`
    pub fn get(&self, pid: Pid) -> Option<&Pcb> {
        slot(pid)
            .map(|idx| &self.procs[idx])
            .filter(|pcb| pcb.state != ProcState::Free)
    }

    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Pcb> {
        slot(pid)
            .map(|idx| &mut self.procs[idx])
            .filter(|pcb| pcb.state != ProcState::Free)
    }

    pub fn state_of(&self, pid: Pid) -> ProcState {
        self.get(pid).map_or(ProcState::Free, |pcb| pcb.state)
    }

    /// Handle to the live process at `pid`
    pub fn handle(&self, pid: Pid) -> Option<ProcHandle> {
        self.get(pid).map(|pcb| ProcHandle {
            pid,
            generation: pcb.generation,
        })
    }

    /// The process `handle` was taken from, if its identity has not been released
    pub fn resolve(&self, handle: ProcHandle) -> Option<&Pcb> {
        self.get(handle.pid)
            .filter(|pcb| pcb.generation == handle.generation)
    }

    pub fn resolve_mut(&mut self, handle: ProcHandle) -> Option<&mut Pcb> {
        self.get_mut(handle.pid)
            .filter(|pcb| pcb.generation == handle.generation)
    }

    /// Live records in ascending pid order, starting at `from`
    pub fn iter_from(&self, from: usize) -> impl Iterator<Item = (Pid, &Pcb)> {
        self.procs
            .iter()
            .enumerate()
            .skip(from)
            .filter(|(_, pcb)| pcb.state != ProcState::Free)
            .map(|(idx, pcb)| (idx as Pid, pcb))
    }
}

impl Default for ProcTable {
    fn default() -> Self {
        Self::new()
    }
}
