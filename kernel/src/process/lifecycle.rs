//! Process lifecycle: creation, termination and reaping
//!
//! State machine per process: FREE -> ALIVE -> ZOMBIE -> FREE.

use std::sync::Arc;

use tinos_api::config::{INIT_PID, MAX_FILEID};
use tinos_api::{KernelError, NOPROC, Pid, ProcState, Result, Task};

use crate::kernel::{Kernel, KernelGuard, KernelState};
use crate::sched::{Context, UnitBody, UnitKind, run_unit};

use super::ProcHandle;

impl Kernel {
    /// Create a process running `task` with a private copy of `args`.
    ///
    /// `caller` is `None` only while booting. Processes other than the
    /// scheduler and init become children of the caller and inherit its file
    /// table. Without a task the process gets no thread (the scheduler
    /// process).
    pub(crate) fn exec(
        self: &Arc<Self>,
        state: &mut KernelState,
        caller: Option<ProcHandle>,
        task: Option<Task>,
        args: &[u8],
    ) -> Result<Pid> {
        let handle = state.procs.acquire().ok_or(KernelError::ProcessTableFull)?;
        let pid = handle.pid;

        if pid > INIT_PID {
            if let Some(parent) = caller {
                let Some(ppcb) = state.procs.resolve_mut(parent) else {
                    state.procs.release(pid);
                    return Err(KernelError::NoProcess);
                };
                ppcb.children.insert(pid);
                let inherited = ppcb.fidt;
                for fcb in inherited.iter().flatten() {
                    state.incref_file(*fcb);
                }
                let pcb = state
                    .procs
                    .resolve_mut(handle)
                    .ok_or(KernelError::NoProcess)?;
                pcb.parent = Some(parent.pid);
                pcb.fidt = inherited;
            }
        }

        let pcb = state
            .procs
            .resolve_mut(handle)
            .ok_or(KernelError::NoProcess)?;
        pcb.args = args.to_vec();

        if let Some(task) = task {
            let thread = state.attach_thread(handle)?;

            let unit = Context {
                kernel: self.clone(),
                proc: handle,
                thread,
            };
            let args = args.to_vec();
            let body: UnitBody = Box::new(move || run_unit(unit, UnitKind::Main, move || task(args.as_slice())));

            // Last step: once spawned, the unit may run as soon as the lock is free.
            if let Err(err) = self.scheduler.spawn(format!("proc-{pid}"), body) {
                log::warn!("process {pid}: main thread creation failed: {err}");
                discard_unborn(state, handle);
                return Err(err);
            }
        }

        log::debug!("process {} created, parent {:?}", pid, caller.map(|c| c.pid));
        Ok(pid)
    }

    /// Terminate process `proc` with `exitval`.
    ///
    /// Live children move to init, zombie children move to init's exited
    /// queue, the process joins its parent's exited queue, its files are
    /// closed and every one of its thread records is discarded.
    pub(crate) fn exit_process(&self, guard: &mut KernelGuard<'_>, proc: ProcHandle, exitval: i32) {
        let pid = proc.pid;

        // Init never becomes a zombie while it still has descendants.
        if pid == INIT_PID {
            while self.wait_any_child(guard, proc).is_ok() {}
        }

        let state: &mut KernelState = &mut **guard;
        let Some(pcb) = state.procs.resolve_mut(proc) else {
            return;
        };
        if pcb.state != ProcState::Alive {
            return;
        }

        pcb.exitval = exitval;
        pcb.state = ProcState::Zombie;
        let parent = pcb.parent;
        let children: Vec<Pid> = pcb.children.drain().collect();
        let zombies: Vec<Pid> = pcb.exited.drain(..).collect();
        let fids = std::mem::replace(&mut pcb.fidt, [None; MAX_FILEID]);
        pcb.args = Vec::new();
        // Sibling threads blocked in WaitChild re-check and fail.
        pcb.child_exit.broadcast();
        // Every thread identity of the process becomes invalid; blocked joiners fail.
        state.discard_threads(proc);

        if pid != INIT_PID {
            reparent_to_init(state, children, zombies);
        } else {
            debug_assert!(children.is_empty() && zombies.is_empty());
        }

        if let Some(ppid) = parent {
            if let Some(ppcb) = state.procs.get_mut(ppid) {
                ppcb.children.remove(&pid);
                ppcb.exited.push_back(pid);
                ppcb.child_exit.broadcast();
            }
        }

        for fcb in fids.into_iter().flatten() {
            state.decref_file(fcb);
        }

        log::debug!("process {pid} exited with {exitval}");
        if pid == INIT_PID {
            self.halted.broadcast();
        }
    }

    /// Reap a child of `proc`: a specific pid, or any child for `NOPROC`
    pub(crate) fn wait_child(&self, guard: &mut KernelGuard<'_>, proc: ProcHandle, target: Pid) -> Result<(Pid, i32)> {
        if target == NOPROC {
            self.wait_any_child(guard, proc)
        } else {
            self.wait_specific_child(guard, proc, target)
        }
    }

    fn wait_specific_child(&self, guard: &mut KernelGuard<'_>, proc: ProcHandle, cpid: Pid) -> Result<(Pid, i32)> {
        let is_child = guard
            .procs
            .get(cpid)
            .is_some_and(|child| child.parent == Some(proc.pid));
        if !is_child {
            return Err(KernelError::NoProcess);
        }
        let child = guard.procs.handle(cpid).ok_or(KernelError::NoProcess)?;

        loop {
            let me = guard
                .procs
                .resolve(proc)
                .filter(|me| me.state == ProcState::Alive)
                .ok_or(KernelError::NoProcess)?;
            // Another thread may reap the child, or our own exit may hand it to init.
            let state = guard
                .procs
                .resolve(child)
                .filter(|c| c.parent == Some(proc.pid))
                .map(|c| c.state)
                .ok_or(KernelError::NoProcess)?;
            if state == ProcState::Zombie {
                break;
            }
            let cv = me.child_exit.clone();
            cv.wait(guard);
        }

        Ok(reap(guard, proc, cpid))
    }

    pub(crate) fn wait_any_child(&self, guard: &mut KernelGuard<'_>, proc: ProcHandle) -> Result<(Pid, i32)> {
        loop {
            // Init drains its children before it turns into a zombie.
            let me = guard
                .procs
                .resolve(proc)
                .filter(|me| me.state == ProcState::Alive)
                .ok_or(KernelError::NoProcess)?;
            if let Some(&zombie) = me.exited.front() {
                return Ok(reap(guard, proc, zombie));
            }
            if me.children.is_empty() {
                return Err(KernelError::NoProcess);
            }
            let cv = me.child_exit.clone();
            cv.wait(guard);
        }
    }
}

/// Parent of the process, or `NOPROC` for the scheduler and init
pub(crate) fn parent_of(state: &KernelState, proc: ProcHandle) -> Pid {
    state
        .procs
        .resolve(proc)
        .and_then(|pcb| pcb.parent)
        .unwrap_or(NOPROC)
}

fn reparent_to_init(state: &mut KernelState, children: Vec<Pid>, zombies: Vec<Pid>) {
    for &pid in children.iter().chain(zombies.iter()) {
        if let Some(pcb) = state.procs.get_mut(pid) {
            pcb.parent = Some(INIT_PID);
        }
    }
    if let Some(init) = state.procs.get_mut(INIT_PID) {
        init.children.extend(children);
        if !zombies.is_empty() {
            init.exited.extend(zombies);
            init.child_exit.broadcast();
        }
    }
}

/// Unlink a zombie from its parent, collect its exit value, free its identity
fn reap(state: &mut KernelState, parent: ProcHandle, zombie: Pid) -> (Pid, i32) {
    if let Some(pcb) = state.procs.resolve_mut(parent) {
        pcb.exited.retain(|&pid| pid != zombie);
        pcb.children.remove(&zombie);
    }
    let exitval = state.procs.get(zombie).map_or(0, |pcb| pcb.exitval);
    state.procs.release(zombie);
    log::debug!("process {} reaped by {}, status {}", zombie, parent.pid, exitval);
    (zombie, exitval)
}

/// Undo an `exec` whose main thread could not be started
fn discard_unborn(state: &mut KernelState, handle: ProcHandle) {
    let Some(pcb) = state.procs.resolve_mut(handle) else {
        return;
    };
    let parent = pcb.parent.take();
    let fids = std::mem::replace(&mut pcb.fidt, [None; MAX_FILEID]);
    state.discard_threads(handle);

    if let Some(ppid) = parent {
        if let Some(ppcb) = state.procs.get_mut(ppid) {
            ppcb.children.remove(&handle.pid);
        }
    }
    for fcb in fids.into_iter().flatten() {
        state.decref_file(fcb);
    }
    state.procs.release(handle.pid);
}
