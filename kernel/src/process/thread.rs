//! Thread lifecycle
//!
//! Thread control blocks of every process live in one kernel-wide arena and
//! record the process that owns them. A thread identity ([`Tid`]) is the
//! packed arena handle, so a stale identity is detected instead of naming a
//! reused record, and an identity taken from another process never resolves
//! to a local thread.
//!
//! A record stays allocated while any interest in it remains:
//! - the *runner*, released when the thread exits
//! - *joinable*, released by the first successful join or by detach
//! - one *joiner* per context currently blocked in join

use std::sync::Arc;

use tinos_api::{KernelError, Result, Task, Tid};

use crate::arena::{Handle, Interest};
use crate::kernel::{Kernel, KernelGuard, KernelState};
use crate::sched::{Context, UnitBody, UnitKind, run_unit};
use crate::sync::CondVar;

use super::ProcHandle;

pub type ThreadId = Handle<Ptcb>;

/// Thread control block
pub struct Ptcb {
    /// Process the thread belongs to
    pub owner: ProcHandle,
    pub exitval: i32,
    pub exited: bool,
    pub detached: bool,
    runner: bool,
    joinable: bool,
    joiners: usize,
    /// Broadcast when the thread exits or is detached
    exit_cv: CondVar,
}

impl Ptcb {
    pub(crate) fn new(owner: ProcHandle) -> Self {
        Self {
            owner,
            exitval: 0,
            exited: false,
            detached: false,
            runner: true,
            joinable: true,
            joiners: 0,
            exit_cv: CondVar::new(),
        }
    }

    fn is_unreferenced(&self) -> bool {
        !self.runner && !self.joinable && self.joiners == 0
    }

    /// Wake everyone blocked on this thread
    pub(crate) fn wake_all(&self) {
        self.exit_cv.broadcast();
    }
}

fn parse_tid(tid: Tid) -> Result<ThreadId> {
    ThreadId::from_raw(tid).ok_or(KernelError::NoThread)
}

impl KernelState {
    /// Allocate a thread record for `owner` and count it against the process
    pub(crate) fn attach_thread(&mut self, owner: ProcHandle) -> Result<ThreadId> {
        let pcb = self.procs.resolve_mut(owner).ok_or(KernelError::NoProcess)?;
        let id = self.threads.insert(Ptcb::new(owner));
        pcb.threads.insert(id);
        pcb.thread_count += 1;
        Ok(id)
    }

    /// Thread `id` if it belongs to `proc`
    pub(crate) fn own_thread_mut(&mut self, proc: ProcHandle, id: ThreadId) -> Option<&mut Ptcb> {
        self.threads.get_mut(id).filter(|ptcb| ptcb.owner == proc)
    }

    /// Free a record and unlink it from its process
    fn free_thread(&mut self, id: ThreadId) {
        if let Some(ptcb) = self.threads.remove(id) {
            if let Some(pcb) = self.procs.resolve_mut(ptcb.owner) {
                pcb.threads.remove(&id);
            }
            log::debug!("thread {:?} released", id);
        }
    }

    /// Drop the record once no interest is left
    fn release_if_unreferenced(&mut self, id: ThreadId) {
        if self.threads.get(id).is_some_and(Ptcb::is_unreferenced) {
            self.free_thread(id);
        }
    }

    /// Free every thread record of `proc`, waking whoever waits on them.
    ///
    /// All of the process's thread identities become invalid.
    pub(crate) fn discard_threads(&mut self, proc: ProcHandle) {
        let Some(pcb) = self.procs.resolve_mut(proc) else {
            return;
        };
        pcb.thread_count = 0;
        let ids: Vec<ThreadId> = pcb.threads.drain().collect();
        for id in ids {
            if let Some(ptcb) = self.threads.remove(id) {
                ptcb.wake_all();
            }
        }
    }
}

impl Kernel {
    /// Start a new thread in the caller's process
    pub(crate) fn create_thread(
        self: &Arc<Self>,
        state: &mut KernelState,
        ctx: &Context,
        task: Task,
        args: &[u8],
    ) -> Result<Tid> {
        let id = state.attach_thread(ctx.proc)?;

        let unit = Context {
            kernel: self.clone(),
            proc: ctx.proc,
            thread: id,
        };
        let args = args.to_vec();
        let body: UnitBody = Box::new(move || run_unit(unit, UnitKind::Spawned, move || task(args.as_slice())));

        // Last step: once spawned, the unit may run as soon as the lock is free.
        let name = format!("proc-{}-thread-{}", ctx.proc.pid, id.index());
        if let Err(err) = self.scheduler.spawn(name, body) {
            log::warn!("thread creation in process {} failed: {}", ctx.proc.pid, err);
            state.free_thread(id);
            if let Some(pcb) = state.procs.resolve_mut(ctx.proc) {
                pcb.thread_count -= 1;
            }
            return Err(err);
        }

        log::debug!("thread {:?} created in process {}", id, ctx.proc.pid);
        Ok(id.to_raw())
    }

    /// Wait for a thread of the caller's process to exit and return its exit value
    pub(crate) fn join_thread(&self, guard: &mut KernelGuard<'_>, ctx: &Context, tid: Tid) -> Result<i32> {
        let id = parse_tid(tid)?;
        if id == ctx.thread {
            return Err(KernelError::SelfReference);
        }
        let ptcb = guard.own_thread_mut(ctx.proc, id).ok_or(KernelError::NoThread)?;
        if ptcb.detached || !ptcb.joinable {
            return Err(KernelError::Detached);
        }
        ptcb.joiners += 1;
        let interest = Interest::new(id);

        let outcome = loop {
            // Process exit discards every record of the process.
            let Some(ptcb) = guard.own_thread_mut(ctx.proc, id) else {
                break Err(KernelError::NoThread);
            };
            if ptcb.exited {
                ptcb.joinable = false;
                break Ok(ptcb.exitval);
            }
            if ptcb.detached {
                break Err(KernelError::Detached);
            }
            let cv = ptcb.exit_cv.clone();
            cv.wait(guard);
        };

        release_joiner(guard, interest);
        outcome
    }

    /// Give up the right to join a thread of the caller's process
    pub(crate) fn detach_thread(&self, state: &mut KernelState, ctx: &Context, tid: Tid) -> Result<()> {
        let id = parse_tid(tid)?;
        if id == ctx.thread {
            return Err(KernelError::SelfReference);
        }
        let ptcb = state.own_thread_mut(ctx.proc, id).ok_or(KernelError::NoThread)?;
        if ptcb.detached || !ptcb.joinable {
            return Err(KernelError::Detached);
        }
        ptcb.detached = true;
        ptcb.joinable = false;
        // Blocked joiners must observe the detach and fail
        ptcb.exit_cv.broadcast();
        state.release_if_unreferenced(id);
        Ok(())
    }

    /// Exit the calling thread; the last thread out takes the process with it
    pub(crate) fn exit_thread(&self, guard: &mut KernelGuard<'_>, ctx: &Context, exitval: i32) {
        let Some(ptcb) = guard.own_thread_mut(ctx.proc, ctx.thread) else {
            return;
        };
        if ptcb.exited {
            return;
        }
        ptcb.exitval = exitval;
        ptcb.exited = true;
        ptcb.runner = false;
        if !ptcb.detached {
            ptcb.exit_cv.broadcast();
        }
        guard.release_if_unreferenced(ctx.thread);

        let Some(pcb) = guard.procs.resolve_mut(ctx.proc) else {
            return;
        };
        pcb.thread_count -= 1;
        log::debug!(
            "thread {:?} of process {} exited with {}",
            ctx.thread,
            ctx.proc.pid,
            exitval
        );
        if pcb.thread_count == 0 {
            self.exit_process(guard, ctx.proc, exitval);
        }
    }
}

/// Hand back a joiner interest taken in [`Kernel::join_thread`]
fn release_joiner(state: &mut KernelState, interest: Interest<Ptcb>) {
    let id = interest.into_handle();
    if let Some(ptcb) = state.threads.get_mut(id) {
        ptcb.joiners -= 1;
    }
    state.release_if_unreferenced(id);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_process() -> (KernelState, ProcHandle) {
        let mut state = KernelState::new();
        let proc = state.procs.acquire().expect("pid");
        (state, proc)
    }

    #[test]
    fn test_record_lives_until_every_interest_is_gone() {
        let (mut state, proc) = state_with_process();
        let id = state.attach_thread(proc).expect("thread");

        // Exited but still joinable
        state.threads.get_mut(id).expect("ptcb").runner = false;
        state.release_if_unreferenced(id);
        assert!(state.threads.contains(id));

        // Joined while a second joiner is still reading the exit value
        let ptcb = state.threads.get_mut(id).expect("ptcb");
        ptcb.joinable = false;
        ptcb.joiners = 1;
        state.release_if_unreferenced(id);
        assert!(state.threads.contains(id));

        state.threads.get_mut(id).expect("ptcb").joiners = 0;
        state.release_if_unreferenced(id);
        assert!(!state.threads.contains(id));
        assert!(state.procs.resolve(proc).expect("pcb").threads.is_empty());
    }

    #[test]
    fn test_detached_runner_keeps_record() {
        let (mut state, proc) = state_with_process();
        let id = state.attach_thread(proc).expect("thread");
        let ptcb = state.threads.get_mut(id).expect("ptcb");
        ptcb.detached = true;
        ptcb.joinable = false;
        state.release_if_unreferenced(id);
        assert!(state.threads.contains(id));
    }

    #[test]
    fn test_foreign_thread_does_not_resolve() {
        let (mut state, first) = state_with_process();
        let second = state.procs.acquire().expect("pid");
        let mine = state.attach_thread(first).expect("thread");
        let theirs = state.attach_thread(second).expect("thread");

        assert_ne!(mine.to_raw(), theirs.to_raw());
        assert!(state.own_thread_mut(first, mine).is_some());
        assert!(state.own_thread_mut(first, theirs).is_none());
    }

    #[test]
    fn test_discard_threads_invalidates_identities() {
        let (mut state, proc) = state_with_process();
        let a = state.attach_thread(proc).expect("thread");
        let b = state.attach_thread(proc).expect("thread");
        assert_eq!(state.procs.resolve(proc).expect("pcb").thread_count, 2);

        state.discard_threads(proc);
        assert!(!state.threads.contains(a));
        assert!(!state.threads.contains(b));
        assert!(state.threads.is_empty());
        let pcb = state.procs.resolve(proc).expect("pcb");
        assert!(pcb.threads.is_empty());
        assert_eq!(pcb.thread_count, 0);
    }

    #[test]
    fn test_parse_tid_rejects_zero() {
        assert_eq!(parse_tid(0), Err(KernelError::NoThread));
    }
}
