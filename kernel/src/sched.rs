//! Execution units
//!
//! The kernel core never switches contexts itself. It asks a [`Scheduler`]
//! to create and enqueue a unit, and every unit runs a trampoline that binds
//! the unit to its process and thread record (the current context), runs the
//! task, and performs the exit that the task's return value calls for.
//!
//! `Exit` and `ThreadExit` never return. The calling unit is retired by
//! unwinding back to its trampoline with a private marker payload.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tinos_api::{KernelError, Result};

use crate::kernel::{Kernel, KernelGuard, KernelState};
use crate::process::{ProcHandle, ThreadId};

/// A schedulable unit body
pub type UnitBody = Box<dyn FnOnce() + Send + 'static>;

/// Creates and enqueues execution units.
///
/// The kernel calls `spawn` while holding the kernel lock, so the new unit
/// cannot enter the kernel before the creating operation has finished.
#[cfg_attr(test, mockall::automock)]
pub trait Scheduler: Send + Sync {
    /// Make `body` runnable as a new unit called `name`
    fn spawn(&self, name: String, body: UnitBody) -> Result<()>;
}

/// Runs every unit on its own host thread
#[derive(Debug, Default)]
pub struct HostScheduler;

impl HostScheduler {
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for HostScheduler {
    fn spawn(&self, name: String, body: UnitBody) -> Result<()> {
        std::thread::Builder::new()
            .name(name)
            .spawn(body)
            .map(|_| ())
            .map_err(|err| {
                log::warn!("host thread creation failed: {err}");
                KernelError::SpawnFailed
            })
    }
}

// ============================================================================
// Current context
// ============================================================================

/// Binding of the running unit to its kernel, process and thread record
#[derive(Clone)]
pub(crate) struct Context {
    pub(crate) kernel: Arc<Kernel>,
    pub(crate) proc: ProcHandle,
    pub(crate) thread: ThreadId,
}

thread_local! {
    static CURRENT: RefCell<Option<Context>> = const { RefCell::new(None) };
}

/// The calling unit's context
pub(crate) fn current() -> Result<Context> {
    CURRENT.with(|c| c.borrow().clone()).ok_or(KernelError::NotInKernel)
}

/// False once the calling unit's process or thread has exited.
///
/// Blocking operations re-check this after every wait, since the caller may
/// have been killed while asleep. Outside any unit the caller counts as running.
pub(crate) fn caller_running(state: &KernelState) -> bool {
    CURRENT.with(|c| {
        c.borrow()
            .as_ref()
            .is_none_or(|ctx| state.is_running(ctx.proc, ctx.thread))
    })
}

impl Context {
    /// Take the kernel lock on behalf of this unit.
    ///
    /// A unit whose process has exited, or whose thread record is gone, is
    /// retired here instead of being let back into the kernel.
    pub(crate) fn enter(&self) -> KernelGuard<'_> {
        let guard = self.kernel.lock();
        if !guard.is_running(self.proc, self.thread) {
            drop(guard);
            retire();
        }
        guard
    }
}

/// Unwind payload used to retire a unit
pub(crate) struct Retired;

/// Permanently stop the calling unit
pub(crate) fn retire() -> ! {
    panic::resume_unwind(Box::new(Retired))
}

/// Which exit a returning task performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnitKind {
    /// Process main thread: returning exits the process
    Main,
    /// Thread created with `CreateThread`: returning exits the thread
    Spawned,
}

/// Trampoline run by every unit
pub(crate) fn run_unit(ctx: Context, kind: UnitKind, task: impl FnOnce() -> i32) {
    CURRENT.with(|c| *c.borrow_mut() = Some(ctx.clone()));

    // The process may have exited before this unit first ran.
    let runnable = ctx.kernel.lock().is_running(ctx.proc, ctx.thread);
    if runnable {
        let exitval = match panic::catch_unwind(AssertUnwindSafe(task)) {
            Ok(value) => Some(value),
            Err(payload) if payload.is::<Retired>() => None,
            Err(payload) => {
                log::warn!(
                    "task in process {} crashed: {}",
                    ctx.proc.pid,
                    panic_message(payload.as_ref())
                );
                ctx.kernel.record_crash(payload);
                Some(-1)
            }
        };

        if let Some(value) = exitval {
            let mut guard = ctx.kernel.lock();
            if guard.is_running(ctx.proc, ctx.thread) {
                match kind {
                    UnitKind::Main => ctx.kernel.exit_process(&mut guard, ctx.proc, value),
                    UnitKind::Spawned => ctx.kernel.exit_thread(&mut guard, &ctx, value),
                }
            }
        }
    }

    CURRENT.with(|c| *c.borrow_mut() = None);
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
