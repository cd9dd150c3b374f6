//! System call surface
//!
//! Tasks reach the kernel only through these functions. Every call runs on
//! behalf of the calling execution unit and reports failure through a
//! sentinel return value (`NOPROC`, `NOFILE`, `NOTHREAD` or `-1`); no kernel
//! error crosses this boundary as a panic.
//!
//! Called from a host thread that is not a kernel execution unit, every
//! call fails with its sentinel, except `sys_exit` and `sys_thread_exit`,
//! which cannot return and panic instead.

use tinos_api::Result;

use crate::kernel::KernelGuard;
use crate::sched::{Context, current, retire};

mod process;
mod socket;
mod stream;
mod thread;

pub use process::*;
pub use socket::*;
pub use stream::*;
pub use thread::*;

// ============================================================================
// Status codes
// ============================================================================

pub const E_OK: i32 = 0;
pub const E_FAIL: i32 = -1;

// ============================================================================
// Kernel entry
// ============================================================================

/// Run `op` in the kernel on behalf of the calling unit.
///
/// A unit whose process exited while it was inside the kernel is retired
/// instead of returning to its task.
fn syscall<T>(op: impl FnOnce(&Context, &mut KernelGuard<'_>) -> Result<T>) -> Result<T> {
    let ctx = current()?;
    let mut guard = ctx.enter();
    let result = op(&ctx, &mut guard);
    if !guard.is_running(ctx.proc, ctx.thread) {
        drop(guard);
        retire();
    }
    if let Err(err) = &result {
        log::trace!("process {}: call failed: {}", ctx.proc.pid, err);
    }
    result
}

/// Entry for calls that never return
fn enter_for_exit(call: &str) -> Context {
    match current() {
        Ok(ctx) => ctx,
        Err(_) => panic!("{call} called outside a kernel execution unit"),
    }
}

fn status(result: Result<()>) -> i32 {
    match result {
        Ok(()) => E_OK,
        Err(_) => E_FAIL,
    }
}
