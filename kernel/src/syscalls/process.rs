//! Process system calls

use tinos_api::{NOPROC, Pid, Task};

use super::{enter_for_exit, syscall};
use crate::process::lifecycle::parent_of;
use crate::sched::retire;

/// Start a new child process running `task` with a copy of `args`.
///
/// Returns the child's pid, or `NOPROC` when no identity is free.
pub fn sys_exec(task: Task, args: &[u8]) -> Pid {
    syscall(|ctx, guard| ctx.kernel.exec(guard, Some(ctx.proc), Some(task), args)).unwrap_or(NOPROC)
}

/// Terminate the calling process
pub fn sys_exit(exitval: i32) -> ! {
    let ctx = enter_for_exit("Exit");
    let mut guard = ctx.enter();
    ctx.kernel.exit_process(&mut guard, ctx.proc, exitval);
    drop(guard);
    retire()
}

/// Reap child `pid`, or any child for `NOPROC`, storing its exit value in `status`.
///
/// Returns the reaped pid, or `NOPROC` for a pid that is not a child of the
/// caller and for "any child" when the caller has none.
pub fn sys_wait_child(pid: Pid, status: Option<&mut i32>) -> Pid {
    match syscall(|ctx, guard| ctx.kernel.wait_child(guard, ctx.proc, pid)) {
        Ok((child, exitval)) => {
            if let Some(status) = status {
                *status = exitval;
            }
            child
        }
        Err(_) => NOPROC,
    }
}

pub fn sys_get_pid() -> Pid {
    syscall(|ctx, _| Ok(ctx.proc.pid)).unwrap_or(NOPROC)
}

/// Parent pid, or `NOPROC` for init
pub fn sys_get_ppid() -> Pid {
    syscall(|ctx, guard| Ok(parent_of(guard, ctx.proc))).unwrap_or(NOPROC)
}
