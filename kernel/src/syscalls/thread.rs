//! Thread system calls

use tinos_api::{NOTHREAD, Task, Tid};

use super::{E_FAIL, E_OK, enter_for_exit, status, syscall};
use crate::sched::retire;

/// Start a thread in the calling process. Returns `NOTHREAD` on failure.
pub fn sys_create_thread(task: Task, args: &[u8]) -> Tid {
    syscall(|ctx, guard| ctx.kernel.create_thread(guard, ctx, task, args)).unwrap_or(NOTHREAD)
}

pub fn sys_thread_self() -> Tid {
    syscall(|ctx, _| Ok(ctx.thread.to_raw())).unwrap_or(NOTHREAD)
}

/// Wait for thread `tid` to exit and store its exit value in `exitval`.
///
/// Fails for the caller itself, for detached or already joined threads and
/// for identities that are not threads of the calling process.
pub fn sys_thread_join(tid: Tid, exitval: Option<&mut i32>) -> i32 {
    match syscall(|ctx, guard| ctx.kernel.join_thread(guard, ctx, tid)) {
        Ok(value) => {
            if let Some(exitval) = exitval {
                *exitval = value;
            }
            E_OK
        }
        Err(_) => E_FAIL,
    }
}

pub fn sys_thread_detach(tid: Tid) -> i32 {
    status(syscall(|ctx, guard| ctx.kernel.detach_thread(guard, ctx, tid)))
}

/// Terminate the calling thread; the process ends with the last thread
pub fn sys_thread_exit(exitval: i32) -> ! {
    let ctx = enter_for_exit("ThreadExit");
    let mut guard = ctx.enter();
    ctx.kernel.exit_thread(&mut guard, &ctx, exitval);
    drop(guard);
    retire()
}
