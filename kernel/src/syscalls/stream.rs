//! File handle system calls

use tinos_api::{Fid, NOFILE, PipePair};

use super::{E_FAIL, E_OK, status, syscall};
use crate::procinfo::InfoCursor;
use crate::stream::{self, StreamObj};

/// Read up to `buf.len()` bytes. Returns the count, 0 at end of stream, or -1.
pub fn sys_read(fid: Fid, buf: &mut [u8]) -> isize {
    match syscall(|ctx, guard| stream::read(guard, ctx.proc, fid, buf)) {
        Ok(n) => n as isize,
        Err(_) => E_FAIL as isize,
    }
}

/// Write `data`. Returns the count written or -1.
pub fn sys_write(fid: Fid, data: &[u8]) -> isize {
    match syscall(|ctx, guard| stream::write(guard, ctx.proc, fid, data)) {
        Ok(n) => n as isize,
        Err(_) => E_FAIL as isize,
    }
}

pub fn sys_close(fid: Fid) -> i32 {
    status(syscall(|ctx, guard| guard.close_fid(ctx.proc, fid)))
}

/// Make `newfd` refer to the same stream as `oldfd`, closing `newfd` first if open
pub fn sys_dup2(oldfd: Fid, newfd: Fid) -> i32 {
    status(syscall(|ctx, guard| guard.dup2(ctx.proc, oldfd, newfd)))
}

/// Create a pipe; its read and write handles are stored in `pipe`
pub fn sys_pipe(pipe: &mut PipePair) -> i32 {
    match syscall(|ctx, guard| guard.open_pipe(ctx.proc)) {
        Ok(pair) => {
            *pipe = pair;
            E_OK
        }
        Err(_) => E_FAIL,
    }
}

/// Open the process information stream
pub fn sys_open_info() -> Fid {
    syscall(|ctx, guard| guard.open_stream(ctx.proc, StreamObj::Info(InfoCursor::default()))).unwrap_or(NOFILE)
}
