//! Socket system calls

use std::time::Duration;

use tinos_api::{Fid, NOFILE, Port, ShutdownMode};

use super::{status, syscall};
use crate::socket;

/// Create an unbound socket on `port` (`NOPORT` for a socket that only connects)
pub fn sys_socket(port: Port) -> Fid {
    syscall(|ctx, guard| socket::open(guard, ctx.proc, port)).unwrap_or(NOFILE)
}

/// Register the socket as the listener of its port
pub fn sys_listen(fid: Fid) -> i32 {
    status(syscall(|ctx, guard| socket::listen(guard, ctx.proc, fid)))
}

/// Wait for a connection on a listener; returns the new peer socket
pub fn sys_accept(fid: Fid) -> Fid {
    syscall(|ctx, guard| socket::accept(guard, ctx.proc, fid)).unwrap_or(NOFILE)
}

/// Connect to the listener at `port`, giving up after `timeout`
pub fn sys_connect(fid: Fid, port: Port, timeout: Duration) -> i32 {
    status(syscall(|ctx, guard| socket::connect(guard, ctx.proc, fid, port, timeout)))
}

/// Close one or both directions of a connected socket
pub fn sys_shutdown(fid: Fid, mode: ShutdownMode) -> i32 {
    status(syscall(|ctx, guard| socket::shutdown(guard, ctx.proc, fid, mode)))
}
