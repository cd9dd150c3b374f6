//! Compile-time kernel limits
//!
//! Every limit here is fixed at build time; the kernel core validates caller
//! arguments against these values.

use static_assertions::const_assert;

use crate::types::Port;

/// Maximum number of process identities (the process table capacity)
pub const MAX_PROC: usize = 64;

/// Maximum number of file handles per process
pub const MAX_FILEID: usize = 16;

/// Highest valid port number
pub const MAX_PORT: Port = 1023;

/// Capacity of a pipe's cyclic buffer, in bytes
pub const PIPE_BUFFER_SIZE: usize = 20;

/// Argument bytes copied into a process information record
pub const PROCINFO_MAX_ARGS_SIZE: usize = 128;

/// PID of the scheduler (idle) process
pub const SCHED_PID: crate::types::Pid = 0;

/// PID of the init process
pub const INIT_PID: crate::types::Pid = 1;

// The scheduler and init processes must both fit in the table.
const_assert!(MAX_PROC >= 2);
// A pipe occupies two handle slots.
const_assert!(MAX_FILEID >= 2);
const_assert!(PIPE_BUFFER_SIZE > 0);
const_assert!(MAX_PORT > 0);
const_assert!(crate::types::NOPORT == 0);
