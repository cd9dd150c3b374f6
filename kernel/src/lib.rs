//! TinOS Kernel Library
//!
//! The process, thread and IPC core of the TinOS teaching kernel, hosted on
//! `std`: every kernel execution unit is a host thread, and one kernel-wide
//! lock serializes kernel code.
//!
//! # Architecture
//!
//! - **Process Management** (`process`): process table, creation, exit with
//!   reparenting to init, reaping, and per-process threads with join/detach
//! - **Streams** (`stream`): per-process file tables over shared, reference
//!   counted file control blocks
//! - **Pipes** (`pipe`): bounded byte buffers with blocking reads and writes
//! - **Sockets** (`socket`): listeners, connect/accept rendezvous, peer
//!   sockets over two crossed pipes
//! - **System Calls** (`syscalls`): the call surface used by tasks, reporting
//!   failure with sentinel values
//!
//! # Usage
//!
//! ```no_run
//! use tinos_kernel::syscalls::*;
//! use tinos_kernel::{Kernel, NOPROC, task};
//!
//! let init = task(|_| {
//!     let child = sys_exec(task(|args| args.len() as i32), b"four");
//!     let mut status = 0;
//!     assert_eq!(sys_wait_child(child, Some(&mut status)), child);
//!     assert_eq!(sys_wait_child(NOPROC, None), NOPROC);
//!     status
//! });
//! assert_eq!(Kernel::boot(init, b"").wait(), 4);
//! ```

use static_assertions::const_assert;

mod arena;
mod kernel;
mod pipe;
mod process;
mod procinfo;
mod socket;
mod stream;
mod sync;

/// Execution units and the scheduler interface
pub mod sched;

/// System call surface
pub mod syscalls;

pub use crate::kernel::{BootHandle, Kernel};
pub use crate::sched::{HostScheduler, Scheduler, UnitBody};

// Re-export the shared API so callers need only this crate
pub use tinos_api::config;
pub use tinos_api::{KernelError, ProcInfo, Result};
pub use tinos_api::types::*;

// File handles are stored as `i32`.
const_assert!(config::MAX_FILEID <= i32::MAX as usize);
// Process identities are stored as `i32`.
const_assert!(config::MAX_PROC <= i32::MAX as usize);
