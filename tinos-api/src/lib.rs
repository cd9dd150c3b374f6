//! TinOS API - Identity types, limits and error taxonomy for the TinOS kernel core
//!
//! This crate holds everything the kernel core and its callers must agree on
//! without depending on the kernel implementation itself.
//!
//! # Architecture
//!
//! - **Types**: process, thread, file and port identities and their sentinels
//! - **Config**: compile-time limits of the process table, file tables, ports and pipes
//! - **Error**: the kernel error taxonomy and the `Result` alias
//! - **Procinfo**: the record format produced by the process information stream
//!
//! # Usage
//!
//! ```rust
//! use tinos_api::{KernelError, Result, NOPROC};
//!
//! fn check(pid: tinos_api::Pid) -> Result<tinos_api::Pid> {
//!     if pid == NOPROC {
//!         return Err(KernelError::NoProcess);
//!     }
//!     Ok(pid)
//! }
//!
//! assert!(check(NOPROC).is_err());
//! ```

#![no_std]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

pub mod config;
pub mod error;
pub mod procinfo;
pub mod types;

// Re-export commonly used types
pub use crate::error::{KernelError, Result};
pub use crate::procinfo::ProcInfo;
pub use crate::types::*;
