//! Processes and their threads

pub mod lifecycle;
pub mod manager;
pub mod thread;

pub use manager::{Pcb, ProcHandle, ProcTable};
pub use thread::{Ptcb, ThreadId};
