//! Process information records
//!
//! The kernel's information stream returns one encoded [`ProcInfo`] per read.
//! Records use bincode's standard configuration, so they are variable-length;
//! [`ProcInfo::decode`] reports how many bytes a record occupied.

use alloc::vec::Vec;
use bincode::config;
use bincode::{Decode, Encode};

use crate::error::{KernelError, Result};
use crate::types::Pid;

/// Snapshot of one process table entry
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ProcInfo {
    /// Process ID
    pub pid: Pid,
    /// Parent process ID, or `NOPROC`
    pub ppid: Pid,
    /// True while the process is alive, false for a zombie
    pub alive: bool,
    /// Number of threads still counted against the process
    pub thread_count: u32,
    /// Length of the process argument buffer
    pub argl: u32,
    /// Leading bytes of the argument buffer (at most `PROCINFO_MAX_ARGS_SIZE`)
    pub args: Vec<u8>,
}

impl ProcInfo {
    /// Encode the record
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::encode_to_vec(self, config::standard()).map_err(|_| KernelError::InvalidArgument)
    }

    /// Decode one record from the front of `bytes`, returning it and its encoded length
    pub fn decode(bytes: &[u8]) -> Result<(ProcInfo, usize)> {
        bincode::decode_from_slice(bytes, config::standard()).map_err(|_| KernelError::InvalidArgument)
    }
}
