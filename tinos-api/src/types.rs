//! Identity types and sentinels

use alloc::sync::Arc;

/// Process ID type. A PID is the index of the process record in the table.
pub type Pid = i32;

/// Thread ID type. Zero is never a valid thread.
pub type Tid = u64;

/// File handle type, an index into the per-process file table
pub type Fid = i32;

/// Port number type
pub type Port = u16;

/// "No process": failure value for PID-returning calls, and "any child" for `WaitChild`
pub const NOPROC: Pid = -1;

/// "No file": failure value for handle-returning calls
pub const NOFILE: Fid = -1;

/// "No port": a socket created on this port can connect but never listen
pub const NOPORT: Port = 0;

/// "No thread": failure value for `CreateThread`
pub const NOTHREAD: Tid = 0;

/// Entry point of a process main thread or of a spawned thread.
///
/// The argument is the task's argument buffer; the return value becomes the
/// exit value of the thread (and of the process, for a main thread).
pub type Task = Arc<dyn Fn(&[u8]) -> i32 + Send + Sync>;

/// Wrap a closure into a [`Task`]
pub fn task<F>(f: F) -> Task
where
    F: Fn(&[u8]) -> i32 + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Process identity state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    /// The PID is free and available
    Free,
    /// The PID is given to a running process
    Alive,
    /// The PID is held by a zombie
    Zombie,
}

/// Which direction of a peer socket to close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Close the read direction
    Read,
    /// Close the write direction
    Write,
    /// Close both directions
    Both,
}

/// The two handles returned by `Pipe`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipePair {
    /// Read end
    pub read: Fid,
    /// Write end
    pub write: Fid,
}

impl Default for PipePair {
    fn default() -> Self {
        Self {
            read: NOFILE,
            write: NOFILE,
        }
    }
}
