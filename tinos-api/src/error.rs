//! Error handling module for the TinOS kernel core

use core::fmt;

/// Kernel error taxonomy.
///
/// Variants fall into four groups: resource exhaustion, invalid arguments,
/// concurrent teardown, and calls made outside a kernel execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    // Resource exhaustion
    /// No free process identity
    ProcessTableFull,
    /// No free file handle slot in the process file table
    FileTableFull,
    /// The scheduler could not create an execution unit
    SpawnFailed,

    // Invalid arguments
    /// Argument out of range
    InvalidArgument,
    /// Handle is out of range, empty, or of the wrong stream type
    BadFileDescriptor,
    /// No such process, or not a child of the caller
    NoProcess,
    /// No such thread, or a thread identity that is no longer valid
    NoThread,
    /// A thread tried to join or detach itself
    SelfReference,
    /// The target thread is detached or already joined
    Detached,
    /// The socket is in the wrong state for the operation
    InvalidState,
    /// The port already has a listener
    AddressInUse,
    /// No listener is registered at the port
    ConnectionRefused,

    // Concurrent teardown
    /// The socket was closed while the caller was blocked on it
    ConnectionAborted,
    /// A timed wait elapsed
    TimedOut,
    /// The read end of the pipe is closed
    BrokenPipe,
    /// The stream end used by the caller has been closed
    Closed,

    /// The caller is not a kernel execution unit
    NotInKernel,
}

impl KernelError {
    /// Stable negative code for diagnostics
    pub fn errno(&self) -> i32 {
        match self {
            KernelError::ProcessTableFull => -11,
            KernelError::FileTableFull => -24,
            KernelError::SpawnFailed => -12,
            KernelError::InvalidArgument => -22,
            KernelError::BadFileDescriptor => -9,
            KernelError::NoProcess => -3,
            KernelError::NoThread => -10,
            KernelError::SelfReference => -35,
            KernelError::Detached => -1,
            KernelError::InvalidState => -95,
            KernelError::AddressInUse => -98,
            KernelError::ConnectionRefused => -111,
            KernelError::ConnectionAborted => -103,
            KernelError::TimedOut => -110,
            KernelError::BrokenPipe => -32,
            KernelError::Closed => -104,
            KernelError::NotInKernel => -38,
        }
    }

    /// Returns true for errors caused by a concurrent close or a timeout
    pub fn is_teardown(&self) -> bool {
        matches!(
            self,
            KernelError::ConnectionAborted
                | KernelError::TimedOut
                | KernelError::BrokenPipe
                | KernelError::Closed
        )
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::ProcessTableFull => write!(f, "No free process identity"),
            KernelError::FileTableFull => write!(f, "No free file handle"),
            KernelError::SpawnFailed => write!(f, "Could not create execution unit"),
            KernelError::InvalidArgument => write!(f, "Invalid argument"),
            KernelError::BadFileDescriptor => write!(f, "Bad file handle"),
            KernelError::NoProcess => write!(f, "No such child process"),
            KernelError::NoThread => write!(f, "No such thread"),
            KernelError::SelfReference => write!(f, "Thread refers to itself"),
            KernelError::Detached => write!(f, "Thread is detached or already joined"),
            KernelError::InvalidState => write!(f, "Socket in wrong state"),
            KernelError::AddressInUse => write!(f, "Port already has a listener"),
            KernelError::ConnectionRefused => write!(f, "No listener at port"),
            KernelError::ConnectionAborted => write!(f, "Socket closed while waiting"),
            KernelError::TimedOut => write!(f, "Operation timed out"),
            KernelError::BrokenPipe => write!(f, "Broken pipe"),
            KernelError::Closed => write!(f, "Stream end closed"),
            KernelError::NotInKernel => write!(f, "Not a kernel execution context"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for KernelError {}

/// Result type for kernel operations that can fail
pub type Result<T> = core::result::Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_errno_is_negative() {
        let all = [
            KernelError::ProcessTableFull,
            KernelError::FileTableFull,
            KernelError::SpawnFailed,
            KernelError::InvalidArgument,
            KernelError::BadFileDescriptor,
            KernelError::NoProcess,
            KernelError::NoThread,
            KernelError::SelfReference,
            KernelError::Detached,
            KernelError::InvalidState,
            KernelError::AddressInUse,
            KernelError::ConnectionRefused,
            KernelError::ConnectionAborted,
            KernelError::TimedOut,
            KernelError::BrokenPipe,
            KernelError::Closed,
            KernelError::NotInKernel,
        ];
        for err in all {
            assert!(err.errno() < 0, "{:?}", err);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(KernelError::TimedOut.to_string(), "Operation timed out");
        assert!(KernelError::ConnectionAborted.is_teardown());
        assert!(!KernelError::NoProcess.is_teardown());
    }
}
