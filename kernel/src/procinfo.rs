//! Process information stream
//!
//! `OpenInfo` returns a read-only handle; every read on it yields one encoded
//! [`ProcInfo`] record for the next live process in pid order, then 0.

use tinos_api::config::PROCINFO_MAX_ARGS_SIZE;
use tinos_api::{KernelError, NOPROC, ProcInfo, ProcState, Result};

use crate::kernel::KernelState;
use crate::stream::{FcbId, StreamObj};

/// Position of an info stream in the process table
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct InfoCursor {
    next: usize,
}

/// Encode the next record into `buf`.
///
/// A buffer too small for the record fails without advancing the cursor.
pub(crate) fn read(state: &mut KernelState, fcb: FcbId, buf: &mut [u8]) -> Result<usize> {
    let cursor = match state.files.get(fcb).map(|f| f.obj) {
        Some(StreamObj::Info(cursor)) => cursor,
        _ => return Err(KernelError::BadFileDescriptor),
    };

    let Some((pid, pcb)) = state.procs.iter_from(cursor.next).next() else {
        return Ok(0);
    };
    let argl = pcb.args.len();
    let info = ProcInfo {
        pid,
        ppid: pcb.parent.unwrap_or(NOPROC),
        alive: pcb.state == ProcState::Alive,
        thread_count: pcb.thread_count as u32,
        argl: argl as u32,
        args: pcb.args[..argl.min(PROCINFO_MAX_ARGS_SIZE)].to_vec(),
    };

    let bytes = info.to_bytes()?;
    if bytes.len() > buf.len() {
        return Err(KernelError::InvalidArgument);
    }
    buf[..bytes.len()].copy_from_slice(&bytes);

    if let Some(f) = state.files.get_mut(fcb) {
        f.obj = StreamObj::Info(InfoCursor {
            next: pid as usize + 1,
        });
    }
    Ok(bytes.len())
}
