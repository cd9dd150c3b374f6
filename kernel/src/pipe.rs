//! Pipe implementation for inter-process communication
//!
//! A pipe is a fixed-capacity cyclic byte buffer with one reader end and one
//! writer end. Readers block while the buffer is empty and a writer exists;
//! writers block while it is full and a reader exists. Either end can be
//! closed on its own; the pipe is freed once both are closed.

use tinos_api::config::PIPE_BUFFER_SIZE;
use tinos_api::{KernelError, Result};

use crate::arena::Handle;
use crate::kernel::{KernelGuard, KernelState};
use crate::sched::caller_running;
use crate::sync::CondVar;

/// Pipe control block
pub struct PipeCb {
    data: [u8; PIPE_BUFFER_SIZE],
    /// Total bytes read
    nread: usize,
    /// Total bytes written
    nwrite: usize,
    pub(crate) reader_open: bool,
    pub(crate) writer_open: bool,
    has_space: CondVar,
    has_data: CondVar,
}

pub type PipeId = Handle<PipeCb>;

impl PipeCb {
    pub fn new() -> Self {
        Self {
            data: [0; PIPE_BUFFER_SIZE],
            nread: 0,
            nwrite: 0,
            reader_open: true,
            writer_open: true,
            has_space: CondVar::new(),
            has_data: CondVar::new(),
        }
    }

    /// Bytes buffered
    pub fn len(&self) -> usize {
        self.nwrite - self.nread
    }

    pub fn is_empty(&self) -> bool {
        self.nread == self.nwrite
    }

    pub fn is_full(&self) -> bool {
        self.len() == PIPE_BUFFER_SIZE
    }

    /// Copy as much of `src` as fits; returns the count copied
    fn push(&mut self, src: &[u8]) -> usize {
        let n = src.len().min(PIPE_BUFFER_SIZE - self.len());
        for &byte in &src[..n] {
            self.data[self.nwrite % PIPE_BUFFER_SIZE] = byte;
            self.nwrite += 1;
        }
        n
    }

    /// Copy out as many buffered bytes as fit in `dst`
    fn pop(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.len());
        for byte in &mut dst[..n] {
            *byte = self.data[self.nread % PIPE_BUFFER_SIZE];
            self.nread += 1;
        }
        n
    }
}

impl Default for PipeCb {
    fn default() -> Self {
        Self::new()
    }
}

/// Read at least one byte, or return 0 once the writer is gone and the buffer drained
pub(crate) fn read(guard: &mut KernelGuard<'_>, id: PipeId, buf: &mut [u8]) -> Result<usize> {
    loop {
        // A reader whose process exited while it slept leaves the data to live readers.
        if !caller_running(guard) {
            return Err(KernelError::Closed);
        }
        let pipe = guard.pipes.get_mut(id).ok_or(KernelError::Closed)?;
        if !pipe.reader_open {
            return Err(KernelError::Closed);
        }
        if buf.is_empty() {
            return Ok(0);
        }
        if !pipe.is_empty() {
            let n = pipe.pop(buf);
            pipe.has_space.broadcast();
            return Ok(n);
        }
        if !pipe.writer_open {
            return Ok(0);
        }
        log::trace!("pipe {:?}: reader blocks", id);
        let cv = pipe.has_data.clone();
        cv.wait(guard);
    }
}

/// Write all of `data`, blocking while the buffer is full.
///
/// If the reader goes away part way, the count written so far is returned;
/// if it was gone before the first byte, the write fails with `BrokenPipe`.
pub(crate) fn write(guard: &mut KernelGuard<'_>, id: PipeId, data: &[u8]) -> Result<usize> {
    let mut written = 0;
    while written < data.len() {
        if !caller_running(guard) {
            log::debug!("pipe {:?}: writer exited after {} bytes", id, written);
            return if written == 0 { Err(KernelError::Closed) } else { Ok(written) };
        }
        let Some(pipe) = guard.pipes.get_mut(id) else {
            break;
        };
        if !pipe.writer_open {
            if written == 0 {
                return Err(KernelError::Closed);
            }
            break;
        }
        if !pipe.reader_open {
            break;
        }
        if pipe.is_full() {
            log::trace!("pipe {:?}: writer blocks after {} bytes", id, written);
            let cv = pipe.has_space.clone();
            cv.wait(guard);
            continue;
        }
        written += pipe.push(&data[written..]);
        pipe.has_data.broadcast();
    }

    if written == 0 && !data.is_empty() {
        return Err(KernelError::BrokenPipe);
    }
    Ok(written)
}

/// Close the reader end; idempotent
pub(crate) fn close_reader(state: &mut KernelState, id: PipeId) {
    let Some(pipe) = state.pipes.get_mut(id) else {
        return;
    };
    if !pipe.reader_open {
        return;
    }
    pipe.reader_open = false;
    pipe.has_space.broadcast();
    pipe.has_data.broadcast();
    if !pipe.writer_open {
        state.pipes.remove(id);
        log::trace!("pipe {:?} freed", id);
    }
}

/// Close the writer end; idempotent
pub(crate) fn close_writer(state: &mut KernelState, id: PipeId) {
    let Some(pipe) = state.pipes.get_mut(id) else {
        return;
    };
    if !pipe.writer_open {
        return;
    }
    pipe.writer_open = false;
    pipe.has_data.broadcast();
    pipe.has_space.broadcast();
    if !pipe.reader_open {
        state.pipes.remove(id);
        log::trace!("pipe {:?} freed", id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ring_wraps_around() {
        let mut pipe = PipeCb::new();
        let mut out = [0u8; PIPE_BUFFER_SIZE];
        for round in 0..5u8 {
            let chunk: Vec<u8> = (0..PIPE_BUFFER_SIZE as u8 - 3).map(|b| b ^ round).collect();
            assert_eq!(pipe.push(&chunk), chunk.len());
            assert_eq!(pipe.pop(&mut out), chunk.len());
            assert_eq!(&out[..chunk.len()], &chunk[..]);
        }
        assert!(pipe.is_empty());
    }

    #[test]
    fn test_push_stops_when_full() {
        let mut pipe = PipeCb::new();
        let big = vec![7u8; PIPE_BUFFER_SIZE + 5];
        assert_eq!(pipe.push(&big), PIPE_BUFFER_SIZE);
        assert!(pipe.is_full());
        assert_eq!(pipe.push(&[1]), 0);
    }

    #[test]
    fn test_close_ends_frees_pipe() {
        let mut state = KernelState::new();
        let id = state.pipes.insert(PipeCb::new());
        close_writer(&mut state, id);
        close_writer(&mut state, id);
        assert!(state.pipes.contains(id));
        close_reader(&mut state, id);
        assert!(!state.pipes.contains(id));
    }

    proptest! {
        /// Interleaved pushes and pops of arbitrary sizes preserve the byte stream
        #[test]
        fn prop_ring_is_fifo(
            data in proptest::collection::vec(any::<u8>(), 0..200),
            chunks in proptest::collection::vec((1usize..32, 1usize..32), 1..64),
        ) {
            let mut pipe = PipeCb::new();
            let mut sent = 0;
            let mut received = Vec::new();
            let mut buf = [0u8; 32];
            for (w, r) in chunks.iter().cycle().take(400) {
                let end = (sent + w).min(data.len());
                sent += pipe.push(&data[sent..end]);
                let n = pipe.pop(&mut buf[..*r]);
                received.extend_from_slice(&buf[..n]);
                if sent == data.len() && pipe.is_empty() {
                    break;
                }
            }
            while !pipe.is_empty() {
                let n = pipe.pop(&mut buf);
                received.extend_from_slice(&buf[..n]);
            }
            prop_assert_eq!(&received[..], &data[..sent]);
        }
    }
}
