//! File handles and the stream layer
//!
//! A process's file table maps small integer handles to shared file control
//! blocks (FCBs). Each occupied slot, in any process, holds one reference;
//! `Exec` inheritance and `Dup2` add references. When the last reference
//! goes the stream object behind the FCB is closed exactly once.

use tinos_api::config::MAX_FILEID;
use tinos_api::{Fid, KernelError, PipePair, ProcState, Result};

use crate::arena::Handle;
use crate::kernel::{KernelGuard, KernelState};
use crate::pipe::{self, PipeCb, PipeId};
use crate::procinfo::{self, InfoCursor};
use crate::process::ProcHandle;
use crate::socket::{self, SocketId};

/// Object a file handle refers to
#[derive(Debug, Clone, Copy)]
pub(crate) enum StreamObj {
    PipeReader(PipeId),
    PipeWriter(PipeId),
    Socket(SocketId),
    Info(InfoCursor),
}

/// File control block
pub struct Fcb {
    refcount: usize,
    pub(crate) obj: StreamObj,
}

pub type FcbId = Handle<Fcb>;

fn slot(fid: Fid) -> Result<usize> {
    usize::try_from(fid)
        .ok()
        .filter(|&idx| idx < MAX_FILEID)
        .ok_or(KernelError::BadFileDescriptor)
}

impl KernelState {
    pub(crate) fn incref_file(&mut self, fcb: FcbId) {
        if let Some(f) = self.files.get_mut(fcb) {
            f.refcount += 1;
        }
    }

    /// Drop one reference; the last one closes the stream
    pub(crate) fn decref_file(&mut self, fcb: FcbId) {
        let Some(f) = self.files.get_mut(fcb) else {
            return;
        };
        f.refcount -= 1;
        if f.refcount > 0 {
            return;
        }
        if let Some(f) = self.files.remove(fcb) {
            self.close_stream(f.obj);
        }
    }

    fn close_stream(&mut self, obj: StreamObj) {
        match obj {
            StreamObj::PipeReader(p) => pipe::close_reader(self, p),
            StreamObj::PipeWriter(p) => pipe::close_writer(self, p),
            StreamObj::Socket(s) => socket::close(self, s),
            StreamObj::Info(_) => {}
        }
    }

    /// Find `N` free handle slots in the process table, lowest first
    pub(crate) fn reserve_fids<const N: usize>(&self, proc: ProcHandle) -> Result<[Fid; N]> {
        let pcb = self
            .procs
            .resolve(proc)
            .filter(|pcb| pcb.state == ProcState::Alive)
            .ok_or(KernelError::NoProcess)?;
        let mut out = [0; N];
        let mut free = pcb
            .fidt
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(idx, _)| idx as Fid);
        for fid in out.iter_mut() {
            *fid = free.next().ok_or(KernelError::FileTableFull)?;
        }
        Ok(out)
    }

    /// Bind a new FCB for `obj` to a slot previously found by `reserve_fids`
    pub(crate) fn install(&mut self, proc: ProcHandle, fid: Fid, obj: StreamObj) -> Result<()> {
        let idx = slot(fid)?;
        let pcb = self
            .procs
            .resolve_mut(proc)
            .filter(|pcb| pcb.state == ProcState::Alive)
            .ok_or(KernelError::NoProcess)?;
        debug_assert!(pcb.fidt[idx].is_none());
        let fcb = self.files.insert(Fcb { refcount: 1, obj });
        pcb.fidt[idx] = Some(fcb);
        Ok(())
    }

    /// Open `obj` under the lowest free handle
    pub(crate) fn open_stream(&mut self, proc: ProcHandle, obj: StreamObj) -> Result<Fid> {
        let [fid] = self.reserve_fids::<1>(proc)?;
        self.install(proc, fid, obj)?;
        Ok(fid)
    }

    pub(crate) fn fcb_of(&self, proc: ProcHandle, fid: Fid) -> Result<FcbId> {
        let idx = slot(fid)?;
        self.procs
            .resolve(proc)
            .ok_or(KernelError::NoProcess)?
            .fidt[idx]
            .ok_or(KernelError::BadFileDescriptor)
    }

    pub(crate) fn stream_of(&self, proc: ProcHandle, fid: Fid) -> Result<(FcbId, StreamObj)> {
        let fcb = self.fcb_of(proc, fid)?;
        let obj = self.files.get(fcb).ok_or(KernelError::BadFileDescriptor)?.obj;
        Ok((fcb, obj))
    }

    /// Empty the slot and drop its reference
    pub(crate) fn close_fid(&mut self, proc: ProcHandle, fid: Fid) -> Result<()> {
        let idx = slot(fid)?;
        let pcb = self.procs.resolve_mut(proc).ok_or(KernelError::NoProcess)?;
        let fcb = pcb.fidt[idx].take().ok_or(KernelError::BadFileDescriptor)?;
        self.decref_file(fcb);
        Ok(())
    }

    /// Make `newfd` another reference to the block behind `oldfd`
    pub(crate) fn dup2(&mut self, proc: ProcHandle, oldfd: Fid, newfd: Fid) -> Result<()> {
        let fcb = self.fcb_of(proc, oldfd)?;
        let new_idx = slot(newfd)?;
        if oldfd == newfd {
            return Ok(());
        }
        if self.fcb_of(proc, newfd).is_ok() {
            self.close_fid(proc, newfd)?;
        }
        self.incref_file(fcb);
        let pcb = self.procs.resolve_mut(proc).ok_or(KernelError::NoProcess)?;
        pcb.fidt[new_idx] = Some(fcb);
        Ok(())
    }

    /// Create a pipe and open both of its ends in the caller's table
    pub(crate) fn open_pipe(&mut self, proc: ProcHandle) -> Result<PipePair> {
        let [read, write] = self.reserve_fids::<2>(proc)?;
        let pipe = self.pipes.insert(PipeCb::new());
        self.install(proc, read, StreamObj::PipeReader(pipe))?;
        self.install(proc, write, StreamObj::PipeWriter(pipe))?;
        log::trace!("process {}: pipe {:?} at ({}, {})", proc.pid, pipe, read, write);
        Ok(PipePair { read, write })
    }
}

/// Read from whatever `fid` refers to
pub(crate) fn read(guard: &mut KernelGuard<'_>, proc: ProcHandle, fid: Fid, buf: &mut [u8]) -> Result<usize> {
    let (fcb, obj) = guard.stream_of(proc, fid)?;
    match obj {
        StreamObj::PipeReader(p) => pipe::read(guard, p, buf),
        StreamObj::Socket(s) => socket::read(guard, s, buf),
        StreamObj::Info(_) => procinfo::read(guard, fcb, buf),
        StreamObj::PipeWriter(_) => Err(KernelError::BadFileDescriptor),
    }
}

/// Write to whatever `fid` refers to
pub(crate) fn write(guard: &mut KernelGuard<'_>, proc: ProcHandle, fid: Fid, data: &[u8]) -> Result<usize> {
    let (_, obj) = guard.stream_of(proc, fid)?;
    match obj {
        StreamObj::PipeWriter(p) => pipe::write(guard, p, data),
        StreamObj::Socket(s) => socket::write(guard, s, data),
        StreamObj::PipeReader(_) | StreamObj::Info(_) => Err(KernelError::BadFileDescriptor),
    }
}
