//! Sockets
//!
//! A socket starts UNBOUND and becomes either a LISTENER (`Listen`) or a
//! PEER (the `Connect`/`Accept` handshake); it never goes back. Peers move
//! bytes over two pipes wired crosswise: each side's write pipe is the other
//! side's read pipe.
//!
//! The handshake: `Connect` queues a connection request on the listener
//! registered at the port and sleeps on the request; `Accept` pops the
//! oldest request, creates the accepting socket, wires the pipes and admits
//! the request.
//!
//! A socket counts the contexts blocked inside `Accept` or `Connect` on it.
//! Closing a socket nobody waits on frees it at once; otherwise it is marked
//! closed, the waiters fail, and the last one out frees it.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tinos_api::config::MAX_PORT;
use tinos_api::{Fid, KernelError, NOPORT, Port, Result, ShutdownMode};

use crate::arena::{Handle, Interest};
use crate::kernel::{KernelGuard, KernelState};
use crate::pipe::{self, PipeCb, PipeId};
use crate::process::ProcHandle;
use crate::sched::caller_running;
use crate::stream::StreamObj;
use crate::sync::CondVar;

pub type SocketId = Handle<SocketCb>;
pub type RequestId = Handle<ConnRequest>;

pub(crate) enum SocketKind {
    Unbound,
    Listener {
        /// Pending connection requests, oldest first
        queue: VecDeque<RequestId>,
        req_available: CondVar,
    },
    Peer {
        peer: SocketId,
        read_pipe: Option<PipeId>,
        write_pipe: Option<PipeId>,
    },
}

/// Socket control block
pub struct SocketCb {
    port: Port,
    pub(crate) kind: SocketKind,
    /// Contexts blocked in Accept or Connect on this socket
    waiters: usize,
    closed: bool,
    /// Request of the Connect in progress
    pending: Option<RequestId>,
}

impl SocketCb {
    fn new(port: Port) -> Self {
        Self {
            port,
            kind: SocketKind::Unbound,
            waiters: 0,
            closed: false,
            pending: None,
        }
    }

    fn is_unbound(&self) -> bool {
        matches!(self.kind, SocketKind::Unbound) && self.pending.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Pending,
    Admitted,
    Refused,
}

/// Handshake record linking a connecting socket to a listener
pub struct ConnRequest {
    requester: SocketId,
    admission: Admission,
    connected_cv: CondVar,
}

// ============================================================================
// Helpers
// ============================================================================

fn socket_of(state: &KernelState, proc: ProcHandle, fid: Fid) -> Result<SocketId> {
    match state.stream_of(proc, fid)?.1 {
        StreamObj::Socket(sid) => Ok(sid),
        _ => Err(KernelError::BadFileDescriptor),
    }
}

/// Count the caller as blocked on `sid`
fn enter_wait(state: &mut KernelState, sid: SocketId) -> Result<Interest<SocketCb>> {
    let sock = state
        .sockets
        .get_mut(sid)
        .ok_or(KernelError::BadFileDescriptor)?;
    sock.waiters += 1;
    Ok(Interest::new(sid))
}

/// Stop counting the caller; the last waiter on a closed socket frees it
fn leave_wait(state: &mut KernelState, interest: Interest<SocketCb>) {
    let sid = interest.into_handle();
    let Some(sock) = state.sockets.get_mut(sid) else {
        return;
    };
    sock.waiters -= 1;
    if sock.closed && sock.waiters == 0 {
        state.sockets.remove(sid);
        log::debug!("socket {:?} freed by its last waiter", sid);
    }
}

fn refuse(state: &mut KernelState, rid: RequestId) {
    if let Some(req) = state.requests.get_mut(rid) {
        req.admission = Admission::Refused;
        req.connected_cv.broadcast();
    }
}

fn requester_waiting(state: &KernelState, rid: RequestId) -> bool {
    state.requests.get(rid).is_some_and(|req| {
        req.admission == Admission::Pending
            && state
                .sockets
                .get(req.requester)
                .is_some_and(|sock| !sock.closed)
    })
}

// ============================================================================
// Operations
// ============================================================================

/// Create an unbound socket on `port` and open it in the caller's table
pub(crate) fn open(state: &mut KernelState, proc: ProcHandle, port: Port) -> Result<Fid> {
    if port > MAX_PORT {
        return Err(KernelError::InvalidArgument);
    }
    let sid = state.sockets.insert(SocketCb::new(port));
    match state.open_stream(proc, StreamObj::Socket(sid)) {
        Ok(fid) => Ok(fid),
        Err(err) => {
            state.sockets.remove(sid);
            Err(err)
        }
    }
}

pub(crate) fn listen(state: &mut KernelState, proc: ProcHandle, fid: Fid) -> Result<()> {
    let sid = socket_of(state, proc, fid)?;
    let sock = state
        .sockets
        .get_mut(sid)
        .ok_or(KernelError::BadFileDescriptor)?;
    if !sock.is_unbound() {
        return Err(KernelError::InvalidState);
    }
    if sock.port == NOPORT {
        return Err(KernelError::InvalidArgument);
    }
    let port = sock.port;
    if state.ports.contains_key(&port) {
        return Err(KernelError::AddressInUse);
    }

    sock.kind = SocketKind::Listener {
        queue: VecDeque::new(),
        req_available: CondVar::new(),
    };
    state.ports.insert(port, sid);
    log::debug!("socket {:?} listening on port {}", sid, port);
    Ok(())
}

/// Connect the caller's unbound socket to the listener at `port`
pub(crate) fn connect(
    guard: &mut KernelGuard<'_>,
    proc: ProcHandle,
    fid: Fid,
    port: Port,
    timeout: Duration,
) -> Result<()> {
    let sid = socket_of(guard, proc, fid)?;
    if port == NOPORT || port > MAX_PORT {
        return Err(KernelError::InvalidArgument);
    }
    let sock = guard.sockets.get(sid).ok_or(KernelError::BadFileDescriptor)?;
    if !sock.is_unbound() {
        return Err(KernelError::InvalidState);
    }
    let lid = *guard.ports.get(&port).ok_or(KernelError::ConnectionRefused)?;

    let rid = guard.requests.insert(ConnRequest {
        requester: sid,
        admission: Admission::Pending,
        connected_cv: CondVar::new(),
    });
    match guard.sockets.get_mut(lid).map(|l| &mut l.kind) {
        Some(SocketKind::Listener {
            queue,
            req_available,
        }) => {
            queue.push_back(rid);
            req_available.signal();
        }
        _ => {
            guard.requests.remove(rid);
            return Err(KernelError::ConnectionRefused);
        }
    }
    let interest = enter_wait(guard, sid)?;
    if let Some(sock) = guard.sockets.get_mut(sid) {
        sock.pending = Some(rid);
    }
    log::trace!("socket {:?}: connect request {:?} queued on port {}", sid, rid, port);

    let deadline = Instant::now().checked_add(timeout);
    let outcome = loop {
        let Some(req) = guard.requests.get(rid) else {
            break Err(KernelError::ConnectionAborted);
        };
        match req.admission {
            Admission::Admitted => break Ok(()),
            Admission::Refused => break Err(KernelError::ConnectionRefused),
            Admission::Pending => {}
        }
        if !caller_running(guard) {
            break Err(KernelError::ConnectionAborted);
        }
        if guard.sockets.get(sid).is_none_or(|sock| sock.closed) {
            break Err(KernelError::ConnectionAborted);
        }
        let cv = req.connected_cv.clone();
        match deadline {
            Some(deadline) => {
                if Instant::now() >= deadline {
                    break Err(KernelError::TimedOut);
                }
                cv.wait_until(guard, deadline);
            }
            None => cv.wait(guard),
        }
    };

    // Withdraw the request if no acceptor took it
    if let Some(SocketKind::Listener { queue, .. }) = guard.sockets.get_mut(lid).map(|l| &mut l.kind) {
        queue.retain(|&queued| queued != rid);
    }
    guard.requests.remove(rid);
    if let Some(sock) = guard.sockets.get_mut(sid) {
        sock.pending = None;
    }
    leave_wait(guard, interest);

    match &outcome {
        Ok(()) => log::debug!("socket {:?} connected to port {}", sid, port),
        Err(err) => log::debug!("socket {:?}: connect to port {} failed: {}", sid, port, err),
    }
    outcome
}

/// Take the oldest connection request on the listener at `fid` and return
/// the handle of the new peer socket
pub(crate) fn accept(guard: &mut KernelGuard<'_>, proc: ProcHandle, fid: Fid) -> Result<Fid> {
    let lid = socket_of(guard, proc, fid)?;
    let listener = guard.sockets.get(lid).ok_or(KernelError::BadFileDescriptor)?;
    if !matches!(listener.kind, SocketKind::Listener { .. }) {
        return Err(KernelError::InvalidState);
    }
    let port = listener.port;

    let interest = enter_wait(guard, lid)?;
    let popped = loop {
        // Requests stay queued for live acceptors if the caller exited while asleep.
        if !caller_running(guard) {
            if let Some(SocketKind::Listener { req_available, .. }) = guard.sockets.get(lid).map(|l| &l.kind) {
                // Pass on a wakeup this caller may have consumed
                req_available.signal();
            }
            break Err(KernelError::ConnectionAborted);
        }
        let Some(listener) = guard.sockets.get_mut(lid) else {
            break Err(KernelError::ConnectionAborted);
        };
        if listener.closed {
            break Err(KernelError::ConnectionAborted);
        }
        let next = match &mut listener.kind {
            SocketKind::Listener {
                queue,
                req_available,
            } => queue.pop_front().ok_or_else(|| req_available.clone()),
            _ => break Err(KernelError::InvalidState),
        };
        match next {
            Ok(rid) if requester_waiting(guard, rid) => break Ok(rid),
            Ok(rid) => {
                log::warn!("socket {:?}: dropping request {:?}, requester gone", lid, rid);
                refuse(guard, rid);
            }
            Err(cv) => cv.wait(guard),
        }
    };
    let accepted = match popped {
        Ok(rid) => admit(guard, proc, port, rid),
        Err(err) => Err(err),
    };
    // The listener's wait reference is dropped only after the requester is woken.
    leave_wait(guard, interest);
    let new_fid = accepted?;
    log::debug!("socket {:?}: accepted connection on port {} as handle {}", lid, port, new_fid);
    Ok(new_fid)
}

/// Connect the requester of `rid` to a fresh peer socket owned by `proc`
fn admit(state: &mut KernelState, proc: ProcHandle, port: Port, rid: RequestId) -> Result<Fid> {
    let requester = state
        .requests
        .get(rid)
        .map(|req| req.requester)
        .ok_or(KernelError::ConnectionAborted)?;
    let sid = state.sockets.insert(SocketCb::new(port));
    let new_fid = match state.open_stream(proc, StreamObj::Socket(sid)) {
        Ok(new_fid) => new_fid,
        Err(err) => {
            state.sockets.remove(sid);
            refuse(state, rid);
            return Err(err);
        }
    };

    let to_requester = state.pipes.insert(PipeCb::new());
    let to_accepted = state.pipes.insert(PipeCb::new());
    if let Some(sock) = state.sockets.get_mut(requester) {
        sock.kind = SocketKind::Peer {
            peer: sid,
            read_pipe: Some(to_requester),
            write_pipe: Some(to_accepted),
        };
    }
    if let Some(sock) = state.sockets.get_mut(sid) {
        sock.kind = SocketKind::Peer {
            peer: requester,
            read_pipe: Some(to_accepted),
            write_pipe: Some(to_requester),
        };
    }
    if let Some(req) = state.requests.get_mut(rid) {
        req.admission = Admission::Admitted;
        req.connected_cv.signal();
    }

    log::trace!("request {:?}: socket {:?} paired with {:?}", rid, requester, sid);
    Ok(new_fid)
}

/// Close one or both directions of a peer socket
pub(crate) fn shutdown(state: &mut KernelState, proc: ProcHandle, fid: Fid, mode: ShutdownMode) -> Result<()> {
    let sid = socket_of(state, proc, fid)?;
    let sock = state
        .sockets
        .get_mut(sid)
        .ok_or(KernelError::BadFileDescriptor)?;
    let SocketKind::Peer {
        read_pipe,
        write_pipe,
        ..
    } = &mut sock.kind
    else {
        return Err(KernelError::InvalidState);
    };

    let read = match mode {
        ShutdownMode::Read | ShutdownMode::Both => read_pipe.take(),
        ShutdownMode::Write => None,
    };
    let write = match mode {
        ShutdownMode::Write | ShutdownMode::Both => write_pipe.take(),
        ShutdownMode::Read => None,
    };
    if let Some(p) = read {
        pipe::close_reader(state, p);
    }
    if let Some(p) = write {
        pipe::close_writer(state, p);
    }
    Ok(())
}

pub(crate) fn read(guard: &mut KernelGuard<'_>, sid: SocketId, buf: &mut [u8]) -> Result<usize> {
    let pipe = match &guard.sockets.get(sid).ok_or(KernelError::BadFileDescriptor)?.kind {
        SocketKind::Peer { read_pipe, .. } => read_pipe.ok_or(KernelError::Closed)?,
        _ => return Err(KernelError::InvalidState),
    };
    pipe::read(guard, pipe, buf)
}

pub(crate) fn write(guard: &mut KernelGuard<'_>, sid: SocketId, data: &[u8]) -> Result<usize> {
    let pipe = match &guard.sockets.get(sid).ok_or(KernelError::BadFileDescriptor)?.kind {
        SocketKind::Peer { write_pipe, .. } => write_pipe.ok_or(KernelError::Closed)?,
        _ => return Err(KernelError::InvalidState),
    };
    pipe::write(guard, pipe, data)
}

/// Stream close: runs when the last handle to the socket goes away
pub(crate) fn close(state: &mut KernelState, sid: SocketId) {
    let Some(sock) = state.sockets.get_mut(sid) else {
        return;
    };
    sock.closed = true;
    let port = sock.port;
    let waiters = sock.waiters;
    let pending = sock.pending;
    let kind = std::mem::replace(&mut sock.kind, SocketKind::Unbound);

    match kind {
        SocketKind::Listener {
            queue,
            req_available,
        } => {
            if state.ports.get(&port) == Some(&sid) {
                state.ports.remove(&port);
            }
            for rid in queue {
                refuse(state, rid);
            }
            req_available.broadcast();
            log::debug!("listener {:?} on port {} closed", sid, port);
        }
        SocketKind::Peer {
            peer,
            read_pipe,
            write_pipe,
        } => {
            if let Some(p) = read_pipe {
                pipe::close_reader(state, p);
            }
            if let Some(p) = write_pipe {
                pipe::close_writer(state, p);
            }
            log::debug!("socket {:?} closed, peer {:?}", sid, peer);
        }
        SocketKind::Unbound => {
            if let Some(req) = pending.and_then(|rid| state.requests.get(rid)) {
                req.connected_cv.broadcast();
            }
        }
    }

    if waiters == 0 {
        state.sockets.remove(sid);
    }
}
