//! Kernel instance and boot
//!
//! A [`Kernel`] owns the kernel-wide lock and everything it protects: the
//! process table, file control blocks, pipes, sockets, pending connection
//! requests and the port table. Kernel operations run holding the lock;
//! blocking operations release it only inside a condition variable wait.

use std::any::Any;
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{Mutex, MutexGuard};
use tinos_api::config::{INIT_PID, SCHED_PID};
use tinos_api::{Pid, Port, ProcState, Task};

use crate::arena::Arena;
use crate::pipe::PipeCb;
use crate::process::{ProcHandle, ProcTable, Ptcb, ThreadId};
use crate::sched::{HostScheduler, Scheduler};
use crate::socket::{ConnRequest, SocketCb, SocketId};
use crate::stream::Fcb;
use crate::sync::CondVar;

/// State protected by the kernel lock
pub struct KernelState {
    pub(crate) procs: ProcTable,
    pub(crate) threads: Arena<Ptcb>,
    pub(crate) files: Arena<Fcb>,
    pub(crate) pipes: Arena<PipeCb>,
    pub(crate) sockets: Arena<SocketCb>,
    pub(crate) requests: Arena<ConnRequest>,
    pub(crate) ports: HashMap<Port, SocketId>,
}

/// Guard of the kernel lock
pub type KernelGuard<'a> = MutexGuard<'a, KernelState>;

impl KernelState {
    pub(crate) fn new() -> Self {
        Self {
            procs: ProcTable::new(),
            threads: Arena::new(),
            files: Arena::new(),
            pipes: Arena::new(),
            sockets: Arena::new(),
            requests: Arena::new(),
            ports: HashMap::new(),
        }
    }

    /// True while `thread` is a live thread of the still-alive process `proc`
    pub(crate) fn is_running(&self, proc: ProcHandle, thread: ThreadId) -> bool {
        self.procs
            .resolve(proc)
            .is_some_and(|pcb| pcb.state == ProcState::Alive)
            && self
                .threads
                .get(thread)
                .is_some_and(|ptcb| ptcb.owner == proc && !ptcb.exited)
    }
}

/// One kernel instance
pub struct Kernel {
    state: Mutex<KernelState>,
    pub(crate) scheduler: Arc<dyn Scheduler>,
    /// Broadcast when init becomes a zombie
    pub(crate) halted: CondVar,
    crashes: Mutex<Vec<Box<dyn Any + Send>>>,
}

impl Kernel {
    /// Boot a kernel whose units run on host threads
    pub fn boot(init: Task, args: &[u8]) -> BootHandle {
        Self::boot_with(Arc::new(HostScheduler::new()), init, args)
    }

    /// Boot a kernel on the given scheduler.
    ///
    /// Creates the scheduler process (pid 0, no thread) and the init process
    /// (pid 1, running `init`). Failing to obtain either identity is fatal.
    pub fn boot_with(scheduler: Arc<dyn Scheduler>, init: Task, args: &[u8]) -> BootHandle {
        let kernel = Arc::new(Kernel {
            state: Mutex::new(KernelState::new()),
            scheduler,
            halted: CondVar::new(),
            crashes: Mutex::new(Vec::new()),
        });

        {
            let mut state = kernel.lock();
            match kernel.exec(&mut state, None, None, &[]) {
                Ok(SCHED_PID) => {}
                other => panic!("scheduler process did not get pid {SCHED_PID}: {other:?}"),
            }
            match kernel.exec(&mut state, None, Some(init), args) {
                Ok(INIT_PID) => {}
                other => panic!("init process did not get pid {INIT_PID}: {other:?}"),
            }
        }
        log::debug!("kernel booted");

        BootHandle { kernel }
    }

    pub(crate) fn lock(&self) -> KernelGuard<'_> {
        self.state.lock()
    }

    /// Number of live process identities (alive or zombie)
    pub fn process_count(&self) -> usize {
        self.lock().procs.live()
    }

    /// State of the process table entry `pid`; out-of-range pids are `Free`
    pub fn state_of(&self, pid: Pid) -> ProcState {
        self.lock().procs.state_of(pid)
    }

    pub(crate) fn record_crash(&self, payload: Box<dyn Any + Send>) {
        self.crashes.lock().push(payload);
    }
}

/// Handle returned by [`Kernel::boot`]
pub struct BootHandle {
    kernel: Arc<Kernel>,
}

impl BootHandle {
    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    /// Block until init has exited and return its exit value.
    ///
    /// If any task panicked, the first panic is resumed here.
    pub fn wait(self) -> i32 {
        let exitval = {
            let mut guard = self.kernel.lock();
            loop {
                if let Some(init) = guard.procs.get(INIT_PID) {
                    if init.state == ProcState::Zombie {
                        break init.exitval;
                    }
                }
                self.kernel.halted.wait(&mut guard);
            }
        };

        let crash = self.kernel.crashes.lock().drain(..).next();
        if let Some(payload) = crash {
            std::panic::resume_unwind(payload);
        }
        exitval
    }
}
