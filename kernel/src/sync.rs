//! Kernel condition variables
//!
//! All kernel state sits behind one `parking_lot::Mutex`; every condition
//! variable here is waited on with a guard of that mutex, so waiting releases
//! the kernel lock atomically and re-acquires it before returning. Wakeups are
//! not precise: callers re-check their guard condition in a loop.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, MutexGuard};

/// Shared handle to a condition variable.
///
/// Cloning is cheap; a clone taken out of a kernel record lets the caller
/// wait on it while handing the guard back to the condition variable.
#[derive(Clone, Default)]
pub struct CondVar(Arc<Condvar>);

impl CondVar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Release the kernel lock, sleep until signaled, re-acquire
    pub fn wait<T>(&self, guard: &mut MutexGuard<'_, T>) {
        self.0.wait(guard);
    }

    /// Like [`CondVar::wait`] with a deadline. Returns true if the deadline passed.
    pub fn wait_until<T>(&self, guard: &mut MutexGuard<'_, T>, deadline: Instant) -> bool {
        self.0.wait_until(guard, deadline).timed_out()
    }

    /// Wake one waiter
    pub fn signal(&self) {
        self.0.notify_one();
    }

    /// Wake all waiters
    pub fn broadcast(&self) {
        self.0.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[test]
    fn test_wait_until_times_out() {
        let lock = Mutex::new(());
        let cv = CondVar::new();
        let mut guard = lock.lock();
        let start = Instant::now();
        assert!(cv.wait_until(&mut guard, start + Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_broadcast_wakes_waiter() {
        let lock = Arc::new(Mutex::new(false));
        let cv = CondVar::new();
        let waiter = {
            let lock = lock.clone();
            let cv = cv.clone();
            std::thread::spawn(move || {
                let mut guard = lock.lock();
                while !*guard {
                    cv.wait(&mut guard);
                }
            })
        };
        *lock.lock() = true;
        cv.broadcast();
        waiter.join().expect("waiter");
    }
}
