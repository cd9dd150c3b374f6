//! Thread system call tests
//! Tests for CreateThread, ThreadSelf, ThreadJoin, ThreadDetach and ThreadExit

mod common;

use std::thread;
use std::time::Duration;

use common::*;
use tinos_kernel::syscalls::*;
use tinos_kernel::{NOPROC, NOTHREAD, PipePair, task};

mod thread_join_tests {
    use super::*;

    /// Test joining a thread yields its return value
    #[test]
    fn test_join_returns_exit_value() {
        run(|_| {
            let tid = sys_create_thread(task(|args| args.iter().map(|&b| b as i32).sum()), &[1, 2, 3]);
            assert_ne!(tid, NOTHREAD);
            let mut exitval = 0;
            assert_eq!(sys_thread_join(tid, Some(&mut exitval)), 0);
            assert_eq!(exitval, 6);
            0
        });
    }

    /// Test ThreadExit value is what the joiner sees
    #[test]
    fn test_thread_exit_value() {
        run(|_| {
            let tid = sys_create_thread(task(|_| sys_thread_exit(77)), b"");
            let mut exitval = 0;
            assert_eq!(sys_thread_join(tid, Some(&mut exitval)), 0);
            assert_eq!(exitval, 77);
            0
        });
    }

    /// Test invalid join targets fail
    #[test]
    fn test_join_invalid_targets() {
        run(|_| {
            let me = sys_thread_self();
            assert_ne!(me, NOTHREAD);
            assert_eq!(sys_thread_join(me, None), -1);
            assert_eq!(sys_thread_join(NOTHREAD, None), -1);
            assert_eq!(sys_thread_join(0xdead_beef_0000_0042, None), -1);
            assert_eq!(sys_thread_detach(me), -1);
            assert_eq!(sys_thread_detach(NOTHREAD), -1);
            0
        });
    }

    /// Test a second join after the record was consumed fails cleanly
    #[test]
    fn test_double_join_fails() {
        run(|_| {
            let tid = sys_create_thread(task(|_| 1), b"");
            assert_eq!(sys_thread_join(tid, None), 0);
            assert_eq!(sys_thread_join(tid, None), -1);
            assert_eq!(sys_thread_detach(tid), -1);

            // A reused slot gets a new identity
            let next = sys_create_thread(task(|_| 2), b"");
            assert_ne!(next, tid);
            assert_eq!(sys_thread_join(tid, None), -1);
            let mut exitval = 0;
            assert_eq!(sys_thread_join(next, Some(&mut exitval)), 0);
            assert_eq!(exitval, 2);
            0
        });
    }

    /// Test threads of one process cannot join threads of another, even when
    /// the other process has threads of its own
    #[test]
    fn test_join_foreign_thread_fails() {
        run(|_| {
            let tid = sys_create_thread(task(|_| 99), b"");
            let child = sys_exec(
                task(move |_| {
                    let own = sys_create_thread(task(|_| 5), b"");
                    assert_ne!(own, NOTHREAD);
                    assert_ne!(own, tid);
                    assert_eq!(sys_thread_join(tid, None), -1);
                    assert_eq!(sys_thread_detach(tid), -1);

                    // The failed calls left the child's own thread untouched
                    let mut exitval = 0;
                    assert_eq!(sys_thread_join(own, Some(&mut exitval)), 0);
                    assert_eq!(exitval, 5);
                    0
                }),
                b"",
            );
            let mut status = -1;
            assert_eq!(sys_wait_child(child, Some(&mut status)), child);
            assert_eq!(status, 0);

            let mut exitval = 0;
            assert_eq!(sys_thread_join(tid, Some(&mut exitval)), 0);
            assert_eq!(exitval, 99);
            0
        });
    }

    /// Test ThreadSelf inside a spawned thread matches the creator's handle
    #[test]
    fn test_thread_self_matches_create() {
        run(|_| {
            let mut report = PipePair::default();
            assert_eq!(sys_pipe(&mut report), 0);
            let tid = sys_create_thread(
                task(move |_| {
                    write_all(report.write, &sys_thread_self().to_le_bytes());
                    0
                }),
                b"",
            );
            let mut bytes = [0u8; 8];
            read_exact(report.read, &mut bytes);
            assert_eq!(u64::from_le_bytes(bytes), tid);
            assert_ne!(tid, sys_thread_self());
            assert_eq!(sys_thread_join(tid, None), 0);
            0
        });
    }
}

mod thread_detach_tests {
    use super::*;

    /// Test a detached thread cannot be joined and still runs to completion
    #[test]
    fn test_detach_then_exit() {
        run(|_| {
            let mut to_worker = PipePair::default();
            assert_eq!(sys_pipe(&mut to_worker), 0);
            let mut from_worker = PipePair::default();
            assert_eq!(sys_pipe(&mut from_worker), 0);
            let tid = sys_create_thread(
                task(move |_| {
                    let mut byte = [0u8; 1];
                    read_exact(to_worker.read, &mut byte);
                    write_all(from_worker.write, &[byte[0] + 1]);
                    0
                }),
                b"",
            );
            assert_eq!(sys_thread_detach(tid), 0);
            assert_eq!(sys_thread_detach(tid), -1);
            assert_eq!(sys_thread_join(tid, None), -1);

            write_all(to_worker.write, &[41]);
            let mut byte = [0u8; 1];
            read_exact(from_worker.read, &mut byte);
            assert_eq!(byte[0], 42);
            0
        });
    }

    /// Test detaching an already exited thread releases it
    #[test]
    fn test_detach_exited_thread() {
        run(|_| {
            let mut pipe = PipePair::default();
            assert_eq!(sys_pipe(&mut pipe), 0);
            let tid = sys_create_thread(
                task(move |_| {
                    write_all(pipe.write, b"x");
                    0
                }),
                b"",
            );
            let mut byte = [0u8; 1];
            read_exact(pipe.read, &mut byte);
            thread::sleep(Duration::from_millis(20));
            assert_eq!(sys_thread_detach(tid), 0);
            assert_eq!(sys_thread_join(tid, None), -1);
            0
        });
    }

    /// Test a joiner blocked on a thread fails when another thread detaches it
    #[test]
    fn test_detach_wakes_blocked_joiner() {
        run(|_| {
            let mut gate = PipePair::default();
            assert_eq!(sys_pipe(&mut gate), 0);
            let mut report = PipePair::default();
            assert_eq!(sys_pipe(&mut report), 0);

            let sleeper = sys_create_thread(
                task(move |_| {
                    read_to_end(gate.read);
                    0
                }),
                b"",
            );
            let joiner = sys_create_thread(
                task(move |_| {
                    write_all(report.write, b"j");
                    sys_thread_join(sleeper, None)
                }),
                b"",
            );
            let mut byte = [0u8; 1];
            read_exact(report.read, &mut byte);
            thread::sleep(Duration::from_millis(20));

            assert_eq!(sys_thread_detach(sleeper), 0);
            let mut exitval = 0;
            assert_eq!(sys_thread_join(joiner, Some(&mut exitval)), 0);
            assert_eq!(exitval, -1);

            assert_eq!(sys_close(gate.write), 0);
            0
        });
    }
}

mod thread_exit_tests {
    use super::*;

    /// Test the process ends with the exit value of its last thread
    #[test]
    fn test_last_thread_exit_ends_process() {
        run(|_| {
            let mut gate = PipePair::default();
            assert_eq!(sys_pipe(&mut gate), 0);
            let child = sys_exec(
                task(move |_| {
                    assert_eq!(sys_close(gate.write), 0);
                    let worker = sys_create_thread(
                        task(move |_| {
                            read_to_end(gate.read);
                            55
                        }),
                        b"",
                    );
                    assert_eq!(sys_thread_detach(worker), 0);
                    // The main thread leaves first; the process lives on in the worker
                    sys_thread_exit(1)
                }),
                b"",
            );

            thread::sleep(Duration::from_millis(20));
            let info = info_of(child).expect("child listed");
            assert!(info.alive);
            assert_eq!(info.thread_count, 1);

            assert_eq!(sys_close(gate.write), 0);
            let mut status = 0;
            assert_eq!(sys_wait_child(child, Some(&mut status)), child);
            assert_eq!(status, 55);
            0
        });
    }

    /// Test Exit from a secondary thread terminates the whole process
    #[test]
    fn test_exit_from_thread_ends_process() {
        run(|_| {
            let child = sys_exec(
                task(|_| {
                    let tid = sys_create_thread(task(|_| sys_exit(31)), b"");
                    // Blocked in join when the process goes away
                    sys_thread_join(tid, None);
                    unreachable!("main thread resumed after Exit")
                }),
                b"",
            );
            let mut status = 0;
            assert_eq!(sys_wait_child(child, Some(&mut status)), child);
            assert_eq!(status, 31);
            0
        });
    }

    /// Test a thread blocked in WaitChild is released when its process exits
    #[test]
    fn test_process_exit_releases_blocked_threads() {
        run(|_| {
            let mut gate = PipePair::default();
            assert_eq!(sys_pipe(&mut gate), 0);
            let child = sys_exec(
                task(move |_| {
                    let grandchild = sys_exec(
                        task(move |_| {
                            assert_eq!(sys_close(gate.write), 0);
                            read_to_end(gate.read);
                            0
                        }),
                        b"",
                    );
                    assert_eq!(sys_close(gate.write), 0);
                    sys_create_thread(
                        task(move |_| {
                            sys_wait_child(grandchild, None);
                            unreachable!("waiter resumed after Exit")
                        }),
                        b"",
                    );
                    thread::sleep(Duration::from_millis(20));
                    12
                }),
                b"",
            );
            let mut status = 0;
            assert_eq!(sys_wait_child(child, Some(&mut status)), child);
            assert_eq!(status, 12);

            // The grandchild now belongs to init
            assert_eq!(sys_close(gate.write), 0);
            assert_ne!(sys_wait_child(NOPROC, None), NOPROC);
            assert_eq!(sys_wait_child(NOPROC, None), NOPROC);
            0
        });
    }
}
