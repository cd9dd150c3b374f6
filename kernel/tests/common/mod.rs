//! Common test utilities for kernel integration tests
//!
//! Each test boots its own kernel and runs its body as the init task; an
//! assertion failing inside any task surfaces as a panic from [`run`].

#![allow(dead_code)]

use std::thread;
use std::time::Duration;

use tinos_kernel::syscalls::*;
use tinos_kernel::{Fid, Kernel, Pid, ProcInfo, task};

/// Boot a kernel with `init` as the init task and return init's exit value
pub fn run<F>(init: F) -> i32
where
    F: Fn(&[u8]) -> i32 + Send + Sync + 'static,
{
    Kernel::boot(task(init), b"").wait()
}

/// Snapshot of the process table taken through the information stream
pub fn proc_infos() -> Vec<ProcInfo> {
    let fid = sys_open_info();
    assert!(fid >= 0, "OpenInfo failed");
    let mut infos = Vec::new();
    let mut buf = [0u8; 512];
    loop {
        let n = sys_read(fid, &mut buf);
        assert!(n >= 0, "info read failed");
        if n == 0 {
            break;
        }
        let (info, _) = ProcInfo::decode(&buf[..n as usize]).expect("decode info record");
        infos.push(info);
    }
    assert_eq!(sys_close(fid), 0);
    infos
}

pub fn info_of(pid: Pid) -> Option<ProcInfo> {
    proc_infos().into_iter().find(|info| info.pid == pid)
}

/// Block until `pid` is a zombie
pub fn wait_for_zombie(pid: Pid) {
    for _ in 0..5_000 {
        if info_of(pid).is_some_and(|info| !info.alive) {
            return;
        }
        thread::sleep(Duration::from_millis(1));
    }
    panic!("process {pid} did not exit");
}

/// Read exactly `buf.len()` bytes or panic
pub fn read_exact(fid: Fid, buf: &mut [u8]) {
    let mut got = 0;
    while got < buf.len() {
        let n = sys_read(fid, &mut buf[got..]);
        assert!(n > 0, "stream ended after {got} of {} bytes", buf.len());
        got += n as usize;
    }
}

/// Write all of `data` or panic
pub fn write_all(fid: Fid, data: &[u8]) {
    assert_eq!(sys_write(fid, data), data.len() as isize);
}

/// Read until end of stream
pub fn read_to_end(fid: Fid) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 64];
    loop {
        let n = sys_read(fid, &mut buf);
        assert!(n >= 0, "read failed");
        if n == 0 {
            return out;
        }
        out.extend_from_slice(&buf[..n as usize]);
    }
}

pub fn read_pid(fid: Fid) -> Pid {
    let mut bytes = [0u8; 4];
    read_exact(fid, &mut bytes);
    Pid::from_le_bytes(bytes)
}

pub fn write_pid(fid: Fid, pid: Pid) {
    write_all(fid, &pid.to_le_bytes());
}
