//! `LibbpfEngine` — `EventEngine` over the system libbpf.
//!
//! Constructors return null and set errno on failure (libbpf 1.0 strict
//! mode); `libbpf_get_error` is consulted too so older libraries that
//! encode the error in the pointer still report the right errno.

use evring_core::{EventEngine, PerfLostFn, PerfSampleFn, RingSampleFn};
use libc::c_void;
use nix::errno::Errno;
use std::os::unix::io::RawFd;
use std::ptr::NonNull;

use crate::libbpf_sys as sys;

/// libbpf-owned consumer object.
pub enum LibbpfBuffer {
    Ring(NonNull<sys::ring_buffer>),
    Perf(NonNull<sys::perf_buffer>),
}

// libbpf buffers may be polled from any thread. The owning EventBuffer never
// polls one from two threads at once and frees it only after the poller exits.
unsafe impl Send for LibbpfBuffer {}
unsafe impl Sync for LibbpfBuffer {}

/// Engine backed by libbpf.
#[derive(Debug, Default)]
pub struct LibbpfEngine;

impl LibbpfEngine {
    pub fn new() -> Self {
        Self
    }
}

fn checked<T>(ptr: *mut T) -> Result<NonNull<T>, Errno> {
    let errno = Errno::last();
    let legacy = unsafe { sys::libbpf_get_error(ptr as *const c_void) };
    if legacy != 0 {
        return Err(Errno::from_raw((-legacy) as i32));
    }
    NonNull::new(ptr).ok_or(errno)
}

impl EventEngine for LibbpfEngine {
    type Buffer = LibbpfBuffer;

    fn ring_buffer_new(
        &self,
        map_fd: RawFd,
        sample: RingSampleFn,
        ctx: *mut c_void,
    ) -> Result<LibbpfBuffer, Errno> {
        Errno::clear();
        let rb = unsafe { sys::ring_buffer__new(map_fd, sample, ctx, std::ptr::null()) };
        checked(rb).map(LibbpfBuffer::Ring)
    }

    fn perf_buffer_new(
        &self,
        map_fd: RawFd,
        page_cnt: usize,
        sample: PerfSampleFn,
        lost: PerfLostFn,
        ctx: *mut c_void,
    ) -> Result<LibbpfBuffer, Errno> {
        Errno::clear();
        let pb = unsafe { sys::perf_buffer__new(map_fd, page_cnt, sample, lost, ctx, std::ptr::null()) };
        checked(pb).map(LibbpfBuffer::Perf)
    }

    fn poll(&self, buffer: &LibbpfBuffer, timeout_ms: i32) -> i32 {
        match buffer {
            LibbpfBuffer::Ring(rb) => unsafe { sys::ring_buffer__poll(rb.as_ptr(), timeout_ms) },
            LibbpfBuffer::Perf(pb) => unsafe { sys::perf_buffer__poll(pb.as_ptr(), timeout_ms) },
        }
    }

    fn free(&self, buffer: LibbpfBuffer) {
        match buffer {
            LibbpfBuffer::Ring(rb) => unsafe { sys::ring_buffer__free(rb.as_ptr()) },
            LibbpfBuffer::Perf(pb) => unsafe { sys::perf_buffer__free(pb.as_ptr()) },
        }
    }
}
