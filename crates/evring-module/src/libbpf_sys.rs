//! Raw bindings to libbpf's ring buffer and perf buffer consumer API.
//!
//! Mirrors the declarations in `libbpf.h` (libbpf >= 1.0). Only the
//! functions `LibbpfEngine` calls are declared.

#![allow(non_camel_case_types)]

use evring_core::{PerfLostFn, PerfSampleFn, RingSampleFn};
use libc::{c_int, c_long, c_void, size_t};

// ── Opaque handles ──

#[repr(C)]
pub struct ring_buffer {
    _private: [u8; 0],
}

#[repr(C)]
pub struct perf_buffer {
    _private: [u8; 0],
}

// ── Options ──

#[repr(C)]
pub struct ring_buffer_opts {
    pub sz: size_t,
}

#[repr(C)]
pub struct perf_buffer_opts {
    pub sz: size_t,
    pub sample_period: u32,
}

#[link(name = "bpf")]
extern "C" {
    pub fn ring_buffer__new(
        map_fd: c_int,
        sample_cb: RingSampleFn,
        ctx: *mut c_void,
        opts: *const ring_buffer_opts,
    ) -> *mut ring_buffer;

    pub fn ring_buffer__poll(rb: *mut ring_buffer, timeout_ms: c_int) -> c_int;

    pub fn ring_buffer__free(rb: *mut ring_buffer);

    pub fn perf_buffer__new(
        map_fd: c_int,
        page_cnt: size_t,
        sample_cb: PerfSampleFn,
        lost_cb: PerfLostFn,
        ctx: *mut c_void,
        opts: *const perf_buffer_opts,
    ) -> *mut perf_buffer;

    pub fn perf_buffer__poll(pb: *mut perf_buffer, timeout_ms: c_int) -> c_int;

    pub fn perf_buffer__free(pb: *mut perf_buffer);

    /// Legacy error extraction for pointer-returning APIs.
    pub fn libbpf_get_error(ptr: *const c_void) -> c_long;
}
