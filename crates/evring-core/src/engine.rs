//! Foreign polling engine abstraction.
//!
//! An `EventEngine` owns the native side of a buffer: it creates the buffer
//! object over a map fd, runs the blocking poll primitive, and invokes the
//! registered C callbacks synchronously from inside that poll call.
//!
//! # Implementors
//!
//! - `LibbpfEngine` (feature `libbpf`): thin wrapper over libbpf's
//!   `ring_buffer__*` / `perf_buffer__*` API.
//!
//! - `SoftEngine` (default): in-process engine with bounded producer
//!   queues. Used by tests and the smoke binary; behaves like libbpf at the
//!   callback boundary (same signatures, same ctx token, same return codes).

use libc::{c_int, c_void, size_t};
use nix::errno::Errno;
use std::os::unix::io::RawFd;

/// Ring buffer sample callback, as libbpf's `ring_buffer_sample_fn`.
///
/// A non-zero return aborts the current poll and is propagated as its result.
pub type RingSampleFn = unsafe extern "C" fn(ctx: *mut c_void, data: *mut c_void, size: size_t) -> c_int;

/// Perf buffer sample callback, as libbpf's `perf_buffer_sample_fn`.
pub type PerfSampleFn = unsafe extern "C" fn(ctx: *mut c_void, cpu: c_int, data: *mut c_void, size: u32);

/// Perf buffer lost-records callback, as libbpf's `perf_buffer_lost_fn`.
pub type PerfLostFn = unsafe extern "C" fn(ctx: *mut c_void, cpu: c_int, cnt: u64);

/// Native buffer factory and poll primitive.
///
/// **Contract:**
/// - `ctx` is opaque: the engine stores it and passes it back unchanged on
///   every callback. It is never dereferenced.
/// - Callbacks only run on the thread currently inside `poll()`.
/// - `poll()` waits at most `timeout_ms` for data, then returns the number of
///   records consumed, or a negative errno.
/// - `free()` is called exactly once per buffer, after the last `poll()`.
pub trait EventEngine: Send + Sync + 'static {
    /// Exclusively-owned native buffer handle
    type Buffer: Send + Sync + 'static;

    /// Create a ring buffer consumer over `map_fd`.
    fn ring_buffer_new(
        &self,
        map_fd: RawFd,
        sample: RingSampleFn,
        ctx: *mut c_void,
    ) -> Result<Self::Buffer, Errno>;

    /// Create a perf buffer consumer over `map_fd` with `page_cnt` pages per CPU.
    fn perf_buffer_new(
        &self,
        map_fd: RawFd,
        page_cnt: usize,
        sample: PerfSampleFn,
        lost: PerfLostFn,
        ctx: *mut c_void,
    ) -> Result<Self::Buffer, Errno>;

    /// Block for up to `timeout_ms`, dispatching ready records to callbacks.
    fn poll(&self, buffer: &Self::Buffer, timeout_ms: i32) -> i32;

    /// Release the native buffer.
    fn free(&self, buffer: Self::Buffer);
}

/// Classified result of one foreign poll call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Normal return; the value is the engine's non-negative result
    Ready(u32),
    /// `-EINTR`: retry immediately, never surfaced
    Interrupted,
    /// Any other negative return; ends the poller
    Failed(i32),
}

impl PollOutcome {
    /// Classify a raw poll return code
    #[inline]
    pub fn classify(rc: i32) -> Self {
        if rc >= 0 {
            PollOutcome::Ready(rc as u32)
        } else if rc == -(Errno::EINTR as i32) {
            PollOutcome::Interrupted
        } else {
            PollOutcome::Failed(rc)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(PollOutcome::classify(0), PollOutcome::Ready(0));
        assert_eq!(PollOutcome::classify(17), PollOutcome::Ready(17));
        assert_eq!(PollOutcome::classify(-libc::EINTR), PollOutcome::Interrupted);
        assert_eq!(PollOutcome::classify(-libc::EIO), PollOutcome::Failed(-libc::EIO));
        assert_eq!(PollOutcome::classify(-libc::EBADF), PollOutcome::Failed(-libc::EBADF));
    }
}
