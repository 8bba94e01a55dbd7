//! `SoftEngine` — in-process `EventEngine`.
//!
//! Each map is a bounded lock-free queue of records fed by [`SoftMap::submit`].
//! Polling waits on a condvar until work arrives or the timeout passes, then
//! dispatches through the registered C callbacks on the polling thread, the
//! same way libbpf does. A full perf map counts the record as lost; a full
//! ring map rejects it, like a failed reservation.
//!
//! Test hooks: [`SoftMap::report_lost`] and [`SoftMap::inject_poll_error`].

use crossbeam_queue::ArrayQueue;
use evring_core::{BufferKind, EventEngine, PerfLostFn, PerfSampleFn, RingSampleFn};
use libc::c_void;
use nix::errno::Errno;
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Synthetic fds start here so they never collide with small real ones.
const FIRST_SOFT_FD: RawFd = 1000;

struct SoftMapInner {
    kind: BufferKind,
    queue: ArrayQueue<Vec<u8>>,
    lost: AtomicU64,
    pending_error: AtomicI32,
    lock: Mutex<()>,
    ready: Condvar,
}

impl SoftMapInner {
    fn has_work(&self) -> bool {
        !self.queue.is_empty()
            || self.lost.load(Ordering::Acquire) > 0
            || self.pending_error.load(Ordering::Acquire) != 0
    }

    fn wake(&self) {
        let _guard = self.lock.lock();
        self.ready.notify_all();
    }
}

/// Producer handle for one soft map.
#[derive(Clone)]
pub struct SoftMap {
    fd: RawFd,
    inner: Arc<SoftMapInner>,
}

impl SoftMap {
    /// Descriptor to pass to the buffer constructors
    #[inline]
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    #[inline]
    pub fn kind(&self) -> BufferKind {
        self.inner.kind
    }

    /// Publish one record. Returns false when the map is full.
    pub fn submit(&self, record: &[u8]) -> bool {
        let accepted = self.inner.queue.push(record.to_vec()).is_ok();
        if !accepted && self.inner.kind == BufferKind::Perf {
            self.inner.lost.fetch_add(1, Ordering::AcqRel);
        }
        self.inner.wake();
        accepted
    }

    /// Report `count` records dropped by the producer (perf maps).
    pub fn report_lost(&self, count: u64) {
        self.inner.lost.fetch_add(count, Ordering::AcqRel);
        self.inner.wake();
    }

    /// Make the next poll return `-errno`.
    pub fn inject_poll_error(&self, errno: i32) {
        self.inner.pending_error.store(errno, Ordering::Release);
        self.inner.wake();
    }

    /// Records waiting to be polled
    pub fn pending(&self) -> usize {
        self.inner.queue.len()
    }
}

#[derive(Clone, Copy)]
enum Callbacks {
    Ring(RingSampleFn),
    Perf { sample: PerfSampleFn, lost: PerfLostFn },
}

/// Native buffer of the soft engine.
pub struct SoftBuffer {
    map: Arc<SoftMapInner>,
    callbacks: Callbacks,
    // Opaque; only ever handed back to the callbacks.
    ctx: usize,
}

/// In-process engine with bounded soft maps.
pub struct SoftEngine {
    maps: RwLock<HashMap<RawFd, Arc<SoftMapInner>>>,
    next_fd: AtomicI32,
}

impl SoftEngine {
    pub fn new() -> Self {
        Self {
            maps: RwLock::new(HashMap::new()),
            next_fd: AtomicI32::new(FIRST_SOFT_FD),
        }
    }

    /// Create a map holding at most `capacity` unpolled records.
    pub fn create_map(&self, kind: BufferKind, capacity: usize) -> SoftMap {
        let fd = self.next_fd.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::new(SoftMapInner {
            kind,
            queue: ArrayQueue::new(capacity.max(1)),
            lost: AtomicU64::new(0),
            pending_error: AtomicI32::new(0),
            lock: Mutex::new(()),
            ready: Condvar::new(),
        });
        self.maps.write().insert(fd, Arc::clone(&inner));
        tracing::trace!(fd, %kind, capacity, "soft map created");
        SoftMap { fd, inner }
    }

    fn map_for(&self, map_fd: RawFd, kind: BufferKind) -> Result<Arc<SoftMapInner>, Errno> {
        let map = self.maps.read().get(&map_fd).cloned().ok_or(Errno::EBADF)?;
        if map.kind != kind {
            return Err(Errno::EINVAL);
        }
        Ok(map)
    }
}

impl Default for SoftEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EventEngine for SoftEngine {
    type Buffer = SoftBuffer;

    fn ring_buffer_new(
        &self,
        map_fd: RawFd,
        sample: RingSampleFn,
        ctx: *mut c_void,
    ) -> Result<SoftBuffer, Errno> {
        let map = self.map_for(map_fd, BufferKind::Ring)?;
        Ok(SoftBuffer {
            map,
            callbacks: Callbacks::Ring(sample),
            ctx: ctx as usize,
        })
    }

    fn perf_buffer_new(
        &self,
        map_fd: RawFd,
        page_cnt: usize,
        sample: PerfSampleFn,
        lost: PerfLostFn,
        ctx: *mut c_void,
    ) -> Result<SoftBuffer, Errno> {
        if page_cnt == 0 || !page_cnt.is_power_of_two() {
            return Err(Errno::EINVAL);
        }
        let map = self.map_for(map_fd, BufferKind::Perf)?;
        Ok(SoftBuffer {
            map,
            callbacks: Callbacks::Perf { sample, lost },
            ctx: ctx as usize,
        })
    }

    fn poll(&self, buffer: &SoftBuffer, timeout_ms: i32) -> i32 {
        let map = &buffer.map;

        if !map.has_work() {
            let mut guard = map.lock.lock();
            if timeout_ms < 0 {
                while !map.has_work() {
                    map.ready.wait(&mut guard);
                }
            } else {
                let deadline = Instant::now() + Duration::from_millis(timeout_ms as u64);
                while !map.has_work() {
                    if map.ready.wait_until(&mut guard, deadline).timed_out() {
                        break;
                    }
                }
            }
        }

        let err = map.pending_error.swap(0, Ordering::AcqRel);
        if err != 0 {
            return -err;
        }

        let ctx = buffer.ctx as *mut c_void;
        let mut consumed = 0i32;
        match buffer.callbacks {
            Callbacks::Ring(sample) => {
                while let Some(mut record) = map.queue.pop() {
                    let rc = unsafe { sample(ctx, record.as_mut_ptr() as *mut c_void, record.len()) };
                    consumed += 1;
                    if rc != 0 {
                        return rc;
                    }
                }
            }
            Callbacks::Perf { sample, lost } => {
                let dropped = map.lost.swap(0, Ordering::AcqRel);
                if dropped > 0 {
                    unsafe { lost(ctx, 0, dropped) };
                }
                while let Some(mut record) = map.queue.pop() {
                    unsafe { sample(ctx, 0, record.as_mut_ptr() as *mut c_void, record.len() as u32) };
                    consumed += 1;
                }
            }
        }
        consumed
    }

    fn free(&self, buffer: SoftBuffer) {
        drop(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libc::{c_int, size_t};
    use std::sync::Mutex as StdMutex;

    // Callbacks write into a per-test Vec passed through ctx.
    unsafe extern "C" fn collect_ring(ctx: *mut c_void, data: *mut c_void, size: size_t) -> c_int {
        let out = &*(ctx as *const StdMutex<Vec<Vec<u8>>>);
        out.lock().unwrap().push(std::slice::from_raw_parts(data as *const u8, size).to_vec());
        0
    }

    unsafe extern "C" fn abort_ring(_ctx: *mut c_void, _data: *mut c_void, _size: size_t) -> c_int {
        -7
    }

    unsafe extern "C" fn collect_perf(ctx: *mut c_void, _cpu: c_int, data: *mut c_void, size: u32) {
        let out = &*(ctx as *const StdMutex<Vec<Vec<u8>>>);
        out.lock().unwrap().push(std::slice::from_raw_parts(data as *const u8, size as usize).to_vec());
    }

    unsafe extern "C" fn count_lost(ctx: *mut c_void, _cpu: c_int, cnt: u64) {
        let out = &*(ctx as *const StdMutex<Vec<Vec<u8>>>);
        out.lock().unwrap().push(cnt.to_le_bytes().to_vec());
    }

    fn sink() -> Box<StdMutex<Vec<Vec<u8>>>> {
        Box::new(StdMutex::new(Vec::new()))
    }

    fn ctx_of(sink: &StdMutex<Vec<Vec<u8>>>) -> *mut c_void {
        sink as *const _ as *mut c_void
    }

    #[test]
    fn test_ring_poll_dispatches_in_order() {
        let engine = SoftEngine::new();
        let map = engine.create_map(BufferKind::Ring, 8);
        let out = sink();
        let buffer = engine.ring_buffer_new(map.fd(), collect_ring, ctx_of(&out)).unwrap();

        map.submit(b"one");
        map.submit(b"two");
        assert_eq!(engine.poll(&buffer, 10), 2);
        assert_eq!(*out.lock().unwrap(), vec![b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(map.pending(), 0);
        engine.free(buffer);
    }

    #[test]
    fn test_poll_times_out_empty() {
        let engine = SoftEngine::new();
        let map = engine.create_map(BufferKind::Ring, 8);
        let out = sink();
        let buffer = engine.ring_buffer_new(map.fd(), collect_ring, ctx_of(&out)).unwrap();

        let begin = Instant::now();
        assert_eq!(engine.poll(&buffer, 20), 0);
        assert!(begin.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_submit_wakes_waiting_poll() {
        let engine = Arc::new(SoftEngine::new());
        let map = engine.create_map(BufferKind::Ring, 8);
        let out = sink();
        let buffer = engine.ring_buffer_new(map.fd(), collect_ring, ctx_of(&out)).unwrap();

        let producer = map.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.submit(b"late");
        });
        assert_eq!(engine.poll(&buffer, 5_000), 1);
        handle.join().unwrap();
    }

    #[test]
    fn test_ring_callback_abort_propagates() {
        let engine = SoftEngine::new();
        let map = engine.create_map(BufferKind::Ring, 8);
        let buffer = engine.ring_buffer_new(map.fd(), abort_ring, std::ptr::null_mut()).unwrap();

        map.submit(b"a");
        map.submit(b"b");
        assert_eq!(engine.poll(&buffer, 10), -7);
        assert_eq!(map.pending(), 1);
    }

    #[test]
    fn test_perf_full_map_counts_lost() {
        let engine = SoftEngine::new();
        let map = engine.create_map(BufferKind::Perf, 1);
        let out = sink();
        let buffer = engine
            .perf_buffer_new(map.fd(), 4, collect_perf, count_lost, ctx_of(&out))
            .unwrap();

        assert!(map.submit(b"kept"));
        assert!(!map.submit(b"dropped"));
        map.report_lost(2);

        assert_eq!(engine.poll(&buffer, 10), 1);
        let got = out.lock().unwrap();
        assert_eq!(got[0], 3u64.to_le_bytes().to_vec());
        assert_eq!(got[1], b"kept".to_vec());
    }

    #[test]
    fn test_ring_full_map_rejects() {
        let engine = SoftEngine::new();
        let map = engine.create_map(BufferKind::Ring, 1);
        assert!(map.submit(b"a"));
        assert!(!map.submit(b"b"));
        assert_eq!(map.pending(), 1);
    }

    #[test]
    fn test_injected_error_is_one_shot() {
        let engine = SoftEngine::new();
        let map = engine.create_map(BufferKind::Ring, 8);
        let out = sink();
        let buffer = engine.ring_buffer_new(map.fd(), collect_ring, ctx_of(&out)).unwrap();

        map.inject_poll_error(libc::EINTR);
        assert_eq!(engine.poll(&buffer, 10), -libc::EINTR);
        assert_eq!(engine.poll(&buffer, 10), 0);
    }

    #[test]
    fn test_constructor_errors() {
        let engine = SoftEngine::new();
        let ring = engine.create_map(BufferKind::Ring, 1);
        let perf = engine.create_map(BufferKind::Perf, 1);

        assert_eq!(
            engine.ring_buffer_new(-5, collect_ring, std::ptr::null_mut()).err(),
            Some(Errno::EBADF)
        );
        assert_eq!(
            engine.ring_buffer_new(perf.fd(), collect_ring, std::ptr::null_mut()).err(),
            Some(Errno::EINVAL)
        );
        assert_eq!(
            engine
                .perf_buffer_new(ring.fd(), 4, collect_perf, count_lost, std::ptr::null_mut())
                .err(),
            Some(Errno::EINVAL)
        );
        assert_eq!(
            engine
                .perf_buffer_new(perf.fd(), 3, collect_perf, count_lost, std::ptr::null_mut())
                .err(),
            Some(Errno::EINVAL)
        );
    }
}
