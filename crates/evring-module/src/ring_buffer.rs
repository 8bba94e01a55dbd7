//! `RingBuffer` — consumer for a BPF ring buffer map.
//!
//! One shared ring, records of producer-chosen length, no lost-count
//! reporting (the producer sees reservation failures instead).

use evring_core::error::Result;
use evring_core::{BufferKind, EngineConfig, EventEngine};
use std::ops::Deref;
use std::os::unix::io::RawFd;
use std::sync::Arc;

use crate::channel::EventChannel;
use crate::lifecycle::EventBuffer;
use crate::DefaultEngine;

/// Ring buffer bound to one map fd.
///
/// Lifecycle operations (`start`, `stop`, `close`, `events`, ...) come from
/// [`EventBuffer`] through `Deref`.
pub struct RingBuffer<E: EventEngine = DefaultEngine> {
    inner: EventBuffer<E>,
}

impl<E: EventEngine> RingBuffer<E> {
    /// Create a ring buffer over `map_fd` delivering into `events`.
    ///
    /// `events` only serves the first run. `stop()` closes it, and a later
    /// `start()` delivers on a fresh channel of the same capacity; a caller
    /// that passed its own sender/receiver pair must call `events()` again
    /// after restarting.
    ///
    /// ```rust,ignore
    /// let rb = RingBuffer::new(engine, map_fd, EventChannel::bounded(1024), &config)?;
    /// let events = rb.events()?;
    /// rb.start()?;
    /// for record in events.iter() { /* ... */ }
    /// ```
    pub fn new(
        engine: Arc<E>,
        map_fd: RawFd,
        events: impl Into<EventChannel<Vec<u8>>>,
        config: &EngineConfig,
    ) -> Result<Self> {
        let inner = EventBuffer::open(engine, BufferKind::Ring, map_fd, 0, events.into(), None, config)?;
        Ok(Self { inner })
    }
}

impl<E: EventEngine> Deref for RingBuffer<E> {
    type Target = EventBuffer<E>;

    fn deref(&self) -> &EventBuffer<E> {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soft_engine::SoftEngine;
    use evring_core::BufferState;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    fn setup(cap: usize) -> (Arc<SoftEngine>, crate::soft_engine::SoftMap, RingBuffer<SoftEngine>) {
        let engine = Arc::new(SoftEngine::new());
        let map = engine.create_map(BufferKind::Ring, 128);
        let config = EngineConfig::new().poll_timeout(Duration::from_millis(20));
        let rb = RingBuffer::new(Arc::clone(&engine), map.fd(), EventChannel::bounded(cap), &config).unwrap();
        (engine, map, rb)
    }

    #[test]
    fn test_records_arrive_in_order() {
        let (_engine, map, rb) = setup(16);
        let events = rb.events().unwrap();

        map.submit(b"R1");
        map.submit(b"R2");
        map.submit(b"R3");
        rb.start().unwrap();

        let got: Vec<Vec<u8>> = (0..3).map(|_| events.recv_timeout(WAIT).unwrap()).collect();
        assert_eq!(got, vec![b"R1".to_vec(), b"R2".to_vec(), b"R3".to_vec()]);

        rb.stop().unwrap();
        // Channel is closed once stopped
        assert!(events.recv_timeout(WAIT).is_err());
    }

    #[test]
    fn test_ordering_with_slow_consumer() {
        let (_engine, map, rb) = setup(2);
        let events = rb.events().unwrap();
        rb.start().unwrap();

        for i in 0..64u32 {
            assert!(map.submit(&i.to_le_bytes()));
        }
        for i in 0..64u32 {
            let record = events.recv_timeout(WAIT).unwrap();
            assert_eq!(record, i.to_le_bytes().to_vec());
        }
        rb.stop().unwrap();
    }

    #[test]
    fn test_restart_delivers_on_new_channel() {
        let (_engine, map, rb) = setup(4);

        let first = rb.events().unwrap();
        rb.start().unwrap();
        map.submit(b"first");
        assert_eq!(first.recv_timeout(WAIT).unwrap(), b"first".to_vec());
        rb.stop().unwrap();
        assert!(first.recv_timeout(WAIT).is_err());

        rb.start().unwrap();
        let second = rb.events().unwrap();
        map.submit(b"second");
        assert_eq!(second.recv_timeout(WAIT).unwrap(), b"second".to_vec());
        rb.stop().unwrap();

        assert_eq!(rb.state(), BufferState::Stopped);
        assert_eq!(rb.stats().records, 2);
    }

    #[test]
    fn test_caller_supplied_pair() {
        let engine = Arc::new(SoftEngine::new());
        let map = engine.create_map(BufferKind::Ring, 8);
        let (tx, rx) = crossbeam_channel::bounded(8);
        let config = EngineConfig::new().poll_timeout(Duration::from_millis(20));
        let rb = RingBuffer::new(engine, map.fd(), (tx, rx.clone()), &config).unwrap();

        rb.start().unwrap();
        map.submit(&[1, 2, 3]);
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), vec![1, 2, 3]);
        rb.close();
        assert_eq!(rb.state(), BufferState::Closed);
    }

    #[test]
    fn test_ring_on_perf_map_fails() {
        let engine = Arc::new(SoftEngine::new());
        let map = engine.create_map(BufferKind::Perf, 8);
        let config = EngineConfig::new();
        let err = RingBuffer::new(engine, map.fd(), EventChannel::bounded(1), &config).err();
        assert!(matches!(
            err,
            Some(evring_core::BufferError::ForeignAllocationFailed { kind: BufferKind::Ring, .. })
        ));
    }
}
