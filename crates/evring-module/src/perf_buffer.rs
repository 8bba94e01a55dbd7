//! `PerfBuffer` — consumer for a perf event array map.
//!
//! Per-CPU pages; besides records, the engine reports how many records the
//! producer dropped before userspace read them. Those counts go to an
//! optional lost channel.

use crossbeam_channel::Receiver;
use evring_core::error::{BufferError, Result};
use evring_core::{BufferKind, EngineConfig, EventEngine};
use std::ops::Deref;
use std::os::unix::io::RawFd;
use std::sync::Arc;

use crate::channel::EventChannel;
use crate::lifecycle::EventBuffer;
use crate::DefaultEngine;

/// Perf buffer bound to one map fd.
pub struct PerfBuffer<E: EventEngine = DefaultEngine> {
    inner: EventBuffer<E>,
    page_cnt: usize,
}

impl<E: EventEngine> PerfBuffer<E> {
    /// Create a perf buffer over `map_fd` with `page_cnt` pages per CPU.
    ///
    /// `page_cnt` must be a power of two. Without a `lost` channel, lost
    /// counts are only tallied in [`EventBuffer::stats`].
    ///
    /// As with [`RingBuffer::new`](crate::RingBuffer::new), `events` and
    /// `lost` serve the first run only. After a restart, fetch the new
    /// receivers with `events()` and [`lost()`](Self::lost).
    pub fn new(
        engine: Arc<E>,
        map_fd: RawFd,
        events: impl Into<EventChannel<Vec<u8>>>,
        lost: Option<EventChannel<u64>>,
        page_cnt: usize,
        config: &EngineConfig,
    ) -> Result<Self> {
        if page_cnt == 0 || !page_cnt.is_power_of_two() {
            return Err(BufferError::invalid_argument(format!(
                "perf buffer page count {} is not a power of two",
                page_cnt
            )));
        }
        let inner = EventBuffer::open(
            engine,
            BufferKind::Perf,
            map_fd,
            page_cnt,
            events.into(),
            lost,
            config,
        )?;
        Ok(Self { inner, page_cnt })
    }

    /// Pages per CPU
    pub fn page_cnt(&self) -> usize {
        self.page_cnt
    }

    /// Receiver for the current run's lost counts, if a lost channel was given.
    pub fn lost(&self) -> Result<Option<Receiver<u64>>> {
        self.inner.lost_receiver()
    }
}

impl<E: EventEngine> Deref for PerfBuffer<E> {
    type Target = EventBuffer<E>;

    fn deref(&self) -> &EventBuffer<E> {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soft_engine::{SoftEngine, SoftMap};
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    fn setup(events_cap: usize, map_cap: usize) -> (Arc<SoftEngine>, SoftMap, PerfBuffer<SoftEngine>) {
        let engine = Arc::new(SoftEngine::new());
        let map = engine.create_map(BufferKind::Perf, map_cap);
        let config = EngineConfig::new().poll_timeout(Duration::from_millis(20));
        let pb = PerfBuffer::new(
            Arc::clone(&engine),
            map.fd(),
            EventChannel::bounded(events_cap),
            Some(EventChannel::bounded(8)),
            8,
            &config,
        )
        .unwrap();
        (engine, map, pb)
    }

    #[test]
    fn test_lost_count_delivered() {
        let (_engine, map, pb) = setup(4, 4);
        let lost = pb.lost().unwrap().unwrap();
        pb.start().unwrap();

        map.report_lost(17);
        assert_eq!(lost.recv_timeout(WAIT).unwrap(), 17);
        assert_eq!(pb.stats().lost, 17);
        pb.stop().unwrap();
    }

    #[test]
    fn test_overflow_becomes_lost_count() {
        let (_engine, map, pb) = setup(16, 2);
        let events = pb.events().unwrap();
        let lost = pb.lost().unwrap().unwrap();

        // Not started: the map holds two records and drops the third
        assert!(map.submit(b"a"));
        assert!(map.submit(b"b"));
        assert!(!map.submit(b"c"));

        pb.start().unwrap();
        assert_eq!(lost.recv_timeout(WAIT).unwrap(), 1);
        assert_eq!(events.recv_timeout(WAIT).unwrap(), b"a".to_vec());
        assert_eq!(events.recv_timeout(WAIT).unwrap(), b"b".to_vec());
        pb.stop().unwrap();
    }

    #[test]
    fn test_stop_drains_both_channels() {
        let (_engine, map, pb) = setup(1, 64);
        pb.start().unwrap();
        for i in 0..40u8 {
            map.submit(&[i]);
        }
        for _ in 0..20 {
            map.report_lost(1);
        }
        std::thread::sleep(Duration::from_millis(30));
        pb.stop().unwrap();
        assert!(pb.is_stopped());

        // Restart reopens the lost channel as well. Counts reported while
        // the first run was blocked may arrive folded into this one.
        pb.start().unwrap();
        let lost = pb.lost().unwrap().unwrap();
        map.report_lost(3);
        assert!(lost.recv_timeout(WAIT).unwrap() >= 3);
        let deadline = std::time::Instant::now() + WAIT;
        while pb.stats().lost < 23 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(pb.stats().lost, 23);
        pb.close();
    }

    #[test]
    fn test_page_count_validation() {
        let engine = Arc::new(SoftEngine::new());
        let map = engine.create_map(BufferKind::Perf, 4);
        let config = EngineConfig::new();

        for bad in [0usize, 3, 12] {
            let err = PerfBuffer::new(
                Arc::clone(&engine),
                map.fd(),
                EventChannel::bounded(1),
                None,
                bad,
                &config,
            )
            .err();
            assert!(matches!(err, Some(BufferError::InvalidArgument(_))));
        }
    }

    #[test]
    fn test_without_lost_channel() {
        let engine = Arc::new(SoftEngine::new());
        let map = engine.create_map(BufferKind::Perf, 4);
        let config = EngineConfig::new().poll_timeout(Duration::from_millis(20));
        let pb = PerfBuffer::new(Arc::clone(&engine), map.fd(), EventChannel::bounded(4), None, 4, &config).unwrap();
        assert!(pb.lost().unwrap().is_none());

        let events = pb.events().unwrap();
        pb.start().unwrap();
        map.report_lost(5);
        map.submit(b"x");
        assert_eq!(events.recv_timeout(WAIT).unwrap(), b"x".to_vec());
        assert_eq!(pb.stats().lost, 5);
        pb.stop().unwrap();
    }
}
