//! `Module` — owner of a set of named maps and the buffers built on them.
//!
//! Buffers are created by map name and handed out as `Arc`s; the module
//! keeps its own reference so `close()` (or drop) can shut every child
//! down. Perf buffers close before ring buffers.

use evring_core::error::{BufferError, Result};
use evring_core::{EngineConfig, EventEngine};
use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::Arc;

use crate::channel::EventChannel;
use crate::perf_buffer::PerfBuffer;
use crate::ring_buffer::RingBuffer;
use crate::DefaultEngine;

pub struct Module<E: EventEngine = DefaultEngine> {
    engine: Arc<E>,
    config: EngineConfig,
    maps: HashMap<String, RawFd>,
    ring_bufs: Vec<Arc<RingBuffer<E>>>,
    perf_bufs: Vec<Arc<PerfBuffer<E>>>,
    closed: bool,
}

impl<E: EventEngine> Module<E> {
    /// Create an empty module. Fails if `config` does not validate.
    pub fn new(engine: Arc<E>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            engine,
            config,
            maps: HashMap::new(),
            ring_bufs: Vec::new(),
            perf_bufs: Vec::new(),
            closed: false,
        })
    }

    /// Module using `EngineConfig::from_env()`.
    pub fn from_env(engine: Arc<E>) -> Result<Self> {
        Self::new(engine, EngineConfig::from_env())
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Make `fd` available under `name`. Re-registering replaces the fd.
    pub fn register_map(&mut self, name: impl Into<String>, fd: RawFd) {
        let name = name.into();
        if let Some(old) = self.maps.insert(name.clone(), fd) {
            tracing::debug!(map = %name, old, fd, "map re-registered");
        }
    }

    pub fn map_fd(&self, name: &str) -> Result<RawFd> {
        self.maps
            .get(name)
            .copied()
            .ok_or_else(|| BufferError::invalid_argument(format!("unknown map {:?}", name)))
    }

    /// Create a ring buffer over the map registered as `name`.
    pub fn init_ring_buf(
        &mut self,
        name: &str,
        events: impl Into<EventChannel<Vec<u8>>>,
    ) -> Result<Arc<RingBuffer<E>>> {
        self.ensure_open()?;
        let fd = self.map_fd(name)?;
        let rb = Arc::new(RingBuffer::new(Arc::clone(&self.engine), fd, events, &self.config)?);
        tracing::info!(map = name, fd, slot = %rb.slot(), "ring buffer initialized");
        self.ring_bufs.push(Arc::clone(&rb));
        Ok(rb)
    }

    /// Create a perf buffer over the map registered as `name`.
    ///
    /// `page_cnt` defaults to the configured perf page count.
    pub fn init_perf_buf(
        &mut self,
        name: &str,
        events: impl Into<EventChannel<Vec<u8>>>,
        lost: Option<EventChannel<u64>>,
        page_cnt: Option<usize>,
    ) -> Result<Arc<PerfBuffer<E>>> {
        self.ensure_open()?;
        let fd = self.map_fd(name)?;
        let page_cnt = page_cnt.unwrap_or(self.config.perf_pages);
        let pb = Arc::new(PerfBuffer::new(
            Arc::clone(&self.engine),
            fd,
            events,
            lost,
            page_cnt,
            &self.config,
        )?);
        tracing::info!(map = name, fd, page_cnt, slot = %pb.slot(), "perf buffer initialized");
        self.perf_bufs.push(Arc::clone(&pb));
        Ok(pb)
    }

    /// Buffers created so far, ring then perf
    pub fn buffer_count(&self) -> (usize, usize) {
        (self.ring_bufs.len(), self.perf_bufs.len())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(BufferError::Closed)
        } else {
            Ok(())
        }
    }

    /// Close every buffer this module created. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        for pb in self.perf_bufs.drain(..) {
            pb.close();
        }
        for rb in self.ring_bufs.drain(..) {
            rb.close();
        }
        self.closed = true;
        tracing::debug!("module closed");
    }
}

impl<E: EventEngine> Drop for Module<E> {
    fn drop(&mut self) {
        self.close();
    }
}
