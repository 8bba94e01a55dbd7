//! Owned native buffer handle.
//!
//! Wraps the engine's buffer so it is freed exactly once, when the last
//! reference goes away. The poller thread holds one reference while it runs;
//! the owning `EventBuffer` holds the other and drops it on close, after the
//! poller has been joined.

use evring_core::{BufferKind, EventEngine};
use std::sync::Arc;

pub(crate) struct NativeBuffer<E: EventEngine> {
    engine: Arc<E>,
    buffer: Option<E::Buffer>,
    kind: BufferKind,
}

impl<E: EventEngine> NativeBuffer<E> {
    pub(crate) fn new(engine: Arc<E>, buffer: E::Buffer, kind: BufferKind) -> Self {
        Self {
            engine,
            buffer: Some(buffer),
            kind,
        }
    }

    #[inline]
    pub(crate) fn kind(&self) -> BufferKind {
        self.kind
    }

    /// One bounded foreign poll call.
    #[inline]
    pub(crate) fn poll(&self, timeout_ms: i32) -> i32 {
        match &self.buffer {
            Some(buffer) => self.engine.poll(buffer, timeout_ms),
            None => -libc::EBADF,
        }
    }
}

impl<E: EventEngine> Drop for NativeBuffer<E> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.engine.free(buffer);
            tracing::debug!(kind = %self.kind, "native buffer freed");
        }
    }
}
