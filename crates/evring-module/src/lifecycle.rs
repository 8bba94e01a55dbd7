//! `EventBuffer` — lifecycle controller shared by ring and perf buffers.
//!
//! Owns one native buffer, one slot, the output channels and the state
//! machine. Every transition happens under one mutex (`control`); the
//! current state is mirrored in an atomic so queries never block.
//!
//! Stop ordering is load-bearing:
//!
//! 1. cancel the poller
//! 2. start draining the channels
//! 3. join the poller
//! 4. close the channels, then end the drain
//!
//! Draining after the join instead of before it deadlocks when the channel
//! is full, nobody reads it, and the poller is blocked in a callback send.
//!
//! Close frees the native buffer before the slot, and only once no poller
//! can call back into that slot.

use crossbeam_channel::Receiver;
use evring_core::error::{BufferError, Result};
use evring_core::{BufferKind, BufferState, EngineConfig, EventEngine, SlotId};
use parking_lot::Mutex;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::bridge::{self, event_slots, BufferStats, Delivery, Outputs};
use crate::channel::{EventChannel, Receivers};
use crate::drain::{drain_inline, Drainer};
use crate::native::NativeBuffer;
use crate::poller::Poller;

/// Transition-guarded part of a buffer.
struct Control<E: EventEngine> {
    native: Option<Arc<NativeBuffer<E>>>,
    poller: Option<Poller>,
    receivers: Receivers,
}

/// One ring or perf buffer and its lifecycle.
pub struct EventBuffer<E: EventEngine> {
    kind: BufferKind,
    map_fd: RawFd,
    slot: SlotId,
    delivery: Arc<Delivery>,
    state: AtomicU8,
    control: Mutex<Control<E>>,
    config: EngineConfig,
}

impl<E: EventEngine> EventBuffer<E> {
    /// Register a slot and create the native buffer.
    ///
    /// On engine failure the slot is released before returning.
    pub(crate) fn open(
        engine: Arc<E>,
        kind: BufferKind,
        map_fd: RawFd,
        page_cnt: usize,
        events: EventChannel<Vec<u8>>,
        lost: Option<EventChannel<u64>>,
        config: &EngineConfig,
    ) -> Result<Self> {
        if map_fd < 0 {
            return Err(BufferError::invalid_argument(format!(
                "{} buffer map fd {} is not a valid descriptor",
                kind, map_fd
            )));
        }

        let receivers = Receivers {
            events: events.rx,
            lost: lost.as_ref().map(|ch| ch.rx.clone()),
        };
        let delivery = Arc::new(Delivery::new(kind));
        delivery.arm(Outputs {
            events: events.tx,
            lost: lost.map(|ch| ch.tx),
        });

        let slot = event_slots().allocate(Arc::clone(&delivery))?;
        let created = match kind {
            BufferKind::Ring => engine.ring_buffer_new(map_fd, bridge::ring_sample_cb, slot.as_token()),
            BufferKind::Perf => engine.perf_buffer_new(
                map_fd,
                page_cnt,
                bridge::perf_sample_cb,
                bridge::perf_lost_cb,
                slot.as_token(),
            ),
        };

        let buffer = match created {
            Ok(buffer) => buffer,
            Err(errno) => {
                event_slots().free(slot);
                tracing::warn!(%kind, map_fd, %errno, "failed to initialize buffer");
                return Err(BufferError::ForeignAllocationFailed {
                    kind,
                    map_fd,
                    errno: errno as i32,
                });
            }
        };

        tracing::debug!(%kind, map_fd, %slot, "buffer created");
        Ok(Self {
            kind,
            map_fd,
            slot,
            delivery,
            state: AtomicU8::new(BufferState::Created.into()),
            control: Mutex::new(Control {
                native: Some(Arc::new(NativeBuffer::new(engine, buffer, kind))),
                poller: None,
                receivers,
            }),
            config: config.clone(),
        })
    }

    #[inline]
    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    #[inline]
    pub fn map_fd(&self) -> RawFd {
        self.map_fd
    }

    /// Slot this buffer occupies in the process-wide table
    #[inline]
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    #[inline]
    pub fn state(&self) -> BufferState {
        BufferState::from(self.state.load(Ordering::Acquire))
    }

    #[inline]
    fn set_state(&self, state: BufferState) {
        self.state.store(state.into(), Ordering::Release);
    }

    /// True unless a poller is actively running.
    ///
    /// A buffer whose poller exited on a poll failure reports stopped even
    /// though `stop()` has not been called yet.
    pub fn is_stopped(&self) -> bool {
        self.state() != BufferState::Started || !self.delivery.is_polling()
    }

    /// Start polling.
    ///
    /// Starting a running buffer is a no-op. A stopped buffer gets fresh
    /// output channels, since stop closed the previous ones. A buffer whose
    /// poller died on a poll failure is stopped first, then restarted.
    pub fn start(&self) -> Result<()> {
        let mut control = self.control.lock();
        match self.state() {
            BufferState::Closed => return Err(BufferError::Closed),
            BufferState::Started if self.delivery.is_polling() => {
                tracing::debug!(slot = %self.slot, "start on running buffer ignored");
                return Ok(());
            }
            BufferState::Started => {
                tracing::info!(slot = %self.slot, "restarting buffer after poll failure");
                self.stop_locked(&mut control);
            }
            _ => {}
        }

        if !self.delivery.is_armed() {
            self.reopen_channels(&mut control);
        }

        let native = match &control.native {
            Some(native) => Arc::clone(native),
            None => return Err(BufferError::Closed),
        };
        let poller = Poller::spawn(
            native,
            Arc::clone(&self.delivery),
            self.slot,
            self.config.poll_timeout_ms(),
        )?;

        control.poller = Some(poller);
        self.set_state(BufferState::Started);
        Ok(())
    }

    /// Stop polling, drain, and close the output channels.
    ///
    /// Idempotent. Returns within one poll timeout plus drain time, whether
    /// or not anyone is reading the channels.
    pub fn stop(&self) -> Result<()> {
        let mut control = self.control.lock();
        match self.state() {
            BufferState::Closed => Err(BufferError::Closed),
            BufferState::Started => {
                self.stop_locked(&mut control);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn stop_locked(&self, control: &mut Control<E>) {
        let poller = match control.poller.take() {
            Some(poller) => poller,
            None => {
                self.set_state(BufferState::Stopped);
                return;
            }
        };
        self.set_state(BufferState::Stopping);

        // 1. Signal the loop; an in-flight poll still runs to completion.
        poller.cancel();

        // 2. Drain before waiting, or a blocked callback never returns.
        let drainer = if self.config.drain_thread {
            match Drainer::spawn(self.slot, &control.receivers) {
                Ok(drainer) => Some(drainer),
                Err(e) => {
                    tracing::warn!(slot = %self.slot, error = %e, "drain thread unavailable; draining inline");
                    None
                }
            }
        } else {
            None
        };
        if drainer.is_none() {
            drain_inline(&control.receivers, || poller.is_finished());
        }

        // 3. Wait for the loop to exit.
        let outcome = poller.join();

        // 4. Close the channels; this also ends the drain.
        self.delivery.disarm();
        let discarded = drainer.map(Drainer::finish).unwrap_or(0);

        match outcome {
            Ok(()) => tracing::debug!(slot = %self.slot, discarded, "buffer stopped"),
            Err(e) => tracing::warn!(slot = %self.slot, error = %e, "buffer stopped after poll failure"),
        }
        self.set_state(BufferState::Stopped);
    }

    fn reopen_channels(&self, control: &mut Control<E>) {
        let events = EventChannel::like(&control.receivers.events);
        let lost = control.receivers.lost.as_ref().map(EventChannel::like);

        control.receivers = Receivers {
            events: events.receiver(),
            lost: lost.as_ref().map(EventChannel::receiver),
        };
        self.delivery.arm(Outputs {
            events: events.tx,
            lost: lost.map(|ch| ch.tx),
        });
    }

    /// Stop if needed, then release the native buffer and the slot.
    ///
    /// Idempotent; only the first call does anything.
    pub fn close(&self) {
        let mut control = self.control.lock();
        if self.state().is_closed() {
            return;
        }
        if self.state() == BufferState::Started {
            self.stop_locked(&mut control);
        }

        if let Some(native) = control.native.take() {
            debug_assert_eq!(Arc::strong_count(&native), 1, "poller still holds the native buffer");
            drop(native);
        }
        self.delivery.disarm();
        event_slots().free(self.slot);

        self.set_state(BufferState::Closed);
        tracing::debug!(kind = %self.kind, slot = %self.slot, "buffer closed");
    }

    /// Receiver for the current run's records.
    ///
    /// After a stop this is the closed channel until the next start.
    pub fn events(&self) -> Result<Receiver<Vec<u8>>> {
        let control = self.control.lock();
        if self.state().is_closed() {
            return Err(BufferError::Closed);
        }
        Ok(control.receivers.events.clone())
    }

    pub(crate) fn lost_receiver(&self) -> Result<Option<Receiver<u64>>> {
        let control = self.control.lock();
        if self.state().is_closed() {
            return Err(BufferError::Closed);
        }
        Ok(control.receivers.lost.clone())
    }

    /// Delivery counters since creation
    pub fn stats(&self) -> BufferStats {
        self.delivery.stats()
    }

    /// The error that ended the most recent poller run, if it failed.
    pub fn last_poll_error(&self) -> Option<BufferError> {
        self.delivery.last_error()
    }
}

impl<E: EventEngine> Drop for EventBuffer<E> {
    fn drop(&mut self) {
        self.close();
    }
}
