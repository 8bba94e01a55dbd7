//! Destination channels supplied by the caller.
//!
//! A buffer needs both ends of each channel: the sender for the callback
//! bridge and a receiver for draining during stop. `EventChannel` carries
//! the pair; callers keep their own receiver clone, or fetch one later via
//! `events()` / `lost()` on the buffer.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

/// Sender/receiver pair handed to a buffer at init.
pub struct EventChannel<T> {
    pub(crate) tx: Sender<T>,
    pub(crate) rx: Receiver<T>,
}

impl<T> EventChannel<T> {
    /// Channel holding at most `cap` undelivered items.
    ///
    /// When full, the callback blocks and backpressure reaches the engine.
    pub fn bounded(cap: usize) -> Self {
        let (tx, rx) = bounded(cap);
        Self { tx, rx }
    }

    /// Channel without a bound. Backpressure never reaches the engine.
    pub fn unbounded() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// A receiver for this channel
    pub fn receiver(&self) -> Receiver<T> {
        self.rx.clone()
    }

    /// A fresh channel with the same bound as `rx`.
    pub(crate) fn like(rx: &Receiver<T>) -> Self {
        match rx.capacity() {
            Some(cap) => Self::bounded(cap),
            None => Self::unbounded(),
        }
    }
}

impl<T> From<(Sender<T>, Receiver<T>)> for EventChannel<T> {
    fn from((tx, rx): (Sender<T>, Receiver<T>)) -> Self {
        Self { tx, rx }
    }
}

/// Receivers for the current run of a buffer.
pub(crate) struct Receivers {
    pub(crate) events: Receiver<Vec<u8>>,
    pub(crate) lost: Option<Receiver<u64>>,
}
