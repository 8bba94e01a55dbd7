//! Shutdown drain.
//!
//! While stop waits for the poller, something must keep emptying the output
//! channels: the poller may be blocked inside a callback on a full channel
//! whose consumer is gone. Records drained here are discarded.
//!
//! The drainer exits when a channel disconnects or when `finish()` is
//! called, whichever comes first, so a caller that kept its own sender clone
//! cannot wedge stop.

use crossbeam_channel::{never, select, Receiver, Sender};
use evring_core::SlotId;
use std::thread;
use std::time::Duration;

use crate::channel::Receivers;

/// Background drain thread for one stop.
pub(crate) struct Drainer {
    done: Sender<()>,
    handle: thread::JoinHandle<u64>,
}

impl Drainer {
    /// Start discarding from `receivers` on a new thread.
    pub(crate) fn spawn(slot: SlotId, receivers: &Receivers) -> std::io::Result<Self> {
        let (done, done_rx) = crossbeam_channel::bounded::<()>(0);
        let events = receivers.events.clone();
        let lost = receivers.lost.clone();

        let handle = thread::Builder::new()
            .name(format!("evring-drain-{}", slot))
            .spawn(move || drain_loop(events, lost, done_rx))?;

        Ok(Drainer { done, handle })
    }

    /// Stop the drain thread and return how many items it discarded.
    pub(crate) fn finish(self) -> u64 {
        drop(self.done);
        self.handle.join().unwrap_or(0)
    }
}

fn drain_loop(events: Receiver<Vec<u8>>, lost: Option<Receiver<u64>>, done: Receiver<()>) -> u64 {
    // Channels only disconnect once the poller has been joined, so either
    // disconnect ends the drain.
    let lost = lost.unwrap_or_else(never);
    let mut discarded = 0u64;
    loop {
        select! {
            recv(events) -> msg => match msg {
                Ok(_) => discarded += 1,
                Err(_) => break,
            },
            recv(lost) -> msg => match msg {
                Ok(_) => discarded += 1,
                Err(_) => break,
            },
            recv(done) -> _ => break,
        }
    }
    discarded
}

/// Drain on the calling thread until `finished()` reports true.
///
/// Fallback when no drain thread is available.
pub(crate) fn drain_inline(receivers: &Receivers, finished: impl Fn() -> bool) -> u64 {
    let mut discarded = 0u64;
    loop {
        while receivers.events.try_recv().is_ok() {
            discarded += 1;
        }
        if let Some(lost) = &receivers.lost {
            while lost.try_recv().is_ok() {
                discarded += 1;
            }
        }
        if finished() {
            return discarded;
        }
        if receivers.events.recv_timeout(Duration::from_millis(1)).is_ok() {
            discarded += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_drainer_unblocks_full_channel() {
        let (tx, rx) = bounded::<Vec<u8>>(1);
        let receivers = Receivers { events: rx, lost: None };

        let producer = thread::spawn(move || {
            for i in 0..100u8 {
                tx.send(vec![i]).unwrap();
            }
        });

        let drainer = Drainer::spawn(SlotId::new(0), &receivers).unwrap();
        producer.join().unwrap();
        // Producer dropped its sender: drainer sees disconnect and exits
        assert!(drainer.finish() >= 99);
    }

    #[test]
    fn test_drainer_finish_with_live_sender() {
        let (tx, rx) = bounded::<Vec<u8>>(1);
        let (lost_tx, lost_rx) = bounded::<u64>(1);
        let receivers = Receivers { events: rx, lost: Some(lost_rx) };

        let drainer = Drainer::spawn(SlotId::new(1), &receivers).unwrap();
        lost_tx.send(5).unwrap();
        // Senders still alive; finish() must not hang
        drainer.finish();
        drop(tx);
    }

    #[test]
    fn test_drain_inline_until_finished() {
        let (tx, rx) = bounded::<Vec<u8>>(2);
        let receivers = Receivers { events: rx, lost: None };
        let done = Arc::new(AtomicBool::new(false));

        let producer_done = Arc::clone(&done);
        let producer = thread::spawn(move || {
            for i in 0..50u8 {
                tx.send(vec![i]).unwrap();
            }
            producer_done.store(true, Ordering::Release);
        });

        let discarded = drain_inline(&receivers, || done.load(Ordering::Acquire));
        producer.join().unwrap();
        assert!(discarded >= 48);
    }
}
