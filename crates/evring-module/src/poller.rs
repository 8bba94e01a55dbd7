//! Poller — one OS thread per started buffer.
//!
//! The thread calls the engine's bounded poll in a loop. Callbacks run
//! synchronously inside that call, on this thread, so per-buffer record
//! order is the engine's callback order. The loop:
//!
//! ```text
//! loop {
//!     rc = poll(timeout)
//!     if cancelled          -> exit Ok
//!     rc == -EINTR          -> retry
//!     rc <  0               -> exit Err(PollFailure)
//!     rc >= 0               -> continue
//! }
//! ```
//!
//! The poll runs on a dedicated thread because it blocks in native code;
//! it must never sit on a cooperative executor.

use evring_core::error::{BufferError, Result};
use evring_core::{CancellationToken, EventEngine, PollOutcome, SlotId};
use std::sync::Arc;
use std::thread;

use crate::bridge::Delivery;
use crate::native::NativeBuffer;

/// Handle to a running poller thread.
pub(crate) struct Poller {
    handle: thread::JoinHandle<Result<()>>,
    cancel: CancellationToken,
}

impl Poller {
    /// Spawn the poll loop for `native`.
    pub(crate) fn spawn<E: EventEngine>(
        native: Arc<NativeBuffer<E>>,
        delivery: Arc<Delivery>,
        slot: SlotId,
        timeout_ms: i32,
    ) -> Result<Self> {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        delivery.set_polling(true);
        delivery.set_last_error(None);
        let thread_delivery = Arc::clone(&delivery);
        let spawned = thread::Builder::new()
            .name(format!("evring-poll-{}", slot))
            .spawn(move || {
                let result = poll_loop(&native, &thread_delivery, &token, timeout_ms);
                if let Err(ref e) = result {
                    thread_delivery.set_last_error(Some(e.clone()));
                }
                thread_delivery.set_polling(false);
                result
            });

        match spawned {
            Ok(handle) => {
                tracing::debug!(%slot, kind = %delivery.kind(), timeout_ms, "poller started");
                Ok(Poller { handle, cancel })
            }
            Err(e) => {
                delivery.set_polling(false);
                tracing::error!(%slot, error = %e, "failed to spawn poller thread");
                Err(BufferError::Spawn(e.to_string()))
            }
        }
    }

    /// Ask the loop to exit after its current poll call returns.
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the loop to exit and return its outcome.
    pub(crate) fn join(self) -> Result<()> {
        match self.handle.join() {
            Ok(result) => result,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }
}

fn poll_loop<E: EventEngine>(
    native: &NativeBuffer<E>,
    delivery: &Delivery,
    cancel: &CancellationToken,
    timeout_ms: i32,
) -> Result<()> {
    loop {
        let rc = native.poll(timeout_ms);
        delivery.note_poll();

        if cancel.is_cancelled() {
            return Ok(());
        }

        match PollOutcome::classify(rc) {
            PollOutcome::Ready(_) => {}
            PollOutcome::Interrupted => {
                tracing::trace!(kind = %native.kind(), "poll interrupted; retrying");
            }
            PollOutcome::Failed(code) => {
                tracing::error!(kind = %native.kind(), code, "poller stopped on poll failure");
                return Err(BufferError::PollFailure {
                    kind: native.kind(),
                    code,
                });
            }
        }
    }
}
