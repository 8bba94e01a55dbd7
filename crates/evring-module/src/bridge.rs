//! Callback bridge — the C functions the foreign engine calls.
//!
//! The engine only carries an opaque `ctx` pointer across the boundary, so
//! every buffer registers a [`Delivery`] in the process-wide slot table and
//! hands the slot index to the engine as `ctx`. Each callback:
//!
//! 1. decodes the slot and looks up its `Delivery` (panics on a dead slot),
//! 2. copies the record out of engine memory (valid only for the call),
//! 3. sends it on the buffer's channel, blocking while the channel is full.
//!
//! The blocking send is the backpressure path: a slow consumer stalls the
//! callback, which stalls the engine's poll. Stop must drain for this reason.

use crossbeam_channel::Sender;
use evring_core::constants::MAX_EVENT_BUFFERS;
use evring_core::error::BufferError;
use evring_core::{BufferKind, SlotId, SlotTable};
use libc::{c_int, c_void, size_t};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::OnceLock;

static EVENT_SLOTS: OnceLock<SlotTable<Delivery>> = OnceLock::new();

/// The process-wide slot table shared by every ring and perf buffer.
pub fn event_slots() -> &'static SlotTable<Delivery> {
    EVENT_SLOTS.get_or_init(|| SlotTable::new(MAX_EVENT_BUFFERS))
}

/// Senders for one run of a buffer. Dropping them closes the channels.
pub struct Outputs {
    pub events: Sender<Vec<u8>>,
    pub lost: Option<Sender<u64>>,
}

/// Snapshot of a buffer's delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Records handed to the events channel
    pub records: u64,
    /// Payload bytes handed to the events channel
    pub bytes: u64,
    /// Records the producer reported as lost (perf only)
    pub lost: u64,
    /// Foreign poll calls completed
    pub polls: u64,
}

/// Per-buffer context reachable from the callbacks through the slot table.
pub struct Delivery {
    kind: BufferKind,
    outputs: Mutex<Option<Outputs>>,
    polling: AtomicBool,
    last_error: Mutex<Option<BufferError>>,
    records: AtomicU64,
    bytes: AtomicU64,
    lost: AtomicU64,
    polls: AtomicU64,
}

impl Delivery {
    pub fn new(kind: BufferKind) -> Self {
        Self {
            kind,
            outputs: Mutex::new(None),
            polling: AtomicBool::new(false),
            last_error: Mutex::new(None),
            records: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            lost: AtomicU64::new(0),
            polls: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    /// Install the senders for the next run.
    pub fn arm(&self, outputs: Outputs) {
        *self.outputs.lock() = Some(outputs);
    }

    /// Drop the senders, closing the channels for consumers.
    ///
    /// Returns false when nothing was armed.
    pub fn disarm(&self) -> bool {
        self.outputs.lock().take().is_some()
    }

    pub fn is_armed(&self) -> bool {
        self.outputs.lock().is_some()
    }

    pub(crate) fn set_polling(&self, polling: bool) {
        self.polling.store(polling, Ordering::Release);
    }

    /// True while a poller thread is inside its loop.
    pub fn is_polling(&self) -> bool {
        self.polling.load(Ordering::Acquire)
    }

    pub(crate) fn note_poll(&self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_last_error(&self, err: Option<BufferError>) {
        *self.last_error.lock() = err;
    }

    pub fn last_error(&self) -> Option<BufferError> {
        self.last_error.lock().clone()
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            records: self.records.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            lost: self.lost.load(Ordering::Relaxed),
            polls: self.polls.load(Ordering::Relaxed),
        }
    }

    /// Blocking send of one record on the events channel.
    pub fn deliver_record(&self, record: Vec<u8>) {
        // Clone the sender so the outputs lock is not held while blocked.
        let events = match self.outputs.lock().as_ref() {
            Some(outputs) => outputs.events.clone(),
            None => {
                tracing::debug!(kind = %self.kind, "record arrived with no armed channel; dropped");
                return;
            }
        };
        let len = record.len() as u64;
        if events.send(record).is_ok() {
            self.records.fetch_add(1, Ordering::Relaxed);
            self.bytes.fetch_add(len, Ordering::Relaxed);
        }
    }

    /// Blocking send of a lost-record count on the lost channel, if any.
    pub fn deliver_lost(&self, count: u64) {
        self.lost.fetch_add(count, Ordering::Relaxed);
        let lost = self
            .outputs
            .lock()
            .as_ref()
            .and_then(|outputs| outputs.lost.clone());
        match lost {
            Some(lost) => {
                let _ = lost.send(count);
            }
            None => tracing::warn!(kind = %self.kind, count, "perf buffer lost records"),
        }
    }
}

/// Copy a foreign record into owned memory.
///
/// # Safety
///
/// `data` must point to `size` readable bytes, or be null with any size.
#[inline]
unsafe fn copy_record(data: *const c_void, size: usize) -> Vec<u8> {
    if data.is_null() || size == 0 {
        return Vec::new();
    }
    std::slice::from_raw_parts(data as *const u8, size).to_vec()
}

/// `ring_buffer_sample_fn` registered with every ring buffer.
///
/// # Safety
///
/// Called by the engine with the `ctx` it was created with and a record
/// valid for the duration of the call.
pub unsafe extern "C" fn ring_sample_cb(ctx: *mut c_void, data: *mut c_void, size: size_t) -> c_int {
    let delivery = event_slots().lookup(SlotId::from_token(ctx));
    delivery.deliver_record(copy_record(data, size));
    0
}

/// `perf_buffer_sample_fn` registered with every perf buffer.
///
/// # Safety
///
/// Same contract as [`ring_sample_cb`].
pub unsafe extern "C" fn perf_sample_cb(ctx: *mut c_void, _cpu: c_int, data: *mut c_void, size: u32) {
    let delivery = event_slots().lookup(SlotId::from_token(ctx));
    delivery.deliver_record(copy_record(data, size as usize));
}

/// `perf_buffer_lost_fn` registered with every perf buffer.
///
/// # Safety
///
/// Called by the engine with the `ctx` it was created with.
pub unsafe extern "C" fn perf_lost_cb(ctx: *mut c_void, cpu: c_int, cnt: u64) {
    let delivery = event_slots().lookup(SlotId::from_token(ctx));
    tracing::trace!(slot = %SlotId::from_token(ctx), cpu, cnt, "perf lost callback");
    delivery.deliver_lost(cnt);
}
