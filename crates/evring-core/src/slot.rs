//! Slot table for per-buffer delivery contexts
//!
//! Maps small integer handles to shared contexts so that a foreign callback
//! carrying nothing but an integer can find the buffer it belongs to.
//! Freed indices go onto a LIFO free stack and are reused before fresh ones.
//!
//! Writers (`allocate`, `free`) take the exclusive side of an `RwLock`;
//! `lookup` takes the shared side just long enough to clone an `Arc`, so
//! callers never hold the lock across a blocking operation.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::error::{BufferError, Result};
use crate::id::SlotId;

struct SlotsInner<T> {
    /// One entry per index; `None` is a free slot
    entries: Vec<Option<Arc<T>>>,

    /// LIFO stack of freed indices (for reuse)
    free_stack: Vec<u32>,

    /// Next never-used index
    next_fresh: u32,

    /// Number of occupied slots
    live: usize,
}

/// Fixed-capacity registry of per-buffer contexts
pub struct SlotTable<T> {
    inner: RwLock<SlotsInner<T>>,
    capacity: usize,
}

impl<T> SlotTable<T> {
    /// Create a table with room for `capacity` simultaneously live slots
    pub fn new(capacity: usize) -> Self {
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, || None);
        Self {
            inner: RwLock::new(SlotsInner {
                entries,
                free_stack: Vec::with_capacity(capacity),
                next_fresh: 0,
                live: 0,
            }),
            capacity,
        }
    }

    /// Store `context` in a free slot and return its index
    ///
    /// Fails with `CapacityExceeded` when every slot is occupied. Retrying
    /// is pointless until some other slot is freed.
    pub fn allocate(&self, context: Arc<T>) -> Result<SlotId> {
        let mut inner = self.inner.write();

        let index = match inner.free_stack.pop() {
            Some(index) => index,
            None => {
                if inner.next_fresh as usize >= self.capacity {
                    return Err(BufferError::CapacityExceeded {
                        capacity: self.capacity,
                    });
                }
                let index = inner.next_fresh;
                inner.next_fresh += 1;
                index
            }
        };

        let entry = &mut inner.entries[index as usize];
        debug_assert!(entry.is_none(), "slot {} handed out while occupied", index);
        *entry = Some(context);
        inner.live += 1;
        Ok(SlotId::new(index))
    }

    /// Return the context stored at `id`
    ///
    /// # Panics
    ///
    /// Panics if `id` was never allocated or has been freed. A callback
    /// arriving for such a slot means the lifecycle was violated, and reading
    /// on would deliver records to the wrong buffer.
    #[inline]
    pub fn lookup(&self, id: SlotId) -> Arc<T> {
        match self.try_lookup(id) {
            Some(context) => context,
            None => panic!("evring: lookup of unallocated slot {}", id),
        }
    }

    /// Like [`SlotTable::lookup`] but returns `None` for an empty slot
    #[inline]
    pub fn try_lookup(&self, id: SlotId) -> Option<Arc<T>> {
        let inner = self.inner.read();
        inner.entries.get(id.as_usize()).and_then(|e| e.clone())
    }

    /// Empty the slot at `id`, returning the context it held
    ///
    /// Must only be called once nothing can invoke a callback carrying `id`.
    /// Freeing an empty slot returns `None` and leaves the table untouched.
    pub fn free(&self, id: SlotId) -> Option<Arc<T>> {
        let mut inner = self.inner.write();
        let context = inner.entries.get_mut(id.as_usize())?.take()?;
        inner.free_stack.push(id.as_u32());
        inner.live -= 1;
        Some(context)
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.inner.read().live
    }

    /// True when no slot is occupied
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of simultaneously occupied slots
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
