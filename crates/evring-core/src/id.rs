//! Slot identifier type

use core::fmt;
use libc::c_void;

/// Index of a buffer context in the slot table
///
/// This is the only value that crosses the foreign callback boundary.
/// It travels as the engine's opaque `void *ctx` and comes back on every
/// callback invocation.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SlotId(u32);

impl SlotId {
    /// Create a new SlotId from a raw value
    #[inline]
    pub const fn new(id: u32) -> Self {
        SlotId(id)
    }

    /// Get the raw u32 value
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Get as usize for indexing
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Encode as the opaque context pointer handed to the foreign engine.
    ///
    /// The pointer is never dereferenced; it only carries the integer.
    #[inline]
    pub fn as_token(self) -> *mut c_void {
        self.0 as usize as *mut c_void
    }

    /// Decode a context pointer produced by [`SlotId::as_token`].
    #[inline]
    pub fn from_token(ctx: *mut c_void) -> Self {
        SlotId(ctx as usize as u32)
    }
}

impl From<u32> for SlotId {
    #[inline]
    fn from(id: u32) -> Self {
        SlotId(id)
    }
}

impl From<SlotId> for u32 {
    #[inline]
    fn from(id: SlotId) -> Self {
        id.0
    }
}

impl fmt::Debug for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotId({})", self.0)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_roundtrip_preserves_index() {
        for raw in [0u32, 1, 7, 511] {
            let id = SlotId::new(raw);
            assert_eq!(SlotId::from_token(id.as_token()), id);
        }
    }

    #[test]
    fn test_slot_zero_is_null_token() {
        // Slot 0 encodes as a null pointer; engines must pass ctx through untouched.
        assert!(SlotId::new(0).as_token().is_null());
    }
}
