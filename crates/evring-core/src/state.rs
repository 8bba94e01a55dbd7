//! Buffer lifecycle state and buffer kind types

use core::fmt;

/// Lifecycle state of an event buffer
///
/// ```text
/// Created ──start──▶ Started ──stop──▶ Stopping ──▶ Stopped
///                       ▲                              │
///                       └────────────start─────────────┘
///        (any state) ──close──▶ Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BufferState {
    /// Native buffer allocated and slot assigned, no poller running
    Created = 0,

    /// Poller thread running
    Started = 1,

    /// Stop in progress: poller cancelled, channels draining
    Stopping = 2,

    /// Poller joined, output channels closed
    Stopped = 3,

    /// Native buffer and slot released (terminal)
    Closed = 4,
}

impl BufferState {
    /// Check if `start()` may move this state to `Started`
    #[inline]
    pub const fn can_start(&self) -> bool {
        matches!(self, BufferState::Created | BufferState::Stopped)
    }

    /// Check if no poller can be running in this state
    #[inline]
    pub const fn is_idle(&self) -> bool {
        matches!(
            self,
            BufferState::Created | BufferState::Stopped | BufferState::Closed
        )
    }

    /// Check if this is the terminal state
    #[inline]
    pub const fn is_closed(&self) -> bool {
        matches!(self, BufferState::Closed)
    }
}

impl From<u8> for BufferState {
    fn from(v: u8) -> Self {
        match v {
            0 => BufferState::Created,
            1 => BufferState::Started,
            2 => BufferState::Stopping,
            3 => BufferState::Stopped,
            _ => BufferState::Closed,
        }
    }
}

impl From<BufferState> for u8 {
    fn from(state: BufferState) -> u8 {
        state as u8
    }
}

impl fmt::Display for BufferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferState::Created => write!(f, "created"),
            BufferState::Started => write!(f, "started"),
            BufferState::Stopping => write!(f, "stopping"),
            BufferState::Stopped => write!(f, "stopped"),
            BufferState::Closed => write!(f, "closed"),
        }
    }
}

/// Which foreign delivery mechanism backs a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// BPF ring buffer: one shared ring, caller-sized records
    Ring,

    /// Perf event array: per-CPU pages, records plus lost counts
    Perf,
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferKind::Ring => write!(f, "ring"),
            BufferKind::Perf => write!(f, "perf"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_transitions() {
        assert!(BufferState::Created.can_start());
        assert!(BufferState::Stopped.can_start());
        assert!(!BufferState::Started.can_start());
        assert!(!BufferState::Stopping.can_start());
        assert!(!BufferState::Closed.can_start());
    }

    #[test]
    fn test_idle_states() {
        assert!(BufferState::Created.is_idle());
        assert!(BufferState::Stopped.is_idle());
        assert!(BufferState::Closed.is_idle());
        assert!(!BufferState::Started.is_idle());
        assert!(!BufferState::Stopping.is_idle());
    }

    #[test]
    fn test_u8_conversion() {
        for state in [
            BufferState::Created,
            BufferState::Started,
            BufferState::Stopping,
            BufferState::Stopped,
            BufferState::Closed,
        ] {
            assert_eq!(BufferState::from(u8::from(state)), state);
        }
    }
}
