//! evring error types.

use crate::state::BufferKind;

/// Errors surfaced by buffer construction and lifecycle operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// Every slot in the table is occupied. Free a buffer before retrying.
    #[error("max number of ring/perf buffers reached ({capacity})")]
    CapacityExceeded { capacity: usize },

    /// Caller passed something unusable (missing channel, zero pages, unknown map).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The foreign engine refused to create the native buffer object.
    #[error("failed to initialize {kind} buffer on map fd {map_fd}: errno {errno}")]
    ForeignAllocationFailed {
        kind: BufferKind,
        map_fd: i32,
        errno: i32,
    },

    /// The foreign poll primitive returned an unexpected negative code.
    #[error("error polling {kind} buffer: {code}")]
    PollFailure { kind: BufferKind, code: i32 },

    /// Operation attempted on a closed buffer.
    #[error("buffer is closed")]
    Closed,

    /// OS refused to spawn the poller thread.
    #[error("failed to spawn poller thread: {0}")]
    Spawn(String),
}

impl BufferError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        BufferError::InvalidArgument(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, BufferError>;
