//! # evring-core
//!
//! Core types and traits for evring, the event-buffer consumption layer.
//!
//! This crate contains no engine-specific code. It defines the contract a
//! foreign polling engine must satisfy and the shared bookkeeping every
//! buffer relies on. Default implementations live in `evring-module`.
//!
//! ## Modules
//!
//! - `id` - Slot identifier type and callback token conversion
//! - `slot` - Fixed-capacity slot table for per-buffer contexts
//! - `state` - Buffer lifecycle state and buffer kind enums
//! - `cancel` - Cancellation token for cooperative poller shutdown
//! - `engine` - Foreign engine trait and C callback signatures
//! - `error` - Error types
//! - `config` - Engine configuration with environment overrides
//! - `env` - Environment variable utilities

pub mod id;
pub mod slot;
pub mod state;
pub mod cancel;
pub mod engine;
pub mod error;
pub mod config;
pub mod env;

// Re-exports for convenience
pub use id::SlotId;
pub use slot::SlotTable;
pub use state::{BufferKind, BufferState};
pub use cancel::CancellationToken;
pub use engine::{EventEngine, PerfLostFn, PerfSampleFn, PollOutcome, RingSampleFn};
pub use error::{BufferError, Result};
pub use config::EngineConfig;
pub use env::{env_get, env_get_bool, env_get_opt};

/// Constants shared by every buffer
pub mod constants {
    /// Maximum number of live ring + perf buffers in one process
    pub const MAX_EVENT_BUFFERS: usize = 512;

    /// Default bounded wait for one foreign poll call, in milliseconds
    pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 300;

    /// Default perf buffer size in pages (per CPU)
    pub const DEFAULT_PERF_PAGES: usize = 64;
}
