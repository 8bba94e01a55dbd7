//! Engine configuration
//!
//! Library defaults with runtime environment overrides.
//!
//! # Example
//!
//! ```rust,ignore
//! use evring_core::config::EngineConfig;
//!
//! // Defaults with env overrides
//! let config = EngineConfig::from_env();
//!
//! // Or customize programmatically
//! let config = EngineConfig::from_env()
//!     .poll_timeout(Duration::from_millis(100))
//!     .perf_pages(8);
//! ```

use std::time::Duration;

use crate::constants::{DEFAULT_PERF_PAGES, DEFAULT_POLL_TIMEOUT_MS};
use crate::env::{env_get, env_get_bool};
use crate::error::{BufferError, Result};

/// Tunables shared by every buffer created from one module.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bounded wait of one foreign poll call; also the worst-case stop latency
    pub poll_timeout: Duration,
    /// Perf buffer size in pages per CPU, used when a perf buffer is created
    /// without an explicit page count
    pub perf_pages: usize,
    /// Drain channels on a dedicated thread during stop. When false, or when
    /// the thread cannot be spawned, stop drains on the calling thread.
    pub drain_thread: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
            perf_pages: DEFAULT_PERF_PAGES,
            drain_thread: true,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config from defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `EVRING_POLL_TIMEOUT_MS` - Poll timeout in milliseconds
    /// - `EVRING_PERF_PAGES` - Default perf buffer pages per CPU
    /// - `EVRING_DRAIN_THREAD` - Drain on a dedicated thread (0/1)
    pub fn from_env() -> Self {
        Self::from_env_prefixed("EVRING")
    }

    /// Same as `from_env()`, reading `<prefix>_POLL_TIMEOUT_MS` and friends.
    pub fn from_env_prefixed(prefix: &str) -> Self {
        let defaults = Self::default();
        Self {
            poll_timeout: Duration::from_millis(env_get(
                &format!("{}_POLL_TIMEOUT_MS", prefix),
                DEFAULT_POLL_TIMEOUT_MS,
            )),
            perf_pages: env_get(&format!("{}_PERF_PAGES", prefix), defaults.perf_pages),
            drain_thread: env_get_bool(&format!("{}_DRAIN_THREAD", prefix), defaults.drain_thread),
        }
    }

    /// Set the poll timeout
    pub fn poll_timeout(mut self, d: Duration) -> Self {
        self.poll_timeout = d;
        self
    }

    /// Set default perf pages
    pub fn perf_pages(mut self, n: usize) -> Self {
        self.perf_pages = n;
        self
    }

    /// Enable or disable the dedicated drain thread
    pub fn drain_thread(mut self, enable: bool) -> Self {
        self.drain_thread = enable;
        self
    }

    /// Poll timeout as the `int` millisecond value engines expect
    pub fn poll_timeout_ms(&self) -> i32 {
        self.poll_timeout.as_millis().min(i32::MAX as u128) as i32
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.poll_timeout.is_zero() {
            return Err(BufferError::invalid_argument("poll_timeout must be non-zero"));
        }
        if self.perf_pages == 0 {
            return Err(BufferError::invalid_argument("perf_pages must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.poll_timeout_ms(), 300);
        assert_eq!(config.perf_pages, 64);
        assert!(config.drain_thread);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_and_validate() {
        let config = EngineConfig::new()
            .poll_timeout(Duration::from_millis(20))
            .perf_pages(8)
            .drain_thread(false);
        assert_eq!(config.poll_timeout_ms(), 20);
        assert!(config.validate().is_ok());

        let bad = EngineConfig::new().poll_timeout(Duration::ZERO);
        assert!(matches!(bad.validate(), Err(BufferError::InvalidArgument(_))));

        let bad = EngineConfig::new().perf_pages(0);
        assert!(matches!(bad.validate(), Err(BufferError::InvalidArgument(_))));
    }

    #[test]
    fn test_from_env_override() {
        // Private prefix; nothing else reads these keys
        std::env::set_var("__EVRING_TEST_CFG_PERF_PAGES", "16");
        std::env::set_var("__EVRING_TEST_CFG_DRAIN_THREAD", "0");
        let config = EngineConfig::from_env_prefixed("__EVRING_TEST_CFG");
        assert_eq!(config.perf_pages, 16);
        assert!(!config.drain_thread);
        assert_eq!(config.poll_timeout_ms(), 300);
        std::env::remove_var("__EVRING_TEST_CFG_PERF_PAGES");
        std::env::remove_var("__EVRING_TEST_CFG_DRAIN_THREAD");
    }
}
