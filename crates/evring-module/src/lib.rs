//! # evring-module — Default implementations
//!
//! Everything that moves records: the callback bridge the foreign engine
//! calls into, the per-buffer poller thread, the lifecycle controller, and
//! the engines themselves.
//!
//! ## Components
//!
//! | Piece        | Type                     | Notes                                   |
//! |--------------|--------------------------|-----------------------------------------|
//! | Engine       | SoftEngine               | LibbpfEngine with feature `libbpf`      |
//! | Slot table   | `bridge::event_slots()`  | process-wide, 512 slots                 |
//! | Poller       | one thread per buffer    | `evring-poll-<slot>`                    |
//! | Drain        | one thread per stop      | inline fallback (`EVRING_DRAIN_THREAD`) |
//! | Buffers      | RingBuffer, PerfBuffer   | share `EventBuffer` lifecycle           |
//! | Collection   | Module                   | buffers by map name, closes children    |

pub mod bridge;
pub mod channel;
mod drain;
pub mod lifecycle;
pub mod module;
mod native;
pub mod perf_buffer;
mod poller;
pub mod ring_buffer;
pub mod soft_engine;

#[cfg(feature = "libbpf")]
pub mod libbpf_engine;
#[cfg(feature = "libbpf")]
pub mod libbpf_sys;

pub use bridge::{event_slots, BufferStats};
pub use channel::EventChannel;
pub use lifecycle::EventBuffer;
pub use module::Module;
pub use perf_buffer::PerfBuffer;
pub use ring_buffer::RingBuffer;
pub use soft_engine::{SoftEngine, SoftMap};

#[cfg(feature = "libbpf")]
pub use libbpf_engine::LibbpfEngine;

cfg_if::cfg_if! {
    if #[cfg(feature = "libbpf")] {
        /// Engine used when none is named explicitly.
        pub type DefaultEngine = LibbpfEngine;
    } else {
        /// Engine used when none is named explicitly.
        pub type DefaultEngine = SoftEngine;
    }
}
