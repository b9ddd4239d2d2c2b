//! # Flowgate
//!
//! Adaptive chunked-transfer engine for capacity-limited peer data channels.
//!
//! This crate provides:
//! - Chunk geometry math (offsets, counts, progress, ETA, formatting)
//! - Guarded chunk reads with an in-flight index set
//! - Adaptive chunk/window sizing from smoothed network metrics
//! - Priority-based transfer scheduling
//! - Token-bucket rate-limited broadcasting with bounded queuing
//! - Per-transfer analytics and reporting
//!
//! The underlying transport (e.g. an SCTP/WebRTC data channel), signaling,
//! and UI progress stores are external collaborators: the transport is a
//! sink callback handed to the [`broadcaster::RateLimitedBroadcaster`], and
//! progress flows out through a bytes-sent observer.
//!
//! # Control Flow
//!
//! ```text
//! Scheduler ──next task──▶ Sizer ──chunk/window──▶ Reader
//!                                                    │ chunk buffers
//!                                                    ▼
//!                       Analytics ◀──bytes sent── Broadcaster ──▶ transport
//!                           │                                      sink
//!                           └──metrics feedback (external probe)──▶ Sizer
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod admission;
pub mod analytics;
pub mod broadcaster;
pub mod chunk;
pub mod error;
pub mod pool;
pub mod reader;
pub mod scheduler;
pub mod sizer;

pub use analytics::{StatsSnapshot, TransferAnalytics};
pub use broadcaster::{BroadcasterConfig, RateLimitedBroadcaster};
pub use error::{FlowgateError, Result};
pub use pool::BufferPool;
pub use reader::ChunkReader;
pub use scheduler::{TransferScheduler, TransferTask};
pub use sizer::{AdaptiveChunkSizer, NetworkMetrics};

/// Smallest chunk size the adaptive sizer will recommend (16 KiB).
pub const MIN_CHUNK_SIZE: usize = 16 * 1024;

/// Largest chunk size the adaptive sizer will recommend (256 KiB).
pub const MAX_CHUNK_SIZE: usize = 256 * 1024;

/// Wire-level single-message ceiling (16 KiB).
///
/// This is a property of size-capped transports, distinct from the adaptive
/// chunk range: a chunk may be up to [`MAX_CHUNK_SIZE`] bytes, so callers
/// feeding a capped transport must sub-segment each chunk into messages of
/// at most this many bytes. The core does not enforce it.
pub const WIRE_MESSAGE_LIMIT: usize = 16 * 1024;
