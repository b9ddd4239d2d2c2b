//! Error types for the transfer core

use thiserror::Error;

/// Errors that can occur in transfer-core operations
#[derive(Debug, Error)]
pub enum FlowgateError {
    /// A read for this chunk index is already in flight.
    ///
    /// Advisory, not permanent: retry after the pending read resolves.
    #[error("Chunk {0} is already being read")]
    Busy(u64),

    /// Chunk index outside `[0, total_chunks)`
    #[error("Chunk index {index} out of range (total chunks: {total})")]
    OutOfRange {
        /// Requested chunk index
        index: u64,
        /// Total chunks in the file
        total: u64,
    },

    /// Admitting the buffer would exceed the broadcaster's queue budget.
    ///
    /// The primary backpressure signal: pause production and retry.
    #[error("Broadcast queue full: {queued} + {incoming} bytes exceeds budget of {budget}")]
    QueueFull {
        /// Bytes currently queued
        queued: usize,
        /// Size of the rejected buffer
        incoming: usize,
        /// Configured queue byte budget
        budget: usize,
    },

    /// Underlying storage read failed
    #[error("Storage read failed: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for transfer-core operations
pub type Result<T> = std::result::Result<T, FlowgateError>;
