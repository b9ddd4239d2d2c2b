//! Priority-based transfer scheduling
//!
//! [`TransferScheduler`] orders competing transfer tasks by priority and
//! arrival. Lower priority values win (0 is highest); tasks with equal
//! priority dequeue in strict arrival order, so a long queue of same
//! priority work is never starved by reordering.

use std::time::Instant;

/// Highest (numerically largest, lowest-urgency) priority value
pub const MAX_PRIORITY: u8 = 10;

/// One queued file transfer
///
/// Owned by the scheduler while queued; ownership moves to the transfer
/// execution context on dequeue. The file reference (size, name, type) is
/// opaque to the core. Id uniqueness is the caller's responsibility.
#[derive(Debug, Clone)]
pub struct TransferTask {
    /// Unique transfer id
    pub id: String,
    /// Source file name
    pub file_name: String,
    /// Source file size in bytes
    pub file_size: u64,
    /// Source file MIME type
    pub mime_type: String,
    /// Priority, 0 (highest) to [`MAX_PRIORITY`]
    pub priority: u8,
    /// When the task was created
    pub created_at: Instant,
    /// Arrival sequence number, assigned at enqueue (FIFO tie-break)
    seq: u64,
}

impl TransferTask {
    /// Create a task; `priority` is clamped to `0..=MAX_PRIORITY`
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        file_name: impl Into<String>,
        file_size: u64,
        mime_type: impl Into<String>,
        priority: u8,
    ) -> Self {
        Self {
            id: id.into(),
            file_name: file_name.into(),
            file_size,
            mime_type: mime_type.into(),
            priority: priority.min(MAX_PRIORITY),
            created_at: Instant::now(),
            seq: 0,
        }
    }
}

/// Priority queue over [`TransferTask`]
///
/// Kept sorted by `(priority, arrival)` with an ordered insert; equal
/// priorities preserve FIFO order. Never blocks.
#[derive(Debug, Default)]
pub struct TransferScheduler {
    tasks: Vec<TransferTask>,
    next_seq: u64,
}

impl TransferScheduler {
    /// Create an empty scheduler
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task in priority order
    pub fn enqueue(&mut self, mut task: TransferTask) {
        task.seq = self.next_seq;
        self.next_seq += 1;

        // Equal-priority tasks land after all earlier arrivals
        let pos = self.tasks.partition_point(|t| t.priority <= task.priority);
        tracing::debug!(id = %task.id, priority = task.priority, pos, "task enqueued");
        self.tasks.insert(pos, task);
    }

    /// Remove and return the highest-priority task, if any
    pub fn dequeue(&mut self) -> Option<TransferTask> {
        if self.tasks.is_empty() {
            None
        } else {
            let task = self.tasks.remove(0);
            tracing::debug!(id = %task.id, "task dequeued");
            Some(task)
        }
    }

    /// Inspect the head of the queue without removing it
    #[must_use]
    pub fn peek(&self) -> Option<&TransferTask> {
        self.tasks.first()
    }

    /// Cancel a queued task by id
    ///
    /// Returns whether a task was removed; absent ids are a no-op.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        let removed = self.tasks.len() < before;
        if removed {
            tracing::debug!(id, "task cancelled");
        }
        removed
    }

    /// Number of queued tasks
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the queue is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
