//! Per-transfer analytics
//!
//! [`TransferAnalytics`] aggregates byte counts, speeds, retransmissions
//! and errors per transfer id and renders a human-readable report. Updates
//! for unknown ids are silently ignored: records may legitimately have
//! been discarded while late or duplicate events are still arriving from
//! the observer pipeline.

use dashmap::DashMap;
use serde::Serialize;
use std::time::Instant;

const MIB: f64 = 1024.0 * 1024.0;

/// Default per-retransmission overhead used by the efficiency heuristic
pub const DEFAULT_RETRANSMISSION_COST_BYTES: u64 = 1024;

/// Mutable per-transfer record
#[derive(Debug, Clone)]
struct TransferStats {
    total_bytes: u64,
    transferred_bytes: u64,
    started_at: Instant,
    completed_at: Option<Instant>,
    peak_speed_bps: f64,
    retransmissions: u64,
    errors: u64,
}

/// Point-in-time view of one transfer's statistics
///
/// Serializable for UI/session collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    /// Total bytes expected
    pub total_bytes: u64,
    /// Bytes transferred so far
    pub transferred_bytes: u64,
    /// Seconds since tracking started (up to completion, if completed)
    pub elapsed_secs: f64,
    /// Whether `complete` has been called
    pub completed: bool,
    /// Time-averaged speed in bytes/sec
    pub average_speed_bps: f64,
    /// High-water instantaneous speed in bytes/sec
    pub peak_speed_bps: f64,
    /// Retransmitted chunk count
    pub retransmissions: u64,
    /// Error count
    pub errors: u64,
}

/// Aggregates transfer statistics keyed by transfer id
#[derive(Debug)]
pub struct TransferAnalytics {
    records: DashMap<String, TransferStats>,
    retransmission_cost_bytes: u64,
}

impl Default for TransferAnalytics {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferAnalytics {
    /// Create an analytics aggregator with the default retransmission cost
    #[must_use]
    pub fn new() -> Self {
        Self::with_retransmission_cost(DEFAULT_RETRANSMISSION_COST_BYTES)
    }

    /// Create an aggregator with a custom per-retransmission byte cost
    /// for the efficiency heuristic
    #[must_use]
    pub fn with_retransmission_cost(cost_bytes: u64) -> Self {
        Self {
            records: DashMap::new(),
            retransmission_cost_bytes: cost_bytes,
        }
    }

    /// Begin tracking a transfer, replacing any previous record for `id`
    pub fn start_tracking(&self, id: impl Into<String>, total_bytes: u64) {
        let id = id.into();
        tracing::debug!(id = %id, total_bytes, "tracking transfer");
        self.records.insert(
            id,
            TransferStats {
                total_bytes,
                transferred_bytes: 0,
                started_at: Instant::now(),
                completed_at: None,
                peak_speed_bps: 0.0,
                retransmissions: 0,
                errors: 0,
            },
        );
    }

    /// Accumulate transferred bytes and fold in an instantaneous speed
    /// sample; unknown ids are ignored
    pub fn update_progress(&self, id: &str, bytes: u64, inst_speed_bps: f64) {
        if let Some(mut stats) = self.records.get_mut(id) {
            stats.transferred_bytes += bytes;
            stats.peak_speed_bps = stats.peak_speed_bps.max(inst_speed_bps);
        }
    }

    /// Count one retransmitted chunk; unknown ids are ignored
    pub fn record_retransmission(&self, id: &str) {
        if let Some(mut stats) = self.records.get_mut(id) {
            stats.retransmissions += 1;
        }
    }

    /// Count one error; unknown ids are ignored
    pub fn record_error(&self, id: &str) {
        if let Some(mut stats) = self.records.get_mut(id) {
            stats.errors += 1;
        }
    }

    /// Stamp the completion time (first call wins); unknown ids are ignored
    pub fn complete(&self, id: &str) {
        if let Some(mut stats) = self.records.get_mut(id) {
            if stats.completed_at.is_none() {
                stats.completed_at = Some(Instant::now());
                tracing::info!(id, "transfer complete");
            }
        }
    }

    /// Snapshot the current statistics for `id`
    #[must_use]
    pub fn stats(&self, id: &str) -> Option<StatsSnapshot> {
        self.records.get(id).map(|stats| snapshot(&stats))
    }

    /// Discard the record for `id`; the caller owns record lifetime
    pub fn remove(&self, id: &str) {
        self.records.remove(id);
    }

    /// Render a human-readable report for `id`
    ///
    /// Efficiency approximates retransmission overhead at a fixed byte
    /// cost per retransmitted chunk:
    /// `total / (total + retransmissions * cost)`.
    #[must_use]
    pub fn report(&self, id: &str) -> Option<String> {
        let stats = self.records.get(id)?;
        let snap = snapshot(&stats);

        let overhead = snap.retransmissions * self.retransmission_cost_bytes;
        let efficiency = if snap.total_bytes == 0 {
            100.0
        } else {
            snap.total_bytes as f64 / (snap.total_bytes + overhead) as f64 * 100.0
        };

        Some(format!(
            "Transfer {id}: {}/{} bytes in {:.2}s{}\n\
             \x20 average speed: {:.2} MiB/s\n\
             \x20 peak speed:    {:.2} MiB/s\n\
             \x20 retransmissions: {}, errors: {}\n\
             \x20 efficiency: {efficiency:.2}%",
            snap.transferred_bytes,
            snap.total_bytes,
            snap.elapsed_secs,
            if snap.completed { "" } else { " (in progress)" },
            snap.average_speed_bps / MIB,
            snap.peak_speed_bps / MIB,
            snap.retransmissions,
            snap.errors,
        ))
    }
}

fn snapshot(stats: &TransferStats) -> StatsSnapshot {
    let end = stats.completed_at.unwrap_or_else(Instant::now);
    let elapsed_secs = end.duration_since(stats.started_at).as_secs_f64();
    let average_speed_bps = if elapsed_secs > 0.0 {
        stats.transferred_bytes as f64 / elapsed_secs
    } else {
        0.0
    };

    StatsSnapshot {
        total_bytes: stats.total_bytes,
        transferred_bytes: stats.transferred_bytes,
        elapsed_secs,
        completed: stats.completed_at.is_some(),
        average_speed_bps,
        peak_speed_bps: stats.peak_speed_bps,
        retransmissions: stats.retransmissions,
        errors: stats.errors,
    }
}
