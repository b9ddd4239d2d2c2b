//! Adaptive chunk and window sizing
//!
//! Maintains exponentially smoothed link metrics (RTT, bandwidth, loss)
//! fed by an external probe, and derives the chunk size and transmit
//! window that keep the pipe full without overdriving it. Instantaneous
//! samples are noisy on real links, so each update is low-pass filtered
//! before it influences sizing decisions.

use crate::{MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
use serde::Serialize;

/// Weight given to each new metrics sample (history keeps the rest)
const SMOOTHING_FACTOR: f64 = 0.3;

/// Design goal: each chunk should take ~200ms to transmit at the
/// current bandwidth
const TARGET_TRANSFER_TIME_MS: f64 = 200.0;

/// Smallest recommended transmit window (chunks in flight)
const MIN_WINDOW: usize = 10;

/// Largest recommended transmit window (chunks in flight)
const MAX_WINDOW: usize = 100;

/// Smoothed link metrics for one active peer link
///
/// Updated incrementally; never reset except on link re-establishment,
/// when the owner builds a fresh sizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NetworkMetrics {
    /// Round-trip time in milliseconds
    pub rtt_ms: f64,
    /// Bandwidth in bytes per second
    pub bandwidth_bps: f64,
    /// Packet loss fraction in [0, 1]
    pub packet_loss: f64,
}

impl Default for NetworkMetrics {
    /// Conservative starting point before the first probe sample:
    /// 1 MiB/s, 100 ms RTT, no loss.
    fn default() -> Self {
        Self {
            rtt_ms: 100.0,
            bandwidth_bps: 1024.0 * 1024.0,
            packet_loss: 0.0,
        }
    }
}

/// Derives optimal chunk size and transmit window from smoothed metrics
#[derive(Debug, Clone, Default)]
pub struct AdaptiveChunkSizer {
    metrics: NetworkMetrics,
}

impl AdaptiveChunkSizer {
    /// Create a sizer with default initial metrics
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sizer from known metrics (e.g. carried over from a
    /// previous link to the same peer)
    #[must_use]
    pub fn with_metrics(metrics: NetworkMetrics) -> Self {
        Self { metrics }
    }

    /// Fold a new probe sample into the smoothed metrics
    ///
    /// EWMA with weight 0.3 for the sample and 0.7 for history.
    pub fn update_metrics(&mut self, rtt_ms: f64, bandwidth_bps: f64, packet_loss: f64) {
        let m = &mut self.metrics;
        m.rtt_ms = ewma(m.rtt_ms, rtt_ms);
        m.bandwidth_bps = ewma(m.bandwidth_bps, bandwidth_bps);
        m.packet_loss = ewma(m.packet_loss, packet_loss.clamp(0.0, 1.0));

        tracing::trace!(
            rtt_ms = m.rtt_ms,
            bandwidth_bps = m.bandwidth_bps,
            packet_loss = m.packet_loss,
            "metrics updated"
        );
    }

    /// Current smoothed metrics
    #[must_use]
    pub fn metrics(&self) -> NetworkMetrics {
        self.metrics
    }

    /// Compute the optimal chunk size for current conditions
    ///
    /// Base size targets ~200ms of transmission per chunk. High latency
    /// favors fewer, larger chunks to amortize round-trip overhead; low
    /// latency favors smaller chunks for finer-grained flow control;
    /// lossy links favor smaller chunks to bound retransmission cost.
    /// The result is clamped to `[MIN_CHUNK_SIZE, MAX_CHUNK_SIZE]`.
    #[must_use]
    pub fn optimal_chunk_size(&self) -> usize {
        let m = &self.metrics;
        let mut size = m.bandwidth_bps * TARGET_TRANSFER_TIME_MS / 1000.0;

        if m.rtt_ms > 200.0 {
            size *= 1.5;
        } else if m.rtt_ms < 50.0 {
            size *= 0.8;
        }

        if m.packet_loss > 0.05 {
            size *= 0.5;
        }

        (size.round() as usize).clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE)
    }

    /// Recommended number of concurrently in-flight chunks
    ///
    /// Bandwidth-delay product divided by the current chunk size, clamped
    /// to `[10, 100]`, bounding unacknowledged chunks to the pipe's
    /// carrying capacity.
    #[must_use]
    pub fn recommended_window_size(&self) -> usize {
        let m = &self.metrics;
        let bdp = m.bandwidth_bps * m.rtt_ms / 1000.0;
        let window = (bdp / self.optimal_chunk_size() as f64).ceil() as usize;
        window.clamp(MIN_WINDOW, MAX_WINDOW)
    }
}

fn ewma(history: f64, sample: f64) -> f64 {
    SMOOTHING_FACTOR * sample + (1.0 - SMOOTHING_FACTOR) * history
}
