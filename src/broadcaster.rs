//! Token-bucket rate-limited chunk broadcasting
//!
//! [`RateLimitedBroadcaster`] decouples chunk producers from a transport
//! sink that must not be driven faster than a configured ceiling. Buffers
//! are admitted against a byte budget (rejection is the backpressure
//! signal), queued FIFO, and drained by a single periodic task that spends
//! byte tokens replenished proportionally to elapsed wall time. Buffers are
//! sent whole or not at all, preserving the chunk boundaries the receiver
//! expects.
//!
//! The drain task runs only while the queue is non-empty: it starts on the
//! first admitted buffer (Idle -> Draining) and exits once the queue drains
//! (Draining -> Idle). A generation counter invalidates stale tasks so
//! `stop()` and re-enqueue can never leave two timers running.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Tuning for a [`RateLimitedBroadcaster`]
#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
    /// Drain cadence (one animation-frame tick)
    pub tick_interval: Duration,
    /// Sustained send ceiling in bytes/sec; also the token-bucket
    /// capacity, so no single buffer may exceed it
    pub max_bytes_per_sec: usize,
    /// Soft cap on bytes sent per tick
    pub max_burst_bytes: usize,
    /// Queue admission budget in bytes
    pub max_queue_bytes: usize,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(16),
            max_bytes_per_sec: 6 * 1024 * 1024,
            max_burst_bytes: 256 * 1024,
            max_queue_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Transport send primitive: best-effort delivery of one opaque buffer.
/// The broadcaster never inspects the outcome.
pub type TransportSink = dyn Fn(Vec<u8>) + Send + Sync;

/// Observer invoked once per buffer actually drained, with its length.
/// Integration point for analytics and UI progress.
pub type BytesSentObserver = dyn Fn(usize) + Send + Sync;

struct State {
    queue: VecDeque<Vec<u8>>,
    queued_bytes: usize,
    /// Byte budget available to spend
    tokens: f64,
    last_refill: Instant,
    draining: bool,
    /// Bumped by `stop()` and each drain-task spawn; stale tasks exit
    generation: u64,
}

struct Inner {
    config: BroadcasterConfig,
    state: Mutex<State>,
    sink: Box<TransportSink>,
    observer: Mutex<Option<Arc<BytesSentObserver>>>,
}

/// Token-bucket flow controller in front of a transport sink
///
/// Cheap to clone; clones share one queue and one rate budget, so multiple
/// transfers feeding the same instance are limited in aggregate.
pub struct RateLimitedBroadcaster {
    inner: Arc<Inner>,
}

impl Clone for RateLimitedBroadcaster {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl RateLimitedBroadcaster {
    /// Create a broadcaster in front of `sink`
    ///
    /// The bucket starts full: an initial burst up to `max_bytes_per_sec`
    /// is allowed before sustained pacing takes over.
    pub fn new<F>(config: BroadcasterConfig, sink: F) -> Self
    where
        F: Fn(Vec<u8>) + Send + Sync + 'static,
    {
        let tokens = config.max_bytes_per_sec as f64;
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    queued_bytes: 0,
                    tokens,
                    last_refill: Instant::now(),
                    draining: false,
                    generation: 0,
                }),
                sink: Box::new(sink),
                observer: Mutex::new(None),
            }),
        }
    }

    /// Register the bytes-sent observer, replacing any previous one
    pub fn on_bytes_sent<F>(&self, observer: F)
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        *self.inner.lock_observer() = Some(Arc::new(observer));
    }

    /// Offer a buffer for rate-limited sending
    ///
    /// Returns `false` without enqueuing when admitting the buffer would
    /// exceed the queue byte budget; the caller must pause production and
    /// retry later. On success the buffer is appended FIFO and a drain
    /// task is started if none is running.
    ///
    /// Must be called from within a tokio runtime (the drain task is
    /// spawned on it). Returns immediately either way; producers are never
    /// coupled to the send cadence.
    pub fn enqueue(&self, buffer: Vec<u8>) -> bool {
        let spawn_generation = {
            let mut state = self.inner.lock_state();
            let incoming = buffer.len();
            if state.queued_bytes + incoming > self.inner.config.max_queue_bytes {
                tracing::warn!(
                    queued = state.queued_bytes,
                    incoming,
                    budget = self.inner.config.max_queue_bytes,
                    "broadcast queue full, rejecting buffer"
                );
                return false;
            }

            state.queued_bytes += incoming;
            state.queue.push_back(buffer);

            if state.draining {
                None
            } else {
                state.draining = true;
                state.generation += 1;
                Some(state.generation)
            }
        };

        if let Some(generation) = spawn_generation {
            tracing::debug!(generation, "starting drain task");
            let inner = Arc::clone(&self.inner);
            tokio::spawn(drain_loop(inner, generation));
        }
        true
    }

    /// Bytes currently queued
    #[must_use]
    pub fn queued_bytes(&self) -> usize {
        self.inner.lock_state().queued_bytes
    }

    /// Halt the drain loop, discard all queued buffers, and reset the
    /// token budget to the full rate
    ///
    /// Abrupt cancellation: unsent data is lost. Callers needing graceful
    /// cancellation must track delivery via the bytes-sent observer before
    /// calling this. Buffers already handed to the sink in the current
    /// tick are not recalled.
    pub fn stop(&self) {
        let mut state = self.inner.lock_state();
        let discarded = state.queued_bytes;
        state.queue.clear();
        state.queued_bytes = 0;
        state.tokens = self.inner.config.max_bytes_per_sec as f64;
        state.last_refill = Instant::now();
        state.draining = false;
        state.generation += 1;
        tracing::debug!(discarded, "broadcaster stopped");
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        // Held only for queue bookkeeping; no await or sink call inside
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_observer(&self) -> MutexGuard<'_, Option<Arc<BytesSentObserver>>> {
        self.observer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Replenish tokens proportionally to wall time since the last refill,
/// capped at the bucket capacity
fn refill_tokens(state: &mut State, config: &BroadcasterConfig) {
    let now = Instant::now();
    let elapsed_ms = now.duration_since(state.last_refill).as_secs_f64() * 1000.0;
    let rate = config.max_bytes_per_sec as f64;
    state.tokens = (state.tokens + rate * elapsed_ms / 1000.0).min(rate);
    state.last_refill = now;
}

async fn drain_loop(inner: Arc<Inner>, generation: u64) {
    let mut interval = tokio::time::interval(inner.config.tick_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        // Phase 1: under the lock, refill and pop every buffer this tick
        // may send. Whole-buffer atomicity: a head larger than the
        // available tokens defers the entire tick.
        let batch = {
            let mut state = inner.lock_state();
            if state.generation != generation {
                return;
            }
            refill_tokens(&mut state, &inner.config);

            let mut batch = Vec::new();
            let mut burst = 0usize;
            while let Some(head) = state.queue.front() {
                let len = head.len();
                if burst >= inner.config.max_burst_bytes || state.tokens < len as f64 {
                    break;
                }
                let buffer = state.queue.pop_front().unwrap_or_default();
                state.tokens -= len as f64;
                state.queued_bytes -= len;
                burst += len;
                batch.push(buffer);
            }
            batch
        };

        // Phase 2: deliver outside the lock, strictly FIFO
        if !batch.is_empty() {
            let observer = inner.lock_observer().clone();
            let mut sent = 0usize;
            for buffer in batch {
                let len = buffer.len();
                (inner.sink)(buffer);
                if let Some(observer) = &observer {
                    observer(len);
                }
                sent += len;
            }
            tracing::trace!(sent, "drain tick");
        }

        // Phase 3: go idle only once the queue is confirmed empty after
        // delivery, so a successor task can never overtake this one
        let mut state = inner.lock_state();
        if state.generation != generation {
            return;
        }
        if state.queue.is_empty() {
            state.draining = false;
            tracing::debug!(generation, "drain task idle");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Sent = Arc<Mutex<Vec<Vec<u8>>>>;

    fn collecting_broadcaster(config: BroadcasterConfig) -> (RateLimitedBroadcaster, Sent) {
        let sent: Sent = Arc::new(Mutex::new(Vec::new()));
        let sink_sent = Arc::clone(&sent);
        let broadcaster = RateLimitedBroadcaster::new(config, move |buf| {
            sink_sent.lock().unwrap().push(buf);
        });
        (broadcaster, sent)
    }

    fn sent_bytes(sent: &Sent) -> usize {
        sent.lock().unwrap().iter().map(Vec::len).sum()
    }

    #[tokio::test(start_paused = true)]
    async fn test_drains_queue_fifo() {
        let (broadcaster, sent) = collecting_broadcaster(BroadcasterConfig::default());

        assert!(broadcaster.enqueue(vec![1u8; 100]));
        assert!(broadcaster.enqueue(vec![2u8; 100]));
        assert!(broadcaster.enqueue(vec![3u8; 100]));

        tokio::time::sleep(Duration::from_millis(100)).await;

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0][0], 1);
        assert_eq!(sent[1][0], 2);
        assert_eq!(sent[2][0], 3);
        assert_eq!(broadcaster.queued_bytes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_full_rejection_leaves_state_unchanged() {
        let config = BroadcasterConfig {
            // Rate of zero refill keeps everything queued
            max_bytes_per_sec: 1,
            max_queue_bytes: 1000,
            ..Default::default()
        };
        let (broadcaster, _sent) = collecting_broadcaster(config);

        assert!(broadcaster.enqueue(vec![0u8; 600]));
        assert_eq!(broadcaster.queued_bytes(), 600);

        // 600 + 600 > 1000: rejected, queued bytes unchanged
        assert!(!broadcaster.enqueue(vec![0u8; 600]));
        assert_eq!(broadcaster.queued_bytes(), 600);

        // A buffer that still fits is admitted
        assert!(broadcaster.enqueue(vec![0u8; 400]));
        assert_eq!(broadcaster.queued_bytes(), 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_whole_buffer_atomicity() {
        let config = BroadcasterConfig {
            tick_interval: Duration::from_millis(10),
            max_bytes_per_sec: 1000,
            max_burst_bytes: 10_000,
            max_queue_bytes: 1 << 20,
        };
        let (broadcaster, sent) = collecting_broadcaster(config);

        // Bucket primed with 1000 tokens: first buffer fits, second (800)
        // exceeds the 200 remaining and must be deferred whole
        assert!(broadcaster.enqueue(vec![0u8; 800]));
        assert!(broadcaster.enqueue(vec![0u8; 800]));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(sent.lock().unwrap().len(), 1);
        assert_eq!(broadcaster.queued_bytes(), 800);

        // ~800ms of refill at 1000 B/s covers the deferred buffer
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(sent.lock().unwrap().len(), 2);
        assert_eq!(broadcaster.queued_bytes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sustained_rate_bound() {
        let config = BroadcasterConfig {
            tick_interval: Duration::from_millis(10),
            max_bytes_per_sec: 1000,
            max_burst_bytes: 10_000,
            max_queue_bytes: 1 << 20,
        };
        let (broadcaster, sent) = collecting_broadcaster(config);

        for _ in 0..20 {
            assert!(broadcaster.enqueue(vec![0u8; 500]));
        }

        tokio::time::sleep(Duration::from_secs(1)).await;

        // Primed bucket (1000) plus one second of refill (1000) plus one
        // tick of slack bounds cumulative output
        let bound = 1000 + 1000 + 500;
        assert!(sent_bytes(&sent) <= bound, "sent {} > {bound}", sent_bytes(&sent));
        assert!(sent_bytes(&sent) >= 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_cap_spreads_sends_across_ticks() {
        let config = BroadcasterConfig {
            tick_interval: Duration::from_millis(10),
            max_bytes_per_sec: 1_000_000,
            max_burst_bytes: 200,
            max_queue_bytes: 1 << 20,
        };
        let (broadcaster, sent) = collecting_broadcaster(config);

        for _ in 0..4 {
            assert!(broadcaster.enqueue(vec![0u8; 200]));
        }

        // First tick fires immediately; burst cap admits one 200-byte
        // buffer per tick even though tokens cover all four
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(sent.lock().unwrap().len(), 1);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sent.lock().unwrap().len(), 2);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(sent.lock().unwrap().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_queue() {
        let config = BroadcasterConfig {
            max_bytes_per_sec: 1, // effectively frozen
            ..Default::default()
        };
        let (broadcaster, sent) = collecting_broadcaster(config);

        assert!(broadcaster.enqueue(vec![0u8; 100]));
        assert!(broadcaster.enqueue(vec![0u8; 100]));
        assert_eq!(broadcaster.queued_bytes(), 200);

        broadcaster.stop();
        assert_eq!(broadcaster.queued_bytes(), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_after_stop_restarts_draining() {
        let (broadcaster, sent) = collecting_broadcaster(BroadcasterConfig::default());

        assert!(broadcaster.enqueue(vec![0u8; 100]));
        broadcaster.stop();

        assert!(broadcaster.enqueue(vec![9u8; 100]));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0][0], 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bytes_sent_observer() {
        let (broadcaster, _sent) = collecting_broadcaster(BroadcasterConfig::default());

        let observed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&observed);
        broadcaster.on_bytes_sent(move |len| {
            counter.fetch_add(len, Ordering::Relaxed);
        });

        assert!(broadcaster.enqueue(vec![0u8; 300]));
        assert!(broadcaster.enqueue(vec![0u8; 200]));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(observed.load(Ordering::Relaxed), 500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_idle_polling_after_drain() {
        let (broadcaster, sent) = collecting_broadcaster(BroadcasterConfig::default());

        assert!(broadcaster.enqueue(vec![0u8; 100]));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sent.lock().unwrap().len(), 1);

        // Queue drained; a fresh enqueue starts a new drain task
        assert!(broadcaster.enqueue(vec![0u8; 100]));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sent.lock().unwrap().len(), 2);
    }
}
