use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared pipeline counters, written by the emitter and read by the
/// stats reporter.
#[derive(Debug, Default)]
pub struct PipelineStats {
    received: AtomicU64,
    dispatched: AtomicU64,
    write_errors: AtomicU64,
    skipped: AtomicU64,
}

/// Point-in-time view of the counters, serialized into the log.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Messages read from all inputs.
    pub received: u64,
    /// Successful writes across all outputs.
    pub dispatched: u64,
    /// Writes that failed; the pipeline kept going.
    pub write_errors: u64,
    /// Messages an input-side limiter refused.
    pub skipped: u64,
}

impl PipelineStats {
    /// Fresh zeroed counters.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Counts one message read from an input.
    pub fn incr_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one successful output write.
    pub fn incr_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one failed output write.
    pub fn incr_write_errors(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one message skipped by an input-side limiter.
    pub fn incr_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads all counters at once.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }

    /// Logs a JSON snapshot every `interval` until `quit` fires.
    pub fn spawn_reporter(
        self: Arc<Self>,
        interval: Duration,
        mut quit: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let stats = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = quit.changed() => return,
                    _ = ticker.tick() => {
                        let snapshot = stats.snapshot();
                        match serde_json::to_string(&snapshot) {
                            Ok(json) => tracing::info!(target: "recast::stats", %json, "pipeline stats"),
                            Err(e) => tracing::warn!(error = %e, "could not serialize stats"),
                        }
                    }
                }
            }
        })
    }
}

/// Fixed-capacity ring of latency samples with percentile extraction.
///
/// Used by the HTTP output when `stats` is enabled; old samples are
/// overwritten once the ring is full.
#[derive(Debug)]
pub struct LatencyRing {
    samples: Mutex<RingState>,
    capacity: usize,
}

#[derive(Debug)]
struct RingState {
    samples: Vec<u64>,
    next: usize,
}

impl LatencyRing {
    /// A ring holding up to `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        LatencyRing {
            samples: Mutex::new(RingState {
                samples: Vec::with_capacity(capacity.max(1)),
                next: 0,
            }),
            capacity: capacity.max(1),
        }
    }

    /// Records one sample, evicting the oldest when full.
    pub fn record(&self, latency: Duration) {
        let nanos = latency.as_nanos() as u64;
        let mut state = self.samples.lock().expect("latency ring poisoned");
        if state.samples.len() < self.capacity {
            state.samples.push(nanos);
        } else {
            let next = state.next;
            state.samples[next] = nanos;
        }
        state.next = (state.next + 1) % self.capacity;
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.samples.lock().expect("latency ring poisoned").samples.len()
    }

    /// True before the first sample lands.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `percentile` (0.0–100.0) over the held samples.
    pub fn percentile(&self, percentile: f64) -> Option<Duration> {
        let state = self.samples.lock().expect("latency ring poisoned");
        if state.samples.is_empty() {
            return None;
        }
        let mut sorted = state.samples.clone();
        sorted.sort_unstable();
        let rank = (percentile / 100.0 * (sorted.len() - 1) as f64).round() as usize;
        let rank = rank.min(sorted.len() - 1);
        Some(Duration::from_nanos(sorted[rank]))
    }
}
