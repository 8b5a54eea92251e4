//! Metrics collection using HdrHistogram for accurate percentile calculations.
//!
//! Measurement threads record into their own `ThreadRecorder` without any
//! shared state; recorders are merged into a `MetricsCollector` once, when a
//! thread finishes its iteration.

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::config::{Mode, TimeUnit};
use crate::error::InvokeError;

/// Highest trackable call latency: one minute, in nanoseconds
const MAX_LATENCY_NS: u64 = 60_000_000_000;

fn new_histogram() -> Histogram<u64> {
    Histogram::new_with_bounds(1, MAX_LATENCY_NS, 3).expect("constant histogram bounds are valid")
}

/// Per-thread, lock-free recording of call outcomes
pub struct ThreadRecorder {
    /// Latency of successful calls (nanoseconds)
    latency: Histogram<u64>,
    successes: u64,
    failures: u64,
    failure_kinds: BTreeMap<&'static str, u64>,
    first_error: Option<String>,
}

impl ThreadRecorder {
    pub fn new() -> Self {
        Self {
            latency: new_histogram(),
            successes: 0,
            failures: 0,
            failure_kinds: BTreeMap::new(),
            first_error: None,
        }
    }

    pub fn record_success(&mut self, latency: Duration) {
        let nanos = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.latency.saturating_record(nanos.max(1));
        self.successes += 1;
    }

    pub fn record_failure(&mut self, error: &InvokeError) {
        self.failures += 1;
        *self.failure_kinds.entry(error.kind()).or_insert(0) += 1;
        if self.first_error.is_none() {
            self.first_error = Some(error.to_string());
        }
    }

    pub fn successes(&self) -> u64 {
        self.successes
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    fn absorb(&mut self, other: ThreadRecorder) {
        if let Err(e) = self.latency.add(&other.latency) {
            tracing::warn!(error = ?e, "Failed to merge latency histogram");
        }
        self.successes += other.successes;
        self.failures += other.failures;
        for (kind, count) in other.failure_kinds {
            *self.failure_kinds.entry(kind).or_insert(0) += count;
        }
        if self.first_error.is_none() {
            self.first_error = other.first_error;
        }
    }
}

impl Default for ThreadRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe collector for one benchmark iteration
pub struct MetricsCollector {
    merged: Mutex<ThreadRecorder>,
    /// Start time of the measurement window
    start_time: Mutex<Option<Instant>>,
    /// End time of the measurement window
    end_time: Mutex<Option<Instant>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            merged: Mutex::new(ThreadRecorder::new()),
            start_time: Mutex::new(None),
            end_time: Mutex::new(None),
        }
    }

    /// Mark the start of the measurement window
    pub fn start(&self) {
        *self.start_time.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    /// Mark the end of the measurement window
    pub fn stop(&self) {
        *self.end_time.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    /// Fold a finished thread's recorder into the iteration totals
    pub fn merge(&self, recorder: ThreadRecorder) {
        self.merged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .absorb(recorder);
    }

    /// Length of the measurement window
    pub fn elapsed(&self) -> Duration {
        let start = *self.start_time.lock().unwrap_or_else(PoisonError::into_inner);
        let end = *self.end_time.lock().unwrap_or_else(PoisonError::into_inner);
        match (start, end) {
            (Some(s), Some(e)) => e.duration_since(s),
            (Some(s), None) => s.elapsed(),
            _ => Duration::ZERO,
        }
    }

    pub fn success_count(&self) -> u64 {
        self.merged.lock().unwrap_or_else(PoisonError::into_inner).successes
    }

    pub fn error_count(&self) -> u64 {
        self.merged.lock().unwrap_or_else(PoisonError::into_inner).failures
    }

    /// Create a snapshot scored according to `mode`
    pub fn snapshot(&self, mode: Mode, unit: TimeUnit) -> IterationSnapshot {
        let elapsed = self.elapsed();
        let merged = self.merged.lock().unwrap_or_else(PoisonError::into_inner);

        let (mean_ns, p50_ns, p99_ns, max_ns) = if merged.successes == 0 {
            (0.0, 0, 0, 0)
        } else {
            (
                merged.latency.mean(),
                merged.latency.value_at_quantile(0.50),
                merged.latency.value_at_quantile(0.99),
                merged.latency.max(),
            )
        };

        let score = match mode {
            Mode::Throughput => {
                let window = unit.convert(elapsed);
                if window == 0.0 {
                    0.0
                } else {
                    merged.successes as f64 / window
                }
            }
            Mode::AverageTime => unit.convert(Duration::from_secs_f64(mean_ns / 1e9)),
        };

        IterationSnapshot {
            score,
            successes: merged.successes,
            failures: merged.failures,
            elapsed_secs: elapsed.as_secs_f64(),
            latency_mean_ms: mean_ns / 1e6,
            latency_p50_ms: p50_ns as f64 / 1e6,
            latency_p99_ms: p99_ns as f64 / 1e6,
            latency_max_ms: max_ns as f64 / 1e6,
            failure_kinds: merged
                .failure_kinds
                .iter()
                .map(|(kind, count)| (kind.to_string(), *count))
                .collect(),
            first_error: merged.first_error.clone(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Results of one iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationSnapshot {
    /// Throughput or average time, depending on the mode
    pub score: f64,
    pub successes: u64,
    pub failures: u64,
    pub elapsed_secs: f64,
    pub latency_mean_ms: f64,
    pub latency_p50_ms: f64,
    pub latency_p99_ms: f64,
    pub latency_max_ms: f64,
    pub failure_kinds: BTreeMap<String, u64>,
    pub first_error: Option<String>,
}
