//! Benchmark runner with thread-level concurrency control.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};

use super::config::{BenchmarkConfig, ErrorPolicy};
use super::metrics::{IterationSnapshot, MetricsCollector, ThreadRecorder};
use super::trial::TrialContext;
use crate::error::{BenchError, Result, TrialError};
use crate::models::CreateArtifact;
use crate::variants::{ClientVariant, VariantKind};

/// How often the coordinating thread checks the stop flag
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Measured iterations of one variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantRun {
    pub variant: VariantKind,
    pub iterations: Vec<IterationSnapshot>,
}

impl VariantRun {
    pub fn successes(&self) -> u64 {
        self.iterations.iter().map(|i| i.successes).sum()
    }

    pub fn failures(&self) -> u64 {
        self.iterations.iter().map(|i| i.failures).sum()
    }
}

/// Everything one fork measured, in variant order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForkOutcome {
    pub fork: usize,
    pub runs: Vec<VariantRun>,
}

/// Benchmark runner that drives client variants from many threads at once
pub struct BenchmarkRunner {
    config: BenchmarkConfig,
}

impl BenchmarkRunner {
    /// Create a new benchmark runner
    pub fn new(config: BenchmarkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Run every configured variant in the current process
    pub fn run_fork(&self, fork: usize) -> Result<ForkOutcome> {
        let mut runs = Vec::with_capacity(self.config.variants.len());

        for &kind in &self.config.variants {
            tracing::info!(fork, variant = %kind, threads = self.config.threads, "Benchmarking variant");
            match self.run_variant(kind) {
                Ok(run) => runs.push(run),
                Err(e) => {
                    tracing::error!(fork, variant = %kind, error = %e, "Trial failed");
                    return Err(e);
                }
            }
        }

        Ok(ForkOutcome { fork, runs })
    }

    /// One trial: fresh endpoint and client, warmup, then measurement
    pub fn run_variant(&self, kind: VariantKind) -> Result<VariantRun> {
        let trial = TrialContext::setup(&self.config, &[kind])?;
        let variant = trial.variant(kind).ok_or_else(|| BenchError::ClientBuild {
            variant: kind.to_string(),
            message: "variant missing from trial".to_string(),
        })?;

        let outcome = self.measure(variant, &trial.fixtures().request);
        trial.teardown();
        outcome
    }

    /// Warmup and measured iterations against an already constructed variant
    pub fn measure(&self, variant: &dyn ClientVariant, request: &CreateArtifact) -> Result<VariantRun> {
        let kind = variant.kind();
        let unit = self.config.score_unit();

        for i in 0..self.config.warmup_iterations {
            let snapshot = self.run_iteration(variant, request, self.config.warmup_time(), false);
            tracing::debug!(
                variant = %kind,
                iteration = i + 1,
                score = snapshot.score,
                unit = %unit,
                "Warmup iteration"
            );
            if snapshot.failures > 0 {
                tracing::warn!(
                    variant = %kind,
                    failures = snapshot.failures,
                    first_error = snapshot.first_error.as_deref().unwrap_or_default(),
                    "Calls failed during warmup"
                );
            }
        }

        let abort = self.config.error_policy == ErrorPolicy::Abort;
        let mut iterations = Vec::with_capacity(self.config.measurement_iterations);

        for i in 0..self.config.measurement_iterations {
            let snapshot = self.run_iteration(variant, request, self.config.measurement_time(), abort);
            tracing::info!(
                variant = %kind,
                iteration = i + 1,
                score = snapshot.score,
                unit = %unit,
                successes = snapshot.successes,
                failures = snapshot.failures,
                "Iteration"
            );

            if abort && snapshot.failures > 0 {
                return Err(TrialError::CallFailed {
                    variant: kind.to_string(),
                    error: snapshot.first_error.unwrap_or_default(),
                }
                .into());
            }
            iterations.push(snapshot);
        }

        check_outcome(kind, &iterations)?;
        Ok(VariantRun {
            variant: kind,
            iterations,
        })
    }

    /// Run one timed iteration with `threads` workers sharing `variant`
    ///
    /// Only calls that complete before the stop flag is raised are counted.
    pub fn run_iteration(
        &self,
        variant: &dyn ClientVariant,
        request: &CreateArtifact,
        window: Duration,
        stop_on_failure: bool,
    ) -> IterationSnapshot {
        let collector = MetricsCollector::new();
        let stop = AtomicBool::new(false);
        let start_line = Barrier::new(self.config.threads + 1);
        let group_id = self.config.group_id.as_str();

        thread::scope(|scope| {
            for _ in 0..self.config.threads {
                scope.spawn(|| {
                    let mut recorder = ThreadRecorder::new();
                    start_line.wait();

                    while !stop.load(Ordering::Acquire) {
                        let started = Instant::now();
                        let result = variant.invoke_create(group_id, request);
                        let latency = started.elapsed();

                        if stop.load(Ordering::Acquire) {
                            break;
                        }
                        match result {
                            Ok(response) => {
                                std::hint::black_box(response);
                                recorder.record_success(latency);
                            }
                            Err(e) => {
                                recorder.record_failure(&e);
                                if stop_on_failure {
                                    stop.store(true, Ordering::Release);
                                }
                            }
                        }
                    }

                    collector.merge(recorder);
                });
            }

            start_line.wait();
            collector.start();
            let deadline = Instant::now() + window;

            while !stop.load(Ordering::Acquire) {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                thread::sleep((deadline - now).min(POLL_INTERVAL));
            }

            stop.store(true, Ordering::Release);
            collector.stop();
        });

        collector.snapshot(self.config.mode, self.config.time_unit)
    }
}

/// A trial needs at least one successful measured call
fn check_outcome(kind: VariantKind, iterations: &[IterationSnapshot]) -> std::result::Result<(), TrialError> {
    let successes: u64 = iterations.iter().map(|i| i.successes).sum();
    let failures: u64 = iterations.iter().map(|i| i.failures).sum();

    if successes > 0 {
        return Ok(());
    }
    if failures > 0 {
        return Err(TrialError::AllCallsFailed {
            variant: kind.to_string(),
            failures,
            first_error: iterations
                .iter()
                .find_map(|i| i.first_error.clone())
                .unwrap_or_default(),
        });
    }
    Err(TrialError::NoCompletedCalls {
        variant: kind.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvokeError;
    use crate::fixture::Fixtures;
    use crate::models::CreateArtifactResponse;
    use crate::serialization::SerializationPolicy;
    use std::sync::atomic::AtomicU64;

    fn quick_config() -> BenchmarkConfig {
        BenchmarkConfig {
            threads: 4,
            warmup_iterations: 1,
            warmup_time_ms: 50,
            measurement_iterations: 2,
            measurement_time_ms: 100,
            forks: 0,
            ..Default::default()
        }
    }

    /// In-process variant answering from the fixture, optionally failing
    struct StubVariant {
        response: CreateArtifactResponse,
        fail_every: Option<u64>,
        delay: Duration,
        calls: AtomicU64,
    }

    impl StubVariant {
        fn new(fail_every: Option<u64>, delay: Duration) -> Self {
            Self {
                response: Fixtures::build().unwrap().response.expected,
                fail_every,
                delay,
                calls: AtomicU64::new(0),
            }
        }
    }

    impl ClientVariant for StubVariant {
        fn kind(&self) -> VariantKind {
            VariantKind::ReqwestBlocking
        }

        fn base_url(&self) -> &str {
            "http://stub.invalid/"
        }

        fn serialization(&self) -> SerializationPolicy {
            SerializationPolicy::default()
        }

        fn invoke_create(
            &self,
            _group_id: &str,
            _request: &CreateArtifact,
        ) -> std::result::Result<CreateArtifactResponse, InvokeError> {
            let n = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            match self.fail_every {
                Some(every) if n % every == 0 => Err(InvokeError::Transport("injected".to_string())),
                _ => Ok(self.response.clone()),
            }
        }
    }

    #[test]
    fn test_iteration_counts_successes() {
        let runner = BenchmarkRunner::new(quick_config()).unwrap();
        let variant = StubVariant::new(None, Duration::from_millis(1));
        let request = Fixtures::build().unwrap().request;

        let snapshot = runner.run_iteration(&variant, &request, Duration::from_millis(100), false);

        assert!(snapshot.successes > 0);
        assert_eq!(snapshot.failures, 0);
        assert!(snapshot.score > 0.0);
        assert!(snapshot.elapsed_secs >= 0.1);
        // Calls that finished after the stop flag are discarded.
        assert!(snapshot.successes <= variant.calls.load(Ordering::Relaxed));
    }

    #[test]
    fn test_failures_excluded_from_score() {
        let runner = BenchmarkRunner::new(quick_config()).unwrap();
        let variant = StubVariant::new(Some(2), Duration::from_millis(1));
        let request = Fixtures::build().unwrap().request;

        let run = runner.measure(&variant, &request).unwrap();

        assert_eq!(run.iterations.len(), 2);
        assert!(run.failures() > 0);
        for iteration in &run.iterations {
            let expected = iteration.successes as f64 / iteration.elapsed_secs;
            assert!((iteration.score - expected).abs() / expected < 1e-6);
            assert_eq!(iteration.failure_kinds.get("transport"), Some(&iteration.failures));
        }
    }

    #[test]
    fn test_all_failures_fail_the_trial() {
        let runner = BenchmarkRunner::new(quick_config()).unwrap();
        let variant = StubVariant::new(Some(1), Duration::from_millis(1));
        let request = Fixtures::build().unwrap().request;

        let err = runner.measure(&variant, &request).unwrap_err();
        match err {
            BenchError::Trial(TrialError::AllCallsFailed {
                failures,
                first_error,
                ..
            }) => {
                assert!(failures > 0);
                assert!(first_error.contains("injected"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_abort_policy_stops_on_first_failure() {
        let config = BenchmarkConfig {
            error_policy: ErrorPolicy::Abort,
            warmup_iterations: 0,
            ..quick_config()
        };
        let runner = BenchmarkRunner::new(config).unwrap();
        let variant = StubVariant::new(Some(10), Duration::ZERO);
        let request = Fixtures::build().unwrap().request;

        let err = runner.measure(&variant, &request).unwrap_err();
        assert!(matches!(
            err,
            BenchError::Trial(TrialError::CallFailed { .. })
        ));
    }

    #[test]
    fn test_hung_calls_produce_no_completed_calls() {
        let config = BenchmarkConfig {
            warmup_iterations: 0,
            measurement_iterations: 1,
            measurement_time_ms: 20,
            ..quick_config()
        };
        let runner = BenchmarkRunner::new(config).unwrap();
        let variant = StubVariant::new(None, Duration::from_millis(200));
        let request = Fixtures::build().unwrap().request;

        let err = runner.measure(&variant, &request).unwrap_err();
        assert!(matches!(
            err,
            BenchError::Trial(TrialError::NoCompletedCalls { .. })
        ));
    }

    #[test]
    fn test_runner_rejects_invalid_config() {
        let config = BenchmarkConfig {
            threads: 0,
            ..Default::default()
        };
        assert!(BenchmarkRunner::new(config).is_err());
    }

    #[test]
    fn test_run_fork_against_mock_endpoint() {
        let config = BenchmarkConfig {
            variants: vec![VariantKind::UreqHttp1, VariantKind::ReqwestAsync],
            ..quick_config()
        };
        let runner = BenchmarkRunner::new(config).unwrap();

        let outcome = runner.run_fork(3).unwrap();

        assert_eq!(outcome.fork, 3);
        assert_eq!(outcome.runs.len(), 2);
        assert_eq!(outcome.runs[0].variant, VariantKind::UreqHttp1);
        assert_eq!(outcome.runs[1].variant, VariantKind::ReqwestAsync);
        for run in &outcome.runs {
            assert_eq!(run.iterations.len(), 2);
            assert!(run.successes() > 0);
            assert_eq!(run.failures(), 0);
        }
    }

    #[test]
    fn test_check_outcome() {
        let empty = IterationSnapshot {
            score: 0.0,
            successes: 0,
            failures: 0,
            elapsed_secs: 0.1,
            latency_mean_ms: 0.0,
            latency_p50_ms: 0.0,
            latency_p99_ms: 0.0,
            latency_max_ms: 0.0,
            failure_kinds: Default::default(),
            first_error: None,
        };
        assert_eq!(
            check_outcome(VariantKind::UreqHttp1, &[empty.clone()]),
            Err(TrialError::NoCompletedCalls {
                variant: "ureq-http1".to_string()
            })
        );

        let ok = IterationSnapshot {
            successes: 1,
            ..empty
        };
        assert!(check_outcome(VariantKind::UreqHttp1, &[ok]).is_ok());
    }
}
