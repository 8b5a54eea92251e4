//! Report generation for benchmark results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::config::{BenchmarkConfig, Mode};
use super::runner::ForkOutcome;
use crate::variants::VariantKind;

/// Complete benchmark report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub run_id: uuid::Uuid,
    pub mode: Mode,
    /// Unit of every score, e.g. `ops/s`
    pub score_unit: String,
    pub threads: usize,
    pub forks: usize,
    /// Results per variant, in configured order
    pub results: Vec<VariantResult>,
}

/// Aggregated iterations of one variant across all forks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantResult {
    pub variant: VariantKind,
    pub score: ScoreStats,
    pub successes: u64,
    pub failures: u64,
    /// Mean of the per-iteration medians
    pub latency_p50_ms: f64,
    /// Worst per-iteration p99
    pub latency_p99_ms: f64,
    pub failure_kinds: BTreeMap<String, u64>,
}

/// Summary statistics over iteration scores
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreStats {
    pub mean: f64,
    /// Sample standard deviation; zero for a single sample
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
    pub samples: usize,
}

impl ScoreStats {
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let stddev = if samples.len() > 1 {
            let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1.0);
            variance.sqrt()
        } else {
            0.0
        };

        Self {
            mean,
            stddev,
            min: samples.iter().copied().fold(f64::INFINITY, f64::min),
            max: samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            samples: samples.len(),
        }
    }
}

impl BenchmarkReport {
    /// Create a report from fork outcomes
    pub fn from_forks(config: &BenchmarkConfig, forks: &[ForkOutcome]) -> Self {
        let results = config
            .variants
            .iter()
            .map(|&kind| {
                let iterations: Vec<_> = forks
                    .iter()
                    .flat_map(|fork| fork.runs.iter())
                    .filter(|run| run.variant == kind)
                    .flat_map(|run| run.iterations.iter())
                    .collect();

                let scores: Vec<f64> = iterations.iter().map(|i| i.score).collect();
                let mut failure_kinds = BTreeMap::new();
                for iteration in &iterations {
                    for (k, count) in &iteration.failure_kinds {
                        *failure_kinds.entry(k.clone()).or_insert(0) += count;
                    }
                }

                VariantResult {
                    variant: kind,
                    score: ScoreStats::from_samples(&scores),
                    successes: iterations.iter().map(|i| i.successes).sum(),
                    failures: iterations.iter().map(|i| i.failures).sum(),
                    latency_p50_ms: if iterations.is_empty() {
                        0.0
                    } else {
                        iterations.iter().map(|i| i.latency_p50_ms).sum::<f64>()
                            / iterations.len() as f64
                    },
                    latency_p99_ms: iterations
                        .iter()
                        .map(|i| i.latency_p99_ms)
                        .fold(0.0, f64::max),
                    failure_kinds,
                }
            })
            .collect();

        Self {
            run_id: uuid::Uuid::new_v4(),
            mode: config.mode,
            score_unit: config.score_unit(),
            threads: config.threads,
            forks: forks.len(),
            results,
        }
    }

    /// Variant with the best mean score for the mode
    pub fn best(&self) -> Option<&VariantResult> {
        let measured = self.results.iter().filter(|r| r.score.samples > 0);
        match self.mode {
            Mode::Throughput => measured.max_by(|a, b| {
                a.score
                    .mean
                    .partial_cmp(&b.score.mean)
                    .unwrap_or(std::cmp::Ordering::Equal)
            }),
            Mode::AverageTime => measured.min_by(|a, b| {
                a.score
                    .mean
                    .partial_cmp(&b.score.mean)
                    .unwrap_or(std::cmp::Ordering::Equal)
            }),
        }
    }

    /// Print the report as an ASCII table
    pub fn print_table(&self) {
        println!();
        println!("╔════════════════════════════════════════════════════════════════════════════════════════════════════╗");
        println!("║                           REGISTRY CLIENT THREAD-SAFETY BENCHMARK                                  ║");
        println!("╚════════════════════════════════════════════════════════════════════════════════════════════════════╝");
        println!();
        println!(
            "Mode: {}, threads: {}, forks: {}, run: {}",
            self.mode, self.threads, self.forks, self.run_id
        );
        println!();
        println!("┌──────────────────┬─────┬──────────────┬────────────┬──────────┬──────────┬──────────┬──────────────┐");
        println!("│ Variant          │ Cnt │    Score     │   Error    │  p50(ms) │  p99(ms) │ Failures │     Units    │");
        println!("├──────────────────┼─────┼──────────────┼────────────┼──────────┼──────────┼──────────┼──────────────┤");

        for result in &self.results {
            println!(
                "│ {:<16} │ {:>3} │ {:>12.3} │ ±{:>9.3} │ {:>8.3} │ {:>8.3} │ {:>8} │ {:>12} │",
                result.variant,
                result.score.samples,
                result.score.mean,
                result.score.stddev,
                result.latency_p50_ms,
                result.latency_p99_ms,
                result.failures,
                self.score_unit
            );
        }

        println!("└──────────────────┴─────┴──────────────┴────────────┴──────────┴──────────┴──────────┴──────────────┘");
        println!();

        for result in self.results.iter().filter(|r| !r.failure_kinds.is_empty()) {
            let kinds: Vec<String> = result
                .failure_kinds
                .iter()
                .map(|(kind, count)| format!("{kind}={count}"))
                .collect();
            println!("{} failures: {}", result.variant, kinds.join(", "));
        }
    }

    /// Export the report as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Print a compact summary
    pub fn print_summary(&self) {
        println!("\n=== Benchmark Summary ===");
        for result in &self.results {
            println!(
                "{}: {:.3} ± {:.3} {} (min {:.3}, max {:.3}, n = {})",
                result.variant,
                result.score.mean,
                result.score.stddev,
                self.score_unit,
                result.score.min,
                result.score.max,
                result.score.samples
            );
        }

        if let Some(best) = self.best() {
            println!("Best: {} ({:.3} {})", best.variant, best.score.mean, self.score_unit);
        }
    }
}
