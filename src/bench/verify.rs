//! Fixed-count parity check: every variant, many threads, identical results.

use serde::Serialize;
use std::thread;

use super::config::BenchmarkConfig;
use super::trial::TrialContext;
use crate::error::Result;
use crate::models::{CreateArtifact, CreateArtifactResponse};
use crate::variants::{ClientVariant, VariantKind};

/// Tally of one variant's fixed-count run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParityOutcome {
    pub variant: Option<VariantKind>,
    pub successes: u64,
    /// Calls that succeeded but decoded to something other than the fixture
    pub mismatches: u64,
    pub failures: u64,
    pub first_error: Option<String>,
}

impl ParityOutcome {
    pub fn is_clean(&self) -> bool {
        self.mismatches == 0 && self.failures == 0
    }

    fn absorb(&mut self, other: ParityOutcome) {
        self.successes += other.successes;
        self.mismatches += other.mismatches;
        self.failures += other.failures;
        if self.first_error.is_none() {
            self.first_error = other.first_error;
        }
    }
}

/// Have `threads` threads each issue `calls` create calls through every
/// configured variant, sharing one client instance per variant
pub fn verify_parity(config: &BenchmarkConfig, threads: usize, calls: usize) -> Result<Vec<ParityOutcome>> {
    let trial = TrialContext::setup(config, &config.variants)?;
    let expected = &trial.fixtures().response.expected;
    let request = &trial.fixtures().request;

    let outcomes = trial
        .variants()
        .map(|variant| {
            let mut outcome = ParityOutcome {
                variant: Some(variant.kind()),
                ..Default::default()
            };

            thread::scope(|scope| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        scope.spawn(|| call_repeatedly(variant, &config.group_id, request, expected, calls))
                    })
                    .collect();

                for handle in handles {
                    match handle.join() {
                        Ok(tally) => outcome.absorb(tally),
                        Err(_) => {
                            outcome.failures += calls as u64;
                            outcome
                                .first_error
                                .get_or_insert_with(|| "worker thread panicked".to_string());
                        }
                    }
                }
            });

            tracing::info!(
                variant = %variant.kind(),
                successes = outcome.successes,
                mismatches = outcome.mismatches,
                failures = outcome.failures,
                "Parity run finished"
            );
            outcome
        })
        .collect();

    trial.teardown();
    Ok(outcomes)
}

fn call_repeatedly(
    variant: &dyn ClientVariant,
    group_id: &str,
    request: &CreateArtifact,
    expected: &CreateArtifactResponse,
    calls: usize,
) -> ParityOutcome {
    let mut tally = ParityOutcome::default();
    for _ in 0..calls {
        match variant.invoke_create(group_id, request) {
            Ok(response) if &response == expected => tally.successes += 1,
            Ok(response) => {
                tally.mismatches += 1;
                tally
                    .first_error
                    .get_or_insert_with(|| format!("unexpected response: {response:?}"));
            }
            Err(e) => {
                tally.failures += 1;
                tally.first_error.get_or_insert_with(|| e.to_string());
            }
        }
    }
    tally
}
