//! Fresh-process isolation for measurement forks.
//!
//! The parent re-executes its own binary with the `fork` subcommand and hands
//! over the resolved configuration as JSON in an environment variable. The
//! child runs every variant once and prints its `ForkOutcome` as the last line
//! of stdout; logs go to stderr, which is inherited.

use std::path::Path;
use std::process::{Command, Stdio};

use super::config::BenchmarkConfig;
use super::runner::ForkOutcome;
use crate::error::{BenchError, Result};

/// Environment variable carrying the resolved config into a fork
pub const FORK_CONFIG_ENV: &str = "REGISTRY_BENCH_FORK_CONFIG";

/// Run `config.forks` forks one after another
pub fn run_forks(exe: &Path, config: &BenchmarkConfig) -> Result<Vec<ForkOutcome>> {
    (0..config.forks)
        .map(|index| spawn_fork(exe, config, index))
        .collect()
}

/// Run a single fork of `exe` and collect its outcome
pub fn spawn_fork(exe: &Path, config: &BenchmarkConfig, index: usize) -> Result<ForkOutcome> {
    let fork_error = |message: String| BenchError::Fork { index, message };

    let payload = serde_json::to_string(&BenchmarkConfig {
        forks: 0,
        ..config.clone()
    })
    .map_err(|e| fork_error(e.to_string()))?;

    tracing::info!(fork = index, exe = %exe.display(), "Spawning fork");

    let output = Command::new(exe)
        .arg("fork")
        .arg("--index")
        .arg(index.to_string())
        .env(FORK_CONFIG_ENV, payload)
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .output()
        .map_err(|e| fork_error(format!("failed to spawn {}: {e}", exe.display())))?;

    if !output.status.success() {
        return Err(fork_error(format!("process exited with {}", output.status)));
    }

    parse_fork_output(&output.stdout, index)
}

/// Parse the outcome from the last non-empty stdout line of a fork
pub fn parse_fork_output(stdout: &[u8], index: usize) -> Result<ForkOutcome> {
    let text = String::from_utf8_lossy(stdout);
    let line = text
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| BenchError::Fork {
            index,
            message: "no outcome on stdout".to_string(),
        })?;

    serde_json::from_str(line).map_err(|e| BenchError::Fork {
        index,
        message: format!("malformed outcome: {e}"),
    })
}

/// Config handed over by the parent process
pub fn config_from_env() -> Result<BenchmarkConfig> {
    let raw = std::env::var(FORK_CONFIG_ENV)
        .map_err(|_| BenchError::Config(format!("{FORK_CONFIG_ENV} is not set")))?;
    let config: BenchmarkConfig =
        serde_json::from_str(&raw).map_err(|e| BenchError::Config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}
