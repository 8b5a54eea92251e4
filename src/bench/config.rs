//! Configuration structs for benchmarking.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{BenchError, Result};
use crate::serialization::{DateEncoding, SerializationPolicy};
use crate::variants::{TransportPolicy, VariantKind};

/// Prefix of environment variables overriding the benchmark config
pub const ENV_PREFIX: &str = "BENCH";

/// What a score measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Successful operations per time unit
    #[default]
    Throughput,
    /// Mean time per successful operation
    AverageTime,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Throughput => write!(f, "throughput"),
            Mode::AverageTime => write!(f, "average_time"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "throughput" | "thrpt" => Ok(Mode::Throughput),
            "average_time" | "avgt" => Ok(Mode::AverageTime),
            _ => Err(format!("Unknown mode: {}", s)),
        }
    }
}

/// Unit that scores are reported in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    #[default]
    Seconds,
    Milliseconds,
    Microseconds,
}

impl TimeUnit {
    /// Length of `duration` expressed in this unit
    pub fn convert(&self, duration: Duration) -> f64 {
        match self {
            TimeUnit::Seconds => duration.as_secs_f64(),
            TimeUnit::Milliseconds => duration.as_secs_f64() * 1_000.0,
            TimeUnit::Microseconds => duration.as_secs_f64() * 1_000_000.0,
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            TimeUnit::Seconds => "s",
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Microseconds => "us",
        }
    }
}

/// What to do when a measured call fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Count the failure and keep measuring
    #[default]
    Exclude,
    /// Stop the iteration and fail the trial
    Abort,
}

/// Pool and timeout settings applied to every variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Idle pooled connections kept per host
    pub pool_max_idle_per_host: usize,
    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Whole-request timeout in milliseconds (none by default)
    pub request_timeout_ms: Option<u64>,
    /// Force or lift HTTP/1.1 pinning for every variant
    pub http1_only: Option<bool>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        let defaults = TransportPolicy::default();
        Self {
            pool_max_idle_per_host: defaults.pool_max_idle_per_host,
            connect_timeout_ms: defaults.connect_timeout_ms,
            request_timeout_ms: defaults.request_timeout_ms,
            http1_only: None,
        }
    }
}

/// Settings for a single variant, taking precedence over run-wide ones
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariantOverrides {
    pub date_encoding: Option<DateEncoding>,
    pub http1_only: Option<bool>,
}

/// Configuration for a benchmark run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Concurrent threads sharing one client instance
    pub threads: usize,
    /// Warmup iterations (discarded)
    pub warmup_iterations: usize,
    /// Length of each warmup iteration in milliseconds
    pub warmup_time_ms: u64,
    /// Measured iterations
    pub measurement_iterations: usize,
    /// Length of each measured iteration in milliseconds
    pub measurement_time_ms: u64,
    /// Forked processes (0 runs in the current process)
    pub forks: usize,
    pub mode: Mode,
    pub time_unit: TimeUnit,
    /// Group id passed to every create call
    pub group_id: String,
    /// Client variants to benchmark, in order
    pub variants: Vec<VariantKind>,
    pub error_policy: ErrorPolicy,
    /// Date encoding for variants that do not pin their own
    pub date_encoding: Option<DateEncoding>,
    pub transport: TransportSettings,
    /// Per-variant settings, keyed by variant tag
    pub variant_overrides: BTreeMap<VariantKind, VariantOverrides>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            threads: 8,
            warmup_iterations: 3,
            warmup_time_ms: 1_000,
            measurement_iterations: 5,
            measurement_time_ms: 1_000,
            forks: 1,
            mode: Mode::Throughput,
            time_unit: TimeUnit::Seconds,
            group_id: "default".to_string(),
            variants: VariantKind::ALL.to_vec(),
            error_policy: ErrorPolicy::Exclude,
            date_encoding: None,
            transport: TransportSettings::default(),
            variant_overrides: BTreeMap::new(),
        }
    }
}

impl BenchmarkConfig {
    /// Load config with priority: env (`BENCH_*`) > file > defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("variants"),
        );

        let config: BenchmarkConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| BenchError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot produce a measurement
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(BenchError::Config("threads must be at least 1".to_string()));
        }
        if self.measurement_iterations == 0 {
            return Err(BenchError::Config(
                "measurement_iterations must be at least 1".to_string(),
            ));
        }
        if self.measurement_time_ms == 0 {
            return Err(BenchError::Config(
                "measurement_time_ms must be positive".to_string(),
            ));
        }
        if self.warmup_iterations > 0 && self.warmup_time_ms == 0 {
            return Err(BenchError::Config(
                "warmup_time_ms must be positive when warmup is enabled".to_string(),
            ));
        }
        if self.variants.is_empty() {
            return Err(BenchError::Config("no client variants selected".to_string()));
        }
        Ok(())
    }

    pub fn warmup_time(&self) -> Duration {
        Duration::from_millis(self.warmup_time_ms)
    }

    pub fn measurement_time(&self) -> Duration {
        Duration::from_millis(self.measurement_time_ms)
    }

    /// Policies `kind` is built with: its defaults, then run-wide settings,
    /// then its own overrides
    pub fn policies_for(&self, kind: VariantKind) -> (SerializationPolicy, TransportPolicy) {
        let (mut serialization, mut transport) = kind.default_policies();

        transport.pool_max_idle_per_host = self.transport.pool_max_idle_per_host;
        transport.connect_timeout_ms = self.transport.connect_timeout_ms;
        transport.request_timeout_ms = self.transport.request_timeout_ms;
        if let Some(http1_only) = self.transport.http1_only {
            transport.http1_only = http1_only;
        }

        if let Some(dates) = self.date_encoding {
            if !kind.pins_date_encoding() {
                serialization.dates = dates;
            }
        }

        if let Some(overrides) = self.variant_overrides.get(&kind) {
            if let Some(dates) = overrides.date_encoding {
                serialization.dates = dates;
            }
            if let Some(http1_only) = overrides.http1_only {
                transport.http1_only = http1_only;
            }
        }

        (serialization, transport)
    }

    /// Unit label for scores, e.g. `ops/s` or `us/op`
    pub fn score_unit(&self) -> String {
        match self.mode {
            Mode::Throughput => format!("ops/{}", self.time_unit.suffix()),
            Mode::AverageTime => format!("{}/op", self.time_unit.suffix()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_protocol() {
        let config = BenchmarkConfig::default();
        assert_eq!(config.threads, 8);
        assert_eq!(config.warmup_iterations, 3);
        assert_eq!(config.measurement_iterations, 5);
        assert_eq!(config.warmup_time(), Duration::from_secs(1));
        assert_eq!(config.measurement_time(), Duration::from_secs(1));
        assert_eq!(config.forks, 1);
        assert_eq!(config.mode, Mode::Throughput);
        assert_eq!(config.variants.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_threads() {
        let config = BenchmarkConfig {
            threads: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(BenchError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_iterations_and_windows() {
        let config = BenchmarkConfig {
            measurement_iterations: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = BenchmarkConfig {
            measurement_time_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = BenchmarkConfig {
            warmup_time_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = BenchmarkConfig {
            warmup_iterations: 0,
            warmup_time_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_variants() {
        let config = BenchmarkConfig {
            variants: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: BenchmarkConfig = serde_json::from_str(
            r#"{"threads": 16, "mode": "average_time", "variants": ["ureq-http1"]}"#,
        )
        .unwrap();
        assert_eq!(config.threads, 16);
        assert_eq!(config.mode, Mode::AverageTime);
        assert_eq!(config.variants, vec![VariantKind::UreqHttp1]);
        assert_eq!(config.measurement_iterations, 5);
        assert_eq!(config.transport, TransportSettings::default());
        assert!(config.variant_overrides.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("bench-config-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            "threads = 4\nmeasurement_iterations = 2\nerror_policy = \"abort\"\n\n[transport]\npool_max_idle_per_host = 8\n",
        )
        .unwrap();

        let config = BenchmarkConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.threads, 4);
        assert_eq!(config.measurement_iterations, 2);
        assert_eq!(config.error_policy, ErrorPolicy::Abort);
        assert_eq!(config.transport.pool_max_idle_per_host, 8);
        assert_eq!(config.transport.http1_only, None);
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let path = std::env::temp_dir().join("definitely-missing-bench-config.toml");
        assert!(matches!(
            BenchmarkConfig::load(Some(&path)),
            Err(BenchError::Config(_))
        ));
    }

    #[test]
    fn test_policies_follow_variant_defaults() {
        let config = BenchmarkConfig::default();
        for kind in VariantKind::ALL {
            assert_eq!(config.policies_for(kind), kind.default_policies());
        }
    }

    #[test]
    fn test_run_wide_date_encoding_skips_pinned_variant() {
        let config = BenchmarkConfig {
            date_encoding: Some(DateEncoding::EpochMillis),
            ..Default::default()
        };

        let (blocking, _) = config.policies_for(VariantKind::ReqwestBlocking);
        let (ureq, _) = config.policies_for(VariantKind::UreqHttp1);
        let (asynchronous, _) = config.policies_for(VariantKind::ReqwestAsync);
        assert_eq!(blocking.dates, DateEncoding::EpochMillis);
        assert_eq!(ureq.dates, DateEncoding::EpochMillis);
        assert_eq!(asynchronous.dates, DateEncoding::Iso8601);
    }

    #[test]
    fn test_variant_overrides_take_precedence() {
        let config: BenchmarkConfig = serde_json::from_str(
            r#"{
                "date_encoding": "epoch_millis",
                "transport": {"http1_only": true, "pool_max_idle_per_host": 4},
                "variant_overrides": {
                    "reqwest-async": {"date_encoding": "epoch_millis"},
                    "reqwest-blocking": {"http1_only": false}
                }
            }"#,
        )
        .unwrap();

        let (serialization, transport) = config.policies_for(VariantKind::ReqwestAsync);
        assert_eq!(serialization.dates, DateEncoding::EpochMillis);
        assert!(transport.http1_only);
        assert_eq!(transport.pool_max_idle_per_host, 4);

        let (_, transport) = config.policies_for(VariantKind::ReqwestBlocking);
        assert!(!transport.http1_only);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("thrpt".parse::<Mode>().unwrap(), Mode::Throughput);
        assert_eq!("AVERAGE_TIME".parse::<Mode>().unwrap(), Mode::AverageTime);
        assert!("latency".parse::<Mode>().is_err());
    }

    #[test]
    fn test_score_unit() {
        let config = BenchmarkConfig::default();
        assert_eq!(config.score_unit(), "ops/s");

        let config = BenchmarkConfig {
            mode: Mode::AverageTime,
            time_unit: TimeUnit::Microseconds,
            ..Default::default()
        };
        assert_eq!(config.score_unit(), "us/op");
    }

    #[test]
    fn test_time_unit_convert() {
        let d = Duration::from_millis(1500);
        assert!((TimeUnit::Seconds.convert(d) - 1.5).abs() < 1e-9);
        assert!((TimeUnit::Milliseconds.convert(d) - 1500.0).abs() < 1e-6);
        assert!((TimeUnit::Microseconds.convert(d) - 1_500_000.0).abs() < 1e-3);
    }
}
