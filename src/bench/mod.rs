//! Thread-safety throughput benchmark for registry client variants.
//!
//! This module provides:
//! - A mock registry endpoint serving canned responses over HTTP
//! - Per-trial setup and teardown of endpoint, fixtures and clients
//! - A multi-threaded runner with warmup and measured iterations
//! - Fork isolation through re-execution of the current binary
//! - HdrHistogram-based metrics and report generation

pub mod config;
pub mod fork;
pub mod metrics;
pub mod mock_server;
pub mod report;
pub mod runner;
pub mod trial;
pub mod verify;

pub use config::{BenchmarkConfig, ErrorPolicy, Mode, TimeUnit, TransportSettings, VariantOverrides};
pub use metrics::{IterationSnapshot, MetricsCollector};
pub use mock_server::{MockEndpoint, StubRule};
pub use report::BenchmarkReport;
pub use runner::{BenchmarkRunner, ForkOutcome, VariantRun};
pub use trial::TrialContext;
pub use verify::{verify_parity, ParityOutcome};
