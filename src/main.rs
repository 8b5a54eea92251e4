//! Registry client thread-safety benchmark CLI
//!
//! Usage:
//!   registry-bench run -t 8 -i 5 -f 1
//!   registry-bench run --config bench.toml --variants ureq-http1,reqwest-async --json
//!   registry-bench verify --threads 8 --calls 100

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use registry_client_bench::bench::{
    fork, verify_parity, BenchmarkConfig, BenchmarkReport, BenchmarkRunner, ErrorPolicy, Mode,
};
use registry_client_bench::variants::VariantKind;

#[derive(Parser)]
#[command(name = "registry-bench")]
#[command(about = "Thread-safety throughput benchmark for registry client variants")]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, env = "BENCH_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the benchmark and print a report
    Run(RunArgs),

    /// Run a single measurement fork (spawned by `run`)
    #[command(hide = true)]
    Fork {
        #[arg(long)]
        index: usize,
    },

    /// Issue a fixed number of calls per thread and check every response
    Verify {
        /// Threads sharing each client
        #[arg(short = 't', long, default_value = "8")]
        threads: usize,

        /// Calls per thread
        #[arg(short = 'n', long, default_value = "100")]
        calls: usize,

        /// Variants to check (comma-separated)
        #[arg(long, value_delimiter = ',')]
        variants: Vec<VariantKind>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Config file (TOML, YAML or JSON)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Threads sharing one client instance
    #[arg(short = 't', long)]
    threads: Option<usize>,

    /// Warmup iterations
    #[arg(long)]
    warmup_iterations: Option<usize>,

    /// Warmup iteration length in seconds
    #[arg(long)]
    warmup_time: Option<f64>,

    /// Measured iterations
    #[arg(short = 'i', long)]
    measurement_iterations: Option<usize>,

    /// Measured iteration length in seconds
    #[arg(long)]
    measurement_time: Option<f64>,

    /// Forked processes (0 measures in this process)
    #[arg(short = 'f', long)]
    forks: Option<usize>,

    /// throughput or average_time
    #[arg(short = 'm', long)]
    mode: Option<Mode>,

    /// Variants to benchmark (comma-separated)
    #[arg(long, value_delimiter = ',')]
    variants: Vec<VariantKind>,

    /// Fail the trial on the first failed measured call
    #[arg(long)]
    abort_on_error: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut BenchmarkConfig) {
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(n) = self.warmup_iterations {
            config.warmup_iterations = n;
        }
        if let Some(secs) = self.warmup_time {
            config.warmup_time_ms = secs_to_ms(secs);
        }
        if let Some(n) = self.measurement_iterations {
            config.measurement_iterations = n;
        }
        if let Some(secs) = self.measurement_time {
            config.measurement_time_ms = secs_to_ms(secs);
        }
        if let Some(forks) = self.forks {
            config.forks = forks;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if !self.variants.is_empty() {
            config.variants = self.variants.clone();
        }
        if self.abort_on_error {
            config.error_policy = ErrorPolicy::Abort;
        }
    }
}

fn secs_to_ms(secs: f64) -> u64 {
    (secs.max(0.0) * 1000.0).round() as u64
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Fork { index } => run_single_fork(index),
        Commands::Verify {
            threads,
            calls,
            variants,
        } => verify(threads, calls, variants),
    }
}

/// Logs go to stderr; stdout carries reports and fork outcomes
fn init_tracing(log_level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level.to_lowercase()));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_file(true)
            .with_line_number(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_file(true)
            .with_line_number(true)
            .init();
    }
}

fn run(args: RunArgs) -> Result<()> {
    let mut config = BenchmarkConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    tracing::info!(
        threads = config.threads,
        warmup = config.warmup_iterations,
        iterations = config.measurement_iterations,
        forks = config.forks,
        mode = %config.mode,
        variants = ?config.variants,
        "Starting benchmark"
    );

    let outcomes = if config.forks == 0 {
        let runner = BenchmarkRunner::new(config.clone())?;
        vec![runner.run_fork(0)?]
    } else {
        let exe = std::env::current_exe().context("Failed to locate the benchmark executable")?;
        fork::run_forks(&exe, &config)?
    };

    let report = BenchmarkReport::from_forks(&config, &outcomes);
    if args.json {
        println!("{}", report.to_json());
    } else {
        report.print_table();
        report.print_summary();
    }

    Ok(())
}

fn run_single_fork(index: usize) -> Result<()> {
    let config = fork::config_from_env()?;
    let runner = BenchmarkRunner::new(config)?;
    let outcome = runner
        .run_fork(index)
        .with_context(|| format!("Fork {index} failed"))?;

    println!("{}", serde_json::to_string(&outcome)?);
    Ok(())
}

fn verify(threads: usize, calls: usize, variants: Vec<VariantKind>) -> Result<()> {
    let mut config = BenchmarkConfig::load(None)?;
    config.threads = threads;
    if !variants.is_empty() {
        config.variants = variants;
    }
    config.validate()?;

    let outcomes = verify_parity(&config, threads, calls)?;
    let expected = (threads * calls) as u64;
    let mut clean = true;

    for outcome in &outcomes {
        let variant = outcome
            .variant
            .map(|v| v.to_string())
            .unwrap_or_default();
        println!(
            "{:<16} {:>6}/{:<6} ok, {} mismatched, {} failed",
            variant, outcome.successes, expected, outcome.mismatches, outcome.failures
        );
        if let Some(error) = &outcome.first_error {
            println!("{:<16} first error: {}", "", error);
        }
        clean &= outcome.is_clean() && outcome.successes == expected;
    }

    if !clean {
        anyhow::bail!("Client variants did not return identical results");
    }
    println!("All {} variants returned {} identical responses", outcomes.len(), expected);
    Ok(())
}
