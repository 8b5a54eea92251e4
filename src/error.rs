// Error handling module
// Defines setup, per-call and trial error types

use thiserror::Error;

/// Errors raised while setting up, running or tearing down a benchmark
#[derive(Error, Debug)]
pub enum BenchError {
    /// Mock endpoint could not bind its listening socket
    #[error("Failed to bind mock endpoint on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A tokio runtime could not be created
    #[error("Failed to build runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// Mock endpoint was started twice
    #[error("Mock endpoint already started on port {0}")]
    AlreadyStarted(u16),

    /// Stub rule could not be registered
    #[error("Invalid stub rule: {0}")]
    InvalidStub(String),

    /// Fixture construction failed
    #[error("Fixture error: {0}")]
    Fixture(String),

    /// Client variant could not be constructed
    #[error("Failed to build client variant {variant}: {message}")]
    ClientBuild { variant: String, message: String },

    /// Variant tag not recognised
    #[error("Unknown client variant: {0}")]
    UnknownVariant(String),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Measurement produced no usable result
    #[error(transparent)]
    Trial(#[from] TrialError),

    /// A forked measurement process failed
    #[error("Fork {index} failed: {message}")]
    Fork { index: usize, message: String },
}

/// Errors surfaced by a single `invoke_create` call
#[derive(Error, Debug)]
pub enum InvokeError {
    /// Connection refused/reset, timeout or any other transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// The mock endpoint did not match the request against any stub
    #[error("Request was not matched by any stub: {body}")]
    Unmatched { body: String },

    /// Non-2xx response other than an unmatched request
    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// Request payload could not be encoded
    #[error("Encode error: {0}")]
    Encode(#[source] serde_json::Error),

    /// Response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[source] serde_json::Error),
}

impl InvokeError {
    /// Classify a non-success response
    pub fn from_status(status: u16, body: String) -> Self {
        if status == 404 {
            InvokeError::Unmatched { body }
        } else {
            InvokeError::Status { status, body }
        }
    }

    /// Short stable label used in failure tallies
    pub fn kind(&self) -> &'static str {
        match self {
            InvokeError::Transport(_) => "transport",
            InvokeError::Unmatched { .. } => "unmatched",
            InvokeError::Status { .. } => "status",
            InvokeError::Encode(_) => "encode",
            InvokeError::Decode(_) => "decode",
        }
    }
}

/// Trial-level failures detected after (or while) measuring a variant
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrialError {
    /// Every measured call failed; the stub/fixture wiring is broken
    #[error("Variant {variant}: all {failures} measured calls failed (first error: {first_error})")]
    AllCallsFailed {
        variant: String,
        failures: u64,
        first_error: String,
    },

    /// No call completed inside any measurement window
    #[error("Variant {variant}: no call completed during measurement")]
    NoCompletedCalls { variant: String },

    /// A measured call failed while the abort policy was active
    #[error("Variant {variant}: measured call failed: {error}")]
    CallFailed { variant: String, error: String },
}

/// Result type alias for benchmark setup operations
pub type Result<T> = std::result::Result<T, BenchError>;
