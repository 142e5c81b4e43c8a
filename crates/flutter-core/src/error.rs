use std::time::Duration;

use thiserror::Error;

/// Validation failure for a single generator or producer configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid variation: {0}")]
    InvalidVariation(f64),

    #[error("invalid stepSize: {0}")]
    InvalidStepSize(f64),

    #[error("invalid {name}: {value} is outside [0, 1]")]
    InvalidProbability { name: &'static str, value: f64 },

    #[error("invalid duration: must be greater than zero")]
    InvalidDuration,

    #[error("cannot reconfigure a {expected} generator with a {found} spec")]
    KindMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid generator spec: {0}")]
    InvalidSpec(String),

    #[error("invalid metric name")]
    InvalidMetricName,

    #[error("no generators specified for metric")]
    NoGenerators,

    #[error("unknown generator: {0}")]
    UnknownGenerator(String),
}

/// Errors surfaced while preparing, compiling or running a script.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no script actions found")]
    NoActions,

    #[error(
        "duration {configured:?} must be greater than or equal to the last script action time {required:?}, or set to 0"
    )]
    DurationTooShort {
        configured: Duration,
        required: Duration,
    },

    #[error("metric generator {id}: {source}")]
    Generator {
        id: String,
        #[source]
        source: ConfigError,
    },

    #[error("metric {id}: {source}")]
    Producer {
        id: String,
        #[source]
        source: ConfigError,
    },

    #[error("metric not found: {0}")]
    UnknownMetric(String),

    #[error("trace producer not found: {0}")]
    UnknownTraceProducer(String),

    #[error("no timeline for metric {0}")]
    EmptyMetricTimeline(String),

    #[error("metric {0} has no segment with an end time")]
    MissingMetricEnd(String),

    #[error("no variants for trace {0}")]
    NoTraceVariants(String),

    #[error("no segments for trace {0}")]
    EmptyTraceTimeline(String),

    #[error("emitter failed: {0}")]
    Emit(#[from] EmitError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors returned across the emitter boundary.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("emit cancelled")]
    Cancelled,

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("collector returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
