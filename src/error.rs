use std::path::PathBuf;
use std::time::Duration;

/// Error returned by a [`Persist`](crate::persist::Persist) implementation.
///
/// Kept as a boxed error so backends can surface whatever their client
/// library produces. The queue only cares whether the call failed.
pub type PersistError = Box<dyn std::error::Error + Send + Sync>;

/// Invalid logger configuration. Raised once, at construction.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("batch_size must be at least 1")]
    ZeroBatchSize,

    #[error("max_queue_size must be at least 1")]
    ZeroQueueSize,

    #[error("flush_interval must be greater than zero")]
    ZeroFlushInterval,

    #[error("base retry delay {base:?} exceeds max retry delay {max:?}")]
    RetryDelayOrder { base: Duration, max: Duration },

    #[error("sampling rate {0} is outside [0, 1]")]
    SampleRate(f64),

    #[error("invalid PII pattern `{pattern}`: {source}")]
    InvalidPiiPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("file destination enabled without a directory")]
    MissingFileDirectory,

    #[error("file destination is not available in this build")]
    FileDestinationUnavailable,

    #[error("could not open log file {path}: {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("database destination enabled without a persist function")]
    MissingPersist,

    #[error("database destination requires a running tokio runtime")]
    NoRuntime,

    #[error("invalid value `{value}` for {key}")]
    InvalidEnv { key: &'static str, value: String },
}
