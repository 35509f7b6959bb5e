//! Environment variable names used by [`LoggerConfig::from_env`].
//!
//! These are purely helpers; the core types remain decoupled from
//! environment access.
//!
//! [`LoggerConfig::from_env`]: crate::init::LoggerConfig::from_env

/// `development`, `production` or `test`.
pub const LOG_FANOUT_ENV: &str = "LOG_FANOUT_ENV";

/// Holds the session id when session storage is the environment.
pub const LOG_FANOUT_SESSION_ID_ENV: &str = "LOG_FANOUT_SESSION_ID";

/// Minimum level written to the console.
pub const LOG_FANOUT_CONSOLE_LEVEL_ENV: &str = "LOG_FANOUT_CONSOLE_LEVEL";

/// Directory for the file destination. Setting it enables the destination.
pub const LOG_FANOUT_FILE_DIR_ENV: &str = "LOG_FANOUT_FILE_DIR";

/// Minimum level written to the file destination.
pub const LOG_FANOUT_FILE_LEVEL_ENV: &str = "LOG_FANOUT_FILE_LEVEL";

/// `true`/`false`, enables the batched database destination.
pub const LOG_FANOUT_DATABASE_ENABLED_ENV: &str = "LOG_FANOUT_DATABASE_ENABLED";

/// Minimum level enqueued for the database destination.
pub const LOG_FANOUT_DATABASE_LEVEL_ENV: &str = "LOG_FANOUT_DATABASE_LEVEL";

pub const LOG_FANOUT_BATCH_SIZE_ENV: &str = "LOG_FANOUT_BATCH_SIZE";

/// Milliseconds.
pub const LOG_FANOUT_FLUSH_INTERVAL_ENV: &str = "LOG_FANOUT_FLUSH_INTERVAL_MS";

pub const LOG_FANOUT_MAX_QUEUE_SIZE_ENV: &str = "LOG_FANOUT_MAX_QUEUE_SIZE";

pub const LOG_FANOUT_MAX_RETRIES_ENV: &str = "LOG_FANOUT_MAX_RETRIES";

/// Sampling probability in `[0, 1]`.
pub const LOG_FANOUT_SAMPLE_RATE_ENV: &str = "LOG_FANOUT_SAMPLE_RATE";

/// Comma-separated levels subject to sampling, e.g. `trace,debug`.
pub const LOG_FANOUT_SAMPLED_LEVELS_ENV: &str = "LOG_FANOUT_SAMPLED_LEVELS";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read an environment variable, treating empty values as unset.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
