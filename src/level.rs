use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Severity of a [`LogRecord`](crate::record::LogRecord).
///
/// Besides the usual `trace..fatal` ladder there are four domain levels
/// (`user_action`, `notice`, `success`, `failure`) used by application code
/// to mark business events. Every level maps onto a numeric severity so
/// destinations can filter with a single minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    UserAction,
    Notice,
    Success,
    Failure,
}

impl LogLevel {
    pub const ALL: [LogLevel; 10] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
        LogLevel::Fatal,
        LogLevel::UserAction,
        LogLevel::Notice,
        LogLevel::Success,
        LogLevel::Failure,
    ];

    /// Numeric severity used for minimum-level filtering.
    ///
    /// Domain levels sit next to their closest standard level: user actions
    /// and successes rank with `info`, notices between `info` and `warn`,
    /// failures with `error`.
    pub fn severity(self) -> u8 {
        match self {
            LogLevel::Trace => 10,
            LogLevel::Debug => 20,
            LogLevel::Info | LogLevel::UserAction | LogLevel::Success => 30,
            LogLevel::Notice => 35,
            LogLevel::Warn => 40,
            LogLevel::Error | LogLevel::Failure => 50,
            LogLevel::Fatal => 60,
        }
    }

    /// Whether a record at `self` passes a destination configured with `min`.
    pub fn admits(min: LogLevel, level: LogLevel) -> bool {
        level.severity() >= min.severity()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
            LogLevel::UserAction => "user_action",
            LogLevel::Notice => "notice",
            LogLevel::Success => "success",
            LogLevel::Failure => "failure",
        }
    }

    /// Records at or above this severity go to stderr on the console.
    pub fn is_error_like(self) -> bool {
        self.severity() >= LogLevel::Error.severity()
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown log level `{0}`")]
pub struct ParseLevelError(pub String);

impl FromStr for LogLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "fatal" | "critical" => Ok(LogLevel::Fatal),
            "user_action" | "useraction" => Ok(LogLevel::UserAction),
            "notice" => Ok(LogLevel::Notice),
            "success" => Ok(LogLevel::Success),
            "failure" => Ok(LogLevel::Failure),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

impl From<&tracing::Level> for LogLevel {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => LogLevel::Trace,
            tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::INFO => LogLevel::Info,
            tracing::Level::WARN => LogLevel::Warn,
            tracing::Level::ERROR => LogLevel::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_levels_rank_next_to_standard_ones() {
        assert!(LogLevel::admits(LogLevel::Info, LogLevel::Success));
        assert!(LogLevel::admits(LogLevel::Info, LogLevel::Notice));
        assert!(!LogLevel::admits(LogLevel::Warn, LogLevel::Notice));
        assert!(LogLevel::admits(LogLevel::Error, LogLevel::Failure));
        assert!(!LogLevel::admits(LogLevel::Error, LogLevel::Warn));
    }

    #[test]
    fn parses_aliases_and_domain_levels() {
        assert_eq!("WARNING".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!("user-action".parse::<LogLevel>(), Ok(LogLevel::UserAction));
        assert!("loud".parse::<LogLevel>().is_err());
        for level in LogLevel::ALL {
            assert_eq!(level.as_str().parse::<LogLevel>(), Ok(level));
        }
    }
}
