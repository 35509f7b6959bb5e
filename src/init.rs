use crate::context::Runtime;
use crate::destination::{ConsoleConfig, FileConfig};
use crate::env::{
    env_opt, env_or, LOG_FANOUT_BATCH_SIZE_ENV, LOG_FANOUT_CONSOLE_LEVEL_ENV,
    LOG_FANOUT_DATABASE_ENABLED_ENV, LOG_FANOUT_DATABASE_LEVEL_ENV, LOG_FANOUT_ENV,
    LOG_FANOUT_FILE_DIR_ENV, LOG_FANOUT_FILE_LEVEL_ENV, LOG_FANOUT_FLUSH_INTERVAL_ENV,
    LOG_FANOUT_MAX_QUEUE_SIZE_ENV, LOG_FANOUT_MAX_RETRIES_ENV, LOG_FANOUT_SAMPLED_LEVELS_ENV,
    LOG_FANOUT_SAMPLE_RATE_ENV,
};
use crate::error::ConfigError;
use crate::layer::FanoutLayer;
use crate::level::LogLevel;
use crate::logger::Logger;
use crate::queue::QueueConfig;
use crate::sampler::SamplingConfig;
use crate::sanitize::{Sanitizer, SanitizerConfig};
use crate::session::SessionStorage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Deployment mode. Development gets pretty console output and echoes
/// destination failures; elsewhere failures only move counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn is_development(self) -> bool {
        self == Environment::Development
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        })
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            _ => Err(ConfigError::InvalidEnv {
                key: LOG_FANOUT_ENV,
                value: s.to_string(),
            }),
        }
    }
}

/// The batched durable destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub enabled: bool,
    pub min_level: LogLevel,
    #[serde(flatten)]
    pub queue: QueueConfig,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            enabled: false,
            min_level: LogLevel::Info,
            queue: QueueConfig::default(),
        }
    }
}

/// Everything needed to build a [`Logger`].
///
/// Deserializable from any serde format; missing sections take their
/// defaults. Checked once by [`validate`](Self::validate), which
/// [`Logger::new`] calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub environment: Environment,
    /// Picks the context store: task-local for `server`, a shared slot for
    /// `browser`, one slot per request for `edge`.
    pub runtime: Runtime,
    pub console: ConsoleConfig,
    pub file: FileConfig,
    pub database: DatabaseConfig,
    pub sampling: SamplingConfig,
    pub sanitizer: SanitizerConfig,
    /// Unset means memory on `edge` and the default environment variable
    /// elsewhere. See [`session_storage`](Self::session_storage).
    pub session: Option<SessionStorage>,
}

impl LoggerConfig {
    /// The session storage actually used, after the runtime default.
    pub fn session_storage(&self) -> SessionStorage {
        match (&self.session, self.runtime) {
            (Some(storage), _) => storage.clone(),
            (None, Runtime::Edge) => SessionStorage::Memory,
            (None, _) => SessionStorage::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.queue.validate()?;
        let rate = self.sampling.rate;
        if !(0.0..=1.0).contains(&rate) {
            return Err(ConfigError::SampleRate(rate));
        }
        Sanitizer::new(&self.sanitizer)?;
        if self.file.enabled {
            if !cfg!(feature = "file") {
                return Err(ConfigError::FileDestinationUnavailable);
            }
            if self.file.directory.is_none() {
                return Err(ConfigError::MissingFileDirectory);
            }
        }
        Ok(())
    }

    /// Defaults overridden by the `LOG_FANOUT_*` variables listed in
    /// [`crate::env`]. Unset or empty variables keep the default; malformed
    /// ones are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = LoggerConfig {
            environment: env_or(LOG_FANOUT_ENV, "development").parse()?,
            ..LoggerConfig::default()
        };

        if let Some(level) = parse_env(LOG_FANOUT_CONSOLE_LEVEL_ENV)? {
            config.console.min_level = level;
        }
        if let Some(dir) = env_opt(LOG_FANOUT_FILE_DIR_ENV) {
            config.file.enabled = true;
            config.file.directory = Some(PathBuf::from(dir));
        }
        if let Some(level) = parse_env(LOG_FANOUT_FILE_LEVEL_ENV)? {
            config.file.min_level = level;
        }
        if let Some(enabled) = parse_env(LOG_FANOUT_DATABASE_ENABLED_ENV)? {
            config.database.enabled = enabled;
        }
        if let Some(level) = parse_env(LOG_FANOUT_DATABASE_LEVEL_ENV)? {
            config.database.min_level = level;
        }

        let queue = &mut config.database.queue;
        if let Some(n) = parse_env(LOG_FANOUT_BATCH_SIZE_ENV)? {
            queue.batch_size = n;
        }
        if let Some(ms) = parse_env(LOG_FANOUT_FLUSH_INTERVAL_ENV)? {
            queue.flush_interval = Duration::from_millis(ms);
        }
        if let Some(n) = parse_env(LOG_FANOUT_MAX_QUEUE_SIZE_ENV)? {
            queue.max_queue_size = n;
        }
        if let Some(n) = parse_env(LOG_FANOUT_MAX_RETRIES_ENV)? {
            queue.max_retries = n;
        }

        if let Some(rate) = parse_env(LOG_FANOUT_SAMPLE_RATE_ENV)? {
            config.sampling.rate = rate;
        }
        if let Some(raw) = env_opt(LOG_FANOUT_SAMPLED_LEVELS_ENV) {
            config.sampling.levels = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<LogLevel>().map_err(|_| ConfigError::InvalidEnv {
                        key: LOG_FANOUT_SAMPLED_LEVELS_ENV,
                        value: raw.clone(),
                    })
                })
                .collect::<Result<_, _>>()?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_env<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env_opt(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { key, value: raw }),
    }
}

/// How the global `tracing` subscriber is assembled.
///
/// **Fields**
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt` layer is added
///   on top of [`FanoutLayer`]. The logger's own console destination
///   usually makes this redundant.
#[derive(Clone, Debug, Default)]
pub struct LayerConfig {
    pub enable_stdout: bool,
}

/// Install a global `tracing` subscriber that forwards every event to
/// `logger`.
///
/// **Effects**
///
/// Installs a [`Registry`] combined with [`FanoutLayer`] (and the `fmt`
/// layer when asked) as the global default subscriber. Returns an error if
/// another global subscriber is already set.
pub fn init_tracing_with_config(
    logger: Logger,
    config: LayerConfig,
) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let layer = FanoutLayer::new(logger);

    // Two subscriber shapes, one per type.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)
    }
}

/// Equivalent to [`init_tracing_with_config`] with [`LayerConfig::default`].
pub fn init_tracing(logger: Logger) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    init_tracing_with_config(logger, LayerConfig::default())
}
