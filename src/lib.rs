pub mod builder;
pub mod categorize;
pub mod context;
pub mod destination;
pub mod env;
pub mod error;
pub mod init;
pub mod layer;
pub mod level;
pub mod logger;
pub mod persist;
pub mod queue;
pub mod record;
pub mod sampler;
pub mod sanitize;
pub mod session;

pub use builder::{Fields, RecordDraft};
pub use context::{
    ContextStore, CooperativeContext, LogContext, RequestContext, Runtime, TaskLocalContext,
};
pub use error::{ConfigError, PersistError};
pub use init::{init_tracing, init_tracing_with_config, Environment, LoggerConfig};
pub use layer::FanoutLayer;
pub use level::LogLevel;
pub use logger::{Logger, LoggerStats};
pub use persist::{persist_fn, NoopPersist, Persist};
pub use record::{ErrorInfo, LogRecord};
