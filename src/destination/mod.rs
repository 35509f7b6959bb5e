//! Destinations a finished [`LogRecord`] is delivered to.
//!
//! The set is closed: console and file are written synchronously on the
//! calling thread, the database destination only enqueues into a
//! [`BatchQueue`]. Each destination is paired with its own minimum level in
//! a [`Route`].

mod console;
mod dispatcher;
#[cfg(feature = "file")]
mod file;

pub use console::{ConsoleFormat, ConsoleSink};
pub use dispatcher::{DestinationStats, Dispatcher};
#[cfg(feature = "file")]
pub use file::FileSink;

use crate::level::LogLevel;
use crate::queue::BatchQueue;
use crate::record::LogRecord;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// A destination written on the caller's thread.
pub trait SyncWrite: Send + Sync {
    fn write(&self, record: &LogRecord) -> io::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub min_level: LogLevel,
    /// `None` picks pretty output in development and JSON elsewhere.
    pub format: Option<ConsoleFormat>,
    pub color: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        ConsoleConfig {
            enabled: true,
            min_level: LogLevel::Debug,
            format: None,
            color: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub enabled: bool,
    /// Directory holding one `<session id>.log` file per session.
    pub directory: Option<PathBuf>,
    pub min_level: LogLevel,
}

impl Default for FileConfig {
    fn default() -> Self {
        FileConfig {
            enabled: false,
            directory: None,
            min_level: LogLevel::Info,
        }
    }
}

pub enum Destination {
    Console(ConsoleSink),
    #[cfg(feature = "file")]
    File(FileSink),
    Database(BatchQueue),
}

impl Destination {
    pub fn name(&self) -> &'static str {
        match self {
            Destination::Console(_) => "console",
            #[cfg(feature = "file")]
            Destination::File(_) => "file",
            Destination::Database(_) => "database",
        }
    }
}

/// A destination and the lowest level it accepts.
pub struct Route {
    destination: Destination,
    min_level: LogLevel,
    failures: AtomicU64,
}

impl Route {
    pub fn new(destination: Destination, min_level: LogLevel) -> Self {
        Route {
            destination,
            min_level,
            failures: AtomicU64::new(0),
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }

    pub fn accepts(&self, level: LogLevel) -> bool {
        LogLevel::admits(self.min_level, level)
    }

    /// Failed synchronous writes so far.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }
}
