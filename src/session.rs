//! Session identifier used to group every record of one process or session.

use chrono::Local;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use crate::env::LOG_FANOUT_SESSION_ID_ENV;

/// Sortable timestamp format of generated session ids, e.g. `20240131_235959`.
pub const SESSION_ID_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Where a session id is persisted between lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionStorage {
    /// Process environment variable, inherited by child processes.
    Environment { var: String },
    /// Small file holding the id, survives restarts.
    File { path: PathBuf },
    /// Nothing outlives the current execution.
    Memory,
}

impl Default for SessionStorage {
    fn default() -> Self {
        SessionStorage::Environment {
            var: LOG_FANOUT_SESSION_ID_ENV.to_string(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
enum SessionError {
    #[error("session file i/o: {0}")]
    Io(#[from] std::io::Error),
}

/// Generates, persists and caches one session id.
#[derive(Debug)]
pub struct SessionIdentity {
    storage: SessionStorage,
    cached: Mutex<Option<String>>,
}

impl SessionIdentity {
    pub fn new(storage: SessionStorage) -> Self {
        SessionIdentity {
            storage,
            cached: Mutex::new(None),
        }
    }

    pub fn storage(&self) -> &SessionStorage {
        &self.storage
    }

    /// Return the existing id or create and persist a new one.
    ///
    /// A failure to persist is not an error: the id then lives in memory for
    /// the rest of this process.
    pub fn get_or_create(&self) -> String {
        let mut cached = self.cached.lock();
        if let Some(id) = cached.as_ref() {
            return id.clone();
        }

        let id = match self.load() {
            Some(id) => id,
            None => {
                let id = generate_session_id();
                if let Err(e) = self.store(&id) {
                    eprintln!("session id not persisted, keeping it in memory: {}", e);
                }
                id
            }
        };
        *cached = Some(id.clone());
        id
    }

    /// Forget the id everywhere; the next `get_or_create` generates a new one.
    pub fn reset(&self) {
        *self.cached.lock() = None;
        match &self.storage {
            SessionStorage::Environment { var } => std::env::remove_var(var),
            SessionStorage::File { path } => {
                let _ = std::fs::remove_file(path);
            }
            SessionStorage::Memory => {}
        }
    }

    fn load(&self) -> Option<String> {
        let raw = match &self.storage {
            SessionStorage::Environment { var } => std::env::var(var).ok(),
            SessionStorage::File { path } => std::fs::read_to_string(path).ok(),
            SessionStorage::Memory => None,
        }?;
        let id = raw.trim();
        if id.is_empty() {
            None
        } else {
            Some(id.to_string())
        }
    }

    fn store(&self, id: &str) -> Result<(), SessionError> {
        match &self.storage {
            SessionStorage::Environment { var } => std::env::set_var(var, id),
            SessionStorage::File { path } => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, id)?;
            }
            SessionStorage::Memory => {}
        }
        Ok(())
    }
}

/// New id from the local wall clock.
pub fn generate_session_id() -> String {
    Local::now().format(SESSION_ID_FORMAT).to_string()
}

static GLOBAL: OnceLock<Mutex<Option<Arc<SessionIdentity>>>> = OnceLock::new();

fn global_slot() -> &'static Mutex<Option<Arc<SessionIdentity>>> {
    GLOBAL.get_or_init(|| Mutex::new(None))
}

/// Install the process-wide session identity, replacing any previous one.
pub fn init(storage: SessionStorage) -> Arc<SessionIdentity> {
    let identity = Arc::new(SessionIdentity::new(storage));
    *global_slot().lock() = Some(Arc::clone(&identity));
    identity
}

/// The process-wide session identity, created with default storage on first
/// use.
pub fn global() -> Arc<SessionIdentity> {
    let mut slot = global_slot().lock();
    match slot.as_ref() {
        Some(identity) => Arc::clone(identity),
        None => {
            let identity = Arc::new(SessionIdentity::new(SessionStorage::default()));
            *slot = Some(Arc::clone(&identity));
            identity
        }
    }
}

/// Reset the process-wide id and uninstall the global identity.
pub fn reset() {
    if let Some(identity) = global_slot().lock().take() {
        identity.reset();
    }
}
