use super::SyncWrite;
use crate::error::ConfigError;
use crate::record::LogRecord;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};

/// Appends compact JSON lines to the session's log file.
pub struct FileSink {
    path: PathBuf,
    file: Mutex<LineWriter<File>>,
}

impl FileSink {
    /// Open (or create) `<directory>/<session_id>.log` for appending.
    pub fn open(directory: &Path, session_id: &str) -> Result<Self, ConfigError> {
        let path = directory.join(format!("{}.log", session_id));
        let file = fs::create_dir_all(directory)
            .and_then(|_| OpenOptions::new().create(true).append(true).open(&path))
            .map_err(|source| ConfigError::FileOpen {
                path: path.clone(),
                source,
            })?;
        Ok(FileSink {
            path,
            file: Mutex::new(LineWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SyncWrite for FileSink {
    fn write(&self, record: &LogRecord) -> io::Result<()> {
        let line = record.to_json_line();
        let mut file = self.file.lock();
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")
    }
}
