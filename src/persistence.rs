//! Snapshot persistence for the engine's calibration state.
//!
//! The only state this core persists is the RSSI histogram's bucket counts.
//! Writes are best-effort: callers log and swallow failures, never surface
//! them into the sensing path.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Atomic persist failed: {0}")]
    Persist(String),
}

/// A named blob of text that can be atomically replaced.
pub trait SnapshotStore: Send + Sync {
    /// The current snapshot contents.
    fn read(&self) -> Result<String, StoreError>;

    /// Replace the snapshot atomically.
    fn write(&self, contents: &str) -> Result<(), StoreError>;
}

/// File-backed snapshot with atomic overwrite: contents land in a temporary
/// file in the same directory, then rename over the target.
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSnapshotStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn read(&self) -> Result<String, StoreError> {
        Ok(std::fs::read_to_string(&self.path)?)
    }

    fn write(&self, contents: &str) -> Result<(), StoreError> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.persist(&self.path).map_err(|e| StoreError::Persist(e.to_string()))?;
        Ok(())
    }
}

/// In-memory store for tests and simulations.
pub struct MemorySnapshotStore {
    contents: Mutex<String>,
}

impl MemorySnapshotStore {
    pub fn new(contents: &str) -> Self {
        MemorySnapshotStore { contents: Mutex::new(contents.to_string()) }
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn read(&self) -> Result<String, StoreError> {
        Ok(self.contents.lock().unwrap().clone())
    }

    fn write(&self, contents: &str) -> Result<(), StoreError> {
        *self.contents.lock().unwrap() = contents.to_string();
        Ok(())
    }
}
