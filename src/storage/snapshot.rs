//! Snapshot Persistence
//!
//! Saves the store's live key/value pairs to a single JSON object and reads
//! them back at startup. TTLs are not stored; restored keys are permanent.
//!
//! ## File Format
//!
//! ```text
//! {"counter":"12","name":"linekv"}
//! ```
//!
//! Keys are written in sorted order so identical contents always produce
//! identical files.
//!
//! ## Crash Safety
//!
//! A save writes `<path>.tmp`, syncs it, and renames it over `<path>`. A crash
//! at any point leaves either the previous snapshot or the new one, never a
//! half-written file.

use crate::storage::StorageEngine;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur while saving or loading a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The snapshot could not be encoded or decoded
    #[error("invalid snapshot data: {0}")]
    Format(#[from] serde_json::Error),

    /// The blocking save task panicked or was cancelled
    #[error("snapshot task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Writes and reads the snapshot file.
#[derive(Debug)]
pub struct Snapshotter {
    path: PathBuf,
    /// Serializes saves so an older view never replaces a newer one
    save_lock: Mutex<()>,
}

impl Snapshotter {
    /// Creates a snapshotter for the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            save_lock: Mutex::new(()),
        }
    }

    /// Returns the snapshot file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the current contents of `engine` to disk.
    ///
    /// The store lock is only held while the view is copied; all file I/O
    /// happens after it is released.
    ///
    /// # Returns
    ///
    /// The number of keys written.
    pub fn save(&self, engine: &StorageEngine) -> Result<usize, SnapshotError> {
        let _guard = self.save_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let view = engine.snapshot_view();
        let encoded = serde_json::to_vec(&view)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.tmp_path();
        {
            let mut writer = BufWriter::new(
                OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(&tmp_path)?,
            );
            writer.write_all(&encoded)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        fs::rename(&tmp_path, &self.path)?;

        if let Some(parent) = self.path.parent() {
            let dir = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            if let Ok(dir_file) = File::open(dir) {
                let _ = dir_file.sync_all();
            }
        }

        info!(path = %self.path.display(), keys = view.len(), "Snapshot saved");
        Ok(view.len())
    }

    /// Runs [`save`](Self::save) on the blocking thread pool.
    ///
    /// Used from async code so the fsync and rename never stall a runtime
    /// worker.
    pub async fn persist(self: Arc<Self>, engine: Arc<StorageEngine>) -> Result<usize, SnapshotError> {
        tokio::task::spawn_blocking(move || self.save(&engine)).await?
    }

    /// Reads the snapshot file.
    ///
    /// A missing file yields an empty map. So does an unreadable or corrupt
    /// file, after logging a warning: a bad snapshot never prevents startup.
    /// Entries containing a line break cannot be served over the line
    /// protocol and are skipped.
    pub fn load(&self) -> BTreeMap<String, String> {
        match self.try_load() {
            Ok(Some(entries)) => {
                info!(path = %self.path.display(), keys = entries.len(), "Snapshot loaded");
                entries
            }
            Ok(None) => {
                info!(path = %self.path.display(), "No snapshot found, starting empty");
                BTreeMap::new()
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Snapshot unreadable, starting empty"
                );
                BTreeMap::new()
            }
        }
    }

    fn try_load(&self) -> Result<Option<BTreeMap<String, String>>, SnapshotError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // A `null` document is an empty store
        let entries: Option<BTreeMap<String, String>> = serde_json::from_slice(&data)?;
        let mut entries = entries.unwrap_or_default();

        let before = entries.len();
        entries.retain(|key, value| !key.contains('\n') && !value.contains('\n'));
        if entries.len() < before {
            warn!(
                path = %self.path.display(),
                skipped = before - entries.len(),
                "Skipped snapshot entries containing line breaks"
            );
        }

        Ok(Some(entries))
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}
