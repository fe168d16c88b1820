//! Durable storage for the tracking intent record.
//!
//! The record lives at `<data_dir>/<namespace>.json`. Writes replace the whole
//! record atomically: the new contents go to a sibling temp file, are synced,
//! and are then renamed over the target, so a crash mid-write leaves the last
//! fully-applied record in place.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::types::TrackingIntent;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// IntentStore
// ---------------------------------------------------------------------------

/// Read-modify-write access to the single persisted intent record.
pub trait IntentStore: Send + Sync {
    /// Read the record. A missing record yields the default intent.
    fn load(&self) -> Result<TrackingIntent, StoreError>;

    /// Replace the whole record.
    fn save(&self, intent: &TrackingIntent) -> Result<(), StoreError>;
}

/// JSON-file-backed intent store.
pub struct FileIntentStore {
    path: PathBuf,
}

impl FileIntentStore {
    /// Store the record for `namespace` inside `data_dir`.
    pub fn new(data_dir: impl AsRef<Path>, namespace: &str) -> Self {
        Self {
            path: data_dir.as_ref().join(format!("{namespace}.json")),
        }
    }

    /// Return the file path this store reads/writes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl IntentStore for FileIntentStore {
    fn load(&self) -> Result<TrackingIntent, StoreError> {
        if !self.path.exists() {
            return Ok(TrackingIntent::default());
        }
        let data = std::fs::read_to_string(&self.path)?;
        let intent: TrackingIntent = serde_json::from_str(&data)?;
        Ok(intent)
    }

    fn save(&self, intent: &TrackingIntent) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(intent)?;
        let tmp = self.temp_path();
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!(
            path = %self.path.display(),
            is_running = intent.is_running,
            is_manually_stopped = intent.is_manually_stopped,
            "tracking intent persisted"
        );
        Ok(())
    }
}

/// In-memory intent store for tests and embedders without a filesystem.
#[derive(Default)]
pub struct MemoryIntentStore {
    record: Mutex<Option<TrackingIntent>>,
}

impl MemoryIntentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing record, as if it had been persisted earlier.
    pub fn with_intent(intent: TrackingIntent) -> Self {
        Self {
            record: Mutex::new(Some(intent)),
        }
    }

    /// The last saved record, if any save happened.
    pub fn snapshot(&self) -> Option<TrackingIntent> {
        self.record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl IntentStore for MemoryIntentStore {
    fn load(&self) -> Result<TrackingIntent, StoreError> {
        Ok(self.snapshot().unwrap_or_default())
    }

    fn save(&self, intent: &TrackingIntent) -> Result<(), StoreError> {
        let mut record = self
            .record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *record = Some(intent.clone());
        Ok(())
    }
}
