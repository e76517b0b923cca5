//! Persistent storage for engine state.
//!
//! JSON documents under one data directory, one document per concern:
//! the exposure-identifier ledger, the sync-error record (including the
//! sticky time-inconsistency flag), phone-call records, and the check-in
//! diary. Only the get/set contract matters to the engine; a missing
//! document reads back as its default value.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::dedupe::ExposureDedupe;
use crate::diary::Diary;
use crate::error::{HaloError, Result};
use crate::status::SyncErrorHistory;

/// Persisted sync-error record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// The rolling sync-error history.
    pub history: SyncErrorHistory,
    /// Sticky time-inconsistency flag.
    pub time_inconsistency: bool,
}

/// Persisted phone-call records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecords {
    /// When the user last completed a hotline call.
    pub last_phone_call_at: Option<DateTime<Utc>>,
    /// Report identifiers a completed call has been associated with.
    pub called_report_ids: BTreeSet<String>,
}

/// Storage backend for halo data.
#[derive(Debug, Clone)]
pub struct Storage {
    data_dir: PathBuf,
}

impl Storage {
    /// Create a new storage instance rooted at `data_dir`.
    #[must_use]
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Get the default storage location.
    ///
    /// # Errors
    ///
    /// Returns an error if no platform data directory can be determined.
    pub fn default_location() -> Result<Self> {
        #[cfg(target_os = "linux")]
        {
            Ok(Self::new(PathBuf::from("/var/lib/halo")))
        }
        #[cfg(not(target_os = "linux"))]
        {
            let dirs = directories::ProjectDirs::from("", "", "halo")
                .ok_or(HaloError::NoPlatformDirectory("data"))?;
            Ok(Self::new(dirs.data_dir().to_path_buf()))
        }
    }

    /// Load the exposure-identifier ledger.
    pub fn load_ledger(&self) -> Result<ExposureDedupe> {
        Ok(ExposureDedupe::from_identifiers(
            self.load_document("ledger.json")?,
        ))
    }

    /// Save the exposure-identifier ledger.
    pub fn save_ledger(&self, ledger: &ExposureDedupe) -> Result<()> {
        self.save_document("ledger.json", &ledger.identifiers())
    }

    /// Load the sync-error record.
    pub fn load_sync_state(&self) -> Result<SyncState> {
        self.load_document("sync_state.json")
    }

    /// Save the sync-error record.
    pub fn save_sync_state(&self, state: &SyncState) -> Result<()> {
        self.save_document("sync_state.json", state)
    }

    /// Load the phone-call records.
    pub fn load_call_records(&self) -> Result<CallRecords> {
        self.load_document("calls.json")
    }

    /// Save the phone-call records.
    pub fn save_call_records(&self, records: &CallRecords) -> Result<()> {
        self.save_document("calls.json", records)
    }

    /// Load the check-in diary.
    pub fn load_diary(&self) -> Result<Diary> {
        self.load_document("diary.json")
    }

    /// Save the check-in diary.
    pub fn save_diary(&self, diary: &Diary) -> Result<()> {
        self.save_document("diary.json", diary)
    }

    fn load_document<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T> {
        let path = self.document_path(name);
        if !path.exists() {
            return Ok(T::default());
        }
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|source| HaloError::DocumentParse { path, source })
    }

    fn save_document<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.document_path(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(value)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn document_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    /// The directory this storage writes into.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
