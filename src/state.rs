//! Batch record persistence.
//!
//! After a batch completes, a summary can be handed to a [`StateStore`]
//! which writes one timestamped JSON document per batch. The engine never
//! reads these records back to make decisions; they exist for operators and
//! follow-up tooling.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::engine::BatchResult;

/// Default directory for batch records.
pub const DEFAULT_STATE_DIR: &str = "state";

/// Errors raised while saving or loading batch records.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("failed to write batch record '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read batch record '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid batch record '{path}': {message}")]
    Invalid { path: String, message: String },
}

/// Persistable summary of one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRecord {
    pub id: Uuid,
    pub description: String,
    pub recorded_at: DateTime<Utc>,
    pub total_hosts: usize,
    pub total_successful: usize,
    pub total_failed: usize,
    pub success_rate: f64,
    pub execution_secs: f64,
    pub successful_hosts: Vec<String>,
    pub failed_hosts: Vec<String>,
}

impl BatchRecord {
    /// Summarize a finished batch.
    pub fn from_result(description: impl Into<String>, result: &BatchResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            recorded_at: Utc::now(),
            total_hosts: result.total_hosts(),
            total_successful: result.total_successful(),
            total_failed: result.total_failed(),
            success_rate: result.success_rate(),
            execution_secs: result.execution_time().as_secs_f64(),
            successful_hosts: result
                .successful_hosts()
                .iter()
                .map(|h| h.hostname.clone())
                .collect(),
            failed_hosts: result
                .failed_hosts()
                .iter()
                .map(|h| h.hostname.clone())
                .collect(),
        }
    }
}

/// Directory-backed store of batch records.
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write one record, returning the path of the created file.
    pub fn save(&self, record: &BatchRecord) -> Result<PathBuf, StateError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StateError::Write {
            path: self.dir.display().to_string(),
            source,
        })?;

        let filename = format!(
            "batch_{}_{}.json",
            record.recorded_at.format("%Y%m%d_%H%M%S"),
            record.id.simple()
        );
        let path = self.dir.join(filename);

        let body = serde_json::to_string_pretty(record).map_err(|e| StateError::Invalid {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, body).map_err(|source| StateError::Write {
            path: path.display().to_string(),
            source,
        })?;

        info!(path = %path.display(), "Batch record saved");
        Ok(path)
    }

    /// Record files in the store, oldest first. The timestamped file names
    /// make lexical order chronological.
    pub fn list(&self) -> Result<Vec<PathBuf>, StateError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.dir).map_err(|source| StateError::Read {
            path: self.dir.display().to_string(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Load one record.
    pub fn load(&self, path: &Path) -> Result<BatchRecord, StateError> {
        let raw = std::fs::read_to_string(path).map_err(|source| StateError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|e| StateError::Invalid {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(description: &str) -> BatchRecord {
        BatchRecord {
            id: Uuid::new_v4(),
            description: description.to_string(),
            recorded_at: Utc::now(),
            total_hosts: 3,
            total_successful: 2,
            total_failed: 1,
            success_rate: 66.7,
            execution_secs: 1.25,
            successful_hosts: vec!["a".into(), "b".into()],
            failed_hosts: vec!["c".into()],
        }
    }

    #[test]
    fn save_list_load_round_trip() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let store = StateStore::new(dir.path());

        let original = record("smoke");
        let path = store.save(&original).expect("save");

        let listed = store.list().expect("list");
        assert_eq!(listed, vec![path.clone()]);

        let loaded = store.load(&path).expect("load");
        assert_eq!(loaded.id, original.id);
        assert_eq!(loaded.description, "smoke");
        assert_eq!(loaded.failed_hosts, vec!["c".to_string()]);
    }

    #[test]
    fn list_on_missing_dir_is_empty() {
        let store = StateStore::new("does/not/exist/anywhere");
        assert!(store.list().expect("list").is_empty());
    }
}
