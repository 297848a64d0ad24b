//! Append-only log of oracle invocation failures.
//!
//! Failures are advisory: they are recorded here and persisted next to the
//! cache, but never change what the scan does next.

use crate::error::{CacheError, OracleError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One failed oracle invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    /// Command that was run, e.g. `gopls references`
    pub command: String,
    /// Query input (file path, or `path:position`)
    pub input: String,
    /// Whatever the process printed before failing
    #[serde(default)]
    pub output: String,
    pub underlying_error: String,
    /// Unix seconds when the failure was recorded
    #[serde(default)]
    pub timestamp: i64,
}

impl ErrorRecord {
    pub fn from_oracle(query: &str, input: &str, err: &OracleError) -> Self {
        let command = match err {
            OracleError::Spawn { command, .. }
            | OracleError::NonZeroExit { command, .. }
            | OracleError::Timeout { command, .. }
            | OracleError::InvalidUtf8(command) => command.clone(),
        };
        Self {
            command: if command.is_empty() {
                query.to_string()
            } else {
                command
            },
            input: input.to_string(),
            output: err.output().to_string(),
            underlying_error: err.to_string(),
            timestamp: Utc::now().timestamp(),
        }
    }
}

/// Error log shared by all workers of a session
#[derive(Debug)]
pub struct ErrorLog {
    path: PathBuf,
    records: Mutex<Vec<ErrorRecord>>,
}

impl ErrorLog {
    /// Load existing records, starting empty if the document is absent or unreadable
    pub fn load(path: &Path) -> Self {
        let records = match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable error log {:?}: {}", path, e);
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };
        Self {
            path: path.to_path_buf(),
            records: Mutex::new(records),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: ErrorRecord) {
        tracing::warn!(
            "Oracle failure: {} {}: {}",
            record.command,
            record.input,
            record.underlying_error
        );
        self.lock().push(record);
    }

    /// Snapshot of all records in append order
    pub fn records(&self) -> Vec<ErrorRecord> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Persist all records as a JSON array
    pub fn flush(&self) -> Result<(), CacheError> {
        let save_err = |reason: String| CacheError::SaveFailed {
            path: self.path.display().to_string(),
            reason,
        };
        let content = serde_json::to_string_pretty(&*self.lock())
            .map_err(|e| save_err(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| save_err(e.to_string()))?;
        }
        fs::write(&self.path, content).map_err(|e| save_err(e.to_string()))?;
        tracing::debug!("Saved error log to {:?}", self.path);
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ErrorRecord>> {
        // A poisoned log still holds valid records
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}
