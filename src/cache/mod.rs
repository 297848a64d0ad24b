//! Persistent declaration cache for incremental scans.
//!
//! The cache document is a JSON object mapping a file's base name to
//! `{path, modTime, symbols}`. An entry is reusable as long as its stored
//! modification time equals the file's current one; otherwise the file is
//! re-extracted and the entry replaced wholesale.

mod lock;

pub use lock::CacheLock;

use crate::error::CacheError;
use crate::types::Declaration;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

/// How long a commit waits for another process to release the cache
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Cached declarations of one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Path relative to the project root
    pub path: String,
    /// Modification time (unix seconds) the declarations were extracted at
    pub mod_time: i64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub symbols: Vec<Declaration>,
    /// Whether references were resolved when this entry was produced
    #[serde(default)]
    pub references_scanned: bool,
}

impl CacheEntry {
    pub fn new(path: impl Into<String>, mod_time: i64, symbols: Vec<Declaration>) -> Self {
        Self {
            path: path.into(),
            mod_time,
            symbols,
            references_scanned: false,
        }
    }

    pub fn with_references_scanned(mut self, scanned: bool) -> Self {
        self.references_scanned = scanned;
        self
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Declaration>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Declaration>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Modification time of a file in whole unix seconds
pub fn modified_unix(path: &Path) -> std::io::Result<i64> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    })
}

/// Declaration cache bound to its document on disk
#[derive(Debug, Clone)]
pub struct IndexCache {
    path: PathBuf,
    entries: BTreeMap<String, CacheEntry>,
}

impl IndexCache {
    /// Load the cache document, creating an empty `{}` document if absent
    ///
    /// A document that exists but does not parse is reported as corruption
    /// rather than silently discarded.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        if !path.exists() {
            tracing::debug!("Cache file not found, creating empty cache at {:?}", path);
            let cache = Self {
                path: path.to_path_buf(),
                entries: BTreeMap::new(),
            };
            cache.save()?;
            return Ok(cache);
        }

        let entries = read_document(path)?;
        tracing::info!("Loaded cache with {} files", entries.len());
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Path of the backing document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a file must be (re-)extracted
    ///
    /// True if the file is absent or its stored modification time differs.
    pub fn should_reindex(&self, file_name: &str, mod_time: i64) -> bool {
        self.entries
            .get(file_name)
            .is_none_or(|entry| entry.mod_time != mod_time)
    }

    pub fn get(&self, file_name: &str) -> Option<&CacheEntry> {
        self.entries.get(file_name)
    }

    /// Entry for `file_name` if it is still current for `mod_time`
    pub fn fresh(&self, file_name: &str, mod_time: i64) -> Option<&CacheEntry> {
        self.entries
            .get(file_name)
            .filter(|entry| entry.mod_time == mod_time)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &CacheEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the entry for `file_name` and persist the whole document
    ///
    /// The document is re-read under an exclusive lock before writing so
    /// that commits made by other processes since `load` are kept.
    pub fn commit(&mut self, file_name: &str, entry: CacheEntry) -> Result<(), CacheError> {
        self.update(|entries| {
            entries.insert(file_name.to_string(), entry);
        })
    }

    /// Remove the entry for `file_name`, returning whether it existed
    pub fn remove(&mut self, file_name: &str) -> Result<bool, CacheError> {
        let mut removed = false;
        self.update(|entries| {
            removed = entries.remove(file_name).is_some();
        })?;
        Ok(removed)
    }

    /// Drop entries whose file no longer exists under `project_root`
    pub fn prune_missing(&mut self, project_root: &Path) -> Result<usize, CacheError> {
        let mut pruned = 0;
        self.update(|entries| {
            let before = entries.len();
            entries.retain(|_, entry| project_root.join(&entry.path).exists());
            pruned = before - entries.len();
        })?;
        if pruned > 0 {
            tracing::info!("Pruned {} stale cache entries", pruned);
        }
        Ok(pruned)
    }

    /// Write the in-memory document as is
    pub fn save(&self) -> Result<(), CacheError> {
        let _lock = CacheLock::acquire(&self.path, LOCK_TIMEOUT)?;
        write_document(&self.path, &self.entries)
    }

    fn update<F>(&mut self, apply: F) -> Result<(), CacheError>
    where
        F: FnOnce(&mut BTreeMap<String, CacheEntry>),
    {
        let _lock = CacheLock::acquire(&self.path, LOCK_TIMEOUT)?;
        let mut entries = if self.path.exists() {
            read_document(&self.path)?
        } else {
            BTreeMap::new()
        };
        apply(&mut entries);
        write_document(&self.path, &entries)?;
        self.entries = entries;
        Ok(())
    }
}

fn read_document(path: &Path) -> Result<BTreeMap<String, CacheEntry>, CacheError> {
    let content = fs::read_to_string(path).map_err(|e| CacheError::LoadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    if content.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    serde_json::from_str(&content).map_err(|e| CacheError::Corrupted {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn write_document(path: &Path, entries: &BTreeMap<String, CacheEntry>) -> Result<(), CacheError> {
    let save_err = |reason: String| CacheError::SaveFailed {
        path: path.display().to_string(),
        reason,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| save_err(e.to_string()))?;
    }

    let content = serde_json::to_string_pretty(entries).map_err(|e| save_err(e.to_string()))?;

    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, content).map_err(|e| save_err(e.to_string()))?;
    fs::rename(&tmp, path).map_err(|e| save_err(e.to_string()))?;

    tracing::debug!("Saved cache to {:?}", path);
    Ok(())
}
