//! Named hierarchy snapshots
//!
//! Each map is a JSON document `<maps dir>/<name>.json` holding the hierarchy
//! as it was when the map was created.

use crate::error::{MapError, RefmapError, ValidationError};
use crate::hierarchy::HierarchyNode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const MAP_EXTENSION: &str = "json";

/// Stored form of a named map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapDocument {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub root: HierarchyNode,
}

/// Directory of named maps
#[derive(Debug, Clone)]
pub struct MapStore {
    dir: PathBuf,
}

impl MapStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reject names that could escape the maps directory
    pub fn validate_name(name: &str) -> Result<(), ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidMapName(format!("'{}' {}", name, reason));

        if name.trim().is_empty() {
            return Err(invalid("is empty"));
        }
        if name.contains(['/', '\\']) {
            return Err(invalid("contains a path separator"));
        }
        if name.contains("..") {
            return Err(invalid("contains '..'"));
        }
        Ok(())
    }

    fn map_path(&self, name: &str) -> Result<PathBuf, ValidationError> {
        Self::validate_name(name)?;
        Ok(self.dir.join(format!("{}.{}", name, MAP_EXTENSION)))
    }

    /// Write a snapshot of `root` under `name`, replacing any previous one
    pub fn create(&self, name: &str, root: &HierarchyNode) -> Result<PathBuf, RefmapError> {
        let path = self.map_path(name)?;
        let write_err = |reason: String| MapError::WriteFailed {
            name: name.to_string(),
            reason,
        };

        let document = MapDocument {
            name: name.to_string(),
            created_at: Utc::now(),
            root: root.clone(),
        };
        let content =
            serde_json::to_string_pretty(&document).map_err(|e| write_err(e.to_string()))?;

        fs::create_dir_all(&self.dir).map_err(|e| write_err(e.to_string()))?;
        if path.exists() {
            tracing::info!("Replacing existing map '{}'", name);
        }
        fs::write(&path, content).map_err(|e| write_err(e.to_string()))?;

        tracing::info!("Created map '{}' at {:?}", name, path);
        Ok(path)
    }

    pub fn delete(&self, name: &str) -> Result<(), RefmapError> {
        let path = self.map_path(name)?;
        if !path.is_file() {
            return Err(MapError::NotFound(name.to_string()).into());
        }
        fs::remove_file(&path).map_err(|e| MapError::WriteFailed {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        tracing::info!("Deleted map '{}'", name);
        Ok(())
    }

    /// Sorted names of all stored maps
    pub fn list(&self) -> Result<Vec<String>, RefmapError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(MAP_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn load_document(&self, name: &str) -> Result<MapDocument, RefmapError> {
        let path = self.map_path(name)?;
        if !path.is_file() {
            return Err(MapError::NotFound(name.to_string()).into());
        }
        let read_err = |reason: String| MapError::ReadFailed {
            name: name.to_string(),
            reason,
        };
        let content = fs::read_to_string(&path).map_err(|e| read_err(e.to_string()))?;
        let document = serde_json::from_str(&content).map_err(|e| read_err(e.to_string()))?;
        Ok(document)
    }

    /// The stored hierarchy of map `name`
    pub fn load(&self, name: &str) -> Result<HierarchyNode, RefmapError> {
        Ok(self.load_document(name)?.root)
    }
}
