//! Eligibility policy and directory traversal

use super::file_info::SourceFile;
use crate::config::IndexingConfig;
use crate::error::{RefmapError, ValidationError};
use crate::paths;
use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Decides which files are indexed
///
/// A file is eligible when its extension is allow-listed, none of its
/// directories is excluded by name, and its relative path is neither listed
/// in `exclude_files` nor matched by one of its glob patterns.
#[derive(Debug, Clone)]
pub struct EligibilityPolicy {
    pub(crate) extensions: Vec<String>,
    pub(crate) exclude_dirs: Vec<String>,
    pub(crate) exclude_files: Vec<String>,
    exclude_globs: GlobSet,
}

impl EligibilityPolicy {
    pub fn new(
        extensions: Vec<String>,
        exclude_dirs: Vec<String>,
        exclude_files: Vec<String>,
    ) -> Result<Self, RefmapError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &exclude_files {
            let glob = Glob::new(pattern).map_err(|e| {
                RefmapError::other(format!("invalid exclude pattern '{}': {}", pattern, e))
            })?;
            builder.add(glob);
        }
        let exclude_globs = builder
            .build()
            .map_err(|e| RefmapError::other(format!("failed to build exclude patterns: {}", e)))?;

        Ok(Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.trim_start_matches('.').to_string())
                .collect(),
            exclude_dirs,
            exclude_files,
            exclude_globs,
        })
    }

    pub fn from_config(config: &IndexingConfig) -> Result<Self, RefmapError> {
        Self::new(
            config.extensions.clone(),
            config.exclude_dirs.clone(),
            config.exclude_files.clone(),
        )
    }

    pub fn is_excluded_dir(&self, name: &str) -> bool {
        self.exclude_dirs.iter().any(|dir| dir == name)
    }

    /// Why `relative_path` is not indexed, or `None` if it is eligible
    pub fn ineligibility(&self, relative_path: &str) -> Option<String> {
        let mut components: Vec<&str> = relative_path.split('/').collect();
        let file_name = components.pop().unwrap_or_default();

        if let Some(dir) = components.iter().find(|c| self.is_excluded_dir(c)) {
            return Some(format!("inside excluded directory '{}'", dir));
        }

        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        if !self.extensions.iter().any(|ext| ext == extension) {
            return Some(format!("unsupported extension '{}'", extension));
        }

        if self.exclude_files.iter().any(|f| f == relative_path)
            || self.exclude_globs.is_match(relative_path)
        {
            return Some("excluded file".to_string());
        }

        None
    }

    pub fn is_eligible(&self, relative_path: &str) -> bool {
        self.ineligibility(relative_path).is_none()
    }
}

pub struct FileWalker {
    pub(crate) root: PathBuf,
    pub(crate) policy: EligibilityPolicy,
    pub(crate) respect_gitignore: bool,
    /// Checked between entries; a cancelled walk stops early
    cancellation: Option<CancellationToken>,
}

impl FileWalker {
    pub fn new(root: impl AsRef<Path>, policy: EligibilityPolicy) -> Self {
        Self {
            root: paths::normalize(root.as_ref()),
            policy,
            respect_gitignore: true,
            cancellation: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn with_gitignore(mut self, respect: bool) -> Self {
        self.respect_gitignore = respect;
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }

    /// Resolve an explicit file target
    ///
    /// Unlike a tree walk, an explicit target that fails the policy is an
    /// error rather than a silent skip.
    pub fn check(&self, path: &Path) -> Result<SourceFile, RefmapError> {
        let path = self.absolute(path);
        if !path.is_file() {
            return Err(ValidationError::PathNotFound(path.display().to_string()).into());
        }

        let relative = paths::relative_to(&path, &self.root)
            .ok_or_else(|| ValidationError::OutsideRoot(path.display().to_string()))?;

        if let Some(reason) = self.policy.ineligibility(&relative) {
            return Err(ValidationError::IneligiblePath {
                path: relative,
                reason,
            }
            .into());
        }

        Ok(SourceFile::new(&path, &self.root)?)
    }

    /// Resolve an explicit directory target
    ///
    /// Fails when the directory or one of its ancestors below the root is
    /// an excluded directory.
    pub fn check_dir(&self, path: &Path) -> Result<PathBuf, RefmapError> {
        let path = self.absolute(path);
        if !path.is_dir() {
            return Err(ValidationError::PathNotFound(path.display().to_string()).into());
        }

        let relative = paths::relative_to(&path, &self.root)
            .ok_or_else(|| ValidationError::OutsideRoot(path.display().to_string()))?;

        if let Some(dir) = relative
            .split('/')
            .find(|component| self.policy.is_excluded_dir(component))
        {
            return Err(ValidationError::IneligiblePath {
                path: relative.clone(),
                reason: format!("inside excluded directory '{}'", dir),
            }
            .into());
        }

        Ok(path)
    }

    /// Walk `start` (the root when `None`) and collect all eligible files
    ///
    /// Files are returned sorted by relative path.
    pub fn walk(&self, start: Option<&Path>) -> Result<Vec<SourceFile>> {
        let start = start.map_or_else(|| self.root.clone(), |p| self.absolute(p));
        if !start.exists() {
            anyhow::bail!("Directory does not exist: {:?}", start);
        }
        if !start.is_dir() {
            anyhow::bail!("Path is not a directory: {:?}", start);
        }

        let excluded = self.policy.exclude_dirs.clone();
        let walker = WalkBuilder::new(&start)
            .standard_filters(self.respect_gitignore)
            .hidden(false)
            .git_ignore(self.respect_gitignore)
            .git_exclude(self.respect_gitignore)
            .require_git(false)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                !(is_dir && excluded.iter().any(|d| entry.file_name() == d.as_str()))
            })
            .build();

        let mut files = Vec::new();
        for entry in walker {
            if self.is_cancelled() {
                tracing::info!("File walk cancelled after {} files", files.len());
                return Err(RefmapError::Cancelled.into());
            }

            let entry = entry.context("Failed to read directory entry")?;
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            let path = entry.path();
            let Some(relative) = paths::relative_to(path, &self.root) else {
                continue;
            };
            if !self.policy.is_eligible(&relative) {
                tracing::trace!("Skipping ineligible file {}", relative);
                continue;
            }

            match SourceFile::new(path, &self.root) {
                Ok(file) => files.push(file),
                Err(e) => tracing::debug!("Skipping unreadable file {:?}: {}", path, e),
            }
        }

        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        tracing::info!("Found {} files to index under {:?}", files.len(), start);
        Ok(files)
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            paths::normalize(path)
        } else {
            paths::normalize(&self.root.join(path))
        }
    }
}
