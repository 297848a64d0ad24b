//! Source file descriptor for discovered files

use crate::cache::modified_unix;
use crate::paths;
use std::path::{Path, PathBuf};

/// An eligible source file found under the project root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute, normalized path handed to the oracle
    pub path: PathBuf,
    /// Path relative to the project root, `/`-separated
    pub relative_path: String,
    /// Base name, the cache key
    pub file_name: String,
    /// Modification time in unix seconds at discovery
    pub mod_time: i64,
}

impl SourceFile {
    /// Describe `path`, which must live under `root`
    pub fn new(path: &Path, root: &Path) -> std::io::Result<Self> {
        let path = paths::normalize(path);
        let mod_time = modified_unix(&path)?;
        let relative_path =
            paths::relative_to(&path, root).unwrap_or_else(|| path.to_string_lossy().into_owned());
        let file_name = paths::file_name(&relative_path).to_string();

        Ok(Self {
            path,
            relative_path,
            file_name,
            mod_time,
        })
    }
}
