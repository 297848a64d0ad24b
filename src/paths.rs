/// Centralized path computation
///
/// Global configuration follows the XDG Base Directory specification on
/// Unix-like systems; per-project state (cache, error log, named maps) lives
/// under the project root.
use std::path::{Component, Path, PathBuf};

/// Directory name under the project root holding refmap state
pub const STATE_DIR_NAME: &str = ".refmap";
/// File name of the persisted declaration cache
pub const CACHE_FILE_NAME: &str = "cache.json";
/// File name of the persisted oracle error log
pub const ERROR_LOG_FILE_NAME: &str = "errors.json";
/// Directory name holding named map documents
pub const MAPS_DIR_NAME: &str = "maps";

/// Platform-agnostic path utilities
pub struct PlatformPaths;

impl PlatformPaths {
    /// Get the appropriate config directory for the current platform
    ///
    /// - Windows: %APPDATA%
    /// - macOS: ~/Library/Application Support
    /// - Linux/Unix: $XDG_CONFIG_HOME or ~/.config
    pub fn config_dir() -> PathBuf {
        if cfg!(target_os = "windows") {
            std::env::var("APPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join("Library/Application Support"))
                .unwrap_or_else(|_| PathBuf::from("."))
        } else {
            std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .or_else(|_| std::env::var("HOME").map(|home| PathBuf::from(home).join(".config")))
                .unwrap_or_else(|_| PathBuf::from("."))
        }
    }

    /// Returns: {config_dir}/refmap
    pub fn project_config_dir() -> PathBuf {
        Self::config_dir().join("refmap")
    }

    /// Returns: {config_dir}/refmap/config.toml
    pub fn default_config_path() -> PathBuf {
        Self::project_config_dir().join("config.toml")
    }

    /// Returns: {project_root}/.refmap
    pub fn project_state_dir(project_root: &Path) -> PathBuf {
        project_root.join(STATE_DIR_NAME)
    }
}

/// Lexically normalize a path, resolving `.` and `..` without touching the filesystem
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Path of `path` relative to `root`, with `/` separators
///
/// Returns `None` when `path` is not under `root`.
pub fn relative_to(path: &Path, root: &Path) -> Option<String> {
    let path = normalize(path);
    let root = normalize(root);
    let rel = path.strip_prefix(&root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// Base name of a path (`qf/repo.go` -> `repo.go`)
pub fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Name of the directory directly containing a path (`/a/qf/repo.go` -> `qf`)
pub fn parent_folder_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches(['/', '\\']);
    let mut parts = trimmed.rsplit(['/', '\\']);
    parts.next();
    parts.next().unwrap_or("")
}
