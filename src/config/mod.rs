/// Configuration system for refmap
///
/// Supports loading from multiple sources with priority:
/// CLI args > Environment variables > Config file > Defaults
use crate::error::{ConfigError, RefmapError};
use crate::hierarchy::ZeroReferencePolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default per-invocation oracle timeout
pub const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 30;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// External oracle configuration
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Eligibility policy and worker pool
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Where the cache, error log and named maps live
    #[serde(default)]
    pub storage: StorageConfig,

    /// Hierarchy export options
    #[serde(default)]
    pub graph: GraphConfig,
}

/// External oracle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Program to run (e.g., "gopls")
    #[serde(default = "default_oracle_command")]
    pub command: String,

    /// Arguments placed before the query name (e.g., ["-remote=auto"])
    #[serde(default)]
    pub args: Vec<String>,

    /// Timeout in seconds for a single oracle invocation
    #[serde(default = "default_oracle_timeout")]
    pub timeout_secs: u64,
}

/// Indexing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// File extensions to index, without the leading dot
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Directory names never descended into
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,

    /// Relative file paths or glob patterns never indexed
    #[serde(default)]
    pub exclude_files: Vec<String>,

    /// Number of files indexed concurrently
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Honor .gitignore/.ignore files during tree walks
    #[serde(default = "default_respect_gitignore")]
    pub respect_gitignore: bool,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// State directory; `<project root>/.refmap` when unset
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

/// Hierarchy export configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GraphConfig {
    /// How declarations without references appear in exported maps
    #[serde(default)]
    pub zero_references: ZeroReferencePolicy,

    /// Name of the root node; the project folder name when unset
    #[serde(default)]
    pub root_name: Option<String>,
}

// Default value functions
fn default_oracle_command() -> String {
    "gopls".to_string()
}

fn default_oracle_timeout() -> u64 {
    DEFAULT_ORACLE_TIMEOUT_SECS
}

fn default_extensions() -> Vec<String> {
    vec!["go".to_string(), "ts".to_string(), "tsx".to_string()]
}

fn default_exclude_dirs() -> Vec<String> {
    vec![
        "node_modules".to_string(),
        "doc".to_string(),
        ".git".to_string(),
    ]
}

fn default_workers() -> usize {
    4
}

fn default_respect_gitignore() -> bool {
    true
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            command: default_oracle_command(),
            args: Vec::new(),
            timeout_secs: default_oracle_timeout(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            exclude_dirs: default_exclude_dirs(),
            exclude_files: Vec::new(),
            workers: default_workers(),
            respect_gitignore: default_respect_gitignore(),
        }
    }
}

impl StorageConfig {
    /// Resolve the state directory for a project
    pub fn state_dir(&self, project_root: &Path) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| crate::paths::PlatformPaths::project_state_dir(project_root))
    }

    pub fn cache_path(&self, project_root: &Path) -> PathBuf {
        self.state_dir(project_root)
            .join(crate::paths::CACHE_FILE_NAME)
    }

    pub fn error_log_path(&self, project_root: &Path) -> PathBuf {
        self.state_dir(project_root)
            .join(crate::paths::ERROR_LOG_FILE_NAME)
    }

    pub fn maps_dir(&self, project_root: &Path) -> PathBuf {
        self.state_dir(project_root)
            .join(crate::paths::MAPS_DIR_NAME)
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, RefmapError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location or create default
    pub fn load_or_default() -> Result<Self, RefmapError> {
        let config_path = crate::paths::PlatformPaths::default_config_path();

        if config_path.exists() {
            tracing::info!("Loading config from: {}", config_path.display());
            Self::from_file(&config_path)
        } else {
            tracing::debug!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), RefmapError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::SaveFailed(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), RefmapError> {
        if self.oracle.command.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "oracle.command".to_string(),
                reason: "must not be empty".to_string(),
            }
            .into());
        }

        if self.oracle.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "oracle.timeout_secs".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.indexing.extensions.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "indexing.extensions".to_string(),
                reason: "at least one extension is required".to_string(),
            }
            .into());
        }

        if self.indexing.workers == 0 || self.indexing.workers > 256 {
            return Err(ConfigError::InvalidValue {
                key: "indexing.workers".to_string(),
                reason: format!("must be between 1 and 256, got {}", self.indexing.workers),
            }
            .into());
        }

        for pattern in &self.indexing.exclude_files {
            if let Err(e) = globset::Glob::new(pattern) {
                return Err(ConfigError::InvalidValue {
                    key: "indexing.exclude_files".to_string(),
                    reason: format!("invalid pattern '{}': {}", pattern, e),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(command) = std::env::var("REFMAP_ORACLE_COMMAND") {
            self.oracle.command = command;
        }

        if let Ok(timeout) = std::env::var("REFMAP_ORACLE_TIMEOUT")
            && let Ok(secs) = timeout.parse()
        {
            self.oracle.timeout_secs = secs;
        }

        if let Ok(workers) = std::env::var("REFMAP_WORKERS")
            && let Ok(n) = workers.parse()
        {
            self.indexing.workers = n;
        }

        if let Ok(dir) = std::env::var("REFMAP_STATE_DIR") {
            self.storage.state_dir = Some(PathBuf::from(dir));
        }
    }

    /// Create a new Config with defaults and environment overrides
    pub fn new() -> Result<Self, RefmapError> {
        let mut config = Self::load_or_default()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}
