/// Centralized error types for refmap using thiserror
///
/// Provides domain-specific error types for better error handling and user-facing messages.
use thiserror::Error;

/// Main error type for the indexing engine
#[derive(Error, Debug)]
pub enum RefmapError {
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Map error: {0}")]
    Map(#[from] MapError),

    #[error("Scan was cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Failures invoking the external symbol/reference oracle
///
/// These are recorded in the error log and never abort a directory scan.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("Failed to spawn '{command}': {reason}")]
    Spawn { command: String, reason: String },

    #[error("'{command}' exited with status {status}")]
    NonZeroExit {
        command: String,
        status: String,
        output: String,
    },

    #[error("'{command}' timed out after {secs} seconds")]
    Timeout { command: String, secs: u64 },

    #[error("'{0}' produced output that is not valid UTF-8")]
    InvalidUtf8(String),
}

impl OracleError {
    /// Captured process output, if the process got far enough to produce any
    pub fn output(&self) -> &str {
        match self {
            OracleError::NonZeroExit { output, .. } => output,
            _ => "",
        }
    }
}

/// Errors attributing a reference to its enclosing declaration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No enclosing declaration for line {line} in {path}")]
    NoEnclosingDeclaration { path: String, line: u32 },
}

/// Errors related to cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to load cache from '{path}': {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("Failed to save cache to '{path}': {reason}")]
    SaveFailed { path: String, reason: String },

    #[error("Cache document '{path}' is corrupted: {reason}")]
    Corrupted { path: String, reason: String },

    #[error("Failed to lock cache: {0}")]
    Lock(String),
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

/// Errors related to input validation
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Path does not exist: {0}")]
    PathNotFound(String),

    #[error("Path is not eligible for indexing: {path} ({reason})")]
    IneligiblePath { path: String, reason: String },

    #[error("Path is outside the project root: {0}")]
    OutsideRoot(String),

    #[error("Invalid map name: {0}")]
    InvalidMapName(String),
}

/// Errors related to named map documents
#[derive(Error, Debug)]
pub enum MapError {
    #[error("Map '{0}' not found")]
    NotFound(String),

    #[error("Failed to read map '{name}': {reason}")]
    ReadFailed { name: String, reason: String },

    #[error("Failed to write map '{name}': {reason}")]
    WriteFailed { name: String, reason: String },
}

// Conversion from anyhow::Error to RefmapError
impl From<anyhow::Error> for RefmapError {
    fn from(err: anyhow::Error) -> Self {
        RefmapError::Other(format!("{:#}", err))
    }
}

/// Result alias used across the library
pub type Result<T, E = RefmapError> = std::result::Result<T, E>;

impl RefmapError {
    /// Create a new error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        RefmapError::Other(msg.into())
    }

    /// Check if this is a user error (bad input) vs system error
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            RefmapError::Validation(_)
                | RefmapError::Map(MapError::NotFound(_))
                | RefmapError::Config(ConfigError::InvalidValue { .. })
        )
    }

    /// Errors that must stop the whole run instead of a single file
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RefmapError::Cache(_) | RefmapError::Config(_) | RefmapError::Cancelled
        )
    }
}
