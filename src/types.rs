use crate::oracle::Position;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Kind of declaration reported by the oracle
///
/// Only functions and methods can enclose a reference; every other oracle
/// kind (struct, field, constant, ...) collapses into `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SymbolKind {
    Function,
    Method,
    Other,
}

impl SymbolKind {
    /// Map an oracle kind string onto a `SymbolKind`
    pub fn from_oracle(kind: &str) -> Self {
        match kind {
            "Function" => Self::Function,
            "Method" => Self::Method,
            _ => Self::Other,
        }
    }

    /// Whether a declaration of this kind may enclose a reference site
    pub fn can_enclose(&self) -> bool {
        matches!(self, Self::Function | Self::Method)
    }
}

/// One call or use site of a declaration
///
/// Attributed to the function or method that textually encloses the use site
/// in the referencing file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    /// Raw oracle location, `path:line:col...`
    pub location_path: String,
    /// Path of the referencing file, as reported by the oracle
    #[serde(default)]
    pub file_path: String,
    pub folder_name: String,
    pub file_name: String,
    pub enclosing_symbol_name: String,
}

/// A named, positioned code unit extracted from one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Declaration {
    pub name: String,
    pub kind: SymbolKind,
    /// Kind string exactly as the oracle printed it
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub oracle_kind: String,
    pub position: Position,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<Reference>,
    /// Reference resolution ran and found nothing (or the oracle failed)
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub zero_references: bool,
}

impl Declaration {
    pub fn new(name: impl Into<String>, kind: SymbolKind, position: Position) -> Self {
        Self {
            name: name.into(),
            kind,
            oracle_kind: String::new(),
            position,
            references: Vec::new(),
            zero_references: false,
        }
    }

    /// Attach resolved references, flagging the declaration when there are none
    pub fn attach_references(&mut self, references: Vec<Reference>) {
        self.zero_references = references.is_empty();
        self.references = references;
    }
}

/// Request to scan part or all of a project
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanRequest {
    /// File or folder to scan; the whole project root when absent
    #[serde(default)]
    pub target: Option<PathBuf>,
    /// Also resolve references for every declaration
    #[serde(default)]
    pub with_references: bool,
    /// Re-scan files even when their cache entry is current
    #[serde(default)]
    pub force: bool,
}

impl ScanRequest {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn path(target: impl AsRef<Path>) -> Self {
        Self {
            target: Some(target.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    pub fn with_references(mut self, with_references: bool) -> Self {
        self.with_references = with_references;
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Aggregate outcome of a scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Files whose declarations were (re-)extracted and committed
    pub indexed: usize,
    /// Files whose cache entry was current
    pub skipped: usize,
    /// Files whose oracle invocation failed
    pub failed: usize,
    /// References attributed to an enclosing declaration
    pub references_resolved: usize,
    /// References dropped because no enclosing declaration exists
    pub unattributed_references: usize,
    /// `path:name` of declarations with zero references
    #[serde(default)]
    pub unused: Vec<String>,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

impl ScanReport {
    pub(crate) fn absorb(&mut self, other: FileOutcome) {
        match other.status {
            FileStatus::Indexed => self.indexed += 1,
            FileStatus::Skipped => self.skipped += 1,
            FileStatus::Failed => self.failed += 1,
        }
        self.references_resolved += other.references_resolved;
        self.unattributed_references += other.unattributed_references;
        self.unused.extend(other.unused);
    }
}

/// What happened to a single file during a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileStatus {
    Indexed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone)]
pub(crate) struct FileOutcome {
    pub(crate) status: FileStatus,
    pub(crate) references_resolved: usize,
    pub(crate) unattributed_references: usize,
    pub(crate) unused: Vec<String>,
}

impl FileOutcome {
    pub(crate) fn new(status: FileStatus) -> Self {
        Self {
            status,
            references_resolved: 0,
            unattributed_references: 0,
            unused: Vec::new(),
        }
    }
}
