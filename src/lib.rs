//! # refmap - Incremental Declaration and Reference Indexer
//!
//! Builds a folder/file/declaration graph of a codebase, annotated with which
//! function or method uses which declaration.
//!
//! ## Overview
//!
//! refmap never parses source code itself. An external language oracle
//! (by default `gopls`) is asked for the declarations of each file and for the
//! use sites of each declaration. Every use site is attributed to the function
//! or method that textually encloses it in the referencing file. Results are
//! kept in a persistent cache keyed by file name and modification time, so
//! repeated scans only touch changed files.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   symbols / references   ┌──────────────┐
//! │  Indexing    │ ───────────────────────▶ │    Oracle    │  (gopls)
//! │  Session     │ ◀─────────────────────── │              │
//! └──────┬───────┘        plain text        └──────────────┘
//!        │
//!   ┌────┴──────┬──────────────┬───────────────┐
//!   │           │              │               │
//! ┌─▼──────┐ ┌──▼───────┐ ┌────▼──────┐ ┌──────▼─────┐
//! │ Index  │ │ Error    │ │ Hierarchy │ │ Named maps │
//! │ Cache  │ │ Log      │ │ Builder   │ │            │
//! └────────┘ └──────────┘ └───────────┘ └────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`session`]: scan driver owning cache, error log and oracle
//! - [`oracle`]: oracle trait, positions and the external-command client
//! - [`indexer`]: response grammars, attribution and file discovery
//! - [`cache`]: persistent declaration cache for incremental scans
//! - [`hierarchy`]: folder/file/declaration tree for export
//! - [`maps`]: named hierarchy snapshots
//! - [`error_log`]: record of oracle failures
//! - [`config`]: configuration management with environment variable support
//! - [`types`]: declarations, references and scan request/report types
//! - [`error`]: error types and result aliases
//! - [`paths`]: path normalization utilities
//!
//! ## Usage Example
//!
//! ```no_run
//! use refmap::{Config, IndexingSession, ScanRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let session = IndexingSession::new(Config::new()?, "/work/quickfeed")?;
//!
//!     let report = session
//!         .scan(ScanRequest::all().with_references(true))
//!         .await?;
//!     println!("{} files indexed, {} unused declarations", report.indexed, report.unused.len());
//!
//!     let tree = session.hierarchy().await;
//!     println!("{}", serde_json::to_string_pretty(&tree)?);
//!     Ok(())
//! }
//! ```

/// Persistent declaration cache keyed by file name
pub mod cache;

/// Configuration management with environment variable overrides
pub mod config;

/// Error types and utilities
pub mod error;

/// Append-only log of oracle failures
pub mod error_log;

/// Folder/file/declaration hierarchy built from scan results
pub mod hierarchy;

/// Declaration extraction, reference attribution and file discovery
pub mod indexer;

/// Named hierarchy snapshots
pub mod maps;

/// External symbol/reference oracle
pub mod oracle;

/// Path normalization and utility functions
pub mod paths;

/// Indexing session driving scans
pub mod session;

/// Declarations, references and scan request/report types
pub mod types;

pub use config::Config;
pub use error::{RefmapError, Result};
pub use session::IndexingSession;
pub use types::{Declaration, Reference, ScanReport, ScanRequest, SymbolKind};
