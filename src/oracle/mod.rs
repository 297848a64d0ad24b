//! The external symbol/reference oracle.
//!
//! The engine never parses source code. It asks an external analysis process
//! (by default `gopls`) two questions and treats the plain-text answers as
//! ground truth:
//!
//! - `symbols <path>`: one declaration per line, `name kind range`
//! - `references <path>:<position>`: one location per line, `path:line:col...`

mod position;

pub use position::Position;

use crate::config::OracleConfig;
use crate::error::OracleError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Query name for listing declarations
pub const SYMBOLS_QUERY: &str = "symbols";
/// Query name for listing references
pub const REFERENCES_QUERY: &str = "references";

/// Source of declarations and references for a file
#[async_trait]
pub trait Oracle: Send + Sync {
    /// List the declarations of `path`, one per line
    async fn list_symbols(&self, path: &Path) -> Result<String, OracleError>;

    /// List the reference sites of the declaration at `position` in `path`
    async fn list_references(&self, path: &Path, position: &Position)
        -> Result<String, OracleError>;
}

/// Input string for a reference query, `path:line:colStart-colEnd`
pub fn reference_query_input(path: &Path, position: &Position) -> String {
    format!("{}:{}", path.display(), position.to_query())
}

/// Oracle backed by an external command
///
/// Every query runs `<program> <args...> <query> <input>` and captures stdout.
/// A hung process is killed once the timeout elapses.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl CommandOracle {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
            timeout: Duration::from_secs(crate::config::DEFAULT_ORACLE_TIMEOUT_SECS),
        }
    }

    /// Build from configuration, running queries from the project root
    pub fn from_config(config: &OracleConfig, project_root: &Path) -> Self {
        Self::new(config.command.clone(), config.args.clone())
            .with_timeout(Duration::from_secs(config.timeout_secs))
            .with_working_dir(project_root)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    fn describe(&self, query: &str) -> String {
        format!("{} {}", self.program, query)
    }

    async fn run(&self, query: &str, input: &str) -> Result<String, OracleError> {
        let command = self.describe(query);

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(query)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        tracing::trace!("Running oracle: {} {}", command, input);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(OracleError::Spawn {
                    command,
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(OracleError::Timeout {
                    command,
                    secs: self.timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            let mut captured = String::from_utf8_lossy(&output.stderr).into_owned();
            captured.push_str(&String::from_utf8_lossy(&output.stdout));
            return Err(OracleError::NonZeroExit {
                command,
                status: output.status.to_string(),
                output: captured,
            });
        }

        String::from_utf8(output.stdout).map_err(|_| OracleError::InvalidUtf8(command))
    }
}

#[async_trait]
impl Oracle for CommandOracle {
    async fn list_symbols(&self, path: &Path) -> Result<String, OracleError> {
        self.run(SYMBOLS_QUERY, &path.to_string_lossy()).await
    }

    async fn list_references(
        &self,
        path: &Path,
        position: &Position,
    ) -> Result<String, OracleError> {
        self.run(REFERENCES_QUERY, &reference_query_input(path, position))
            .await
    }
}
