//! Declaration extraction from the oracle's `symbols` output.
//!
//! Each output line has the form `name kind range [...]`, for example
//! `Open Method 12:6-12:10` or `repoURL Function 40:6-13`. Lines with fewer
//! than three whitespace-separated fields are diagnostics or blank lines and
//! are skipped.

use crate::error::OracleError;
use crate::oracle::{Oracle, Position};
use crate::types::{Declaration, SymbolKind};
use std::path::Path;
use std::sync::Arc;

/// Extracts the ordered declaration list of a file
#[derive(Clone)]
pub struct SymbolExtractor {
    oracle: Arc<dyn Oracle>,
}

impl SymbolExtractor {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    /// Ask the oracle for the declarations of `path`
    ///
    /// Declarations are returned in oracle emission order, which is source
    /// order. Enclosing-declaration lookup depends on that order.
    pub async fn extract(&self, path: &Path) -> Result<Vec<Declaration>, OracleError> {
        let output = self.oracle.list_symbols(path).await?;
        let declarations = parse_symbols(&output);
        tracing::debug!(
            "Extracted {} declarations from {}",
            declarations.len(),
            path.display()
        );
        Ok(declarations)
    }
}

/// Parse a full `symbols` response
pub fn parse_symbols(output: &str) -> Vec<Declaration> {
    output.lines().filter_map(parse_symbol_line).collect()
}

/// Parse one `symbols` line, `None` for lines that carry no declaration
pub fn parse_symbol_line(line: &str) -> Option<Declaration> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 3 {
        return None;
    }

    let (raw_name, raw_kind, range) = (fields[0], fields[1], fields[2]);
    let Some(position) = Position::parse(range) else {
        tracing::debug!("Skipping symbol line with unparseable range: {:?}", line);
        return None;
    };

    let kind = SymbolKind::from_oracle(raw_kind);
    let name = match kind {
        // Methods are reported as `Receiver.Method`
        SymbolKind::Method => raw_name
            .rsplit_once('.')
            .map_or(raw_name, |(_, method)| method),
        _ => raw_name,
    };

    let mut declaration = Declaration::new(name, kind, position);
    declaration.oracle_kind = raw_kind.to_string();
    Some(declaration)
}
