//! Reference resolution and enclosing-declaration attribution.
//!
//! The oracle reports each use site of a declaration as `path:line:col...`.
//! A use site is attributed to the nearest preceding function or method in
//! the *referencing* file, which may be a different file than the one the
//! declaration lives in.

use crate::error::{OracleError, RefmapError, ResolveError};
use crate::oracle::{Oracle, Position};
use crate::paths;
use crate::types::{Declaration, Reference};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

static LOCATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?):(\d+):(\d+)(?:[-:].*)?$").expect("location regex is valid")
});

/// A parsed reference location line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceLocation {
    /// The full line as printed by the oracle
    pub raw: String,
    pub path: String,
    pub line: u32,
    pub column: u32,
}

impl ReferenceLocation {
    pub fn parse(line: &str) -> Option<Self> {
        let raw = line.trim();
        let caps = LOCATION_REGEX.captures(raw)?;
        let line_no: u32 = caps[2].parse().ok()?;
        if line_no == 0 {
            return None;
        }
        Some(Self {
            raw: raw.to_string(),
            path: caps[1].to_string(),
            line: line_no,
            column: caps[3].parse().ok()?,
        })
    }
}

/// Parse a full `references` response, skipping blank and malformed lines
pub fn parse_reference_lines(output: &str) -> Vec<ReferenceLocation> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let parsed = ReferenceLocation::parse(line);
            if parsed.is_none() {
                tracing::debug!("Skipping malformed reference line: {:?}", line);
            }
            parsed
        })
        .collect()
}

/// Find the function or method that encloses `line`
///
/// Picks the callable declaration with the greatest line strictly before the
/// reference. When none precedes it, a callable declared on the reference
/// line itself is accepted. Non-callable declarations are never chosen.
pub fn enclosing_declaration<'a>(
    declarations: &'a [Declaration],
    path: &str,
    line: u32,
) -> Result<&'a Declaration, ResolveError> {
    let callables = declarations.iter().filter(|d| d.kind.can_enclose());

    let mut best: Option<&Declaration> = None;
    for decl in callables.clone() {
        if decl.position.line < line && best.is_none_or(|b| decl.position.line > b.position.line)
        {
            best = Some(decl);
        }
    }

    best.or_else(|| callables.into_iter().find(|d| d.position.line == line))
        .ok_or_else(|| ResolveError::NoEnclosingDeclaration {
            path: path.to_string(),
            line,
        })
}

/// Supplies the declaration list of a referencing file
///
/// Implementations index the file on demand when nothing current is known
/// about it.
#[async_trait]
pub trait DeclarationSource: Send + Sync {
    async fn declarations_for(&self, path: &Path) -> Result<Arc<Vec<Declaration>>, RefmapError>;
}

/// References of one declaration after attribution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub references: Vec<Reference>,
    /// Use sites dropped because no enclosing declaration exists
    pub unattributed: usize,
}

/// Resolves the use sites of declarations in one file
pub struct ReferenceResolver<'a> {
    oracle: &'a dyn Oracle,
    source: &'a dyn DeclarationSource,
    file: PathBuf,
    own: &'a [Declaration],
}

impl<'a> ReferenceResolver<'a> {
    /// `own` holds the freshly extracted declarations of `file`; they are
    /// used for use sites inside the file itself.
    pub fn new(
        oracle: &'a dyn Oracle,
        source: &'a dyn DeclarationSource,
        file: &Path,
        own: &'a [Declaration],
    ) -> Self {
        Self {
            oracle,
            source,
            file: paths::normalize(file),
            own,
        }
    }

    /// Query and attribute the references of `declaration`
    pub async fn resolve(&self, declaration: &Declaration) -> Result<Resolution, OracleError> {
        let output = self
            .oracle
            .list_references(&self.file, &declaration.position)
            .await?;

        let mut resolution = Resolution::default();
        for location in parse_reference_lines(&output) {
            match self.attribute(&location).await {
                Ok(reference) => resolution.references.push(reference),
                Err(e) => {
                    tracing::warn!("Dropping reference {}: {}", location.raw, e);
                    resolution.unattributed += 1;
                }
            }
        }

        tracing::debug!(
            "Resolved {} references for {} in {}",
            resolution.references.len(),
            declaration.name,
            self.file.display()
        );
        Ok(resolution)
    }

    async fn attribute(&self, location: &ReferenceLocation) -> Result<Reference, RefmapError> {
        let location_path = paths::normalize(Path::new(&location.path));

        let name = if location_path == self.file {
            enclosing_declaration(self.own, &location.path, location.line)?
                .name
                .clone()
        } else {
            let declarations = self.source.declarations_for(&location_path).await?;
            enclosing_declaration(&declarations, &location.path, location.line)?
                .name
                .clone()
        };

        Ok(Reference {
            location_path: location.raw.clone(),
            file_path: location.path.clone(),
            folder_name: paths::parent_folder_name(&location.path).to_string(),
            file_name: paths::file_name(&location.path).to_string(),
            enclosing_symbol_name: name,
        })
    }
}
