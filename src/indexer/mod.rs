//! Declaration extraction, reference resolution and file discovery
//!
//! Provides the oracle response grammars, enclosing-declaration attribution
//! and the eligibility policy used to decide which files are indexed.

mod extractor;
mod file_info;
mod file_walker;
mod resolver;

pub use extractor::{SymbolExtractor, parse_symbol_line, parse_symbols};
pub use file_info::SourceFile;
pub use file_walker::{EligibilityPolicy, FileWalker};
pub use resolver::{
    DeclarationSource, ReferenceLocation, ReferenceResolver, Resolution, enclosing_declaration,
    parse_reference_lines,
};
