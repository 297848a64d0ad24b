//! Source positions as reported by the oracle.
//!
//! The oracle reports a declaration range either as `line:col-col` or as
//! `line:col-line:col`. Only the start line and the two column numbers are
//! kept; an end line, when present, is discarded.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static RANGE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+):(\d+)-(?:\d+:)?(\d+)$").expect("range regex is valid")
});

/// A line plus a column range on that line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub line: u32,
    pub column_start: u32,
    pub column_end: u32,
}

impl Position {
    /// Build a position, rejecting line 0 and inverted column ranges
    pub fn new(line: u32, column_start: u32, column_end: u32) -> Option<Self> {
        if line == 0 || column_start > column_end {
            return None;
        }
        Some(Self {
            line,
            column_start,
            column_end,
        })
    }

    /// Parse an oracle range token (`12:6-12:10` or `12:6-10`)
    pub fn parse(token: &str) -> Option<Self> {
        let caps = RANGE_REGEX.captures(token.trim())?;
        let line = caps[1].parse().ok()?;
        let column_start = caps[2].parse().ok()?;
        let column_end = caps[3].parse().ok()?;
        Self::new(line, column_start, column_end)
    }

    /// Query form expected by the oracle after `path:`
    pub fn to_query(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.line, self.column_start, self.column_end)
    }
}
