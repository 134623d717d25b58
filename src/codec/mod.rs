//! Task file codec
//!
//! Reads every dialect the task file has been written in and writes only the
//! current one.
//!
//! ```text
//! ---
//! stale_threshold_days: 7
//! test_runner:
//!   command: cargo test {testFunc} -- --exact
//! ---
//!
//! ## Backlog
//!
//! - [ ] Write the parser
//!   - id: 3kq9x7mz
//!   - priority: high
//!   - test: src/codec/parse.rs:parses_columns
//! ```

mod encode;
mod legacy;
mod parse;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::Serialize;

use crate::error::Result;

pub use encode::encode;
pub use parse::decode;

/// Line that opens and closes the settings header.
pub const HEADER_DELIMITER: &str = "---";

/// A recoverable problem found while decoding. The affected line or header
/// falls back to defaults; nothing is surfaced to callers as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// 1-based line number, 0 for whole-document problems
    pub line: usize,
    pub message: String,
}

impl Diagnostic {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.line == 0 {
            f.write_str(&self.message)
        } else {
            write!(f, "line {}: {}", self.line, self.message)
        }
    }
}

/// Which post-parse normalization steps changed the document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Normalization {
    /// A protected default column was synthesized
    pub added_columns: bool,
    /// A task got a generated id, default priority or timestamps, or was
    /// migrated from a legacy line
    pub backfilled_tasks: bool,
    /// The header is missing a field that uses a default
    pub settings_defaults: bool,
}

impl Normalization {
    /// True when the file on disk should be rewritten.
    pub fn any(&self) -> bool {
        self.added_columns || self.backfilled_tasks || self.settings_defaults
    }
}

/// Result of decoding a task file.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub document: crate::model::Document,
    pub normalization: Normalization,
    pub diagnostics: Vec<Diagnostic>,
}

/// Compiled line shapes, tried in a fixed priority order.
pub(crate) struct Patterns {
    pub column: Regex,
    pub task: Regex,
    pub metadata: Regex,
    pub legacy: [Regex; 3],
}

impl Patterns {
    pub fn compile() -> Result<Self> {
        Ok(Self {
            column: Regex::new(r"^##\s+(.+?)\s*$")?,
            task: Regex::new(r"^- \[([ xX\-])\] (.+?)\s*$")?,
            metadata: Regex::new(r"^  - ([A-Za-z_]+):[ \t]*(.*?)\s*$")?,
            legacy: legacy::compile()?,
        })
    }
}

/// Metadata line that carries a task identifier, as written by any dialect.
pub(crate) fn id_line_pattern() -> Result<Regex> {
    Ok(Regex::new(
        r"^  - id:\s*([A-Za-z0-9_-]+)\s*$|<!--\s*id:\s*([A-Za-z0-9_-]+)\s*-->",
    )?)
}

pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|at| at.with_timezone(&Utc))
}
