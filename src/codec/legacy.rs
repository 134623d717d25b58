//! Single-line task dialects written by earlier releases.
//!
//! All three put every field on the checkbox line, separated by ` | `, with an
//! optional trailing `<!-- id: X -->` annotation:
//!
//! ```text
//! - [ ] Title | high | tests/a.rs:works | criteria <!-- id: X -->   (priority + test)
//! - [ ] Title | high | criteria <!-- id: X -->                      (priority, no test)
//! - [ ] Title | tests/a.rs:works | criteria <!-- id: X -->          (oldest: test, no priority)
//! ```

use regex::{Captures, Regex};

use crate::model::{Priority, TestRef};

/// Field separator shared by every legacy dialect.
pub const FIELD_SEPARATOR: char = '|';

const TITLE: &str = r"^(?P<title>[^|]+?)\s*\|\s*";
const PRIORITY: &str = r"(?P<priority>(?i:high|medium|low))\s*\|\s*";
const TEST: &str = r"(?P<test>[^|]+:[^|]+?)\s*\|\s*";
const CRITERIA_AND_ID: &str =
    r"(?P<criteria>[^|]*?)(?:\s*<!--\s*id:\s*(?P<id>[A-Za-z0-9_-]+)\s*-->)?\s*$";

/// Fields recovered from a legacy task line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTask {
    pub title: String,
    pub priority: Option<Priority>,
    pub test: Option<TestRef>,
    pub criteria: String,
    pub id: Option<String>,
}

/// Patterns richest first: priority + test, priority only, test only.
pub fn compile() -> Result<[Regex; 3], regex::Error> {
    Ok([
        Regex::new(&format!("{TITLE}{PRIORITY}{TEST}{CRITERIA_AND_ID}"))?,
        Regex::new(&format!("{TITLE}{PRIORITY}{CRITERIA_AND_ID}"))?,
        Regex::new(&format!("{TITLE}{TEST}{CRITERIA_AND_ID}"))?,
    ])
}

/// True when a checkbox-line title should be tried against the legacy dialects.
pub fn looks_legacy(title: &str) -> bool {
    title.contains(FIELD_SEPARATOR)
}

/// Parse `title` with the first legacy pattern that matches.
pub fn parse(patterns: &[Regex; 3], title: &str) -> Option<LegacyTask> {
    patterns
        .iter()
        .find_map(|pattern| pattern.captures(title))
        .and_then(|caps| from_captures(&caps))
}

fn from_captures(caps: &Captures<'_>) -> Option<LegacyTask> {
    let text = |name: &str| caps.name(name).map(|m| m.as_str().trim());
    let title = text("title")?;
    if title.is_empty() {
        return None;
    }
    Some(LegacyTask {
        title: title.to_string(),
        priority: text("priority").and_then(|raw| raw.parse().ok()),
        test: text("test").and_then(TestRef::parse),
        criteria: text("criteria").unwrap_or_default().to_string(),
        id: text("id")
            .filter(|id| !id.is_empty())
            .map(str::to_string),
    })
}
