//! In-memory task board model.
//!
//! A [`Document`] is the whole task file: header settings, an ordered list of
//! columns and the tasks keyed by identifier. Nothing here performs I/O.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::{Error, Result};
use crate::settings::Settings;

/// Protected columns as `(slug, display name)`, in default board order.
pub const DEFAULT_COLUMNS: [(&str, &str); 3] = [
    ("backlog", "Backlog"),
    ("in_progress", "In Progress"),
    ("done", "Done"),
];

const TASK_ID_LEN: usize = 8;
const ULID_TIME_LEN: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(Error::InvalidArgument(format!(
                "unknown priority '{other}' (expected high|medium|low)"
            ))),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    #[default]
    Pending,
    Running,
    Passed,
    Failed,
}

impl TestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TestStatus::Pending => "pending",
            TestStatus::Running => "running",
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
        }
    }

    /// Checkbox character written for this status. `Running` is transient
    /// and is written as an open box.
    pub fn checkbox(self) -> char {
        match self {
            TestStatus::Passed => 'x',
            TestStatus::Failed => '-',
            TestStatus::Pending | TestStatus::Running => ' ',
        }
    }

    pub fn from_checkbox(mark: char) -> Self {
        match mark {
            'x' | 'X' => TestStatus::Passed,
            '-' => TestStatus::Failed,
            _ => TestStatus::Pending,
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A test associated with a task, written as `file:function`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestRef {
    pub file: String,
    pub function: String,
}

impl TestRef {
    pub fn new(file: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            function: function.into(),
        }
    }

    /// Split `file:function` on the first lone colon, so module paths such
    /// as `tests::creates_task` stay in the function name.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let at = separator(raw)?;
        let (file, function) = (raw[..at].trim(), raw[at + 1..].trim());
        if file.is_empty() || function.is_empty() {
            return None;
        }
        Some(Self::new(file, function))
    }
}

/// Byte index of the first `:` that is not half of a `::` path separator.
fn separator(raw: &str) -> Option<usize> {
    let bytes = raw.as_bytes();
    (0..bytes.len()).find(|&at| {
        bytes[at] == b':'
            && bytes.get(at + 1) != Some(&b':')
            && (at == 0 || bytes[at - 1] != b':')
    })
}

impl fmt::Display for TestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.function)
    }
}

impl FromStr for TestRef {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        TestRef::parse(value).ok_or_else(|| {
            Error::InvalidArgument(format!("test must look like <file>:<function>, got '{value}'"))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub criteria: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tags: Vec<String>,
    pub column: String,
    #[serde(default)]
    pub requires_test: bool,
    #[serde(default)]
    pub tests: Vec<TestRef>,
    #[serde(default)]
    pub test_status: TestStatus,
    #[serde(default)]
    pub tests_passed: u32,
    #[serde(default)]
    pub tests_total: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_output: String,
    /// Position within the column; recomputed on load and reorder.
    #[serde(skip)]
    pub order: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub updated_by: String,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            criteria: String::new(),
            priority: Priority::default(),
            tags: Vec::new(),
            column: column.into(),
            requires_test: false,
            tests: Vec::new(),
            test_status: TestStatus::default(),
            tests_passed: 0,
            tests_total: 0,
            last_output: String::new(),
            order: 0,
            created_at: None,
            created_by: String::new(),
            updated_at: None,
            updated_by: String::new(),
        }
    }

    /// Record a mutation by `actor` at `now`.
    pub fn touch(&mut self, actor: &str, now: DateTime<Utc>) {
        self.updated_at = Some(now);
        self.updated_by = actor.to_string();
    }

    /// True when the last update (or creation) is older than `threshold_days`.
    pub fn is_stale(&self, now: DateTime<Utc>, threshold_days: u32) -> bool {
        match self.updated_at.or(self.created_at) {
            Some(at) => now - at > Duration::days(i64::from(threshold_days)),
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub slug: String,
    pub name: String,
    pub order: usize,
}

impl Column {
    pub fn new(name: &str, order: usize) -> Self {
        Self {
            slug: slugify(name),
            name: name.trim().to_string(),
            order,
        }
    }

    pub fn is_protected(&self) -> bool {
        is_protected(&self.slug)
    }
}

/// Derive a column slug: trimmed, lowercased, spaces become underscores.
pub fn slugify(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

pub fn is_protected(slug: &str) -> bool {
    DEFAULT_COLUMNS.iter().any(|(protected, _)| *protected == slug)
}

/// The whole task file in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub settings: Settings,
    pub columns: Vec<Column>,
    pub tasks: HashMap<String, Task>,
}

impl Document {
    /// Empty document with the default columns.
    pub fn with_default_columns() -> Self {
        let mut doc = Self::default();
        doc.ensure_default_columns();
        doc
    }

    pub fn column(&self, slug: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.slug == slug)
    }

    pub fn column_mut(&mut self, slug: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|column| column.slug == slug)
    }

    pub fn require_column(&self, slug: &str) -> Result<&Column> {
        self.column(slug)
            .ok_or_else(|| Error::ColumnNotFound(slug.to_string()))
    }

    pub fn task(&self, id: &str) -> Result<&Task> {
        self.tasks
            .get(id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))
    }

    pub fn task_mut(&mut self, id: &str) -> Result<&mut Task> {
        self.tasks
            .get_mut(id)
            .ok_or_else(|| Error::TaskNotFound(id.to_string()))
    }

    /// Columns in declared order.
    pub fn sorted_columns(&self) -> Vec<&Column> {
        let mut columns: Vec<&Column> = self.columns.iter().collect();
        columns.sort_by_key(|column| column.order);
        columns
    }

    pub fn first_column(&self) -> Option<&Column> {
        self.columns.iter().min_by_key(|column| column.order)
    }

    /// The last column by declared order; tasks land here when complete.
    pub fn terminal_column(&self) -> Option<&Column> {
        self.columns.iter().max_by_key(|column| column.order)
    }

    pub fn is_terminal(&self, slug: &str) -> bool {
        self.terminal_column()
            .map(|column| column.slug == slug)
            .unwrap_or(false)
    }

    /// Tasks of one column, sorted by order.
    pub fn tasks_in(&self, slug: &str) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self
            .tasks
            .values()
            .filter(|task| task.column == slug)
            .collect();
        tasks.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    pub fn count_in(&self, slug: &str) -> usize {
        self.tasks.values().filter(|task| task.column == slug).count()
    }

    /// All tasks, by column order then task order.
    pub fn sorted_tasks(&self) -> Vec<&Task> {
        self.sorted_columns()
            .into_iter()
            .flat_map(|column| self.tasks_in(&column.slug))
            .collect()
    }

    /// Stale tasks outside the terminal column.
    pub fn stale_tasks(&self, now: DateTime<Utc>) -> Vec<&Task> {
        let threshold = self.settings.stale_threshold_days();
        self.sorted_tasks()
            .into_iter()
            .filter(|task| !self.is_terminal(&task.column) && task.is_stale(now, threshold))
            .collect()
    }

    /// A fresh identifier not used by any task in this document.
    pub fn generate_task_id(&self) -> String {
        loop {
            let base = Ulid::new().to_string().to_lowercase();
            let candidate = &base[ULID_TIME_LEN..ULID_TIME_LEN + TASK_ID_LEN];
            if !self.tasks.contains_key(candidate) {
                return candidate.to_string();
            }
        }
    }

    /// Append any missing protected column after the existing ones.
    /// Returns true when a column was added.
    pub fn ensure_default_columns(&mut self) -> bool {
        let mut next_order = self
            .columns
            .iter()
            .map(|column| column.order + 1)
            .max()
            .unwrap_or(0);
        let mut changed = false;
        for (slug, name) in DEFAULT_COLUMNS {
            if self.column(slug).is_none() {
                self.columns.push(Column {
                    slug: slug.to_string(),
                    name: name.to_string(),
                    order: next_order,
                });
                next_order += 1;
                changed = true;
            }
        }
        changed
    }

    /// Fill in missing timestamps. Returns true when any task changed.
    pub fn backfill_tasks(&mut self, now: DateTime<Utc>) -> bool {
        let mut changed = false;
        for task in self.tasks.values_mut() {
            if task.created_at.is_none() {
                task.created_at = Some(now);
                changed = true;
            }
            if task.updated_at.is_none() {
                task.updated_at = task.created_at;
                changed = true;
            }
        }
        changed
    }

    /// Apply `id -> author` attributions to both provenance fields.
    /// Returns the number of tasks touched.
    pub fn apply_authors(&mut self, authors: &HashMap<String, String>) -> usize {
        let mut applied = 0;
        for (id, author) in authors {
            if let Some(task) = self.tasks.get_mut(id) {
                task.created_by = author.clone();
                task.updated_by = author.clone();
                applied += 1;
            }
        }
        applied
    }
}
