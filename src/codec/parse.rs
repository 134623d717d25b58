//! Line-by-line decoder.
//!
//! The body is read with a two-state machine. Each line is classified into
//! one shape (column header, task header, metadata bullet, anything else) and
//! the shape is applied according to the current state. Unknown lines are
//! skipped so newer files stay readable.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::legacy::{self, LegacyTask};
use super::{
    parse_timestamp, Decoded, Diagnostic, Normalization, Patterns, HEADER_DELIMITER,
};
use crate::error::Result;
use crate::model::{
    slugify, Column, Document, Priority, Task, TestRef, TestStatus, DEFAULT_COLUMNS,
};
use crate::settings::Settings;

/// Decode a task file. Only a failure to compile the line patterns is an
/// error; every content problem degrades to a [`Diagnostic`].
pub fn decode(input: &str, now: DateTime<Utc>) -> Result<Decoded> {
    let patterns = Patterns::compile()?;
    let lines: Vec<&str> = input.lines().collect();
    let mut diagnostics = Vec::new();

    let (settings, body_start) = split_header(&lines, &mut diagnostics);
    let mut parser = Parser::new(&patterns, settings, diagnostics);
    for (index, line) in lines.iter().enumerate().skip(body_start) {
        parser.feed(index + 1, line);
    }
    let (mut document, diagnostics, parsed_backfill) = parser.finish();

    let added_columns = document.ensure_default_columns();
    let backfilled_timestamps = document.backfill_tasks(now);
    let normalization = Normalization {
        added_columns,
        backfilled_tasks: parsed_backfill || backfilled_timestamps,
        settings_defaults: document.settings.missing_defaults(),
    };
    debug!(
        tasks = document.tasks.len(),
        columns = document.columns.len(),
        diagnostics = diagnostics.len(),
        ?normalization,
        "decoded task file"
    );

    Ok(Decoded {
        document,
        normalization,
        diagnostics,
    })
}

/// Parse the optional `---` header. Returns the settings and the index of the
/// first body line.
fn split_header(lines: &[&str], diagnostics: &mut Vec<Diagnostic>) -> (Settings, usize) {
    let Some(open) = lines.iter().position(|line| !line.trim().is_empty()) else {
        return (Settings::default(), 0);
    };
    if lines[open].trim() != HEADER_DELIMITER {
        return (Settings::default(), 0);
    }

    let Some(close) = lines[open + 1..]
        .iter()
        .position(|line| line.trim() == HEADER_DELIMITER)
        .map(|offset| open + 1 + offset)
    else {
        diagnostics.push(Diagnostic::new(open + 1, "settings header is never closed"));
        return (Settings::default(), 0);
    };

    let body = lines[open + 1..close].join("\n");
    match Settings::from_header(&body) {
        Ok(settings) => (settings, close + 1),
        Err(err) => {
            diagnostics.push(Diagnostic::new(
                open + 1,
                format!("settings header ignored: {err}"),
            ));
            (Settings::default(), close + 1)
        }
    }
}

/// Shape of a single body line.
enum Line<'a> {
    ColumnHeader(&'a str),
    TaskHeader { mark: char, title: &'a str },
    Metadata { key: &'a str, value: &'a str },
    Other,
}

/// Task being accumulated from its header and metadata bullets.
struct PendingTask {
    task: Task,
    /// Line of the task's checkbox header
    line: usize,
    raw_title: String,
    from_legacy: bool,
    has_id: bool,
    has_priority: bool,
}

enum State {
    ExpectingLine,
    AccumulatingTaskMetadata(PendingTask),
}

struct Parser<'p> {
    patterns: &'p Patterns,
    document: Document,
    state: State,
    current_column: Option<String>,
    next_column_order: usize,
    next_task_order: HashMap<String, usize>,
    diagnostics: Vec<Diagnostic>,
    needs_backfill: bool,
}

impl<'p> Parser<'p> {
    fn new(patterns: &'p Patterns, settings: Settings, diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            patterns,
            document: Document {
                settings,
                ..Document::default()
            },
            state: State::ExpectingLine,
            current_column: None,
            next_column_order: 0,
            next_task_order: HashMap::new(),
            diagnostics,
            needs_backfill: false,
        }
    }

    fn classify<'a>(&self, line: &'a str) -> Line<'a> {
        if let Some(caps) = self.patterns.column.captures(line) {
            if let Some(name) = caps.get(1) {
                return Line::ColumnHeader(name.as_str());
            }
        }
        if let Some(caps) = self.patterns.task.captures(line) {
            if let (Some(mark), Some(title)) = (caps.get(1), caps.get(2)) {
                let mark = mark.as_str().chars().next().unwrap_or(' ');
                return Line::TaskHeader {
                    mark,
                    title: title.as_str(),
                };
            }
        }
        if let Some(caps) = self.patterns.metadata.captures(line) {
            if let (Some(key), Some(value)) = (caps.get(1), caps.get(2)) {
                return Line::Metadata {
                    key: key.as_str(),
                    value: value.as_str(),
                };
            }
        }
        Line::Other
    }

    fn feed(&mut self, line_no: usize, line: &str) {
        match self.classify(line) {
            Line::ColumnHeader(name) => {
                self.finalize_task();
                self.start_column(line_no, name);
            }
            Line::TaskHeader { mark, title } => {
                self.finalize_task();
                self.start_task(line_no, mark, title);
            }
            Line::Metadata { key, value } => {
                if let State::AccumulatingTaskMetadata(pending) = &mut self.state {
                    apply_metadata(pending, line_no, key, value, &mut self.diagnostics);
                }
            }
            Line::Other => {}
        }
    }

    fn start_column(&mut self, line_no: usize, name: &str) {
        let slug = slugify(name);
        if slug.is_empty() {
            self.diagnostics
                .push(Diagnostic::new(line_no, "column heading without a name"));
            return;
        }
        if self.document.column(&slug).is_none() {
            self.document
                .columns
                .push(Column::new(name, self.next_column_order));
            self.next_column_order += 1;
        }
        self.current_column = Some(slug);
    }

    fn start_task(&mut self, line_no: usize, mark: char, title: &str) {
        let title = title.trim();
        if title.is_empty() {
            self.diagnostics
                .push(Diagnostic::new(line_no, "task line without a title"));
            return;
        }

        let column = match &self.current_column {
            Some(slug) => slug.clone(),
            None => {
                self.diagnostics.push(Diagnostic::new(
                    line_no,
                    "task before any column heading, placed in the first default column",
                ));
                DEFAULT_COLUMNS[0].0.to_string()
            }
        };

        let mut task = Task::new(String::new(), title, column);
        task.test_status = TestStatus::from_checkbox(mark);
        let mut pending = PendingTask {
            task,
            line: line_no,
            raw_title: title.to_string(),
            from_legacy: false,
            has_id: false,
            has_priority: false,
        };

        if legacy::looks_legacy(title) {
            match legacy::parse(&self.patterns.legacy, title) {
                Some(fields) => apply_legacy(&mut pending, fields),
                None => self.diagnostics.push(Diagnostic::new(
                    line_no,
                    "title contains '|' but matches no legacy format, kept as written",
                )),
            }
        }

        self.state = State::AccumulatingTaskMetadata(pending);
    }

    fn finalize_task(&mut self) {
        let State::AccumulatingTaskMetadata(pending) =
            std::mem::replace(&mut self.state, State::ExpectingLine)
        else {
            return;
        };
        let PendingTask {
            mut task,
            line,
            from_legacy,
            has_id,
            has_priority,
            ..
        } = pending;

        if from_legacy || !has_id || !has_priority {
            self.needs_backfill = true;
        }
        if task.id.is_empty() || self.document.tasks.contains_key(&task.id) {
            if !task.id.is_empty() {
                self.diagnostics.push(Diagnostic::new(
                    line,
                    format!("duplicate task id '{}', assigned a new one", task.id),
                ));
            }
            task.id = self.document.generate_task_id();
            self.needs_backfill = true;
        }

        let counter = self.next_task_order.entry(task.column.clone()).or_insert(0);
        task.order = *counter;
        *counter += 1;

        self.document.tasks.insert(task.id.clone(), task);
    }

    fn finish(mut self) -> (Document, Vec<Diagnostic>, bool) {
        self.finalize_task();
        (self.document, self.diagnostics, self.needs_backfill)
    }
}

fn apply_legacy(pending: &mut PendingTask, fields: LegacyTask) {
    let task = &mut pending.task;
    task.title = fields.title;
    task.criteria = fields.criteria;
    if let Some(priority) = fields.priority {
        task.priority = priority;
        pending.has_priority = true;
    }
    if let Some(test) = fields.test {
        task.tests.push(test);
        task.requires_test = true;
    }
    if let Some(id) = fields.id {
        task.id = id;
        pending.has_id = true;
    }
    pending.from_legacy = true;
}

/// A legacy-looking title followed by metadata bullets was a current-dialect
/// title that happens to contain the separator.
fn revert_legacy(pending: &mut PendingTask) {
    let task = &mut pending.task;
    task.title = pending.raw_title.clone();
    task.criteria.clear();
    task.priority = Priority::default();
    task.tests.clear();
    task.requires_test = false;
    task.id.clear();
    pending.from_legacy = false;
    pending.has_id = false;
    pending.has_priority = false;
}

fn apply_metadata(
    pending: &mut PendingTask,
    line_no: usize,
    key: &str,
    value: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if pending.from_legacy {
        revert_legacy(pending);
    }
    let task = &mut pending.task;
    match key {
        "id" => {
            if !value.is_empty() {
                task.id = value.to_string();
                pending.has_id = true;
            }
        }
        "priority" => match value.parse::<Priority>() {
            Ok(priority) => {
                task.priority = priority;
                pending.has_priority = true;
            }
            Err(_) => diagnostics.push(Diagnostic::new(
                line_no,
                format!("unknown priority '{value}', using medium"),
            )),
        },
        "tags" => {
            task.tags = value
                .split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect();
        }
        "requires_test" => task.requires_test = value == "true",
        "test" => match TestRef::parse(value) {
            Some(test) => task.tests.push(test),
            None => diagnostics.push(Diagnostic::new(
                line_no,
                format!("test reference '{value}' is not <file>:<function>"),
            )),
        },
        "tests_passed" => {
            if let Ok(count) = value.parse() {
                task.tests_passed = count;
            }
        }
        "tests_total" => {
            if let Ok(count) = value.parse() {
                task.tests_total = count;
            }
        }
        "criteria" => task.criteria = value.to_string(),
        "created_at" => {
            if let Some(at) = parse_timestamp(value) {
                task.created_at = Some(at);
            }
        }
        "updated_at" => {
            if let Some(at) = parse_timestamp(value) {
                task.updated_at = Some(at);
            }
        }
        "created_by" => task.created_by = value.to_string(),
        "updated_by" => task.updated_by = value.to_string(),
        _ => {}
    }
}
