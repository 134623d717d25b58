//! Writer for the current dialect.

use std::fmt::Write as _;

use super::{format_timestamp, HEADER_DELIMITER};
use crate::error::Result;
use crate::model::{Document, Task};

/// Serialize a document. Columns and tasks are written in order; the header
/// always carries every setting, defaults included.
pub fn encode(document: &Document) -> Result<String> {
    let mut out = String::new();
    out.push_str(HEADER_DELIMITER);
    out.push('\n');
    out.push_str(&document.settings.to_header()?);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(HEADER_DELIMITER);
    out.push('\n');

    for column in document.sorted_columns() {
        let _ = write!(out, "\n## {}\n\n", single_line(&column.name));
        for task in document.tasks_in(&column.slug) {
            write_task(&mut out, task);
        }
    }

    Ok(out)
}

fn write_task(out: &mut String, task: &Task) {
    let _ = writeln!(
        out,
        "- [{}] {}",
        task.test_status.checkbox(),
        single_line(&task.title)
    );
    field(out, "id", &task.id);
    field(out, "priority", task.priority.as_str());
    if !task.tags.is_empty() {
        field(out, "tags", &task.tags.join(", "));
    }
    field(out, "requires_test", if task.requires_test { "true" } else { "false" });
    for test in &task.tests {
        field(out, "test", &test.to_string());
    }
    if task.tests_total > 0 {
        field(out, "tests_passed", &task.tests_passed.to_string());
        field(out, "tests_total", &task.tests_total.to_string());
    }
    if !task.criteria.is_empty() {
        field(out, "criteria", &single_line(&task.criteria));
    }
    if let Some(at) = task.created_at {
        field(out, "created_at", &format_timestamp(at));
    }
    if !task.created_by.is_empty() {
        field(out, "created_by", &task.created_by);
    }
    if let Some(at) = task.updated_at {
        field(out, "updated_at", &format_timestamp(at));
    }
    if !task.updated_by.is_empty() {
        field(out, "updated_by", &task.updated_by);
    }
}

fn field(out: &mut String, key: &str, value: &str) {
    let _ = writeln!(out, "  - {key}: {}", single_line(value));
}

fn single_line(value: &str) -> String {
    value
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
