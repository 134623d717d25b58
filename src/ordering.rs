//! Dense per-column ordering for tasks and board ordering for columns.
//!
//! After any move completes, the tasks of the touched columns hold the orders
//! `0..n` with no gaps. Column deletion may leave gaps in column orders;
//! [`Document::reorder_columns`] always renumbers them `0..n`.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::model::Document;

impl Document {
    /// Move a task to `column` at `position`, clamped to `[0, n]` where `n`
    /// counts the other tasks already in that column. Returns the final
    /// position.
    pub fn move_task(&mut self, id: &str, column: &str, position: usize) -> Result<usize> {
        self.require_column(column)?;
        let source = self.task(id)?.column.clone();

        let others: Vec<String> = self
            .tasks_in(column)
            .into_iter()
            .filter(|task| task.id != id)
            .map(|task| task.id.clone())
            .collect();
        let position = position.min(others.len());

        for (index, other) in others.iter().enumerate() {
            let slot = if index < position { index } else { index + 1 };
            if let Some(task) = self.tasks.get_mut(other) {
                task.order = slot;
            }
        }

        let task = self.task_mut(id)?;
        task.column = column.to_string();
        task.order = position;

        if source != column {
            self.renumber_column(&source);
        }
        Ok(position)
    }

    /// Move a task to the end of `column`.
    pub fn append_task(&mut self, id: &str, column: &str) -> Result<usize> {
        self.move_task(id, column, usize::MAX)
    }

    /// Rewrite the task orders of one column as `0..n`, keeping their
    /// relative order.
    pub fn renumber_column(&mut self, column: &str) {
        let ids: Vec<String> = self
            .tasks_in(column)
            .into_iter()
            .map(|task| task.id.clone())
            .collect();
        for (slot, id) in ids.iter().enumerate() {
            if let Some(task) = self.tasks.get_mut(id) {
                task.order = slot;
            }
        }
    }

    /// Put the listed columns first, in the given order, followed by the
    /// unlisted ones in their existing order. Orders become `0..n`.
    pub fn reorder_columns(&mut self, slugs: &[String]) -> Result<()> {
        let mut seen = HashSet::new();
        for slug in slugs {
            self.require_column(slug)?;
            if !seen.insert(slug.as_str()) {
                return Err(Error::InvalidArgument(format!(
                    "column '{slug}' listed more than once"
                )));
            }
        }

        let mut ordered: Vec<String> = slugs.to_vec();
        ordered.extend(
            self.sorted_columns()
                .into_iter()
                .filter(|column| !seen.contains(column.slug.as_str()))
                .map(|column| column.slug.clone()),
        );

        for (slot, slug) in ordered.iter().enumerate() {
            if let Some(column) = self.column_mut(slug) {
                column.order = slot;
            }
        }
        self.columns.sort_by_key(|column| column.order);
        Ok(())
    }

    /// Order value for a column appended after every existing one.
    pub fn next_column_order(&self) -> usize {
        self.columns
            .iter()
            .map(|column| column.order + 1)
            .max()
            .unwrap_or(0)
    }
}
