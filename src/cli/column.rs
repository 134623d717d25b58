//! Column commands

use serde::Serialize;

use crate::cli::Target;
use crate::error::Result;
use crate::model::Column;
use crate::output::{emit_success, HumanOutput, OutputOptions};

#[derive(Serialize)]
struct ColumnEntry {
    #[serde(flatten)]
    column: Column,
    tasks: usize,
    protected: bool,
}

#[derive(Serialize)]
struct ColumnListOutput {
    columns: Vec<ColumnEntry>,
}

pub(crate) fn run_list(target: Target, output: OutputOptions) -> Result<()> {
    let ctx = target.open()?;
    let columns: Vec<ColumnEntry> = ctx
        .store
        .columns()
        .into_iter()
        .map(|column| {
            let tasks = ctx.store.tasks_in(&column.slug).map(|t| t.len()).unwrap_or(0);
            ColumnEntry {
                protected: column.is_protected(),
                column,
                tasks,
            }
        })
        .collect();
    ctx.finish()?;

    let mut human = HumanOutput::new("Columns");
    for entry in &columns {
        let mut line = format!(
            "{} ({}) {} task(s)",
            entry.column.name, entry.column.slug, entry.tasks
        );
        if entry.protected {
            line.push_str(" [protected]");
        }
        human.push_detail(line);
    }

    emit_success(output, "column list", &ColumnListOutput { columns }, Some(&human))
}

pub(crate) fn run_add(target: Target, output: OutputOptions, name: &str) -> Result<()> {
    let ctx = target.open()?;
    let column = ctx.store.create_column(name)?;
    ctx.finish()?;

    let mut human = HumanOutput::new("Column added");
    push_column_summary(&mut human, &column);
    emit_success(output, "column add", &column, Some(&human))
}

pub(crate) fn run_rename(
    target: Target,
    output: OutputOptions,
    slug: &str,
    name: &str,
) -> Result<()> {
    let ctx = target.open()?;
    let column = ctx.store.update_column(slug, name)?;
    ctx.finish()?;

    let mut human = HumanOutput::new("Column renamed");
    push_column_summary(&mut human, &column);
    if column.slug != slug {
        human.push_summary("Previous slug", slug);
    }
    emit_success(output, "column rename", &column, Some(&human))
}

pub(crate) fn run_rm(target: Target, output: OutputOptions, slug: &str) -> Result<()> {
    let ctx = target.open()?;
    let column = ctx.store.delete_column(slug)?;
    ctx.finish()?;

    let mut human = HumanOutput::new("Column deleted");
    push_column_summary(&mut human, &column);
    emit_success(output, "column rm", &column, Some(&human))
}

pub(crate) fn run_reorder(target: Target, output: OutputOptions, slugs: &[String]) -> Result<()> {
    let ctx = target.open()?;
    let columns = ctx.store.reorder_columns(slugs)?;
    ctx.finish()?;

    let mut human = HumanOutput::new("Columns reordered");
    for column in &columns {
        human.push_detail(format!("{}. {}", column.order, column.slug));
    }
    emit_success(output, "column reorder", &columns, Some(&human))
}

fn push_column_summary(human: &mut HumanOutput, column: &Column) {
    human.push_summary("Slug", column.slug.clone());
    human.push_summary("Name", column.name.clone());
    human.push_summary("Order", column.order.to_string());
}
