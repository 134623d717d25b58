//! Task commands: list, show, add, edit, move, rm

use serde::Serialize;

use crate::cli::Target;
use crate::error::{Error, Result};
use crate::model::{Priority, Task, TestRef, TestStatus};
use crate::output::{emit_success, HumanOutput, OutputOptions};
use crate::store::{NewTask, TaskUpdate};

pub(crate) struct ListOptions {
    pub column: Option<String>,
    pub stale: bool,
}

pub(crate) struct AddOptions {
    pub title: String,
    pub criteria: Option<String>,
    pub priority: Option<String>,
    pub tags: Vec<String>,
    pub column: Option<String>,
    pub requires_test: bool,
    pub tests: Vec<String>,
}

pub(crate) struct EditOptions {
    pub id: String,
    pub title: Option<String>,
    pub criteria: Option<String>,
    pub priority: Option<String>,
    pub tags: Option<String>,
    pub column: Option<String>,
    pub requires_test: Option<bool>,
    pub tests: Vec<String>,
    pub clear_tests: bool,
}

#[derive(Serialize)]
struct TaskListOutput {
    total: usize,
    tasks: Vec<Task>,
}

#[derive(Serialize)]
struct TaskMoveOutput {
    id: String,
    from: String,
    to: String,
    position: usize,
}

pub(crate) fn run_list(target: Target, output: OutputOptions, options: ListOptions) -> Result<()> {
    let ctx = target.open()?;
    let mut tasks = match options.column.as_deref() {
        Some(column) => ctx.store.tasks_in(column)?,
        None => ctx.store.get_all(),
    };
    if options.stale {
        let stale: Vec<String> = ctx.store.stale_tasks().into_iter().map(|t| t.id).collect();
        tasks.retain(|task| stale.contains(&task.id));
    }

    let header = if options.stale { "Stale tasks" } else { "Tasks" };
    let mut human = HumanOutput::new(header);
    human.push_summary("Total", tasks.len().to_string());
    if let Some(column) = options.column.as_ref() {
        human.push_summary("Column", column.clone());
    }
    if options.stale {
        human.push_summary(
            "Threshold",
            format!("{} days", ctx.store.settings().stale_threshold_days()),
        );
    }
    for task in &tasks {
        human.push_detail(task_line(task));
    }

    let data = TaskListOutput {
        total: tasks.len(),
        tasks,
    };
    ctx.finish()?;
    emit_success(output, "list", &data, Some(&human))
}

pub(crate) fn run_show(target: Target, output: OutputOptions, id: &str) -> Result<()> {
    let ctx = target.open()?;
    let task = ctx.store.get(id)?;

    let mut human = HumanOutput::new(format!("Task {}", task.id));
    push_task_summary(&mut human, &task);
    if !task.last_output.is_empty() {
        for line in task.last_output.lines() {
            human.push_detail(line.to_string());
        }
    }

    ctx.finish()?;
    emit_success(output, "show", &task, Some(&human))
}

pub(crate) fn run_add(target: Target, output: OutputOptions, options: AddOptions) -> Result<()> {
    let new = NewTask {
        title: options.title,
        criteria: options.criteria.unwrap_or_default(),
        priority: options
            .priority
            .as_deref()
            .map(str::parse::<Priority>)
            .transpose()?,
        tags: options.tags,
        column: options.column,
        requires_test: options.requires_test,
        tests: parse_tests(&options.tests)?,
    };

    let ctx = target.open()?;
    let task = ctx.store.create(new)?;
    ctx.finish()?;

    let mut human = HumanOutput::new("Task created");
    push_task_summary(&mut human, &task);
    human.push_next_step(format!("mdtasks move {} in_progress", task.id));

    emit_success(output, "add", &task, Some(&human))
}

pub(crate) fn run_edit(target: Target, output: OutputOptions, options: EditOptions) -> Result<()> {
    let tests = if options.clear_tests {
        Some(Vec::new())
    } else if options.tests.is_empty() {
        None
    } else {
        Some(parse_tests(&options.tests)?)
    };
    let update = TaskUpdate {
        title: options.title,
        criteria: options.criteria,
        priority: options
            .priority
            .as_deref()
            .map(str::parse::<Priority>)
            .transpose()?,
        tags: options.tags.as_deref().map(split_tags),
        column: options.column,
        requires_test: options.requires_test,
        tests,
    };
    if is_empty_update(&update) {
        return Err(Error::InvalidArgument(
            "edit requires at least one field to change".to_string(),
        ));
    }

    let ctx = target.open()?;
    let task = ctx.store.update(&options.id, update)?;
    ctx.finish()?;

    let mut human = HumanOutput::new("Task updated");
    push_task_summary(&mut human, &task);

    emit_success(output, "edit", &task, Some(&human))
}

pub(crate) fn run_move(
    target: Target,
    output: OutputOptions,
    id: &str,
    column: &str,
    position: Option<usize>,
) -> Result<()> {
    let ctx = target.open()?;
    let from = ctx.store.get(id)?.column;
    let task = ctx.store.reorder(id, column, position.unwrap_or(usize::MAX))?;
    ctx.finish()?;

    let data = TaskMoveOutput {
        id: task.id.clone(),
        from,
        to: task.column.clone(),
        position: task.order,
    };

    let mut human = HumanOutput::new("Task moved");
    human.push_summary("ID", data.id.clone());
    human.push_summary("From", data.from.clone());
    human.push_summary("To", data.to.clone());
    human.push_summary("Position", data.position.to_string());

    emit_success(output, "move", &data, Some(&human))
}

pub(crate) fn run_rm(target: Target, output: OutputOptions, id: &str) -> Result<()> {
    let ctx = target.open()?;
    let task = ctx.store.delete(id)?;
    ctx.finish()?;

    let mut human = HumanOutput::new("Task deleted");
    human.push_summary("ID", task.id.clone());
    human.push_summary("Title", task.title.clone());

    emit_success(output, "rm", &task, Some(&human))
}

fn parse_tests(raw: &[String]) -> Result<Vec<TestRef>> {
    raw.iter().map(|value| value.parse::<TestRef>()).collect()
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_empty_update(update: &TaskUpdate) -> bool {
    update.title.is_none()
        && update.criteria.is_none()
        && update.priority.is_none()
        && update.tags.is_none()
        && update.column.is_none()
        && update.requires_test.is_none()
        && update.tests.is_none()
}

fn task_line(task: &Task) -> String {
    let mut line = format!(
        "[{}][{}] {} {}",
        task.column, task.priority, task.id, task.title
    );
    if !task.tags.is_empty() {
        line.push_str(&format!(" #{}", task.tags.join(" #")));
    }
    if task.requires_test || !task.tests.is_empty() {
        line.push_str(&format!(" ({})", test_label(task)));
    }
    line
}

fn test_label(task: &Task) -> String {
    match task.test_status {
        TestStatus::Pending | TestStatus::Running => format!("tests {}", task.test_status),
        TestStatus::Passed | TestStatus::Failed => format!(
            "tests {} {}/{}",
            task.test_status, task.tests_passed, task.tests_total
        ),
    }
}

fn push_task_summary(human: &mut HumanOutput, task: &Task) {
    human.push_summary("ID", task.id.clone());
    human.push_summary("Title", task.title.clone());
    human.push_summary("Column", task.column.clone());
    human.push_summary("Priority", task.priority.to_string());
    if !task.criteria.is_empty() {
        human.push_summary("Criteria", task.criteria.clone());
    }
    if !task.tags.is_empty() {
        human.push_summary("Tags", task.tags.join(", "));
    }
    if task.requires_test || !task.tests.is_empty() {
        human.push_summary("Tests", test_label(task));
        for test in &task.tests {
            human.push_summary("Test", test.to_string());
        }
    }
    if !task.created_by.is_empty() {
        human.push_summary("Created by", task.created_by.clone());
    }
    if let Some(updated_at) = task.updated_at {
        human.push_summary(
            "Updated",
            format!("{} by {}", updated_at.to_rfc3339(), task.updated_by),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_split_on_commas_and_empty_clears() {
        assert_eq!(split_tags("ui, backend ,,"), vec!["ui", "backend"]);
        assert!(split_tags("").is_empty());
    }

    #[test]
    fn test_refs_parse_or_fail() {
        let refs = parse_tests(&["tests/a.rs:works".to_string()]).expect("parse");
        assert_eq!(refs, vec![TestRef::new("tests/a.rs", "works")]);
        let nested = parse_tests(&["tests/a.rs:tests::works".to_string()]).expect("parse");
        assert_eq!(nested, vec![TestRef::new("tests/a.rs", "tests::works")]);
        assert!(matches!(
            parse_tests(&["nofunction".to_string()]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn list_line_shows_test_progress() {
        let mut task = Task::new("abcd1234", "Ship it", "done");
        task.tags = vec!["release".to_string()];
        task.requires_test = true;
        task.test_status = TestStatus::Passed;
        task.tests_passed = 2;
        task.tests_total = 2;
        assert_eq!(
            task_line(&task),
            "[done][medium] abcd1234 Ship it #release (tests passed 2/2)"
        );
    }
}
