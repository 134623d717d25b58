mod support;

use mdtasks::error::Error;
use mdtasks::model::{Priority, TestRef, TestStatus};
use mdtasks::settings::Settings;
use mdtasks::testrun::{TestOutcome, TestRunReport};
use mdtasks::{NewTask, TaskUpdate};

use support::TestBoard;

fn slugs(store: &mdtasks::TaskStore) -> Vec<String> {
    store.columns().into_iter().map(|column| column.slug).collect()
}

#[test]
fn opening_a_missing_file_writes_default_board() -> Result<(), Box<dyn std::error::Error>> {
    let board = TestBoard::new()?;
    let store = board.open("alice")?;

    assert_eq!(slugs(&store), vec!["backlog", "in_progress", "done"]);
    assert!(store.get_all().is_empty());
    assert_eq!(store.save_count(), 1);

    let text = board.read_tasks()?;
    assert!(text.starts_with("---\n"));
    assert!(text.contains("## Backlog"));
    assert!(text.contains("## In Progress"));
    assert!(text.contains("## Done"));
    Ok(())
}

#[test]
fn normalized_file_loads_without_rewriting() -> Result<(), Box<dyn std::error::Error>> {
    let board = TestBoard::new()?;
    {
        let store = board.open("alice")?;
        store.create(NewTask::new("Write docs"))?;
        store.close()?;
    }
    let before = board.read_tasks()?;

    let store = board.open("bob")?;
    assert_eq!(store.save_count(), 0);
    store.close()?;
    assert_eq!(board.read_tasks()?, before);
    Ok(())
}

#[test]
fn empty_file_is_normalized_on_load() -> Result<(), Box<dyn std::error::Error>> {
    let board = TestBoard::new()?;
    board.write_file("TASKS.md", "")?;

    let store = board.open("alice")?;
    let report = store.load()?;
    assert!(report.normalized);
    assert_eq!(report.columns, 3);
    assert!(board.read_tasks()?.contains("stale_threshold_days: 7"));
    Ok(())
}

#[test]
fn create_records_actor_and_appends_to_first_column() -> Result<(), Box<dyn std::error::Error>> {
    let board = TestBoard::new()?;
    let store = board.open("alice")?;

    let first = store.create(NewTask::new("First"))?;
    let second = store.create(NewTask {
        priority: Some(Priority::High),
        tags: vec![" api ".to_string(), String::new()],
        criteria: "  Works  ".to_string(),
        ..NewTask::new("Second")
    })?;

    assert_eq!(first.id.len(), 8);
    assert_ne!(first.id, second.id);
    assert_eq!((first.column.as_str(), first.order), ("backlog", 0));
    assert_eq!(second.order, 1);
    assert_eq!(second.tags, vec!["api"]);
    assert_eq!(second.criteria, "Works");
    assert_eq!(first.created_by, "alice");
    assert_eq!(first.updated_by, "alice");
    assert_eq!(first.created_at, first.updated_at);
    Ok(())
}

#[test]
fn tags_and_module_path_tests_survive_reload() -> Result<(), Box<dyn std::error::Error>> {
    let board = TestBoard::new()?;
    let store = board.open("alice")?;
    let task = store.create(NewTask {
        tags: vec!["api,backend".to_string(), " ops ".to_string()],
        tests: vec![TestRef::new("tests/store.rs", "tests::creates_task")],
        ..NewTask::new("Tagged")
    })?;
    assert_eq!(task.tags, vec!["api", "backend", "ops"]);
    let updated = store.update(
        &task.id,
        TaskUpdate {
            tags: Some(vec!["a,,b".to_string()]),
            ..TaskUpdate::default()
        },
    )?;
    assert_eq!(updated.tags, vec!["a", "b"]);
    store.close()?;

    let reopened = board.open("bob")?;
    let loaded = reopened.get(&task.id)?;
    assert_eq!(loaded.tags, updated.tags);
    assert_eq!(loaded.tests, task.tests);
    assert_eq!(reopened.save_count(), 0);
    Ok(())
}

#[test]
fn update_touches_only_given_fields() -> Result<(), Box<dyn std::error::Error>> {
    let board = TestBoard::new()?;
    let store = board.open("alice")?;
    let task = store.create(NewTask {
        priority: Some(Priority::Low),
        ..NewTask::new("Draft")
    })?;
    store.close()?;

    let store = board.open("bob")?;
    let updated = store.update(
        &task.id,
        TaskUpdate {
            title: Some("Final".to_string()),
            column: Some("in_progress".to_string()),
            ..TaskUpdate::default()
        },
    )?;
    assert_eq!(updated.title, "Final");
    assert_eq!(updated.priority, Priority::Low);
    assert_eq!(updated.column, "in_progress");
    assert_eq!(updated.created_by, "alice");
    assert_eq!(updated.updated_by, "bob");

    assert!(matches!(
        store.update("missing", TaskUpdate::default()),
        Err(Error::TaskNotFound(_))
    ));
    assert!(matches!(
        store.update(
            &task.id,
            TaskUpdate {
                column: Some("nowhere".to_string()),
                ..TaskUpdate::default()
            }
        ),
        Err(Error::ColumnNotFound(_))
    ));
    Ok(())
}

#[test]
fn reorder_keeps_positions_contiguous() -> Result<(), Box<dyn std::error::Error>> {
    let board = TestBoard::new()?;
    let store = board.open("alice")?;
    let a = store.create(NewTask::new("A"))?;
    let b = store.create(NewTask::new("B"))?;
    let c = store.create(NewTask::new("C"))?;

    store.reorder(&c.id, "backlog", 0)?;
    let order: Vec<String> = store
        .tasks_in("backlog")?
        .into_iter()
        .map(|task| task.title)
        .collect();
    assert_eq!(order, vec!["C", "A", "B"]);

    let moved = store.reorder(&a.id, "in_progress", 99)?;
    assert_eq!((moved.column.as_str(), moved.order), ("in_progress", 0));
    let backlog: Vec<usize> = store
        .tasks_in("backlog")?
        .into_iter()
        .map(|task| task.order)
        .collect();
    assert_eq!(backlog, vec![0, 1]);

    store.delete(&c.id)?;
    assert_eq!(store.get(&b.id)?.order, 0);
    assert!(matches!(store.get(&c.id), Err(Error::TaskNotFound(_))));
    Ok(())
}

#[test]
fn column_rules_are_enforced() -> Result<(), Box<dyn std::error::Error>> {
    let board = TestBoard::new()?;
    let store = board.open("alice")?;

    let review = store.create_column("Code Review")?;
    assert_eq!(review.slug, "code_review");
    assert_eq!(slugs(&store).last().map(String::as_str), Some("code_review"));
    assert!(matches!(
        store.create_column("code review"),
        Err(Error::ColumnConflict(_))
    ));

    assert!(matches!(
        store.delete_column("backlog"),
        Err(Error::ColumnConflict(_))
    ));
    assert!(matches!(
        store.update_column("done", "Shipped"),
        Err(Error::ColumnConflict(_))
    ));
    let renamed_done = store.update_column("done", "DONE")?;
    assert_eq!(renamed_done.name, "DONE");

    let task = store.create(NewTask {
        column: Some("code_review".to_string()),
        ..NewTask::new("Look at it")
    })?;
    assert!(matches!(
        store.delete_column("code_review"),
        Err(Error::ColumnConflict(_))
    ));

    let renamed = store.update_column("code_review", "Review")?;
    assert_eq!(renamed.slug, "review");
    assert_eq!(store.get(&task.id)?.column, "review");

    store.delete(&task.id)?;
    store.delete_column("review")?;
    assert_eq!(slugs(&store), vec!["backlog", "in_progress", "done"]);
    Ok(())
}

#[test]
fn reorder_columns_puts_listed_first() -> Result<(), Box<dyn std::error::Error>> {
    let board = TestBoard::new()?;
    let store = board.open("alice")?;
    store.create_column("Review")?;

    let columns = store.reorder_columns(&["review".to_string(), "backlog".to_string()])?;
    let order: Vec<&str> = columns.iter().map(|column| column.slug.as_str()).collect();
    assert_eq!(order, vec!["review", "backlog", "in_progress", "done"]);
    let positions: Vec<usize> = columns.iter().map(|column| column.order).collect();
    assert_eq!(positions, vec![0, 1, 2, 3]);

    assert!(matches!(
        store.reorder_columns(&["nope".to_string()]),
        Err(Error::ColumnNotFound(_))
    ));
    Ok(())
}

#[test]
fn terminal_column_is_gated_by_tests() -> Result<(), Box<dyn std::error::Error>> {
    let board = TestBoard::new()?;
    let store = board.open("alice")?;
    let task = store.create(NewTask {
        requires_test: true,
        tests: vec![TestRef::new("tests/a.rs", "works")],
        ..NewTask::new("Gated")
    })?;

    let err = store.reorder(&task.id, "done", 0).expect_err("gate");
    assert!(matches!(err, Error::TestsRequired { .. }));
    assert_eq!(err.exit_code(), 3);
    assert!(matches!(
        store.create(NewTask {
            requires_test: true,
            column: Some("done".to_string()),
            ..NewTask::new("Straight to done")
        }),
        Err(Error::TestsRequired { .. })
    ));

    let running = store.set_test_running(&task.id)?;
    assert_eq!(running.test_status, TestStatus::Running);

    let passed = store.update_test_result(&task.id, true, "ok")?;
    assert_eq!(passed.column, "backlog");
    assert_eq!((passed.tests_passed, passed.tests_total), (1, 1));
    assert_eq!(passed.last_output, "ok");

    let moved = store.reorder(&task.id, "done", 0)?;
    assert_eq!(moved.column, "done");
    Ok(())
}

#[test]
fn passing_run_moves_task_to_last_column() -> Result<(), Box<dyn std::error::Error>> {
    let board = TestBoard::new()?;
    let store = board.open("ci")?;
    let task = store.create(NewTask {
        requires_test: true,
        ..NewTask::new("Ship")
    })?;
    let settings = Settings::default();
    let outcome = |function: &str, output: &str| {
        TestOutcome::from_output(
            TestRef::new("tests/ship.rs", function),
            output.to_string(),
            5,
            &settings,
        )
    };

    let failing = TestRunReport::from_results(vec![
        outcome("one", "test result: ok. 1 passed"),
        outcome("two", "test result: FAILED. 0 passed"),
    ]);
    let after_fail = store.update_test_results(&task.id, &failing)?;
    assert_eq!(after_fail.test_status, TestStatus::Failed);
    assert_eq!((after_fail.tests_passed, after_fail.tests_total), (1, 2));
    assert_eq!(after_fail.column, "backlog");
    assert!(after_fail.last_output.contains("== tests/ship.rs:two (FAIL, 5ms)"));

    let empty = TestRunReport::from_results(Vec::new());
    assert_eq!(store.update_test_results(&task.id, &empty)?.column, "backlog");

    let passing = TestRunReport::from_results(vec![outcome("one", "test result: ok. 1 passed")]);
    let done = store.update_test_results(&task.id, &passing)?;
    assert_eq!(done.test_status, TestStatus::Passed);
    assert_eq!(done.column, "done");
    Ok(())
}

#[test]
fn settings_round_trip_through_the_header() -> Result<(), Box<dyn std::error::Error>> {
    let board = TestBoard::new()?;
    {
        let store = board.open("alice")?;
        let mut settings = store.settings();
        settings.stale_threshold_days = Some(14);
        store.update_settings(settings)?;
        store.close()?;
    }
    assert!(board.read_tasks()?.contains("stale_threshold_days: 14"));

    let store = board.open("alice")?;
    assert_eq!(store.settings().stale_threshold_days(), 14);
    Ok(())
}

#[test]
fn stale_tasks_exclude_the_terminal_column() -> Result<(), Box<dyn std::error::Error>> {
    let board = TestBoard::new()?;
    board.write_file(
        "TASKS.md",
        "\
---
stale_threshold_days: 7
---

## Backlog

- [ ] Old idea
  - id: old00001
  - priority: low
  - created_at: 2020-01-01T00:00:00Z
  - updated_at: 2020-01-01T00:00:00Z

## Done

- [x] Old win
  - id: old00002
  - priority: low
  - created_at: 2020-01-01T00:00:00Z
  - updated_at: 2020-01-01T00:00:00Z
",
    )?;
    let store = board.open("alice")?;
    store.create(NewTask::new("Fresh"))?;

    let stale: Vec<String> = store.stale_tasks().into_iter().map(|task| task.id).collect();
    assert_eq!(stale, vec!["old00001"]);
    Ok(())
}

#[test]
fn mutations_reach_disk_after_flush() -> Result<(), Box<dyn std::error::Error>> {
    let board = TestBoard::new()?;
    let store = board.open("alice")?;
    for n in 0..20 {
        store.create(NewTask::new(format!("Task {n}")))?;
    }
    store.flush()?;
    let text = board.read_tasks()?;
    assert!(text.contains("- [ ] Task 0"));
    assert!(text.contains("- [ ] Task 19"));
    assert!(store.save_count() <= 22);
    assert!(store.last_save_error().is_none());
    Ok(())
}
