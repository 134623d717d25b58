mod support;

use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;

use support::TestBoard;

fn mdtasks(board: &TestBoard) -> Command {
    support::mdtasks_cmd(board)
}

fn json_data(board: &TestBoard, args: &[&str]) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let output = mdtasks(board).arg("--json").args(args).output()?;
    assert!(output.status.success(), "{args:?} failed: {output:?}");
    let value: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(value["schema_version"], "mdtasks.v1");
    assert_eq!(value["status"], "success");
    Ok(value["data"].clone())
}

fn add(board: &TestBoard, args: &[&str]) -> Result<String, Box<dyn std::error::Error>> {
    let mut full = vec!["add"];
    full.extend_from_slice(args);
    let data = json_data(board, &full)?;
    Ok(data["id"].as_str().unwrap_or_default().to_string())
}

#[test]
fn help_lists_commands() {
    let board = TestBoard::new().expect("board");
    mdtasks(&board)
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("init"))
        .stdout(contains("column"))
        .stdout(contains("watch"));
}

#[test]
fn init_creates_config_board_and_gitignore() -> Result<(), Box<dyn std::error::Error>> {
    let board = TestBoard::new()?;

    mdtasks(&board)
        .arg("init")
        .assert()
        .success()
        .stdout(contains("initialized board"))
        .stdout(contains(".mdtasks.toml"));

    assert!(board.path().join(".mdtasks.toml").is_file());
    assert!(board.read_tasks()?.contains("## Backlog"));
    let gitignore = std::fs::read_to_string(board.path().join(".gitignore"))?;
    assert!(gitignore.contains("TASKS.md.lock"));

    mdtasks(&board)
        .arg("init")
        .assert()
        .success()
        .stdout(contains("nothing to do"));
    Ok(())
}

#[test]
fn add_list_show_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let board = TestBoard::new()?;
    let id = add(
        &board,
        &[
            "Write parser",
            "--priority",
            "high",
            "--tag",
            "codec,core",
            "--criteria",
            "Parses every dialect",
            "--actor",
            "alice",
        ],
    )?;
    assert_eq!(id.len(), 8);

    let list = json_data(&board, &["list"])?;
    assert_eq!(list["total"], 1);
    assert_eq!(list["tasks"][0]["title"], "Write parser");
    assert_eq!(list["tasks"][0]["tags"], serde_json::json!(["codec", "core"]));

    let show = json_data(&board, &["show", &id])?;
    assert_eq!(show["priority"], "high");
    assert_eq!(show["created_by"], "alice");

    mdtasks(&board)
        .args(["list"])
        .assert()
        .success()
        .stdout(contains(format!("[backlog][high] {id} Write parser #codec #core")));
    Ok(())
}

#[test]
fn actor_comes_from_env_then_config() -> Result<(), Box<dyn std::error::Error>> {
    let board = TestBoard::new()?;
    board.write_file(".mdtasks.toml", "[actor]\ndefault = \"config-actor\"\n")?;

    let from_config = json_data(&board, &["add", "One"])?;
    assert_eq!(from_config["created_by"], "config-actor");

    let output = mdtasks(&board)
        .env("MDTASKS_ACTOR", "env-actor")
        .args(["--json", "add", "Two"])
        .output()?;
    let value: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(value["data"]["created_by"], "env-actor");
    Ok(())
}

#[test]
fn edit_and_move_change_the_file() -> Result<(), Box<dyn std::error::Error>> {
    let board = TestBoard::new()?;
    let first = add(&board, &["First"])?;
    let second = add(&board, &["Second"])?;

    let edited = json_data(&board, &["edit", &first, "--title", "First, renamed", "--tags", ""])?;
    assert_eq!(edited["title"], "First, renamed");

    let moved = json_data(&board, &["move", &second, "in_progress"])?;
    assert_eq!(moved["from"], "backlog");
    assert_eq!(moved["to"], "in_progress");
    assert_eq!(moved["position"], 0);

    let text = board.read_tasks()?;
    let in_progress = text.find("## In Progress").expect("column");
    let second_at = text.find("- [ ] Second").expect("task");
    assert!(second_at > in_progress);
    assert!(text.contains("- [ ] First, renamed"));

    mdtasks(&board)
        .args(["edit", &first])
        .assert()
        .failure()
        .code(2)
        .stderr(contains("at least one field"));
    Ok(())
}

#[test]
fn missing_task_reports_not_found() -> Result<(), Box<dyn std::error::Error>> {
    let board = TestBoard::new()?;
    mdtasks(&board)
        .args(["show", "nope1234"])
        .assert()
        .failure()
        .code(2)
        .stderr(contains("Task not found: nope1234"))
        .stderr(contains("hint: mdtasks list"));

    let output = mdtasks(&board).args(["--json", "rm", "nope1234"]).output()?;
    assert_eq!(output.status.code(), Some(2));
    let value: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(value["status"], "error");
    assert_eq!(value["command"], "rm");
    assert_eq!(value["error"]["kind"], "not_found");
    Ok(())
}

#[test]
fn test_gate_blocks_done_until_passed() -> Result<(), Box<dyn std::error::Error>> {
    let board = TestBoard::new()?;
    let id = add(&board, &["Gated", "--requires-test", "--test", "tests/a.rs:works"])?;

    mdtasks(&board)
        .args(["move", &id, "done"])
        .assert()
        .failure()
        .code(3)
        .stderr(contains("requires passing tests"))
        .stderr(contains(format!("mdtasks test result {id} --pass")));

    json_data(&board, &["test", "running", &id])?;
    let result = json_data(&board, &["test", "result", &id, "--pass", "--output", "ok"])?;
    assert_eq!(result["test_status"], "passed");
    assert_eq!(result["column"], "backlog");

    mdtasks(&board).args(["move", &id, "done"]).assert().success();
    assert!(board.read_tasks()?.contains("- [x] Gated"));
    Ok(())
}

#[test]
fn report_file_advances_task() -> Result<(), Box<dyn std::error::Error>> {
    let board = TestBoard::new()?;
    let id = add(&board, &["Reported", "--requires-test"])?;
    board.write_file(
        "run.json",
        r#"{"passed": true, "results": [
            {"test": {"file": "tests/a.rs", "function": "one"}, "passed": true, "output": "test result: ok", "elapsed_ms": 12},
            {"test": {"file": "tests/a.rs", "function": "two"}, "passed": true, "elapsed_ms": 3}
        ]}"#,
    )?;

    mdtasks(&board)
        .args(["test", "result", &id, "--report", "run.json"])
        .assert()
        .success()
        .stdout(contains("Moved: backlog -> done"))
        .stdout(contains("PASS tests/a.rs:one (12ms)"));

    let show = json_data(&board, &["show", &id])?;
    assert_eq!(show["tests_passed"], 2);
    assert_eq!(show["tests_total"], 2);

    mdtasks(&board)
        .args(["test", "result", &id])
        .assert()
        .failure()
        .code(2);
    Ok(())
}

#[test]
fn column_commands() -> Result<(), Box<dyn std::error::Error>> {
    let board = TestBoard::new()?;
    json_data(&board, &["column", "add", "Code Review"])?;
    let renamed = json_data(&board, &["column", "rename", "code_review", "Review"])?;
    assert_eq!(renamed["slug"], "review");

    let reordered = json_data(&board, &["column", "reorder", "review"])?;
    assert_eq!(reordered[0]["slug"], "review");

    let listed = json_data(&board, &["column", "list"])?;
    assert_eq!(listed["columns"][0]["slug"], "review");
    assert_eq!(listed["columns"][1]["protected"], true);
    assert_eq!(listed["columns"][0]["tasks"], 0);

    mdtasks(&board)
        .args(["column", "rm", "backlog"])
        .assert()
        .failure()
        .code(3)
        .stderr(contains("protected"));

    mdtasks(&board).args(["column", "rm", "review"]).assert().success();
    assert!(!board.read_tasks()?.contains("## Review"));
    Ok(())
}

#[test]
fn settings_show_and_set() -> Result<(), Box<dyn std::error::Error>> {
    let board = TestBoard::new()?;
    let shown = json_data(&board, &["settings", "show"])?;
    assert_eq!(shown["stale_threshold_days"], 7);

    json_data(&board, &["settings", "set", "test_runner.command", "make test-{testFunc}"])?;
    json_data(&board, &["settings", "set", "stale_threshold_days", "3"])?;
    let text = board.read_tasks()?;
    assert!(text.contains("stale_threshold_days: 3"));
    assert!(text.contains("make test-{testFunc}"));

    mdtasks(&board)
        .args(["settings", "set", "colour", "blue"])
        .assert()
        .failure()
        .code(2)
        .stderr(contains("unknown setting"));
    Ok(())
}

#[test]
fn file_flag_and_config_choose_the_board() -> Result<(), Box<dyn std::error::Error>> {
    let board = TestBoard::new()?;
    board.write_file(".mdtasks.toml", "file = \"docs/BOARD.md\"\n")?;
    add(&board, &["In docs"])?;
    assert!(board.path().join("docs/BOARD.md").is_file());
    assert!(!board.task_file().exists());

    add(&board, &["--file", "OTHER.md", "Elsewhere"])?;
    let other = std::fs::read_to_string(board.path().join("OTHER.md"))?;
    assert!(other.contains("- [ ] Elsewhere"));
    Ok(())
}

#[test]
fn invalid_config_is_a_user_error() -> Result<(), Box<dyn std::error::Error>> {
    let board = TestBoard::new()?;
    board.write_file(".mdtasks.toml", "[watch]\ndebounce_ms = 999999\n")?;
    mdtasks(&board)
        .arg("list")
        .assert()
        .failure()
        .code(2)
        .stderr(contains("Invalid configuration"));
    Ok(())
}

#[test]
fn quiet_suppresses_human_output() -> Result<(), Box<dyn std::error::Error>> {
    let board = TestBoard::new()?;
    mdtasks(&board)
        .args(["--quiet", "add", "Silent"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
    assert!(board.read_tasks()?.contains("- [ ] Silent"));
    Ok(())
}
