//! mdtasks init command implementation
//!
//! Creates `.mdtasks.toml`, the task file with its default columns, and a
//! `.gitignore` entry for the task file's lock sidecar.

use std::path::{Path, PathBuf};

use crate::cli::Target;
use crate::config::{Config, CONFIG_FILENAME};
use crate::error::{Error, Result};
use crate::lock::lock_path_for;
use crate::output::{emit_success, HumanOutput, OutputOptions};

#[derive(serde::Serialize)]
struct InitReport {
    file: PathBuf,
    columns: usize,
    created: InitCreated,
    updated: InitUpdated,
}

#[derive(serde::Serialize)]
struct InitCreated {
    config: bool,
    file: bool,
}

#[derive(serde::Serialize)]
struct InitUpdated {
    gitignore: bool,
}

pub(crate) fn run(target: Target, output: OutputOptions) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let created_config = ensure_config(&cwd)?;

    let config = Config::load_from_dir(&cwd)?;
    let path = target
        .file
        .clone()
        .unwrap_or_else(|| config.task_file(&cwd));
    let created_file = !path.exists();

    let ctx = target.open()?;
    let columns = ctx.store.columns().len();
    let file = ctx.store.path().to_path_buf();
    ctx.finish()?;

    let updated_gitignore = ensure_gitignore(&cwd, &file)?;

    let report = InitReport {
        file: file.clone(),
        columns,
        created: InitCreated {
            config: created_config,
            file: created_file,
        },
        updated: InitUpdated {
            gitignore: updated_gitignore,
        },
    };

    let mut created_items = Vec::new();
    if created_config {
        created_items.push(CONFIG_FILENAME.to_string());
    }
    if created_file {
        created_items.push(file.display().to_string());
    }

    let header = if created_items.is_empty() && !updated_gitignore {
        "mdtasks init: nothing to do".to_string()
    } else {
        "mdtasks init: initialized board".to_string()
    };

    let mut human = HumanOutput::new(header);
    human.push_summary("file", file.display().to_string());
    human.push_summary("columns", columns.to_string());
    human.push_summary(
        "created",
        if created_items.is_empty() {
            "none".to_string()
        } else {
            created_items.join(", ")
        },
    );
    human.push_summary(
        "updated",
        if updated_gitignore { ".gitignore" } else { "none" },
    );
    human.push_next_step("mdtasks add \"<title>\"");

    emit_success(output, "init", &report, Some(&human))
}

fn ensure_config(dir: &Path) -> Result<bool> {
    let config_path = dir.join(CONFIG_FILENAME);
    if config_path.exists() {
        if !config_path.is_file() {
            return Err(Error::OperationFailed(format!(
                "{CONFIG_FILENAME} exists but is not a file: {}",
                config_path.display()
            )));
        }
        return Ok(false);
    }

    Config::default().save(&config_path)?;
    Ok(true)
}

/// Ignore the lock sidecar next to `task_file`, relative to `dir`.
fn ensure_gitignore(dir: &Path, task_file: &Path) -> Result<bool> {
    let lock_path = lock_path_for(task_file);
    let Ok(relative) = lock_path.strip_prefix(dir) else {
        return Ok(false);
    };
    let entry = relative.to_string_lossy().replace('\\', "/");

    let path = dir.join(".gitignore");
    if path.exists() && !path.is_file() {
        return Err(Error::OperationFailed(format!(
            ".gitignore exists but is not a file: {}",
            path.display()
        )));
    }

    let existing = if path.exists() {
        std::fs::read_to_string(&path)?
    } else {
        String::new()
    };

    if has_ignore_entry(&existing, &entry) {
        return Ok(false);
    }

    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(&entry);
    updated.push('\n');
    std::fs::write(&path, updated)?;
    Ok(true)
}

fn has_ignore_entry(contents: &str, entry: &str) -> bool {
    contents.lines().any(|line| {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return false;
        }
        trimmed == entry
            || trimmed.trim_start_matches('/') == entry
            || trimmed == "*.lock"
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignore_entry_detection() {
        assert!(has_ignore_entry("target/\nTASKS.md.lock\n", "TASKS.md.lock"));
        assert!(has_ignore_entry("/TASKS.md.lock\n", "TASKS.md.lock"));
        assert!(has_ignore_entry("*.lock\n", "docs/BOARD.md.lock"));
        assert!(!has_ignore_entry("# TASKS.md.lock\n", "TASKS.md.lock"));
    }

    #[test]
    fn gitignore_gains_lock_entry_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("TASKS.md");
        std::fs::write(dir.path().join(".gitignore"), "target/").expect("write");
        assert!(ensure_gitignore(dir.path(), &file).expect("first"));
        assert!(!ensure_gitignore(dir.path(), &file).expect("second"));
        let text = std::fs::read_to_string(dir.path().join(".gitignore")).expect("read");
        assert_eq!(text, "target/\nTASKS.md.lock\n");
    }
}
