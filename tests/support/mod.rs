#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use git2::{IndexAddOption, Oid, Repository, Signature};
use mdtasks::{StoreOptions, TaskStore};
use tempfile::TempDir;

/// Scratch directory holding a task board, optionally under git.
pub struct TestBoard {
    dir: TempDir,
    repo: Option<Repository>,
}

impl TestBoard {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
            repo: None,
        })
    }

    /// Board inside a fresh git repository with a test identity.
    pub fn with_git() -> Result<Self, Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let repo = Repository::init(dir.path())?;
        let mut cfg = repo.config()?;
        cfg.set_str("user.name", "mdtasks-test")?;
        cfg.set_str("user.email", "mdtasks-test@example.com")?;
        Ok(Self {
            dir,
            repo: Some(repo),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn task_file(&self) -> PathBuf {
        self.dir.path().join("TASKS.md")
    }

    pub fn write_file(&self, rel_path: &str, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn read_tasks(&self) -> std::io::Result<String> {
        fs::read_to_string(self.task_file())
    }

    pub fn open(&self, actor: &str) -> mdtasks::Result<TaskStore> {
        TaskStore::open(
            self.task_file(),
            StoreOptions {
                actor: actor.to_string(),
                ..StoreOptions::default()
            },
        )
    }

    /// Commit every file as `author`.
    pub fn commit_all(&self, author: &str, message: &str) -> Result<Oid, git2::Error> {
        let repo = self
            .repo
            .as_ref()
            .ok_or_else(|| git2::Error::from_str("board has no repository"))?;
        let mut index = repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.write()?;

        let tree_id = index.write_tree()?;
        let tree = repo.find_tree(tree_id)?;
        let sig = Signature::now(author, &format!("{author}@example.com"))?;

        let parent = repo
            .head()
            .ok()
            .and_then(|head| head.target())
            .and_then(|oid| repo.find_commit(oid).ok());

        match parent {
            Some(parent) => repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent]),
            None => repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[]),
        }
    }
}

pub fn mdtasks_cmd(board: &TestBoard) -> Command {
    let mut cmd = Command::cargo_bin("mdtasks").expect("mdtasks binary");
    cmd.current_dir(board.path())
        .env_remove("MDTASKS_ACTOR")
        .env_remove("MDTASKS_FILE")
        .env_remove("RUST_LOG");
    cmd
}

pub fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}
