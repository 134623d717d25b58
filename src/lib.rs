//! mdtasks - a task board kept in one markdown file
//!
//! Tasks, columns and board settings are stored in a single human-editable
//! markdown document. The library loads that document, keeps it in memory
//! behind a [`store::TaskStore`], and writes it back through a coalescing
//! background saver.
//!
//! # Module Organization
//!
//! - `model`: tasks, columns and the in-memory document
//! - `codec`: markdown decoding (current and legacy dialects) and encoding
//! - `ordering`: positions within and across columns
//! - `settings`: header settings and test runner markers
//! - `store`: the thread-safe task store
//! - `persist`: coalesced background saves
//! - `blame`: task authorship from `git blame`
//! - `testrun`: test results reported by an external runner
//! - `watch`: reload on external edits
//! - `lock`: file locking and atomic writes
//! - `config`: `.mdtasks.toml` loading
//! - `actor`: actor identity resolution
//! - `cli` / `output`: the command-line interface

pub mod actor;
pub mod blame;
pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod lock;
pub mod model;
pub mod ordering;
pub mod output;
pub mod persist;
pub mod settings;
pub mod store;
pub mod testrun;
pub mod watch;

pub use error::{Error, Result};
pub use store::{NewTask, StoreOptions, TaskStore, TaskUpdate};
