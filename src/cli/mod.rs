//! Command-line interface for mdtasks
//!
//! This module defines the CLI structure using clap derive macros.
//! Each command group is implemented in its own submodule.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::actor;
use crate::config::Config;
use crate::error::Result;
use crate::output::OutputOptions;
use crate::store::TaskStore;

mod column;
mod init;
mod settings;
mod task;
mod watch;

/// mdtasks - a task board in one markdown file
///
/// Tasks, columns and board settings live in a single human-editable
/// markdown file that can be committed alongside the code it tracks.
#[derive(Parser, Debug)]
#[command(name = "mdtasks")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Task file (defaults to `file` from .mdtasks.toml, then TASKS.md)
    #[arg(long, global = true, env = "MDTASKS_FILE")]
    pub file: Option<PathBuf>,

    /// Actor recorded as created_by / updated_by
    #[arg(long, global = true)]
    pub actor: Option<String>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the task file and .mdtasks.toml if missing
    Init,

    /// List tasks by column
    List {
        /// Only tasks in this column (slug)
        #[arg(long)]
        column: Option<String>,

        /// Only tasks not updated within the stale threshold
        #[arg(long)]
        stale: bool,
    },

    /// Show one task
    Show {
        id: String,
    },

    /// Add a task
    Add {
        title: String,

        /// Acceptance criteria
        #[arg(long)]
        criteria: Option<String>,

        /// high, medium or low
        #[arg(short, long)]
        priority: Option<String>,

        /// Tag (repeatable, or comma separated)
        #[arg(short, long = "tag", value_delimiter = ',')]
        tags: Vec<String>,

        /// Column slug (defaults to the first column)
        #[arg(long)]
        column: Option<String>,

        /// Block moving to the last column until tests pass
        #[arg(long)]
        requires_test: bool,

        /// Test as <file>:<function> (repeatable)
        #[arg(long = "test")]
        tests: Vec<String>,
    },

    /// Edit task fields
    Edit {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        criteria: Option<String>,

        #[arg(short, long)]
        priority: Option<String>,

        /// Replace tags (comma separated, empty clears)
        #[arg(long)]
        tags: Option<String>,

        /// Move to the end of this column
        #[arg(long)]
        column: Option<String>,

        #[arg(long)]
        requires_test: Option<bool>,

        /// Replace tests with these <file>:<function> refs
        #[arg(long = "test")]
        tests: Vec<String>,

        /// Remove every test reference
        #[arg(long, conflicts_with = "tests")]
        clear_tests: bool,
    },

    /// Move a task to a column position
    Move {
        id: String,

        /// Target column slug
        column: String,

        /// Zero-based position (defaults to the end)
        #[arg(long)]
        position: Option<usize>,
    },

    /// Delete a task
    Rm {
        id: String,
    },

    /// Column management
    #[command(subcommand)]
    Column(ColumnCommands),

    /// Board settings stored in the file header
    #[command(subcommand)]
    Settings(SettingsCommands),

    /// Record test runs
    #[command(subcommand)]
    Test(TestCommands),

    /// Reload on external edits and report them until interrupted
    Watch,
}

/// Column subcommands
#[derive(Subcommand, Debug)]
pub enum ColumnCommands {
    /// List columns with task counts
    List,

    /// Append a column
    Add {
        name: String,
    },

    /// Rename a column
    Rename {
        slug: String,
        name: String,
    },

    /// Delete an empty, unprotected column
    Rm {
        slug: String,
    },

    /// Put the given columns first, in this order
    Reorder {
        #[arg(required = true)]
        slugs: Vec<String>,
    },
}

/// Settings subcommands
#[derive(Subcommand, Debug)]
pub enum SettingsCommands {
    /// Show effective settings
    Show,

    /// Set one setting
    Set {
        /// stale_threshold_days, test_runner.command, test_runner.pass_marker,
        /// test_runner.fail_marker or test_runner.no_tests_marker
        key: String,
        value: String,
    },
}

/// Test subcommands
#[derive(Subcommand, Debug)]
pub enum TestCommands {
    /// Mark a task's tests as running
    Running {
        id: String,
    },

    /// Record a test result
    Result {
        id: String,

        #[arg(long, conflicts_with_all = ["fail", "report"])]
        pass: bool,

        #[arg(long, conflicts_with = "report")]
        fail: bool,

        /// Captured output
        #[arg(long)]
        output: Option<String>,

        /// JSON run report with one result per test; a fully passing
        /// report moves the task to the last column
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let output = OutputOptions {
            json: self.json,
            quiet: self.quiet,
        };
        let target = Target {
            file: self.file,
            actor: self.actor,
        };

        match self.command {
            Commands::Init => init::run(target, output),
            Commands::List { column, stale } => {
                task::run_list(target, output, task::ListOptions { column, stale })
            }
            Commands::Show { id } => task::run_show(target, output, &id),
            Commands::Add {
                title,
                criteria,
                priority,
                tags,
                column,
                requires_test,
                tests,
            } => task::run_add(
                target,
                output,
                task::AddOptions {
                    title,
                    criteria,
                    priority,
                    tags,
                    column,
                    requires_test,
                    tests,
                },
            ),
            Commands::Edit {
                id,
                title,
                criteria,
                priority,
                tags,
                column,
                requires_test,
                tests,
                clear_tests,
            } => task::run_edit(
                target,
                output,
                task::EditOptions {
                    id,
                    title,
                    criteria,
                    priority,
                    tags,
                    column,
                    requires_test,
                    tests,
                    clear_tests,
                },
            ),
            Commands::Move {
                id,
                column,
                position,
            } => task::run_move(target, output, &id, &column, position),
            Commands::Rm { id } => task::run_rm(target, output, &id),
            Commands::Column(cmd) => match cmd {
                ColumnCommands::List => column::run_list(target, output),
                ColumnCommands::Add { name } => column::run_add(target, output, &name),
                ColumnCommands::Rename { slug, name } => {
                    column::run_rename(target, output, &slug, &name)
                }
                ColumnCommands::Rm { slug } => column::run_rm(target, output, &slug),
                ColumnCommands::Reorder { slugs } => column::run_reorder(target, output, &slugs),
            },
            Commands::Settings(cmd) => match cmd {
                SettingsCommands::Show => settings::run_show(target, output),
                SettingsCommands::Set { key, value } => {
                    settings::run_set(target, output, &key, &value)
                }
            },
            Commands::Test(cmd) => match cmd {
                TestCommands::Running { id } => test::run_running(target, output, &id),
                TestCommands::Result {
                    id,
                    pass,
                    fail,
                    output: captured,
                    report,
                } => test::run_result(
                    target,
                    output,
                    test::ResultOptions {
                        id,
                        pass,
                        fail,
                        output: captured,
                        report,
                    },
                ),
            },
            Commands::Watch => watch::run(target, output),
        }
    }
}

/// Which file to open and who is acting on it.
#[derive(Debug, Clone)]
pub(crate) struct Target {
    pub file: Option<PathBuf>,
    pub actor: Option<String>,
}

pub(crate) struct Context {
    pub store: TaskStore,
    pub config: Config,
}

impl Target {
    /// Load config from the working directory and open the task file.
    pub fn open(self) -> Result<Context> {
        let cwd = std::env::current_dir()?;
        let config = Config::load_from_dir(&cwd)?;
        let path = self.file.unwrap_or_else(|| config.task_file(&cwd));
        let actor = actor::resolve_actor(self.actor.as_deref(), &config);
        let store = TaskStore::open(path, config.store_options(actor))?;
        Ok(Context { store, config })
    }
}

impl Context {
    /// Write everything out; a failed final save fails the command.
    pub fn finish(self) -> Result<()> {
        self.store.close()
    }
}
