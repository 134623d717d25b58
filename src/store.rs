//! The task store.
//!
//! One [`Document`] lives behind a readers-writer lock. Mutations take the
//! exclusive lock only for the in-memory change, then post a non-blocking save
//! request to the [`SaveWorker`]. Saves encode under the shared lock and write
//! the file after releasing it, so no lock on the board is ever held across
//! file I/O.
//!
//! Persistence failures never fail a mutation. They are logged and kept for
//! [`TaskStore::last_save_error`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::blame::{AuthorLookup, NoAuthors};
use crate::codec::{self, Diagnostic};
use crate::error::{Error, Result};
use crate::lock::{read_locked, write_atomic_locked, DEFAULT_LOCK_TIMEOUT_MS};
use crate::model::{Column, Document, Priority, Task, TestRef, TestStatus};
use crate::persist::{SaveRequest, SaveWorker};
use crate::settings::Settings;
use crate::testrun::TestRunReport;

/// How a store is opened
#[derive(Clone)]
pub struct StoreOptions {
    /// Recorded as `created_by` / `updated_by` on mutations
    pub actor: String,
    pub authors: Arc<dyn AuthorLookup>,
    pub lock_timeout_ms: u64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            actor: "unknown".to_string(),
            authors: Arc::new(NoAuthors),
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }
}

/// Fields for a new task. `column` defaults to the first column.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub criteria: String,
    pub priority: Option<Priority>,
    pub tags: Vec<String>,
    pub column: Option<String>,
    pub requires_test: bool,
    pub tests: Vec<TestRef>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Partial task update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub criteria: Option<String>,
    pub priority: Option<Priority>,
    pub tags: Option<Vec<String>>,
    /// Moving columns appends the task to the end of the new column.
    pub column: Option<String>,
    pub requires_test: Option<bool>,
    pub tests: Option<Vec<TestRef>>,
}

/// Summary of one load.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub tasks: usize,
    pub columns: usize,
    /// The file was rewritten right after decoding
    pub normalized: bool,
    pub diagnostics: Vec<Diagnostic>,
}

/// A background save that did not reach the disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistenceFailure {
    pub at: DateTime<Utc>,
    pub message: String,
}

struct Shared {
    path: PathBuf,
    doc: RwLock<Document>,
    closed: AtomicBool,
    /// Set by mutations, cleared when a save takes its snapshot.
    dirty: AtomicBool,
    /// Serializes saves so an older snapshot never lands after a newer one.
    write_gate: Mutex<()>,
    last_error: Mutex<Option<PersistenceFailure>>,
    /// File contents the store last read or wrote.
    last_seen: Mutex<Option<String>>,
    saves: AtomicU64,
    lock_timeout_ms: u64,
}

impl Shared {
    fn read(&self) -> RwLockReadGuard<'_, Document> {
        self.doc.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Document> {
        self.doc.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn remember(&self, text: String) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Some(text);
    }

    fn save(&self) -> Result<()> {
        let _gate = self.write_gate.lock().unwrap_or_else(PoisonError::into_inner);
        self.dirty.store(false, Ordering::Release);
        let encoded = codec::encode(&self.read());
        let written = encoded.and_then(|text| {
            write_atomic_locked(&self.path, text.as_bytes(), self.lock_timeout_ms)?;
            Ok(text)
        });
        let text = match written {
            Ok(text) => text,
            Err(err) => {
                self.dirty.store(true, Ordering::Release);
                return Err(err);
            }
        };
        let count = self.saves.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(path = %self.path.display(), bytes = text.len(), count, "saved task file");
        self.remember(text);
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    fn save_and_record(&self) -> Result<()> {
        let result = self.save();
        if let Err(err) = &result {
            warn!(path = %self.path.display(), error = %err, "failed to save task file");
            *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) =
                Some(PersistenceFailure {
                    at: now(),
                    message: err.to_string(),
                });
        }
        result
    }
}

fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// A task board persisted to one markdown file.
pub struct TaskStore {
    shared: Arc<Shared>,
    worker: SaveWorker,
    actor: String,
    authors: Arc<dyn AuthorLookup>,
}

impl TaskStore {
    /// Open (or create) the board at `path` and load it.
    pub fn open(path: impl Into<PathBuf>, options: StoreOptions) -> Result<Self> {
        let shared = Arc::new(Shared {
            path: path.into(),
            doc: RwLock::new(Document::with_default_columns()),
            closed: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
            write_gate: Mutex::new(()),
            last_error: Mutex::new(None),
            last_seen: Mutex::new(None),
            saves: AtomicU64::new(0),
            lock_timeout_ms: options.lock_timeout_ms,
        });

        let worker_shared = Arc::clone(&shared);
        let worker = SaveWorker::spawn(move || {
            let _ = worker_shared.save_and_record();
        })?;

        let store = Self {
            shared,
            worker,
            actor: options.actor,
            authors: options.authors,
        };
        let report = match store.load() {
            Ok(report) => report,
            Err(err) => {
                // Never let drop overwrite a file that failed to load.
                store.shared.closed.store(true, Ordering::Release);
                store.worker.shutdown();
                return Err(err);
            }
        };
        debug!(
            path = %store.shared.path.display(),
            tasks = report.tasks,
            columns = report.columns,
            "opened task store"
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// Rebuild the board from disk. A missing file loads as an empty board.
    /// Any normalization is written back before returning.
    pub fn load(&self) -> Result<LoadReport> {
        let text = read_locked(&self.shared.path, self.shared.lock_timeout_ms)?.unwrap_or_default();
        self.load_text(text)
    }

    /// Reload only when the file differs from what this store last read or
    /// wrote. A deleted file is ignored.
    pub fn reload_if_changed(&self) -> Result<Option<LoadReport>> {
        let Some(text) = read_locked(&self.shared.path, self.shared.lock_timeout_ms)? else {
            return Ok(None);
        };
        let unchanged = self
            .shared
            .last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            == Some(text.as_str());
        if unchanged {
            debug!(path = %self.shared.path.display(), "task file unchanged, skipping reload");
            return Ok(None);
        }
        self.load_text(text).map(Some)
    }

    fn load_text(&self, text: String) -> Result<LoadReport> {
        let decoded = codec::decode(&text, now())?;
        for diagnostic in &decoded.diagnostics {
            warn!(
                path = %self.shared.path.display(),
                line = diagnostic.line,
                "{}",
                diagnostic.message
            );
        }

        let normalization = decoded.normalization;
        let report = LoadReport {
            tasks: decoded.document.tasks.len(),
            columns: decoded.document.columns.len(),
            normalized: normalization.any(),
            diagnostics: decoded.diagnostics,
        };
        *self.shared.write() = decoded.document;

        if report.normalized {
            info!(
                path = %self.shared.path.display(),
                added_columns = normalization.added_columns,
                backfilled_tasks = normalization.backfilled_tasks,
                settings_defaults = normalization.settings_defaults,
                "normalized task file"
            );
            let _ = self.shared.save_and_record();
        } else {
            self.shared.remember(text);
        }
        Ok(report)
    }

    // ---- reads ----

    /// Every task, by column then position. Refreshes authorship first.
    pub fn get_all(&self) -> Vec<Task> {
        self.refresh_authors();
        self.shared
            .read()
            .sorted_tasks()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Result<Task> {
        self.shared.read().task(id).cloned()
    }

    pub fn tasks_in(&self, column: &str) -> Result<Vec<Task>> {
        let doc = self.shared.read();
        doc.require_column(column)?;
        Ok(doc.tasks_in(column).into_iter().cloned().collect())
    }

    pub fn columns(&self) -> Vec<Column> {
        self.shared
            .read()
            .sorted_columns()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn settings(&self) -> Settings {
        self.shared.read().settings.clone()
    }

    /// Tasks not updated within the stale threshold, terminal column excluded.
    pub fn stale_tasks(&self) -> Vec<Task> {
        self.shared
            .read()
            .stale_tasks(Utc::now())
            .into_iter()
            .cloned()
            .collect()
    }

    fn refresh_authors(&self) {
        let Some(authors) = self.authors.authors(&self.shared.path) else {
            return;
        };
        if authors.is_empty() {
            return;
        }
        let applied = self.shared.write().apply_authors(&authors);
        debug!(applied, "applied blame authors");
    }

    // ---- task mutations ----

    pub fn create(&self, new: NewTask) -> Result<Task> {
        let title = require_title(&new.title)?;
        let task = self.mutate(|doc, now| {
            let column = match &new.column {
                Some(slug) => doc.require_column(slug)?.slug.clone(),
                None => doc
                    .first_column()
                    .map(|column| column.slug.clone())
                    .ok_or_else(|| Error::OperationFailed("board has no columns".to_string()))?,
            };
            let id = doc.generate_task_id();
            check_test_gate(doc, &id, &column, new.requires_test, TestStatus::Pending)?;

            let mut task = Task::new(&id, title, &column);
            task.criteria = new.criteria.trim().to_string();
            task.priority = new.priority.unwrap_or_default();
            task.tags = clean_tags(new.tags);
            task.requires_test = new.requires_test;
            task.tests = new.tests;
            task.created_at = Some(now);
            task.created_by = self.actor.clone();
            task.touch(&self.actor, now);

            doc.tasks.insert(id.clone(), task);
            doc.append_task(&id, &column)?;
            doc.task(&id).cloned()
        })?;
        debug!(id = %task.id, column = %task.column, "created task");
        Ok(task)
    }

    pub fn update(&self, id: &str, update: TaskUpdate) -> Result<Task> {
        let title = update.title.as_deref().map(require_title).transpose()?;
        self.mutate(|doc, now| {
            let current = doc.task(id)?;
            let source = current.column.clone();
            let requires_test = update.requires_test.unwrap_or(current.requires_test);
            let status = current.test_status;
            let target = match &update.column {
                Some(slug) => doc.require_column(slug)?.slug.clone(),
                None => source.clone(),
            };
            if target != source {
                check_test_gate(doc, id, &target, requires_test, status)?;
            }

            let task = doc.task_mut(id)?;
            if let Some(title) = title {
                task.title = title;
            }
            if let Some(criteria) = update.criteria {
                task.criteria = criteria.trim().to_string();
            }
            if let Some(priority) = update.priority {
                task.priority = priority;
            }
            if let Some(tags) = update.tags {
                task.tags = clean_tags(tags);
            }
            if let Some(tests) = update.tests {
                task.tests = tests;
            }
            task.requires_test = requires_test;
            task.touch(&self.actor, now);

            if target != source {
                doc.append_task(id, &target)?;
            }
            doc.task(id).cloned()
        })
    }

    pub fn delete(&self, id: &str) -> Result<Task> {
        self.mutate(|doc, _| {
            let task = doc
                .tasks
                .remove(id)
                .ok_or_else(|| Error::TaskNotFound(id.to_string()))?;
            doc.renumber_column(&task.column);
            Ok(task)
        })
    }

    /// Move a task to `position` within `column`; see [`Document::move_task`].
    pub fn reorder(&self, id: &str, column: &str, position: usize) -> Result<Task> {
        self.mutate(|doc, now| {
            let current = doc.task(id)?;
            let (source, requires_test, status) =
                (current.column.clone(), current.requires_test, current.test_status);
            let target = doc.require_column(column)?.slug.clone();
            if target != source {
                check_test_gate(doc, id, &target, requires_test, status)?;
            }
            doc.move_task(id, &target, position)?;
            let task = doc.task_mut(id)?;
            task.touch(&self.actor, now);
            Ok(task.clone())
        })
    }

    // ---- column mutations ----

    /// Append a column after every existing one.
    pub fn create_column(&self, name: &str) -> Result<Column> {
        let name = require_column_name(name)?;
        self.mutate(|doc, _| {
            let column = Column::new(name, doc.next_column_order());
            if doc.column(&column.slug).is_some() {
                return Err(Error::ColumnConflict(format!(
                    "column '{}' already exists",
                    column.slug
                )));
            }
            doc.columns.push(column.clone());
            Ok(column)
        })
    }

    /// Rename a column. When the derived slug changes, its tasks follow.
    pub fn update_column(&self, slug: &str, name: &str) -> Result<Column> {
        let name = require_column_name(name)?;
        self.mutate(|doc, _| {
            let current = doc.require_column(slug)?.clone();
            let renamed = Column::new(name, current.order);
            if renamed.slug != current.slug {
                if current.is_protected() {
                    return Err(Error::ColumnConflict(format!(
                        "protected column '{}' cannot change its slug",
                        current.slug
                    )));
                }
                if doc.column(&renamed.slug).is_some() {
                    return Err(Error::ColumnConflict(format!(
                        "column '{}' already exists",
                        renamed.slug
                    )));
                }
                for task in doc
                    .tasks
                    .values_mut()
                    .filter(|task| task.column == current.slug)
                {
                    task.column = renamed.slug.clone();
                }
            }
            let column = doc
                .column_mut(&current.slug)
                .ok_or_else(|| Error::ColumnNotFound(current.slug.clone()))?;
            *column = renamed;
            Ok(column.clone())
        })
    }

    /// Delete an empty, unprotected column that is not the last one left.
    pub fn delete_column(&self, slug: &str) -> Result<Column> {
        self.mutate(|doc, _| {
            let column = doc.require_column(slug)?.clone();
            if column.is_protected() {
                return Err(Error::ColumnConflict(format!(
                    "column '{slug}' is protected"
                )));
            }
            if doc.columns.len() <= 1 {
                return Err(Error::ColumnConflict(
                    "cannot delete the last column".to_string(),
                ));
            }
            let count = doc.count_in(slug);
            if count > 0 {
                return Err(Error::ColumnConflict(format!(
                    "column '{slug}' still holds {count} task(s)"
                )));
            }
            doc.columns.retain(|existing| existing.slug != slug);
            Ok(column)
        })
    }

    pub fn reorder_columns(&self, slugs: &[String]) -> Result<Vec<Column>> {
        self.mutate(|doc, _| {
            doc.reorder_columns(slugs)?;
            Ok(doc.sorted_columns().into_iter().cloned().collect())
        })
    }

    // ---- test lifecycle ----

    pub fn set_test_running(&self, id: &str) -> Result<Task> {
        self.mutate(|doc, now| {
            let task = doc.task_mut(id)?;
            task.test_status = TestStatus::Running;
            task.touch(&self.actor, now);
            Ok(task.clone())
        })
    }

    /// Record one result. The task stays in its column.
    pub fn update_test_result(&self, id: &str, passed: bool, output: &str) -> Result<Task> {
        self.mutate(|doc, now| {
            let task = doc.task_mut(id)?;
            task.test_status = if passed {
                TestStatus::Passed
            } else {
                TestStatus::Failed
            };
            task.tests_passed = u32::from(passed);
            task.tests_total = 1;
            task.last_output = output.to_string();
            task.touch(&self.actor, now);
            Ok(task.clone())
        })
    }

    /// Record a full run. A successful, non-empty run moves the task to the
    /// end of the terminal column.
    pub fn update_test_results(&self, id: &str, report: &TestRunReport) -> Result<Task> {
        let succeeded = report.succeeded();
        let task = self.mutate(|doc, now| {
            let terminal = doc.terminal_column().map(|column| column.slug.clone());
            let task = doc.task_mut(id)?;
            task.test_status = if succeeded {
                TestStatus::Passed
            } else {
                TestStatus::Failed
            };
            task.tests_passed = report.passed_count();
            task.tests_total = report.total();
            task.last_output = report.combined_output();
            task.touch(&self.actor, now);
            let column = task.column.clone();

            if let Some(terminal) = terminal.filter(|terminal| succeeded && *terminal != column) {
                doc.append_task(id, &terminal)?;
            }
            doc.task(id).cloned()
        })?;
        debug!(
            id = %task.id,
            passed = task.tests_passed,
            total = task.tests_total,
            column = %task.column,
            "recorded test run"
        );
        Ok(task)
    }

    pub fn update_settings(&self, settings: Settings) -> Result<Settings> {
        self.mutate(|doc, _| {
            doc.settings = settings;
            Ok(doc.settings.clone())
        })
    }

    // ---- persistence ----

    /// Most recent failed save, cleared by the next successful one.
    pub fn last_save_error(&self) -> Option<PersistenceFailure> {
        self.shared
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Save synchronously.
    pub fn flush(&self) -> Result<()> {
        self.shared.save_and_record()
    }

    /// Number of completed saves since open.
    pub fn save_count(&self) -> u64 {
        self.shared.saves.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Stop the save worker and write any unsaved changes. Later mutations
    /// fail with [`Error::StoreClosed`]; reads keep working.
    pub fn close(&self) -> Result<()> {
        {
            let _doc = self.shared.write();
            if self.shared.closed.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
        }
        self.worker.shutdown();
        if self.shared.dirty.load(Ordering::Acquire) {
            return self.shared.save_and_record();
        }
        Ok(())
    }

    fn mutate<T>(&self, op: impl FnOnce(&mut Document, DateTime<Utc>) -> Result<T>) -> Result<T> {
        let result = {
            let mut doc = self.shared.write();
            if self.shared.closed.load(Ordering::Acquire) {
                return Err(Error::StoreClosed);
            }
            let result = op(&mut doc, now())?;
            self.shared.dirty.store(true, Ordering::Release);
            result
        };
        if self.worker.request() == SaveRequest::Coalesced {
            debug!("save already pending, request coalesced");
        }
        Ok(result)
    }
}

impl Drop for TaskStore {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "final save on drop failed");
        }
    }
}

fn require_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(Error::InvalidArgument(
            "task title must not be empty".to_string(),
        ));
    }
    Ok(title.to_string())
}

fn require_column_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidArgument(
            "column name must not be empty".to_string(),
        ));
    }
    Ok(name)
}

/// Tags are stored comma separated, so a comma inside one splits it.
fn clean_tags(tags: Vec<String>) -> Vec<String> {
    tags.iter()
        .flat_map(|tag| tag.split(','))
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tasks that require tests may only enter the terminal column once passed.
fn check_test_gate(
    doc: &Document,
    id: &str,
    target: &str,
    requires_test: bool,
    status: TestStatus,
) -> Result<()> {
    if requires_test && status != TestStatus::Passed && doc.is_terminal(target) {
        return Err(Error::TestsRequired {
            id: id.to_string(),
            column: target.to_string(),
        });
    }
    Ok(())
}
