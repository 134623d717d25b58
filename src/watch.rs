//! Reload the store when the task file changes on disk.
//!
//! The parent directory is watched rather than the file, since atomic saves
//! replace the inode. Bursts of events are collapsed into one reload after the
//! debounce window, and reloads of content the store wrote itself are skipped.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::store::{LoadReport, TaskStore};

/// Default quiet period before a reload
pub const DEFAULT_DEBOUNCE_MS: u64 = 200;

const POLL_INTERVAL_MS: u64 = 25;

/// Running watcher; dropping it (or calling [`FileWatcher::stop`]) ends the
/// reload thread.
pub struct FileWatcher {
    watcher: Option<RecommendedWatcher>,
    join: Option<thread::JoinHandle<()>>,
}

impl FileWatcher {
    /// Watch the store's file. `on_reload` runs after every reload that
    /// changed the board.
    pub fn start<F>(store: Arc<TaskStore>, debounce: Duration, on_reload: F) -> Result<Self>
    where
        F: Fn(&LoadReport) + Send + 'static,
    {
        let target = absolute(store.path())?;
        let dir = target
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| Error::InvalidArgument(format!("cannot watch {}", target.display())))?;

        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        info!(path = %target.display(), debounce_ms = debounce.as_millis() as u64, "watching task file");

        let join = thread::Builder::new()
            .name("mdtasks-watch".to_string())
            .spawn(move || run(&store, &target, debounce, &rx, &on_reload))
            .map_err(Error::Io)?;

        Ok(Self {
            watcher: Some(watcher),
            join: Some(join),
        })
    }

    /// Stop watching and wait for the reload thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    /// Block until the watcher stops on its own (channel closed).
    pub fn wait(mut self) {
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }

    fn shutdown(&mut self) {
        // Dropping the watcher drops the event sender, which ends the loop.
        drop(self.watcher.take());
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Absolute path with a canonical parent, matching the paths notify reports.
fn absolute(path: &Path) -> Result<PathBuf> {
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => Ok(parent
            .canonicalize()
            .map(|parent| parent.join(name))
            .unwrap_or_else(|_| path.clone())),
        _ => Ok(path),
    }
}

/// True when the event touches the task file itself.
pub fn is_relevant(event: &Event, target: &Path) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    let name = target.file_name();
    event
        .paths
        .iter()
        .any(|path| path == target || (path.file_name() == name && path.parent() == target.parent()))
}

fn run(
    store: &TaskStore,
    target: &Path,
    debounce: Duration,
    rx: &mpsc::Receiver<notify::Result<Event>>,
    on_reload: &dyn Fn(&LoadReport),
) {
    loop {
        let relevant = match rx.recv() {
            Ok(Ok(event)) => is_relevant(&event, target),
            Ok(Err(err)) => {
                warn!(error = %err, "watch error");
                false
            }
            Err(_) => break,
        };
        if !relevant {
            continue;
        }

        let deadline = Instant::now() + debounce;
        while Instant::now() < deadline {
            match rx.recv_timeout(Duration::from_millis(POLL_INTERVAL_MS)) {
                Ok(_) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }

        match store.reload_if_changed() {
            Ok(Some(report)) => {
                info!(tasks = report.tasks, columns = report.columns, "reloaded task file");
                on_reload(&report);
            }
            Ok(None) => debug!("task file change was our own write"),
            Err(err) => warn!(error = %err, "reload after file change failed"),
        }
    }
    debug!("watcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn only_events_on_the_task_file_count() {
        let target = Path::new("/board/TASKS.md");
        assert!(is_relevant(
            &event(EventKind::Modify(ModifyKind::Any), "/board/TASKS.md"),
            target
        ));
        assert!(is_relevant(
            &event(EventKind::Create(CreateKind::File), "/board/TASKS.md"),
            target
        ));
        assert!(!is_relevant(
            &event(EventKind::Modify(ModifyKind::Any), "/board/TASKS.md.lock"),
            target
        ));
        assert!(!is_relevant(
            &event(EventKind::Modify(ModifyKind::Any), "/other/TASKS.md"),
            target
        ));
        assert!(!is_relevant(
            &event(EventKind::Access(AccessKind::Any), "/board/TASKS.md"),
            target
        ));
    }
}
