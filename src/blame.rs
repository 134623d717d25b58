//! Authorship enrichment from version history.
//!
//! Blames the committed revision of the task file and attributes each task to
//! the author of the line that carries its identifier. Every failure mode
//! (no git, file outside a repository, file not committed yet) yields `None`
//! and is only logged at debug level.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use git2::Repository;
use regex::Regex;
use tracing::debug;

use crate::codec::id_line_pattern;
use crate::error::Result;

/// Source of `task id -> author` attributions.
pub trait AuthorLookup: Send + Sync {
    /// Authors for the task file at `path`, or `None` when history is
    /// unavailable.
    fn authors(&self, path: &Path) -> Option<HashMap<String, String>>;
}

/// Lookup that never attributes anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuthors;

impl AuthorLookup for NoAuthors {
    fn authors(&self, _path: &Path) -> Option<HashMap<String, String>> {
        None
    }
}

/// One line of `git blame --line-porcelain` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlameLine {
    /// 1-based line number in the blamed revision
    pub line: usize,
    pub author: String,
    /// Seconds since the epoch
    pub author_time: i64,
    pub content: String,
}

/// Blame via the `git` executable against a committed revision.
#[derive(Debug, Clone)]
pub struct GitBlame {
    revision: String,
}

impl Default for GitBlame {
    fn default() -> Self {
        Self {
            revision: "HEAD".to_string(),
        }
    }
}

impl GitBlame {
    pub fn new(revision: impl Into<String>) -> Self {
        Self {
            revision: revision.into(),
        }
    }

    /// Blame `path` at the configured revision.
    pub fn blame(&self, path: &Path) -> Option<Vec<BlameLine>> {
        let (workdir, relative) = committed_location(path, &self.revision)
            .map_err(|err| debug!(%err, "task file history unavailable"))
            .ok()??;
        let output = Command::new("git")
            .args(["blame", "--line-porcelain", &self.revision, "--"])
            .arg(&relative)
            .current_dir(&workdir)
            .output()
            .map_err(|err| debug!(%err, "git blame could not be started"))
            .ok()?;
        if !output.status.success() {
            debug!(
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "git blame failed"
            );
            return None;
        }
        Some(parse_porcelain(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl AuthorLookup for GitBlame {
    fn authors(&self, path: &Path) -> Option<HashMap<String, String>> {
        let lines = self.blame(path)?;
        let pattern = id_line_pattern()
            .map_err(|err| debug!(%err, "id pattern failed to compile"))
            .ok()?;
        Some(authors_by_task(&lines, &pattern))
    }
}

/// Repository workdir and repo-relative path of `path`, or `None` when the
/// file is not part of `revision`.
fn committed_location(path: &Path, revision: &str) -> Result<Option<(PathBuf, PathBuf)>> {
    let absolute = path.canonicalize()?;
    let Some(parent) = absolute.parent() else {
        return Ok(None);
    };
    let repo = Repository::discover(parent)?;
    let Some(workdir) = repo.workdir() else {
        return Ok(None);
    };
    let workdir = workdir.canonicalize()?;
    let Ok(relative) = absolute.strip_prefix(&workdir).map(Path::to_path_buf) else {
        return Ok(None);
    };

    let tree = repo.revparse_single(revision)?.peel_to_tree()?;
    if tree.get_path(&relative).is_err() {
        debug!(path = %relative.display(), revision, "task file is not committed");
        return Ok(None);
    }
    Ok(Some((workdir, relative)))
}

/// Parse `git blame --line-porcelain` output.
pub fn parse_porcelain(output: &str) -> Vec<BlameLine> {
    let mut lines = Vec::new();
    let mut line_no = 0usize;
    let mut author = String::new();
    let mut author_time = 0i64;

    for raw in output.lines() {
        if let Some(content) = raw.strip_prefix('\t') {
            lines.push(BlameLine {
                line: line_no,
                author: std::mem::take(&mut author),
                author_time,
                content: content.to_string(),
            });
            author_time = 0;
        } else if let Some(name) = raw.strip_prefix("author ") {
            author = name.to_string();
        } else if let Some(time) = raw.strip_prefix("author-time ") {
            author_time = time.trim().parse().unwrap_or(0);
        } else if let Some(final_line) = commit_header_line(raw) {
            line_no = final_line;
        }
    }
    lines
}

/// Final line number from a `<sha> <orig> <final> [<count>]` header.
fn commit_header_line(raw: &str) -> Option<usize> {
    let mut parts = raw.split_whitespace();
    let sha = parts.next()?;
    if sha.len() < 40 || !sha.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    parts.next()?;
    parts.next()?.parse().ok()
}

/// Map each task id found in the blamed lines to the author of the most
/// recent line carrying it.
pub fn authors_by_task(lines: &[BlameLine], id_pattern: &Regex) -> HashMap<String, String> {
    let mut latest: HashMap<String, (i64, String)> = HashMap::new();
    for line in lines {
        let Some(caps) = id_pattern.captures(&line.content) else {
            continue;
        };
        let Some(id) = caps.get(1).or_else(|| caps.get(2)) else {
            continue;
        };
        let entry = latest
            .entry(id.as_str().to_string())
            .or_insert((line.author_time, line.author.clone()));
        if line.author_time > entry.0 {
            *entry = (line.author_time, line.author.clone());
        }
    }
    latest
        .into_iter()
        .map(|(id, (_, author))| (id, author))
        .collect()
}

/// Wraps a lookup so the underlying call runs at most once per interval.
/// While a refresh is in flight, other callers get the previous result
/// instead of waiting.
pub struct ThrottledLookup<L> {
    inner: L,
    min_interval: Duration,
    cache: Mutex<Cached>,
    in_flight: AtomicBool,
}

#[derive(Default)]
struct Cached {
    fetched_at: Option<Instant>,
    path: PathBuf,
    authors: Option<HashMap<String, String>>,
}

impl<L: AuthorLookup> ThrottledLookup<L> {
    pub fn new(inner: L, min_interval: Duration) -> Self {
        Self {
            inner,
            min_interval,
            cache: Mutex::new(Cached::default()),
            in_flight: AtomicBool::new(false),
        }
    }

    fn cached(&self, path: &Path, require_fresh: bool) -> Option<Option<HashMap<String, String>>> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let fetched_at = cache.fetched_at?;
        if cache.path != path {
            return None;
        }
        if require_fresh && fetched_at.elapsed() >= self.min_interval {
            return None;
        }
        Some(cache.authors.clone())
    }
}

impl<L: AuthorLookup> AuthorLookup for ThrottledLookup<L> {
    fn authors(&self, path: &Path) -> Option<HashMap<String, String>> {
        if let Some(authors) = self.cached(path, true) {
            return authors;
        }
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return self.cached(path, false).flatten();
        }

        let authors = self.inner.authors(path);
        {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            *cache = Cached {
                fetched_at: Some(Instant::now()),
                path: path.to_path_buf(),
                authors: authors.clone(),
            };
        }
        self.in_flight.store(false, Ordering::Release);
        authors
    }
}
