//! Configuration loading and management
//!
//! Handles parsing of `.mdtasks.toml` configuration files. Board-level
//! settings (stale threshold, test runner) live in the task file header
//! instead; see [`crate::settings`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::blame::{AuthorLookup, GitBlame, NoAuthors, ThrottledLookup};
use crate::error::{Error, Result};
use crate::store::StoreOptions;

/// File name looked up in the working directory
pub const CONFIG_FILENAME: &str = ".mdtasks.toml";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Task file, relative to the directory holding the config
    #[serde(default = "default_file")]
    pub file: PathBuf,

    /// Actor configuration
    #[serde(default)]
    pub actor: ActorConfig,

    /// Authorship lookup from git history
    #[serde(default)]
    pub blame: BlameConfig,

    /// File watcher
    #[serde(default)]
    pub watch: WatchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            file: default_file(),
            actor: ActorConfig::default(),
            blame: BlameConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}

fn default_file() -> PathBuf {
    PathBuf::from("TASKS.md")
}

/// Actor-related configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorConfig {
    /// Default actor name when none specified
    #[serde(default = "default_actor")]
    pub default: String,
}

fn default_actor() -> String {
    "unknown".to_string()
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            default: default_actor(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlameConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum seconds between `git blame` runs
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_min_interval_secs() -> u64 {
    30
}

impl Default for BlameConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval_secs: default_min_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Quiet period before reloading after a change
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    crate::watch::DEFAULT_DEBOUNCE_MS
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a `.mdtasks.toml` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `.mdtasks.toml` from `dir`, or defaults when there is none.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILENAME);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Task file path, resolved against `dir` when relative.
    pub fn task_file(&self, dir: &Path) -> PathBuf {
        if self.file.is_absolute() {
            self.file.clone()
        } else {
            dir.join(&self.file)
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.watch.debounce_ms)
    }

    /// Authorship lookup as configured.
    pub fn author_lookup(&self) -> Arc<dyn AuthorLookup> {
        if self.blame.enabled {
            Arc::new(ThrottledLookup::new(
                GitBlame::default(),
                Duration::from_secs(self.blame.min_interval_secs),
            ))
        } else {
            Arc::new(NoAuthors)
        }
    }

    pub fn store_options(&self, actor: String) -> StoreOptions {
        StoreOptions {
            actor,
            authors: self.author_lookup(),
            ..StoreOptions::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.file.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("file cannot be empty".to_string()));
        }
        if self.actor.default.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "actor.default cannot be empty".to_string(),
            ));
        }
        if self.watch.debounce_ms > 60_000 {
            return Err(Error::InvalidConfig(
                "watch.debounce_ms must be <= 60000".to_string(),
            ));
        }
        Ok(())
    }
}
