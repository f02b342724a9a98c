//! Configuration data types.

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::validation;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Enable debug logging (stderr at DEBUG plus a rotating log file)
    pub debug: bool,

    /// Path to log directory
    pub log_path: PathBuf,

    /// Days to keep rotated log files
    pub log_retention_days: u64,

    /// Directory holding the instance lock file
    pub lock_dir: Option<PathBuf>,

    /// Follow process settings
    pub follow: FollowConfig,

    /// Queue sizing and polling
    pub queues: QueueConfig,

    /// Command executor settings
    pub executor: ExecutorConfig,

    /// Process tree reaper safety limits
    pub reaper: ReaperConfig,

    /// Pattern to action rules
    pub rules: Vec<RuleConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            log_path: default_log_path(),
            log_retention_days: 2,
            lock_dir: None,
            follow: FollowConfig::default(),
            queues: QueueConfig::default(),
            executor: ExecutorConfig::default(),
            reaper: ReaperConfig::default(),
            rules: Vec::new(),
        }
    }
}

impl Config {
    /// Validate configuration and return errors if invalid.
    /// Delegates to the comprehensive validation module.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Full path of the instance lock file.
    pub fn lock_file(&self) -> PathBuf {
        self.lock_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
            .join(concat!(env!("CARGO_PKG_NAME"), ".pid"))
    }
}

/// Follow process configuration.
///
/// Commands run as `<shell> -c <command> tailwatch <FILE>`, so the watched
/// path is available as `"$1"` and never spliced into the command text.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FollowConfig {
    /// Shell used to launch the follow command
    pub shell: String,

    /// Command streaming lines appended to the file
    pub command: String,

    /// Command streaming the existing content once (dry run)
    pub dry_run_command: String,

    /// Time the follow process must survive after launch
    pub startup_grace_ms: u64,
}

impl Default for FollowConfig {
    fn default() -> Self {
        Self {
            shell: "/bin/sh".to_string(),
            command: r#"tail -n0 -F -- "$1" 2>&1"#.to_string(),
            dry_run_command: r#"cat -- "$1" 2>&1"#.to_string(),
            startup_grace_ms: 500,
        }
    }
}

impl FollowConfig {
    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }
}

/// Queue configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Capacity of the line queue
    pub line_capacity: usize,

    /// Capacity of the command queue
    pub command_capacity: usize,

    /// How long workers wait on an empty queue before re-checking for shutdown
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            line_capacity: 4096,
            command_capacity: 1024,
            poll_interval_ms: 1000,
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Command executor configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Shell used to run rule commands
    pub shell: String,

    /// Pause after each command before taking the next one
    pub cooldown_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            shell: "/bin/bash".to_string(),
            cooldown_ms: 1000,
        }
    }
}

impl ExecutorConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Process tree reaper configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    /// Refuse to signal descendants when more than this many are found
    pub max_descendants: usize,

    /// Never signal pids at or below this value
    pub min_pid: u32,

    /// Pause after killing the follow process
    pub settle_ms: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            max_descendants: 2,
            min_pid: 1024,
            settle_ms: 100,
        }
    }
}

/// Pattern to action rule.
///
/// # Examples
///
/// ```toml
/// [[rules]]
/// name = "job-done"
/// pattern = "^done$"
/// command = "echo \"$(date) ok\" > /tmp/action.log"
/// debounce_secs = 60
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    /// Rule name used in logs
    pub name: String,

    /// Regex searched for anywhere in each line
    pub pattern: String,

    /// Shell command run when the rule fires
    pub command: String,

    /// Minimum seconds between two firings
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,
}

fn default_debounce_secs() -> u64 {
    60
}

/// Get default log path (relative to config directory).
/// This returns a placeholder; the actual path is set by ConfigService based on config file location.
pub fn default_log_path() -> PathBuf {
    default_log_path_for_config_dir(None)
}

/// Get log path based on config directory.
pub fn default_log_path_for_config_dir(config_dir: Option<&Path>) -> PathBuf {
    config_dir
        .map(|d| d.to_path_buf())
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config")
                .join("tailwatch")
        })
        .join("logs")
}
