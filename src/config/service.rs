//! Configuration service for loading and generating config files.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::types::default_log_path_for_config_dir;
use super::Config;

/// Configuration service.
pub struct ConfigService;

impl ConfigService {
    /// Get the default configuration file path.
    /// Always uses ~/.config/tailwatch/config.toml for cross-platform consistency.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("tailwatch")
            .join("config.toml")
    }

    /// Load configuration from file.
    ///
    /// If `path` is `None`, uses the default path.
    /// If the file doesn't exist, creates default configuration file.
    /// Log path defaults to the same directory as config file.
    /// Validation is left to the caller so `check` can report it separately.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let path = path.map(PathBuf::from).unwrap_or_else(Self::default_path);
        let config_dir = path.parent();

        if !path.exists() {
            Self::generate_at(&path)?;
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        // If log_path was not explicitly set in config, use config file directory
        let general_default = default_log_path_for_config_dir(None);
        if config.log_path == general_default {
            config.log_path = default_log_path_for_config_dir(config_dir);
        }

        Ok(config)
    }

    /// Load and validate in one step.
    pub fn load_validated(path: Option<&Path>) -> Result<Config> {
        let config = Self::load(path)?;
        config.validate().with_context(|| {
            format!(
                "Invalid configuration in {}",
                path.map(Path::to_path_buf)
                    .unwrap_or_else(Self::default_path)
                    .display()
            )
        })?;
        Ok(config)
    }

    /// Generate default configuration file at the default path.
    pub fn generate_default() -> Result<()> {
        Self::generate_at(&Self::default_path())
    }

    /// Generate default configuration file at the specified path.
    pub fn generate_at(path: &Path) -> Result<()> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = Self::default_config_content();
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Generate default configuration content with comments.
    fn default_config_content() -> String {
        r#"# tailwatch configuration file

# Enable debug logging (stderr at DEBUG level plus a daily log file) (default: false)
debug = false

# Path to log directory (default: same directory as config.toml/logs)
# log_path = "~/.config/tailwatch/logs"

# Days to keep rotated log files (default: 2)
log_retention_days = 2

# Directory for the instance lock file tailwatch.pid (default: system temp dir)
# lock_dir = "/run/tailwatch"

[follow]
# The watched file is passed to the shell as "$1"
shell = "/bin/sh"
command = 'tail -n0 -F -- "$1" 2>&1'
# Used with --dry-run: stream existing content once, then stop
dry_run_command = 'cat -- "$1" 2>&1'
# The follow process must still be alive after this delay
startup_grace_ms = 500

[queues]
line_capacity = 4096
command_capacity = 1024
# Workers re-check for shutdown at this interval while idle
poll_interval_ms = 1000

[executor]
shell = "/bin/bash"
# Pause after every command (throttles action storms)
cooldown_ms = 1000

[reaper]
# Refuse to kill descendants of the follow process when more than this many exist
max_descendants = 2
# Never signal pids at or below this value
min_pid = 1024
settle_ms = 100

# Rules: a line matching `pattern` anywhere runs `command`,
# at most once per `debounce_secs`
[[rules]]
name = "done"
pattern = "^done$"
command = 'echo "$(date) ok" > /tmp/action.log'
debounce_secs = 60

# [[rules]]
# name = "oom"
# pattern = "Out of memory: Killed process"
# command = "systemctl restart myapp"
# debounce_secs = 300
"#
        .to_string()
    }
}
