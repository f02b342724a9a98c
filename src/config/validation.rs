//! Configuration validation.

use std::collections::HashSet;

use anyhow::{bail, Result};
use regex::Regex;

use super::Config;

/// Validate configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Validate log path
    if config.log_path.to_string_lossy().contains('\0') {
        bail!("Invalid log_path: contains null character");
    }

    if let Some(dir) = &config.lock_dir {
        if dir.as_os_str().is_empty() {
            bail!("lock_dir cannot be empty");
        }
    }

    // Validate follow process
    if config.follow.shell.trim().is_empty() {
        bail!("follow.shell cannot be empty");
    }
    if config.follow.command.trim().is_empty() {
        bail!("follow.command cannot be empty");
    }
    if config.follow.dry_run_command.trim().is_empty() {
        bail!("follow.dry_run_command cannot be empty");
    }

    // Validate queues
    if config.queues.line_capacity == 0 {
        bail!("queues.line_capacity must be greater than 0");
    }
    if config.queues.command_capacity == 0 {
        bail!("queues.command_capacity must be greater than 0");
    }
    if config.queues.poll_interval_ms == 0 {
        bail!("queues.poll_interval_ms must be greater than 0");
    }

    if config.executor.shell.trim().is_empty() {
        bail!("executor.shell cannot be empty");
    }

    // Validate rules
    if config.rules.is_empty() {
        bail!("at least one [[rules]] entry is required");
    }

    let mut names = HashSet::new();
    for (i, rule) in config.rules.iter().enumerate() {
        if rule.name.trim().is_empty() {
            bail!("rules[{}]: name cannot be empty", i);
        }
        if !names.insert(rule.name.as_str()) {
            bail!("rules[{}]: duplicate rule name '{}'", i, rule.name);
        }

        if rule.pattern.is_empty() {
            bail!("rules[{}]: pattern cannot be empty", i);
        }

        // Validate regex pattern
        if let Err(e) = Regex::new(&rule.pattern) {
            bail!(
                "rules[{}]: invalid regex pattern '{}': {}",
                i,
                rule.pattern,
                e
            );
        }

        if rule.command.trim().is_empty() {
            bail!("rules[{}]: command cannot be empty", i);
        }
    }

    Ok(())
}
