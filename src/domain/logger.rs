//! Logging to stderr, plus a daily-rotated file in debug mode.

use anyhow::Result;
use std::fs;
use std::io::IsTerminal;
use std::path::Path;
use std::time::{Duration, SystemTime};
use time::macros::format_description;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

const LOG_PREFIX: &str = env!("CARGO_PKG_NAME");

/// Initialize the logging system.
///
/// `RUST_LOG` directives take precedence over the default level.
pub fn init(config: &Config, debug: bool, quiet: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else if quiet {
        tracing::Level::WARN
    } else {
        tracing::Level::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    // Use local timezone for timestamps
    let time_format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let local_offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = OffsetTime::new(local_offset, time_format);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .with_thread_names(true)
        .with_timer(timer.clone());

    let file_layer = if debug {
        if !config.log_path.exists() {
            fs::create_dir_all(&config.log_path)?;
        }
        cleanup_old_logs(&config.log_path, config.log_retention_days)?;

        let file_appender = tracing_appender::rolling::daily(&config.log_path, LOG_PREFIX);
        Some(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(timer),
        )
    } else {
        None
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set global subscriber: {}", e))?;

    Ok(())
}

/// Remove this program's log files older than `retention_days`.
pub fn cleanup_old_logs(log_path: &Path, retention_days: u64) -> Result<()> {
    let retention = Duration::from_secs(retention_days.saturating_mul(24 * 60 * 60));
    let cutoff = match SystemTime::now().checked_sub(retention) {
        Some(cutoff) => cutoff,
        None => return Ok(()),
    };

    if !log_path.exists() {
        return Ok(());
    }

    for entry in fs::read_dir(log_path)? {
        let entry = entry?;
        let path = entry.path();

        // Only process log files
        if !path.is_file() {
            continue;
        }

        let filename = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };

        if !filename.starts_with(LOG_PREFIX) {
            continue;
        }

        // Check modification time
        if let Ok(metadata) = entry.metadata() {
            if let Ok(modified) = metadata.modified() {
                if modified < cutoff {
                    let _ = fs::remove_file(&path);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn age(path: &Path, days: u64) {
        let when = SystemTime::now() - Duration::from_secs(days * 24 * 60 * 60);
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(when).unwrap();
    }

    #[test]
    fn test_cleanup_removes_only_old_own_logs() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("tailwatch.2020-01-01");
        let fresh = dir.path().join("tailwatch.2099-01-01");
        let foreign = dir.path().join("other.2020-01-01");
        for p in [&old, &fresh, &foreign] {
            fs::write(p, "x").unwrap();
        }
        age(&old, 5);
        age(&foreign, 5);

        cleanup_old_logs(dir.path(), 2).unwrap();

        assert!(!old.exists());
        assert!(fresh.exists());
        assert!(foreign.exists());
    }

    #[test]
    fn test_cleanup_huge_retention_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("tailwatch.2020-01-01");
        fs::write(&old, "x").unwrap();
        age(&old, 5);

        cleanup_old_logs(dir.path(), u64::MAX).unwrap();

        assert!(old.exists());
    }

    #[test]
    fn test_cleanup_missing_dir_is_ok() {
        assert!(cleanup_old_logs(Path::new("/nonexistent/tailwatch-logs"), 2).is_ok());
    }
}
