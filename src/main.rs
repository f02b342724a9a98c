//! tailwatch: continuous log-watching daemon
//!
//! Follows a growing text file, matches new lines against regex rules, and runs
//! debounced shell actions one at a time. On shutdown it terminates the whole
//! process tree of the follow process.

mod cli;
mod config;
mod domain;
mod service;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use cli::{Cli, Commands};
use config::ConfigService;
use domain::CancelToken;
use service::Supervisor;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Init { path }) => {
            let config_path = if let Some(p) = path {
                ConfigService::generate_at(p)?;
                p.clone()
            } else {
                ConfigService::generate_default()?;
                ConfigService::default_path()
            };
            if !cli.quiet {
                eprintln!("Configuration file created at: {}", config_path.display());
            }
        }
        Some(Commands::Check) => {
            let config = ConfigService::load(cli.config.as_deref())?;
            config::validate(&config)?;
            if !cli.quiet {
                eprintln!("Configuration is valid.");
            }
        }
        Some(Commands::Version) => {
            println!("tailwatch {}", env!("CARGO_PKG_VERSION"));
        }
        None => {
            let file = cli.file.clone().context("missing <FILE> argument")?;
            return watch(&cli, file);
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Run the daemon against `file` until shutdown.
fn watch(cli: &Cli, file: PathBuf) -> Result<ExitCode> {
    let config = ConfigService::load_validated(cli.config.as_deref())?;
    domain::logger::init(&config, cli.debug || config.debug, cli.quiet)?;

    let shutdown = CancelToken::new();
    service::install_signal_handler(&shutdown).context("Failed to install signal handler")?;

    let started = Instant::now();
    info!(
        pid = std::process::id(),
        ppid = std::os::unix::process::parent_id(),
        file = %file.display(),
        dry_run = cli.dry_run,
        "tailwatch {} starting",
        env!("CARGO_PKG_VERSION")
    );

    let (success, reason) = match Supervisor::new(config, file, cli.dry_run, shutdown).run() {
        Ok(summary) => {
            info!(
                lines = summary.stats.lines_read,
                evaluated = summary.stats.lines_evaluated,
                enqueued = summary.stats.commands_enqueued,
                succeeded = summary.stats.commands_succeeded,
                failed = summary.stats.commands_failed,
                "Pipeline totals"
            );
            if let Some(code) = summary.follow_exit.and_then(|s| s.code()) {
                info!(code, "Follow process exit code");
            }
            (summary.success, summary.reason)
        }
        Err(e) => {
            error!("{}", e);
            (false, Some(e.to_string()))
        }
    };

    let duration_ms = started.elapsed().as_millis() as u64;
    if success {
        info!(pid = std::process::id(), duration_ms, "tailwatch finished");
        Ok(ExitCode::SUCCESS)
    } else {
        error!(
            pid = std::process::id(),
            duration_ms,
            reason = reason.as_deref().unwrap_or("unknown"),
            "tailwatch failed"
        );
        Ok(ExitCode::FAILURE)
    }
}
