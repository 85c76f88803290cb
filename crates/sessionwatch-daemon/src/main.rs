//! sessionwatch - derives live status for coding-agent sessions from their
//! transcripts and hook signals, and streams lifecycle events as JSON lines.

use anyhow::Result;
use clap::Parser;
use sessionwatch_core::{GitCli, NoopPrPoller, SessionMonitor};
use sessionwatch_daemon::{config, logging, publisher};
use std::path::PathBuf;
use std::sync::Arc;

use config::Config;
use logging::{LogConfig, LogFormat};

/// Watch agent session transcripts and publish status changes.
#[derive(Parser, Debug)]
#[command(name = "sessionwatch")]
#[command(about = "Stream coding-agent session status changes as JSON lines")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the transcript root from config
    #[arg(long, value_name = "DIR")]
    projects_dir: Option<PathBuf>,

    /// Override the hook signal directory from config
    #[arg(long, value_name = "DIR")]
    signals_dir: Option<PathBuf>,

    /// Enable verbose logging (per-session status changes)
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace logging (every transition)
    #[arg(long)]
    trace: bool,

    /// Quiet mode (WARN and ERROR only)
    #[arg(short, long)]
    quiet: bool,

    /// Set log level for specific targets (e.g., "registry=debug" or "git=trace").
    /// Can be specified multiple times. Targets are prefixed with "sessionwatch::" automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL")]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_cli(
        cli.verbose,
        cli.debug,
        cli.trace,
        cli.quiet,
        cli.log_overrides,
        cli.log_format,
    );
    logging::init(&log_config);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(dir) = cli.projects_dir {
        config.projects_dir = dir;
    }
    if let Some(dir) = cli.signals_dir {
        config.signals_dir = dir;
    }

    tracing::info!(
        target: "sessionwatch::startup",
        "Loaded configuration (projects: {}, signals: {})",
        config.projects_dir.display(),
        config.signals_dir.display()
    );

    let monitor = SessionMonitor::new(
        config.to_monitor_config(),
        Arc::new(GitCli::new()),
        Arc::new(NoopPrPoller),
    );
    let publisher = tokio::spawn(publisher::run(
        monitor.subscribe(),
        tokio::io::stdout(),
        config.idle_after(),
    ));
    let handle = monitor.start()?;

    tokio::signal::ctrl_c().await?;
    tracing::info!(target: "sessionwatch::startup", "Shutting down");
    handle.shutdown().await;

    match publisher.await {
        Ok(result) => result?,
        Err(e) => tracing::warn!(target: "sessionwatch::publish", "Publisher task failed: {}", e),
    }
    Ok(())
}
