//! `paper-updater`: keeps a directory of prominent AI papers current.
//!
//! Runs an update cycle immediately, then once a day at the configured time
//! until SIGTERM or SIGINT.
//!
//! ```bash
//! # Daily updates into ./pdfDatabase at midnight local time
//! paper-updater
//!
//! # A single cycle into another directory
//! paper-updater --once --download-dir ~/papers
//! ```

use ai_paper_updater::{Config, ConfigOverrides, RunMode, UpdaterService};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "paper-updater",
    about = "Downloads the most cited recent AI papers into a local directory, daily",
    version
)]
struct Cli {
    /// Configuration file (defaults to <config dir>/paper-updater/config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory the PDFs are stored in
    #[arg(short, long, value_name = "DIR")]
    download_dir: Option<PathBuf>,

    /// Number of papers to keep current
    #[arg(short = 'n', long)]
    top_n: Option<usize>,

    /// Daily run time, HH:MM
    #[arg(long, value_name = "HH:MM")]
    run_at: Option<String>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long)]
    log_level: Option<String>,

    /// Log format
    #[arg(long, value_parser = ["pretty", "json"])]
    log_format: Option<String>,

    /// Also append logs to this file
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            download_directory: self.download_dir.clone(),
            top_n: self.top_n,
            run_at: self.run_at.clone(),
            log_level: self.log_level.clone(),
            log_format: self.log_format.clone(),
            log_file: self.log_file.clone(),
        }
    }
}

fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let log_file = config
        .logging
        .open_file()
        .context("Failed to open log file")?
        .map(Mutex::new);

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(log_file.map(|file| fmt::layer().json().with_ansi(false).with_writer(file)))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .with(log_file.map(|file| {
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(file)
            }))
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config.apply_overrides(&cli.overrides());

    init_tracing(&config)?;

    match Config::source_path(cli.config.as_deref()) {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("No configuration file found"),
    }

    info!(
        "Starting paper-updater v{} (directory: {})",
        env!("CARGO_PKG_VERSION"),
        config.downloads.directory.display()
    );

    let service = UpdaterService::new(config).context("Invalid configuration")?;
    let mode = if cli.once {
        RunMode::Once
    } else {
        RunMode::Scheduled
    };

    if let Err(e) = service.run(mode).await {
        error!("Updater failed: {}", e);
        return Err(e.into());
    }

    Ok(())
}
