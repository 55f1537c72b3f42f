use crate::client::{HttpClientConfig, HttpPdfFetcher};
use crate::config::Config;
use crate::discovery::PaperDiscoverer;
use crate::download::DownloadManager;
use crate::pipeline::{CycleReport, UpdatePipeline};
use crate::repositories::FsPaperStore;
use crate::scheduler::{SystemClock, UpdateScheduler};
use crate::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, instrument};

use super::pid::PidFile;
use super::signals::SignalHandler;

/// How long the updater keeps running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// One cycle, then exit
    Once,
    /// One cycle now, then daily until a shutdown signal
    Scheduled,
}

/// The long-running updater process: directory, PID lock, signals, schedule
pub struct UpdaterService {
    config: Config,
}

impl UpdaterService {
    /// Validate the configuration and prepare the service
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Wire discovery and downloads onto the paper directory
    pub async fn build_pipeline(&self) -> Result<UpdatePipeline> {
        let config = &self.config;
        let store = FsPaperStore::open(&config.downloads.directory).await?;

        let client = HttpClientConfig::from(&config.http).build_client()?;
        let discoverer = PaperDiscoverer::from_config(&client, &config.discovery);
        let downloads =
            DownloadManager::new(Arc::new(HttpPdfFetcher::new(client)), &config.downloads);

        Ok(UpdatePipeline::new(
            Arc::new(discoverer),
            downloads,
            Arc::new(store),
            config.downloads.write_manifest,
        ))
    }

    /// Run one cycle and return its report
    pub async fn run_once(&self) -> Result<CycleReport> {
        let mut pid_file = PidFile::create(self.config.pid_file_path())?;
        let pipeline = self.build_pipeline().await?;
        pipeline.prepare().await?;

        let report = pipeline.run_once().await;
        pid_file.remove()?;
        report
    }

    /// Run according to `mode`; returns once done or after a shutdown signal
    #[instrument(skip(self))]
    pub async fn run(&self, mode: RunMode) -> Result<()> {
        if mode == RunMode::Once {
            self.run_once().await?;
            return Ok(());
        }

        let config = &self.config;
        let mut pid_file = PidFile::create(config.pid_file_path())?;
        let pipeline = self.build_pipeline().await?;
        pipeline.prepare().await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let signal_handler = SignalHandler::new()?;
        let signal_handle = signal_handler.handle();
        let signal_task = signal_handler.spawn(shutdown_tx);

        let scheduler = UpdateScheduler::new(
            Arc::new(pipeline),
            Arc::new(SystemClock),
            config.schedule.run_at_time()?,
            config.schedule.timezone,
        );

        info!(
            "Updating {} daily at {} ({:?})",
            config.downloads.directory.display(),
            config.schedule.run_at,
            config.schedule.timezone
        );
        let cycles = scheduler.run(shutdown_rx).await;

        signal_handle.close();
        let _ = signal_task.await;
        pid_file.remove()?;

        info!("Updater stopped after {} cycles", cycles);
        Ok(())
    }
}
