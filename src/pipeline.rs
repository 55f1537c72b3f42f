use crate::client::PaperRecord;
use crate::discovery::Discover;
use crate::download::{DownloadManager, SyncReport};
use crate::repositories::PaperStore;
use crate::scheduler::CycleRunner;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// File name of the per-cycle manifest in the paper directory
pub const MANIFEST_FILE: &str = "metadata.json";

/// Snapshot of the most recent discovery, written next to the PDFs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub last_updated: DateTime<Utc>,
    pub articles: Vec<PaperRecord>,
}

/// Result of one discovery plus download cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub papers: Vec<PaperRecord>,
    pub sync: SyncReport,
}

/// Discovery feeding the download manager, one cycle at a time
pub struct UpdatePipeline {
    discoverer: Arc<dyn Discover>,
    downloads: DownloadManager,
    store: Arc<dyn PaperStore>,
    write_manifest: bool,
}

impl UpdatePipeline {
    #[must_use]
    pub fn new(
        discoverer: Arc<dyn Discover>,
        downloads: DownloadManager,
        store: Arc<dyn PaperStore>,
        write_manifest: bool,
    ) -> Self {
        Self {
            discoverer,
            downloads,
            store,
            write_manifest,
        }
    }

    /// Clean up after interrupted runs; call once before the first cycle
    pub async fn prepare(&self) -> Result<()> {
        let removed = self.store.sweep_partials().await?;
        let present = self.store.list_pdfs().await?;
        info!(
            "{} papers already present ({} stale partial files removed)",
            present.len(),
            removed
        );
        Ok(())
    }

    /// Run one cycle. Discovery errors abort it; download errors are reported
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<CycleReport> {
        let start = Instant::now();

        let papers = self.discoverer.discover().await?;
        let sync = self.downloads.sync(&papers, self.store.as_ref()).await;

        for failure in &sync.failed {
            warn!(
                "{} will be retried next cycle: {}",
                failure.identifier, failure.reason
            );
        }

        if self.write_manifest {
            self.store_manifest(&papers).await;
        }

        info!(
            discovered = papers.len(),
            downloaded = sync.downloaded,
            skipped = sync.skipped,
            failed = sync.failed.len(),
            "Cycle finished in {:?}",
            start.elapsed()
        );

        Ok(CycleReport { papers, sync })
    }

    async fn store_manifest(&self, papers: &[PaperRecord]) {
        if papers.is_empty() {
            info!("Nothing discovered, keeping previous {}", MANIFEST_FILE);
            return;
        }

        let manifest = Manifest {
            last_updated: Utc::now(),
            articles: papers.to_vec(),
        };

        let result = match serde_json::to_vec_pretty(&manifest) {
            Ok(bytes) => self.store.replace(MANIFEST_FILE, &bytes).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!("Failed to write {}: {}", MANIFEST_FILE, e);
        }
    }
}

#[async_trait]
impl CycleRunner for UpdatePipeline {
    async fn run_cycle(&self) -> Result<()> {
        self.run_once().await.map(|_| ())
    }
}
