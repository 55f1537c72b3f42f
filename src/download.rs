//! Download manager: brings the paper directory in line with a discovered list.
//!
//! Each record maps to a deterministic file name derived from its identifier.
//! Records whose file already exists are skipped, the rest are fetched,
//! checked to be PDFs and handed to the [`PaperStore`] for an atomic write.
//! One bad paper never aborts the batch.

use crate::client::{PaperRecord, PdfFetcher, RateLimiter};
use crate::config::DownloadConfig;
use crate::repositories::{PaperStore, WriteOutcome};
use crate::resilience::{retry_with_policy, RetryPolicy};
use crate::{Error, Result};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Every PDF starts with this header
pub const PDF_MAGIC: &[u8] = b"%PDF-";

/// Local file name for an identifier: unsafe characters become `_`
#[must_use]
pub fn filename_for(identifier: &str) -> String {
    let mut stem: String = identifier
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    // hidden names are reserved for temporary files
    if stem.is_empty() || stem.starts_with('.') {
        stem.insert(0, '_');
    }

    format!("{stem}.pdf")
}

/// Reject bodies that are not PDF documents
pub fn validate_pdf(identifier: &str, bytes: &[u8]) -> Result<()> {
    if bytes.starts_with(PDF_MAGIC) {
        return Ok(());
    }

    let preview: String = String::from_utf8_lossy(&bytes[..bytes.len().min(16)])
        .chars()
        .filter(|c| !c.is_control())
        .collect();
    Err(Error::Download {
        identifier: identifier.to_string(),
        reason: if bytes.is_empty() {
            "empty response body".to_string()
        } else {
            format!("response is not a PDF (starts with {preview:?})")
        },
    })
}

/// A record that could not be downloaded this cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadFailure {
    pub identifier: String,
    pub reason: String,
}

/// Outcome of one `sync` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: Vec<DownloadFailure>,
}

impl SyncReport {
    /// Number of records accounted for
    #[must_use]
    pub fn total(&self) -> usize {
        self.downloaded + self.skipped + self.failed.len()
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

enum Outcome {
    Downloaded,
    Skipped,
    Failed(DownloadFailure),
}

/// Fetches missing papers into a [`PaperStore`]
pub struct DownloadManager {
    fetcher: Arc<dyn PdfFetcher>,
    max_concurrent: usize,
    max_file_size: u64,
    retry_policy: RetryPolicy,
    limiter: Mutex<RateLimiter>,
}

impl DownloadManager {
    #[must_use]
    pub fn new(fetcher: Arc<dyn PdfFetcher>, config: &DownloadConfig) -> Self {
        Self {
            fetcher,
            max_concurrent: config.max_concurrent.max(1),
            max_file_size: config.max_file_size_bytes(),
            retry_policy: RetryPolicy::with_max_retries(config.max_retries),
            limiter: Mutex::new(RateLimiter::new(config.requests_per_sec)),
        }
    }

    /// Replace the backoff policy for transient fetch failures
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Download every record whose file is missing.
    ///
    /// `downloaded + skipped + failed.len()` always equals `records.len()`.
    /// Duplicate identifiers are processed once and the repeats count as skipped.
    #[instrument(skip_all, fields(records = records.len(), store = store.name()))]
    pub async fn sync(&self, records: &[PaperRecord], store: &dyn PaperStore) -> SyncReport {
        let start = Instant::now();
        let mut report = SyncReport::default();

        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(records.len());
        for record in records {
            let file_name = filename_for(&record.identifier);
            if seen.insert(file_name.clone()) {
                unique.push((record.clone(), file_name));
            } else {
                debug!("Duplicate record {} in batch", record.identifier);
                report.skipped += 1;
            }
        }

        let mut outcomes: Vec<(usize, Outcome)> = stream::iter(unique.into_iter().enumerate())
            .map(|(index, (record, file_name))| async move {
                (index, self.sync_one(&record, &file_name, store).await)
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;
        outcomes.sort_by_key(|(index, _)| *index);

        for (_, outcome) in outcomes {
            match outcome {
                Outcome::Downloaded => report.downloaded += 1,
                Outcome::Skipped => report.skipped += 1,
                Outcome::Failed(failure) => report.failed.push(failure),
            }
        }

        debug_assert_eq!(report.total(), records.len());
        info!(
            downloaded = report.downloaded,
            skipped = report.skipped,
            failed = report.failed.len(),
            "Sync finished in {:?}",
            start.elapsed()
        );
        report
    }

    async fn sync_one(&self, record: &PaperRecord, file_name: &str, store: &dyn PaperStore) -> Outcome {
        match self.try_sync_one(record, file_name, store).await {
            Ok(WriteOutcome::Written) => {
                info!("Downloaded {} as {}", record.identifier, file_name);
                Outcome::Downloaded
            }
            Ok(WriteOutcome::AlreadyExists) => Outcome::Skipped,
            Err(e) => {
                warn!("Failed to download {}: {}", record.identifier, e);
                Outcome::Failed(DownloadFailure {
                    identifier: record.identifier.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn try_sync_one(
        &self,
        record: &PaperRecord,
        file_name: &str,
        store: &dyn PaperStore,
    ) -> Result<WriteOutcome> {
        if store.exists(file_name).await? {
            debug!("{} already present", file_name);
            return Ok(WriteOutcome::AlreadyExists);
        }

        let url = record.download_url.as_str();
        let max_bytes = self.max_file_size;
        let limiter = &self.limiter;
        let fetcher = &self.fetcher;
        // every attempt, retries included, waits its turn
        let bytes = retry_with_policy(
            || async move {
                limiter.lock().await.acquire().await;
                fetcher.fetch(url, max_bytes).await
            },
            &self.retry_policy,
            &format!("download {}", record.identifier),
        )
        .await?;

        validate_pdf(&record.identifier, &bytes)?;
        store.write_new(file_name, &bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::InMemoryPaperStore;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fetcher serving canned bodies keyed by URL
    #[derive(Default)]
    struct CannedFetcher {
        bodies: HashMap<String, Vec<u8>>,
        calls: AtomicUsize,
    }

    impl CannedFetcher {
        fn with(mut self, url: &str, body: &[u8]) -> Self {
            self.bodies.insert(url.to_string(), body.to_vec());
            self
        }
    }

    #[async_trait]
    impl PdfFetcher for CannedFetcher {
        async fn fetch(&self, url: &str, max_bytes: u64) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.bodies.get(url) {
                Some(body) if body.len() as u64 > max_bytes => Err(Error::Download {
                    identifier: url.to_string(),
                    reason: format!("body exceeds {max_bytes} bytes"),
                }),
                Some(body) => Ok(body.clone()),
                None => Err(Error::HttpStatus {
                    url: url.to_string(),
                    code: 404,
                }),
            }
        }
    }

    fn record(id: &str) -> PaperRecord {
        PaperRecord::new(
            &format!("Paper {id}"),
            id,
            &format!("https://arxiv.org/pdf/{id}.pdf"),
        )
    }

    fn unpaced() -> DownloadConfig {
        DownloadConfig {
            requests_per_sec: 1000.0,
            ..DownloadConfig::default()
        }
    }

    fn manager(fetcher: Arc<CannedFetcher>) -> DownloadManager {
        DownloadManager::new(fetcher, &unpaced()).with_retry_policy(RetryPolicy::none())
    }

    #[test]
    fn test_filename_for() {
        assert_eq!(filename_for("2301.07041v1"), "2301.07041v1.pdf");
        assert_eq!(filename_for("cs.AI/0601001"), "cs.AI_0601001.pdf");
        assert_eq!(filename_for("a b:c"), "a_b_c.pdf");
        assert_eq!(filename_for("../x"), "_.._x.pdf");
        assert_eq!(filename_for(""), "_.pdf");
    }

    #[test]
    fn test_validate_pdf() {
        assert!(validate_pdf("p", b"%PDF-1.7\n...").is_ok());
        assert!(validate_pdf("p", b"<html>blocked</html>").is_err());
        assert!(validate_pdf("p", b"").is_err());
    }

    #[tokio::test]
    async fn test_present_and_absent() {
        let store = InMemoryPaperStore::new();
        store.insert("p1.pdf", b"%PDF-1.4 existing").await;

        let fetcher = Arc::new(
            CannedFetcher::default()
                .with("https://arxiv.org/pdf/p1.pdf", b"%PDF-1.4 new")
                .with("https://arxiv.org/pdf/p2.pdf", b"%PDF-1.4 p2"),
        );
        let report = manager(fetcher.clone())
            .sync(&[record("p1"), record("p2")], &store)
            .await;

        assert_eq!(report.downloaded, 1);
        assert_eq!(report.skipped, 1);
        assert!(report.failed.is_empty());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.get("p1.pdf").await.unwrap(), b"%PDF-1.4 existing");
        assert_eq!(store.get("p2.pdf").await.unwrap(), b"%PDF-1.4 p2");
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_batch() {
        let store = InMemoryPaperStore::new();
        store.fail_writes_to("p4.pdf").await;

        let fetcher = Arc::new(
            CannedFetcher::default()
                .with("https://arxiv.org/pdf/p1.pdf", b"%PDF-1.4 ok")
                .with("https://arxiv.org/pdf/p2.pdf", b"<html>captcha</html>")
                .with("https://arxiv.org/pdf/p4.pdf", b"%PDF-1.4 ok"),
        );
        let records = [record("p1"), record("p2"), record("p3"), record("p4")];
        let report = manager(fetcher).sync(&records, &store).await;

        assert_eq!(report.downloaded, 1);
        assert_eq!(report.skipped, 0);
        let failed: Vec<_> = report.failed.iter().map(|f| f.identifier.as_str()).collect();
        assert_eq!(failed, vec!["p2", "p3", "p4"]);
        assert_eq!(report.total(), records.len());
        assert!(!store.exists("p2.pdf").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicates_count_as_skipped() {
        let store = InMemoryPaperStore::new();
        let fetcher =
            Arc::new(CannedFetcher::default().with("https://arxiv.org/pdf/p1.pdf", b"%PDF-1.4"));

        let report = manager(fetcher.clone())
            .sync(&[record("p1"), record("p1")], &store)
            .await;

        assert_eq!(report.downloaded, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_pdf_under_cap_is_rejected() {
        let store = InMemoryPaperStore::new();
        let fetcher = Arc::new(
            CannedFetcher::default().with("https://arxiv.org/pdf/small.pdf", &vec![b'%'; 2048]),
        );
        let config = DownloadConfig {
            max_file_size_mb: 1,
            ..unpaced()
        };
        let manager = DownloadManager::new(fetcher, &config);
        assert_eq!(manager.max_file_size, 1024 * 1024);

        let report = manager.sync(&[record("small")], &store).await;
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].reason.contains("not a PDF"));
    }

    #[tokio::test]
    async fn test_body_over_cap_is_rejected() {
        let mut body = b"%PDF-1.4\n".to_vec();
        body.resize(1024 * 1024 + 1, b'0');

        let store = InMemoryPaperStore::new();
        let fetcher = Arc::new(
            CannedFetcher::default()
                .with("https://arxiv.org/pdf/big.pdf", &body)
                .with("https://arxiv.org/pdf/fits.pdf", &body[..1024 * 1024]),
        );
        let config = DownloadConfig {
            max_file_size_mb: 1,
            ..unpaced()
        };
        let report = DownloadManager::new(fetcher, &config)
            .with_retry_policy(RetryPolicy::none())
            .sync(&[record("big"), record("fits")], &store)
            .await;

        assert_eq!(report.downloaded, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].identifier, "big");
        assert!(report.failed[0].reason.contains("exceeds"));
        assert!(!store.exists("big.pdf").await.unwrap());
        assert!(store.exists("fits.pdf").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_are_paced() {
        let store = InMemoryPaperStore::new();
        let fetcher = Arc::new(
            CannedFetcher::default()
                .with("https://arxiv.org/pdf/p1.pdf", b"%PDF-1.4 p1")
                .with("https://arxiv.org/pdf/p2.pdf", b"%PDF-1.4 p2")
                .with("https://arxiv.org/pdf/p3.pdf", b"%PDF-1.4 p3"),
        );
        let config = DownloadConfig {
            requests_per_sec: 2.0,
            max_concurrent: 4,
            ..DownloadConfig::default()
        };
        let manager =
            DownloadManager::new(fetcher.clone(), &config).with_retry_policy(RetryPolicy::none());

        let start = tokio::time::Instant::now();
        let report = manager
            .sync(&[record("p1"), record("p2"), record("p3")], &store)
            .await;

        assert_eq!(report.downloaded, 3);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
        // three fetches at 2/s span two full intervals despite the free slots
        assert!(start.elapsed() >= std::time::Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let store = InMemoryPaperStore::new();
        let report = manager(Arc::new(CannedFetcher::default()))
            .sync(&[], &store)
            .await;
        assert_eq!(report, SyncReport::default());
    }
}
