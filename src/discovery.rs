//! Paper discovery: newest arXiv candidates ranked by citation count.

use crate::client::providers::{
    ArxivProvider, CandidateSource, CitationSource, SemanticScholarProvider,
};
use crate::client::{PaperRecord, RateLimiter};
use crate::config::DiscoveryConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Produces the ranked list of papers for one update cycle
#[async_trait]
pub trait Discover: Send + Sync {
    /// At most `top_n` records, most prominent first
    async fn discover(&self) -> Result<Vec<PaperRecord>>;
}

/// Stable sort by citations (descending), drop repeated identifiers, keep `top_n`
#[must_use]
pub fn rank_papers(mut papers: Vec<PaperRecord>, top_n: usize) -> Vec<PaperRecord> {
    papers.sort_by(|a, b| b.citations.cmp(&a.citations));

    let mut seen = HashSet::new();
    papers.retain(|paper| seen.insert(paper.identifier.clone()));
    papers.truncate(top_n);
    papers
}

/// arXiv candidates ranked through a citation source
pub struct PaperDiscoverer {
    candidates: Arc<dyn CandidateSource>,
    citations: Option<Arc<dyn CitationSource>>,
    limiter: Mutex<RateLimiter>,
    candidate_pool: u32,
    top_n: usize,
}

impl PaperDiscoverer {
    #[must_use]
    pub fn new(
        candidates: Arc<dyn CandidateSource>,
        citations: Option<Arc<dyn CitationSource>>,
        config: &DiscoveryConfig,
    ) -> Self {
        Self {
            candidates,
            citations,
            limiter: Mutex::new(RateLimiter::new(config.citation_requests_per_sec)),
            candidate_pool: config.candidate_pool,
            top_n: config.top_n,
        }
    }

    /// arXiv plus Semantic Scholar (when ranking is enabled) on a shared client
    #[must_use]
    pub fn from_config(client: &Client, config: &DiscoveryConfig) -> Self {
        let candidates: Arc<dyn CandidateSource> =
            Arc::new(ArxivProvider::new(client.clone(), config));
        let citations = config.rank_by_citations.then(|| {
            Arc::new(SemanticScholarProvider::new(client.clone(), config)) as Arc<dyn CitationSource>
        });
        Self::new(candidates, citations, config)
    }

    /// Fill in citation counts; a failed lookup counts as zero
    async fn annotate_citations(&self, source: &dyn CitationSource, papers: &mut [PaperRecord]) {
        let mut by_title: HashMap<String, u64> = HashMap::new();
        let mut failures = 0usize;

        for paper in papers.iter_mut() {
            if let Some(count) = by_title.get(&paper.title) {
                paper.citations = *count;
                continue;
            }

            self.limiter.lock().await.acquire().await;

            let count = match source.citation_count(&paper.title).await {
                Ok(Some(count)) => count,
                Ok(None) => {
                    debug!("No {} match for '{}'", source.name(), paper.title);
                    0
                }
                Err(e) => {
                    failures += 1;
                    warn!("Citation lookup failed for {}: {}", paper.identifier, e);
                    0
                }
            };

            paper.citations = count;
            by_title.insert(paper.title.clone(), count);
        }

        if failures > 0 {
            warn!(
                "{} of {} citation lookups failed, ranked as zero",
                failures,
                papers.len()
            );
        }
    }
}

#[async_trait]
impl Discover for PaperDiscoverer {
    #[instrument(skip(self), fields(source = self.candidates.name(), top_n = self.top_n))]
    async fn discover(&self) -> Result<Vec<PaperRecord>> {
        let mut papers = self
            .candidates
            .fetch_candidates(self.candidate_pool)
            .await
            .map_err(|e| Error::Discovery {
                source_name: self.candidates.name().to_string(),
                reason: e.to_string(),
            })?;

        if papers.is_empty() {
            info!("No candidates returned");
            return Ok(papers);
        }

        if let Some(citations) = &self.citations {
            self.annotate_citations(citations.as_ref(), &mut papers)
                .await;
        }

        let ranked = rank_papers(papers, self.top_n);
        info!("Discovered {} papers", ranked.len());
        for (rank, paper) in ranked.iter().enumerate() {
            debug!(
                "#{} {} ({} citations): {}",
                rank + 1,
                paper.identifier,
                paper.citations,
                paper.title
            );
        }
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::providers::ProviderError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn paper(id: &str, citations: u64) -> PaperRecord {
        let mut record = PaperRecord::new(
            &format!("Title {id}"),
            id,
            &format!("https://arxiv.org/pdf/{id}.pdf"),
        );
        record.citations = citations;
        record
    }

    struct FixedCandidates(std::result::Result<Vec<PaperRecord>, u16>);

    #[async_trait]
    impl CandidateSource for FixedCandidates {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fetch_candidates(
            &self,
            max_results: u32,
        ) -> std::result::Result<Vec<PaperRecord>, ProviderError> {
            match &self.0 {
                Ok(papers) => Ok(papers.iter().take(max_results as usize).cloned().collect()),
                Err(code) => Err(ProviderError::Status(*code)),
            }
        }
    }

    /// Citation count parsed from the title suffix, failing for titles containing "fail"
    #[derive(Default)]
    struct TitleCitations {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CitationSource for TitleCitations {
        fn name(&self) -> &str {
            "title"
        }

        async fn citation_count(
            &self,
            title: &str,
        ) -> std::result::Result<Option<u64>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if title.contains("fail") {
                return Err(ProviderError::Timeout);
            }
            Ok(title.rsplit('-').next().and_then(|n| n.parse().ok()))
        }
    }

    fn config(top_n: usize) -> DiscoveryConfig {
        DiscoveryConfig {
            top_n,
            citation_requests_per_sec: 1000.0,
            ..DiscoveryConfig::default()
        }
    }

    #[test]
    fn test_rank_is_stable_and_deduplicated() {
        let ranked = rank_papers(
            vec![
                paper("a", 5),
                paper("b", 10),
                paper("c", 5),
                paper("b", 10),
                paper("d", 0),
            ],
            3,
        );
        let ids: Vec<_> = ranked.iter().map(|p| p.identifier.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_rank_shorter_than_top_n() {
        assert_eq!(rank_papers(vec![paper("a", 1)], 20).len(), 1);
        assert!(rank_papers(Vec::new(), 20).is_empty());
    }

    #[tokio::test]
    async fn test_discover_ranks_by_citations() {
        let candidates = vec![
            PaperRecord::new("low-3", "1", "u1"),
            PaperRecord::new("high-300", "2", "u2"),
            PaperRecord::new("fail", "3", "u3"),
            PaperRecord::new("mid-30", "4", "u4"),
            PaperRecord::new("mid-30", "5", "u5"),
        ];
        let citations = Arc::new(TitleCitations::default());
        let discoverer = PaperDiscoverer::new(
            Arc::new(FixedCandidates(Ok(candidates))),
            Some(citations.clone()),
            &config(3),
        );

        let papers = discoverer.discover().await.unwrap();
        let ids: Vec<_> = papers.iter().map(|p| p.identifier.as_str()).collect();
        assert_eq!(ids, vec!["2", "4", "5"]);
        assert_eq!(papers[0].citations, 300);
        // repeated title looked up once
        assert_eq!(citations.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_discover_without_ranking_keeps_source_order() {
        let candidates = vec![paper("a", 0), paper("b", 0), paper("c", 0)];
        let discoverer =
            PaperDiscoverer::new(Arc::new(FixedCandidates(Ok(candidates))), None, &config(2));

        let papers = discoverer.discover().await.unwrap();
        let ids: Vec<_> = papers.iter().map(|p| p.identifier.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_source_failure_is_discovery_error() {
        let discoverer = PaperDiscoverer::new(
            Arc::new(FixedCandidates(Err(503))),
            Some(Arc::new(TitleCitations::default())),
            &config(20),
        );

        let err = discoverer.discover().await.unwrap_err();
        assert!(matches!(err, Error::Discovery { ref source_name, .. } if source_name == "fixed"));
    }

    #[tokio::test]
    async fn test_empty_feed_is_not_an_error() {
        let discoverer = PaperDiscoverer::new(
            Arc::new(FixedCandidates(Ok(Vec::new()))),
            None,
            &config(20),
        );
        assert!(discoverer.discover().await.unwrap().is_empty());
    }
}
