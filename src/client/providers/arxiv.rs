use super::traits::{CandidateSource, ProviderError};
use crate::client::{normalize_title, ArxivId, PaperRecord};
use crate::config::DiscoveryConfig;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use url::Url;

/// arXiv API provider for candidate papers
pub struct ArxivProvider {
    client: Client,
    base_url: String,
    categories: Vec<String>,
    pdf_base_url: String,
}

impl ArxivProvider {
    /// Create a new arXiv provider on a shared HTTP client
    #[must_use]
    pub fn new(client: Client, config: &DiscoveryConfig) -> Self {
        Self {
            client,
            base_url: config.arxiv_url.clone(),
            categories: config
                .categories
                .iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            pdf_base_url: config.pdf_base_url.clone(),
        }
    }

    /// `(cat:cs.AI OR cat:cs.LG OR ...)`
    fn search_query(&self) -> String {
        let terms: Vec<String> = self
            .categories
            .iter()
            .map(|c| format!("cat:{c}"))
            .collect();
        format!("({})", terms.join(" OR "))
    }

    /// Build arXiv API URL for the newest papers across the configured categories
    fn build_search_url(&self, max_results: u32) -> Result<String, ProviderError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ProviderError::Other(format!("Invalid base URL: {e}")))?;

        url.query_pairs_mut()
            .append_pair("search_query", &self.search_query())
            .append_pair("sortBy", "lastUpdatedDate")
            .append_pair("sortOrder", "descending")
            .append_pair("start", "0")
            .append_pair("max_results", &max_results.to_string());

        Ok(url.to_string())
    }

    /// Parse arXiv Atom feed response
    fn parse_response(&self, response_text: &str) -> Result<Vec<PaperRecord>, ProviderError> {
        use roxmltree::Document;

        let doc = Document::parse(response_text)
            .map_err(|e| ProviderError::Parse(format!("Failed to parse XML: {e}")))?;

        if !doc.root_element().has_tag_name("feed") {
            return Err(ProviderError::Parse(format!(
                "Expected Atom <feed>, found <{}>",
                doc.root_element().tag_name().name()
            )));
        }

        let mut papers = Vec::new();

        for entry in doc.descendants().filter(|n| n.has_tag_name("entry")) {
            let mut id = None;
            let mut title = None;
            let mut published = None;

            for child in entry.children().filter(roxmltree::Node::is_element) {
                match child.tag_name().name() {
                    "id" => id = child.text(),
                    "title" => title = child.text().map(normalize_title),
                    "published" => published = child.text().map(|p| p.trim().to_string()),
                    _ => {}
                }
            }

            let Some(raw_id) = id else {
                warn!("Skipping arXiv entry without <id>");
                continue;
            };

            let arxiv_id = match ArxivId::from_abs_url(raw_id) {
                Ok(arxiv_id) => arxiv_id,
                Err(e) => {
                    warn!("Skipping arXiv entry {}: {}", raw_id.trim(), e);
                    continue;
                }
            };

            let Some(title) = title.filter(|t| !t.is_empty()) else {
                warn!("Skipping arXiv entry {} without a title", arxiv_id);
                continue;
            };

            papers.push(PaperRecord {
                title,
                download_url: arxiv_id.pdf_url(&self.pdf_base_url),
                identifier: arxiv_id.as_str().to_string(),
                published,
                citations: 0,
            });
        }

        debug!("Parsed {} papers from arXiv response", papers.len());
        Ok(papers)
    }
}

#[async_trait]
impl CandidateSource for ArxivProvider {
    fn name(&self) -> &str {
        "arxiv"
    }

    async fn fetch_candidates(&self, max_results: u32) -> Result<Vec<PaperRecord>, ProviderError> {
        let start_time = Instant::now();

        let url = self.build_search_url(max_results)?;
        debug!("arXiv search URL: {}", url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            error!("arXiv request failed: {}", e);
            ProviderError::from_reqwest(&e)
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(status.as_u16()));
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(format!("Failed to read response: {e}")))?;

        let papers = self.parse_response(&response_text)?;

        info!(
            "arXiv returned {} candidates in {:?}",
            papers.len(),
            start_time.elapsed()
        );
        Ok(papers)
    }
}
