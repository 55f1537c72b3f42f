use super::traits::{CitationSource, ProviderError};
use crate::config::DiscoveryConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchHit {
    #[serde(default)]
    citation_count: Option<u64>,
}

/// Semantic Scholar paper search used for citation counts
pub struct SemanticScholarProvider {
    client: Client,
    search_url: String,
    api_key: Option<String>,
}

impl SemanticScholarProvider {
    #[must_use]
    pub fn new(client: Client, config: &DiscoveryConfig) -> Self {
        Self {
            client,
            search_url: config.semantic_scholar_url.clone(),
            api_key: config.semantic_scholar_api_key.clone(),
        }
    }

    fn parse_response(body: &str) -> Result<Option<u64>, ProviderError> {
        let response: SearchResponse = serde_json::from_str(body)
            .map_err(|e| ProviderError::Parse(format!("Invalid Semantic Scholar JSON: {e}")))?;

        Ok(response
            .data
            .into_iter()
            .next()
            .map(|hit| hit.citation_count.unwrap_or(0)))
    }
}

#[async_trait]
impl CitationSource for SemanticScholarProvider {
    fn name(&self) -> &str {
        "semantic_scholar"
    }

    async fn citation_count(&self, title: &str) -> Result<Option<u64>, ProviderError> {
        let mut request = self.client.get(&self.search_url).query(&[
            ("query", title),
            ("fields", "citationCount,title"),
            ("limit", "1"),
        ]);

        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(format!("Failed to read response: {e}")))?;

        let count = Self::parse_response(&body)?;
        debug!("Semantic Scholar: {:?} citations for '{}'", count, title);
        Ok(count)
    }
}
