use crate::client::PaperRecord;
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during provider operations
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Map a transport failure to the matching variant
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Network(format!("Connection failed: {err}"))
        } else {
            Self::Network(format!("Request failed: {err}"))
        }
    }

    /// Map a non-success status to the matching variant
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimit,
            code => Self::Status(code),
        }
    }
}

/// Source of candidate papers
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Name used in logs and discovery errors
    fn name(&self) -> &str;

    /// Fetch up to `max_results` candidates in the source's own order
    async fn fetch_candidates(&self, max_results: u32) -> Result<Vec<PaperRecord>, ProviderError>;
}

/// Source of citation counts used for ranking
#[async_trait]
pub trait CitationSource: Send + Sync {
    fn name(&self) -> &str;

    /// Citation count of the best match for `title`, `None` when nothing matched
    async fn citation_count(&self, title: &str) -> Result<Option<u64>, ProviderError>;
}
