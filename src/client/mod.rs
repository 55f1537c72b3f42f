pub mod fetcher;
pub mod providers;
pub mod rate_limiter;

pub use fetcher::{HttpPdfFetcher, PdfFetcher};
pub use rate_limiter::RateLimiter;

use crate::config::HttpConfig;
use crate::{Error, Result};
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

/// HTTP client configuration shared by every outbound request
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout duration
    pub timeout: Duration,
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Maximum redirects to follow
    pub max_redirects: usize,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self::from(&HttpConfig::default())
    }
}

impl From<&HttpConfig> for HttpClientConfig {
    fn from(config: &HttpConfig) -> Self {
        Self {
            timeout: config.timeout(),
            connect_timeout: config.connect_timeout(),
            max_redirects: 10,
            user_agent: config.user_agent.clone(),
        }
    }
}

impl HttpClientConfig {
    /// Build a `reqwest` client from this configuration
    pub fn build_client(&self) -> Result<Client> {
        Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(self.max_redirects))
            .user_agent(&self.user_agent)
            .build()
            .map_err(|e| Error::Service(format!("Failed to create HTTP client: {e}")))
    }
}

/// arXiv identifier wrapper for type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArxivId(String);

fn arxiv_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // 2301.07041v2 | cs.AI/0601001 | hep-th/9901001v1
        Regex::new(r"^(\d{4}\.\d{4,5}|[a-z][a-z-]*(\.[A-Z]{2})?/\d{7})(v\d+)?$")
            .expect("arXiv id pattern is valid")
    })
}

impl ArxivId {
    /// Create a new arXiv id, validating the format
    pub fn new(id: &str) -> Result<Self> {
        let cleaned = id
            .trim()
            .trim_start_matches("arXiv:")
            .trim_start_matches("arxiv:");

        if cleaned.is_empty() {
            return Err(Error::InvalidInput {
                field: "arxiv_id".to_string(),
                reason: "arXiv id cannot be empty".to_string(),
            });
        }

        if !arxiv_id_pattern().is_match(cleaned) {
            return Err(Error::InvalidInput {
                field: "arxiv_id".to_string(),
                reason: format!("'{cleaned}' is not a valid arXiv identifier"),
            });
        }

        Ok(Self(cleaned.to_string()))
    }

    /// Extract the identifier from an Atom `<id>` such as
    /// `http://arxiv.org/abs/2301.07041v1`
    pub fn from_abs_url(url: &str) -> Result<Self> {
        let tail = url.trim().rsplit("abs/").next().unwrap_or_default();
        Self::new(tail)
    }

    /// Get the id string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Id without the `vN` revision suffix
    #[must_use]
    pub fn without_version(&self) -> &str {
        match self.0.rfind('v') {
            Some(pos)
                if pos + 1 < self.0.len()
                    && self.0[pos + 1..].bytes().all(|b| b.is_ascii_digit()) =>
            {
                &self.0[..pos]
            }
            _ => &self.0,
        }
    }

    /// PDF link under the given base, e.g. `https://arxiv.org/pdf/2301.07041v1.pdf`
    #[must_use]
    pub fn pdf_url(&self, base: &str) -> String {
        format!("{}/{}.pdf", base.trim_end_matches('/'), self.0)
    }
}

impl std::fmt::Display for ArxivId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One paper selected by discovery, created fresh each run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperRecord {
    /// Human-readable title, whitespace collapsed
    pub title: String,
    /// Stable identifier (arXiv id)
    pub identifier: String,
    /// Direct PDF link
    pub download_url: String,
    /// Publication timestamp as reported by arXiv
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    /// Citation count used for ranking, 0 when unknown
    #[serde(default)]
    pub citations: u64,
}

impl PaperRecord {
    #[must_use]
    pub fn new(title: &str, identifier: &str, download_url: &str) -> Self {
        Self {
            title: normalize_title(title),
            identifier: identifier.to_string(),
            download_url: download_url.to_string(),
            published: None,
            citations: 0,
        }
    }
}

/// Trim and collapse internal whitespace (arXiv titles wrap across lines)
#[must_use]
pub fn normalize_title(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ")
}
