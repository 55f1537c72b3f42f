use crate::{Error, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, instrument};

/// Retrieves the raw bytes behind a download link
#[async_trait]
pub trait PdfFetcher: Send + Sync {
    /// Fetch `url`, failing once the body grows past `max_bytes`
    async fn fetch(&self, url: &str, max_bytes: u64) -> Result<Vec<u8>>;
}

/// `reqwest` backed fetcher
#[derive(Debug, Clone)]
pub struct HttpPdfFetcher {
    client: Client,
}

impl HttpPdfFetcher {
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    fn too_large(url: &str, max_bytes: u64) -> Error {
        Error::Download {
            identifier: url.to_string(),
            reason: format!("response exceeds {max_bytes} bytes"),
        }
    }

    fn retry_after(response: &reqwest::Response) -> Option<Duration> {
        response
            .headers()
            .get(RETRY_AFTER)?
            .to_str()
            .ok()?
            .trim()
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    }
}

#[async_trait]
impl PdfFetcher for HttpPdfFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str, max_bytes: u64) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            if let Some(retry_after) = Self::retry_after(&response) {
                return Err(Error::RateLimitExceeded { retry_after });
            }
        }
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                code: status.as_u16(),
            });
        }

        let declared = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if declared.is_some_and(|len| len > max_bytes) {
            return Err(Self::too_large(url, max_bytes));
        }

        let capacity = declared.map_or(0, |len| usize::try_from(len).unwrap_or(0));
        let mut body = Vec::with_capacity(capacity);
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if body.len() as u64 + chunk.len() as u64 > max_bytes {
                return Err(Self::too_large(url, max_bytes));
            }
            body.extend_from_slice(&chunk);
        }

        debug!("Fetched {} bytes from {}", body.len(), url);
        Ok(body)
    }
}
