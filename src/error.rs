use std::time::Duration;
use thiserror::Error;

/// Error taxonomy for the updater
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    // Discovery errors (abort the current cycle only)
    #[error("Discovery failed ({source_name}): {reason}")]
    Discovery { source_name: String, reason: String },

    // Download errors (aggregated per paper, never abort a batch)
    #[error("Download failed for {identifier}: {reason}")]
    Download { identifier: String, reason: String },

    // I/O errors (potentially transient)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors (usually permanent)
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    // Network errors (transient - should retry)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {code} from {url}")]
    HttpStatus { url: String, code: u16 },

    #[error("Rate limit exceeded: retry after {retry_after:?}")]
    RateLimitExceeded { retry_after: Duration },

    #[error("Timeout error: operation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    // Client errors (permanent - don't retry)
    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Parse error in {context}: {message}")]
    Parse { context: String, message: String },

    // General service error
    #[error("Service error: {0}")]
    Service(String),
}

/// Error categorization for retry strategies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Permanent errors - should not retry
    Permanent,
    /// Transient errors - safe to retry
    Transient,
    /// Rate limited - retry with backoff
    RateLimited,
}

impl Error {
    /// Categorize error for retry logic
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_)
            | Self::InvalidConfig { .. }
            | Self::InvalidInput { .. }
            | Self::Parse { .. }
            | Self::Serde(_)
            | Self::Download { .. }
            | Self::Service(_) => ErrorCategory::Permanent,

            Self::RateLimitExceeded { .. } => ErrorCategory::RateLimited,

            Self::HttpStatus { code, .. } => match *code {
                429 => ErrorCategory::RateLimited,
                500..=599 => ErrorCategory::Transient,
                _ => ErrorCategory::Permanent,
            },

            Self::Http(e) => {
                if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
                    ErrorCategory::Transient
                } else {
                    ErrorCategory::Permanent
                }
            }

            Self::Discovery { .. } | Self::Timeout { .. } | Self::Io(_) => {
                ErrorCategory::Transient
            }
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Transient | ErrorCategory::RateLimited
        )
    }

    /// Get suggested retry delay for rate limited errors
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitExceeded { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Whether the error belongs to the fatal startup class
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::InvalidConfig { .. })
    }

    pub(crate) fn invalid_config(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
