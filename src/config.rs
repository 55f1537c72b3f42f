use crate::{Error, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Prefix for environment overrides, e.g. `PAPER_UPDATER__DISCOVERY__TOP_N=10`
pub const ENV_PREFIX: &str = "PAPER_UPDATER";

/// Shortcut environment variable for the Semantic Scholar API key
pub const API_KEY_ENV: &str = "SEMANTIC_SCHOLAR_API_KEY";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const VALID_LOG_FORMATS: [&str; 2] = ["pretty", "json"];

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub discovery: DiscoveryConfig,
    pub downloads: DownloadConfig,
    pub schedule: ScheduleConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
    pub service: ServiceConfig,
}

/// Paper discovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// arXiv Atom API endpoint
    pub arxiv_url: String,
    /// arXiv categories OR-ed together into the search query
    pub categories: Vec<String>,
    /// Number of candidates fetched from arXiv before ranking
    pub candidate_pool: u32,
    /// Number of papers kept after ranking
    pub top_n: usize,
    /// Prefix used to build PDF links from identifiers
    pub pdf_base_url: String,
    /// Rank candidates by Semantic Scholar citation counts
    pub rank_by_citations: bool,
    /// Semantic Scholar paper search endpoint
    pub semantic_scholar_url: String,
    /// Optional Semantic Scholar API key (sent as `x-api-key`)
    pub semantic_scholar_api_key: Option<String>,
    /// Pace of citation lookups
    pub citation_requests_per_sec: f64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            arxiv_url: "http://export.arxiv.org/api/query".to_string(),
            categories: ["cs.AI", "cs.LG", "cs.CL", "eess.AS", "stat.ML"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            candidate_pool: 50,
            top_n: 20,
            pdf_base_url: "https://arxiv.org/pdf".to_string(),
            rank_by_citations: true,
            semantic_scholar_url: "https://api.semanticscholar.org/graph/v1/paper/search"
                .to_string(),
            semantic_scholar_api_key: None,
            citation_requests_per_sec: 1.0,
        }
    }
}

/// Download directory and fetch behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Watched directory the QA application indexes
    pub directory: PathBuf,
    /// Maximum PDF fetches in flight
    pub max_concurrent: usize,
    /// Maximum accepted PDF size in megabytes
    pub max_file_size_mb: u64,
    /// Retries for transient fetch failures
    pub max_retries: u32,
    /// Write `metadata.json` after every cycle
    pub write_manifest: bool,
    /// Pace of PDF requests across all concurrent fetches
    pub requests_per_sec: f64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("pdfDatabase"),
            max_concurrent: 4,
            max_file_size_mb: 100,
            max_retries: 3,
            write_manifest: true,
            requests_per_sec: 2.0,
        }
    }
}

impl DownloadConfig {
    #[must_use]
    pub const fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

/// Timezone the daily run time is anchored in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleTimezone {
    #[default]
    Local,
    Utc,
}

/// Daily schedule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Wall-clock time of the daily run, `HH:MM` or `HH:MM:SS`
    pub run_at: String,
    pub timezone: ScheduleTimezone,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            run_at: "00:00".to_string(),
            timezone: ScheduleTimezone::Local,
        }
    }
}

impl ScheduleConfig {
    /// Parsed daily run time
    pub fn run_at_time(&self) -> Result<NaiveTime> {
        parse_run_at(&self.run_at)
    }
}

/// Parse a `HH:MM` or `HH:MM:SS` wall-clock time
pub fn parse_run_at(value: &str) -> Result<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|e| Error::invalid_config("schedule.run_at", format!("'{value}': {e}")))
}

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            connect_timeout_secs: 10,
            user_agent: concat!("ai-paper-updater/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl HttpConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
    /// Also append log lines to this file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Open the configured log file for appending, creating missing parents
    pub fn open_file(&self) -> Result<Option<std::fs::File>> {
        let Some(path) = &self.file else {
            return Ok(None);
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Some(file))
    }
}

/// Process-level settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// PID file location, defaults to `<download dir>/.paper-updater.pid`
    pub pid_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig::default(),
            downloads: DownloadConfig::default(),
            schedule: ScheduleConfig::default(),
            http: HttpConfig::default(),
            logging: LoggingConfig::default(),
            service: ServiceConfig::default(),
        }
    }
}

/// Command line overrides, applied last
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub download_directory: Option<PathBuf>,
    pub top_n: Option<usize>,
    pub run_at: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from defaults, an optional file and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_from(path, None)
    }

    /// Load configuration, reading environment overrides from `env` instead of
    /// the process environment when given
    pub fn load_from(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        match path {
            Some(path) => {
                builder = builder.add_source(config::File::from(path).required(true));
            }
            None => {
                if let Some(path) = Self::source_path(None) {
                    builder = builder.add_source(config::File::from(path).required(false));
                }
            }
        }

        let api_key = match &env {
            Some(vars) => vars.get(API_KEY_ENV).cloned(),
            None => std::env::var(API_KEY_ENV).ok(),
        };

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("discovery.categories")
                .source(env),
        );

        let mut config: Self = builder.build()?.try_deserialize()?;

        if config.discovery.semantic_scholar_api_key.is_none() {
            config.discovery.semantic_scholar_api_key =
                api_key.filter(|key| !key.trim().is_empty());
        }

        debug!("Loaded configuration: {:?}", config.redacted());
        Ok(config)
    }

    /// `<config dir>/paper-updater/config.toml`
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("paper-updater").join("config.toml"))
    }

    /// The file `load` reads: the explicit path, else the default path when it exists
    #[must_use]
    pub fn source_path(explicit: Option<&Path>) -> Option<PathBuf> {
        match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|p| p.exists()),
        }
    }

    /// Apply command line overrides
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref dir) = overrides.download_directory {
            self.downloads.directory.clone_from(dir);
        }
        if let Some(top_n) = overrides.top_n {
            self.discovery.top_n = top_n;
        }
        if let Some(ref run_at) = overrides.run_at {
            self.schedule.run_at.clone_from(run_at);
        }
        if let Some(ref level) = overrides.log_level {
            self.logging.level.clone_from(level);
        }
        if let Some(ref format) = overrides.log_format {
            self.logging.format.clone_from(format);
        }
        if let Some(ref file) = overrides.log_file {
            self.logging.file = Some(file.clone());
        }
    }

    /// Reject configurations the updater cannot run with
    pub fn validate(&self) -> Result<()> {
        let discovery = &self.discovery;
        if discovery.top_n == 0 {
            return Err(Error::invalid_config(
                "discovery.top_n",
                "must be greater than zero",
            ));
        }
        if discovery.top_n > discovery.candidate_pool as usize {
            return Err(Error::invalid_config(
                "discovery.top_n",
                format!(
                    "{} exceeds candidate_pool ({})",
                    discovery.top_n, discovery.candidate_pool
                ),
            ));
        }
        if discovery.categories.iter().all(|c| c.trim().is_empty()) {
            return Err(Error::invalid_config(
                "discovery.categories",
                "at least one arXiv category is required",
            ));
        }
        for (field, value) in [
            ("discovery.arxiv_url", &discovery.arxiv_url),
            ("discovery.pdf_base_url", &discovery.pdf_base_url),
            ("discovery.semantic_scholar_url", &discovery.semantic_scholar_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| Error::invalid_config(field, format!("'{value}': {e}")))?;
        }
        if discovery.rank_by_citations
            && !(discovery.citation_requests_per_sec.is_finite()
                && discovery.citation_requests_per_sec > 0.0)
        {
            return Err(Error::invalid_config(
                "discovery.citation_requests_per_sec",
                "must be a positive number",
            ));
        }

        if self.downloads.directory.as_os_str().is_empty() {
            return Err(Error::invalid_config(
                "downloads.directory",
                "cannot be empty",
            ));
        }
        if self.downloads.max_concurrent == 0 {
            return Err(Error::invalid_config(
                "downloads.max_concurrent",
                "must be at least 1",
            ));
        }
        if self.downloads.max_file_size_mb == 0 {
            return Err(Error::invalid_config(
                "downloads.max_file_size_mb",
                "must be greater than zero",
            ));
        }
        if !(self.downloads.requests_per_sec.is_finite() && self.downloads.requests_per_sec > 0.0)
        {
            return Err(Error::invalid_config(
                "downloads.requests_per_sec",
                "must be a positive number",
            ));
        }

        self.schedule.run_at_time()?;

        if self.http.timeout_secs == 0 {
            return Err(Error::invalid_config(
                "http.timeout_secs",
                "must be greater than zero",
            ));
        }
        if self.http.connect_timeout_secs == 0 {
            return Err(Error::invalid_config(
                "http.connect_timeout_secs",
                "must be greater than zero",
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::invalid_config(
                "logging.level",
                format!(
                    "'{}' is not one of {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            ));
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(Error::invalid_config(
                "logging.format",
                format!("'{}' must be pretty or json", self.logging.format),
            ));
        }
        if self
            .logging
            .file
            .as_ref()
            .is_some_and(|file| file.as_os_str().is_empty())
        {
            return Err(Error::invalid_config("logging.file", "cannot be empty"));
        }

        Ok(())
    }

    /// PID file location
    #[must_use]
    pub fn pid_file_path(&self) -> PathBuf {
        self.service
            .pid_file
            .clone()
            .unwrap_or_else(|| self.downloads.directory.join(".paper-updater.pid"))
    }

    /// Copy safe for logging
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.discovery.semantic_scholar_api_key.is_some() {
            copy.discovery.semantic_scholar_api_key = Some("***".to_string());
        }
        copy
    }
}
