pub mod client;
pub mod config;
pub mod discovery;
pub mod download;
pub mod error;
pub mod pipeline;
pub mod repositories;
pub mod resilience;
pub mod scheduler;
pub mod service;

pub use client::{ArxivId, PaperRecord};
pub use config::{Config, ConfigOverrides};
pub use discovery::{Discover, PaperDiscoverer};
pub use download::{DownloadFailure, DownloadManager, SyncReport};
pub use error::{Error, Result};
pub use pipeline::{CycleReport, Manifest, UpdatePipeline};
pub use repositories::{FsPaperStore, InMemoryPaperStore, PaperStore};
pub use resilience::{RetryConfig, RetryPolicy};
pub use scheduler::{Clock, CycleRunner, SchedulerState, SystemClock, UpdateScheduler};
pub use service::{PidFile, RunMode, SignalHandler, UpdaterService};
