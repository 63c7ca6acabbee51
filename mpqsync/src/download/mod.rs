//! Concurrent, multi-mirror downloader.
//!
//! # Architecture
//!
//! ```text
//! outdated entries ──► work queue ──► worker threads (N)
//!                                          │ download_entry:
//!                                          │   cached check → mirrors → retries
//!                                          │
//!                                    result channel
//!                                          │
//!                                     aggregator ──► StateStore (per success)
//!                                          │
//!                                   DownloadReport
//! ```
//!
//! Workers only download and report; a single aggregator owns every mutable
//! counter and the failure list, so the only lock in the hot path is the
//! state store's own write serialization.

mod error;
mod http;
mod mirror;
mod pool;
mod task;

pub use error::{DownloadError, DownloadResult, FailReason};
pub use http::{HttpDownloader, DEFAULT_TIMEOUT_SECS};
pub use mirror::{MirrorPlan, DEFAULT_MIRROR, DEFAULT_MIRROR_ORDER};
pub use pool::{download_all, DownloadReport, ProgressEvent};
pub use task::{download_entry, staging_path, TaskOutcome};

use std::time::Duration;

/// Default number of parallel download workers.
pub const DEFAULT_WORKERS: usize = 10;

/// Default retry attempts per mirror.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Downloader configuration.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Parallel worker count.
    pub workers: usize,
    /// Attempts per mirror before advancing to the next.
    pub max_retries: u32,
    /// Base delay for exponential backoff between attempts.
    pub base_delay: Duration,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Whether to verify digests after each download.
    pub verify: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            verify: true,
        }
    }
}

impl DownloadConfig {
    /// Set the worker count (minimum 1).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set retry attempts per mirror (minimum 1).
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Set the backoff base delay.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable or disable digest verification.
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }
}
