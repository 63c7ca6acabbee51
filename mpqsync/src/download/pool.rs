//! Bounded worker pool for parallel downloads.
//!
//! A fixed set of worker threads pulls entries from a shared queue and
//! emits one message per completed entry over an mpsc channel. The
//! aggregator on the calling thread owns all summary state: it increments
//! the completed count (monotonic, for progress percentages), records
//! successes into the reconciliation store, and collects failures.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use crate::manifest::ManifestEntry;
use crate::state::StateStore;

use super::error::FailReason;
use super::http::HttpDownloader;
use super::mirror::MirrorPlan;
use super::task::{download_entry, TaskOutcome};
use super::DownloadConfig;

/// Progress notification for one completed entry.
#[derive(Debug)]
pub struct ProgressEvent<'a> {
    /// Entries finished so far, this one included. Strictly increasing.
    pub completed: usize,
    /// Total entries in the run.
    pub total: usize,
    /// Name of the entry that just finished.
    pub name: &'a str,
    /// How it finished.
    pub outcome: &'a TaskOutcome,
}

impl ProgressEvent<'_> {
    /// Completion percentage.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.completed as f64 / self.total as f64) * 100.0
        }
    }
}

/// Summary of a download run.
#[derive(Debug, Default)]
pub struct DownloadReport {
    /// Entries fetched from a mirror.
    pub succeeded: usize,
    /// Entries already present with correct content.
    pub cached: usize,
    /// Entries that failed, with the reason for each.
    pub failed: Vec<(String, FailReason)>,
}

impl DownloadReport {
    /// The run succeeded iff nothing failed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Total entries processed.
    pub fn completed(&self) -> usize {
        self.succeeded + self.cached + self.failed.len()
    }
}

/// Download every entry using a bounded worker pool.
///
/// Each non-cached success is recorded into `state` before the next
/// progress event for it fires. Failures never abort sibling entries; they
/// are collected into the report.
pub fn download_all(
    entries: &[ManifestEntry],
    dest_root: &Path,
    plan: &MirrorPlan,
    config: &DownloadConfig,
    state: &StateStore,
    mut on_progress: Option<&mut dyn FnMut(&ProgressEvent<'_>)>,
) -> DownloadReport {
    let total = entries.len();
    let mut report = DownloadReport::default();
    if total == 0 {
        return report;
    }

    let queue: Arc<Mutex<VecDeque<(usize, ManifestEntry)>>> = Arc::new(Mutex::new(
        entries.iter().cloned().enumerate().collect(),
    ));
    let workers = config.workers.min(total).max(1);

    tracing::info!(total, workers, "starting download run");

    thread::scope(|scope| {
        let (sender, receiver) = mpsc::channel::<(usize, TaskOutcome)>();

        for _ in 0..workers {
            let queue = Arc::clone(&queue);
            let sender = sender.clone();
            scope.spawn(move || {
                let downloader = HttpDownloader::new(config.timeout);
                loop {
                    let next = queue.lock().expect("queue lock poisoned").pop_front();
                    let Some((index, entry)) = next else {
                        break;
                    };
                    let outcome = download_entry(&downloader, &entry, dest_root, plan, config);
                    if sender.send((index, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
        // The aggregator's receive loop ends when every worker has dropped
        // its sender clone.
        drop(sender);

        let mut completed = 0;
        for (index, outcome) in receiver {
            completed += 1;
            let entry = &entries[index];

            match &outcome {
                TaskOutcome::Success { mirror } => {
                    report.succeeded += 1;
                    tracing::debug!(name = %entry.name, mirror, "entry downloaded");
                    if let Err(e) = state.record_download(
                        &entry.category.label(),
                        &entry.name,
                        entry.digest,
                    ) {
                        tracing::warn!(name = %entry.name, error = %e, "failed to record download state");
                    }
                }
                TaskOutcome::Cached => {
                    report.cached += 1;
                }
                TaskOutcome::Failed { reason } => {
                    tracing::warn!(name = %entry.name, reason = %reason, "entry failed");
                    report.failed.push((entry.name.clone(), reason.clone()));
                }
            }

            if let Some(callback) = on_progress.as_deref_mut() {
                callback(&ProgressEvent {
                    completed,
                    total,
                    name: &entry.name,
                    outcome: &outcome,
                });
            }
        }
    });

    tracing::info!(
        succeeded = report.succeeded,
        cached = report.cached,
        failed = report.failed.len(),
        "download run finished"
    );
    report
}
