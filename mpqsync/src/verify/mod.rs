//! Manifest-vs-actual verification.
//!
//! Walks the manifest and produces a per-entry status by consulting either
//! the filesystem (loose entries) or an archive handle (archived entries).
//! Verification is read-only: it never mutates the game directory, the
//! archives, or any persisted state.
//!
//! Entries inside the same archive are checked through a single read-only
//! handle. A failure to read one member is recorded as that entry's outcome
//! and never aborts the rest of the group - every manifest entry gets a
//! status, in manifest order.

mod report;

pub use report::{
    load_report, save_report, ReportEntry, ReportError, ReportResult, VerificationReport,
};

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::archive::{normalize_member, ArchiveStore, OpenMode};
use crate::digest::{digest_bytes, digest_file, Digest};
use crate::manifest::{archive_path, Category, Manifest, ManifestEntry};

/// Outcome of checking one manifest entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryOutcome {
    /// Size and digest both match.
    Ok,
    /// The file or archive member does not exist.
    Missing,
    /// Present, but the size differs (content was not hashed).
    SizeMismatch,
    /// Present with the right size, but the digest differs.
    HashMismatch,
    /// An I/O failure prevented checking the entry.
    Error,
}

/// Status of one manifest entry after verification.
#[derive(Debug, Clone)]
pub struct EntryStatus {
    pub entry: ManifestEntry,
    pub actual_digest: Option<Digest>,
    pub actual_size: Option<u64>,
    pub outcome: EntryOutcome,
}

impl EntryStatus {
    fn new(entry: &ManifestEntry, outcome: EntryOutcome) -> Self {
        Self {
            entry: entry.clone(),
            actual_digest: None,
            actual_size: None,
            outcome,
        }
    }

    /// Whether this entry needs to be downloaded.
    ///
    /// `Error` entries are not outdated: the local content could not be
    /// inspected, so replacing it is not known to be safe or necessary.
    pub fn is_outdated(&self) -> bool {
        matches!(
            self.outcome,
            EntryOutcome::Missing | EntryOutcome::SizeMismatch | EntryOutcome::HashMismatch
        )
    }
}

/// Verify every manifest entry against the game directory.
///
/// Output order matches manifest order.
pub fn verify_manifest(
    manifest: &Manifest,
    game_dir: &Path,
    store: &dyn ArchiveStore,
) -> Vec<EntryStatus> {
    let mut results: Vec<Option<EntryStatus>> = vec![None; manifest.entries.len()];

    // Group archived entries by key so each archive is opened once.
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    for (index, entry) in manifest.entries.iter().enumerate() {
        match &entry.category {
            Category::Loose => {
                results[index] = Some(verify_loose(entry, game_dir));
            }
            Category::Archived { key } => match groups.iter_mut().find(|(k, _)| k == key) {
                Some((_, indices)) => indices.push(index),
                None => groups.push((key.clone(), vec![index])),
            },
        }
    }

    for (key, indices) in groups {
        verify_group(manifest, game_dir, store, &key, &indices, &mut results);
    }

    results
        .into_iter()
        .map(|status| status.expect("every entry receives a status"))
        .collect()
}

fn verify_loose(entry: &ManifestEntry, game_dir: &Path) -> EntryStatus {
    let path = game_dir.join(&entry.name);
    let mut status = EntryStatus::new(entry, EntryOutcome::Missing);

    let metadata = match std::fs::metadata(&path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return status,
        Err(e) => {
            tracing::warn!(name = %entry.name, error = %e, "failed to stat file");
            status.outcome = EntryOutcome::Error;
            return status;
        }
    };

    status.actual_size = Some(metadata.len());
    if metadata.len() != entry.size {
        // Wrong size already rules the file out; hashing it is wasted work.
        status.outcome = EntryOutcome::SizeMismatch;
        return status;
    }

    match digest_file(&path) {
        Ok(actual) => {
            status.actual_digest = Some(actual);
            status.outcome = if actual == entry.digest {
                EntryOutcome::Ok
            } else {
                EntryOutcome::HashMismatch
            };
        }
        Err(e) => {
            tracing::warn!(name = %entry.name, error = %e, "failed to hash file");
            status.outcome = EntryOutcome::Error;
        }
    }

    status
}

fn verify_group(
    manifest: &Manifest,
    game_dir: &Path,
    store: &dyn ArchiveStore,
    key: &str,
    indices: &[usize],
    results: &mut [Option<EntryStatus>],
) {
    let path = archive_path(game_dir, key);

    if !store.exists(&path) {
        tracing::info!(archive = %path.display(), "archive missing, all members outdated");
        for &index in indices {
            results[index] = Some(EntryStatus::new(
                &manifest.entries[index],
                EntryOutcome::Missing,
            ));
        }
        return;
    }

    let mut archive = match store.open(&path, OpenMode::ReadOnly, None) {
        Ok(archive) => archive,
        Err(e) => {
            tracing::warn!(archive = %path.display(), error = %e, "failed to open archive");
            for &index in indices {
                results[index] = Some(EntryStatus::new(
                    &manifest.entries[index],
                    EntryOutcome::Error,
                ));
            }
            return;
        }
    };

    tracing::debug!(archive = %path.display(), members = indices.len(), "checking archive members");

    for &index in indices {
        let entry = &manifest.entries[index];
        let member = normalize_member(&entry.name);
        let mut status = EntryStatus::new(entry, EntryOutcome::Missing);

        if archive.has_member(&member) {
            match archive.read_member(&member) {
                Ok(data) => {
                    let actual = digest_bytes(&data);
                    status.actual_size = Some(data.len() as u64);
                    status.actual_digest = Some(actual);
                    status.outcome = if data.len() as u64 != entry.size {
                        EntryOutcome::SizeMismatch
                    } else if actual == entry.digest {
                        EntryOutcome::Ok
                    } else {
                        EntryOutcome::HashMismatch
                    };
                }
                Err(e) => {
                    tracing::warn!(name = %entry.name, error = %e, "failed to read member");
                    status.outcome = EntryOutcome::Error;
                }
            }
        }

        results[index] = Some(status);
    }
}

/// Per-category outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryCounts {
    pub ok: usize,
    pub missing: usize,
    pub size_mismatch: usize,
    pub hash_mismatch: usize,
    pub error: usize,
}

impl CategoryCounts {
    /// Entries that need downloading.
    pub fn outdated(&self) -> usize {
        self.missing + self.size_mismatch + self.hash_mismatch
    }
}

/// Verification summary grouped by category label.
#[derive(Debug, Clone, Default)]
pub struct VerifySummary {
    pub by_category: BTreeMap<String, CategoryCounts>,
}

impl VerifySummary {
    pub fn total_ok(&self) -> usize {
        self.by_category.values().map(|c| c.ok).sum()
    }

    pub fn total_outdated(&self) -> usize {
        self.by_category.values().map(|c| c.outdated()).sum()
    }
}

/// Summarize verification results per category.
pub fn summarize(statuses: &[EntryStatus]) -> VerifySummary {
    let mut summary = VerifySummary::default();
    for status in statuses {
        let counts = summary
            .by_category
            .entry(status.entry.category.label())
            .or_default();
        match status.outcome {
            EntryOutcome::Ok => counts.ok += 1,
            EntryOutcome::Missing => counts.missing += 1,
            EntryOutcome::SizeMismatch => counts.size_mismatch += 1,
            EntryOutcome::HashMismatch => counts.hash_mismatch += 1,
            EntryOutcome::Error => counts.error += 1,
        }
    }
    summary
}

/// The outdated subset of verification results, entries cloned out.
pub fn outdated_entries(statuses: &[EntryStatus]) -> Vec<ManifestEntry> {
    statuses
        .iter()
        .filter(|s| s.is_outdated())
        .map(|s| s.entry.clone())
        .collect()
}
