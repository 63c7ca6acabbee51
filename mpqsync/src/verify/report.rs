//! Persisted verification report.
//!
//! The `check` phase writes its results to disk so a later `download` phase
//! can pick up the outdated set without re-hashing the whole installation.
//! The report is a plain JSON document, rewritten atomically.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::fsutil::write_atomic;
use crate::manifest::{Category, ManifestEntry};

use super::{EntryOutcome, EntryStatus};

/// Result type for report persistence.
pub type ReportResult<T> = Result<T, ReportError>;

/// Errors reading or writing a verification report.
#[derive(Debug)]
pub enum ReportError {
    /// Failed to read or write the report file.
    Io { path: String, source: io::Error },

    /// The report file exists but is not a valid report document.
    Parse { path: String, reason: String },

    /// A persisted category label is not recognized.
    InvalidCategory { name: String, label: String },
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "report I/O failed for {}: {}", path, source),
            Self::Parse { path, reason } => {
                write!(f, "failed to parse report {}: {}", path, reason)
            }
            Self::InvalidCategory { name, label } => {
                write!(f, "entry {} has unknown category {:?}", name, label)
            }
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// One persisted entry of a verification run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntry {
    pub name: String,
    pub expected_hash: Digest,
    pub expected_size: u64,
    pub category: String,
    pub outcome: EntryOutcome,
    #[serde(default)]
    pub mirrors: BTreeMap<String, String>,
}

/// A persisted verification run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationReport {
    pub entries: Vec<ReportEntry>,
}

impl VerificationReport {
    /// Build a report from live verification results.
    pub fn from_statuses(statuses: &[EntryStatus]) -> Self {
        let entries = statuses
            .iter()
            .map(|status| ReportEntry {
                name: status.entry.name.clone(),
                expected_hash: status.entry.digest,
                expected_size: status.entry.size,
                category: status.entry.category.label(),
                outcome: status.outcome,
                mirrors: status.entry.mirrors.clone(),
            })
            .collect();
        Self { entries }
    }

    /// Reconstruct the outdated manifest entries recorded in this report.
    ///
    /// # Errors
    ///
    /// Fails if a persisted category label cannot be parsed back.
    pub fn outdated_entries(&self) -> ReportResult<Vec<ManifestEntry>> {
        self.entries
            .iter()
            .filter(|e| {
                matches!(
                    e.outcome,
                    EntryOutcome::Missing | EntryOutcome::SizeMismatch | EntryOutcome::HashMismatch
                )
            })
            .map(|e| {
                let category = Category::from_label(&e.category).ok_or_else(|| {
                    ReportError::InvalidCategory {
                        name: e.name.clone(),
                        label: e.category.clone(),
                    }
                })?;
                Ok(ManifestEntry {
                    name: e.name.clone(),
                    digest: e.expected_hash,
                    size: e.expected_size,
                    category,
                    mirrors: e.mirrors.clone(),
                })
            })
            .collect()
    }
}

/// Write a verification report atomically.
pub fn save_report(path: &Path, statuses: &[EntryStatus]) -> ReportResult<()> {
    let report = VerificationReport::from_statuses(statuses);
    let json = serde_json::to_vec_pretty(&report).map_err(|e| ReportError::Parse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    write_atomic(path, &json).map_err(|e| ReportError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

/// Load a previously saved verification report.
pub fn load_report(path: &Path) -> ReportResult<VerificationReport> {
    let bytes = std::fs::read(path).map_err(|e| ReportError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    serde_json::from_slice(&bytes).map_err(|e| ReportError::Parse {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::digest_bytes;
    use tempfile::TempDir;

    fn status(name: &str, category: Category, outcome: EntryOutcome) -> EntryStatus {
        EntryStatus {
            entry: ManifestEntry {
                name: name.to_string(),
                digest: digest_bytes(name.as_bytes()),
                size: 42,
                category,
                mirrors: BTreeMap::from([(
                    "r2eu".to_string(),
                    format!("https://eu.example.com/{name}"),
                )]),
            },
            actual_digest: None,
            actual_size: None,
            outcome,
        }
    }

    #[test]
    fn test_report_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("check_results.json");

        let statuses = vec![
            status("WoW.exe", Category::Loose, EntryOutcome::Ok),
            status(
                "Spells/fire.dbc",
                Category::Archived {
                    key: "8".to_string(),
                },
                EntryOutcome::Missing,
            ),
        ];
        save_report(&path, &statuses).unwrap();

        let report = load_report(&path).unwrap();
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.entries[1].category, "patch-8");

        let outdated = report.outdated_entries().unwrap();
        assert_eq!(outdated.len(), 1);
        assert_eq!(outdated[0].name, "Spells/fire.dbc");
        assert_eq!(
            outdated[0].category,
            Category::Archived {
                key: "8".to_string()
            }
        );
        assert_eq!(outdated[0].mirrors.len(), 1);
    }

    #[test]
    fn test_load_missing_report_fails() {
        let temp = TempDir::new().unwrap();
        let result = load_report(&temp.path().join("nope.json"));
        assert!(matches!(result, Err(ReportError::Io { .. })));
    }

    #[test]
    fn test_load_corrupt_report_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let result = load_report(&path);
        assert!(matches!(result, Err(ReportError::Parse { .. })));
    }
}
