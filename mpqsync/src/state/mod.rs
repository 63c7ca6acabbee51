//! Reconciliation state store.
//!
//! A small persisted JSON document recording what has been downloaded and
//! when each archive was last built. The downloader consults it to avoid
//! re-fetching files it already placed; the synchronizer compares its
//! per-archive snapshots against the live staging directory to skip rebuilds
//! that would be no-ops.
//!
//! Every save is whole-document and atomic (temp sibling + rename), so a
//! crash mid-write leaves the previous state intact. Writers from parallel
//! download workers are serialized through a single mutex: the store is
//! never read-modify-written by two workers interleaved.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::fsutil::{epoch_seconds, write_atomic};

/// Result type for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors writing persisted state.
///
/// Reading never errors: unreadable or corrupt state degrades to the
/// default document, because a damaged cache must not stop a run that can
/// simply re-verify.
#[derive(Debug)]
pub enum StateError {
    /// Failed to serialize the state document.
    Serialize(String),

    /// Failed to write the state file.
    WriteFailed { path: PathBuf, source: io::Error },
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serialize(reason) => write!(f, "failed to serialize state: {}", reason),
            Self::WriteFailed { path, source } => {
                write!(f, "failed to write state {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for StateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::WriteFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Record of one successful download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Digest of the downloaded content.
    pub hash: Digest,
    /// When the download completed, epoch seconds.
    pub downloaded_at: f64,
}

/// Snapshot of an archive build: the staging files it was built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
    /// When the archive was built, epoch seconds.
    pub built_at: Option<f64>,
    /// Relative staging path -> modification time at build.
    pub files: BTreeMap<String, f64>,
}

/// The persisted reconciliation document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// category label -> file name -> download record.
    #[serde(default)]
    pub files: BTreeMap<String, BTreeMap<String, FileRecord>>,
    /// archive key -> last build snapshot.
    #[serde(default)]
    pub builds: BTreeMap<String, BuildRecord>,
}

/// Handle to the on-disk reconciliation store.
///
/// Shared across download workers; all mutation goes through
/// [`update`](StateStore::update), which holds the store lock for the whole
/// load-modify-save cycle.
pub struct StateStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl StateStore {
    /// Create a store backed by the given file path.
    ///
    /// The file is created on first save; a missing file loads as the
    /// default document.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the current state.
    ///
    /// Missing, unreadable, or corrupt state yields the default document
    /// with a warning - never an error.
    pub fn load(&self) -> SyncState {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return SyncState::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "state unreadable, starting fresh");
                return SyncState::default();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "state corrupt, starting fresh");
                SyncState::default()
            }
        }
    }

    /// Save the whole document atomically.
    pub fn save(&self, state: &SyncState) -> StateResult<()> {
        let _guard = self.lock.lock().expect("state lock poisoned");
        self.save_locked(state)
    }

    /// Apply a mutation as a single critical section.
    pub fn update<F>(&self, mutate: F) -> StateResult<()>
    where
        F: FnOnce(&mut SyncState),
    {
        let _guard = self.lock.lock().expect("state lock poisoned");
        let mut state = self.load();
        mutate(&mut state);
        self.save_locked(&state)
    }

    /// Record a completed download for `(category, name)`.
    pub fn record_download(&self, category: &str, name: &str, digest: Digest) -> StateResult<()> {
        self.update(|state| {
            state.files.entry(category.to_string()).or_default().insert(
                name.to_string(),
                FileRecord {
                    hash: digest,
                    downloaded_at: epoch_seconds(),
                },
            );
        })
    }

    /// Record an archive build snapshot for `key`.
    pub fn record_build(&self, key: &str, files: BTreeMap<String, f64>) -> StateResult<()> {
        self.update(|state| {
            state.builds.insert(
                key.to_string(),
                BuildRecord {
                    built_at: Some(epoch_seconds()),
                    files,
                },
            );
        })
    }

    fn save_locked(&self, state: &SyncState) -> StateResult<()> {
        let json =
            serde_json::to_vec_pretty(state).map_err(|e| StateError::Serialize(e.to_string()))?;
        write_atomic(&self.path, &json).map_err(|e| StateError::WriteFailed {
            path: self.path.clone(),
            source: e,
        })
    }
}
