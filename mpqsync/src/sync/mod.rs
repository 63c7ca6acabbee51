//! Archive synchronizer.
//!
//! Reconciles one container archive against its staging directory: files
//! staged by the downloader become archive members, members the manifest no
//! longer lists are purged. Three outcomes, decided in order:
//!
//! 1. **NoOp** - the staging directory is byte-for-byte the set the archive
//!    was last built from (same paths, no newer mtimes), or there is
//!    nothing staged and no archive on disk. Zero archive I/O.
//! 2. **FullRebuild** - the archive is absent, or it holds suspiciously few
//!    members while the manifest expects many (a truncated or corrupt
//!    container). The container is discarded and rebuilt from staging.
//! 3. **Incremental** - everything else: one read-write handle, obsolete
//!    members removed, staged files inserted with replace semantics.
//!
//! The decision between rebuild and incremental reads the member count
//! through a short-lived read-only handle that is dropped before any
//! writable handle is opened. There are never two live handles to the same
//! archive.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::archive::{member_path, normalize_member, ArchiveError, ArchiveStore, OpenMode};
use crate::fsutil::scan_mtimes;
use crate::state::{BuildRecord, StateStore};

/// Result type for synchronizer operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that abort synchronization of one archive.
///
/// Per-member failures inside an incremental pass are not errors; they are
/// logged and tallied into the partial outcome. An error here means the
/// whole key failed (the container could not be opened, created, or
/// flushed), and the caller moves on to sibling archives.
#[derive(Debug)]
pub enum SyncError {
    /// An archive capability call failed.
    Archive(ArchiveError),

    /// Failed to scan the staging directory.
    Scan { path: PathBuf, source: io::Error },
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Archive(e) => write!(f, "archive operation failed: {}", e),
            Self::Scan { path, source } => {
                write!(f, "failed to scan {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Archive(e) => Some(e),
            Self::Scan { source, .. } => Some(source),
        }
    }
}

impl From<ArchiveError> for SyncError {
    fn from(error: ArchiveError) -> Self {
        Self::Archive(error)
    }
}

/// Default member-count floor below which a populated manifest implies a
/// damaged container.
pub const DEFAULT_REBUILD_MEMBER_FLOOR: usize = 100;

/// Default expected-count ceiling that must be exceeded for the floor to
/// apply.
pub const DEFAULT_REBUILD_EXPECTED_CEILING: usize = 1000;

/// Synchronizer options.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Skip the staleness check and always reconcile.
    pub force: bool,
    /// Member count below which an existing archive is considered damaged.
    pub rebuild_member_floor: usize,
    /// Expected member count above which the floor check applies.
    pub rebuild_expected_ceiling: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            force: false,
            rebuild_member_floor: DEFAULT_REBUILD_MEMBER_FLOOR,
            rebuild_expected_ceiling: DEFAULT_REBUILD_EXPECTED_CEILING,
        }
    }
}

impl SyncOptions {
    /// Enable or disable forced reconciliation.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Override the damaged-container heuristic thresholds.
    pub fn with_rebuild_thresholds(mut self, floor: usize, ceiling: usize) -> Self {
        self.rebuild_member_floor = floor;
        self.rebuild_expected_ceiling = ceiling;
        self
    }
}

/// What synchronizing one archive did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The archive already matches its last build snapshot. Nothing touched.
    NoOp,
    /// The archive was reconciled in place.
    Incremental {
        /// Members inserted that did not exist before.
        added: usize,
        /// Members overwritten with staged content.
        updated: usize,
        /// Obsolete members purged.
        removed: usize,
        /// Member operations that failed and were skipped.
        failed: usize,
    },
    /// The archive was rebuilt from scratch with this many members.
    FullRebuild { count: usize },
}

/// Synchronize the archive at `archive_path` with the files staged under
/// `source_dir`.
///
/// `expected_members` is the manifest's member list for this archive
/// (names in either separator convention; they are normalized here). It
/// drives the obsolete-member purge and the damaged-container heuristic.
/// The staged files drive insertion.
///
/// The build snapshot in `state` is refreshed only after a fully clean
/// pass; a partial pass leaves the old snapshot so the next run retries.
pub fn synchronize_archive(
    store: &dyn ArchiveStore,
    archive_path: &Path,
    expected_members: &[String],
    source_dir: &Path,
    state: &StateStore,
    key: &str,
    options: &SyncOptions,
) -> SyncResult<SyncOutcome> {
    let live = scan_mtimes(source_dir).map_err(|e| SyncError::Scan {
        path: source_dir.to_path_buf(),
        source: e,
    })?;

    if !options.force && store.exists(archive_path) {
        if let Some(snapshot) = state.load().builds.get(key) {
            if snapshot_is_current(snapshot, &live) {
                tracing::info!(key, "archive up to date, skipping");
                return Ok(SyncOutcome::NoOp);
            }
        }
    }

    // Nothing staged and no archive to reconcile: nothing to build.
    if live.is_empty() && !store.exists(archive_path) {
        tracing::warn!(key, "nothing staged and no archive, skipping");
        return Ok(SyncOutcome::NoOp);
    }

    let expected: BTreeSet<String> = expected_members
        .iter()
        .map(|name| normalize_member(name))
        .collect();

    let rebuild = if !store.exists(archive_path) {
        tracing::info!(key, "archive absent, building from scratch");
        true
    } else {
        let current = {
            let archive = store.open(archive_path, OpenMode::ReadOnly, None)?;
            archive.members().len()
        };
        if should_rebuild(current, expected.len(), options) {
            tracing::warn!(
                key,
                current,
                expected = expected.len(),
                "archive member count implausibly low, discarding"
            );
            store.delete(archive_path)?;
            true
        } else {
            false
        }
    };

    let (outcome, clean) = if rebuild {
        let (count, failed) = full_rebuild(store, archive_path, source_dir, &live)?;
        (SyncOutcome::FullRebuild { count }, failed == 0)
    } else {
        let outcome = incremental(store, archive_path, source_dir, &live, &expected)?;
        let clean = matches!(outcome, SyncOutcome::Incremental { failed: 0, .. });
        (outcome, clean)
    };

    if clean {
        if let Err(e) = state.record_build(key, live) {
            tracing::warn!(key, error = %e, "failed to record build snapshot");
        }
    } else {
        tracing::warn!(key, "partial pass, snapshot not recorded; next run will retry");
    }

    Ok(outcome)
}

/// The snapshot still describes the staging directory: same path set, and
/// no staged file modified since the build.
fn snapshot_is_current(snapshot: &BuildRecord, live: &BTreeMap<String, f64>) -> bool {
    if snapshot.files.len() != live.len() {
        return false;
    }
    live.iter().all(|(path, mtime)| {
        snapshot
            .files
            .get(path)
            .is_some_and(|recorded| mtime <= recorded)
    })
}

/// An existing archive holding far fewer members than the manifest expects
/// is damaged, not merely behind.
fn should_rebuild(current: usize, expected: usize, options: &SyncOptions) -> bool {
    current < options.rebuild_member_floor && expected > options.rebuild_expected_ceiling
}

fn full_rebuild(
    store: &dyn ArchiveStore,
    archive_path: &Path,
    source_dir: &Path,
    live: &BTreeMap<String, f64>,
) -> SyncResult<(usize, usize)> {
    let mut archive = store.open(archive_path, OpenMode::Create, Some(live.len().max(1)))?;
    let mut count = 0;
    let mut failed = 0;

    for rel in live.keys() {
        let member = member_path(Path::new(rel));
        let data = match std::fs::read(source_dir.join(rel)) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(member, error = %e, "failed to read staged file, skipping");
                failed += 1;
                continue;
            }
        };
        match archive.write_member(&member, &data, true) {
            Ok(()) => count += 1,
            Err(e) => {
                tracing::warn!(member, error = %e, "failed to write member, skipping");
                failed += 1;
            }
        }
    }

    archive.close()?;
    tracing::info!(path = %archive_path.display(), count, "archive rebuilt");
    Ok((count, failed))
}

fn incremental(
    store: &dyn ArchiveStore,
    archive_path: &Path,
    source_dir: &Path,
    live: &BTreeMap<String, f64>,
    expected: &BTreeSet<String>,
) -> SyncResult<SyncOutcome> {
    let mut archive = store.open(archive_path, OpenMode::ReadWrite, None)?;
    let mut added = 0;
    let mut updated = 0;
    let mut removed = 0;
    let mut failed = 0;

    for member in archive.members() {
        if !expected.contains(&member) {
            match archive.remove_member(&member) {
                Ok(()) => {
                    tracing::debug!(member, "obsolete member removed");
                    removed += 1;
                }
                Err(e) => {
                    tracing::warn!(member, error = %e, "failed to remove member, skipping");
                    failed += 1;
                }
            }
        }
    }

    for rel in live.keys() {
        let member = member_path(Path::new(rel));
        let data = match std::fs::read(source_dir.join(rel)) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(member, error = %e, "failed to read staged file, skipping");
                failed += 1;
                continue;
            }
        };
        let existed = archive.has_member(&member);
        match archive.write_member(&member, &data, true) {
            Ok(()) if existed => updated += 1,
            Ok(()) => added += 1,
            Err(e) => {
                tracing::warn!(member, error = %e, "failed to write member, skipping");
                failed += 1;
            }
        }
    }

    archive.close()?;
    tracing::info!(
        path = %archive_path.display(),
        added,
        updated,
        removed,
        failed,
        "archive reconciled"
    );
    Ok(SyncOutcome::Incremental {
        added,
        updated,
        removed,
        failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MemoryArchiveStore;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn stage(dir: &Path, rel: &str, data: &[u8]) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    }

    fn setup() -> (TempDir, MemoryArchiveStore, StateStore, PathBuf) {
        let temp = TempDir::new().unwrap();
        let store = MemoryArchiveStore::default();
        let state = StateStore::new(temp.path().join("state.json"));
        let archive_path = temp.path().join("Data/patch-8.mpq");
        (temp, store, state, archive_path)
    }

    #[test]
    fn test_absent_archive_full_rebuild() {
        let (temp, store, state, archive_path) = setup();
        let source = temp.path().join("staging");
        stage(&source, "Spells/fire.dbc", b"fire");
        stage(&source, "Interface/icon.blp", b"icon");
        let expected = vec!["Spells\\fire.dbc".to_string(), "Interface\\icon.blp".to_string()];

        let outcome = synchronize_archive(
            &store,
            &archive_path,
            &expected,
            &source,
            &state,
            "8",
            &SyncOptions::default(),
        )
        .unwrap();

        assert_eq!(outcome, SyncOutcome::FullRebuild { count: 2 });
        let archive = store.open(&archive_path, OpenMode::ReadOnly, None).unwrap();
        assert!(archive.has_member("Spells\\fire.dbc"));
        assert!(archive.has_member("Interface\\icon.blp"));
        assert!(state.load().builds["8"].built_at.is_some());
    }

    #[test]
    fn test_empty_staging_and_absent_archive_creates_nothing() {
        let (temp, store, state, archive_path) = setup();
        let source = temp.path().join("staging");
        std::fs::create_dir_all(&source).unwrap();
        let expected = vec!["Spells\\fire.dbc".to_string()];

        let outcome = synchronize_archive(
            &store,
            &archive_path,
            &expected,
            &source,
            &state,
            "8",
            &SyncOptions::default(),
        )
        .unwrap();

        assert_eq!(outcome, SyncOutcome::NoOp);
        assert!(!store.exists(&archive_path));
        assert!(state.load().builds.is_empty());
    }

    #[test]
    fn test_second_run_is_noop() {
        let (temp, store, state, archive_path) = setup();
        let source = temp.path().join("staging");
        stage(&source, "Spells/fire.dbc", b"fire");
        let expected = vec!["Spells\\fire.dbc".to_string()];
        let options = SyncOptions::default();

        let first = synchronize_archive(
            &store, &archive_path, &expected, &source, &state, "8", &options,
        )
        .unwrap();
        let second = synchronize_archive(
            &store, &archive_path, &expected, &source, &state, "8", &options,
        )
        .unwrap();

        assert_eq!(first, SyncOutcome::FullRebuild { count: 1 });
        assert_eq!(second, SyncOutcome::NoOp);
    }

    #[test]
    fn test_force_bypasses_staleness_check() {
        let (temp, store, state, archive_path) = setup();
        let source = temp.path().join("staging");
        stage(&source, "Spells/fire.dbc", b"fire");
        let expected = vec!["Spells\\fire.dbc".to_string()];

        synchronize_archive(
            &store,
            &archive_path,
            &expected,
            &source,
            &state,
            "8",
            &SyncOptions::default(),
        )
        .unwrap();
        let forced = synchronize_archive(
            &store,
            &archive_path,
            &expected,
            &source,
            &state,
            "8",
            &SyncOptions::default().with_force(true),
        )
        .unwrap();

        assert_eq!(
            forced,
            SyncOutcome::Incremental {
                added: 0,
                updated: 1,
                removed: 0,
                failed: 0
            }
        );
    }

    #[test]
    fn test_stale_snapshot_triggers_incremental() {
        let (temp, store, state, archive_path) = setup();
        let source = temp.path().join("staging");
        stage(&source, "Spells/fire.dbc", b"fire");
        let expected = vec!["Spells\\fire.dbc".to_string()];

        store.seed(&archive_path, &[("Spells\\fire.dbc", b"old")]);
        // Snapshot predates the staged file, so the run must reconcile.
        state
            .record_build("8", BTreeMap::from([("Spells/fire.dbc".to_string(), 0.0)]))
            .unwrap();

        let outcome = synchronize_archive(
            &store,
            &archive_path,
            &expected,
            &source,
            &state,
            "8",
            &SyncOptions::default(),
        )
        .unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Incremental {
                added: 0,
                updated: 1,
                removed: 0,
                failed: 0
            }
        );
        let mut archive = store.open(&archive_path, OpenMode::ReadOnly, None).unwrap();
        assert_eq!(archive.read_member("Spells\\fire.dbc").unwrap(), b"fire");
    }

    #[test]
    fn test_obsolete_members_purged() {
        let (temp, store, state, archive_path) = setup();
        let source = temp.path().join("staging");
        stage(&source, "Spells/fire.dbc", b"fire");
        let expected = vec!["Spells\\fire.dbc".to_string()];

        store.seed(
            &archive_path,
            &[("Spells\\fire.dbc", b"old" as &[u8]), ("old\\file.txt", b"gone")],
        );

        let outcome = synchronize_archive(
            &store,
            &archive_path,
            &expected,
            &source,
            &state,
            "8",
            &SyncOptions::default(),
        )
        .unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Incremental {
                added: 0,
                updated: 1,
                removed: 1,
                failed: 0
            }
        );
        let archive = store.open(&archive_path, OpenMode::ReadOnly, None).unwrap();
        assert!(!archive.has_member("old\\file.txt"));
    }

    #[test]
    fn test_missing_member_added_incrementally() {
        let (temp, store, state, archive_path) = setup();
        let source = temp.path().join("staging");
        stage(&source, "Spells/fire.dbc", b"fire");
        let expected = vec![
            "Spells\\fire.dbc".to_string(),
            "Interface\\icon.blp".to_string(),
        ];

        store.seed(&archive_path, &[("Interface\\icon.blp", b"icon")]);

        let outcome = synchronize_archive(
            &store,
            &archive_path,
            &expected,
            &source,
            &state,
            "8",
            &SyncOptions::default(),
        )
        .unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Incremental {
                added: 1,
                updated: 0,
                removed: 0,
                failed: 0
            }
        );
        let archive = store.open(&archive_path, OpenMode::ReadOnly, None).unwrap();
        assert!(archive.has_member("Spells\\fire.dbc"));
        assert!(archive.has_member("Interface\\icon.blp"));
    }

    #[test]
    fn test_implausibly_small_archive_discarded_and_rebuilt() {
        let (temp, store, state, archive_path) = setup();
        let source = temp.path().join("staging");
        stage(&source, "Spells/fire.dbc", b"fire");

        // 5 members on disk against 1200 expected: a damaged container.
        let names: Vec<String> = (0..5).map(|i| format!("m{i}.dbc")).collect();
        let seeded: Vec<(&str, &[u8])> = names.iter().map(|n| (n.as_str(), b"x" as &[u8])).collect();
        store.seed(&archive_path, &seeded);
        let expected: Vec<String> = (0..1200).map(|i| format!("e{i}.dbc")).collect();

        let outcome = synchronize_archive(
            &store,
            &archive_path,
            &expected,
            &source,
            &state,
            "8",
            &SyncOptions::default(),
        )
        .unwrap();

        assert_eq!(outcome, SyncOutcome::FullRebuild { count: 1 });
        let archive = store.open(&archive_path, OpenMode::ReadOnly, None).unwrap();
        assert_eq!(archive.members(), vec!["Spells\\fire.dbc".to_string()]);
    }

    #[test]
    fn test_rebuild_heuristic_thresholds() {
        let options = SyncOptions::default();
        assert!(should_rebuild(5, 1200, &options));
        assert!(!should_rebuild(5, 500, &options));
        assert!(!should_rebuild(300, 1200, &options));

        let tuned = SyncOptions::default().with_rebuild_thresholds(10, 50);
        assert!(should_rebuild(5, 100, &tuned));
    }

    #[test]
    fn test_snapshot_current_rules() {
        let snapshot = BuildRecord {
            built_at: Some(100.0),
            files: BTreeMap::from([("a.dbc".to_string(), 50.0)]),
        };

        let same = BTreeMap::from([("a.dbc".to_string(), 50.0)]);
        assert!(snapshot_is_current(&snapshot, &same));

        let newer = BTreeMap::from([("a.dbc".to_string(), 99.0)]);
        assert!(!snapshot_is_current(&snapshot, &newer));

        let extra = BTreeMap::from([
            ("a.dbc".to_string(), 50.0),
            ("b.dbc".to_string(), 10.0),
        ]);
        assert!(!snapshot_is_current(&snapshot, &extra));
    }
}
