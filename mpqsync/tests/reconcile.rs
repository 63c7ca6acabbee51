//! End-to-end reconciliation: verify, download, synchronize, verify again.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mpqsync::archive::ZipArchiveStore;
use mpqsync::digest::digest_bytes;
use mpqsync::download::{download_all, DownloadConfig, MirrorPlan};
use mpqsync::manifest::{Category, Manifest, ManifestEntry};
use mpqsync::state::StateStore;
use mpqsync::sync::{synchronize_archive, SyncOptions, SyncOutcome};
use mpqsync::verify::{outdated_entries, verify_manifest, EntryOutcome};

const SPELL_DATA: &[u8] = b"spell table contents";

fn spell_manifest(server_uri: &str) -> Manifest {
    Manifest {
        entries: vec![ManifestEntry {
            name: "Spells/fire.dbc".to_string(),
            digest: digest_bytes(SPELL_DATA),
            size: SPELL_DATA.len() as u64,
            category: Category::Archived {
                key: "8".to_string(),
            },
            mirrors: BTreeMap::from([(
                "r2eu".to_string(),
                format!("{server_uri}/Spells/fire.dbc"),
            )]),
        }],
    }
}

fn reconcile_once(
    manifest: &Manifest,
    game_dir: &Path,
    download_dir: &Path,
    state: &StateStore,
) -> (Vec<EntryOutcome>, usize, SyncOutcome) {
    let store = ZipArchiveStore::new();

    let statuses = verify_manifest(manifest, game_dir, &store);
    let outdated = outdated_entries(&statuses);

    let config = DownloadConfig::default()
        .with_workers(2)
        .with_max_retries(1)
        .with_base_delay(std::time::Duration::from_millis(1));
    let report = download_all(
        &outdated,
        download_dir,
        &MirrorPlan::default(),
        &config,
        state,
        None,
    );
    assert!(report.is_success());

    let expected = vec!["Spells\\fire.dbc".to_string()];
    let outcome = synchronize_archive(
        &store,
        &mpqsync::manifest::archive_path(game_dir, "8"),
        &expected,
        &download_dir.join("patch-8"),
        state,
        "8",
        &SyncOptions::default(),
    )
    .unwrap();

    let outcomes = verify_manifest(manifest, game_dir, &store)
        .iter()
        .map(|s| s.outcome)
        .collect();
    (outcomes, report.succeeded, outcome)
}

#[tokio::test]
async fn test_missing_member_converges_and_second_run_is_idle() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Spells/fire.dbc"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(SPELL_DATA))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let game_dir = temp.path().join("game");
    let download_dir = temp.path().join("downloads");
    std::fs::create_dir_all(&game_dir).unwrap();

    let manifest = spell_manifest(&server.uri());

    let results = tokio::task::spawn_blocking(move || {
        let state = StateStore::new(download_dir.join(".download_state.json"));

        // The archive does not exist yet, so the member is missing.
        let store = ZipArchiveStore::new();
        let before = verify_manifest(&manifest, &game_dir, &store);
        assert_eq!(before[0].outcome, EntryOutcome::Missing);

        let first = reconcile_once(&manifest, &game_dir, &download_dir, &state);
        let second = reconcile_once(&manifest, &game_dir, &download_dir, &state);
        (first, second)
    })
    .await
    .unwrap();

    let ((outcomes, downloaded, sync), (outcomes2, downloaded2, sync2)) = results;

    // First run downloads the file, builds the archive, and the member
    // verifies clean.
    assert_eq!(downloaded, 1);
    assert_eq!(sync, SyncOutcome::FullRebuild { count: 1 });
    assert_eq!(outcomes, vec![EntryOutcome::Ok]);

    // Second run converges without any new work.
    assert_eq!(downloaded2, 0);
    assert_eq!(sync2, SyncOutcome::NoOp);
    assert_eq!(outcomes2, vec![EntryOutcome::Ok]);
}

#[tokio::test]
async fn test_stale_member_is_replaced_in_place() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Spells/fire.dbc"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(SPELL_DATA))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let game_dir: PathBuf = temp.path().join("game");
    let download_dir = temp.path().join("downloads");
    std::fs::create_dir_all(game_dir.join("Data")).unwrap();

    let manifest = spell_manifest(&server.uri());

    let (outcomes, sync) = tokio::task::spawn_blocking(move || {
        // Seed an archive holding a stale version of the member.
        let store = ZipArchiveStore::new();
        let archive_path = mpqsync::manifest::archive_path(&game_dir, "8");
        {
            use mpqsync::archive::{ArchiveStore, OpenMode};
            let mut archive = store
                .open(&archive_path, OpenMode::Create, Some(1))
                .unwrap();
            archive
                .write_member("Spells\\fire.dbc", b"stale", true)
                .unwrap();
            archive.close().unwrap();
        }

        let before = verify_manifest(&manifest, &game_dir, &store);
        assert_eq!(before[0].outcome, EntryOutcome::SizeMismatch);

        let state = StateStore::new(download_dir.join(".download_state.json"));
        let (outcomes, _, sync) = reconcile_once(&manifest, &game_dir, &download_dir, &state);
        (outcomes, sync)
    })
    .await
    .unwrap();

    assert_eq!(
        sync,
        SyncOutcome::Incremental {
            added: 0,
            updated: 1,
            removed: 0,
            failed: 0
        }
    );
    assert_eq!(outcomes, vec![EntryOutcome::Ok]);
}
