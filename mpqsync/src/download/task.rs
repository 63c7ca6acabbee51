//! Per-entry download with mirror fallback and retry.
//!
//! The retry loop distinguishes two failure classes. Transient network
//! faults (connect errors, timeouts, bad statuses) are retried against the
//! same mirror with exponential backoff and jitter. A digest mismatch on a
//! completed body is a data problem on that mirror - retrying it cannot
//! help, so the loop advances to the next mirror immediately.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;

use crate::digest::digest_file;
use crate::manifest::ManifestEntry;

use super::error::{DownloadError, FailReason};
use super::http::HttpDownloader;
use super::mirror::MirrorPlan;
use super::DownloadConfig;

/// Outcome of downloading one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Downloaded and verified via the named mirror.
    Success { mirror: String },
    /// The destination already held the expected content; no network
    /// activity happened.
    Cached,
    /// Every candidate mirror failed.
    Failed { reason: FailReason },
}

/// Staging destination for an entry: `<root>/<category label>/<name>`.
pub fn staging_path(dest_root: &Path, entry: &ManifestEntry) -> PathBuf {
    dest_root.join(entry.category.label()).join(&entry.name)
}

/// Download one manifest entry into the staging directory.
pub fn download_entry(
    downloader: &HttpDownloader,
    entry: &ManifestEntry,
    dest_root: &Path,
    plan: &MirrorPlan,
    config: &DownloadConfig,
) -> TaskOutcome {
    let dest = staging_path(dest_root, entry);

    // Idempotence: correct content already in place short-circuits before
    // any mirror is contacted.
    if dest.is_file() {
        if let Ok(actual) = digest_file(&dest) {
            if actual == entry.digest {
                tracing::debug!(name = %entry.name, "already downloaded");
                return TaskOutcome::Cached;
            }
        }
    }

    let candidates = plan.candidates(entry);
    if candidates.is_empty() {
        return TaskOutcome::Failed {
            reason: FailReason::NoMirror,
        };
    }

    let expected = config.verify.then_some(&entry.digest);
    let mut last_reason = FailReason::NoMirror;

    for (mirror, url) in candidates {
        for attempt in 0..config.max_retries {
            match downloader.fetch(url, &dest, entry.size, expected) {
                Ok(_) => {
                    tracing::debug!(name = %entry.name, mirror, "downloaded");
                    return TaskOutcome::Success {
                        mirror: mirror.to_string(),
                    };
                }
                Err(e @ DownloadError::HashMismatch { .. }) => {
                    tracing::warn!(name = %entry.name, mirror, error = %e, "mirror serves bad data, advancing");
                    last_reason = FailReason::from(&e);
                    break;
                }
                Err(e) => {
                    tracing::debug!(name = %entry.name, mirror, attempt, error = %e, "attempt failed");
                    last_reason = FailReason::from(&e);
                    if attempt + 1 < config.max_retries {
                        std::thread::sleep(backoff_delay(config.base_delay, attempt));
                    }
                }
            }
        }
    }

    TaskOutcome::Failed {
        reason: last_reason,
    }
}

/// Exponential backoff with jitter: `base * 2^attempt + uniform[0, 1)`
/// seconds. The jitter term is a fixed scale, not a multiple of the base,
/// so concurrent retries stay spread out even with sub-second bases.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponential = base.as_secs_f64() * f64::from(1u32 << attempt.min(16));
    let jitter: f64 = rand::rng().random_range(0.0..1.0);
    Duration::from_secs_f64(exponential + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::digest_bytes;
    use crate::manifest::Category;
    use std::collections::BTreeMap;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> DownloadConfig {
        DownloadConfig::default()
            .with_max_retries(3)
            .with_base_delay(Duration::from_millis(1))
    }

    fn entry(name: &str, data: &[u8], mirrors: BTreeMap<String, String>) -> ManifestEntry {
        ManifestEntry {
            name: name.to_string(),
            digest: digest_bytes(data),
            size: data.len() as u64,
            category: Category::Loose,
            mirrors,
        }
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let base = Duration::from_secs(1);
        let d0 = backoff_delay(base, 0);
        let d2 = backoff_delay(base, 2);
        assert!(d0 >= Duration::from_secs(1) && d0 < Duration::from_secs(2));
        assert!(d2 >= Duration::from_secs(4) && d2 < Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_scale_is_independent_of_base() {
        let base = Duration::from_millis(1);
        let max = (0..64).map(|_| backoff_delay(base, 0)).max().unwrap();

        // The jitter term spans up to a second even for a millisecond base.
        assert!(max >= Duration::from_millis(100));
        assert!(max < Duration::from_millis(1) + Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_cached_short_circuit_issues_no_requests() {
        let server = MockServer::start().await;
        // No mocks mounted: any request would 404 and the expect below
        // would catch it.
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(&b"payload"[..]))
            .expect(0)
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let mirrors = BTreeMap::from([(
            "r2eu".to_string(),
            format!("{}/file.bin", server.uri()),
        )]);
        let entry = entry("file.bin", b"payload", mirrors);
        std::fs::create_dir_all(temp.path().join("client")).unwrap();
        std::fs::write(temp.path().join("client/file.bin"), b"payload").unwrap();

        let root = temp.path().to_path_buf();
        let outcome = tokio::task::spawn_blocking(move || {
            download_entry(
                &HttpDownloader::default(),
                &entry,
                &root,
                &MirrorPlan::default(),
                &test_config(),
            )
        })
        .await
        .unwrap();

        assert_eq!(outcome, TaskOutcome::Cached);
    }

    #[tokio::test]
    async fn test_bad_mirror_falls_through_without_retry_exhaustion() {
        let bad = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(&b"corrupted body!"[..]))
            .expect(1) // hash mismatch must not be retried on this mirror
            .mount(&bad)
            .await;

        let good = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(&b"correct content"[..]))
            .mount(&good)
            .await;

        let temp = TempDir::new().unwrap();
        let mirrors = BTreeMap::from([
            ("r2eu".to_string(), format!("{}/file.bin", bad.uri())),
            ("bunny".to_string(), format!("{}/file.bin", good.uri())),
        ]);
        let entry = entry("file.bin", b"correct content", mirrors);

        let root = temp.path().to_path_buf();
        let outcome = tokio::task::spawn_blocking(move || {
            download_entry(
                &HttpDownloader::default(),
                &entry,
                &root,
                &MirrorPlan::default(),
                &test_config(),
            )
        })
        .await
        .unwrap();

        assert_eq!(
            outcome,
            TaskOutcome::Success {
                mirror: "bunny".to_string()
            }
        );
        assert_eq!(
            std::fs::read(temp.path().join("client/file.bin")).unwrap(),
            b"correct content"
        );
    }

    #[tokio::test]
    async fn test_transient_errors_retry_then_fail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3) // all retries consumed on the only mirror
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let mirrors = BTreeMap::from([(
            "r2eu".to_string(),
            format!("{}/file.bin", server.uri()),
        )]);
        let entry = entry("file.bin", b"never arrives", mirrors);

        let root = temp.path().to_path_buf();
        let outcome = tokio::task::spawn_blocking(move || {
            download_entry(
                &HttpDownloader::default(),
                &entry,
                &root,
                &MirrorPlan::default(),
                &test_config(),
            )
        })
        .await
        .unwrap();

        assert!(matches!(
            outcome,
            TaskOutcome::Failed {
                reason: FailReason::Network(_)
            }
        ));
        assert!(!temp.path().join("client/file.bin").exists());
    }

    #[test]
    fn test_no_mirror_available() {
        let temp = TempDir::new().unwrap();
        let entry = entry("file.bin", b"data", BTreeMap::new());

        let outcome = download_entry(
            &HttpDownloader::default(),
            &entry,
            temp.path(),
            &MirrorPlan::default(),
            &test_config(),
        );

        assert_eq!(
            outcome,
            TaskOutcome::Failed {
                reason: FailReason::NoMirror
            }
        );
    }
}
