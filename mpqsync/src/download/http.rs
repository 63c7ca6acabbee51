//! Single-file HTTP download with atomic commit.
//!
//! The response body is streamed to a `.tmp` sibling of the destination.
//! Only after the full body is written - and verified against the expected
//! size and digest - is the temp file renamed into place. A failure at any
//! point removes the temp file and leaves the destination untouched, so an
//! interrupted download never leaves partial data at the final path.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;

use crate::digest::{digest_file, Digest};

use super::error::{DownloadError, DownloadResult};

/// Default timeout for a single download attempt (5 minutes: bodies can be
/// multi-gigabyte archive files).
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Buffer size for streaming downloads (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Blocking HTTP downloader for file bodies.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: Client,
    timeout: Duration,
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }
}

impl HttpDownloader {
    /// Create a downloader with the given per-attempt timeout.
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mpqsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("failed to build HTTP client");
        Self { client, timeout }
    }

    /// Per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Download `url` to `dest`, committing atomically.
    ///
    /// The size check always runs when `expected_size` is nonzero; the
    /// digest check runs when `expected` is provided. Returns the number of
    /// bytes written.
    ///
    /// # Errors
    ///
    /// Any network, I/O, size, or digest failure. On error the temp file is
    /// removed and a pre-existing `dest` is left as it was.
    pub fn fetch(
        &self,
        url: &str,
        dest: &Path,
        expected_size: u64,
        expected: Option<&Digest>,
    ) -> DownloadResult<u64> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| DownloadError::CreateDirFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let temp_path = temp_sibling(dest);
        let result = self.fetch_to_temp(url, dest, &temp_path, expected_size, expected);
        if result.is_err() {
            fs::remove_file(&temp_path).ok();
        }
        result
    }

    fn fetch_to_temp(
        &self,
        url: &str,
        dest: &Path,
        temp_path: &Path,
        expected_size: u64,
        expected: Option<&Digest>,
    ) -> DownloadResult<u64> {
        let mut response = self.client.get(url).send().map_err(|e| {
            if e.is_timeout() {
                DownloadError::Timeout {
                    url: url.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                }
            } else {
                DownloadError::Request {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        if !response.status().is_success() {
            return Err(DownloadError::Request {
                url: url.to_string(),
                reason: format!("request failed with status {}", response.status()),
            });
        }

        let file = File::create(temp_path).map_err(|e| DownloadError::WriteFailed {
            path: temp_path.to_path_buf(),
            source: e,
        })?;
        let mut writer = BufWriter::new(file);
        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut downloaded: u64 = 0;

        loop {
            let bytes_read = response.read(&mut buffer).map_err(|e| {
                if e.kind() == std::io::ErrorKind::TimedOut {
                    DownloadError::Timeout {
                        url: url.to_string(),
                        timeout_secs: self.timeout.as_secs(),
                    }
                } else {
                    DownloadError::Request {
                        url: url.to_string(),
                        reason: format!("read error: {}", e),
                    }
                }
            })?;
            if bytes_read == 0 {
                break;
            }
            writer
                .write_all(&buffer[..bytes_read])
                .map_err(|e| DownloadError::WriteFailed {
                    path: temp_path.to_path_buf(),
                    source: e,
                })?;
            downloaded += bytes_read as u64;
        }

        writer.flush().map_err(|e| DownloadError::WriteFailed {
            path: temp_path.to_path_buf(),
            source: e,
        })?;
        drop(writer);

        if expected_size > 0 && downloaded != expected_size {
            return Err(DownloadError::SizeMismatch {
                expected: expected_size,
                actual: downloaded,
            });
        }

        if let Some(expected) = expected {
            let actual = digest_file(temp_path).map_err(|e| DownloadError::WriteFailed {
                path: temp_path.to_path_buf(),
                source: e,
            })?;
            if actual != *expected {
                return Err(DownloadError::HashMismatch {
                    expected: *expected,
                    actual,
                });
            }
        }

        fs::rename(temp_path, dest).map_err(|e| DownloadError::WriteFailed {
            path: dest.to_path_buf(),
            source: e,
        })?;

        tracing::debug!(url, dest = %dest.display(), bytes = downloaded, "download committed");
        Ok(downloaded)
    }
}

/// `dest` with `.tmp` appended, e.g. `fire.dbc` -> `fire.dbc.tmp`.
fn temp_sibling(dest: &Path) -> PathBuf {
    let mut os = dest.to_path_buf().into_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}
