//! Error types for the downloader.

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::digest::Digest;

/// Result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;

/// Errors that can occur while downloading a single file.
#[derive(Debug)]
pub enum DownloadError {
    /// The HTTP request failed (connect, read, or non-success status).
    Request { url: String, reason: String },

    /// The request timed out.
    Timeout { url: String, timeout_secs: u64 },

    /// Failed to create the destination directory.
    CreateDirFailed { path: PathBuf, source: io::Error },

    /// Failed to write the downloaded content.
    WriteFailed { path: PathBuf, source: io::Error },

    /// The completed body does not have the expected size.
    SizeMismatch { expected: u64, actual: u64 },

    /// The completed body does not have the expected digest.
    ///
    /// This is a data problem on the serving mirror, not a transient
    /// network fault; retrying the same mirror cannot fix it.
    HashMismatch { expected: Digest, actual: Digest },
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request { url, reason } => write!(f, "failed to download {}: {}", url, reason),
            Self::Timeout { url, timeout_secs } => {
                write!(f, "request to {} timed out after {}s", url, timeout_secs)
            }
            Self::CreateDirFailed { path, source } => {
                write!(
                    f,
                    "failed to create directory {}: {}",
                    path.display(),
                    source
                )
            }
            Self::WriteFailed { path, source } => {
                write!(f, "failed to write {}: {}", path.display(), source)
            }
            Self::SizeMismatch { expected, actual } => {
                write!(f, "size mismatch: expected {} bytes, got {}", expected, actual)
            }
            Self::HashMismatch { expected, actual } => {
                write!(f, "hash mismatch: expected {}, got {}", expected, actual)
            }
        }
    }
}

impl std::error::Error for DownloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CreateDirFailed { source, .. } | Self::WriteFailed { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}

/// Why an entry ultimately failed, after mirrors and retries ran out.
///
/// Collected into the download report; each variant is distinguishable so
/// the caller can tell a flaky network from a CDN serving stale content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailReason {
    /// Network or local I/O failure.
    Network(String),
    /// Timed out.
    Timeout,
    /// Every completed attempt delivered the wrong size.
    SizeMismatch,
    /// Every completed attempt delivered the wrong content.
    HashMismatch,
    /// The entry advertises no mirror the plan knows about.
    NoMirror,
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(reason) => write!(f, "network error: {}", reason),
            Self::Timeout => write!(f, "timed out"),
            Self::SizeMismatch => write!(f, "size mismatch"),
            Self::HashMismatch => write!(f, "hash mismatch"),
            Self::NoMirror => write!(f, "no mirror available"),
        }
    }
}

impl From<&DownloadError> for FailReason {
    fn from(error: &DownloadError) -> Self {
        match error {
            DownloadError::Timeout { .. } => Self::Timeout,
            DownloadError::SizeMismatch { .. } => Self::SizeMismatch,
            DownloadError::HashMismatch { .. } => Self::HashMismatch,
            other => Self::Network(other.to_string()),
        }
    }
}
