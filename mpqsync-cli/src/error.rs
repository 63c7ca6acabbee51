//! CLI error type.
//!
//! Every command returns `Result<(), CliError>`; main prints the error and
//! exits non-zero. Outdated files and failed downloads are modeled as errors
//! so scripts can rely on the exit status.

use std::fmt;
use std::io;
use std::path::PathBuf;

use mpqsync::manifest::ManifestError;
use mpqsync::verify::ReportError;

/// Errors surfaced to the user by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// The game directory does not contain the client executable.
    GameDir(PathBuf),

    /// Fetching or parsing the manifest failed.
    Manifest(ManifestError),

    /// Reading or writing the verification report failed.
    Report(ReportError),

    /// No verification report exists yet.
    NoReport(PathBuf),

    /// A filesystem operation failed.
    Io { context: String, source: io::Error },

    /// Verification found entries that need updating.
    Outdated(usize),

    /// One or more downloads failed after exhausting every mirror.
    DownloadsFailed(usize),

    /// One or more archives could not be synchronized.
    SyncFailed(usize),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GameDir(path) => {
                write!(f, "WoW.exe not found in {}", path.display())
            }
            Self::Manifest(e) => write!(f, "{}", e),
            Self::Report(e) => write!(f, "{}", e),
            Self::NoReport(path) => write!(
                f,
                "no verification report at {}; run 'check' first, or use --all",
                path.display()
            ),
            Self::Io { context, source } => write!(f, "{}: {}", context, source),
            Self::Outdated(count) => write!(f, "{} files are outdated", count),
            Self::DownloadsFailed(count) => write!(f, "{} downloads failed", count),
            Self::SyncFailed(count) => write!(f, "{} archives failed to synchronize", count),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Manifest(e) => Some(e),
            Self::Report(e) => Some(e),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ManifestError> for CliError {
    fn from(error: ManifestError) -> Self {
        Self::Manifest(error)
    }
}

impl From<ReportError> for CliError {
    fn from(error: ReportError) -> Self {
        Self::Report(error)
    }
}
