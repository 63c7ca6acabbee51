//! Shared command context and console helpers.

use std::path::PathBuf;

use mpqsync::download::MirrorPlan;
use mpqsync::manifest::{fetch_manifest, Manifest};
use mpqsync::state::StateStore;

use crate::error::CliError;

/// File whose presence identifies a valid game installation.
pub const CLIENT_EXECUTABLE: &str = "WoW.exe";

/// Name of the persisted verification report inside the staging directory.
pub const REPORT_FILE: &str = "check_results.json";

/// Name of the persisted download state inside the staging directory.
pub const STATE_FILE: &str = ".download_state.json";

/// Paths and settings shared by every command, resolved from the global
/// CLI arguments.
pub struct Environment {
    pub game_dir: PathBuf,
    pub download_dir: PathBuf,
    pub mirror: String,
    pub manifest_url: String,
}

impl Environment {
    /// Path of the persisted verification report.
    pub fn report_path(&self) -> PathBuf {
        self.download_dir.join(REPORT_FILE)
    }

    /// Path of the persisted download state.
    pub fn state_path(&self) -> PathBuf {
        self.download_dir.join(STATE_FILE)
    }

    /// State store backed by the staging directory.
    pub fn state_store(&self) -> StateStore {
        StateStore::new(self.state_path())
    }

    /// Mirror plan preferring the configured mirror.
    pub fn mirror_plan(&self) -> MirrorPlan {
        MirrorPlan::new(self.mirror.as_str())
    }

    /// Require the game directory to hold the client executable.
    pub fn validate_game_dir(&self) -> Result<(), CliError> {
        if self.game_dir.join(CLIENT_EXECUTABLE).is_file() {
            Ok(())
        } else {
            Err(CliError::GameDir(self.game_dir.clone()))
        }
    }

    /// Fetch and parse the manifest.
    pub fn fetch_manifest(&self) -> Result<Manifest, CliError> {
        println!("Fetching manifest from {}", self.manifest_url);
        let manifest = fetch_manifest(&self.manifest_url)?;
        tracing::debug!(entries = manifest.entries.len(), "manifest fetched");
        Ok(manifest)
    }
}

/// Human-readable size.
pub fn format_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

    let bytes_f = bytes as f64;
    if bytes_f >= GIB {
        format!("{:.1} GB", bytes_f / GIB)
    } else if bytes_f >= MIB {
        format!("{:.1} MB", bytes_f / MIB)
    } else if bytes_f >= KIB {
        format!("{:.1} KB", bytes_f / KIB)
    } else {
        format!("{} B", bytes)
    }
}
