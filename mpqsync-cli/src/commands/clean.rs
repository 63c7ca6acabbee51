//! Clean command: remove staging downloads, the report, and the state file.
//!
//! The game directory and its archives are never touched.

use std::fs;
use std::path::Path;

use mpqsync::fsutil::scan_mtimes;

use super::common::Environment;
use crate::error::CliError;

/// Run the clean command.
pub fn run(env: &Environment) -> Result<(), CliError> {
    let mut removed_files = 0;
    let mut removed_dirs = 0;

    for artifact in [env.report_path(), env.state_path()] {
        if artifact.is_file() {
            println!("Removing {}", artifact.display());
            remove_file(&artifact)?;
            removed_files += 1;
        }
    }

    if env.download_dir.is_dir() {
        let subdirs: Vec<_> = fs::read_dir(&env.download_dir)
            .map_err(|e| io_error(&env.download_dir, e))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();

        for dir in subdirs {
            let count = scan_mtimes(&dir).map(|m| m.len()).unwrap_or(0);
            println!("Removing {} ({} files)", dir.display(), count);
            fs::remove_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
            removed_files += count;
            removed_dirs += 1;
        }

        let is_empty = fs::read_dir(&env.download_dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if is_empty {
            println!("Removing empty {}", env.download_dir.display());
            fs::remove_dir(&env.download_dir).map_err(|e| io_error(&env.download_dir, e))?;
            removed_dirs += 1;
        }
    }

    println!("Clean complete: removed {removed_files} files, {removed_dirs} directories");
    Ok(())
}

fn remove_file(path: &Path) -> Result<(), CliError> {
    fs::remove_file(path).map_err(|e| io_error(path, e))
}

fn io_error(path: &Path, source: std::io::Error) -> CliError {
    CliError::Io {
        context: format!("failed to remove {}", path.display()),
        source,
    }
}
