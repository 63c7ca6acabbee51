//! Filesystem helpers shared by the persistence and synchronizer modules.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Write a file atomically: temp sibling first, then rename into place.
///
/// A crash mid-write leaves either the previous file or no file, never a
/// truncated one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut temp_os = path.to_path_buf().into_os_string();
    temp_os.push(".tmp");
    let temp_path = PathBuf::from(temp_os);

    let result = fs::write(&temp_path, bytes).and_then(|_| fs::rename(&temp_path, path));
    if result.is_err() {
        fs::remove_file(&temp_path).ok();
    }
    result
}

/// Seconds since the Unix epoch, as a float.
pub fn epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Modification time of a file in epoch seconds.
pub fn mtime_seconds(path: &Path) -> io::Result<f64> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0))
}

/// Recursively map every file under `dir` to its modification time.
///
/// Keys are forward-slash relative paths. In-flight `.tmp` files from an
/// interrupted download are excluded; they are not real content.
pub fn scan_mtimes(dir: &Path) -> io::Result<BTreeMap<String, f64>> {
    let mut files = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(files);
    }
    collect_mtimes(dir, dir, &mut files)?;
    Ok(files)
}

fn collect_mtimes(root: &Path, dir: &Path, files: &mut BTreeMap<String, f64>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_mtimes(root, &path, files)?;
        } else if path.extension().is_none_or(|ext| ext != "tmp") {
            let rel = path
                .strip_prefix(root)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.insert(key, mtime_seconds(&path)?);
        }
    }
    Ok(())
}
