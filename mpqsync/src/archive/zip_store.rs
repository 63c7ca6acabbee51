//! Zip-backed container archive.
//!
//! Stores members in a standard zip file. Read-only handles stream from the
//! central directory; writable handles load the member table into memory,
//! apply mutations there, and rewrite the whole container on close. The
//! rewrite goes to a `.tmp` sibling first and is renamed into place, so a
//! crash mid-flush leaves the previous archive intact.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use super::{Archive, ArchiveError, ArchiveResult, ArchiveStore, OpenMode};

/// Archive store backed by zip files on disk.
#[derive(Debug, Default, Clone)]
pub struct ZipArchiveStore;

impl ZipArchiveStore {
    /// Create a new zip archive store.
    pub fn new() -> Self {
        Self
    }
}

impl ArchiveStore for ZipArchiveStore {
    fn open(
        &self,
        path: &Path,
        mode: OpenMode,
        _max_members: Option<usize>,
    ) -> ArchiveResult<Box<dyn Archive>> {
        match mode {
            OpenMode::ReadOnly => {
                let file = File::open(path).map_err(|e| ArchiveError::Open {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
                let archive = ZipArchive::new(file).map_err(|e| ArchiveError::Open {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
                Ok(Box::new(ZipReadArchive { archive }))
            }
            OpenMode::Create => Ok(Box::new(ZipWriteArchive {
                path: path.to_path_buf(),
                members: BTreeMap::new(),
                dirty: true,
            })),
            OpenMode::ReadWrite => {
                let members = load_members(path)?;
                Ok(Box::new(ZipWriteArchive {
                    path: path.to_path_buf(),
                    members,
                    dirty: false,
                }))
            }
        }
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn delete(&self, path: &Path) -> ArchiveResult<()> {
        fs::remove_file(path).map_err(|e| ArchiveError::Delete {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Read every member of an existing zip into memory.
fn load_members(path: &Path) -> ArchiveResult<BTreeMap<String, Vec<u8>>> {
    let file = File::open(path).map_err(|e| ArchiveError::Open {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let mut archive = ZipArchive::new(file).map_err(|e| ArchiveError::Open {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut members = BTreeMap::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| ArchiveError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut data)
            .map_err(|e| ArchiveError::MemberRead {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        members.insert(name, data);
    }
    Ok(members)
}

/// Read-only handle over an existing zip.
struct ZipReadArchive {
    archive: ZipArchive<File>,
}

impl Archive for ZipReadArchive {
    fn members(&self) -> Vec<String> {
        self.archive.file_names().map(String::from).collect()
    }

    fn has_member(&self, name: &str) -> bool {
        self.archive.file_names().any(|n| n == name)
    }

    fn read_member(&mut self, name: &str) -> ArchiveResult<Vec<u8>> {
        let mut entry = match self.archive.by_name(name) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => {
                return Err(ArchiveError::MemberNotFound {
                    name: name.to_string(),
                })
            }
            Err(e) => {
                return Err(ArchiveError::MemberRead {
                    name: name.to_string(),
                    reason: e.to_string(),
                })
            }
        };
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut data)
            .map_err(|e| ArchiveError::MemberRead {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(data)
    }

    fn write_member(&mut self, name: &str, _data: &[u8], _replace: bool) -> ArchiveResult<()> {
        Err(ArchiveError::MemberWrite {
            name: name.to_string(),
            reason: "archive is open read-only".to_string(),
        })
    }

    fn remove_member(&mut self, name: &str) -> ArchiveResult<()> {
        Err(ArchiveError::MemberRemove {
            name: name.to_string(),
            reason: "archive is open read-only".to_string(),
        })
    }

    fn close(self: Box<Self>) -> ArchiveResult<()> {
        Ok(())
    }
}

/// Writable handle: in-memory member table, flushed on close.
struct ZipWriteArchive {
    path: PathBuf,
    members: BTreeMap<String, Vec<u8>>,
    dirty: bool,
}

impl Archive for ZipWriteArchive {
    fn members(&self) -> Vec<String> {
        self.members.keys().cloned().collect()
    }

    fn has_member(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    fn read_member(&mut self, name: &str) -> ArchiveResult<Vec<u8>> {
        self.members
            .get(name)
            .cloned()
            .ok_or_else(|| ArchiveError::MemberNotFound {
                name: name.to_string(),
            })
    }

    fn write_member(&mut self, name: &str, data: &[u8], replace: bool) -> ArchiveResult<()> {
        if !replace && self.members.contains_key(name) {
            return Err(ArchiveError::MemberExists {
                name: name.to_string(),
            });
        }
        self.members.insert(name.to_string(), data.to_vec());
        self.dirty = true;
        Ok(())
    }

    fn remove_member(&mut self, name: &str) -> ArchiveResult<()> {
        if self.members.remove(name).is_none() {
            return Err(ArchiveError::MemberNotFound {
                name: name.to_string(),
            });
        }
        self.dirty = true;
        Ok(())
    }

    fn close(self: Box<Self>) -> ArchiveResult<()> {
        if !self.dirty {
            return Ok(());
        }

        // Sibling temp file, appended extension so "patch-8.mpq" does not
        // collide with another archive named "patch-8.tmp".
        let mut temp_os = self.path.clone().into_os_string();
        temp_os.push(".tmp");
        let temp_path = PathBuf::from(temp_os);
        let flush_err = |reason: String| ArchiveError::Flush {
            path: self.path.display().to_string(),
            reason,
        };

        let result = (|| {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent).map_err(|e| flush_err(e.to_string()))?;
            }
            let file = File::create(&temp_path).map_err(|e| flush_err(e.to_string()))?;
            let mut writer = ZipWriter::new(file);
            let options = SimpleFileOptions::default();

            for (name, data) in &self.members {
                writer
                    .start_file(name.as_str(), options)
                    .map_err(|e| flush_err(e.to_string()))?;
                writer
                    .write_all(data)
                    .map_err(|e| flush_err(e.to_string()))?;
            }

            writer.finish().map_err(|e| flush_err(e.to_string()))?;
            fs::rename(&temp_path, &self.path).map_err(|e| flush_err(e.to_string()))?;
            Ok(())
        })();

        if result.is_err() {
            fs::remove_file(&temp_path).ok();
        }
        result
    }
}
