//! In-memory archive backend.
//!
//! Keeps whole archives in a shared map keyed by path. Mutations made
//! through a writable handle are buffered and published back to the store on
//! `close()`, mirroring the flush discipline of the on-disk backend. Used by
//! tests that exercise capability contracts without touching the disk.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::{Archive, ArchiveError, ArchiveResult, ArchiveStore, OpenMode};

type MemberMap = BTreeMap<String, Vec<u8>>;

/// Archive store holding every archive in process memory.
///
/// Clones share the same underlying storage.
#[derive(Debug, Default, Clone)]
pub struct MemoryArchiveStore {
    archives: Arc<Mutex<HashMap<PathBuf, MemberMap>>>,
}

impl MemoryArchiveStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an archive with the given members, replacing any existing one.
    pub fn seed(&self, path: &Path, members: &[(&str, &[u8])]) {
        let map = members
            .iter()
            .map(|(name, data)| (name.to_string(), data.to_vec()))
            .collect();
        self.archives
            .lock()
            .expect("archive store lock poisoned")
            .insert(path.to_path_buf(), map);
    }
}

impl ArchiveStore for MemoryArchiveStore {
    fn open(
        &self,
        path: &Path,
        mode: OpenMode,
        _max_members: Option<usize>,
    ) -> ArchiveResult<Box<dyn Archive>> {
        let archives = self.archives.lock().expect("archive store lock poisoned");
        let members = match mode {
            OpenMode::Create => MemberMap::new(),
            OpenMode::ReadOnly | OpenMode::ReadWrite => archives
                .get(path)
                .cloned()
                .ok_or_else(|| ArchiveError::Open {
                    path: path.display().to_string(),
                    reason: "no such archive".to_string(),
                })?,
        };
        drop(archives);

        Ok(Box::new(MemoryArchive {
            store: Arc::clone(&self.archives),
            path: path.to_path_buf(),
            members,
            writable: mode != OpenMode::ReadOnly,
            dirty: mode == OpenMode::Create,
        }))
    }

    fn exists(&self, path: &Path) -> bool {
        self.archives
            .lock()
            .expect("archive store lock poisoned")
            .contains_key(path)
    }

    fn delete(&self, path: &Path) -> ArchiveResult<()> {
        let removed = self
            .archives
            .lock()
            .expect("archive store lock poisoned")
            .remove(path);
        if removed.is_none() {
            return Err(ArchiveError::Delete {
                path: path.display().to_string(),
                reason: "no such archive".to_string(),
            });
        }
        Ok(())
    }
}

struct MemoryArchive {
    store: Arc<Mutex<HashMap<PathBuf, MemberMap>>>,
    path: PathBuf,
    members: MemberMap,
    writable: bool,
    dirty: bool,
}

impl Archive for MemoryArchive {
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
        if !self.writable {
            return Err(ArchiveError::MemberWrite {
                name: name.to_string(),
                reason: "archive is open read-only".to_string(),
            });
        }
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
        if !self.writable {
            return Err(ArchiveError::MemberRemove {
                name: name.to_string(),
                reason: "archive is open read-only".to_string(),
            });
        }
        if self.members.remove(name).is_none() {
            return Err(ArchiveError::MemberNotFound {
                name: name.to_string(),
            });
        }
        self.dirty = true;
        Ok(())
    }

    fn close(self: Box<Self>) -> ArchiveResult<()> {
        if self.dirty {
            self.store
                .lock()
                .expect("archive store lock poisoned")
                .insert(self.path.clone(), self.members);
        }
        Ok(())
    }
}
