//! Manifest types and parsing.
//!
//! The launcher API publishes a JSON manifest declaring every expected file,
//! its SHA-256 digest, its size, and the CDN mirrors hosting it. Files come
//! in two flavors: `client` entries that live loose under the game directory
//! (the container archives themselves included), and `patches` entries that
//! live as named members inside a patch archive identified by its key.

mod fetch;

pub use fetch::{fetch_manifest, ManifestError, ManifestResult, DEFAULT_MANIFEST_URL};

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::digest::Digest;

/// Wire format: a single file descriptor as published by the launcher.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEntry {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub mirrors: BTreeMap<String, String>,
}

/// Wire format: a patch archive and the files expected inside it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPatch {
    pub key: String,
    #[serde(default)]
    pub files: Vec<RawEntry>,
}

/// Wire format: the whole manifest document.
#[derive(Debug, Clone, Deserialize)]
pub struct RawManifest {
    #[serde(default)]
    pub client: Vec<RawEntry>,
    #[serde(default)]
    pub patches: Vec<RawPatch>,
}

/// Where a manifest entry lives on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Category {
    /// A loose file under the game directory.
    Loose,
    /// A member of the patch archive with the given key.
    Archived { key: String },
}

impl Category {
    /// Stable label used as a key in persisted state and staging paths.
    pub fn label(&self) -> String {
        match self {
            Self::Loose => "client".to_string(),
            Self::Archived { key } => format!("patch-{key}"),
        }
    }

    /// Inverse of [`label`](Self::label).
    pub fn from_label(label: &str) -> Option<Self> {
        if label == "client" {
            Some(Self::Loose)
        } else {
            label.strip_prefix("patch-").map(|key| Self::Archived {
                key: key.to_string(),
            })
        }
    }
}

/// A single expected file, as declared by the manifest.
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    /// Path-like name. Loose entries are relative to the game directory;
    /// archived entries are member paths (forward slashes on the wire).
    pub name: String,
    /// Expected content digest.
    pub digest: Digest,
    /// Expected size in bytes.
    pub size: u64,
    /// Where the file lives.
    pub category: Category,
    /// Mirror id -> download URL.
    pub mirrors: BTreeMap<String, String>,
}

/// A parsed manifest: every expected file, in wire order.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Build a manifest from the wire document.
    ///
    /// Descriptors that are not plain files or carry no hash are skipped,
    /// matching the launcher's own convention for directory placeholders.
    /// Entries with an unparsable digest are skipped with a warning rather
    /// than failing the whole document.
    pub fn from_raw(raw: RawManifest) -> Self {
        let mut entries = Vec::new();

        for item in raw.client {
            if let Some(entry) = convert_entry(item, Category::Loose) {
                entries.push(entry);
            }
        }

        for patch in raw.patches {
            let category = Category::Archived {
                key: patch.key.clone(),
            };
            for item in patch.files {
                if let Some(entry) = convert_entry(item, category.clone()) {
                    entries.push(entry);
                }
            }
        }

        Self { entries }
    }

    /// Loose entries, in manifest order.
    pub fn loose_entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries
            .iter()
            .filter(|e| e.category == Category::Loose)
    }

    /// Archived entries grouped by archive key, preserving manifest order
    /// both across groups and within each group.
    pub fn archived_groups(&self) -> Vec<(String, Vec<&ManifestEntry>)> {
        let mut order: Vec<String> = Vec::new();
        let mut groups: BTreeMap<String, Vec<&ManifestEntry>> = BTreeMap::new();

        for entry in &self.entries {
            if let Category::Archived { key } = &entry.category {
                if !groups.contains_key(key) {
                    order.push(key.clone());
                }
                groups.entry(key.clone()).or_default().push(entry);
            }
        }

        order
            .into_iter()
            .map(|key| {
                let entries = groups.remove(&key).unwrap_or_default();
                (key, entries)
            })
            .collect()
    }

    /// Archive keys present in the manifest, in first-appearance order.
    pub fn archive_keys(&self) -> Vec<String> {
        self.archived_groups().into_iter().map(|(k, _)| k).collect()
    }
}

/// On-disk location of the patch archive for a key.
pub fn archive_path(game_dir: &std::path::Path, key: &str) -> std::path::PathBuf {
    game_dir.join("Data").join(format!("patch-{key}.mpq"))
}

fn convert_entry(item: RawEntry, category: Category) -> Option<ManifestEntry> {
    if item.kind.as_deref() != Some("file") {
        return None;
    }
    let hash = item.hash?;
    let Some(digest) = Digest::parse(&hash) else {
        tracing::warn!(name = %item.name, hash = %hash, "skipping entry with invalid digest");
        return None;
    };
    Some(ManifestEntry {
        name: item.name,
        digest,
        size: item.size,
        category,
        mirrors: item.mirrors,
    })
}
