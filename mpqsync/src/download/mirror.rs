//! Mirror selection.
//!
//! Every manifest entry advertises the CDN mirrors hosting it. The plan
//! holds a fixed global priority order plus the caller's preferred mirror;
//! candidates for an entry are the preferred mirror first, then the rest of
//! the priority order, skipping mirrors the entry does not advertise.

use crate::manifest::ManifestEntry;

/// Default mirror priority, fastest-first for European peering.
pub const DEFAULT_MIRROR_ORDER: [&str; 5] = ["r2eu", "bunny", "linode", "r2", "tc"];

/// Default preferred mirror.
pub const DEFAULT_MIRROR: &str = "r2eu";

/// Mirror selection plan.
#[derive(Debug, Clone)]
pub struct MirrorPlan {
    preferred: String,
    priority: Vec<String>,
}

impl Default for MirrorPlan {
    fn default() -> Self {
        Self::new(DEFAULT_MIRROR)
    }
}

impl MirrorPlan {
    /// Create a plan preferring the given mirror, with the default priority
    /// order for fallback.
    pub fn new(preferred: impl Into<String>) -> Self {
        Self {
            preferred: preferred.into(),
            priority: DEFAULT_MIRROR_ORDER.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replace the fallback priority order.
    pub fn with_priority(mut self, priority: Vec<String>) -> Self {
        self.priority = priority;
        self
    }

    /// The preferred mirror id.
    pub fn preferred(&self) -> &str {
        &self.preferred
    }

    /// Mirrors to try for `entry`, in order: `(mirror id, url)` pairs.
    pub fn candidates<'a>(&'a self, entry: &'a ManifestEntry) -> Vec<(&'a str, &'a str)> {
        let mut ordered: Vec<&str> = Vec::with_capacity(self.priority.len() + 1);
        ordered.push(self.preferred.as_str());
        for id in &self.priority {
            if id != &self.preferred {
                ordered.push(id.as_str());
            }
        }

        ordered
            .into_iter()
            .filter_map(|id| entry.mirrors.get(id).map(|url| (id, url.as_str())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::digest_bytes;
    use crate::manifest::Category;
    use std::collections::BTreeMap;

    fn entry_with_mirrors(ids: &[&str]) -> ManifestEntry {
        ManifestEntry {
            name: "file.bin".to_string(),
            digest: digest_bytes(b"x"),
            size: 1,
            category: Category::Loose,
            mirrors: ids
                .iter()
                .map(|id| (id.to_string(), format!("https://{id}.example.com/file.bin")))
                .collect(),
        }
    }

    #[test]
    fn test_preferred_mirror_first() {
        let plan = MirrorPlan::new("linode");
        let entry = entry_with_mirrors(&["r2eu", "linode", "tc"]);

        let ids: Vec<&str> = plan.candidates(&entry).iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec!["linode", "r2eu", "tc"]);
    }

    #[test]
    fn test_unadvertised_mirrors_skipped() {
        let plan = MirrorPlan::default();
        let entry = entry_with_mirrors(&["bunny"]);

        let candidates = plan.candidates(&entry);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].0, "bunny");
    }

    #[test]
    fn test_no_advertised_mirrors() {
        let plan = MirrorPlan::default();
        let entry = ManifestEntry {
            mirrors: BTreeMap::new(),
            ..entry_with_mirrors(&[])
        };
        assert!(plan.candidates(&entry).is_empty());
    }

    #[test]
    fn test_unknown_mirror_ids_ignored() {
        // The manifest may advertise mirrors the plan has never heard of;
        // only planned mirrors are used.
        let plan = MirrorPlan::default();
        let entry = entry_with_mirrors(&["mystery", "tc"]);

        let ids: Vec<&str> = plan.candidates(&entry).iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec!["tc"]);
    }
}
