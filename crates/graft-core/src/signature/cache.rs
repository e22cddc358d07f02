//! Resolved-address cache keyed by host version.
//!
//! One file per host version, version embedded in the filename. Offsets
//! are relative to the region base, so the cache survives relocation.
//! Any mismatch between the recorded and the running host version
//! invalidates the whole file; the layout as a whole shifts between
//! builds, so partial carryover is never sound.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::cache::PREFIX;
use crate::error::Result;
use crate::host::HostVersion;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheFile {
    host_version: String,
    created_at: DateTime<Utc>,
    offsets: BTreeMap<String, u64>,
}

/// The signature cache for one host version.
#[derive(Debug)]
pub struct SignatureCache {
    path: PathBuf,
    host_version: HostVersion,
    created_at: DateTime<Utc>,
    offsets: BTreeMap<String, u64>,
}

impl SignatureCache {
    /// Load the cache for `version` from `dir`.
    ///
    /// An absent, unreadable, corrupt or version-mismatched file degrades
    /// to an empty cache; it never fails startup.
    pub fn load<P: AsRef<Path>>(dir: P, version: &HostVersion) -> Self {
        let path = cache_path(dir.as_ref(), version);

        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                debug!("Cache file not found or unreadable: {}", e);
                return Self::empty(path, version.clone());
            }
        };

        let file: CacheFile = match serde_json::from_str(&content) {
            Ok(f) => f,
            Err(e) => {
                warn!("Discarding corrupt cache file {}: {}", path.display(), e);
                return Self::empty(path, version.clone());
            }
        };

        if file.host_version != version.as_str() {
            debug!(
                "Cache version mismatch: cached={}, current={}",
                file.host_version, version
            );
            return Self::empty(path, version.clone());
        }

        debug!(
            "Loaded {} cached offsets (created {})",
            file.offsets.len(),
            file.created_at
        );

        Self {
            path,
            host_version: version.clone(),
            created_at: file.created_at,
            offsets: file.offsets,
        }
    }

    fn empty(path: PathBuf, host_version: HostVersion) -> Self {
        Self {
            path,
            host_version,
            created_at: Utc::now(),
            offsets: BTreeMap::new(),
        }
    }

    /// Offset recorded for `name`, relative to the region base.
    pub fn offset(&self, name: &str) -> Option<u64> {
        self.offsets.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn host_version(&self) -> &HostVersion {
        &self.host_version
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.offsets.iter().map(|(name, off)| (name.as_str(), *off))
    }

    /// Record a new resolution. Call [`save`](Self::save) afterwards so a
    /// restart mid-pass keeps everything resolved so far.
    pub fn insert(&mut self, name: &str, offset: u64) {
        self.offsets.insert(name.to_string(), offset);
    }

    /// Rewrite the cache file with the current entries.
    pub fn save(&self) -> Result<()> {
        let file = CacheFile {
            host_version: self.host_version.as_str().to_string(),
            created_at: self.created_at,
            offsets: self.offsets.clone(),
        };
        let content = serde_json::to_string_pretty(&file)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

fn cache_path(dir: &Path, version: &HostVersion) -> PathBuf {
    // Version strings can contain path separators and other hostile
    // characters; keep the filename flat.
    let sanitized: String = version
        .as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    dir.join(format!("{}{}.json", PREFIX, sanitized))
}

/// Delete cache files left behind by other host versions.
///
/// House-keeping, not correctness: version-mismatched files are already
/// ignored on load. Failures are logged and swallowed.
pub fn purge_stale<P: AsRef<Path>>(dir: P, version: &HostVersion) {
    let current = cache_path(dir.as_ref(), version);
    let current_name = current.file_name().map(|n| n.to_os_string());

    let entries = match fs::read_dir(dir.as_ref()) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cache directory not readable, skipping purge: {}", e);
            return;
        }
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let is_cache = name
            .to_str()
            .map(|n| n.starts_with(PREFIX) && n.ends_with(".json"))
            .unwrap_or(false);

        if is_cache && Some(&name) != current_name.as_ref() {
            match fs::remove_file(entry.path()) {
                Ok(()) => info!("Removed stale cache file {:?}", name),
                Err(e) => warn!("Failed to remove stale cache file {:?}: {}", name, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(s: &str) -> HostVersion {
        HostVersion::new(s)
    }

    #[test]
    fn test_cache_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let v = version("2024.03.1100");

        let mut cache = SignatureCache::load(dir.path(), &v);
        assert!(cache.is_empty());

        cache.insert("frameTick", 0x1234);
        cache.insert("openInventory", 0x9ABC);
        cache.save().unwrap();

        let reloaded = SignatureCache::load(dir.path(), &v);
        assert_eq!(reloaded.offset("frameTick"), Some(0x1234));
        assert_eq!(reloaded.offset("openInventory"), Some(0x9ABC));
        assert_eq!(reloaded.len(), 2);
    }

    #[test]
    fn test_version_mismatch_discards_everything() {
        let dir = tempfile::tempdir().unwrap();

        let mut cache = SignatureCache::load(dir.path(), &version("1.0.0"));
        cache.insert("frameTick", 0x1234);
        cache.save().unwrap();

        // A different version must not see any entry, even though the
        // file for 1.0.0 still exists on disk.
        let other = SignatureCache::load(dir.path(), &version("1.0.1"));
        assert!(other.is_empty());
    }

    #[test]
    fn test_corrupt_file_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let v = version("1.0.0");

        fs::write(cache_path(dir.path(), &v), "{not json").unwrap();
        let cache = SignatureCache::load(dir.path(), &v);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_purge_removes_only_other_versions() {
        let dir = tempfile::tempdir().unwrap();
        let old = version("1.0.0");
        let new = version("2.0.0");

        let mut old_cache = SignatureCache::load(dir.path(), &old);
        old_cache.insert("frameTick", 1);
        old_cache.save().unwrap();

        let mut new_cache = SignatureCache::load(dir.path(), &new);
        new_cache.insert("frameTick", 2);
        new_cache.save().unwrap();

        fs::write(dir.path().join("notes.txt"), "keep me").unwrap();

        purge_stale(dir.path(), &new);

        assert!(!cache_path(dir.path(), &old).exists());
        assert!(cache_path(dir.path(), &new).exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_hostile_version_string_stays_flat() {
        let dir = tempfile::tempdir().unwrap();
        let v = version("2.0/../../etc");

        let mut cache = SignatureCache::load(dir.path(), &v);
        cache.insert("x", 1);
        cache.save().unwrap();

        // Whatever the name ended up as, it must be inside the directory.
        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().flatten().collect();
        assert_eq!(files.len(), 1);
        assert_eq!(SignatureCache::load(dir.path(), &v).offset("x"), Some(1));
    }
}
