// NexusLIMS Logger - app/cache.rs
//
// Checksum cache persistence: remembers the checksum of the last
// successfully uploaded content of every synced file, so unchanged files
// are not uploaded again across passes and across restarts.
//
// - Saved atomically (write temp, rename) so a crash mid-save never
//   corrupts the previous good cache.
// - A missing, unreadable, or malformed cache loads as empty: the worst case
//   is re-uploading files, never losing data.
// - A bare `{path: checksum}` map (the layout of older loggers) is accepted
//   on load and rewritten in the versioned layout on the next save.

use crate::util::error::SyncError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Version stamp for forward-compatibility checks.
pub const CACHE_VERSION: u32 = 1;

/// On-disk layout.
#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    #[serde(default)]
    checksums: HashMap<String, String>,
}

/// In-memory checksum cache bound to its file.
#[derive(Debug, Clone)]
pub struct ChecksumCache {
    path: PathBuf,
    entries: HashMap<String, String>,
    dirty: bool,
}

impl ChecksumCache {
    /// Load the cache at `path`, starting empty on any problem.
    pub fn load(path: &Path) -> Self {
        let entries = read_entries(path).unwrap_or_default();
        tracing::debug!(path = %path.display(), entries = entries.len(), "Checksum cache loaded");
        Self {
            path: path.to_path_buf(),
            entries,
            dirty: false,
        }
    }

    /// Create the cache file with no entries if it does not exist yet.
    pub fn ensure_exists(path: &Path) -> Result<(), SyncError> {
        if path.exists() {
            return Ok(());
        }
        let empty = Self {
            path: path.to_path_buf(),
            entries: HashMap::new(),
            dirty: true,
        };
        empty.write()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &HashMap<String, String> {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record the checksum of a successful upload.
    pub fn record(&mut self, key: String, checksum: String) {
        if self.entries.get(&key) != Some(&checksum) {
            self.entries.insert(key, checksum);
            self.dirty = true;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Persist the cache if it changed since the last save.
    pub fn save_if_dirty(&mut self) -> Result<bool, SyncError> {
        if !self.dirty {
            return Ok(false);
        }
        self.write()?;
        self.dirty = false;
        Ok(true)
    }

    fn write(&self) -> Result<(), SyncError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| SyncError::CacheWrite {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let file = CacheFile {
            version: CACHE_VERSION,
            checksums: self.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|source| SyncError::CacheSerialise { source })?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json.as_bytes()).map_err(|source| SyncError::CacheWrite {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| {
            let _ = std::fs::remove_file(&tmp);
            SyncError::CacheWrite {
                path: self.path.clone(),
                source,
            }
        })?;

        tracing::debug!(path = %self.path.display(), entries = self.entries.len(), "Checksum cache saved");
        Ok(())
    }
}

fn read_entries(path: &Path) -> Option<HashMap<String, String>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "Cannot read checksum cache");
            }
        })
        .ok()?;

    if let Ok(file) = serde_json::from_str::<CacheFile>(&content) {
        if file.version != CACHE_VERSION {
            tracing::warn!(
                found = file.version,
                expected = CACHE_VERSION,
                "Checksum cache version mismatch, starting empty"
            );
            return None;
        }
        return Some(file.checksums);
    }

    match serde_json::from_str::<HashMap<String, String>>(&content) {
        Ok(flat) => {
            tracing::info!(path = %path.display(), "Upgrading unversioned checksum cache");
            Some(flat)
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Checksum cache is malformed, starting empty"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChecksumCache::load(&dir.path().join("cache.json"));
        assert!(cache.is_empty());
        assert!(!cache.is_dirty());
    }

    #[test]
    fn saved_entries_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gui").join("cache.json");
        let mut cache = ChecksumCache::load(&path);
        cache.record("/data/a.dm3".to_string(), "abc=".to_string());
        assert!(cache.save_if_dirty().unwrap());
        assert!(!cache.save_if_dirty().unwrap(), "second save is a no-op");

        let reloaded = ChecksumCache::load(&path);
        assert_eq!(reloaded.get("/data/a.dm3"), Some("abc="));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn recording_the_same_checksum_does_not_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ChecksumCache::load(&dir.path().join("cache.json"));
        cache.record("k".to_string(), "v".to_string());
        cache.save_if_dirty().unwrap();
        cache.record("k".to_string(), "v".to_string());
        assert!(!cache.is_dirty());
    }

    #[test]
    fn unversioned_map_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, r#"{"/data/a.dm3": "xyz="}"#).unwrap();
        let cache = ChecksumCache::load(&path);
        assert_eq!(cache.get("/data/a.dm3"), Some("xyz="));
    }

    #[test]
    fn empty_legacy_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{}").unwrap();
        assert!(ChecksumCache::load(&path).is_empty());
    }

    #[test]
    fn malformed_or_future_cache_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(ChecksumCache::load(&path).is_empty());

        std::fs::write(&path, r#"{"version": 99, "checksums": {"a": "b"}}"#).unwrap();
        assert!(ChecksumCache::load(&path).is_empty());
    }

    #[test]
    fn ensure_exists_creates_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        ChecksumCache::ensure_exists(&path).unwrap();
        assert!(path.exists());

        let mut cache = ChecksumCache::load(&path);
        cache.record("k".to_string(), "v".to_string());
        cache.save_if_dirty().unwrap();
        ChecksumCache::ensure_exists(&path).unwrap();
        assert_eq!(ChecksumCache::load(&path).get("k"), Some("v"));
    }
}
