// NexusLIMS Logger - platform/fs.rs
//
// Filesystem helpers for the sync pass.

use chrono::{DateTime, Utc};
use std::path::Path;

/// Last-modified time of `path` in UTC, or `None` if it cannot be read.
pub fn modified_utc(path: &Path) -> Option<DateTime<Utc>> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modified_time_of_fresh_file_is_recent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.dm3");
        std::fs::write(&path, b"x").unwrap();
        let mtime = modified_utc(&path).expect("mtime");
        let age = Utc::now() - mtime;
        assert!(age < chrono::Duration::minutes(5), "age = {age}");
    }

    #[test]
    fn missing_file_has_no_mtime() {
        let dir = tempfile::tempdir().unwrap();
        assert!(modified_utc(&dir.path().join("gone")).is_none());
    }
}
