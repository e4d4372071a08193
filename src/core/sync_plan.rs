// NexusLIMS Logger - core/sync_plan.rs
//
// Decides which files under the watched directory need uploading.
//
// A file is a candidate when its name passes the file-type filter, it was
// modified at or after the session start, and its content checksum differs
// from the cached checksum of its last successful upload.
//
// The walk itself is sequential (walkdir, no symlink following); checksums
// are computed in parallel with rayon since hashing dominates on large
// instrument images. Per-file I/O errors are non-fatal and collected as
// warnings.

use crate::core::checksum::file_checksum;
use crate::core::model::UploadCandidate;
use crate::util::constants;
use crate::util::error::SyncError;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// =============================================================================
// File-type filter
// =============================================================================

/// Filename filter built from the configured file types.
///
/// Entries are either bare extensions (`.dm3`, `dm3`) or glob patterns
/// (`*.ser`, `img_??.tif`). Matching is case-insensitive since instrument
/// software on Windows writes extensions in either case. An empty filter
/// accepts every file.
#[derive(Debug, Clone, Default)]
pub struct FileTypeFilter {
    patterns: Vec<glob::Pattern>,
    /// At least one non-blank entry was configured.
    restricted: bool,
}

impl FileTypeFilter {
    /// Build from configured entries. Entries that are not valid patterns
    /// are skipped; a filter whose every entry was invalid matches nothing.
    pub fn new<S: AsRef<str>>(entries: &[S]) -> Self {
        let mut restricted = false;
        let patterns = entries
            .iter()
            .map(|e| e.as_ref().trim())
            .filter(|e| !e.is_empty())
            .filter_map(|e| {
                restricted = true;
                match entry_pattern(e) {
                    Ok(p) => Some(p),
                    Err(err) => {
                        tracing::warn!(entry = e, error = %err, "Invalid file type pattern, skipping");
                        None
                    }
                }
            })
            .collect();
        Self {
            patterns,
            restricted,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.restricted
    }

    pub fn matches(&self, file_name: &str) -> bool {
        if !self.restricted {
            return true;
        }
        let opts = glob::MatchOptions {
            case_sensitive: false,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };
        self.patterns
            .iter()
            .any(|p| p.matches_with(file_name, opts))
    }
}

/// Compile one file-type entry: a bare extension becomes `*.ext`.
pub fn entry_pattern(entry: &str) -> Result<glob::Pattern, glob::PatternError> {
    let entry = entry.trim();
    let pattern = if has_glob_chars(entry) {
        entry.to_string()
    } else {
        format!("*.{}", entry.trim_start_matches('.'))
    };
    glob::Pattern::new(&pattern)
}

fn has_glob_chars(s: &str) -> bool {
    s.contains('*') || s.contains('?') || s.contains('[')
}

// =============================================================================
// Discovery
// =============================================================================

/// Inputs for one candidate search.
#[derive(Debug, Clone)]
pub struct SyncPlanConfig {
    /// Directory to walk.
    pub watch_dir: PathBuf,

    /// Filename filter; empty accepts all files.
    pub filter: FileTypeFilter,

    /// Skip files last modified before this instant. Files whose mtime cannot
    /// be read are included.
    pub mtime_since: Option<DateTime<Utc>>,

    /// Maximum recursion depth below `watch_dir`.
    pub max_depth: usize,

    /// Checked between walker entries; a set flag returns partial results.
    pub cancel_flag: Option<Arc<AtomicBool>>,
}

impl SyncPlanConfig {
    pub fn new(watch_dir: impl Into<PathBuf>) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            filter: FileTypeFilter::default(),
            mtime_since: None,
            max_depth: constants::SYNC_MAX_DEPTH,
            cancel_flag: None,
        }
    }
}

/// Result of a candidate search.
#[derive(Debug, Default)]
pub struct SyncPlan {
    /// Files needing upload, sorted by path.
    pub candidates: Vec<UploadCandidate>,
    /// Files that passed the name and mtime filters (before checksum comparison).
    pub eligible: usize,
    /// Non-fatal problems encountered while walking or hashing.
    pub warnings: Vec<String>,
}

/// Key under which a file's checksum is cached.
pub fn cache_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Find files whose current content has not been uploaded yet.
///
/// `cache` maps [`cache_key`] to the checksum of the last uploaded content.
/// Returns `Err` only when the watched directory itself is unusable.
pub fn find_files_to_upload(
    config: &SyncPlanConfig,
    cache: &HashMap<String, String>,
) -> Result<SyncPlan, SyncError> {
    let root = config.watch_dir.as_path();
    match std::fs::metadata(root) {
        Ok(meta) if meta.is_dir() => {}
        _ => {
            return Err(SyncError::WatchDirNotFound {
                path: root.to_path_buf(),
            })
        }
    }

    let mut warnings: Vec<String> = Vec::new();
    let mut eligible: Vec<(PathBuf, u64)> = Vec::new();

    let walker = walkdir::WalkDir::new(root)
        .max_depth(config.max_depth)
        .follow_links(false)
        .into_iter();

    for entry_result in walker {
        if config
            .cancel_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
        {
            tracing::debug!("Candidate search cancelled by request");
            break;
        }

        let entry = match entry_result {
            Ok(e) => e,
            Err(e) => {
                let path_str = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "<unknown>".to_string());
                warnings.push(format!("Cannot access '{path_str}': {e}"));
                continue;
            }
        };

        if entry.file_type().is_dir() && entry.depth() == config.max_depth && entry.depth() > 0 {
            let has_children = std::fs::read_dir(entry.path())
                .map(|mut d| d.next().is_some())
                .unwrap_or(false);
            if has_children {
                warnings.push(format!(
                    "'{}' is more than {} levels below the watched directory; its contents are not synced",
                    entry.path().display(),
                    config.max_depth
                ));
            }
            continue;
        }

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy();
        if !config.filter.matches(&file_name) {
            tracing::trace!(file = %file_name, "Skipped: file type not synced");
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                warnings.push(format!(
                    "Cannot read metadata for '{}': {e}",
                    path.display()
                ));
                continue;
            }
        };

        if let Some(since) = config.mtime_since {
            let modified: Option<DateTime<Utc>> =
                metadata.modified().ok().map(DateTime::<Utc>::from);
            if let Some(mtime) = modified {
                if mtime < since {
                    tracing::trace!(
                        file = %path.display(),
                        mtime = %mtime,
                        since = %since,
                        "Skipped: modified before session start"
                    );
                    continue;
                }
            }
        }

        eligible.push((path.to_path_buf(), metadata.len()));
    }

    let eligible_count = eligible.len();

    let hashed: Vec<Result<Option<UploadCandidate>, String>> = eligible
        .into_par_iter()
        .map(|(path, size)| match file_checksum(&path) {
            Ok(checksum) => {
                let unchanged = cache
                    .get(&cache_key(&path))
                    .is_some_and(|cached| *cached == checksum);
                if unchanged {
                    Ok(None)
                } else {
                    Ok(Some(UploadCandidate {
                        path,
                        checksum,
                        size,
                    }))
                }
            }
            Err(e) => Err(format!("Cannot checksum '{}': {e}", path.display())),
        })
        .collect();

    let mut candidates = Vec::new();
    for result in hashed {
        match result {
            Ok(Some(c)) => candidates.push(c),
            Ok(None) => {}
            Err(msg) => warnings.push(msg),
        }
    }
    candidates.sort_by(|a, b| a.path.cmp(&b.path));

    tracing::debug!(
        root = %root.display(),
        eligible = eligible_count,
        candidates = candidates.len(),
        warnings = warnings.len(),
        "Candidate search complete"
    );

    Ok(SyncPlan {
        candidates,
        eligible: eligible_count,
        warnings,
    })
}

// =============================================================================
// Object naming
// =============================================================================

/// Bucket object name for `path` under `watch_dir`.
///
/// `<bucket_dir>/<relative path>` with `/` separators regardless of platform,
/// and no leading slash when `bucket_dir` is empty. Returns `None` if `path`
/// is not below `watch_dir`.
pub fn object_name(bucket_dir: &str, watch_dir: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(watch_dir).ok()?;
    let mut parts: Vec<String> = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    let rel = parts.join("/");
    let prefix = bucket_dir.trim_matches('/');
    if prefix.is_empty() {
        Some(rel)
    } else {
        Some(format!("{prefix}/{rel}"))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::checksum::checksum_bytes;
    use std::fs;
    use tempfile::TempDir;

    fn make_instrument_tree() -> TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        fs::write(root.join("a.dm3"), b"image a").unwrap();
        fs::write(root.join("b.DM3"), b"image b").unwrap();
        fs::write(root.join("notes.txt"), b"notes").unwrap();
        let sub = root.join("2024").join("03");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("c.ser"), b"series c").unwrap();
        dir
    }

    fn names(plan: &SyncPlan) -> Vec<String> {
        plan.candidates
            .iter()
            .map(|c| c.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn filter_accepts_extensions_and_globs() {
        let f = FileTypeFilter::new(&[".dm3", "ser", "img_*.tif"]);
        assert!(f.matches("a.dm3"));
        assert!(f.matches("A.DM3"));
        assert!(f.matches("x.ser"));
        assert!(f.matches("img_01.tif"));
        assert!(!f.matches("other.tif"));
        assert!(!f.matches("dm3"));
    }

    #[test]
    fn empty_filter_accepts_everything() {
        let f = FileTypeFilter::new::<&str>(&[]);
        assert!(f.is_empty());
        assert!(f.matches("anything.bin"));
        let blanks = FileTypeFilter::new(&["", "  "]);
        assert!(blanks.is_empty());
    }

    #[test]
    fn filter_of_only_invalid_patterns_matches_nothing() {
        assert!(entry_pattern("img[.dm3").is_err());
        let f = FileTypeFilter::new(&["img[.dm3"]);
        assert!(!f.is_empty());
        assert!(!f.matches("secret.txt"));
        assert!(!f.matches("img.dm3"));
    }

    #[test]
    fn finds_all_files_with_empty_cache() {
        let dir = make_instrument_tree();
        let plan =
            find_files_to_upload(&SyncPlanConfig::new(dir.path()), &HashMap::new()).unwrap();
        assert_eq!(plan.candidates.len(), 4);
        assert_eq!(plan.eligible, 4);
        assert!(plan.warnings.is_empty(), "{:?}", plan.warnings);
    }

    #[test]
    fn directories_past_the_depth_limit_are_reported() {
        let dir = make_instrument_tree();
        let mut config = SyncPlanConfig::new(dir.path());
        config.max_depth = 1;
        let plan = find_files_to_upload(&config, &HashMap::new()).unwrap();
        assert!(!names(&plan).contains(&"c.ser".to_string()));
        assert_eq!(plan.warnings.len(), 1, "{:?}", plan.warnings);
        assert!(plan.warnings[0].contains("2024"));
    }

    #[test]
    fn results_are_sorted_by_path() {
        let dir = make_instrument_tree();
        let plan =
            find_files_to_upload(&SyncPlanConfig::new(dir.path()), &HashMap::new()).unwrap();
        let mut sorted = plan.candidates.clone();
        sorted.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(plan.candidates, sorted);
    }

    #[test]
    fn respects_file_type_filter() {
        let dir = make_instrument_tree();
        let mut config = SyncPlanConfig::new(dir.path());
        config.filter = FileTypeFilter::new(&[".dm3"]);
        let plan = find_files_to_upload(&config, &HashMap::new()).unwrap();
        let mut got = names(&plan);
        got.sort();
        assert_eq!(got, vec!["a.dm3", "b.DM3"]);
    }

    #[test]
    fn unchanged_files_are_not_candidates() {
        let dir = make_instrument_tree();
        let mut cache = HashMap::new();
        cache.insert(
            cache_key(&dir.path().join("a.dm3")),
            checksum_bytes(b"image a"),
        );
        // Stale entry: content changed since the cached upload.
        cache.insert(
            cache_key(&dir.path().join("notes.txt")),
            checksum_bytes(b"old notes"),
        );
        let plan = find_files_to_upload(&SyncPlanConfig::new(dir.path()), &cache).unwrap();
        let got = names(&plan);
        assert!(!got.contains(&"a.dm3".to_string()));
        assert!(got.contains(&"notes.txt".to_string()));
        assert_eq!(plan.eligible, 4);
    }

    #[test]
    fn files_older_than_session_start_are_ignored() {
        let dir = make_instrument_tree();
        let mut config = SyncPlanConfig::new(dir.path());
        config.mtime_since = Some(Utc::now() + chrono::Duration::hours(1));
        let plan = find_files_to_upload(&config, &HashMap::new()).unwrap();
        assert!(plan.candidates.is_empty());

        config.mtime_since = Some(Utc::now() - chrono::Duration::hours(1));
        let plan = find_files_to_upload(&config, &HashMap::new()).unwrap();
        assert_eq!(plan.candidates.len(), 4);
    }

    #[test]
    fn candidate_carries_checksum_and_size() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("one.dm3"), b"12345").unwrap();
        let plan =
            find_files_to_upload(&SyncPlanConfig::new(dir.path()), &HashMap::new()).unwrap();
        assert_eq!(plan.candidates[0].size, 5);
        assert_eq!(plan.candidates[0].checksum, checksum_bytes(b"12345"));
    }

    #[test]
    fn missing_watch_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = SyncPlanConfig::new(dir.path().join("missing"));
        let result = find_files_to_upload(&config, &HashMap::new());
        assert!(matches!(result, Err(SyncError::WatchDirNotFound { .. })));
    }

    #[test]
    fn cancelled_search_returns_no_candidates() {
        let dir = make_instrument_tree();
        let mut config = SyncPlanConfig::new(dir.path());
        config.cancel_flag = Some(Arc::new(AtomicBool::new(true)));
        let plan = find_files_to_upload(&config, &HashMap::new()).unwrap();
        assert!(plan.candidates.is_empty());
    }

    #[test]
    fn object_names_use_forward_slashes() {
        let watch = Path::new("/data/titan");
        let file = watch.join("2024").join("img.dm3");
        assert_eq!(
            object_name("Titan", watch, &file).as_deref(),
            Some("Titan/2024/img.dm3")
        );
        assert_eq!(
            object_name("", watch, &file).as_deref(),
            Some("2024/img.dm3")
        );
        assert_eq!(
            object_name("/Titan/", watch, &file).as_deref(),
            Some("Titan/2024/img.dm3")
        );
        assert_eq!(object_name("Titan", watch, Path::new("/elsewhere/x")), None);
        assert_eq!(object_name("Titan", watch, watch), None);
    }
}
