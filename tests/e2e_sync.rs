// NexusLIMS Logger - tests/e2e_sync.rs
//
// End-to-end tests for file synchronisation.
//
// These tests exercise the real filesystem, real walkdir traversal, real
// SHA-256 checksums, and the real checksum cache file on disk. The object
// store is a directory: uploads are copied into it so the tests can inspect
// exactly what would have reached the bucket.

use nexuslims_logger::app::cache::ChecksumCache;
use nexuslims_logger::app::sync::{FileSync, SyncTarget, SyncWorker};
use nexuslims_logger::core::model::{SyncProgress, SyncReport};
use nexuslims_logger::core::sync_plan::FileTypeFilter;
use nexuslims_logger::platform::storage::{ObjectStore, UploadRequest};
use nexuslims_logger::util::error::StorageError;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

// =============================================================================
// Helpers
// =============================================================================

/// Object store backed by a local directory.
struct DirStore {
    root: PathBuf,
    metadata: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
    /// Object names that fail every attempt until removed.
    broken: Mutex<HashSet<String>>,
    uploads: Mutex<u32>,
}

impl DirStore {
    fn new(root: &Path) -> Arc<Self> {
        Arc::new(Self {
            root: root.to_path_buf(),
            metadata: Mutex::new(BTreeMap::new()),
            broken: Mutex::new(HashSet::new()),
            uploads: Mutex::new(0),
        })
    }

    fn object(&self, name: &str) -> Option<Vec<u8>> {
        fs::read(self.root.join(name)).ok()
    }

    fn upload_count(&self) -> u32 {
        *self.uploads.lock().unwrap()
    }
}

impl ObjectStore for DirStore {
    fn describe(&self) -> String {
        format!("dir://{}", self.root.display())
    }

    fn upload(&self, request: &UploadRequest<'_>) -> Result<u64, StorageError> {
        if self.broken.lock().unwrap().contains(request.object_name) {
            return Err(StorageError::Status {
                status: 500,
                body: "backend error".to_string(),
            });
        }
        let io_err = |source| StorageError::FileIo {
            path: request.path.to_path_buf(),
            source,
        };
        let dest = self.root.join(request.object_name);
        fs::create_dir_all(dest.parent().unwrap()).map_err(io_err)?;
        let bytes = fs::copy(request.path, &dest).map_err(io_err)?;
        self.metadata
            .lock()
            .unwrap()
            .insert(request.object_name.to_string(), request.metadata.clone());
        *self.uploads.lock().unwrap() += 1;
        Ok(bytes)
    }
}

struct Fixture {
    data: tempfile::TempDir,
    bucket: tempfile::TempDir,
    state: tempfile::TempDir,
    store: Arc<DirStore>,
}

impl Fixture {
    fn new() -> Self {
        let bucket = tempfile::tempdir().unwrap();
        let store = DirStore::new(bucket.path());
        Self {
            data: tempfile::tempdir().unwrap(),
            bucket,
            state: tempfile::tempdir().unwrap(),
            store,
        }
    }

    fn write(&self, rel: &str, content: &[u8]) -> PathBuf {
        let path = self.data.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    fn cache_path(&self) -> PathBuf {
        self.state.path().join("cache.json")
    }

    fn sync(&self, filetypes: &[&str]) -> FileSync {
        self.sync_since(filetypes, None)
    }

    fn sync_since(&self, filetypes: &[&str], mtime_since: Option<DateTime<Utc>>) -> FileSync {
        let target = SyncTarget {
            watch_dir: self.data.path().to_path_buf(),
            bucket_dir: "Titan_TEM".to_string(),
            instr_name: "FEI-Titan-TEM".to_string(),
            filter: FileTypeFilter::new(filetypes),
            mtime_since,
        };
        let store: Arc<dyn ObjectStore> = self.store.clone();
        FileSync::new(target, store, ChecksumCache::load(&self.cache_path()))
            .with_retry_delays(vec![Duration::ZERO])
    }
}

fn pass(sync: &mut FileSync) -> SyncReport {
    sync.upload_pass(&mut |_| {}).unwrap()
}

// =============================================================================
// Upload passes
// =============================================================================

#[test]
fn e2e_uploads_tree_under_instrument_prefix() {
    let fx = Fixture::new();
    fx.write("2024/user/image_001.dm3", b"first image");
    fx.write("2024/user/spectrum.ser", b"spectrum");

    let mut sync = fx.sync(&[]);
    let report = pass(&mut sync);

    assert_eq!(report.uploaded, 2);
    assert_eq!(
        fx.store.object("Titan_TEM/2024/user/image_001.dm3").as_deref(),
        Some(&b"first image"[..])
    );
    let meta = fx.store.metadata.lock().unwrap();
    let image_meta = &meta["Titan_TEM/2024/user/image_001.dm3"];
    assert_eq!(image_meta["instr_name"], "FEI-Titan-TEM");
    assert!(image_meta.contains_key("mtime"));
    assert!(fx.bucket.path().join("Titan_TEM").is_dir());
}

#[test]
fn e2e_unchanged_files_are_not_reuploaded_across_runs() {
    let fx = Fixture::new();
    fx.write("a.dm3", b"one");
    fx.write("b.dm3", b"two");

    let mut first = fx.sync(&[]);
    assert_eq!(pass(&mut first).uploaded, 2);
    drop(first);

    // A fresh FileSync reloads the cache from disk, as after a restart.
    let mut second = fx.sync(&[]);
    let report = pass(&mut second);
    assert_eq!(report.uploaded, 0);
    assert_eq!(report.candidates, 0);
    assert_eq!(fx.store.upload_count(), 2);

    fx.write("b.dm3", b"two, edited");
    let report = pass(&mut second);
    assert_eq!(report.uploaded, 1);
    assert_eq!(
        fx.store.object("Titan_TEM/b.dm3").as_deref(),
        Some(&b"two, edited"[..])
    );
}

#[test]
fn e2e_file_type_filter_limits_uploads() {
    let fx = Fixture::new();
    fx.write("keep.DM3", b"upper-case extension");
    fx.write("keep.tif", b"tif");
    fx.write("skip.txt", b"notes");

    let mut sync = fx.sync(&[".dm3", "*.tif"]);
    let report = pass(&mut sync);

    assert_eq!(report.uploaded, 2);
    assert!(fx.store.object("Titan_TEM/keep.DM3").is_some());
    assert!(fx.store.object("Titan_TEM/keep.tif").is_some());
    assert!(fx.store.object("Titan_TEM/skip.txt").is_none());
}

#[test]
fn e2e_files_older_than_session_start_are_ignored() {
    let fx = Fixture::new();
    let old = fx.write("old.dm3", b"from yesterday");
    let hour_ago = SystemTime::now() - Duration::from_secs(3600);
    fs::File::options()
        .write(true)
        .open(&old)
        .unwrap()
        .set_modified(hour_ago)
        .unwrap();
    fx.write("new.dm3", b"from this session");

    let session_start = Utc::now() - chrono::Duration::minutes(5);
    let mut sync = fx.sync_since(&[], Some(session_start));

    let report = pass(&mut sync);
    assert_eq!(report.uploaded, 1);
    assert!(fx.store.object("Titan_TEM/new.dm3").is_some());
    assert!(fx.store.object("Titan_TEM/old.dm3").is_none());
}

#[test]
fn e2e_failed_upload_is_retried_on_next_pass() {
    let fx = Fixture::new();
    fx.write("flaky.dm3", b"data");
    fx.store
        .broken
        .lock()
        .unwrap()
        .insert("Titan_TEM/flaky.dm3".to_string());

    let mut sync = fx.sync(&[]);
    let mut events = Vec::new();
    let report = sync.upload_pass(&mut |m| events.push(m)).unwrap();
    assert_eq!(report.failed, 1);
    assert!(events
        .iter()
        .any(|e| matches!(e, SyncProgress::FileFailed { .. })));
    assert!(sync.cache().is_empty());

    fx.store.broken.lock().unwrap().clear();
    let report = pass(&mut sync);
    assert_eq!(report.uploaded, 1);
    assert_eq!(sync.cache().len(), 1);
}

// =============================================================================
// Background worker
// =============================================================================

#[test]
fn e2e_finish_picks_up_files_written_late_in_the_session() {
    let fx = Fixture::new();
    fx.write("early.dm3", b"early");

    // Interval far longer than the test: only the final pass runs.
    let worker = SyncWorker::start(fx.sync(&[]), Duration::from_secs(3600));
    fx.write("late.dm3", b"written just before the end");
    let report = worker.finish().expect("final pass report");

    assert_eq!(report.uploaded, 2);
    assert!(fx.store.object("Titan_TEM/late.dm3").is_some());
    let cache = ChecksumCache::load(&fx.cache_path());
    assert_eq!(cache.len(), 2);
}

#[test]
fn e2e_worker_runs_periodic_passes_and_reports_progress() {
    let fx = Fixture::new();
    fx.write("a.dm3", b"a");

    let mut worker = SyncWorker::start(fx.sync(&[]), Duration::from_millis(50));
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    let mut seen = Vec::new();
    while std::time::Instant::now() < deadline {
        seen.extend(worker.poll_progress(100));
        if seen
            .iter()
            .any(|m| matches!(m, SyncProgress::PassCompleted { final_pass: false, .. }))
        {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(seen
        .iter()
        .any(|m| matches!(m, SyncProgress::FileUploaded { .. })));

    let final_report = worker.finish().expect("final pass report");
    assert_eq!(final_report.uploaded, 0, "nothing new for the final pass");
    assert_eq!(fx.store.upload_count(), 1);
}

#[test]
fn e2e_abort_leaves_new_files_for_the_next_session() {
    let fx = Fixture::new();
    let worker = SyncWorker::start(fx.sync(&[]), Duration::from_secs(3600));
    fx.write("unsynced.dm3", b"left behind");
    worker.abort();

    assert_eq!(fx.store.upload_count(), 0);

    // Resuming later uploads it.
    let mut sync = fx.sync(&[]);
    assert_eq!(pass(&mut sync).uploaded, 1);
}
