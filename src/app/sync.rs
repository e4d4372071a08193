// NexusLIMS Logger - app/sync.rs
//
// Background file synchronisation for an open session.
//
// Architecture:
//   - `FileSync` owns everything one pass needs: the watched directory and
//     its filters, the object store, and the checksum cache.
//   - `SyncWorker` lives on the UI/session side; a single background thread
//     owns the `FileSync`, so exactly one pass runs at a time.
//   - Two `Arc<AtomicBool>` flags steer the thread: `finish` (stop after one
//     final pass) and `abort` (stop as soon as possible, no final pass).
//   - Progress is sent as `SyncProgress` over an mpsc channel. Send errors
//     are ignored: a dropped receiver never stops uploads.
//
// Failure handling:
//   - Each upload is retried with backoff; a file that still fails is
//     counted, reported, and left out of the cache so the next pass retries it.
//   - Files vanishing between discovery and upload are skipped with a warning.
//   - The interval sleep is split into short sub-sleeps so stop requests
//     are seen within SYNC_STOP_CHECK_INTERVAL_MS.

use crate::app::cache::ChecksumCache;
use crate::core::model::{SyncProgress, SyncReport, UploadCandidate};
use crate::core::sync_plan::{self, FileTypeFilter, SyncPlanConfig};
use crate::platform::fs::modified_utc;
use crate::platform::storage::{ObjectStore, UploadRequest};
use crate::util::constants;
use crate::util::error::{StorageError, SyncError};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

// =============================================================================
// FileSync
// =============================================================================

/// What to sync and where it goes.
#[derive(Debug, Clone)]
pub struct SyncTarget {
    /// Local directory the instrument writes into.
    pub watch_dir: PathBuf,
    /// Object name prefix (the instrument's filestore path or PID).
    pub bucket_dir: String,
    /// Instrument schema name, attached as `instr_name` metadata.
    pub instr_name: String,
    pub filter: FileTypeFilter,
    /// Only files modified at or after this instant are synced.
    pub mtime_since: Option<DateTime<Utc>>,
}

/// One-pass synchroniser: discovery, upload, cache update.
pub struct FileSync {
    target: SyncTarget,
    store: Arc<dyn ObjectStore>,
    cache: ChecksumCache,
    retry_delays: Vec<Duration>,
    cancel_flag: Option<Arc<AtomicBool>>,
}

impl FileSync {
    pub fn new(target: SyncTarget, store: Arc<dyn ObjectStore>, cache: ChecksumCache) -> Self {
        Self {
            target,
            store,
            cache,
            retry_delays: constants::UPLOAD_RETRY_DELAYS_MS
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            cancel_flag: None,
        }
    }

    /// Replace the backoff schedule between upload attempts.
    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    pub fn target(&self) -> &SyncTarget {
        &self.target
    }

    pub fn cache(&self) -> &ChecksumCache {
        &self.cache
    }

    fn cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::Relaxed))
    }

    /// Upload every file whose current content is not in the cache.
    ///
    /// Returns `Err` only when the pass could not run at all; per-file
    /// failures are counted in the report and sent as `FileFailed`.
    pub fn upload_pass(
        &mut self,
        on_progress: &mut dyn FnMut(SyncProgress),
    ) -> Result<SyncReport, SyncError> {
        let started = Instant::now();

        let mut plan_config = SyncPlanConfig::new(&self.target.watch_dir);
        plan_config.filter = self.target.filter.clone();
        plan_config.mtime_since = self.target.mtime_since;
        plan_config.cancel_flag = self.cancel_flag.clone();

        let plan = sync_plan::find_files_to_upload(&plan_config, self.cache.entries())?;
        for warning in &plan.warnings {
            tracing::warn!(warning = %warning, "File sync discovery warning");
        }

        let mut report = SyncReport {
            candidates: plan.candidates.len(),
            ..SyncReport::default()
        };

        if !plan.candidates.is_empty() {
            let listed: Vec<String> = plan
                .candidates
                .iter()
                .take(constants::MAX_LOGGED_PATHS)
                .map(|c| c.path.display().to_string())
                .collect();
            tracing::debug!(
                count = plan.candidates.len(),
                eligible = plan.eligible,
                files = ?listed,
                "Files to upload"
            );
        }

        for candidate in &plan.candidates {
            if self.cancelled() {
                tracing::debug!("Upload pass cancelled");
                break;
            }
            match self.upload_one(candidate) {
                UploadOutcome::Uploaded { object_name, bytes } => {
                    self.cache
                        .record(sync_plan::cache_key(&candidate.path), candidate.checksum.clone());
                    report.uploaded += 1;
                    report.bytes_uploaded += bytes;
                    on_progress(SyncProgress::FileUploaded { object_name, bytes });
                }
                UploadOutcome::Vanished => {
                    tracing::warn!(path = %candidate.path.display(), "File disappeared before upload; skipped");
                    report.skipped += 1;
                }
                UploadOutcome::Failed(error) => {
                    tracing::error!(
                        path = %candidate.path.display(),
                        error = %error,
                        "Upload failed; will retry next pass"
                    );
                    report.failed += 1;
                    on_progress(SyncProgress::FileFailed {
                        path: candidate.path.clone(),
                        error,
                    });
                }
            }
        }

        // Uploads already happened; a failed save only means re-uploading later.
        if let Err(e) = self.cache.save_if_dirty() {
            tracing::error!(error = %e, "Cannot save checksum cache");
        }

        report.duration = started.elapsed();
        tracing::info!(
            candidates = report.candidates,
            uploaded = report.uploaded,
            failed = report.failed,
            skipped = report.skipped,
            bytes = report.bytes_uploaded,
            elapsed_ms = report.duration.as_millis() as u64,
            "Upload pass complete"
        );
        Ok(report)
    }

    fn upload_one(&self, candidate: &UploadCandidate) -> UploadOutcome {
        if !candidate.path.exists() {
            return UploadOutcome::Vanished;
        }
        let Some(object_name) = sync_plan::object_name(
            &self.target.bucket_dir,
            &self.target.watch_dir,
            &candidate.path,
        ) else {
            return UploadOutcome::Failed(format!(
                "'{}' is not below the watched directory",
                candidate.path.display()
            ));
        };

        let mut metadata = BTreeMap::new();
        if let Some(mtime) = modified_utc(&candidate.path) {
            metadata.insert(
                "mtime".to_string(),
                mtime.to_rfc3339_opts(SecondsFormat::Micros, true),
            );
        }
        metadata.insert("instr_name".to_string(), self.target.instr_name.clone());

        let request = UploadRequest {
            path: &candidate.path,
            object_name: &object_name,
            metadata: &metadata,
        };

        let attempts = constants::UPLOAD_MAX_ATTEMPTS.max(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.store.upload(&request) {
                Ok(bytes) => {
                    tracing::debug!(object = %object_name, bytes, attempt, "Uploaded");
                    return UploadOutcome::Uploaded { object_name, bytes };
                }
                Err(StorageError::FileIo { source, .. })
                    if source.kind() == std::io::ErrorKind::NotFound =>
                {
                    return UploadOutcome::Vanished;
                }
                Err(e) if attempt >= attempts || self.cancelled() => {
                    return UploadOutcome::Failed(e.to_string());
                }
                Err(e) => {
                    let delay = self
                        .retry_delays
                        .get((attempt - 1) as usize)
                        .or(self.retry_delays.last())
                        .copied()
                        .unwrap_or_default();
                    tracing::warn!(
                        object = %object_name,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Upload attempt failed; retrying"
                    );
                    std::thread::sleep(delay);
                }
            }
        }
    }
}

enum UploadOutcome {
    Uploaded { object_name: String, bytes: u64 },
    Vanished,
    Failed(String),
}

// =============================================================================
// SyncWorker
// =============================================================================

/// Periodic background sync for the lifetime of a session.
pub struct SyncWorker {
    /// Channel receiver for the UI to poll sync progress messages.
    progress_rx: Option<mpsc::Receiver<SyncProgress>>,
    finish_flag: Arc<AtomicBool>,
    abort_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<Option<SyncReport>>>,
}

impl SyncWorker {
    /// Spawn the worker. The first pass runs one `interval` after start.
    pub fn start(mut sync: FileSync, interval: Duration) -> Self {
        let finish_flag = Arc::new(AtomicBool::new(false));
        let abort_flag = Arc::new(AtomicBool::new(false));
        sync.cancel_flag = Some(Arc::clone(&abort_flag));

        let (tx, rx) = mpsc::channel();
        let finish = Arc::clone(&finish_flag);
        let abort = Arc::clone(&abort_flag);

        tracing::info!(
            watch_dir = %sync.target.watch_dir.display(),
            destination = %sync.store.describe(),
            interval_secs = interval.as_secs(),
            "File sync started"
        );

        let handle = std::thread::spawn(move || run_sync_worker(sync, interval, finish, abort, tx));

        Self {
            progress_rx: Some(rx),
            finish_flag,
            abort_flag,
            handle: Some(handle),
        }
    }

    /// Returns `true` while the worker thread is alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Drain up to `max` pending progress messages without blocking.
    pub fn poll_progress(&mut self, max: usize) -> Vec<SyncProgress> {
        let mut out = Vec::new();
        let Some(rx) = self.progress_rx.as_ref() else {
            return out;
        };
        for _ in 0..max {
            match rx.try_recv() {
                Ok(msg) => out.push(msg),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    self.progress_rx = None;
                    break;
                }
            }
        }
        out
    }

    /// Stop after any in-flight pass plus exactly one final pass.
    ///
    /// Blocks until the worker exits and returns the final pass report
    /// (`None` if the final pass could not run).
    pub fn finish(mut self) -> Option<SyncReport> {
        self.finish_flag.store(true, Ordering::Relaxed);
        self.join()
    }

    /// Stop as soon as the current file is done, without a final pass.
    pub fn abort(mut self) {
        self.abort_flag.store(true, Ordering::Relaxed);
        let _ = self.join();
    }

    fn join(&mut self) -> Option<SyncReport> {
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(report) => report,
            Err(_) => {
                tracing::error!("File sync worker panicked");
                None
            }
        }
    }
}

impl Drop for SyncWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.abort_flag.store(true, Ordering::Relaxed);
        }
    }
}

fn run_sync_worker(
    mut sync: FileSync,
    interval: Duration,
    finish: Arc<AtomicBool>,
    abort: Arc<AtomicBool>,
    tx: mpsc::Sender<SyncProgress>,
) -> Option<SyncReport> {
    let check = Duration::from_millis(constants::SYNC_STOP_CHECK_INTERVAL_MS);
    let stop_requested = || finish.load(Ordering::Relaxed) || abort.load(Ordering::Relaxed);

    loop {
        let deadline = Instant::now() + interval;
        while !stop_requested() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(check.min(deadline - now));
        }
        if stop_requested() {
            break;
        }
        run_pass(&mut sync, &tx, false);
    }

    let final_report = if abort.load(Ordering::Relaxed) {
        tracing::info!("File sync aborted without a final pass");
        None
    } else {
        tracing::info!("Running final sync pass");
        run_pass(&mut sync, &tx, true)
    };

    let _ = tx.send(SyncProgress::Stopped);
    tracing::info!("File sync stopped");
    final_report
}

fn run_pass(
    sync: &mut FileSync,
    tx: &mpsc::Sender<SyncProgress>,
    final_pass: bool,
) -> Option<SyncReport> {
    let _ = tx.send(SyncProgress::PassStarted { final_pass });
    let mut forward = |msg: SyncProgress| {
        let _ = tx.send(msg);
    };
    match sync.upload_pass(&mut forward) {
        Ok(report) => {
            let _ = tx.send(SyncProgress::PassCompleted {
                report: report.clone(),
                final_pass,
            });
            Some(report)
        }
        Err(e) => {
            tracing::error!(error = %e, final_pass, "Sync pass failed");
            let _ = tx.send(SyncProgress::PassFailed {
                error: e.to_string(),
            });
            None
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
