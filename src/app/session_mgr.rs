// NexusLIMS Logger - app/session_mgr.rs
//
// Session lifecycle management. Runs the session logger on background
// threads so the front-end never blocks on the network.
//
// Architecture:
//   - `SessionManager` lives on the UI thread; startup and end each run on
//     their own worker thread holding the shared `Arc<Mutex<SessionLogger>>`.
//   - All progress reaches the UI as `SessionProgress` messages on one mpsc
//     channel, drained with a per-frame budget by `poll_progress`.
//   - A hanging session pauses the startup thread until the front-end
//     answers through `resolve_hanging`.
//   - Once the session is open the startup thread starts the `SyncWorker`;
//     end stops it with one final pass, pause aborts it.
//
// End order: END protocol, stop sync, final pass, teardown.

use crate::app::cache::ChecksumCache;
use crate::app::session::{SessionLogger, StepReporter};
use crate::app::sync::{FileSync, SyncTarget, SyncWorker};
use crate::core::model::{
    Consistency, HangingChoice, SessionProgress, SessionRecord, SyncProgress,
};
use crate::core::sync_plan::FileTypeFilter;
use crate::platform::storage::ObjectStore;
use crate::util::constants;
use crate::util::error::SessionError;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

/// Everything needed to start file sync once a session is open.
#[derive(Clone)]
pub struct SyncSettings {
    pub store: Arc<dyn ObjectStore>,
    pub watch_dir: PathBuf,
    pub cache_path: PathBuf,
    pub filter: FileTypeFilter,
    pub interval: Duration,
    /// Backoff between upload attempts; `None` keeps the default schedule.
    pub retry_delays: Option<Vec<Duration>>,
}

type WorkerSlot = Arc<Mutex<Option<SyncWorker>>>;

/// Drives one session from startup to end on background threads.
pub struct SessionManager {
    logger: Arc<Mutex<SessionLogger>>,
    sync_settings: Option<SyncSettings>,
    sync_worker: WorkerSlot,
    progress_tx: mpsc::Sender<SessionProgress>,
    progress_rx: mpsc::Receiver<SessionProgress>,
    startup_cancel: Arc<AtomicBool>,
    startup_handle: Option<JoinHandle<()>>,
    end_handle: Option<JoinHandle<()>>,
    decision_tx: Option<mpsc::Sender<HangingChoice>>,
    note: String,
}

impl SessionManager {
    /// `sync_settings` is `None` when no data bucket is configured.
    pub fn new(logger: SessionLogger, sync_settings: Option<SyncSettings>) -> Self {
        let (progress_tx, progress_rx) = mpsc::channel();
        Self {
            logger: Arc::new(Mutex::new(logger)),
            sync_settings,
            sync_worker: Arc::new(Mutex::new(None)),
            progress_tx,
            progress_rx,
            startup_cancel: Arc::new(AtomicBool::new(false)),
            startup_handle: None,
            end_handle: None,
            decision_tx: None,
            note: String::new(),
        }
    }

    /// Begin session startup on a background thread.
    pub fn start(&mut self) {
        if self.startup_handle.is_some() {
            tracing::warn!("Session startup already requested");
            return;
        }
        let (decision_tx, decision_rx) = mpsc::channel();
        self.decision_tx = Some(decision_tx);

        let logger = Arc::clone(&self.logger);
        let tx = self.progress_tx.clone();
        let cancel = Arc::clone(&self.startup_cancel);
        let settings = self.sync_settings.clone();
        let slot = Arc::clone(&self.sync_worker);

        self.startup_handle = Some(std::thread::spawn(move || {
            run_startup(logger, tx, cancel, decision_rx, settings, slot);
        }));
    }

    /// Answer a `SessionProgress::Hanging` prompt.
    pub fn resolve_hanging(&mut self, choice: HangingChoice) {
        tracing::info!(choice = ?choice, "Hanging session resolution chosen");
        match self.decision_tx.as_ref() {
            Some(tx) if tx.send(choice).is_ok() => {}
            _ => tracing::warn!("No startup waiting for a hanging-session decision"),
        }
    }

    /// Note sent with the END row.
    pub fn set_note(&mut self, note: impl Into<String>) {
        self.note = note.into();
    }

    pub fn note(&self) -> &str {
        &self.note
    }

    /// End the session on a background thread.
    ///
    /// A still-running startup is cancelled first. When no START was ever
    /// logged, `NothingToEnd` is sent instead of writing to the database.
    pub fn end(&mut self) {
        if self.end_handle.is_some() {
            tracing::warn!("Session end already requested");
            return;
        }
        self.startup_cancel.store(true, Ordering::Relaxed);
        let startup = self.startup_handle.take();
        let logger = Arc::clone(&self.logger);
        let tx = self.progress_tx.clone();
        let slot = Arc::clone(&self.sync_worker);
        let note = self.note.clone();

        self.end_handle = Some(std::thread::spawn(move || {
            if let Some(handle) = startup {
                let _ = handle.join();
            }
            run_end(logger, tx, slot, note);
        }));
    }

    /// Leave the session open in the database and stop syncing without a
    /// final pass. Blocks until an in-flight upload completes.
    pub fn pause(&mut self) {
        tracing::info!("Pausing session; sync stopped without a final pass");
        self.startup_cancel.store(true, Ordering::Relaxed);
        let worker = lock(&self.sync_worker).take();
        if let Some(worker) = worker {
            worker.abort();
        }
    }

    /// Drain up to `max` pending session messages without blocking.
    pub fn poll_progress(&mut self, max: usize) -> Vec<SessionProgress> {
        let mut out = Vec::new();
        for _ in 0..max {
            match self.progress_rx.try_recv() {
                Ok(msg) => out.push(msg),
                Err(_) => break,
            }
        }
        out
    }

    /// Drain up to `max` sync messages. Never blocks: while the end thread
    /// owns the worker nothing is returned.
    pub fn poll_sync(&mut self, max: usize) -> Vec<SyncProgress> {
        match self.sync_worker.try_lock() {
            Ok(mut slot) => slot
                .as_mut()
                .map(|w| w.poll_progress(max))
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// Whether the file sync worker is running.
    pub fn sync_running(&self) -> bool {
        self.sync_worker
            .try_lock()
            .map(|slot| slot.as_ref().is_some_and(SyncWorker::is_running))
            .unwrap_or(false)
    }

    pub fn sync_enabled(&self) -> bool {
        self.sync_settings.is_some()
    }

    /// Whether a startup or end thread is still running.
    pub fn is_busy(&self) -> bool {
        let alive = |h: &Option<JoinHandle<()>>| h.as_ref().is_some_and(|h| !h.is_finished());
        alive(&self.startup_handle) || alive(&self.end_handle)
    }

    /// Current session record, if no worker holds the logger right now.
    pub fn record(&self) -> Option<SessionRecord> {
        self.logger.try_lock().ok().map(|l| l.record().clone())
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.startup_cancel.store(true, Ordering::Relaxed);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// Worker threads
// =============================================================================

fn run_startup(
    logger: Arc<Mutex<SessionLogger>>,
    tx: mpsc::Sender<SessionProgress>,
    cancel: Arc<AtomicBool>,
    decision_rx: mpsc::Receiver<HangingChoice>,
    settings: Option<SyncSettings>,
    slot: WorkerSlot,
) {
    let mut guard = lock(&logger);
    let mut sink = |msg: SessionProgress| {
        let _ = tx.send(msg);
    };
    let mut steps = StepReporter::new(constants::START_STEPS, &cancel, &mut sink);

    match open_session(&mut guard, &mut steps, &decision_rx, &cancel) {
        Ok(true) => {
            if let Some(settings) = settings {
                if let Some(worker) = start_sync(&guard, settings) {
                    *lock(&slot) = Some(worker);
                }
            }
            let record = guard.record().clone();
            tracing::info!(
                session_id = %record.session_id,
                started_at = ?record.started_at,
                "Session open"
            );
            steps.send(SessionProgress::Opened(record));
        }
        Ok(false) => {
            tracing::info!("Operator chose to exit; database left unchanged");
            steps.send(SessionProgress::Cancelled);
        }
        Err(SessionError::Cancelled) => {
            tracing::info!("Session startup cancelled");
            steps.send(SessionProgress::Cancelled);
        }
        Err(e) => {
            tracing::error!(error = %e, "Error encountered during session setup");
            steps.send(SessionProgress::Failed {
                message: e.to_string(),
            });
        }
    }
}

/// `Ok(false)` when the operator chose to exit at the hanging prompt.
fn open_session(
    logger: &mut SessionLogger,
    steps: &mut StepReporter<'_>,
    decision_rx: &mpsc::Receiver<HangingChoice>,
    cancel: &AtomicBool,
) -> Result<bool, SessionError> {
    logger.setup(steps)?;
    match logger.check_last_session(steps)? {
        Consistency::Consistent => {
            logger.start(steps)?;
        }
        Consistency::Hanging(row) => {
            steps.send(SessionProgress::Hanging(row));
            match wait_for_choice(decision_rx, cancel)? {
                HangingChoice::StartNew => {
                    steps.set_total(constants::START_NEW_AFTER_HANGING_STEPS);
                    logger.start_new(steps)?;
                }
                HangingChoice::Continue => {
                    logger.continue_last()?;
                }
                HangingChoice::Exit => return Ok(false),
            }
        }
    }
    logger.teardown(steps);
    Ok(true)
}

fn wait_for_choice(
    rx: &mpsc::Receiver<HangingChoice>,
    cancel: &AtomicBool,
) -> Result<HangingChoice, SessionError> {
    let tick = Duration::from_millis(constants::UI_POLL_INTERVAL_MS);
    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(SessionError::Cancelled);
        }
        match rx.recv_timeout(tick) {
            Ok(choice) => return Ok(choice),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => return Err(SessionError::Cancelled),
        }
    }
}

fn start_sync(logger: &SessionLogger, settings: SyncSettings) -> Option<SyncWorker> {
    let instrument = logger.instrument()?;
    let target = SyncTarget {
        watch_dir: settings.watch_dir,
        bucket_dir: instrument.bucket_dir().to_string(),
        instr_name: instrument.schema_name.clone(),
        filter: settings.filter,
        mtime_since: logger.record().started_at,
    };
    let cache = ChecksumCache::load(&settings.cache_path);
    let mut sync = FileSync::new(target, settings.store, cache);
    if let Some(delays) = settings.retry_delays {
        sync = sync.with_retry_delays(delays);
    }
    Some(SyncWorker::start(sync, settings.interval))
}

fn run_end(
    logger: Arc<Mutex<SessionLogger>>,
    tx: mpsc::Sender<SessionProgress>,
    slot: WorkerSlot,
    note: String,
) {
    let mut guard = lock(&logger);
    guard.set_note(note);

    if !guard.can_end() {
        let worker = lock(&slot).take();
        if let Some(worker) = worker {
            worker.abort();
        }
        tracing::warn!("A session was never started; exiting without logging to the database");
        let _ = tx.send(SessionProgress::NothingToEnd);
        return;
    }

    // Ending is never cancelled from the UI.
    let never = AtomicBool::new(false);
    let mut sink = |msg: SessionProgress| {
        let _ = tx.send(msg);
    };
    let mut steps = StepReporter::new(constants::END_STEPS, &never, &mut sink);

    let ended = guard.end(&mut steps);

    // Data already on disk is synced even when the database step failed.
    steps.advance("stopping sync threads..");
    let worker = lock(&slot).take();
    steps.advance("final syncing.. (do not close)");
    let final_sync = worker.and_then(SyncWorker::finish);
    tracing::debug!(report = ?final_sync, "Final sync finished");

    match ended {
        Ok(()) => {
            guard.teardown(&mut steps);
            steps.send(SessionProgress::Ended {
                record: guard.record().clone(),
                final_sync,
            });
        }
        Err(e) => {
            tracing::error!(error = %e, "Error encountered while ending the session");
            steps.send(SessionProgress::Failed {
                message: e.to_string(),
            });
        }
    }
}
