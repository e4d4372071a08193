// NexusLIMS Logger - app/state.rs
//
// Front-end state. Folds session and sync progress messages into what the
// window shows: which view is active, the progress bar, the open session,
// and sync counters. Owned by the eframe::App implementation.

use crate::core::model::{
    HangingChoice, SessionLogRow, SessionProgress, SessionRecord, SyncProgress, SyncReport,
};
use crate::util::constants;
use crate::util::logging::LogBuffer;
use std::time::{Duration, Instant};

/// Which view the main window shows.
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    /// Startup protocol running.
    Loading,
    /// Session open.
    Running,
    /// End protocol and final sync running.
    Ending,
    /// Ended; the window closes at the deadline.
    Closing { at: Instant },
    /// Something failed; the error dialog is shown, then the app exits.
    Failed { message: String },
    /// Close immediately.
    Exit,
}

/// Sync activity shown in the running view.
#[derive(Debug, Clone, Default)]
pub struct SyncStatus {
    pub passes: u32,
    pub files_uploaded: usize,
    pub bytes_uploaded: u64,
    pub failures: usize,
    pub last_report: Option<SyncReport>,
    pub last_error: Option<String>,
    pub in_pass: bool,
}

/// Top-level application state.
#[derive(Debug)]
pub struct AppState {
    pub phase: Phase,

    /// Latest step message and its position in the progress bar.
    pub status_message: String,
    pub step: u32,
    pub total_steps: u32,

    /// The open (or last) session.
    pub record: Option<SessionRecord>,

    /// Set while the hanging-session dialog is waiting for an answer.
    pub hanging: Option<SessionLogRow>,

    /// Whether the close dialog (End / Pause / Cancel) is shown.
    pub show_close_dialog: bool,

    pub show_log_window: bool,
    pub show_about: bool,

    /// Note being edited; pushed to the session manager on save.
    pub note_draft: String,
    pub note_saved: String,

    pub sync_enabled: bool,
    pub sync: SyncStatus,

    /// Lines captured from the tracing subscriber.
    pub log_buffer: LogBuffer,

    // Requests raised by panels, handled by the app each frame.
    pub pending_choice: Option<HangingChoice>,
    pub request_end: bool,
    pub request_pause: bool,
    pub request_save_note: bool,
}

impl AppState {
    pub fn new(log_buffer: LogBuffer, sync_enabled: bool) -> Self {
        Self {
            phase: Phase::Loading,
            status_message: "Connecting to the session database...".to_string(),
            step: 0,
            total_steps: constants::START_STEPS,
            record: None,
            hanging: None,
            show_close_dialog: false,
            show_log_window: false,
            show_about: false,
            note_draft: String::new(),
            note_saved: String::new(),
            sync_enabled,
            sync: SyncStatus::default(),
            log_buffer,
            pending_choice: None,
            request_end: false,
            request_pause: false,
            request_save_note: false,
        }
    }

    /// Progress bar fill in `0.0..=1.0`.
    pub fn progress_fraction(&self) -> f32 {
        if self.total_steps == 0 {
            return 0.0;
        }
        (self.step as f32 / self.total_steps as f32).clamp(0.0, 1.0)
    }

    pub fn note_dirty(&self) -> bool {
        self.note_draft != self.note_saved
    }

    /// Switch to the ending view.
    pub fn begin_end(&mut self) {
        self.phase = Phase::Ending;
        self.show_close_dialog = false;
        self.step = 0;
        self.total_steps = constants::END_STEPS;
        self.status_message = "Ending the session...".to_string();
    }

    /// Seconds left before the window closes, when closing.
    pub fn close_countdown(&self, now: Instant) -> Option<u64> {
        match self.phase {
            Phase::Closing { at } => Some(at.saturating_duration_since(now).as_secs()),
            _ => None,
        }
    }

    pub fn apply_session(&mut self, msg: SessionProgress) {
        match msg {
            SessionProgress::Step {
                message,
                step,
                total,
            } => {
                self.status_message = message;
                self.step = step;
                self.total_steps = total;
            }
            SessionProgress::Hanging(row) => {
                self.status_message = "Waiting for a decision about the previous session".to_string();
                self.hanging = Some(row);
            }
            SessionProgress::Opened(record) => {
                self.hanging = None;
                self.note_draft = record.note.clone();
                self.note_saved = record.note.clone();
                self.record = Some(record);
                self.phase = Phase::Running;
            }
            SessionProgress::Ended { record, final_sync } => {
                if let Some(report) = final_sync {
                    self.record_pass(report);
                }
                self.record = Some(record);
                self.step = self.total_steps;
                self.status_message = format!(
                    "Closing window in {} seconds...",
                    constants::CLOSE_DELAY_SECS
                );
                self.phase = Phase::Closing {
                    at: Instant::now() + Duration::from_secs(constants::CLOSE_DELAY_SECS),
                };
            }
            SessionProgress::NothingToEnd | SessionProgress::Cancelled => {
                self.phase = Phase::Exit;
            }
            SessionProgress::Failed { message } => {
                self.hanging = None;
                self.phase = Phase::Failed { message };
            }
        }
    }

    pub fn apply_sync(&mut self, msg: SyncProgress) {
        match msg {
            SyncProgress::PassStarted { .. } => self.sync.in_pass = true,
            SyncProgress::FileUploaded { .. } => {}
            SyncProgress::FileFailed { path, error } => {
                self.sync.last_error = Some(format!("{}: {error}", path.display()));
            }
            SyncProgress::PassCompleted { report, .. } => {
                self.sync.in_pass = false;
                self.record_pass(report);
            }
            SyncProgress::PassFailed { error } => {
                self.sync.in_pass = false;
                self.sync.passes += 1;
                self.sync.last_error = Some(error);
            }
            SyncProgress::Stopped => self.sync.in_pass = false,
        }
    }

    fn record_pass(&mut self, report: SyncReport) {
        self.sync.passes += 1;
        self.sync.files_uploaded += report.uploaded;
        self.sync.bytes_uploaded += report.bytes_uploaded;
        self.sync.failures += report.failed;
        if report.is_clean() {
            self.sync.last_error = None;
        }
        self.sync.last_report = Some(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AppState {
        AppState::new(LogBuffer::default(), true)
    }

    #[test]
    fn steps_drive_the_progress_bar() {
        let mut s = state();
        s.apply_session(SessionProgress::Step {
            message: "Connected to db".to_string(),
            step: 1,
            total: 5,
        });
        assert_eq!(s.status_message, "Connected to db");
        assert!((s.progress_fraction() - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn opened_switches_to_running_view() {
        let mut s = state();
        let record = SessionRecord {
            session_id: "abc".to_string(),
            ..SessionRecord::default()
        };
        s.apply_session(SessionProgress::Opened(record));
        assert_eq!(s.phase, Phase::Running);
        assert_eq!(s.record.as_ref().map(|r| r.session_id.as_str()), Some("abc"));
    }

    #[test]
    fn ended_starts_close_countdown_and_counts_final_pass() {
        let mut s = state();
        s.begin_end();
        s.apply_session(SessionProgress::Ended {
            record: SessionRecord::default(),
            final_sync: Some(SyncReport {
                uploaded: 3,
                ..SyncReport::default()
            }),
        });
        assert!(matches!(s.phase, Phase::Closing { .. }));
        assert_eq!(s.sync.files_uploaded, 3);
        assert!(s.close_countdown(Instant::now()).is_some());
    }

    #[test]
    fn sync_failures_are_remembered_until_a_clean_pass() {
        let mut s = state();
        s.apply_sync(SyncProgress::FileFailed {
            path: "a.dm3".into(),
            error: "HTTP 503".to_string(),
        });
        s.apply_sync(SyncProgress::PassCompleted {
            report: SyncReport {
                failed: 1,
                ..SyncReport::default()
            },
            final_pass: false,
        });
        assert!(s.sync.last_error.is_some());
        s.apply_sync(SyncProgress::PassCompleted {
            report: SyncReport::default(),
            final_pass: false,
        });
        assert!(s.sync.last_error.is_none());
        assert_eq!(s.sync.passes, 2);
        assert_eq!(s.sync.failures, 1);
    }

    #[test]
    fn failure_moves_to_failed_phase() {
        let mut s = state();
        s.apply_session(SessionProgress::Failed {
            message: "boom".to_string(),
        });
        assert_eq!(
            s.phase,
            Phase::Failed {
                message: "boom".to_string()
            }
        );
    }
}
