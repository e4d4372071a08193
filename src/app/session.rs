// NexusLIMS Logger - app/session.rs
//
// Session state machine: talks to the session database to open and close
// a session for this computer's instrument.
//
// Protocol:
//   setup        GET  api/instrument?computer_name=...
//   check        GET  api/lastsession?instrument=...
//   start        POST api/session (START), then GET api/lastsession to verify
//   end          POST api/session (END, TO_BE_BUILT), verify the END row,
//                fetch the matching START, PUT its status to TO_BE_BUILT,
//                GET api/session to verify the update
//
// Every step checks the cancel flag first and reports one progress step
// when it completes. The logger itself is synchronous; `SessionManager`
// runs it on worker threads.

use crate::core::model::{
    parse_api_timestamp, Consistency, EventType, InstrumentInfo, NewSessionLog, RecordStatus,
    SessionLogRow, SessionProgress, SessionRecord, SessionStatus,
};
use crate::platform::dbapi::DbApi;
use crate::util::error::SessionError;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};

// =============================================================================
// Step reporting
// =============================================================================

/// Cancel checks and numbered progress messages for one operation.
pub struct StepReporter<'a> {
    cancel: &'a AtomicBool,
    sink: &'a mut dyn FnMut(SessionProgress),
    step: u32,
    total: u32,
}

impl<'a> StepReporter<'a> {
    pub fn new(total: u32, cancel: &'a AtomicBool, sink: &'a mut dyn FnMut(SessionProgress)) -> Self {
        Self {
            cancel,
            sink,
            step: 0,
            total,
        }
    }

    /// `Err(Cancelled)` once the cancel flag is set.
    pub fn check_cancel(&self) -> Result<(), SessionError> {
        if self.cancel.load(Ordering::Relaxed) {
            Err(SessionError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Record one completed step.
    pub fn advance(&mut self, message: impl Into<String>) {
        self.step += 1;
        let message = message.into();
        tracing::debug!(step = self.step, total = self.total, "{message}");
        (self.sink)(SessionProgress::Step {
            message,
            step: self.step.min(self.total),
            total: self.total,
        });
    }

    pub fn set_total(&mut self, total: u32) {
        self.total = total;
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    /// Forward a non-step message on the same channel.
    pub fn send(&mut self, msg: SessionProgress) {
        (self.sink)(msg);
    }
}

// =============================================================================
// SessionLogger
// =============================================================================

/// Opens and closes one session for this computer's instrument.
pub struct SessionLogger {
    api: Box<dyn DbApi>,
    computer_name: String,
    record: SessionRecord,
    /// Last row seen by `check_last_session` when it was a START.
    hanging: Option<SessionLogRow>,
    /// A START row exists in the database for `record.session_id`.
    start_logged: bool,
}

impl SessionLogger {
    /// A logger for `user` on `computer_name`, with a fresh session id.
    pub fn new(api: Box<dyn DbApi>, user: impl Into<String>, computer_name: impl Into<String>) -> Self {
        let record = SessionRecord {
            session_id: uuid::Uuid::new_v4().to_string(),
            user: user.into(),
            ..SessionRecord::default()
        };
        Self {
            api,
            computer_name: computer_name.into(),
            record,
            hanging: None,
            start_logged: false,
        }
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub fn session_id(&self) -> &str {
        &self.record.session_id
    }

    pub fn computer_name(&self) -> &str {
        &self.computer_name
    }

    pub fn instrument(&self) -> Option<&InstrumentInfo> {
        self.record.instrument.as_ref()
    }

    pub fn hanging(&self) -> Option<&SessionLogRow> {
        self.hanging.as_ref()
    }

    /// Whether there is a START in the database that `end` would close.
    pub fn can_end(&self) -> bool {
        self.start_logged && self.record.status != SessionStatus::Closed
    }

    /// Free text sent with the START and END rows.
    pub fn set_note(&mut self, note: impl Into<String>) {
        self.record.note = note.into();
    }

    fn instrument_pid(&self) -> Result<String, SessionError> {
        self.record
            .instrument
            .as_ref()
            .map(|i| i.instrument_pid.clone())
            .ok_or(SessionError::NotSetUp)
    }

    fn instrument_label(&self) -> String {
        self.record
            .instrument
            .as_ref()
            .map(|i| i.schema_name.clone())
            .unwrap_or_default()
    }

    fn fail(&mut self, e: SessionError) -> SessionError {
        if !matches!(e, SessionError::Cancelled) {
            self.record.status = SessionStatus::Failed;
        }
        e
    }

    /// Look up the instrument registered for this computer.
    pub fn setup(&mut self, steps: &mut StepReporter<'_>) -> Result<&InstrumentInfo, SessionError> {
        tracing::info!(user = %self.record.user, computer = %self.computer_name, session_id = %self.record.session_id, "Session setup");
        self.record.status = SessionStatus::Starting;
        steps.check_cancel()?;

        let info = self
            .api
            .instrument_for_computer(&self.computer_name)
            .map_err(|source| SessionError::Api {
                step: "Error fetching instrument information from DB",
                source,
            })
            .map_err(|e| self.fail(e))?;
        tracing::info!(
            instrument = %info.instrument_pid,
            schema = %info.schema_name,
            bucket_dir = %info.bucket_dir(),
            "Connected to db"
        );
        tracing::debug!(extra = ?info.extra, "Instrument info");
        self.record.instrument = Some(info);
        steps.advance("Connected to db");
        self.record.instrument.as_ref().ok_or(SessionError::NotSetUp)
    }

    /// Whether the instrument's last session was properly ended.
    pub fn check_last_session(
        &mut self,
        steps: &mut StepReporter<'_>,
    ) -> Result<Consistency, SessionError> {
        let pid = self.instrument_pid()?;
        steps.check_cancel()?;

        let last = self
            .api
            .last_session_for_instrument(&pid)
            .map_err(|source| SessionError::Api {
                step: "Error checking the last session for this instrument",
                source,
            })
            .map_err(|e| self.fail(e))?;

        let instrument = self.instrument_label();
        match last {
            None => {
                self.hanging = None;
                steps.advance(format!("Verified database consistency for the {instrument}."));
                Ok(Consistency::Consistent)
            }
            Some(row) => match row.event() {
                Some(EventType::End) => {
                    self.hanging = None;
                    steps.advance(format!("Verified database consistency for the {instrument}."));
                    Ok(Consistency::Consistent)
                }
                Some(EventType::Start) => {
                    let msg = format!(
                        "Database is inconsistent for the {instrument}. (last entry [id_session_log = {}] was a `START`)",
                        row.id_session_log
                    );
                    tracing::warn!("{msg}");
                    steps.advance(msg);
                    self.hanging = Some(row.clone());
                    Ok(Consistency::Hanging(row))
                }
                None => Err(self.fail(SessionError::UnexpectedEventType {
                    instrument,
                    value: row.event_type,
                })),
            },
        }
    }

    /// Insert the START row and verify it; returns the recorded start time.
    pub fn start(&mut self, steps: &mut StepReporter<'_>) -> Result<DateTime<Utc>, SessionError> {
        if self.start_logged && self.record.status == SessionStatus::Open {
            return Err(SessionError::AlreadyOpen {
                session_id: self.record.session_id.clone(),
            });
        }
        let pid = self.instrument_pid()?;
        steps.check_cancel()?;

        let log = NewSessionLog {
            event_type: EventType::Start,
            instrument: pid,
            user: self.record.user.clone(),
            session_identifier: self.record.session_id.clone(),
            session_note: self.record.note.clone(),
            record_status: None,
        };
        self.api
            .insert_session_log(&log)
            .map_err(|source| SessionError::Api {
                step: "Error inserting `START` log into DB",
                source,
            })
            .map_err(|e| self.fail(e))?;
        self.start_logged = true;
        tracing::info!(session_id = %self.record.session_id, "`START` session inserted into db");
        steps.advance("`START` session inserted into db.");

        steps.check_cancel()?;
        let row = self
            .api
            .last_session_event(&self.record.session_id, EventType::Start)
            .map_err(|source| SessionError::Api {
                step: "Error verifying that session was started",
                source,
            })
            .map_err(|e| self.fail(e))?;
        let started_at = row_timestamp(&row).map_err(|e| self.fail(e))?;
        tracing::debug!(row = ?row, "Verified insertion of START row");
        steps.advance(format!("Verified insertion of row {}", row.id_session_log));

        self.record.started_at = Some(started_at);
        self.record.status = SessionStatus::Open;
        Ok(started_at)
    }

    /// Insert the END row and mark the matching START as ready to build.
    pub fn end(&mut self, steps: &mut StepReporter<'_>) -> Result<(), SessionError> {
        if !self.can_end() {
            return Err(SessionError::NotOpen);
        }
        let pid = self.instrument_pid()?;
        self.record.status = SessionStatus::Ending;
        steps.check_cancel()?;

        let log = NewSessionLog {
            event_type: EventType::End,
            instrument: pid,
            user: self.record.user.clone(),
            session_identifier: self.record.session_id.clone(),
            session_note: self.record.note.clone(),
            record_status: Some(RecordStatus::ToBeBuilt),
        };
        self.api
            .insert_session_log(&log)
            .map_err(|source| SessionError::Api {
                step: "Error inserting `END` log for session",
                source,
            })
            .map_err(|e| self.fail(e))?;
        tracing::info!(session_id = %self.record.session_id, "`END` session log inserted into db");
        steps.advance("`END` session log inserted into db");

        steps.check_cancel()?;
        let end_row = self
            .api
            .last_session_event(&self.record.session_id, EventType::End)
            .map_err(|source| SessionError::Api {
                step: "Error verifying that session was ended",
                source,
            })
            .map_err(|e| self.fail(e))?;
        tracing::debug!(row = ?end_row, "Verified END row");
        steps.advance("Verified `END` session inserted into db.");

        steps.check_cancel()?;
        let start_row = self
            .api
            .last_session_event(&self.record.session_id, EventType::Start)
            .map_err(|source| SessionError::Api {
                step: "Error getting matching `START` log",
                source,
            })
            .map_err(|e| self.fail(e))?;
        tracing::debug!(row = ?start_row, "Found matching START row");
        steps.advance(format!(
            "Found matching `START` log (id_session_log = {})",
            start_row.id_session_log
        ));

        steps.check_cancel()?;
        self.api
            .update_record_status(start_row.id_session_log, RecordStatus::ToBeBuilt)
            .map_err(|source| SessionError::Api {
                step: "Error updating matching `START` log's status",
                source,
            })
            .map_err(|e| self.fail(e))?;
        tracing::info!(id_session_log = start_row.id_session_log, "Matching `START` session log's status updated");
        steps.advance("Matching `START` session log's status updated.");

        steps.check_cancel()?;
        let updated = self
            .api
            .session_log(start_row.id_session_log, RecordStatus::ToBeBuilt)
            .map_err(|source| SessionError::Api {
                step: "Error verifying the matching `START` log's status",
                source,
            })
            .map_err(|e| self.fail(e))?;
        tracing::debug!(row = ?updated, "Verified updated row");
        steps.advance(format!("Verified updated row {}", updated.id_session_log));

        self.record.ended_at = end_row
            .timestamp
            .as_deref()
            .and_then(parse_api_timestamp)
            .or_else(|| Some(Utc::now()));
        self.record.status = SessionStatus::Closed;
        tracing::info!(session_id = %self.record.session_id, "Finished ending session");
        Ok(())
    }

    /// Adopt the hanging session found by `check_last_session` as the open
    /// session, without writing to the database.
    pub fn continue_last(&mut self) -> Result<DateTime<Utc>, SessionError> {
        let row = self.hanging.take().ok_or(SessionError::NoHangingSession)?;
        let started_at = row_timestamp(&row)?;
        tracing::info!(
            session_id = %row.session_identifier,
            started_at = %started_at,
            "Continuing the existing session"
        );
        self.record.session_id = row.session_identifier;
        self.record.started_at = Some(started_at);
        self.record.status = SessionStatus::Open;
        self.start_logged = true;
        Ok(started_at)
    }

    /// End the hanging session under its own id, then start a fresh one.
    pub fn start_new(&mut self, steps: &mut StepReporter<'_>) -> Result<DateTime<Utc>, SessionError> {
        let row = self.hanging.take().ok_or(SessionError::NoHangingSession)?;
        let fresh_id = self.record.session_id.clone();

        tracing::info!(session_id = %row.session_identifier, "Ending the existing session before starting a new one");
        self.record.session_id = row.session_identifier.clone();
        self.start_logged = true;
        if let Err(e) = self.end(steps) {
            self.record.session_id = fresh_id;
            self.start_logged = false;
            return Err(e);
        }

        // A fresh id, never the one just closed.
        self.record.session_id = if fresh_id == row.session_identifier {
            uuid::Uuid::new_v4().to_string()
        } else {
            fresh_id
        };
        self.record.ended_at = None;
        self.record.status = SessionStatus::Starting;
        self.start_logged = false;
        tracing::info!(session_id = %self.record.session_id, "Starting a new session");
        self.start(steps)
    }

    /// Final step of an operation.
    pub fn teardown(&mut self, steps: &mut StepReporter<'_>) {
        steps.advance("Done");
    }
}

fn row_timestamp(row: &SessionLogRow) -> Result<DateTime<Utc>, SessionError> {
    let raw = row.timestamp.as_deref().unwrap_or_default();
    parse_api_timestamp(raw).ok_or_else(|| SessionError::BadTimestamp {
        value: raw.to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================
