// NexusLIMS Logger - core/model.rs
//
// Core data model types. Pure data definitions with no I/O, no UI,
// no platform dependencies.
//
// These types are the shared vocabulary across all layers.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// =============================================================================
// Instrument
// =============================================================================

/// Instrument record returned by the database API for this computer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentInfo {
    /// Persistent instrument identifier (e.g. `FEI-Titan-TEM-635816`).
    pub instrument_pid: String,

    /// Human-readable schema name, attached to uploaded objects.
    pub schema_name: String,

    /// Bucket sub-directory for this instrument's files.
    #[serde(default)]
    pub filestore_path: Option<String>,

    /// Remaining columns, kept for logging.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl InstrumentInfo {
    /// Bucket directory objects are uploaded under.
    ///
    /// The instrument's `filestore_path` when set, otherwise its PID.
    /// Relative spellings (`./Titan`) lose their leading `./`.
    pub fn bucket_dir(&self) -> &str {
        let dir = self
            .filestore_path
            .as_deref()
            .map(|d| d.trim().trim_start_matches("./").trim_matches('/'))
            .unwrap_or_default();
        if dir.is_empty() {
            &self.instrument_pid
        } else {
            dir
        }
    }
}

// =============================================================================
// Session log rows
// =============================================================================

/// Event type of a session log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Start,
    End,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Start => "START",
            EventType::End => "END",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record-building status stored on session log rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    WaitingForEnd,
    ToBeBuilt,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::WaitingForEnd => "WAITING_FOR_END",
            RecordStatus::ToBeBuilt => "TO_BE_BUILT",
        }
    }
}

/// One row of the remote session log table.
///
/// `event_type` stays a string: the API may return values other than
/// `START`/`END`, and those must be reported rather than rejected at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLogRow {
    pub id_session_log: i64,
    pub event_type: String,
    pub session_identifier: String,
    #[serde(default)]
    pub instrument: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub record_status: Option<String>,
}

impl SessionLogRow {
    pub fn event(&self) -> Option<EventType> {
        match self.event_type.as_str() {
            "START" => Some(EventType::Start),
            "END" => Some(EventType::End),
            _ => None,
        }
    }
}

/// Payload for inserting a START or END row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSessionLog {
    pub event_type: EventType,
    pub instrument: String,
    pub user: String,
    pub session_identifier: String,
    pub session_note: String,
    pub record_status: Option<RecordStatus>,
}

impl NewSessionLog {
    /// Form fields in the order the API documents them.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("event_type", self.event_type.as_str().to_string()),
            ("instrument", self.instrument.clone()),
            ("user", self.user.clone()),
            ("session_identifier", self.session_identifier.clone()),
            ("session_note", self.session_note.clone()),
        ];
        if let Some(status) = self.record_status {
            fields.push(("record_status", status.as_str().to_string()));
        }
        fields
    }
}

/// Result of comparing the instrument's last log row against expectations.
#[derive(Debug, Clone, PartialEq)]
pub enum Consistency {
    /// Last row is an END, or the instrument has no rows at all.
    Consistent,
    /// Last row is a START: a previous session was never ended.
    Hanging(SessionLogRow),
}

/// How the operator wants to resolve a hanging session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HangingChoice {
    /// End the hanging session, then start a new one.
    StartNew,
    /// Adopt the hanging session as the current one.
    Continue,
    /// Leave the database untouched and quit.
    Exit,
}

// =============================================================================
// Session state
// =============================================================================

/// Lifecycle of the logger's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Idle,
    Starting,
    Open,
    Ending,
    Closed,
    Failed,
}

impl SessionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "Idle",
            SessionStatus::Starting => "Starting",
            SessionStatus::Open => "Open",
            SessionStatus::Ending => "Ending",
            SessionStatus::Closed => "Closed",
            SessionStatus::Failed => "Failed",
        }
    }
}

/// Messages sent from session worker threads to the front-end.
#[derive(Debug, Clone)]
pub enum SessionProgress {
    /// One protocol step completed.
    Step {
        message: String,
        step: u32,
        total: u32,
    },
    /// The last session was never ended; the worker waits for a
    /// [`HangingChoice`].
    Hanging(SessionLogRow),
    /// The session is open and file sync (if configured) is running.
    Opened(SessionRecord),
    /// The session was ended; carries the final sync report when sync ran.
    Ended {
        record: SessionRecord,
        final_sync: Option<SyncReport>,
    },
    /// Nothing was logged: no session was ever opened.
    NothingToEnd,
    /// The operator chose to exit, or the operation was cancelled.
    Cancelled,
    /// The operation failed; the front-end shows the message and exits.
    Failed { message: String },
}

/// In-memory view of the current session.
#[derive(Debug, Clone, Default)]
pub struct SessionRecord {
    pub session_id: String,
    pub user: String,
    pub instrument: Option<InstrumentInfo>,
    pub note: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
}

// =============================================================================
// File sync
// =============================================================================

/// A file whose current content has not been uploaded yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCandidate {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Base64 content checksum at discovery time.
    pub checksum: String,
    /// Size in bytes at discovery time.
    pub size: u64,
}

/// Outcome of one synchronisation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub candidates: usize,
    pub uploaded: usize,
    pub failed: usize,
    /// Files that disappeared between discovery and upload.
    pub skipped: usize,
    pub bytes_uploaded: u64,
    pub duration: Duration,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Messages sent from the sync worker to the front-end.
#[derive(Debug, Clone)]
pub enum SyncProgress {
    /// A pass began walking the watched directory.
    PassStarted { final_pass: bool },
    /// One file was uploaded.
    FileUploaded { object_name: String, bytes: u64 },
    /// One file exhausted its upload attempts; it is retried next pass.
    FileFailed { path: PathBuf, error: String },
    /// A pass finished.
    PassCompleted { report: SyncReport, final_pass: bool },
    /// A pass could not run at all (e.g. the watched directory vanished).
    PassFailed { error: String },
    /// The worker thread has exited.
    Stopped,
}

// =============================================================================
// Timestamps
// =============================================================================

/// Parse a timestamp as returned by the database API.
///
/// Accepts RFC 3339, RFC 2822 / HTTP-date (`Tue, 05 Mar 2024 10:00:00 GMT`),
/// and naive `YYYY-MM-DD HH:MM:SS[.f]` or `YYYY-MM-DDTHH:MM:SS[.f]`, which
/// are taken as UTC.
pub fn parse_api_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // chrono's RFC 2822 parser rejects some HTTP-date spellings (e.g. "UTC").
    for suffix in [" GMT", " UTC"] {
        if let Some(body) = s.strip_suffix(suffix) {
            if let Ok(naive) = NaiveDateTime::parse_from_str(body, "%a, %d %b %Y %H:%M:%S") {
                return Some(naive.and_utc());
            }
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn instrument(filestore: Option<&str>) -> InstrumentInfo {
        InstrumentInfo {
            instrument_pid: "FEI-Titan-TEM-635816".to_string(),
            schema_name: "FEI Titan TEM".to_string(),
            filestore_path: filestore.map(str::to_string),
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn bucket_dir_prefers_filestore_path() {
        assert_eq!(instrument(Some("Titan/")).bucket_dir(), "Titan");
        assert_eq!(instrument(Some("./Titan")).bucket_dir(), "Titan");
        assert_eq!(instrument(None).bucket_dir(), "FEI-Titan-TEM-635816");
        assert_eq!(instrument(Some("  ")).bucket_dir(), "FEI-Titan-TEM-635816");
    }

    #[test]
    fn instrument_keeps_unknown_columns() {
        let info: InstrumentInfo = serde_json::from_str(
            r#"{"instrument_pid":"p","schema_name":"s","location":"B101"}"#,
        )
        .unwrap();
        assert_eq!(info.filestore_path, None);
        assert_eq!(info.extra["location"], "B101");
    }

    #[test]
    fn row_with_unknown_event_type_still_parses() {
        let row: SessionLogRow = serde_json::from_str(
            r#"{"id_session_log":7,"event_type":"PAUSE","session_identifier":"x"}"#,
        )
        .unwrap();
        assert_eq!(row.event(), None);
        assert_eq!(row.event_type, "PAUSE");
    }

    #[test]
    fn end_payload_carries_record_status() {
        let payload = NewSessionLog {
            event_type: EventType::End,
            instrument: "p".to_string(),
            user: "u".to_string(),
            session_identifier: "id".to_string(),
            session_note: String::new(),
            record_status: Some(RecordStatus::ToBeBuilt),
        };
        let fields = payload.form_fields();
        assert!(fields.contains(&("event_type", "END".to_string())));
        assert!(fields.contains(&("record_status", "TO_BE_BUILT".to_string())));
    }

    #[test]
    fn timestamps_in_all_api_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();
        assert_eq!(parse_api_timestamp("2024-03-05T10:00:00Z"), Some(expected));
        assert_eq!(
            parse_api_timestamp("2024-03-05T11:00:00+01:00"),
            Some(expected)
        );
        assert_eq!(
            parse_api_timestamp("Tue, 05 Mar 2024 10:00:00 GMT"),
            Some(expected)
        );
        assert_eq!(parse_api_timestamp("2024-03-05 10:00:00"), Some(expected));
        assert_eq!(
            parse_api_timestamp("2024-03-05 10:00:00.000"),
            Some(expected)
        );
        assert_eq!(parse_api_timestamp("yesterday"), None);
        assert_eq!(parse_api_timestamp(""), None);
    }
}
