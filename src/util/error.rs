// NexusLIMS Logger - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// Each subsystem owns an enum; `LoggerError` wraps them for the binary.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all logger operations.
#[derive(Debug)]
pub enum LoggerError {
    /// Configuration loading or validation failed.
    Config(ConfigError),

    /// A database API call failed.
    DbApi(DbApiError),

    /// The session state machine rejected an operation or a step failed.
    Session(SessionError),

    /// Cloud storage authentication or upload failed.
    Storage(StorageError),

    /// File synchronisation failed.
    Sync(SyncError),

    /// Another logger instance holds the lock.
    Lock(LockError),

    /// The file store share could not be connected.
    NetworkDrive(crate::platform::network_drive::NetworkDriveError),

    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for LoggerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::DbApi(e) => write!(f, "Database API error: {e}"),
            Self::Session(e) => write!(f, "Session error: {e}"),
            Self::Storage(e) => write!(f, "Storage error: {e}"),
            Self::Sync(e) => write!(f, "Sync error: {e}"),
            Self::Lock(e) => write!(f, "{e}"),
            Self::NetworkDrive(e) => write!(f, "Network drive error: {e}"),
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for LoggerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::DbApi(e) => Some(e),
            Self::Session(e) => Some(e),
            Self::Storage(e) => Some(e),
            Self::Sync(e) => Some(e),
            Self::Lock(e) => Some(e),
            Self::NetworkDrive(e) => Some(e),
            Self::Io { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading and validation.
#[derive(Debug)]
pub enum ConfigError {
    /// A required key is absent from both the environment and the file.
    MissingKey { key: &'static str },

    /// A value could not be parsed or is out of range.
    InvalidValue {
        key: &'static str,
        value: String,
        expected: String,
    },

    /// The config file is not valid JSON.
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The config file exists but could not be read.
    Io { path: PathBuf, source: io::Error },

    /// The configured file store is not an existing directory.
    FilestoreNotFound { path: PathBuf },

    /// Network-drive settings are present without a username.
    NetworkDriveUsernameMissing,

    /// A bucket is configured but the credential file is missing.
    CredentialsNotFound { path: PathBuf },

    /// The user's home directory could not be determined.
    HomeDirUnavailable,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKey { key } => write!(
                f,
                "'{key}' is not set in the environment or the config file"
            ),
            Self::InvalidValue {
                key,
                value,
                expected,
            } => write!(f, "'{key}' = '{value}' is invalid. Expected: {expected}"),
            Self::Json { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
            Self::FilestoreNotFound { path } => {
                write!(f, "filestore path '{}' does not exist", path.display())
            }
            Self::NetworkDriveUsernameMissing => write!(
                f,
                "networkdrive_username must be set when network drive settings are configured"
            ),
            Self::CredentialsNotFound { path } => {
                write!(f, "Credential file '{}' cannot be found", path.display())
            }
            Self::HomeDirUnavailable => write!(f, "cannot determine the user's home directory"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for LoggerError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Database API errors
// ---------------------------------------------------------------------------

/// Errors returned by the database API client.
#[derive(Debug)]
pub enum DbApiError {
    /// The base URL or an endpoint could not be joined.
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    /// Transport-level failure (DNS, connect, timeout, body read).
    Http { url: String, source: reqwest::Error },

    /// The API answered with a non-success status.
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// The response body did not have the expected shape.
    Malformed { url: String, reason: String },

    /// The root endpoint answered, but not as the session database API.
    Unhealthy { url: String, body: String },
}

impl fmt::Display for DbApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl { url, source } => write!(f, "invalid URL '{url}': {source}"),
            Self::Http { url, source } => write!(f, "request to '{url}' failed: {source}"),
            Self::Status { url, status, body } => {
                write!(f, "'{url}' returned HTTP {status}: {}", body.trim())
            }
            Self::Malformed { url, reason } => {
                write!(f, "unexpected response from '{url}': {reason}")
            }
            Self::Unhealthy { url, body } => write!(
                f,
                "api_url '{url}' is not responding as the session database API (got '{}')",
                body.trim()
            ),
        }
    }
}

impl std::error::Error for DbApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidUrl { source, .. } => Some(source),
            Self::Http { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<DbApiError> for LoggerError {
    fn from(e: DbApiError) -> Self {
        Self::DbApi(e)
    }
}

// ---------------------------------------------------------------------------
// Session errors
// ---------------------------------------------------------------------------

/// Errors raised by the session state machine.
#[derive(Debug)]
pub enum SessionError {
    /// An operation needs the instrument, but setup has not run.
    NotSetUp,

    /// `start` was called while a session is already open.
    AlreadyOpen { session_id: String },

    /// `end` was called without an open session.
    NotOpen,

    /// The last log for the instrument is neither START nor END.
    UnexpectedEventType { instrument: String, value: String },

    /// A hanging-session resolution was requested but none was found.
    NoHangingSession,

    /// A timestamp returned by the API could not be parsed.
    BadTimestamp { value: String },

    /// The operator cancelled the operation.
    Cancelled,

    /// An API call failed during the named step.
    Api {
        step: &'static str,
        source: DbApiError,
    },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSetUp => write!(
                f,
                "instrument information must be loaded before checking the database"
            ),
            Self::AlreadyOpen { session_id } => {
                write!(f, "session {session_id} is already open")
            }
            Self::NotOpen => write!(f, "no session has been started"),
            Self::UnexpectedEventType { instrument, value } => write!(
                f,
                "last entry for the {instrument} was neither `START` or `END` (value was {value})"
            ),
            Self::NoHangingSession => write!(f, "no hanging session to resolve"),
            Self::BadTimestamp { value } => write!(f, "cannot parse timestamp '{value}'"),
            Self::Cancelled => write!(f, "terminated from the GUI thread"),
            Self::Api { step, source } => write!(f, "{step}: {source}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Api { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<SessionError> for LoggerError {
    fn from(e: SessionError) -> Self {
        Self::Session(e)
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

/// Errors related to cloud storage authentication and uploads.
#[derive(Debug)]
pub enum StorageError {
    /// The credential file could not be read.
    CredentialsIo { path: PathBuf, source: io::Error },

    /// The credential file is not a valid service-account key.
    CredentialsParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The service-account assertion could not be signed.
    Jwt {
        source: jsonwebtoken::errors::Error,
    },

    /// The token endpoint refused the assertion.
    Token { reason: String },

    /// An endpoint URL could not be built.
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    /// Transport-level failure.
    Http { source: reqwest::Error },

    /// The storage API answered with a non-success status.
    Status { status: u16, body: String },

    /// The local file to upload could not be opened.
    FileIo { path: PathBuf, source: io::Error },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CredentialsIo { path, source } => {
                write!(f, "cannot read credentials '{}': {source}", path.display())
            }
            Self::CredentialsParse { path, source } => {
                write!(f, "invalid credentials '{}': {source}", path.display())
            }
            Self::Jwt { source } => write!(f, "cannot sign service-account assertion: {source}"),
            Self::Token { reason } => write!(f, "token request failed: {reason}"),
            Self::InvalidUrl { url, source } => write!(f, "invalid URL '{url}': {source}"),
            Self::Http { source } => write!(f, "storage request failed: {source}"),
            Self::Status { status, body } => {
                write!(f, "storage API returned HTTP {status}: {}", body.trim())
            }
            Self::FileIo { path, source } => {
                write!(f, "cannot open '{}' for upload: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CredentialsIo { source, .. } => Some(source),
            Self::CredentialsParse { source, .. } => Some(source),
            Self::Jwt { source } => Some(source),
            Self::InvalidUrl { source, .. } => Some(source),
            Self::Http { source } => Some(source),
            Self::FileIo { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<StorageError> for LoggerError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Sync errors
// ---------------------------------------------------------------------------

/// Errors related to the file synchronisation pass.
#[derive(Debug)]
pub enum SyncError {
    /// The watched directory does not exist or is not a directory.
    WatchDirNotFound { path: PathBuf },

    /// The checksum cache could not be written.
    CacheWrite { path: PathBuf, source: io::Error },

    /// The checksum cache could not be serialised.
    CacheSerialise { source: serde_json::Error },
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WatchDirNotFound { path } => {
                write!(f, "watched directory '{}' does not exist", path.display())
            }
            Self::CacheWrite { path, source } => {
                write!(f, "cannot write cache '{}': {source}", path.display())
            }
            Self::CacheSerialise { source } => write!(f, "cannot serialise cache: {source}"),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CacheWrite { source, .. } => Some(source),
            Self::CacheSerialise { source } => Some(source),
            _ => None,
        }
    }
}

impl From<SyncError> for LoggerError {
    fn from(e: SyncError) -> Self {
        Self::Sync(e)
    }
}

// ---------------------------------------------------------------------------
// Instance lock errors
// ---------------------------------------------------------------------------

/// Errors from the single-instance lock.
#[derive(Debug)]
pub enum LockError {
    /// Another live process holds the lock.
    AlreadyRunning { path: PathBuf, pid: Option<u32> },

    /// The lock file could not be created or inspected.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRunning { path, pid } => {
                write!(
                    f,
                    "Only one instance of the NexusLIMS Session Logger can be run at one time. \
                     Please close the existing window if you would like to start a new session \
                     and run the application again."
                )?;
                match pid {
                    Some(pid) => write!(f, " (lock '{}' held by process {pid})", path.display())?,
                    None => write!(f, " (lock '{}')", path.display())?,
                }
                write!(
                    f,
                    ". If no logger is running, delete '{}' and try again.",
                    path.display()
                )
            }
            Self::Io { path, source } => {
                write!(f, "cannot create lock file '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for LockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<LockError> for LoggerError {
    fn from(e: LockError) -> Self {
        Self::Lock(e)
    }
}

impl From<crate::platform::network_drive::NetworkDriveError> for LoggerError {
    fn from(e: crate::platform::network_drive::NetworkDriveError) -> Self {
        Self::NetworkDrive(e)
    }
}

/// Convenience type alias for logger results.
pub type Result<T> = std::result::Result<T, LoggerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn session_api_error_keeps_cause_chain() {
        let inner = DbApiError::Status {
            url: "http://db/api/session".to_string(),
            status: 500,
            body: "boom".to_string(),
        };
        let err = LoggerError::from(SessionError::Api {
            step: "inserting START log",
            source: inner,
        });

        let session = err.source().expect("session source");
        let api = session.source().expect("api source");
        assert!(api.to_string().contains("HTTP 500"));
        assert!(err.to_string().contains("inserting START log"));
    }

    #[test]
    fn missing_username_message_names_the_key() {
        let msg = ConfigError::NetworkDriveUsernameMissing.to_string();
        assert!(msg.contains("networkdrive_username"));
    }

    #[test]
    fn lock_message_mentions_pid_when_known() {
        let err = LockError::AlreadyRunning {
            path: PathBuf::from("/tmp/logger.lock"),
            pid: Some(42),
        };
        let msg = err.to_string();
        assert!(msg.contains("process 42"));
        assert!(msg.contains("delete '/tmp/logger.lock'"));
    }
}
