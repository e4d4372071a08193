// NexusLIMS Logger - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "NexusLIMS Session Logger";

/// Current application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Per-user file locations (relative to the home directory)
// =============================================================================

/// Directory components below `$HOME` holding config, credentials and cache.
pub const USER_DIR_COMPONENTS: &[&str] = &["nexuslims", "gui"];

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Cloud storage credential file name (service-account key).
pub const CREDENTIALS_FILE_NAME: &str = "creds.json";

/// Checksum cache file name.
pub const CACHE_FILE_NAME: &str = "cache.json";

/// Single-instance lock file name.
pub const LOCK_FILE_NAME: &str = "logger.lock";

// =============================================================================
// Configuration keys
// =============================================================================

pub const KEY_DBAPI_URL: &str = "NEXUSLIMSGUI_DBAPI_URL";
pub const KEY_DBAPI_USERNAME: &str = "NEXUSLIMSGUI_DBAPI_USERNAME";
pub const KEY_DBAPI_PASSWORD: &str = "NEXUSLIMSGUI_DBAPI_PASSWORD";
pub const KEY_FILESTORE_PATH: &str = "NEXUSLIMSGUI_FILESTORE_PATH";
pub const KEY_FILETYPES_SYNC: &str = "NEXUSLIMSGUI_FILETYPES_SYNC";
pub const KEY_SYNC_INTERVAL_SECONDS: &str = "NEXUSLIMSGUI_SYNC_INTERVAL_SECONDS";
pub const KEY_DATA_BUCKET: &str = "NEXUSLIMSGUI_DATA_BUCKET";
pub const KEY_LOG_LEVEL: &str = "NEXUSLIMSGUI_LOG_LEVEL";

pub const KEY_NETWORKDRIVE_HOSTNAME: &str = "networkdrive_hostname";
pub const KEY_NETWORKDRIVE_WORKGROUP: &str = "networkdrive_workgroup";
pub const KEY_NETWORKDRIVE_USERNAME: &str = "networkdrive_username";
pub const KEY_NETWORKDRIVE_PASSWORD: &str = "networkdrive_password";
pub const KEY_DATABASE_NAME: &str = "database_name";
pub const KEY_DATABASE_RELPATH: &str = "database_relpath";
pub const KEY_DAQ_RELPATH: &str = "daq_relpath";

/// Every key looked up in the environment before falling back to the file.
pub const ALL_CONFIG_KEYS: &[&str] = &[
    KEY_DBAPI_URL,
    KEY_DBAPI_USERNAME,
    KEY_DBAPI_PASSWORD,
    KEY_FILESTORE_PATH,
    KEY_FILETYPES_SYNC,
    KEY_SYNC_INTERVAL_SECONDS,
    KEY_DATA_BUCKET,
    KEY_LOG_LEVEL,
    KEY_NETWORKDRIVE_HOSTNAME,
    KEY_NETWORKDRIVE_WORKGROUP,
    KEY_NETWORKDRIVE_USERNAME,
    KEY_NETWORKDRIVE_PASSWORD,
    KEY_DATABASE_NAME,
    KEY_DATABASE_RELPATH,
    KEY_DAQ_RELPATH,
];

// =============================================================================
// Sync limits
// =============================================================================

/// Default sync interval when none is configured (10 minutes).
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 600;

/// Minimum configurable sync interval.
pub const MIN_SYNC_INTERVAL_SECS: u64 = 5;

/// Maximum configurable sync interval (one day).
pub const MAX_SYNC_INTERVAL_SECS: u64 = 86_400;

/// How often the sync worker wakes to check for a stop request (ms).
pub const SYNC_STOP_CHECK_INTERVAL_MS: u64 = 100;

/// Read chunk size for streaming checksums.
pub const CHECKSUM_CHUNK_SIZE: usize = 64 * 1024; // 64 KB

/// Maximum directory recursion depth below the watched directory.
pub const SYNC_MAX_DEPTH: usize = 32;

/// Upload attempts per file per pass before giving up until the next pass.
pub const UPLOAD_MAX_ATTEMPTS: u32 = 3;

/// Backoff delays between upload attempts (ms).
pub const UPLOAD_RETRY_DELAYS_MS: [u64; 3] = [250, 1_000, 4_000];

/// Maximum file paths listed in a single debug log line.
pub const MAX_LOGGED_PATHS: usize = 20;

// =============================================================================
// Network
// =============================================================================

/// Timeout for database API requests.
pub const DBAPI_TIMEOUT_SECS: u64 = 30;

/// Timeout for object uploads (large instrument files on slow links).
pub const UPLOAD_TIMEOUT_SECS: u64 = 15 * 60;

/// Expected body of the database API root endpoint.
pub const DBAPI_HEALTH_BODY: &str = "API for nexuslims-db";

/// OAuth scope requested for bucket writes.
pub const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";

/// Default storage API endpoint.
pub const STORAGE_ENDPOINT: &str = "https://storage.googleapis.com";

/// Environment variable selecting an unauthenticated storage emulator.
pub const STORAGE_EMULATOR_ENV: &str = "STORAGE_EMULATOR_HOST";

/// Lifetime requested for service-account assertions.
pub const TOKEN_LIFETIME_SECS: i64 = 3_600;

/// Access tokens are refreshed this long before they expire.
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

// =============================================================================
// Session
// =============================================================================

/// Progress steps for a normal session start (setup, check, insert, verify, teardown).
pub const START_STEPS: u32 = 5;

/// Progress steps when a hanging session is ended before a new one starts
/// (setup, check, 5 end steps, insert, verify, teardown).
pub const START_NEW_AFTER_HANGING_STEPS: u32 = 10;

/// Progress steps for ending a session (5 API steps, sync stop, final pass, teardown).
pub const END_STEPS: u32 = 8;

/// Seconds the window stays open after a session has been ended.
pub const CLOSE_DELAY_SECS: u64 = 2;

// =============================================================================
// UI
// =============================================================================

/// Maximum progress messages drained from each channel per frame.
pub const MAX_MESSAGES_PER_FRAME: usize = 50;

/// Repaint cadence while background work is pending (ms).
pub const UI_POLL_INTERVAL_MS: u64 = 100;

/// Maximum bytes retained by the in-memory log buffer shown in the log window.
pub const LOG_BUFFER_MAX_BYTES: usize = 256 * 1024;

// =============================================================================
// Logging
// =============================================================================

/// Default log level (the original tool is quiet unless asked).
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Recognised log level names.
pub const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];
