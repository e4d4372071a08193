// NexusLIMS Logger - platform/config.rs
//
// Per-user path resolution and config.json loading with startup validation.
//
// Every key is looked up in the process environment first and falls back to
// `$HOME/nexuslims/gui/config.json`. A missing config file is only a warning
// since the environment may supply everything. Validation errors are fatal:
// the logger must not open a session it cannot record or sync correctly.

use crate::core::sync_plan::entry_pattern;
use crate::util::constants;
use crate::util::error::ConfigError;
use directories::BaseDirs;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Resolved per-user file locations.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// `$HOME/nexuslims/gui`
    pub user_dir: PathBuf,
    pub config_file: PathBuf,
    pub credentials_file: PathBuf,
    pub cache_file: PathBuf,
    pub lock_file: PathBuf,
}

impl PlatformPaths {
    /// Resolve paths below the current user's home directory.
    pub fn resolve() -> Result<Self, ConfigError> {
        let base = BaseDirs::new().ok_or(ConfigError::HomeDirUnavailable)?;
        let mut user_dir = base.home_dir().to_path_buf();
        for part in constants::USER_DIR_COMPONENTS {
            user_dir.push(part);
        }
        let paths = Self::under(user_dir);
        tracing::debug!(
            user_dir = %paths.user_dir.display(),
            "Platform paths resolved"
        );
        Ok(paths)
    }

    /// Lay out all files below an explicit directory.
    pub fn under(user_dir: PathBuf) -> Self {
        Self {
            config_file: user_dir.join(constants::CONFIG_FILE_NAME),
            credentials_file: user_dir.join(constants::CREDENTIALS_FILE_NAME),
            cache_file: user_dir.join(constants::CACHE_FILE_NAME),
            lock_file: user_dir.join(constants::LOCK_FILE_NAME),
            user_dir,
        }
    }
}

// =============================================================================
// Validated configuration
// =============================================================================

/// Legacy network-drive settings, used to authenticate to the file store share.
#[derive(Clone, Default, PartialEq)]
pub struct NetworkDriveConfig {
    pub hostname: Option<String>,
    pub workgroup: Option<String>,
    pub username: String,
    pub password: Option<String>,
    pub database_name: Option<String>,
    pub database_relpath: Option<String>,
    pub daq_relpath: Option<String>,
}

impl NetworkDriveConfig {
    /// `WORKGROUP\user` when a workgroup is configured.
    pub fn qualified_username(&self) -> String {
        match self.workgroup.as_deref() {
            Some(wg) if !wg.is_empty() => format!("{wg}\\{}", self.username),
            _ => self.username.clone(),
        }
    }
}

impl fmt::Debug for NetworkDriveConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkDriveConfig")
            .field("hostname", &self.hostname)
            .field("workgroup", &self.workgroup)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database_name", &self.database_name)
            .field("database_relpath", &self.database_relpath)
            .field("daq_relpath", &self.daq_relpath)
            .finish()
    }
}

/// Validated application configuration.
#[derive(Clone)]
pub struct AppConfig {
    pub dbapi_url: String,
    pub dbapi_username: Option<String>,
    pub dbapi_password: Option<String>,
    pub filestore_path: PathBuf,
    /// Extensions or glob patterns; empty syncs every file.
    pub filetypes: Vec<String>,
    pub sync_interval: Duration,
    /// `None` disables file sync entirely.
    pub data_bucket: Option<String>,
    pub log_level: Option<String>,
    pub network_drive: Option<NetworkDriveConfig>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("dbapi_url", &self.dbapi_url)
            .field("dbapi_username", &self.dbapi_username)
            .field(
                "dbapi_password",
                &self.dbapi_password.as_ref().map(|_| "<redacted>"),
            )
            .field("filestore_path", &self.filestore_path)
            .field("filetypes", &self.filetypes)
            .field("sync_interval", &self.sync_interval)
            .field("data_bucket", &self.data_bucket)
            .field("log_level", &self.log_level)
            .field("network_drive", &self.network_drive)
            .finish()
    }
}

impl AppConfig {
    pub fn sync_enabled(&self) -> bool {
        self.data_bucket.is_some()
    }

    /// Checks that need the filesystem: run after any network drive is connected.
    pub fn validate_paths(&self, paths: &PlatformPaths) -> Result<(), ConfigError> {
        if !self.filestore_path.is_dir() {
            return Err(ConfigError::FilestoreNotFound {
                path: self.filestore_path.clone(),
            });
        }
        if self.sync_enabled() && !paths.credentials_file.is_file() {
            return Err(ConfigError::CredentialsNotFound {
                path: paths.credentials_file.clone(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Key lookup with environment precedence over the file.
struct Sources<'a> {
    file: HashMap<String, Value>,
    env: &'a dyn Fn(&str) -> Option<String>,
}

impl Sources<'_> {
    /// Value for `key`; empty strings count as unset.
    fn get(&self, key: &str) -> Option<Value> {
        if let Some(v) = (self.env)(key) {
            if !v.trim().is_empty() {
                return Some(Value::String(v));
            }
        }
        match self.file.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(v) => Some(v.clone()),
        }
    }

    fn string(&self, key: &'static str) -> Result<Option<String>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(ConfigError::InvalidValue {
                key,
                value: other.to_string(),
                expected: "a string".to_string(),
            }),
        }
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.string(key)?.ok_or(ConfigError::MissingKey { key })
    }
}

/// Load config from `path` with overrides from the process environment.
pub fn load_config(path: &Path) -> Result<(AppConfig, Vec<String>), ConfigError> {
    load_config_with_env(path, &|key: &str| std::env::var(key).ok())
}

/// Load config from `path`, taking overrides from `env`.
///
/// Returns the validated config and non-fatal warnings.
pub fn load_config_with_env(
    path: &Path,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<(AppConfig, Vec<String>), ConfigError> {
    let mut warnings: Vec<String> = Vec::new();

    let file: HashMap<String, Value> = match std::fs::read_to_string(path) {
        Ok(content) => {
            let parsed = serde_json::from_str(&content).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?;
            tracing::info!(path = %path.display(), "Loaded config.json");
            parsed
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let msg = format!(
                "file '{}' cannot be found, using environment variables instead",
                path.display()
            );
            tracing::warn!("{}", msg);
            warnings.push(msg);
            HashMap::new()
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let mut unknown: Vec<&String> = file
        .keys()
        .filter(|k| !constants::ALL_CONFIG_KEYS.contains(&k.as_str()))
        .collect();
    unknown.sort();
    for key in unknown {
        warnings.push(format!("unknown config key '{key}' ignored"));
    }

    let sources = Sources { file, env };

    // -- Database API --
    let dbapi_url = sources.required(constants::KEY_DBAPI_URL)?;
    if let Err(e) = url::Url::parse(&dbapi_url) {
        return Err(ConfigError::InvalidValue {
            key: constants::KEY_DBAPI_URL,
            value: dbapi_url,
            expected: format!("an absolute http(s) URL ({e})"),
        });
    }
    let dbapi_username = sources.string(constants::KEY_DBAPI_USERNAME)?;
    let dbapi_password = sources.string(constants::KEY_DBAPI_PASSWORD)?;
    if dbapi_password.is_some() && dbapi_username.is_none() {
        warnings.push(format!(
            "'{}' is set without '{}'; requests will not be authenticated",
            constants::KEY_DBAPI_PASSWORD,
            constants::KEY_DBAPI_USERNAME
        ));
    }

    // -- File store --
    let filestore_path = PathBuf::from(sources.required(constants::KEY_FILESTORE_PATH)?);
    let filetypes = parse_filetypes(sources.get(constants::KEY_FILETYPES_SYNC))?;
    let sync_interval = parse_interval(sources.get(constants::KEY_SYNC_INTERVAL_SECONDS))?;
    let data_bucket = sources.string(constants::KEY_DATA_BUCKET)?;
    if data_bucket.is_none() {
        tracing::info!("No data bucket configured; file sync disabled");
    }

    // -- Logging --
    let log_level = match sources.string(constants::KEY_LOG_LEVEL)? {
        Some(level) => {
            let lower = level.to_lowercase();
            if !constants::VALID_LOG_LEVELS.contains(&lower.as_str()) {
                return Err(ConfigError::InvalidValue {
                    key: constants::KEY_LOG_LEVEL,
                    value: level,
                    expected: constants::VALID_LOG_LEVELS.join(", "),
                });
            }
            Some(lower)
        }
        None => None,
    };

    let network_drive = parse_network_drive(&sources)?;

    let config = AppConfig {
        dbapi_url,
        dbapi_username,
        dbapi_password,
        filestore_path,
        filetypes,
        sync_interval,
        data_bucket,
        log_level,
        network_drive,
    };
    tracing::debug!(config = ?config, "Configuration validated");
    Ok((config, warnings))
}

fn parse_interval(value: Option<Value>) -> Result<Duration, ConfigError> {
    let key = constants::KEY_SYNC_INTERVAL_SECONDS;
    let secs = match &value {
        None => return Ok(Duration::from_secs(constants::DEFAULT_SYNC_INTERVAL_SECS)),
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        Some(_) => None,
    };
    let range = constants::MIN_SYNC_INTERVAL_SECS..=constants::MAX_SYNC_INTERVAL_SECS;
    match secs {
        Some(s) if range.contains(&s) => Ok(Duration::from_secs(s)),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value_text(&value),
            expected: format!(
                "whole seconds between {} and {}",
                constants::MIN_SYNC_INTERVAL_SECS,
                constants::MAX_SYNC_INTERVAL_SECS
            ),
        }),
    }
}

/// Comma-separated string, JSON array, or a string holding a JSON array.
fn parse_filetypes(value: Option<Value>) -> Result<Vec<String>, ConfigError> {
    let key = constants::KEY_FILETYPES_SYNC;
    let invalid = |v: &Option<Value>| ConfigError::InvalidValue {
        key,
        value: value_text(v),
        expected: "a comma-separated list or array of extensions".to_string(),
    };
    let items: Vec<String> = match &value {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| invalid(&value))?,
        Some(Value::String(s)) if s.trim_start().starts_with('[') => {
            serde_json::from_str::<Vec<String>>(s).map_err(|_| invalid(&value))?
        }
        Some(Value::String(s)) => s.split(',').map(str::to_string).collect(),
        Some(_) => return Err(invalid(&value)),
    };
    let items: Vec<String> = items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    for item in &items {
        if let Err(err) = entry_pattern(item) {
            return Err(ConfigError::InvalidValue {
                key,
                value: item.clone(),
                expected: format!("an extension or glob pattern ({err})"),
            });
        }
    }
    Ok(items)
}

fn parse_network_drive(sources: &Sources<'_>) -> Result<Option<NetworkDriveConfig>, ConfigError> {
    let hostname = sources.string(constants::KEY_NETWORKDRIVE_HOSTNAME)?;
    let workgroup = sources.string(constants::KEY_NETWORKDRIVE_WORKGROUP)?;
    let username = sources.string(constants::KEY_NETWORKDRIVE_USERNAME)?;
    let password = sources.string(constants::KEY_NETWORKDRIVE_PASSWORD)?;
    let database_name = sources.string(constants::KEY_DATABASE_NAME)?;
    let database_relpath = sources.string(constants::KEY_DATABASE_RELPATH)?;
    let daq_relpath = sources.string(constants::KEY_DAQ_RELPATH)?;

    let any_drive_key =
        hostname.is_some() || workgroup.is_some() || username.is_some() || password.is_some();
    if !any_drive_key {
        return Ok(None);
    }
    let username = username.ok_or(ConfigError::NetworkDriveUsernameMissing)?;

    Ok(Some(NetworkDriveConfig {
        hostname,
        workgroup,
        username,
        password,
        database_name,
        database_relpath,
        daq_relpath,
    }))
}

fn value_text(value: &Option<Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
        None => String::new(),
    }
}

// =============================================================================
// Tests
// =============================================================================
