// NexusLIMS Logger - main.rs
//
// Application entry point. Handles:
// 1. CLI argument parsing
// 2. Configuration loading and logging initialisation
// 3. Startup checks (instance lock, network share, paths, database health)
// 4. Session manager construction, with file sync when a bucket is configured
// 5. eframe GUI launch, or the console front-end with --console

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod console;
mod gui;

// Re-export modules from the library crate so that `gui.rs` and other
// binary-side code can still use `crate::app::...`, `crate::core::...` etc.
pub use nexuslims_logger::app;

pub use nexuslims_logger::core;
pub use nexuslims_logger::platform;
pub use nexuslims_logger::ui;
pub use nexuslims_logger::util;

use crate::app::cache::ChecksumCache;
use crate::app::session::SessionLogger;
use crate::app::session_mgr::{SessionManager, SyncSettings};
use crate::core::sync_plan::FileTypeFilter;
use crate::platform::config::{AppConfig, PlatformPaths};
use crate::platform::dbapi::{DbApi, HttpDbApi};
use crate::platform::instance_lock::InstanceLock;
use crate::platform::storage::GcsObjectStore;
use crate::platform::{identity, network_drive};
use crate::util::error::LoggerError;
use crate::util::logging::LogBuffer;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// NexusLIMS Session Logger - records instrument sessions and syncs data files.
///
/// Logs a session START to the NexusLIMS database on launch, uploads new and
/// changed files from the instrument's file store while the session is open,
/// and logs the session END when it is closed.
#[derive(Parser, Debug)]
#[command(name = "nexuslimslogger", version, about)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short = 's', long = "silent", conflicts_with = "verbose")]
    silent: bool,

    /// Run in the terminal instead of opening a window.
    #[arg(long = "console")]
    console: bool,

    /// Config file to read instead of $HOME/nexuslims/gui/config.json.
    #[arg(long = "config", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Console mode: how to resolve a session that was never ended.
    #[arg(long = "on-hanging", value_enum, default_value = "abort")]
    on_hanging: console::OnHanging,
}

fn main() {
    let cli = Cli::parse();
    if cli.console {
        if let Err(e) = platform::terminal::ensure_console() {
            // No terminal to report to; fall back to the dialog.
            fatal(false, &e);
        }
    }
    let log_buffer = LogBuffer::default();

    // Config is read before logging starts so its level can apply.
    let loaded = PlatformPaths::resolve().and_then(|paths| {
        let file = cli.config.clone().unwrap_or_else(|| paths.config_file.clone());
        platform::config::load_config(&file).map(|(config, warnings)| (paths, config, warnings))
    });
    let config_level = loaded
        .as_ref()
        .ok()
        .and_then(|(_, config, _)| config.log_level.clone());

    util::logging::init(
        util::logging::level_for_flags(cli.silent, cli.verbose),
        config_level.as_deref(),
        log_buffer.clone(),
    );

    tracing::info!(
        version = util::constants::APP_VERSION,
        console = cli.console,
        "NexusLIMS Session Logger starting"
    );

    let (paths, config, warnings) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => fatal(cli.console, &LoggerError::from(e)),
    };
    for warning in &warnings {
        tracing::warn!(warning = %warning, "Configuration warning");
    }
    tracing::debug!(config = ?config, "Configuration loaded");

    match run(&cli, &paths, &config, log_buffer) {
        Ok(code) => std::process::exit(code),
        Err(e) => fatal(cli.console, &e),
    }
}

/// Startup checks, then one session. Returns the exit code.
///
/// The lock and the share connection live until this returns.
fn run(
    cli: &Cli,
    paths: &PlatformPaths,
    config: &AppConfig,
    log_buffer: LogBuffer,
) -> Result<i32, LoggerError> {
    let _lock = InstanceLock::acquire(&paths.lock_file)?;
    let _share = network_drive::connect_for(config)?;

    config.validate_paths(paths)?;
    ChecksumCache::ensure_exists(&paths.cache_file)?;

    let api = HttpDbApi::new(
        &config.dbapi_url,
        config.dbapi_username.clone(),
        config.dbapi_password.clone(),
    )?;
    api.health_check()?;
    tracing::info!(url = %config.dbapi_url, "Session database reachable");

    let sync_settings = sync_settings(config, paths)?;
    let sync_enabled = sync_settings.is_some();

    let logger = SessionLogger::new(
        Box::new(api),
        identity::login_name(),
        identity::computer_name(),
    );
    let manager = SessionManager::new(logger, sync_settings);

    if cli.console {
        Ok(console::run(manager, cli.on_hanging))
    } else {
        Ok(run_gui(manager, log_buffer, sync_enabled))
    }
}

fn sync_settings(
    config: &AppConfig,
    paths: &PlatformPaths,
) -> Result<Option<SyncSettings>, LoggerError> {
    let Some(bucket) = config.data_bucket.as_deref() else {
        tracing::info!("No data bucket configured; file sync disabled");
        return Ok(None);
    };
    let store = GcsObjectStore::from_credentials_file(bucket, &paths.credentials_file)?;
    tracing::info!(
        bucket,
        watch_dir = %config.filestore_path.display(),
        interval_secs = config.sync_interval.as_secs(),
        filetypes = ?config.filetypes,
        "File sync enabled"
    );
    Ok(Some(SyncSettings {
        store: Arc::new(store),
        watch_dir: config.filestore_path.clone(),
        cache_path: paths.cache_file.clone(),
        filter: FileTypeFilter::new(&config.filetypes),
        interval: config.sync_interval,
        retry_delays: None,
    }))
}

fn run_gui(manager: SessionManager, log_buffer: LogBuffer, sync_enabled: bool) -> i32 {
    let state = app::state::AppState::new(log_buffer, sync_enabled);
    let failed = Arc::new(AtomicBool::new(false));
    let app_failed = Arc::clone(&failed);

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(format!(
                "{} v{}",
                util::constants::APP_NAME,
                util::constants::APP_VERSION
            ))
            .with_inner_size(ui::theme::WINDOW_SIZE)
            .with_min_inner_size(ui::theme::WINDOW_MIN_SIZE),
        ..Default::default()
    };

    let result = eframe::run_native(
        util::constants::APP_NAME,
        native_options,
        Box::new(move |_cc| Ok(Box::new(gui::LoggerApp::new(state, manager, app_failed)))),
    );

    if let Err(e) = result {
        tracing::error!(error = %e, "Failed to launch GUI");
        eprintln!("Error: Failed to launch the session logger window: {e}");
        return 1;
    }
    if failed.load(Ordering::Relaxed) {
        1
    } else {
        0
    }
}

/// Report a startup error and exit with code 1.
fn fatal(console: bool, error: &LoggerError) -> ! {
    tracing::error!(error = %error, "Startup failed");
    if console {
        eprintln!("Error: {error}");
    } else {
        rfd::MessageDialog::new()
            .set_level(rfd::MessageLevel::Error)
            .set_title(util::constants::APP_NAME)
            .set_description(error.to_string())
            .set_buttons(rfd::MessageButtons::Ok)
            .show();
    }
    std::process::exit(1);
}
