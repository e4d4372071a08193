// NexusLIMS Logger - console.rs
//
// Terminal front-end. Drives the same `SessionManager` as the window:
// step messages are printed as they arrive, a hanging session is resolved by
// the `--on-hanging` flag, and pressing Enter ends the session.

use crate::app::session_mgr::SessionManager;
use crate::core::model::{HangingChoice, SessionProgress, SyncProgress};
use crate::ui::theme::format_bytes;
use crate::util::constants;
use clap::ValueEnum;
use std::io::BufRead;
use std::sync::mpsc;
use std::time::Duration;

/// What to do when the previous session on this instrument was never ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnHanging {
    /// Quit without touching the database.
    Abort,
    /// Adopt the hanging session.
    Continue,
    /// End the hanging session and start a new one.
    New,
}

impl From<OnHanging> for HangingChoice {
    fn from(value: OnHanging) -> Self {
        match value {
            OnHanging::Abort => HangingChoice::Exit,
            OnHanging::Continue => HangingChoice::Continue,
            OnHanging::New => HangingChoice::StartNew,
        }
    }
}

/// Run one session in the terminal. Returns the process exit code.
pub fn run(mut manager: SessionManager, on_hanging: OnHanging) -> i32 {
    let enter = spawn_stdin_reader();
    let tick = Duration::from_millis(constants::UI_POLL_INTERVAL_MS);
    let mut open = false;

    manager.start();

    loop {
        for msg in manager.poll_sync(constants::MAX_MESSAGES_PER_FRAME) {
            print_sync(&msg);
        }

        for msg in manager.poll_progress(constants::MAX_MESSAGES_PER_FRAME) {
            match msg {
                SessionProgress::Step {
                    message,
                    step,
                    total,
                } => println!("[{step}/{total}] {message}"),
                SessionProgress::Hanging(row) => {
                    println!(
                        "The last session on this instrument (started {} by {}) was never ended.",
                        row.timestamp.as_deref().unwrap_or("at an unknown time"),
                        row.user.as_deref().unwrap_or("an unknown user")
                    );
                    println!("Resolving with --on-hanging {on_hanging:?}");
                    manager.resolve_hanging(on_hanging.into());
                }
                SessionProgress::Opened(record) => {
                    open = true;
                    println!(
                        "Session {} open on {}. Press Enter to end the session.",
                        record.session_id,
                        record
                            .instrument
                            .as_ref()
                            .map(|i| i.schema_name.as_str())
                            .unwrap_or("unknown instrument"),
                    );
                }
                SessionProgress::Ended { record, final_sync } => {
                    if let Some(report) = final_sync {
                        println!(
                            "Final sync: {} uploaded, {} failed",
                            report.uploaded, report.failed
                        );
                    }
                    println!("Session {} ended.", record.session_id);
                    return 0;
                }
                SessionProgress::NothingToEnd => {
                    println!("No session started; nothing logged to the database.");
                    return 0;
                }
                SessionProgress::Cancelled => {
                    println!("Exiting without logging a session.");
                    return 0;
                }
                SessionProgress::Failed { message } => {
                    eprintln!("Error: {message}");
                    return 1;
                }
            }
        }

        if open {
            match enter.try_recv() {
                Ok(()) | Err(mpsc::TryRecvError::Disconnected) => {
                    // EOF on stdin ends the session as well.
                    open = false;
                    println!("Ending the session...");
                    manager.end();
                }
                Err(mpsc::TryRecvError::Empty) => {}
            }
        }

        std::thread::sleep(tick);
    }
}

/// One message per line read from stdin; the channel closes at EOF.
fn spawn_stdin_reader() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            if line.is_err() || tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}

fn print_sync(msg: &SyncProgress) {
    match msg {
        SyncProgress::PassStarted { final_pass: true } => println!("Final sync pass started"),
        SyncProgress::PassStarted { .. } | SyncProgress::Stopped => {}
        SyncProgress::FileUploaded { object_name, bytes } => {
            println!("  uploaded {object_name} ({})", format_bytes(*bytes));
        }
        SyncProgress::FileFailed { path, error } => {
            eprintln!("  upload failed {}: {error}", path.display());
        }
        SyncProgress::PassCompleted { report, .. } => {
            if report.uploaded > 0 || report.failed > 0 {
                println!(
                    "Sync pass: {} uploaded, {} skipped, {} failed",
                    report.uploaded, report.skipped, report.failed
                );
            }
        }
        SyncProgress::PassFailed { error } => eprintln!("Sync pass failed: {error}"),
    }
}
