// NexusLIMS Logger - gui.rs
//
// Top-level eframe::App implementation.
// Polls the session manager each frame, acts on panel requests, and
// intercepts window close so an open session is never dropped silently.

use crate::app::session_mgr::SessionManager;
use crate::app::state::{AppState, Phase};
use crate::core::model::HangingChoice;
use crate::ui;
use crate::util::constants;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The session logger window.
pub struct LoggerApp {
    pub state: AppState,
    pub manager: SessionManager,
    /// Set when the app exits because of an error; read by `main` for the exit code.
    failed: Arc<AtomicBool>,
    error_shown: bool,
}

impl LoggerApp {
    /// Create the app and begin session startup immediately.
    pub fn new(state: AppState, mut manager: SessionManager, failed: Arc<AtomicBool>) -> Self {
        manager.start();
        Self {
            state,
            manager,
            failed,
            error_shown: false,
        }
    }

    fn handle_requests(&mut self, ctx: &egui::Context) {
        if let Some(choice) = self.state.pending_choice.take() {
            if choice == HangingChoice::StartNew {
                self.state.total_steps = constants::START_NEW_AFTER_HANGING_STEPS;
            }
            self.manager.resolve_hanging(choice);
        }

        if self.state.request_save_note {
            self.state.request_save_note = false;
            self.state.note_saved = self.state.note_draft.clone();
            self.manager.set_note(self.state.note_draft.clone());
            tracing::debug!(chars = self.state.note_saved.len(), "Session note saved");
        }

        if self.state.request_end {
            self.state.request_end = false;
            if self.state.note_dirty() {
                self.state.note_saved = self.state.note_draft.clone();
                self.manager.set_note(self.state.note_draft.clone());
            }
            tracing::info!("Ending the session");
            self.state.begin_end();
            self.manager.end();
        }

        if self.state.request_pause {
            self.state.request_pause = false;
            tracing::info!("Received pause session signal");
            self.manager.pause();
            self.state.phase = Phase::Exit;
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
    }

    fn handle_close_request(&mut self, ctx: &egui::Context) {
        if !ctx.input(|i| i.viewport().close_requested()) {
            return;
        }
        match self.state.phase {
            Phase::Running => {
                tracing::debug!("Window close requested; asking for clarification");
                ctx.send_viewport_cmd(egui::ViewportCommand::CancelClose);
                self.state.show_close_dialog = true;
            }
            Phase::Loading => {
                // Ends whatever startup managed to log, or nothing.
                ctx.send_viewport_cmd(egui::ViewportCommand::CancelClose);
                self.state.hanging = None;
                self.state.request_end = true;
            }
            Phase::Ending => {
                ctx.send_viewport_cmd(egui::ViewportCommand::CancelClose);
            }
            Phase::Closing { .. } | Phase::Failed { .. } | Phase::Exit => {}
        }
    }

    fn show_error(&mut self, message: &str) {
        if self.error_shown {
            return;
        }
        self.error_shown = true;
        self.failed.store(true, Ordering::Relaxed);
        rfd::MessageDialog::new()
            .set_level(rfd::MessageLevel::Error)
            .set_title("Error")
            .set_description(format!("Error encountered during session setup:\n\n{message}"))
            .set_buttons(rfd::MessageButtons::Ok)
            .show();
        self.state.show_log_window = true;
    }
}

impl eframe::App for LoggerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        for msg in self.manager.poll_progress(constants::MAX_MESSAGES_PER_FRAME) {
            self.state.apply_session(msg);
        }
        for msg in self.manager.poll_sync(constants::MAX_MESSAGES_PER_FRAME) {
            self.state.apply_sync(msg);
        }

        self.handle_requests(ctx);
        self.handle_close_request(ctx);

        match self.state.phase.clone() {
            Phase::Exit => ctx.send_viewport_cmd(egui::ViewportCommand::Close),
            Phase::Closing { at } => {
                if Instant::now() >= at {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
            }
            Phase::Failed { message } => self.show_error(&message),
            Phase::Loading | Phase::Running | Phase::Ending => {}
        }

        // Top menu bar
        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("View", |ui| {
                    if ui.button("Show log").clicked() {
                        self.state.show_log_window = true;
                        ui.close_menu();
                    }
                    if ui.button("About").clicked() {
                        self.state.show_about = true;
                        ui.close_menu();
                    }
                });
            });
        });

        // Status bar
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if self.manager.sync_running() {
                    ui.label(
                        egui::RichText::new(" \u{25cf} SYNC ")
                            .strong()
                            .color(ui::theme::OK),
                    );
                    ui.separator();
                }
                let status = match &self.state.phase {
                    Phase::Running => "Session open".to_string(),
                    Phase::Failed { .. } => "Error".to_string(),
                    _ => self.state.status_message.clone(),
                };
                ui.label(status);
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if let Some(record) = &self.state.record {
                        ui.label(egui::RichText::new(&record.user).weak());
                    }
                });
            });
        });

        let phase = self.state.phase.clone();
        egui::CentralPanel::default().show(ctx, |ui| match phase {
            Phase::Running => ui::panels::session::render(ui, &mut self.state),
            Phase::Failed { message } => {
                ui::panels::loading::render(ui, &self.state);
                ui.add_space(12.0);
                ui.colored_label(ui::theme::ERROR, message);
                ui.add_space(8.0);
                ui.vertical_centered(|ui| {
                    if ui.button("Exit").clicked() {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                    }
                });
            }
            _ => ui::panels::loading::render(ui, &self.state),
        });

        ui::panels::dialogs::render_hanging(ctx, &mut self.state);
        ui::panels::dialogs::render_close(ctx, &mut self.state);
        ui::panels::log_window::render(ctx, &mut self.state);
        ui::panels::about::render(ctx, &mut self.state);

        if !matches!(self.state.phase, Phase::Failed { .. }) {
            ctx.request_repaint_after(Duration::from_millis(constants::UI_POLL_INTERVAL_MS));
        }
    }

    /// Called by eframe when the window is about to close.
    ///
    /// A session still open at this point is paused: it stays open in the
    /// database and sync stops without a final pass.
    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        if matches!(self.state.phase, Phase::Running) {
            self.manager.pause();
        } else if self.manager.is_busy() {
            tracing::warn!(phase = ?self.state.phase, "Window closed while a session operation was still running");
        }
    }
}
