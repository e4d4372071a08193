// NexusLIMS Logger - ui/panels/dialogs.rs
//
// Modal-ish prompts: the hanging-session question at startup and the
// End / Pause / Cancel question when the window is closed.
// Rendered as centred, non-collapsible windows; answers are written to
// `AppState` request fields and acted on by the app.

use crate::app::state::AppState;
use crate::core::model::{parse_api_timestamp, HangingChoice};
use crate::ui::panels::session::format_start;

/// Render the hanging-session dialog (if a decision is pending).
pub fn render_hanging(ctx: &egui::Context, state: &mut AppState) {
    let Some(row) = state.hanging.clone() else {
        return;
    };

    let started = row
        .timestamp
        .as_deref()
        .and_then(parse_api_timestamp)
        .map(format_start)
        .or(row.timestamp.clone())
        .unwrap_or_else(|| "an unknown time".to_string());

    egui::Window::new("Incomplete session found")
        .collapsible(false)
        .resizable(false)
        .min_width(380.0)
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .show(ctx, |ui| {
            ui.label("The database shows that a session was started on this instrument");
            ui.label(format!(
                "at {started}{} but never ended.",
                row.user
                    .as_deref()
                    .map(|u| format!(" by {u}"))
                    .unwrap_or_default()
            ));
            ui.add_space(6.0);
            ui.label("Would you like to end that session and start a new one, continue the existing session, or exit?");
            ui.add_space(10.0);
            ui.horizontal(|ui| {
                if ui
                    .button("New session")
                    .on_hover_text("End the previous session, then start a new one")
                    .clicked()
                {
                    state.pending_choice = Some(HangingChoice::StartNew);
                }
                if ui
                    .button("Continue")
                    .on_hover_text("Keep logging under the previous session")
                    .clicked()
                {
                    state.pending_choice = Some(HangingChoice::Continue);
                }
                if ui
                    .button("Exit")
                    .on_hover_text("Close the logger without changing the database")
                    .clicked()
                {
                    state.pending_choice = Some(HangingChoice::Exit);
                }
            });
        });

    if state.pending_choice.is_some() {
        state.hanging = None;
    }
}

/// Render the close dialog (if `state.show_close_dialog` is true).
pub fn render_close(ctx: &egui::Context, state: &mut AppState) {
    if !state.show_close_dialog {
        return;
    }

    egui::Window::new("Exit NexusLIMS Session Logger")
        .collapsible(false)
        .resizable(false)
        .min_width(360.0)
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .show(ctx, |ui| {
            ui.label("Would you like to end the current session, or pause it?");
            ui.add_space(4.0);
            ui.label(
                egui::RichText::new(
                    "Pausing closes the window and leaves the session open; the next start will offer to continue it.",
                )
                .weak(),
            );
            ui.add_space(10.0);
            ui.horizontal(|ui| {
                if ui.button("End session").clicked() {
                    state.show_close_dialog = false;
                    state.request_end = true;
                }
                if ui.button("Pause session").clicked() {
                    state.show_close_dialog = false;
                    state.request_pause = true;
                }
                if ui.button("Cancel").clicked() {
                    state.show_close_dialog = false;
                }
            });
        });
}
