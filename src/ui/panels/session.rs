// NexusLIMS Logger - ui/panels/session.rs
//
// Running view: instrument, start time, session note, file sync status,
// and the End Session button.

use crate::app::state::AppState;
use crate::ui::theme;
use chrono::{DateTime, Local, Utc};

/// Start time as shown to the operator, in local time.
pub fn format_start(dt: DateTime<Utc>) -> String {
    dt.with_timezone(&Local)
        .format("%a %b %d, %Y  %I:%M:%S %p")
        .to_string()
}

pub fn render(ui: &mut egui::Ui, state: &mut AppState) {
    let Some(record) = state.record.clone() else {
        return;
    };

    ui.vertical_centered(|ui| {
        ui.add_space(16.0);
        ui.label("A session is being logged for the");
        let instrument = record
            .instrument
            .as_ref()
            .map(|i| i.schema_name.as_str())
            .unwrap_or("unknown instrument");
        ui.label(
            egui::RichText::new(instrument)
                .size(theme::HEADLINE_SIZE)
                .strong()
                .color(theme::ACCENT),
        );
        ui.label("started at");
        let started = record
            .started_at
            .map(format_start)
            .unwrap_or_else(|| "unknown".to_string());
        ui.label(egui::RichText::new(started).strong());
        ui.add_space(6.0);
        ui.label(
            egui::RichText::new("Leave this window open while you work; click \"End session\" when finished.")
                .weak(),
        );
        ui.label(egui::RichText::new(format!("Session {}", record.session_id)).small().weak());
    });

    ui.add_space(12.0);
    ui.separator();

    // ---- Session note ----
    ui.strong("Session note");
    ui.add(
        egui::TextEdit::multiline(&mut state.note_draft)
            .desired_rows(theme::NOTE_ROWS)
            .desired_width(f32::INFINITY)
            .hint_text("Optional note saved with the session record"),
    );
    ui.horizontal(|ui| {
        if ui
            .add_enabled(state.note_dirty(), egui::Button::new("Save note"))
            .clicked()
        {
            state.request_save_note = true;
        }
        if ui
            .add_enabled(!state.note_draft.is_empty(), egui::Button::new("Clear"))
            .clicked()
        {
            state.note_draft.clear();
        }
        if state.note_dirty() {
            ui.colored_label(theme::WARN, "unsaved");
        }
    });

    ui.add_space(8.0);
    ui.separator();

    // ---- File sync ----
    ui.strong("File sync");
    if !state.sync_enabled {
        ui.label(egui::RichText::new("Not configured (no data bucket)").weak());
    } else {
        egui::Grid::new("sync_status")
            .num_columns(2)
            .spacing([16.0, 4.0])
            .show(ui, |ui| {
                ui.label("Status:");
                if state.sync.in_pass {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label("syncing...");
                    });
                } else {
                    ui.label("waiting for next pass");
                }
                ui.end_row();

                ui.label("Passes:");
                ui.label(state.sync.passes.to_string());
                ui.end_row();

                ui.label("Files uploaded:");
                ui.label(format!(
                    "{} ({})",
                    state.sync.files_uploaded,
                    theme::format_bytes(state.sync.bytes_uploaded)
                ));
                ui.end_row();

                ui.label("Failed uploads:");
                let colour = if state.sync.failures > 0 {
                    theme::ERROR
                } else {
                    ui.style().visuals.text_color()
                };
                ui.colored_label(colour, state.sync.failures.to_string());
                ui.end_row();
            });
        if let Some(err) = &state.sync.last_error {
            ui.colored_label(theme::ERROR, format!("Last error: {err}"));
        }
    }

    ui.add_space(16.0);
    ui.vertical_centered(|ui| {
        let button = egui::Button::new(egui::RichText::new("End session").size(16.0).strong())
            .min_size(egui::vec2(160.0, 36.0));
        if ui.add(button).clicked() {
            state.request_end = true;
        }
    });
}
