// NexusLIMS Logger - ui/panels/loading.rs
//
// Progress view shown while the session is starting or ending.

use crate::app::state::{AppState, Phase};
use crate::ui::theme;
use std::time::Instant;

pub fn render(ui: &mut egui::Ui, state: &AppState) {
    ui.vertical_centered(|ui| {
        ui.add_space(40.0);

        let headline = match state.phase {
            Phase::Ending | Phase::Closing { .. } => {
                "Please wait while the session end is logged to the database..."
            }
            _ => "Starting a new session...",
        };
        ui.label(egui::RichText::new(headline).size(theme::HEADLINE_SIZE));
        if matches!(state.phase, Phase::Ending) {
            ui.label(egui::RichText::new("(this window will close when completed)").weak());
        }

        ui.add_space(24.0);

        let fill = match state.phase {
            Phase::Failed { .. } => theme::ERROR,
            Phase::Closing { .. } => theme::OK,
            _ => theme::ACCENT,
        };
        ui.add(
            egui::ProgressBar::new(state.progress_fraction())
                .fill(fill)
                .show_percentage(),
        );

        ui.add_space(8.0);
        let message = match state.close_countdown(Instant::now()) {
            Some(secs) => format!("Closing window in {secs} seconds..."),
            None => state.status_message.clone(),
        };
        ui.label(message);
    });
}
