// NexusLIMS Logger - ui/panels/log_window.rs
//
// Floating window showing the in-memory log buffer, with copy and clear.

use crate::app::state::AppState;
use crate::ui::theme;

/// Render the log window (if `state.show_log_window` is true).
pub fn render(ctx: &egui::Context, state: &mut AppState) {
    if !state.show_log_window {
        return;
    }

    let text = state.log_buffer.snapshot();
    let mut open = true;
    egui::Window::new("Log")
        .open(&mut open)
        .collapsible(false)
        .resizable(true)
        .default_size(theme::LOG_WINDOW_SIZE)
        .show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button("Copy to clipboard").clicked() {
                    ctx.copy_text(text.clone());
                }
                if ui.button("Clear").clicked() {
                    state.log_buffer.clear();
                }
            });
            ui.separator();
            egui::ScrollArea::both()
                .id_salt("log_window_text")
                .stick_to_bottom(true)
                .auto_shrink([false; 2])
                .show(ui, |ui| {
                    ui.add(
                        egui::Label::new(egui::RichText::new(text.as_str()).monospace())
                            .wrap_mode(egui::TextWrapMode::Extend),
                    );
                });
        });

    if !open {
        state.show_log_window = false;
    }
}
