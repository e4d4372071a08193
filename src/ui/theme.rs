// NexusLIMS Logger - ui/theme.rs
//
// Colour scheme and layout constants.
// No dependencies on app state or business logic.

use egui::Color32;

/// Accent for the running session banner.
pub const ACCENT: Color32 = Color32::from_rgb(37, 99, 235); // Blue 600

/// Progress bar and status colours.
pub const OK: Color32 = Color32::from_rgb(34, 197, 94); // Green 500
pub const WARN: Color32 = Color32::from_rgb(217, 119, 6); // Amber 600
pub const ERROR: Color32 = Color32::from_rgb(185, 28, 28); // Red 800

/// Layout constants.
pub const WINDOW_SIZE: [f32; 2] = [460.0, 520.0];
pub const WINDOW_MIN_SIZE: [f32; 2] = [380.0, 420.0];
pub const NOTE_ROWS: usize = 6;
pub const LOG_WINDOW_SIZE: [f32; 2] = [640.0, 420.0];
pub const HEADLINE_SIZE: f32 = 20.0;

/// Human-readable byte count.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = "B";
    for u in UNITS {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = u;
    }
    format!("{value:.1} {unit}")
}
