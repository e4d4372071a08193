// NexusLIMS Logger - ui/panels/mod.rs

pub mod about;
pub mod dialogs;
pub mod loading;
pub mod log_window;
pub mod session;
