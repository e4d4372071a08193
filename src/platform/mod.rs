// NexusLIMS Logger - platform/mod.rs
//
// Platform and network boundary: configuration, the session database API,
// cloud storage, single-instance locking, network shares, console access.
// Must NOT depend on: app, ui.

pub mod config;
pub mod dbapi;
pub mod fs;
pub mod identity;
pub mod instance_lock;
pub mod network_drive;
pub mod storage;
pub mod terminal;
