// NexusLIMS Logger - core/mod.rs
//
// Core logic layer: data model, checksums, upload planning.
// Must NOT depend on: ui, platform, app, or any network crate.

pub mod checksum;
pub mod model;
pub mod sync_plan;
