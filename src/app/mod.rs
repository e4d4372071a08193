// NexusLIMS Logger - app/mod.rs
//
// Application layer: session protocol, background workers, front-end state.
// Dependencies: core layer, platform seams (DbApi, ObjectStore).
// Must NOT depend on: ui.

pub mod cache;
pub mod session;
pub mod session_mgr;
pub mod state;
pub mod sync;
