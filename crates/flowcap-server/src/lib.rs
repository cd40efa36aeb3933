//! Flowcap server library - the HTTP/WebSocket surface over the capture
//! pipeline.
//!
//! Routes, the live feed, and application state live here rather than in
//! main.rs so integration tests can drive the real router.

pub mod config;
pub mod feed;
pub mod logging;
pub mod routes;
pub mod state;
pub mod sweep;
