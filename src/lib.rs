//! TATTA — pooled four-team betting game server.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod auth;
pub mod config;
pub mod engine;
pub mod server;
pub mod store;
pub mod types;
