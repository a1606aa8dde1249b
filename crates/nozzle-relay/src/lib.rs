//! Nozzle Relay Server Library
//!
//! Core functionality for the firehose relay:
//! - Upstream Doppler firehose subscription over WebSocket
//! - Relay pipeline (intake, bounded queue, drain, error observer)
//! - Per-connection session coordination and teardown
//! - HTTP server (WebSocket fan-out and health probe)
//! - Periodic counters reporting

pub mod config;
pub mod pipeline;
pub mod reporter;
pub mod server;
pub mod session;
pub mod upstream;
