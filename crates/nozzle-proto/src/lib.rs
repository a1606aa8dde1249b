//! Nozzle Protocol Buffers
//!
//! Generated code for the dropsonde `events` protocol carried on the
//! Loggregator firehose. The relay forwards the received bytes verbatim, so
//! fields it never reads survive relaying untouched.

#![allow(clippy::derive_partial_eq_without_eq)]

/// Dropsonde `events` package (proto2).
pub mod events {
    include!(concat!(env!("OUT_DIR"), "/events.rs"));
}

pub use events::*;
