//! `Nozzle` Core Library
//!
//! Shared functionality for the firehose relay:
//! - Event model over the dropsonde envelope
//! - Filter policy (allow-list / deny-list)
//! - Process-wide kept/discarded counters
//! - Common error types

pub mod counters;
pub mod error;
pub mod event;
pub mod filter;
pub mod tracing_init;

pub use counters::{CounterSnapshot, RelayCounters};
pub use error::{Error, Result};
pub use event::{Event, EventKind};
pub use filter::{FilterMode, Verdict, decide};
