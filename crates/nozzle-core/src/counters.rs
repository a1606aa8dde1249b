//! Process-wide kept/discarded tallies.
//!
//! Shared by every session and read only by the periodic reporter. Updates
//! use `Relaxed` ordering: the numbers are diagnostic, approximate counts are
//! fine, and nothing branches on them.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters of events kept and discarded by the filter since the last report.
#[derive(Debug, Default)]
pub struct RelayCounters {
    kept: AtomicU64,
    discarded: AtomicU64,
}

impl RelayCounters {
    pub const fn new() -> Self {
        Self {
            kept: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    pub fn record_kept(&self) {
        self.kept.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Read the current values without resetting them.
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            kept: self.kept.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }

    /// Read and reset both counters for a new reporting interval.
    pub fn take(&self) -> CounterSnapshot {
        CounterSnapshot {
            kept: self.kept.swap(0, Ordering::Relaxed),
            discarded: self.discarded.swap(0, Ordering::Relaxed),
        }
    }
}

/// Counter values for one reporting interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub kept: u64,
    pub discarded: u64,
}

impl CounterSnapshot {
    pub const fn total(&self) -> u64 {
        self.kept.saturating_add(self.discarded)
    }

    /// Share of events kept, rounded down. `None` when nothing was seen.
    pub const fn kept_percent(&self) -> Option<u64> {
        match self.total() {
            0 => None,
            total => Some(self.kept.saturating_mul(100) / total),
        }
    }
}
