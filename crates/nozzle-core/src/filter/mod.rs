//! Filter policy deciding which firehose events are relayed.
//!
//! [`decide`] is pure: the same event and mode always produce the same
//! verdict, and nothing is logged or counted here. The mode is chosen once
//! at startup and never changes for the life of the process.

mod allow_list;

use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::event::{Event, EventKind};

pub use allow_list::AllowList;

/// Origin whose latency metrics are dropped in deny-list mode.
const GOROUTER: &str = "gorouter";
/// Origin whose value metrics are all dropped in deny-list mode.
const GROOTFS: &str = "grootfs";

/// The two mutually exclusive filtering strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    /// Keep only value metrics named in the allow-list tables.
    AllowList,
    /// Keep everything except the known noisy value metrics.
    DenyList,
}

impl FilterMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AllowList => "allow-list",
            Self::DenyList => "deny-list",
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow-list" | "allowlist" | "whitelist" => Ok(Self::AllowList),
            "deny-list" | "denylist" | "blacklist" => Ok(Self::DenyList),
            other => Err(Error::Config(format!(
                "unknown filter mode '{other}' (expected 'allow-list' or 'deny-list')"
            ))),
        }
    }
}

/// Outcome of applying the filter policy to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    Discard,
}

impl Verdict {
    pub const fn is_keep(self) -> bool {
        matches!(self, Self::Keep)
    }

    const fn keep_if(cond: bool) -> Self {
        if cond { Self::Keep } else { Self::Discard }
    }
}

/// Build the allow-list tables ahead of the first session.
pub fn init() {
    let _ = AllowList::global();
}

/// Whether a gorouter metric name is one of its latency series.
pub fn is_latency(name: &str) -> bool {
    name == "latency" || name == "route_lookup_time" || name.starts_with("latency.")
}

/// Decide whether `event` is forwarded under `mode`.
pub fn decide(event: &Event, mode: FilterMode) -> Verdict {
    match event.kind() {
        EventKind::ContainerMetric => Verdict::Keep,
        EventKind::ValueMetric => match mode {
            FilterMode::DenyList => decide_deny_list(event.origin(), event.metric_name()),
            FilterMode::AllowList => Verdict::keep_if(
                AllowList::global().permits(event.origin(), event.metric_name()),
            ),
        },
        EventKind::HttpStartStop
        | EventKind::LogMessage
        | EventKind::CounterEvent
        | EventKind::Error
        | EventKind::Unknown => Verdict::Discard,
    }
}

fn decide_deny_list(origin: &str, name: &str) -> Verdict {
    match origin {
        GOROUTER => Verdict::keep_if(!is_latency(name)),
        GROOTFS => Verdict::Discard,
        _ => Verdict::Keep,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
#[path = "filter_tests.rs"]
mod tests;
