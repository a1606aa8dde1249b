//! Relay pipeline: upstream events → filter → bounded queue → downstream sink.
//!
//! Data flow:
//! ```text
//! upstream events → intake (filter) → bounded queue → drain → EventSink
//! upstream errors → error observer → log
//! ```
//!
//! Each stage runs as its own task with its own [`CancellationToken`], so a
//! stage stuck on a suspension point never keeps another from stopping. The
//! only blocking chain is intake → queue → drain → sink, which has no cycle
//! back to intake.
//!
//! Delivery downstream is at-most-once: an event whose write fails is not
//! retried or redelivered.

mod drain;
mod intake;
mod observer;

use std::future::Future;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::upstream::SubscriptionCloser;

pub use drain::{DrainExit, DrainReport, run_drain};
pub use intake::{IntakeExit, run_intake};
pub use observer::run_error_observer;

/// Default capacity of the bounded queue between intake and drain.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// Downstream destination for kept events, one binary message per event.
pub trait EventSink: Send {
    fn send(&mut self, payload: Bytes) -> impl Future<Output = Result<(), SinkError>> + Send;
}

impl EventSink for mpsc::Sender<Bytes> {
    async fn send(&mut self, payload: Bytes) -> Result<(), SinkError> {
        mpsc::Sender::send(self, payload)
            .await
            .map_err(|_| SinkError::Closed)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Downstream connection closed")]
    Closed,

    #[error("Downstream write failed: {0}")]
    Write(String),
}

/// Independent stop signals for the three stages of one session.
#[derive(Debug, Clone, Default)]
pub struct StageTokens {
    pub intake: CancellationToken,
    pub drain: CancellationToken,
    pub observer: CancellationToken,
}

impl StageTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel_all(&self) {
        self.intake.cancel();
        self.drain.cancel();
        self.observer.cancel();
    }
}

/// What ended a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownReason {
    /// The downstream peer went away.
    DownstreamClosed,
    /// A write to the downstream sink failed.
    WriteFailed,
    /// The upstream event source ended and the queue was drained.
    UpstreamClosed,
    /// The session was dropped before it ran (e.g. the upgrade failed).
    Aborted,
}

impl TeardownReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DownstreamClosed => "downstream_closed",
            Self::WriteFailed => "write_failed",
            Self::UpstreamClosed => "upstream_closed",
            Self::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for TeardownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One-shot teardown shared by every path that can end a session.
///
/// The first [`Teardown::trigger`] closes the upstream subscription and then
/// cancels all three stage tokens. Every later call is a no-op, so the
/// subscription is closed exactly once whichever path gets there first.
#[derive(Clone)]
pub struct Teardown {
    inner: Arc<TeardownInner>,
}

struct TeardownInner {
    reason: OnceLock<TeardownReason>,
    closer: Arc<dyn SubscriptionCloser>,
    tokens: StageTokens,
}

impl Teardown {
    pub fn new(closer: Arc<dyn SubscriptionCloser>, tokens: StageTokens) -> Self {
        Self {
            inner: Arc::new(TeardownInner {
                reason: OnceLock::new(),
                closer,
                tokens,
            }),
        }
    }

    /// Run the teardown sequence. Returns `true` only for the call that ran it.
    pub fn trigger(&self, reason: TeardownReason) -> bool {
        if self.inner.reason.set(reason).is_err() {
            return false;
        }
        debug!(reason = %reason, "Tearing down session");
        self.inner.closer.close();
        self.inner.tokens.cancel_all();
        true
    }

    pub fn reason(&self) -> Option<TeardownReason> {
        self.inner.reason.get().copied()
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.reason.get().is_some()
    }
}

impl std::fmt::Debug for Teardown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Teardown")
            .field("reason", &self.reason())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
#[path = "pipeline_tests.rs"]
mod tests;
