//! Relay sessions: one upstream subscription bridged to one downstream peer.
//!
//! A session is opened in two steps. [`SessionCoordinator::open`] subscribes
//! upstream and starts the intake and error-observer stages; the resulting
//! [`PendingSession`] is then [`run`](PendingSession::run) against a
//! downstream sink, which drives the drain stage until the session ends.
//! Dropping a pending session before it finishes tears it down.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, info, info_span, warn};
use uuid::Uuid;

use nozzle_core::{Event, FilterMode, RelayCounters};

use crate::pipeline::{
    DEFAULT_QUEUE_CAPACITY, DrainExit, EventSink, IntakeExit, StageTokens, Teardown,
    TeardownReason, run_drain, run_error_observer, run_intake,
};
use crate::upstream::{Firehose, UpstreamError};

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Capacity of the bounded queue between intake and drain.
    pub queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to subscribe upstream: {0}")]
    Subscribe(#[from] UpstreamError),
}

/// Opens sessions against a shared firehose.
///
/// Every session gets its own subscription, queue and stage tasks. The
/// filter mode and counters are shared across sessions.
pub struct SessionCoordinator<F> {
    firehose: Arc<F>,
    mode: FilterMode,
    counters: Arc<RelayCounters>,
    config: SessionConfig,
}

impl<F> Clone for SessionCoordinator<F> {
    fn clone(&self) -> Self {
        Self {
            firehose: Arc::clone(&self.firehose),
            mode: self.mode,
            counters: Arc::clone(&self.counters),
            config: self.config,
        }
    }
}

impl<F: Firehose> SessionCoordinator<F> {
    pub fn new(
        firehose: Arc<F>,
        mode: FilterMode,
        counters: Arc<RelayCounters>,
        config: SessionConfig,
    ) -> Self {
        Self {
            firehose,
            mode,
            counters,
            config,
        }
    }

    pub fn counters(&self) -> &Arc<RelayCounters> {
        &self.counters
    }

    /// Subscribe upstream and start the intake and error-observer stages.
    ///
    /// On error nothing was started and nothing needs closing.
    pub async fn open(
        &self,
        subscription_id: &str,
        auth_token: &str,
    ) -> Result<PendingSession, SessionError> {
        let id = Uuid::new_v4();
        let span = info_span!("session", session_id = %id, subscription_id);

        let subscription = self
            .firehose
            .subscribe(subscription_id, auth_token)
            .instrument(span.clone())
            .await?;

        let tokens = StageTokens::new();
        let teardown = Teardown::new(subscription.closer, tokens.clone());
        let (queue_tx, queue_rx) = mpsc::channel::<Event>(self.config.queue_capacity.max(1));

        let intake = tokio::spawn(
            run_intake(
                subscription.events,
                queue_tx,
                self.mode,
                Arc::clone(&self.counters),
                tokens.intake.clone(),
            )
            .instrument(span.clone()),
        );
        let observer = tokio::spawn(
            run_error_observer(subscription.errors, tokens.observer.clone())
                .instrument(span.clone()),
        );

        span.in_scope(|| info!(mode = %self.mode, "Session opened"));

        Ok(PendingSession {
            id,
            span,
            teardown,
            tokens,
            queue: queue_rx,
            intake: Some(intake),
            observer: Some(observer),
        })
    }
}

/// Handle that ends a session from outside the drain, e.g. when the
/// downstream peer disconnects.
#[derive(Debug, Clone)]
pub struct SessionStopper {
    teardown: Teardown,
}

impl SessionStopper {
    /// Tear the session down as closed by the downstream peer.
    /// Returns `true` if this call ran the teardown.
    pub fn downstream_closed(&self) -> bool {
        self.teardown.trigger(TeardownReason::DownstreamClosed)
    }

    pub fn is_stopped(&self) -> bool {
        self.teardown.is_triggered()
    }
}

/// Outcome of a finished session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub reason: TeardownReason,
    /// Events written downstream during the session.
    pub forwarded: u64,
}

/// A session whose upstream side is running and which awaits its sink.
pub struct PendingSession {
    id: Uuid,
    span: Span,
    teardown: Teardown,
    tokens: StageTokens,
    queue: mpsc::Receiver<Event>,
    intake: Option<JoinHandle<IntakeExit>>,
    observer: Option<JoinHandle<u64>>,
}

impl PendingSession {
    pub const fn id(&self) -> Uuid {
        self.id
    }

    pub fn stopper(&self) -> SessionStopper {
        SessionStopper {
            teardown: self.teardown.clone(),
        }
    }

    /// Drive the drain stage into `sink` until the session ends, then tear
    /// down and wait for the other stages to stop.
    pub async fn run<S: EventSink>(mut self, sink: &mut S) -> SessionSummary {
        let span = self.span.clone();
        self.drive(sink).instrument(span).await
    }

    async fn drive<S: EventSink>(&mut self, sink: &mut S) -> SessionSummary {
        let drain_token = self.tokens.drain.clone();
        let report = run_drain(&mut self.queue, sink, &drain_token).await;

        match report.exit {
            DrainExit::QueueClosed => {
                self.teardown.trigger(TeardownReason::UpstreamClosed);
            }
            DrainExit::WriteFailed(_) => {
                self.teardown.trigger(TeardownReason::WriteFailed);
            }
            // Someone else already triggered teardown.
            DrainExit::Stopped => {}
        }

        if let Some(intake) = self.intake.take() {
            match intake.await {
                Ok(exit) => debug!(?exit, "Intake joined"),
                Err(e) => warn!(error = %e, "Intake task failed"),
            }
        }
        if let Some(observer) = self.observer.take() {
            match observer.await {
                Ok(observed) => debug!(observed, "Error observer joined"),
                Err(e) => warn!(error = %e, "Error observer task failed"),
            }
        }
        self.queue.close();

        let reason = self.teardown.reason().unwrap_or(TeardownReason::Aborted);
        info!(reason = %reason, forwarded = report.forwarded, "Session closed");
        SessionSummary {
            session_id: self.id,
            reason,
            forwarded: report.forwarded,
        }
    }
}

impl Drop for PendingSession {
    fn drop(&mut self) {
        if self.teardown.trigger(TeardownReason::Aborted) {
            self.span
                .in_scope(|| debug!("Session dropped before completion"));
        }
    }
}

impl std::fmt::Debug for PendingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingSession")
            .field("id", &self.id)
            .field("teardown", &self.teardown)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "session_tests.rs"]
mod tests;
