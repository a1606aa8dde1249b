//! Upstream firehose subscription contract.
//!
//! The relay consumes the firehose through [`Firehose::subscribe`], which
//! yields an ordered event source, a parallel error source, and a close
//! handle that ends both. Reconnects, authentication and upstream buffering
//! belong to the implementation ([`DopplerFirehose`] in production).

pub mod doppler;
mod tls;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use nozzle_core::Event;

pub use doppler::{DopplerConfig, DopplerFirehose};

/// Source of firehose subscriptions.
pub trait Firehose: Send + Sync + 'static {
    /// Open a subscription. `auth_token` is passed through unmodified.
    fn subscribe(
        &self,
        subscription_id: &str,
        auth_token: &str,
    ) -> impl Future<Output = Result<Subscription, UpstreamError>> + Send;
}

/// Terminates an open subscription. Must tolerate being called more than once.
pub trait SubscriptionCloser: Send + Sync {
    fn close(&self);
}

impl SubscriptionCloser for CancellationToken {
    fn close(&self) {
        self.cancel();
    }
}

/// An open upstream subscription.
pub struct Subscription {
    /// Events in arrival order. Ends when the subscription is closed for good.
    pub events: mpsc::Receiver<Event>,
    /// Transport-level errors. Diagnostic only.
    pub errors: mpsc::Receiver<UpstreamError>,
    pub closer: Arc<dyn SubscriptionCloser>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("Upstream rejected credentials: {0}")]
    Unauthorized(String),

    #[error("Invalid subscription request: {0}")]
    InvalidRequest(String),

    #[error("Failed to connect to upstream: {0}")]
    Connect(String),

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("Upstream transport error: {0}")]
    Transport(String),

    #[error("Failed to decode upstream event: {0}")]
    Decode(#[from] nozzle_core::Error),

    #[error("No data from upstream for {0:?}")]
    IdleTimeout(Duration),

    #[error("Upstream closed: {0}")]
    Closed(String),
}
