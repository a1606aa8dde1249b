//! HTTP surface of the relay.

mod firehose;
mod health;

use axum::Router;
use axum::routing::get;

use crate::session::SessionCoordinator;
use crate::upstream::Firehose;

pub use firehose::{WebSocketSink, open_stream, status_for};
pub use health::health;

/// Build the relay router: `/health` and `/firehose/{subscription_id}`.
pub fn build_router<F: Firehose>(coordinator: SessionCoordinator<F>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/firehose/{subscription_id}", get(open_stream::<F>))
        .with_state(coordinator)
}
