//! `GET /firehose/{subscription_id}`: stream filtered events over a WebSocket.
//!
//! The upstream subscription is opened before the upgrade so a rejected
//! token surfaces as an HTTP status rather than a socket that closes
//! immediately. Once upgraded, the write half of the socket is the session's
//! sink and a watcher on the read half stops the session when the peer
//! goes away.

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::pipeline::{EventSink, SinkError};
use crate::session::{PendingSession, SessionCoordinator, SessionError, SessionStopper};
use crate::upstream::{Firehose, UpstreamError};

const UPGRADE_FAILED: &str = "Could not open websocket connection";

/// HTTP status for a subscribe failure.
pub const fn status_for(err: &UpstreamError) -> StatusCode {
    match err {
        UpstreamError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        UpstreamError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    }
}

pub async fn open_stream<F: Firehose>(
    State(coordinator): State<SessionCoordinator<F>>,
    Path(subscription_id): Path<String>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let auth_token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let session = match coordinator.open(&subscription_id, auth_token).await {
        Ok(session) => session,
        Err(SessionError::Subscribe(e)) => {
            warn!(subscription_id = %subscription_id, error = %e, "Failed to open firehose session");
            return (status_for(&e), e.to_string()).into_response();
        }
    };

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            warn!(session_id = %session.id(), error = %rejection, "{UPGRADE_FAILED}");
            // Dropping the pending session closes the subscription.
            drop(session);
            return (StatusCode::BAD_REQUEST, UPGRADE_FAILED).into_response();
        }
    };

    let session_id = session.id();
    upgrade
        .on_failed_upgrade(move |e| {
            warn!(%session_id, error = %e, "{UPGRADE_FAILED}");
        })
        .on_upgrade(move |socket| serve_socket(socket, session))
}

async fn serve_socket(socket: WebSocket, session: PendingSession) {
    let (write, read) = socket.split();
    let watcher = tokio::spawn(watch_peer(read, session.stopper()));

    let mut sink = WebSocketSink::new(write);
    let summary = session.run(&mut sink).await;
    watcher.abort();
    sink.close().await;

    info!(
        session_id = %summary.session_id,
        reason = %summary.reason,
        forwarded = summary.forwarded,
        "Firehose stream ended"
    );
}

/// Stop the session once the peer closes or the socket errors. Inbound data
/// frames are ignored.
async fn watch_peer(mut read: SplitStream<WebSocket>, stopper: SessionStopper) {
    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Close(frame)) => {
                debug!(?frame, "Downstream sent close");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "Downstream read failed");
                break;
            }
        }
    }
    stopper.downstream_closed();
}

/// Write half of a downstream WebSocket. One binary message per event.
pub struct WebSocketSink {
    inner: SplitSink<WebSocket, Message>,
}

impl WebSocketSink {
    pub const fn new(inner: SplitSink<WebSocket, Message>) -> Self {
        Self { inner }
    }

    /// Send a close frame. Failures are logged; the peer may already be gone.
    pub async fn close(&mut self) {
        if let Err(e) = self.inner.close().await {
            debug!(error = %e, "Closing downstream socket failed");
        }
    }
}

impl EventSink for WebSocketSink {
    async fn send(&mut self, payload: Bytes) -> Result<(), SinkError> {
        self.inner
            .send(Message::Binary(payload))
            .await
            .map_err(|e| SinkError::Write(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
#[path = "firehose_tests.rs"]
mod tests;
