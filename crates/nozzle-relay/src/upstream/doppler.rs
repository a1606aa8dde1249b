//! Doppler firehose client over WebSocket.
//!
//! Data flow:
//! ```text
//! wss://<doppler>/firehose/<subscription_id>  →  reader task  →  events channel
//!                                                     └→ errors channel
//! ```
//!
//! The initial handshake runs inside `subscribe`, so an unreachable or
//! unauthorised upstream fails the session attempt. After that a reader task
//! owns the socket: it decodes binary frames into events, reconnects on
//! transport failures, and exits when the subscription's token is cancelled.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use rustls::ClientConfig;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use nozzle_core::Event;

use super::{Firehose, Subscription, UpstreamError, tls};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Capacity of the per-subscription error channel. Errors beyond this are dropped.
const ERROR_BUFFER: usize = 64;

/// Upstream connection settings.
#[derive(Debug, Clone)]
pub struct DopplerConfig {
    /// Base WebSocket URL, e.g. `wss://doppler.example.com:443`.
    pub endpoint: String,
    pub skip_ssl_validation: bool,
    /// A connection with no inbound frame for this long is considered dead.
    pub idle_timeout: Duration,
    /// Capacity of the events channel handed to the relay.
    pub buffer_size: usize,
    /// Reconnect attempts after a transport failure before giving up.
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for DopplerConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://doppler.cf.bosh-lite.com:443".to_string(),
            skip_ssl_validation: false,
            idle_timeout: Duration::from_secs(30),
            buffer_size: 100,
            max_retries: 5,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Firehose implementation backed by a Doppler WebSocket endpoint.
pub struct DopplerFirehose {
    config: DopplerConfig,
    tls: Arc<ClientConfig>,
}

impl DopplerFirehose {
    pub fn new(config: DopplerConfig) -> Result<Self, UpstreamError> {
        let tls = tls::client_config(config.skip_ssl_validation)?;
        Ok(Self { config, tls })
    }

    fn firehose_url(&self, subscription_id: &str) -> String {
        format!(
            "{}/firehose/{}",
            self.config.endpoint.trim_end_matches('/'),
            subscription_id
        )
    }
}

impl Firehose for DopplerFirehose {
    async fn subscribe(
        &self,
        subscription_id: &str,
        auth_token: &str,
    ) -> Result<Subscription, UpstreamError> {
        if subscription_id.is_empty() {
            return Err(UpstreamError::InvalidRequest(
                "subscription id must not be empty".into(),
            ));
        }

        let dialer = Dialer {
            url: self.firehose_url(subscription_id),
            auth_token: auth_token.to_string(),
            tls: Arc::clone(&self.tls),
        };
        let socket = dialer.dial().await?;
        info!(url = %dialer.url, "Firehose subscription opened");

        let (events_tx, events_rx) = mpsc::channel(self.config.buffer_size.max(1));
        let (errors_tx, errors_rx) = mpsc::channel(ERROR_BUFFER);
        let token = CancellationToken::new();

        let reader = Reader {
            dialer,
            idle_timeout: self.config.idle_timeout,
            max_retries: self.config.max_retries,
            retry_delay: self.config.retry_delay,
            events_tx,
            errors_tx,
            token: token.clone(),
        };
        let span = info_span!("firehose_reader", subscription_id = %subscription_id);
        tokio::spawn(reader.run(socket).instrument(span));

        Ok(Subscription {
            events: events_rx,
            errors: errors_rx,
            closer: Arc::new(token),
        })
    }
}

/// Everything needed to (re)open the upstream socket.
struct Dialer {
    url: String,
    auth_token: String,
    tls: Arc<ClientConfig>,
}

impl Dialer {
    async fn dial(&self) -> Result<WsStream, UpstreamError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| UpstreamError::InvalidRequest(e.to_string()))?;
        if !self.auth_token.is_empty() {
            let value = HeaderValue::from_str(&self.auth_token)
                .map_err(|e| UpstreamError::InvalidRequest(format!("authorization header: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let connector = Connector::Rustls(Arc::clone(&self.tls));
        let (socket, _response) =
            tokio_tungstenite::connect_async_tls_with_config(request, None, false, Some(connector))
                .await
                .map_err(classify_connect_error)?;
        Ok(socket)
    }
}

fn classify_connect_error(err: tungstenite::Error) -> UpstreamError {
    match err {
        tungstenite::Error::Http(response)
            if matches!(
                response.status(),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
            ) =>
        {
            UpstreamError::Unauthorized(format!("handshake returned {}", response.status()))
        }
        tungstenite::Error::Http(response) => {
            UpstreamError::Connect(format!("handshake returned {}", response.status()))
        }
        tungstenite::Error::Url(e) => UpstreamError::InvalidRequest(e.to_string()),
        other => UpstreamError::Connect(other.to_string()),
    }
}

/// Why one connection's read loop ended.
enum ReadExit {
    Cancelled,
    ConsumerGone,
    Failed(UpstreamError),
}

struct Reader {
    dialer: Dialer,
    idle_timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
    events_tx: mpsc::Sender<Event>,
    errors_tx: mpsc::Sender<UpstreamError>,
    token: CancellationToken,
}

impl Reader {
    async fn run(self, mut socket: WsStream) {
        let mut retries = 0u32;
        loop {
            match self.read_until_failure(&mut socket, &mut retries).await {
                ReadExit::Cancelled => {
                    debug!("Firehose subscription closed");
                    break;
                }
                ReadExit::ConsumerGone => {
                    debug!("Event consumer dropped, closing firehose subscription");
                    break;
                }
                ReadExit::Failed(err) => {
                    warn!(error = %err, "Firehose connection lost");
                    self.report(err);
                    match self.reconnect(&mut retries).await {
                        Some(fresh) => socket = fresh,
                        None => return,
                    }
                }
            }
        }
        // Best effort; the peer may already be gone.
        let _ = socket.close(None).await;
    }

    async fn read_until_failure(&self, socket: &mut WsStream, retries: &mut u32) -> ReadExit {
        loop {
            let next = tokio::select! {
                biased;
                () = self.token.cancelled() => return ReadExit::Cancelled,
                next = tokio::time::timeout(self.idle_timeout, socket.next()) => next,
            };

            let message = match next {
                Err(_) => return ReadExit::Failed(UpstreamError::IdleTimeout(self.idle_timeout)),
                Ok(None) => return ReadExit::Failed(UpstreamError::Closed("stream ended".into())),
                Ok(Some(Err(e))) => return ReadExit::Failed(UpstreamError::Transport(e.to_string())),
                Ok(Some(Ok(message))) => message,
            };

            match message {
                Message::Binary(data) => match Event::decode(data) {
                    Ok(event) => {
                        *retries = 0;
                        tokio::select! {
                            biased;
                            () = self.token.cancelled() => return ReadExit::Cancelled,
                            sent = self.events_tx.send(event) => {
                                if sent.is_err() {
                                    return ReadExit::ConsumerGone;
                                }
                            }
                        }
                    }
                    Err(e) => self.report(UpstreamError::Decode(e)),
                },
                Message::Close(frame) => {
                    let detail = frame.map_or_else(
                        || "close frame".to_string(),
                        |f| format!("close frame with code {}", u16::from(f.code)),
                    );
                    return ReadExit::Failed(UpstreamError::Closed(detail));
                }
                Message::Text(_) => debug!("Ignoring text frame from firehose"),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    /// Re-dial with a fixed delay. Returns `None` when the subscription should end.
    async fn reconnect(&self, retries: &mut u32) -> Option<WsStream> {
        loop {
            if *retries >= self.max_retries {
                self.report(UpstreamError::Closed(format!(
                    "giving up after {} reconnect attempts",
                    self.max_retries
                )));
                return None;
            }
            *retries += 1;

            tokio::select! {
                biased;
                () = self.token.cancelled() => return None,
                () = tokio::time::sleep(self.retry_delay) => {}
            }

            let attempt = tokio::select! {
                biased;
                () = self.token.cancelled() => return None,
                attempt = self.dialer.dial() => attempt,
            };
            match attempt {
                Ok(socket) => {
                    info!(attempt = *retries, "Firehose reconnected");
                    return Some(socket);
                }
                Err(err @ UpstreamError::Unauthorized(_)) => {
                    warn!(error = %err, "Firehose reconnect rejected");
                    self.report(err);
                    return None;
                }
                Err(err) => {
                    warn!(attempt = *retries, error = %err, "Firehose reconnect failed");
                    self.report(err);
                }
            }
        }
    }

    fn report(&self, err: UpstreamError) {
        if let Err(TrySendError::Full(dropped)) = self.errors_tx.try_send(err) {
            debug!(error = %dropped, "Upstream error channel full, dropping error");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn firehose(endpoint: &str) -> DopplerFirehose {
        DopplerFirehose::new(DopplerConfig {
            endpoint: endpoint.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn firehose_url_joins_endpoint_and_subscription() {
        let f = firehose("wss://doppler.example.com:443");
        assert_eq!(
            f.firehose_url("sub-1"),
            "wss://doppler.example.com:443/firehose/sub-1"
        );
        let f = firehose("wss://doppler.example.com/");
        assert_eq!(f.firehose_url("abc"), "wss://doppler.example.com/firehose/abc");
    }

    #[tokio::test]
    async fn empty_subscription_id_is_rejected() {
        let f = firehose("ws://127.0.0.1:1");
        let err = f.subscribe("", "token").await.unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_to_connect() {
        // Port 1 on loopback is not listening in test environments.
        let f = firehose("ws://127.0.0.1:1");
        let err = f.subscribe("sub", "token").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Connect(_)), "{err}");
    }
}
