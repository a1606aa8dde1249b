//! Shared helpers for integration tests: an in-process Doppler stand-in and
//! envelope builders.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use prost::Message as _;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;

use nozzle_proto::events::envelope::EventType;
use nozzle_proto::events::{ContainerMetric, CounterEvent, Envelope, ValueMetric};

pub const WAIT: Duration = Duration::from_secs(5);

pub type ServerSocket = WebSocketStream<TcpStream>;

/// What the fake Doppler saw during one handshake.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub path: String,
    pub authorization: Option<String>,
}

/// Minimal Doppler: accepts WebSocket upgrades on `/firehose/<id>` and hands
/// each accepted socket to the test.
pub struct FakeDoppler {
    pub addr: SocketAddr,
    handshakes: Arc<Mutex<Vec<Handshake>>>,
    sockets: mpsc::UnboundedReceiver<ServerSocket>,
}

impl FakeDoppler {
    pub async fn start() -> Self {
        Self::spawn(None).await
    }

    /// A Doppler that answers every handshake with `status`.
    pub async fn rejecting(status: StatusCode) -> Self {
        Self::spawn(Some(status)).await
    }

    async fn spawn(reject_with: Option<StatusCode>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handshakes = Arc::new(Mutex::new(Vec::new()));
        let (sockets_tx, sockets) = mpsc::unbounded_channel();

        let seen = Arc::clone(&handshakes);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let seen = Arc::clone(&seen);
                let sockets_tx = sockets_tx.clone();
                tokio::spawn(async move {
                    let callback = |req: &Request, resp: Response| {
                        seen.lock().unwrap().push(Handshake {
                            path: req.uri().path().to_string(),
                            authorization: req
                                .headers()
                                .get(AUTHORIZATION)
                                .and_then(|v| v.to_str().ok())
                                .map(str::to_string),
                        });
                        match reject_with {
                            Some(status) => {
                                let mut err = ErrorResponse::new(Some("rejected".to_string()));
                                *err.status_mut() = status;
                                Err(err)
                            }
                            None => Ok(resp),
                        }
                    };
                    if let Ok(socket) =
                        tokio_tungstenite::accept_hdr_async(stream, callback).await
                    {
                        let _ = sockets_tx.send(socket);
                    }
                });
            }
        });

        Self {
            addr,
            handshakes,
            sockets,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn handshakes(&self) -> Vec<Handshake> {
        self.handshakes.lock().unwrap().clone()
    }

    /// Wait for the next accepted upstream connection.
    pub async fn next_socket(&mut self) -> ServerSocket {
        tokio::time::timeout(WAIT, self.sockets.recv())
            .await
            .expect("no upstream connection within timeout")
            .unwrap()
    }
}

pub fn value_metric(origin: &str, name: &str) -> Bytes {
    encode(Envelope {
        origin: origin.into(),
        event_type: EventType::ValueMetric as i32,
        timestamp: Some(1_700_000_000_000_000_000),
        value_metric: Some(ValueMetric {
            name: name.into(),
            value: 3.0,
            unit: "count".into(),
        }),
        ..Default::default()
    })
}

pub fn container_metric(app: &str) -> Bytes {
    encode(Envelope {
        origin: "rep".into(),
        event_type: EventType::ContainerMetric as i32,
        container_metric: Some(ContainerMetric {
            application_id: app.into(),
            instance_index: 0,
            cpu_percentage: 12.5,
            memory_bytes: 1024,
            ..Default::default()
        }),
        ..Default::default()
    })
}

pub fn counter_event(name: &str) -> Bytes {
    encode(Envelope {
        origin: "gorouter".into(),
        event_type: EventType::CounterEvent as i32,
        counter_event: Some(CounterEvent {
            name: name.into(),
            delta: 1,
            total: Some(10),
        }),
        ..Default::default()
    })
}

fn encode(envelope: Envelope) -> Bytes {
    Bytes::from(envelope.encode_to_vec())
}
