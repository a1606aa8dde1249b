use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::body::Body;
use axum::http::Request;
use tokio::sync::mpsc;
use tower::ServiceExt;

use nozzle_core::{FilterMode, RelayCounters};

use super::*;
use crate::server::build_router;
use crate::session::{SessionConfig, SessionCoordinator};
use crate::upstream::{Subscription, SubscriptionCloser};

#[derive(Default)]
struct CountingCloser {
    closes: AtomicUsize,
}

impl SubscriptionCloser for CountingCloser {
    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Firehose that either fails with a fixed error or hands out idle
/// subscriptions, recording the token it was given.
struct StubFirehose {
    fail: Mutex<Option<UpstreamError>>,
    closer: Arc<CountingCloser>,
    tokens: Mutex<Vec<String>>,
}

impl StubFirehose {
    fn new(fail: Option<UpstreamError>) -> Arc<Self> {
        Arc::new(Self {
            fail: Mutex::new(fail),
            closer: Arc::new(CountingCloser::default()),
            tokens: Mutex::new(Vec::new()),
        })
    }
}

impl Firehose for StubFirehose {
    async fn subscribe(
        &self,
        _subscription_id: &str,
        auth_token: &str,
    ) -> Result<Subscription, UpstreamError> {
        self.tokens.lock().unwrap().push(auth_token.to_string());
        if let Some(err) = self.fail.lock().unwrap().take() {
            return Err(err);
        }
        let (_events_tx, events) = mpsc::channel(1);
        let (_errors_tx, errors) = mpsc::channel(1);
        Ok(Subscription {
            events,
            errors,
            closer: Arc::clone(&self.closer) as Arc<dyn SubscriptionCloser>,
        })
    }
}

fn router(firehose: &Arc<StubFirehose>) -> axum::Router {
    build_router(SessionCoordinator::new(
        Arc::clone(firehose),
        FilterMode::DenyList,
        Arc::new(RelayCounters::new()),
        SessionConfig::default(),
    ))
}

async fn get(app: axum::Router, uri: &str, auth: Option<&str>) -> (StatusCode, String) {
    let mut req = Request::get(uri);
    if let Some(auth) = auth {
        req = req.header(AUTHORIZATION, auth);
    }
    let resp = app.oneshot(req.body(Body::empty()).unwrap()).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 4096).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[test]
fn subscribe_errors_map_to_statuses() {
    assert_eq!(
        status_for(&UpstreamError::Unauthorized("x".into())),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        status_for(&UpstreamError::InvalidRequest("x".into())),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        status_for(&UpstreamError::Connect("x".into())),
        StatusCode::BAD_GATEWAY
    );
    assert_eq!(
        status_for(&UpstreamError::Tls("x".into())),
        StatusCode::BAD_GATEWAY
    );
}

#[tokio::test]
async fn rejected_token_returns_unauthorized() {
    let firehose = StubFirehose::new(Some(UpstreamError::Unauthorized("401".into())));
    let (status, _) = get(router(&firehose), "/firehose/sub", Some("bearer nope")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(*firehose.tokens.lock().unwrap(), vec!["bearer nope".to_string()]);
    assert_eq!(firehose.closer.closes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unreachable_upstream_returns_bad_gateway() {
    let firehose = StubFirehose::new(Some(UpstreamError::Connect("refused".into())));
    let (status, _) = get(router(&firehose), "/firehose/sub", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn missing_upgrade_returns_bad_request_and_closes_subscription() {
    let firehose = StubFirehose::new(None);
    let (status, body) = get(router(&firehose), "/firehose/sub", Some("bearer t")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Could not open websocket connection");
    assert_eq!(firehose.closer.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn absent_authorization_is_passed_as_empty() {
    let firehose = StubFirehose::new(None);
    let _ = get(router(&firehose), "/firehose/sub", None).await;
    assert_eq!(*firehose.tokens.lock().unwrap(), vec![String::new()]);
}
