//! Liveness probe.

/// Always answers while the process accepts HTTP. No side effects.
pub async fn health() -> &'static str {
    "I'm Alive!\n"
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn health_returns_alive_banner() {
        let app = Router::new().route("/health", get(health));
        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"I'm Alive!\n");
    }
}
