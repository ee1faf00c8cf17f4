//! HTTP exposer
//!
//! Serves the store's current value on `GET /data` and answers browser
//! preflight on `OPTIONS /data`. Every response grants cross-origin access
//! from any origin; the intended caller is a browser dashboard on a
//! different origin. Handlers only read the store, so they never block the
//! ingest loop.

use std::future::Future;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use log::info;

use crate::config::HttpConfig;
use crate::error::RelayError;
use crate::store::LatestValue;

/// Build the relay's router over a store handle.
pub fn build_router(store: LatestValue) -> Router {
    Router::new()
        .route("/data", get(data).options(preflight))
        .with_state(store)
}

/// Bind and serve until the shutdown future resolves.
pub async fn serve(
    config: &HttpConfig,
    store: LatestValue,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind((config.bind.as_str(), config.port))
        .await
        .map_err(|source| RelayError::Bind {
            addr: format!("{}:{}", config.bind, config.port),
            source,
        })?;

    info!(
        "serving http://{}:{}/data",
        config.bind, config.port
    );

    axum::serve(listener, build_router(store))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server terminated")
}

/// `GET /data`: the store's current text, verbatim, however stale.
async fn data(State(store): State<LatestValue>) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        store.read(),
    )
}

/// `OPTIONS /data`: CORS preflight acknowledgement; does not touch the store.
async fn preflight() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get_data_request() -> Request<Body> {
        Request::builder().uri("/data").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn serves_placeholder_before_any_line() {
        let app = build_router(LatestValue::new());

        let response = app.oneshot(get_data_request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(body_string(response).await, "{}");
    }

    #[tokio::test]
    async fn serves_published_value_verbatim() {
        let store = LatestValue::new();
        store.publish("{\"x\":1}".to_string());
        let app = build_router(store);

        let first = app.clone().oneshot(get_data_request()).await.unwrap();
        let second = app.oneshot(get_data_request()).await.unwrap();

        assert_eq!(body_string(first).await, "{\"x\":1}");
        assert_eq!(body_string(second).await, "{\"x\":1}");
    }

    #[tokio::test]
    async fn serves_non_json_lines_unchanged() {
        let store = LatestValue::new();
        store.publish("not json at all".to_string());
        let app = build_router(store);

        let response = app.oneshot(get_data_request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "not json at all");
    }

    #[tokio::test]
    async fn reads_track_later_publishes() {
        let store = LatestValue::new();
        let app = build_router(store.clone());

        store.publish("{\"n\":1}".to_string());
        let first = app.clone().oneshot(get_data_request()).await.unwrap();
        store.publish("{\"n\":2}".to_string());
        let second = app.oneshot(get_data_request()).await.unwrap();

        assert_eq!(body_string(first).await, "{\"n\":1}");
        assert_eq!(body_string(second).await, "{\"n\":2}");
    }

    #[tokio::test]
    async fn preflight_grants_cross_origin_access() {
        let app = build_router(LatestValue::new());

        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/data")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS],
            "GET, OPTIONS"
        );
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS],
            "Content-Type"
        );
        assert!(body_string(response).await.is_empty());
    }
}
