use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use super::ApiState;
use crate::listener::ListenerState;

/// `GET /health`: liveness.
pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))],
        "ok",
    )
}

/// `GET /ready`: 200 once the listener holds its subscription, 503 otherwise.
pub async fn ready(State(state): State<ApiState>) -> impl IntoResponse {
    let listener = *state.listener_state.borrow();
    let status = match listener {
        ListenerState::Subscribed => StatusCode::OK,
        ListenerState::Disconnected => StatusCode::SERVICE_UNAVAILABLE,
    };

    (
        status,
        Json(serde_json::json!({ "listener": listener.to_string() })),
    )
}

/// `GET /metrics`: Prometheus text exposition.
pub async fn metrics(State(state): State<ApiState>) -> Response {
    state.metrics.cache_size.set(state.cache.len() as f64);

    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            Body::from(body),
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Failed to render metrics: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics error").into_response()
        }
    }
}
