//! HTTP query API.
//!
//! Routes:
//! - `GET /api/alerts`    : recent-alerts cache, newest first
//! - `GET /api/statistics`: aggregate counts from the store
//! - `GET /api/recent`    : latest stored alerts, newest first
//! - `GET /health`, `GET /ready`, `GET /metrics`

pub mod alerts;
pub mod health;
pub mod statistics;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{MatchedPath, Request, State},
    http::Method,
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};

use crate::cache::RecentAlertsCache;
use crate::error::AppError;
use crate::listener::ListenerState;
use crate::metrics::AppMetrics;
use crate::repository::AlertRepository;

/// Shared state for every route.
pub type ApiState = Arc<AppState>;

pub struct AppState {
    pub repository: Arc<AlertRepository>,
    pub cache: Arc<RecentAlertsCache>,
    pub metrics: Arc<AppMetrics>,
    pub listener_state: watch::Receiver<ListenerState>,
    /// Upper bound on any single store query issued by a handler.
    pub query_timeout: Duration,
}

/// Assemble the full router.
pub fn create_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    Router::new()
        .route("/api/alerts", get(alerts::get_alerts))
        .route("/api/recent", get(alerts::get_recent))
        .route("/api/statistics", get(statistics::get_statistics))
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/metrics", get(health::metrics))
        .route_layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .layer(cors)
        .with_state(state)
}

async fn track_requests(State(state): State<ApiState>, request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let started = Instant::now();

    let response = next.run(request).await;

    state
        .metrics
        .http_requests_total
        .with_label_values(&[method.as_str(), path.as_str(), response.status().as_str()])
        .inc();
    state
        .metrics
        .http_request_duration
        .observe(started.elapsed().as_secs_f64());

    response
}

/// Run a store query under the handler deadline.
pub(crate) async fn bounded<T>(
    limit: Duration,
    query: impl Future<Output = Result<T, sqlx::Error>>,
) -> Result<T, AppError> {
    match tokio::time::timeout(limit, query).await {
        Ok(result) => result.map_err(AppError::from),
        Err(_) => Err(AppError::Timeout(limit)),
    }
}
