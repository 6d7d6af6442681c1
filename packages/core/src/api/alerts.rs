//! Alert listing endpoints.
//!
//! `/api/alerts` serves the live cache and never touches the database.
//! `/api/recent` reads durable history from the store.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::{bounded, ApiState};
use crate::alert::Alert;
use crate::error::AppError;

/// Default number of rows returned by `/api/recent`.
pub const DEFAULT_RECENT_LIMIT: i64 = 20;
const MAX_RECENT_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<i64>,
}

/// Projection returned by `/api/recent`.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct RecentAlert {
    pub timestamp: String,
    pub defect_type: String,
    pub confidence: f64,
}

impl From<Alert> for RecentAlert {
    fn from(alert: Alert) -> Self {
        Self {
            timestamp: alert.timestamp,
            defect_type: alert.defect_type,
            confidence: alert.confidence,
        }
    }
}

/// `GET /api/alerts`: cached alerts, newest first.
pub async fn get_alerts(State(state): State<ApiState>) -> Json<Vec<Alert>> {
    Json(state.cache.snapshot())
}

/// `GET /api/recent`: most recently stored alerts, newest first.
///
/// Query params:
/// - `limit`: max items to return (default 20, clamped to 1..=100)
pub async fn get_recent(
    State(state): State<ApiState>,
    params: Result<Query<RecentQuery>, QueryRejection>,
) -> Result<Json<Vec<RecentAlert>>, AppError> {
    let Query(params) = params.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_RECENT_LIMIT)
        .clamp(1, MAX_RECENT_LIMIT);

    let alerts = bounded(state.query_timeout, state.repository.recent(limit))
        .await
        .map_err(|err| {
            tracing::error!("Failed to load recent alerts: {}", err);
            err
        })?;

    Ok(Json(alerts.into_iter().map(RecentAlert::from).collect()))
}
