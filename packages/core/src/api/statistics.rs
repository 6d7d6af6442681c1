use std::collections::BTreeMap;

use axum::{extract::State, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{bounded, ApiState};
use crate::alert::TIMESTAMP_FORMAT;
use crate::error::AppError;
use crate::repository::ActivityQuery;

#[derive(Debug, Serialize, Deserialize)]
pub struct StatisticsResponse {
    pub total_defects: i64,
    pub defects_by_type: BTreeMap<String, i64>,
    /// `[bucket_label, count]` pairs, newest bucket first.
    pub hourly_activity: Vec<(String, i64)>,
    pub last_updated: String,
}

/// `GET /api/statistics`: aggregate counts over the store.
pub async fn get_statistics(
    State(state): State<ApiState>,
) -> Result<Json<StatisticsResponse>, AppError> {
    let now = Utc::now();
    let activity_query = ActivityQuery::default();
    let repo = &state.repository;

    let (total_defects, defects_by_type, hourly_activity) = bounded(state.query_timeout, async {
        tokio::try_join!(
            repo.count_all(),
            repo.count_by_type(),
            repo.hourly_activity(&activity_query, now),
        )
    })
    .await
    .map_err(|err| {
        tracing::error!("Failed to compute statistics: {}", err);
        err
    })?;

    Ok(Json(StatisticsResponse {
        total_defects,
        defects_by_type,
        hourly_activity,
        last_updated: Utc::now().format(TIMESTAMP_FORMAT).to_string(),
    }))
}
