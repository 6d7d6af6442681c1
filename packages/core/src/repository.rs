//! Durable alert store.
//!
//! All SQLite read/write logic lives here. The listener calls
//! [`AlertRepository::insert`] once per decoded alert; the API reads the
//! aggregates. Every call checks a connection out of the pool for the
//! duration of one statement, so a failing query never holds a connection.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};

use crate::alert::Alert;

const CREATE_DEFECTS_TABLE: &str = "CREATE TABLE IF NOT EXISTS defects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    defect_type TEXT NOT NULL,
    confidence REAL NOT NULL,
    frame_number INTEGER,
    total_defects_session INTEGER DEFAULT 0,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
)";

const CREATE_DEFECT_TYPE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_defects_defect_type ON defects (defect_type)";

/// Parameters for [`AlertRepository::hourly_activity`].
#[derive(Debug, Clone)]
pub struct ActivityQuery {
    /// Only alerts newer than `now - window` are counted.
    pub window: Duration,
    /// Bucket width. Labels are the bucket start at minute granularity.
    pub bucket: Duration,
    /// Maximum number of buckets returned.
    pub limit: i64,
}

impl Default for ActivityQuery {
    fn default() -> Self {
        Self {
            window: Duration::hours(24),
            bucket: Duration::hours(1),
            limit: 24,
        }
    }
}

/// Repository for reading and writing alerts to SQLite.
pub struct AlertRepository {
    pool: SqlitePool,
}

impl AlertRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the schema if it does not exist. Safe on every start.
    pub async fn init(&self) -> Result<(), sqlx::Error> {
        sqlx::query(CREATE_DEFECTS_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_DEFECT_TYPE_INDEX).execute(&self.pool).await?;
        Ok(())
    }

    /// Append one alert. Returns the assigned row id.
    pub async fn insert(&self, alert: &Alert) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO defects (timestamp, defect_type, confidence, frame_number, total_defects_session)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&alert.timestamp)
        .bind(&alert.defect_type)
        .bind(alert.confidence)
        .bind(alert.frame_number)
        .bind(alert.total_defects_session)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Total number of alerts ever stored.
    pub async fn count_all(&self) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM defects")
            .fetch_one(&self.pool)
            .await?;
        row.try_get("cnt")
    }

    /// Number of alerts per distinct `defect_type`.
    pub async fn count_by_type(&self) -> Result<BTreeMap<String, i64>, sqlx::Error> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT defect_type, COUNT(*) FROM defects GROUP BY defect_type",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    /// Bucketed alert counts over the trailing window, newest bucket first.
    ///
    /// Producer timestamps are interpreted as UTC; rows whose timestamp
    /// SQLite cannot parse do not contribute to any bucket.
    pub async fn hourly_activity(
        &self,
        query: &ActivityQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, i64)>, sqlx::Error> {
        let bucket_seconds = query.bucket.num_seconds().max(1);
        let cutoff = (now - query.window).timestamp();

        sqlx::query_as(
            "SELECT strftime('%Y-%m-%d %H:%M',
                        (CAST(strftime('%s', timestamp) AS INTEGER) / ?) * ?,
                        'unixepoch') AS bucket,
                    COUNT(*) AS cnt
             FROM defects
             WHERE CAST(strftime('%s', timestamp) AS INTEGER) > ?
             GROUP BY bucket
             ORDER BY bucket DESC
             LIMIT ?",
        )
        .bind(bucket_seconds)
        .bind(bucket_seconds)
        .bind(cutoff)
        .bind(query.limit.max(0))
        .fetch_all(&self.pool)
        .await
    }

    /// The `n` most recently inserted alerts, highest id first.
    pub async fn recent(&self, n: i64) -> Result<Vec<Alert>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT id, timestamp, defect_type, confidence, frame_number,
                    total_defects_session, created_at
             FROM defects
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(n.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<Alert, sqlx::Error> {
                let total: Option<i64> = row.try_get("total_defects_session")?;
                let created_at: Option<String> = row.try_get("created_at")?;

                Ok(Alert {
                    id: Some(row.try_get("id")?),
                    timestamp: row.try_get("timestamp")?,
                    defect_type: row.try_get("defect_type")?,
                    confidence: row.try_get("confidence")?,
                    frame_number: row.try_get("frame_number")?,
                    total_defects_session: total.unwrap_or(0),
                    received_at: created_at.unwrap_or_default(),
                })
            })
            .collect()
    }
}
