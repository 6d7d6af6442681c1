//! Per-message ingestion: decode, persist, cache.

use std::sync::Arc;

use chrono::Utc;

use crate::alert::Alert;
use crate::cache::RecentAlertsCache;
use crate::metrics::AppMetrics;
use crate::repository::AlertRepository;

/// What happened to one inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Persisted and cached.
    Stored(Alert),
    /// Cached, but the store write failed.
    CachedOnly(Alert),
    /// Not decodable; nothing changed.
    Dropped,
}

/// Applies inbound payloads to the store and the cache.
///
/// The store and the cache are updated independently: a failed insert is
/// logged and counted, and the alert still reaches the live view.
pub struct AlertIngestor {
    repository: Arc<AlertRepository>,
    cache: Arc<RecentAlertsCache>,
    metrics: Arc<AppMetrics>,
}

impl AlertIngestor {
    pub fn new(
        repository: Arc<AlertRepository>,
        cache: Arc<RecentAlertsCache>,
        metrics: Arc<AppMetrics>,
    ) -> Self {
        Self {
            repository,
            cache,
            metrics,
        }
    }

    pub fn metrics(&self) -> &AppMetrics {
        &self.metrics
    }

    /// Handle one payload. Never fails; every problem is logged instead.
    pub async fn process_message(&self, payload: &[u8]) -> IngestOutcome {
        self.metrics.messages_received_total.inc();

        let mut alert = match Alert::decode(payload, Utc::now()) {
            Ok(alert) => alert,
            Err(err) => {
                self.metrics.decode_errors_total.inc();
                tracing::warn!("Dropping inbound message: {}", err);
                return IngestOutcome::Dropped;
            }
        };

        let persisted = match self.repository.insert(&alert).await {
            Ok(id) => {
                alert.id = Some(id);
                self.metrics.alerts_stored_total.inc();
                true
            }
            Err(err) => {
                self.metrics.persist_errors_total.inc();
                tracing::error!("Failed to store {} alert: {}", alert.defect_type, err);
                false
            }
        };

        self.cache.push(alert.clone());
        self.metrics.cache_size.set(self.cache.len() as f64);

        tracing::info!(
            "Received alert: {} (confidence {:.2})",
            alert.defect_type,
            alert.confidence
        );

        if persisted {
            IngestOutcome::Stored(alert)
        } else {
            IngestOutcome::CachedOnly(alert)
        }
    }
}
