//! Process startup and shutdown.
//!
//! Startup order: store schema, then the listener task, then (after a
//! bounded wait for the subscription) the HTTP server. Ctrl+C flips a
//! shared shutdown flag that stops the listener and lets axum finish
//! in-flight requests.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;

use crate::api::{create_router, AppState};
use crate::cache::RecentAlertsCache;
use crate::config::Config;
use crate::db::create_pool;
use crate::error::AppError;
use crate::listener::{
    run_listener, AlertIngestor, ListenerState, MqttTransport, RECONNECT_DELAY,
};
use crate::metrics::AppMetrics;
use crate::repository::AlertRepository;

/// How long startup waits for the first subscription before serving anyway.
pub const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Wait until the listener reports `Subscribed`, up to `limit`.
pub async fn wait_for_subscription(
    mut state: watch::Receiver<ListenerState>,
    limit: Duration,
) -> bool {
    matches!(
        tokio::time::timeout(limit, state.wait_for(|s| *s == ListenerState::Subscribed)).await,
        Ok(Ok(_))
    )
}

/// Resolve once the shutdown flag is set or its sender is gone.
pub async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Run the service until Ctrl+C.
pub async fn run(config: Config) -> Result<(), AppError> {
    let pool = create_pool(&config.database_url).await?;
    let repository = Arc::new(AlertRepository::new(pool.clone()));
    repository.init().await?;
    tracing::info!("Alert store ready at {}", config.database_url);

    let cache = Arc::new(RecentAlertsCache::new(config.cache_capacity));
    let metrics = Arc::new(
        AppMetrics::new().map_err(|err| AppError::Config(format!("metrics registry: {}", err)))?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (state_tx, state_rx) = watch::channel(ListenerState::Disconnected);

    let ingestor = AlertIngestor::new(repository.clone(), cache.clone(), metrics.clone());
    let transport = MqttTransport::new(&config.mqtt);
    let listener = tokio::spawn(run_listener(
        transport,
        ingestor,
        state_tx,
        shutdown_rx.clone(),
        RECONNECT_DELAY,
    ));

    // The API comes up even without a subscription so the stored history
    // stays reachable during a broker outage; `/ready` reports 503 until
    // the listener catches up.
    if wait_for_subscription(state_rx.clone(), READY_TIMEOUT).await {
        tracing::info!("Listener subscribed to {}", config.mqtt.topic);
    } else {
        tracing::warn!(
            "Listener not subscribed after {:?}; serving anyway while it keeps retrying",
            READY_TIMEOUT
        );
    }

    let state = Arc::new(AppState {
        repository,
        cache,
        metrics,
        listener_state: state_rx,
        query_timeout: config.query_timeout,
    });

    let tcp = TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Query API listening on http://{}", config.bind_addr);

    tokio::spawn(async move {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", err);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    axum::serve(tcp, create_router(state))
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx))
        .await?;

    if let Err(err) = listener.await {
        tracing::error!("Listener task ended abnormally: {}", err);
    }
    pool.close().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_for_subscription_returns_true_once_subscribed() {
        let (tx, rx) = watch::channel(ListenerState::Disconnected);
        let waiter = tokio::spawn(wait_for_subscription(rx, Duration::from_secs(5)));

        tx.send(ListenerState::Subscribed).unwrap();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_subscription_gives_up_after_limit() {
        let (_tx, rx) = watch::channel(ListenerState::Disconnected);
        assert!(!wait_for_subscription(rx, Duration::from_secs(10)).await);
    }

    #[tokio::test]
    async fn wait_for_shutdown_resolves_on_flag() {
        let (tx, rx) = watch::channel(false);
        let waiter = tokio::spawn(wait_for_shutdown(rx));

        tx.send(true).unwrap();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn wait_for_shutdown_resolves_when_sender_dropped() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        wait_for_shutdown(rx).await;
    }
}
