//! Broker subscription loop.
//!
//! One long-lived task drives the transport: on every connection
//! acknowledgement it subscribes to the alert topic, and every inbound
//! payload is handed to [`AlertIngestor::process_message`] inline, so store
//! ids follow delivery order. Connection failures are logged and the
//! transport is polled again after a short pause; the transport itself
//! performs the reconnect. A refused subscription is retried on the same
//! session after that pause.

pub mod ingest;
pub mod transport;

use std::fmt;
use std::time::Duration;

use tokio::sync::watch;

pub use ingest::{AlertIngestor, IngestOutcome};
pub use transport::{AlertTransport, MqttTransport, TransportEvent};

/// Pause between a connection failure and the next reconnect attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Disconnected,
    Subscribed,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerState::Disconnected => write!(f, "disconnected"),
            ListenerState::Subscribed => write!(f, "subscribed"),
        }
    }
}

fn set_state(state: &watch::Sender<ListenerState>, ingestor: &AlertIngestor, next: ListenerState) {
    let previous = state.send_replace(next);
    ingestor
        .metrics()
        .listener_subscribed
        .set(if next == ListenerState::Subscribed { 1.0 } else { 0.0 });
    if previous != next {
        tracing::debug!("Listener state: {} -> {}", previous, next);
    }
}

/// Run the subscription loop until `shutdown` flips to `true` (or its
/// sender is dropped).
pub async fn run_listener<T: AlertTransport>(
    mut transport: T,
    ingestor: AlertIngestor,
    state: watch::Sender<ListenerState>,
    mut shutdown: watch::Receiver<bool>,
    reconnect_delay: Duration,
) {
    tracing::info!("Alert listener started ({})", transport.endpoint());

    while !*shutdown.borrow() {
        let event = tokio::select! {
            event = transport.next_event() => event,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
        };

        match event {
            Ok(TransportEvent::Connected) => {
                tracing::info!("Connected to broker {}", transport.endpoint());
                if let Err(err) = transport.subscribe().await {
                    tracing::error!("Subscribe request failed: {}", err);
                }
            }
            Ok(TransportEvent::Subscribed) => {
                tracing::info!("Subscribed to {}", transport.endpoint());
                set_state(&state, &ingestor, ListenerState::Subscribed);
            }
            Ok(TransportEvent::SubscribeRejected) => {
                tracing::warn!(
                    "Broker rejected subscription to {} (retrying in {:?})",
                    transport.endpoint(),
                    reconnect_delay
                );
                set_state(&state, &ingestor, ListenerState::Disconnected);
                tokio::select! {
                    _ = tokio::time::sleep(reconnect_delay) => {}
                    _ = shutdown.changed() => continue,
                }
                // No new ConnAck arrives on a live session, so ask again here.
                if let Err(err) = transport.subscribe().await {
                    tracing::error!("Subscribe request failed: {}", err);
                }
            }
            Ok(TransportEvent::Message(payload)) => {
                ingestor.process_message(&payload).await;
            }
            Ok(TransportEvent::Idle) => {}
            Err(err) => {
                tracing::warn!(
                    "Broker connection error: {} (retrying in {:?})",
                    err,
                    reconnect_delay
                );
                set_state(&state, &ingestor, ListenerState::Disconnected);
                tokio::select! {
                    _ = tokio::time::sleep(reconnect_delay) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
    }

    transport.disconnect().await;
    set_state(&state, &ingestor, ListenerState::Disconnected);
    tracing::info!("Alert listener stopped cleanly");
}
