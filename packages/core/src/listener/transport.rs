//! Message transport abstraction.
//!
//! The listener loop only needs three things from a broker connection:
//! the next event, a way to (re)subscribe, and a way to hang up.
//! [`MqttTransport`] provides them on top of `rumqttc`, whose event loop
//! reconnects by itself every time it is polled after a failure.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, SubscribeReasonCode};

use crate::config::MqttConfig;
use crate::error::AppError;

/// Capacity of the request channel between `AsyncClient` and `EventLoop`.
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Upper bound on how long a clean disconnect may take.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Transport-level events the listener reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The broker accepted the connection.
    Connected,
    /// The broker acknowledged the topic subscription.
    Subscribed,
    /// The broker refused the subscription; the session itself is still up.
    SubscribeRejected,
    /// An inbound payload on the subscribed topic.
    Message(Vec<u8>),
    /// Anything else (pings, outgoing acks).
    Idle,
}

#[async_trait]
pub trait AlertTransport: Send {
    /// Wait for the next event. Errors are connection failures; calling
    /// again afterwards lets the transport attempt to reconnect.
    async fn next_event(&mut self) -> Result<TransportEvent, AppError>;

    /// Subscribe to the configured topic.
    async fn subscribe(&mut self) -> Result<(), AppError>;

    /// Close the connection.
    async fn disconnect(&mut self);

    /// Human-readable endpoint for log lines.
    fn endpoint(&self) -> String;
}

pub struct MqttTransport {
    client: AsyncClient,
    eventloop: EventLoop,
    topic: String,
    endpoint: String,
}

impl MqttTransport {
    pub fn new(config: &MqttConfig) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.broker, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_seconds));

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        Self {
            client,
            eventloop,
            topic: config.topic.clone(),
            endpoint: format!("{}:{}/{}", config.broker, config.port, config.topic),
        }
    }
}

#[async_trait]
impl AlertTransport for MqttTransport {
    async fn next_event(&mut self) -> Result<TransportEvent, AppError> {
        match self.eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => Ok(TransportEvent::Connected),
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                if ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure))
                {
                    Ok(TransportEvent::SubscribeRejected)
                } else {
                    Ok(TransportEvent::Subscribed)
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                Ok(TransportEvent::Message(publish.payload.to_vec()))
            }
            Ok(_) => Ok(TransportEvent::Idle),
            Err(err) => Err(AppError::Connection(err.to_string())),
        }
    }

    async fn subscribe(&mut self) -> Result<(), AppError> {
        self.client
            .subscribe(&self.topic, QoS::AtMostOnce)
            .await
            .map_err(|err| AppError::Connection(err.to_string()))
    }

    async fn disconnect(&mut self) {
        if let Err(err) = self.client.disconnect().await {
            tracing::debug!("MQTT disconnect request failed: {}", err);
            return;
        }

        // The DISCONNECT packet only leaves once the event loop is polled.
        let eventloop = &mut self.eventloop;
        let _ = tokio::time::timeout(DISCONNECT_TIMEOUT, async move {
            while eventloop.poll().await.is_ok() {}
        })
        .await;
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}
