//! Transport layer for the getting-started sample
//!
//! [`tls`] turns the client credential into a mutual-TLS transport and
//! [`mqtt`] runs the MQTT v5 session on top of it. The driver talks to the
//! session only through the [`Session`] trait so it can be exercised without
//! a broker.

use rumqttc::v5::mqttbytes::QoS;

pub mod mqtt;
pub mod tls;

use mqtt::{OutboundMessage, SessionError};

/// Capabilities the session driver needs from a live MQTT session
///
/// Inbound messages, asynchronous errors and broker disconnects are delivered
/// to the handlers supplied when the session was constructed.
#[async_trait::async_trait]
pub trait Session: Send + Sync {
    /// Send CONNECT and wait for a successful CONNACK
    async fn connect(&mut self) -> Result<(), SessionError>;

    /// Queue one SUBSCRIBE; the SUBACK is handled in the background
    async fn subscribe(&self, filter: &str, qos: QoS) -> Result<(), SessionError>;

    /// Queue one PUBLISH; for QoS 1 the PUBACK is handled in the background
    async fn publish(&self, message: OutboundMessage) -> Result<(), SessionError>;

    /// Resolve with the reason once the session has ended
    async fn closed(&self) -> String;

    /// Send DISCONNECT and stop background processing
    async fn disconnect(&mut self) -> Result<(), SessionError>;

    /// Broker address in `host:port` form
    fn endpoint(&self) -> &str;
}
