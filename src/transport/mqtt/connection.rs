//! Pure connection state and configuration for the MQTT session
//!
//! This module contains pure functions for building client options from the
//! loaded settings and for classifying event loop failures.

use crate::config::ConnectionSettings;
use crate::transport::tls::TransportError;
use rumqttc::v5::mqttbytes::v5::ConnectReturnCode;
use rumqttc::v5::{ClientError, ConnectionError, MqttOptions};
use rumqttc::Transport;
use std::time::Duration;
use thiserror::Error;

/// Lifecycle of one MQTT session as seen by the event pump
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Constructed, no network activity yet
    Idle,
    /// CONNECT sent, waiting for CONNACK
    Connecting,
    /// CONNACK with reason code 0 received
    Connected,
    /// Session ended with reason; never leaves this state
    Closed(String),
}

/// MQTT session errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// `reason` names the reason code; rumqttc drops the CONNACK reason string
    #[error("Broker rejected CONNECT: {code} - {reason}")]
    Rejected { code: u8, reason: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Session was already started")]
    AlreadyStarted,
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: SessionState },
    #[error("MQTT request could not be queued: {0}")]
    Request(#[source] ClientError),
    #[error("Session closed: {0}")]
    Closed(String),
}

/// Build client options for a mutual-TLS session from settings
///
/// Clean start is always requested and the password is only sent when one
/// is configured.
pub fn configure_mqtt_options(settings: &ConnectionSettings, transport: Transport) -> MqttOptions {
    let mut mqtt_options = MqttOptions::new(
        settings.client_id.clone(),
        settings.hostname.clone(),
        settings.tcp_port,
    );

    mqtt_options.set_keep_alive(Duration::from_secs(u64::from(settings.keep_alive_secs)));
    mqtt_options.set_clean_start(true);
    mqtt_options.set_credentials(
        settings.username.clone(),
        settings.password.clone().unwrap_or_default(),
    );
    mqtt_options.set_transport(transport);

    mqtt_options
}

/// Wire value of a CONNACK reason code
///
/// `ConnectReturnCode` carries no discriminants. The three MQTT 3.1.1-only
/// variants map to their 3.1.1 return codes.
pub fn connack_reason_code(code: ConnectReturnCode) -> u8 {
    match code {
        ConnectReturnCode::Success => 0,
        ConnectReturnCode::RefusedProtocolVersion => 1,
        ConnectReturnCode::BadClientId => 2,
        ConnectReturnCode::ServiceUnavailable => 3,
        ConnectReturnCode::UnspecifiedError => 128,
        ConnectReturnCode::MalformedPacket => 129,
        ConnectReturnCode::ProtocolError => 130,
        ConnectReturnCode::ImplementationSpecificError => 131,
        ConnectReturnCode::UnsupportedProtocolVersion => 132,
        ConnectReturnCode::ClientIdentifierNotValid => 133,
        ConnectReturnCode::BadUserNamePassword => 134,
        ConnectReturnCode::NotAuthorized => 135,
        ConnectReturnCode::ServerUnavailable => 136,
        ConnectReturnCode::ServerBusy => 137,
        ConnectReturnCode::Banned => 138,
        ConnectReturnCode::BadAuthenticationMethod => 140,
        ConnectReturnCode::TopicNameInvalid => 144,
        ConnectReturnCode::PacketTooLarge => 149,
        ConnectReturnCode::QuotaExceeded => 151,
        ConnectReturnCode::PayloadFormatInvalid => 153,
        ConnectReturnCode::RetainNotSupported => 154,
        ConnectReturnCode::QoSNotSupported => 155,
        ConnectReturnCode::UseAnotherServer => 156,
        ConnectReturnCode::ServerMoved => 157,
        ConnectReturnCode::ConnectionRateExceeded => 159,
    }
}

/// Map an event loop failure to the session error reported to the caller
pub fn classify_connection_error(error: ConnectionError, endpoint: &str) -> SessionError {
    match error {
        ConnectionError::ConnectionRefused(code) => SessionError::Rejected {
            code: connack_reason_code(code),
            reason: format!("{code:?}"),
        },
        ConnectionError::Io(source) => SessionError::Transport(TransportError::Io {
            endpoint: endpoint.to_string(),
            source,
        }),
        ConnectionError::Tls(e) => SessionError::Transport(TransportError::Handshake {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        }),
        other => SessionError::Closed(other.to_string()),
    }
}
