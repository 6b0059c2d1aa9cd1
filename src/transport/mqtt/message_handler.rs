//! Pure message routing for MQTT events
//!
//! This module turns rumqttc events into routing decisions and the message
//! types handed to the session handlers.

use bytes::Bytes;
use rumqttc::v5::mqttbytes::v5::{DisconnectReasonCode, Packet};
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{ConnectionError, Event, StateError};
use std::borrow::Cow;
use std::fmt;

/// A PUBLISH received on a subscribed topic
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub retain: bool,
}

impl InboundMessage {
    /// Payload as text, with invalid UTF-8 replaced
    pub fn payload_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// A PUBLISH to send
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

impl OutboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>, qos: QoS) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain: false,
        }
    }
}

/// Server-initiated DISCONNECT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectNotice {
    pub reason_code: u8,
    pub reason_string: Option<String>,
}

impl DisconnectNotice {
    pub fn new(reason_code: DisconnectReasonCode, reason_string: Option<String>) -> Self {
        Self {
            reason_code: reason_code as u8,
            reason_string,
        }
    }
}

impl fmt::Display for DisconnectNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason_string {
            Some(reason) => write!(f, "{reason}"),
            None => write!(f, "reason code {}", self.reason_code),
        }
    }
}

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to the matching handler
    pub fn route_mqtt_event(event: Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(connack) => EventRoute::ConnectionAcknowledged {
                    session_present: connack.session_present,
                },
                Packet::Publish(publish) => EventRoute::MessageReceived(InboundMessage {
                    topic: String::from_utf8_lossy(&publish.topic).into_owned(),
                    payload: publish.payload,
                    retain: publish.retain,
                }),
                Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                    packet_id: suback.pkid,
                    reason_codes: format!("{:?}", suback.return_codes),
                },
                Packet::PubAck(puback) => EventRoute::PublishAcknowledged {
                    packet_id: puback.pkid,
                },
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Broker DISCONNECT carried by an event loop error
    ///
    /// rumqttc reports an inbound DISCONNECT as a state error, not as an
    /// incoming packet.
    pub fn server_disconnect(error: &ConnectionError) -> Option<DisconnectNotice> {
        match error {
            ConnectionError::MqttState(StateError::ServerDisconnect {
                reason_code,
                reason_string,
            }) => Some(DisconnectNotice::new(*reason_code, reason_string.clone())),
            _ => None,
        }
    }
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone)]
pub enum EventRoute {
    /// CONNACK with reason code 0
    ConnectionAcknowledged { session_present: bool },
    /// Message received on a subscribed topic
    MessageReceived(InboundMessage),
    /// SUBACK for a pending SUBSCRIBE
    SubscriptionConfirmed { packet_id: u16, reason_codes: String },
    /// PUBACK for a QoS 1 PUBLISH
    PublishAcknowledged { packet_id: u16 },
    /// Infrastructure event (PingResp, etc.)
    InfrastructureEvent(String),
    /// Outgoing event (handled automatically)
    OutgoingEvent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::v5::mqttbytes::v5::{ConnAck, ConnectReturnCode, Publish};

    #[test]
    fn test_route_connack() {
        let connack = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: true,
            code: ConnectReturnCode::Success,
            properties: None,
        }));
        assert!(matches!(
            MessageHandler::route_mqtt_event(connack),
            EventRoute::ConnectionAcknowledged {
                session_present: true
            }
        ));
    }

    #[test]
    fn test_route_publish() {
        let publish = Event::Incoming(Packet::Publish(Publish {
            dup: false,
            qos: QoS::AtLeastOnce,
            retain: true,
            topic: Bytes::from("sample/topic1"),
            pkid: 1,
            payload: Bytes::from("hello world"),
            properties: None,
        }));

        match MessageHandler::route_mqtt_event(publish) {
            EventRoute::MessageReceived(message) => {
                assert_eq!(message.topic, "sample/topic1");
                assert_eq!(message.payload_text(), "hello world");
                assert!(message.retain);
            }
            other => panic!("Expected MessageReceived route, got {other:?}"),
        }
    }

    #[test]
    fn test_server_disconnect_from_state_error() {
        let error = ConnectionError::MqttState(StateError::ServerDisconnect {
            reason_code: DisconnectReasonCode::NotAuthorized,
            reason_string: None,
        });

        let notice = MessageHandler::server_disconnect(&error).unwrap();
        assert_eq!(notice.reason_code, 135);
        assert_eq!(notice.to_string(), "reason code 135");
    }

    #[test]
    fn test_server_disconnect_keeps_reason_string() {
        let error = ConnectionError::MqttState(StateError::ServerDisconnect {
            reason_code: DisconnectReasonCode::SessionTakenOver,
            reason_string: Some("Session taken over".to_string()),
        });

        let notice = MessageHandler::server_disconnect(&error).unwrap();
        assert_eq!(notice.reason_code, 0x8E);
        assert_eq!(notice.reason_string.as_deref(), Some("Session taken over"));
    }

    #[test]
    fn test_other_errors_are_not_disconnects() {
        let error = ConnectionError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert!(MessageHandler::server_disconnect(&error).is_none());
    }

    #[test]
    fn test_disconnect_notice_prefers_reason_string() {
        let notice = DisconnectNotice {
            reason_code: 142,
            reason_string: Some("Session taken over".to_string()),
        };
        assert_eq!(notice.to_string(), "Session taken over");
    }

    #[test]
    fn test_infrastructure_events() {
        let route = MessageHandler::route_mqtt_event(Event::Incoming(Packet::PingResp(
            rumqttc::v5::mqttbytes::v5::PingResp,
        )));
        assert!(matches!(route, EventRoute::InfrastructureEvent(_)));
    }

    #[test]
    fn test_payload_text_lossy() {
        let message = InboundMessage {
            topic: "sample/raw".to_string(),
            payload: Bytes::from_static(&[0x68, 0x69, 0xff]),
            retain: false,
        };
        assert_eq!(message.payload_text(), "hi\u{fffd}");
    }

    #[test]
    fn test_outbound_defaults_to_not_retained() {
        let message = OutboundMessage::new("sample/topic1", "hello world", QoS::AtLeastOnce);
        assert!(!message.retain);
        assert_eq!(message.payload, Bytes::from("hello world"));
    }
}
