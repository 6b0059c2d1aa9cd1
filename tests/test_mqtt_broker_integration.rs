//! Integration Tests with a Real MQTT Broker
//!
//! These tests need a broker that accepts mutual TLS. Point
//! `MQTT_TEST_ENV_FILE` at a settings file for it and run
//! `cargo test -- --ignored`. They validate:
//! - CONNECT over mutual TLS with the configured credential
//! - SUBSCRIBE and PUBLISH at QoS 1 with the message coming back
//! - A signal-driven shutdown of the full driver

use mqtt_getting_started::config::ConnectionSettings;
use mqtt_getting_started::driver::{DriverOutcome, SessionDriver, SessionPlan};
use mqtt_getting_started::shutdown::ShutdownSignal;
use mqtt_getting_started::transport::mqtt::{
    InboundMessage, MqttSession, OutboundMessage, SessionHandlers,
};
use mqtt_getting_started::transport::tls::{Credential, TlsTransport};
use mqtt_getting_started::transport::Session;
use rumqttc::v5::mqttbytes::QoS;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn broker_settings() -> ConnectionSettings {
    let path = std::env::var("MQTT_TEST_ENV_FILE")
        .map(PathBuf::from)
        .expect("MQTT_TEST_ENV_FILE must point at a settings file");
    ConnectionSettings::load_from_file(&path).expect("settings should load")
}

fn session_with_channel(
    settings: &ConnectionSettings,
) -> (MqttSession, mpsc::UnboundedReceiver<InboundMessage>) {
    let credential = Credential::load(&settings.cert_file, &settings.key_file).unwrap();
    let transport = TlsTransport::establish(settings, credential).unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    let handlers = SessionHandlers {
        on_message: Box::new(move |message| {
            let _ = tx.send(message.clone());
        }),
        ..SessionHandlers::logging()
    };

    (MqttSession::new(settings, transport, handlers), rx)
}

#[tokio::test]
#[ignore = "requires a mutual-TLS broker (set MQTT_TEST_ENV_FILE)"]
async fn test_publish_round_trip_through_broker() {
    let settings = broker_settings();
    let (mut session, mut inbound) = session_with_channel(&settings);

    timeout(Duration::from_secs(30), session.connect())
        .await
        .expect("CONNACK should arrive")
        .expect("broker should accept the credential");

    session
        .subscribe("sample/+", QoS::AtLeastOnce)
        .await
        .expect("SUBSCRIBE should be queued");
    // Give the SUBACK a moment before publishing to our own filter
    tokio::time::sleep(Duration::from_millis(500)).await;

    session
        .publish(OutboundMessage::new(
            "sample/topic1",
            "hello world",
            QoS::AtLeastOnce,
        ))
        .await
        .expect("PUBLISH should be queued");

    let received = timeout(Duration::from_secs(10), inbound.recv())
        .await
        .expect("message should come back")
        .expect("handler channel open");
    assert_eq!(received.topic, "sample/topic1");
    assert_eq!(received.payload_text(), "hello world");

    session.disconnect().await.expect("DISCONNECT should be sent");
}

#[tokio::test]
#[ignore = "requires a mutual-TLS broker (set MQTT_TEST_ENV_FILE)"]
async fn test_driver_runs_until_signal() {
    let settings = broker_settings();
    let (session, mut inbound) = session_with_channel(&settings);
    let (trigger, mut shutdown) = ShutdownSignal::channel();

    tokio::spawn(async move {
        let _ = timeout(Duration::from_secs(10), inbound.recv()).await;
        trigger.trigger();
    });

    let mut driver = SessionDriver::new(session, SessionPlan::default());
    let outcome = timeout(Duration::from_secs(60), driver.run(&mut shutdown))
        .await
        .expect("driver should stop")
        .expect("run should succeed");

    assert_eq!(outcome, DriverOutcome::Terminated);
}
