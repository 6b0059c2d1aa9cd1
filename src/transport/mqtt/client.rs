//! Impure I/O operations for the MQTT session
//!
//! [`MqttSession`] owns the rumqttc client and event loop. `connect` spawns a
//! single background pump that polls the event loop, dispatches inbound
//! traffic to the [`SessionHandlers`] and publishes the session state over a
//! watch channel. The pump never reconnects.

use super::connection::{
    classify_connection_error, configure_mqtt_options, SessionError, SessionState,
};
use super::message_handler::{
    DisconnectNotice, EventRoute, InboundMessage, MessageHandler, OutboundMessage,
};
use crate::config::ConnectionSettings;
use crate::mqtt_span;
use crate::transport::tls::TlsTransport;
use crate::transport::Session;
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, EventLoop, MqttOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn, Instrument};

/// Capacity of the client request queue
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// How long `disconnect` waits for the pump to flush DISCONNECT
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

pub type MessageCallback = Box<dyn Fn(&InboundMessage) + Send + Sync>;
pub type ErrorCallback = Box<dyn Fn(&str) + Send + Sync>;
pub type DisconnectCallback = Box<dyn Fn(&DisconnectNotice) + Send + Sync>;

/// Callbacks invoked by the event pump
pub struct SessionHandlers {
    /// Every inbound PUBLISH, whatever the topic
    pub on_message: MessageCallback,
    /// Asynchronous session errors after CONNACK
    pub on_error: ErrorCallback,
    /// DISCONNECT sent by the broker
    pub on_disconnect: DisconnectCallback,
}

impl SessionHandlers {
    /// Handlers that report each event as a log line
    pub fn logging() -> Self {
        Self {
            on_message: Box::new(|message| {
                info!(
                    "received message on topic {}; body: {} (retain: {})",
                    message.topic,
                    message.payload_text(),
                    message.retain
                );
            }),
            on_error: Box::new(|reason| {
                error!("client error: {}", reason);
            }),
            on_disconnect: Box::new(|notice| match &notice.reason_string {
                Some(reason) => warn!("server requested disconnect: {}", reason),
                None => warn!(
                    "server requested disconnect; reason code: {}",
                    notice.reason_code
                ),
            }),
        }
    }
}

impl Default for SessionHandlers {
    fn default() -> Self {
        Self::logging()
    }
}

impl std::fmt::Debug for SessionHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandlers").finish_non_exhaustive()
    }
}

/// MQTT v5 session over a mutual-TLS transport
pub struct MqttSession {
    endpoint: String,
    client: AsyncClient,
    event_loop: Mutex<Option<EventLoop>>,
    handlers: Option<SessionHandlers>,
    state_tx: watch::Sender<SessionState>,
    state_rx: watch::Receiver<SessionState>,
    closing: Arc<AtomicBool>,
    pump: Option<JoinHandle<()>>,
}

impl MqttSession {
    /// Bind a protocol client to the transport. No network I/O happens until
    /// [`Session::connect`].
    pub fn new(
        settings: &ConnectionSettings,
        transport: TlsTransport,
        handlers: SessionHandlers,
    ) -> Self {
        let endpoint = transport.endpoint().to_string();
        let mqtt_options = configure_mqtt_options(settings, transport.into_transport());
        Self::from_options(endpoint, mqtt_options, handlers)
    }

    /// Bind a protocol client to already configured options
    pub fn from_options(
        endpoint: String,
        mqtt_options: MqttOptions,
        handlers: SessionHandlers,
    ) -> Self {
        debug!(
            endpoint = %endpoint,
            client_id = %mqtt_options.client_id(),
            keep_alive_secs = mqtt_options.keep_alive().as_secs(),
            "Created MQTT session"
        );

        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);

        Self {
            endpoint,
            client,
            event_loop: Mutex::new(Some(event_loop)),
            handlers: Some(handlers),
            state_tx,
            state_rx,
            closing: Arc::new(AtomicBool::new(false)),
            pump: None,
        }
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    fn ensure_connected(&self) -> Result<(), SessionError> {
        let state = self.state();
        match state {
            SessionState::Connected => Ok(()),
            state => Err(SessionError::NotConnected { state }),
        }
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        if let Some(handle) = self.pump.take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl Session for MqttSession {
    async fn connect(&mut self) -> Result<(), SessionError> {
        let event_loop = self
            .event_loop
            .get_mut()
            .take()
            .ok_or(SessionError::AlreadyStarted)?;
        let handlers = self.handlers.take().ok_or(SessionError::AlreadyStarted)?;

        let (connack_tx, connack_rx) = oneshot::channel();
        let _ = self.state_tx.send(SessionState::Connecting);

        let span = mqtt_span!(operation = "connect", endpoint = %self.endpoint);
        span.in_scope(|| info!("Attempting to connect"));
        self.pump = Some(tokio::spawn(run_event_pump(
            event_loop,
            handlers,
            self.state_tx.clone(),
            connack_tx,
            self.closing.clone(),
            self.endpoint.clone(),
        )));

        async move {
            match connack_rx.await {
                Ok(Ok(session_present)) => {
                    info!(session_present, "Connection successful");
                    Ok(())
                }
                Ok(Err(e)) => Err(e),
                Err(_) => Err(SessionError::Closed(
                    "event loop stopped before CONNACK".to_string(),
                )),
            }
        }
        .instrument(span)
        .await
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> Result<(), SessionError> {
        self.ensure_connected()?;
        let span = mqtt_span!(operation = "subscribe", filter = %filter);
        async move {
            self.client
                .subscribe(filter.to_string(), qos)
                .await
                .map_err(SessionError::Request)?;
            debug!(?qos, "SUBSCRIBE queued");
            Ok::<(), SessionError>(())
        }
        .instrument(span)
        .await
    }

    async fn publish(&self, message: OutboundMessage) -> Result<(), SessionError> {
        self.ensure_connected()?;
        let span = mqtt_span!(operation = "publish", topic = %message.topic);
        async move {
            let qos = message.qos;
            self.client
                .publish(message.topic, qos, message.retain, message.payload)
                .await
                .map_err(SessionError::Request)?;
            debug!(?qos, "PUBLISH queued");
            Ok::<(), SessionError>(())
        }
        .instrument(span)
        .await
    }

    async fn closed(&self) -> String {
        let mut state_rx = self.state_rx.clone();
        loop {
            let closed = match &*state_rx.borrow_and_update() {
                SessionState::Closed(reason) => Some(reason.clone()),
                _ => None,
            };
            if let Some(reason) = closed {
                return reason;
            }
            if state_rx.changed().await.is_err() {
                return "session state channel closed".to_string();
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), SessionError> {
        let handle = self.pump.take().ok_or_else(|| SessionError::NotConnected {
            state: self.state(),
        })?;
        self.closing.store(true, Ordering::SeqCst);

        let result = self
            .client
            .disconnect()
            .await
            .map_err(SessionError::Request);

        let abort = handle.abort_handle();
        match tokio::time::timeout(DISCONNECT_GRACE, handle).await {
            Ok(_) => debug!("Event pump stopped after DISCONNECT"),
            Err(_) => {
                debug!("Event pump still running after DISCONNECT, aborting");
                abort.abort();
            }
        }
        let _ = self
            .state_tx
            .send(SessionState::Closed("client disconnected".to_string()));

        info!(endpoint = %self.endpoint, "MQTT session disconnected");
        result
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Poll the event loop until the session ends.
///
/// The CONNACK outcome (or the error that prevented it) is delivered once
/// through `connack_tx`. After that a broker DISCONNECT goes to
/// `on_disconnect` and any other error to `on_error`, unless the client is
/// already closing.
async fn run_event_pump(
    mut event_loop: EventLoop,
    handlers: SessionHandlers,
    state_tx: watch::Sender<SessionState>,
    connack_tx: oneshot::Sender<Result<bool, SessionError>>,
    closing: Arc<AtomicBool>,
    endpoint: String,
) {
    let mut connack_tx = Some(connack_tx);

    let reason = loop {
        let event = match event_loop.poll().await {
            Ok(event) => event,
            Err(e) => {
                if let Some(tx) = connack_tx.take() {
                    let reason = e.to_string();
                    let _ = tx.send(Err(classify_connection_error(e, &endpoint)));
                    break reason;
                }
                if closing.load(Ordering::SeqCst) {
                    debug!("Event loop ended while closing: {}", e);
                    break e.to_string();
                }
                match MessageHandler::server_disconnect(&e) {
                    Some(notice) => {
                        (handlers.on_disconnect)(&notice);
                        break format!("broker disconnected: {notice}");
                    }
                    None => {
                        let reason = e.to_string();
                        (handlers.on_error)(&reason);
                        break reason;
                    }
                }
            }
        };

        match MessageHandler::route_mqtt_event(event) {
            EventRoute::ConnectionAcknowledged { session_present } => {
                let _ = state_tx.send(SessionState::Connected);
                if let Some(tx) = connack_tx.take() {
                    let _ = tx.send(Ok(session_present));
                }
            }
            EventRoute::MessageReceived(message) => {
                trace!(target: "mqtt_transport", topic = %message.topic, "Received PUBLISH");
                (handlers.on_message)(&message);
            }
            EventRoute::SubscriptionConfirmed {
                packet_id,
                reason_codes,
            } => {
                info!(packet_id, reason_codes = %reason_codes, "Subscription confirmed");
            }
            EventRoute::PublishAcknowledged { packet_id } => {
                info!(packet_id, "Publish acknowledged");
            }
            EventRoute::InfrastructureEvent(event) => {
                trace!(target: "mqtt_transport", "MQTT event: {}", event);
            }
            EventRoute::OutgoingEvent => {}
        }
    };

    let _ = state_tx.send(SessionState::Closed(reason));
    debug!(endpoint = %endpoint, "MQTT event pump stopped");
}
