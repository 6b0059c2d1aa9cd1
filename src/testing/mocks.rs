//! Mock implementations for testing
//!
//! [`MockSession`] records every request the driver makes and lets a test
//! script the CONNACK outcome or end the session from outside.

use crate::transport::mqtt::{OutboundMessage, SessionError, SessionState};
use crate::transport::Session;
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::QoS;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// How the mock answers CONNECT
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectBehavior {
    /// CONNACK with reason code 0
    Accept,
    /// CONNACK with a non-zero reason code
    Reject { code: u8, reason: String },
    /// No CONNACK ever arrives
    Hang,
}

/// Ends a [`MockSession`] as if the broker had gone away
#[derive(Debug, Clone)]
pub struct MockCloseHandle {
    close_tx: Arc<watch::Sender<Option<String>>>,
}

impl MockCloseHandle {
    pub fn close(&self, reason: impl Into<String>) {
        let _ = self.close_tx.send(Some(reason.into()));
    }
}

/// Mock session for testing
#[derive(Debug)]
pub struct MockSession {
    behavior: ConnectBehavior,
    endpoint: String,
    hang_publish: bool,
    connected: AtomicBool,
    pub subscriptions: Arc<Mutex<Vec<(String, QoS)>>>,
    pub published: Arc<Mutex<Vec<OutboundMessage>>>,
    connect_attempts: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
    close_tx: Arc<watch::Sender<Option<String>>>,
    close_rx: watch::Receiver<Option<String>>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::with_behavior(ConnectBehavior::Accept)
    }

    /// Broker answers CONNECT with `code`
    pub fn rejecting(code: u8, reason: impl Into<String>) -> Self {
        Self::with_behavior(ConnectBehavior::Reject {
            code,
            reason: reason.into(),
        })
    }

    /// Broker never answers CONNECT
    pub fn hanging() -> Self {
        Self::with_behavior(ConnectBehavior::Hang)
    }

    pub fn with_behavior(behavior: ConnectBehavior) -> Self {
        let (close_tx, close_rx) = watch::channel(None);
        Self {
            behavior,
            endpoint: "mock.broker:8883".to_string(),
            hang_publish: false,
            connected: AtomicBool::new(false),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            published: Arc::new(Mutex::new(Vec::new())),
            connect_attempts: Arc::new(AtomicUsize::new(0)),
            disconnects: Arc::new(AtomicUsize::new(0)),
            close_tx: Arc::new(close_tx),
            close_rx,
        }
    }

    /// PUBLISH never completes, so the caller can only leave by cancelling
    pub fn with_hanging_publish(mut self) -> Self {
        self.hang_publish = true;
        self
    }

    pub fn close_handle(&self) -> MockCloseHandle {
        MockCloseHandle {
            close_tx: self.close_tx.clone(),
        }
    }

    pub async fn get_subscriptions(&self) -> Vec<(String, QoS)> {
        self.subscriptions.lock().await.clone()
    }

    pub async fn get_published(&self) -> Vec<OutboundMessage> {
        self.published.lock().await.clone()
    }

    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SessionError::NotConnected {
                state: SessionState::Idle,
            })
        }
    }
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Session for MockSession {
    async fn connect(&mut self) -> Result<(), SessionError> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            ConnectBehavior::Accept => {
                self.connected.store(true, Ordering::SeqCst);
                Ok(())
            }
            ConnectBehavior::Reject { code, reason } => Err(SessionError::Rejected {
                code: *code,
                reason: reason.clone(),
            }),
            ConnectBehavior::Hang => std::future::pending().await,
        }
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> Result<(), SessionError> {
        self.ensure_connected()?;
        self.subscriptions
            .lock()
            .await
            .push((filter.to_string(), qos));
        Ok(())
    }

    async fn publish(&self, message: OutboundMessage) -> Result<(), SessionError> {
        self.ensure_connected()?;
        if self.hang_publish {
            return std::future::pending().await;
        }
        self.published.lock().await.push(message);
        Ok(())
    }

    async fn closed(&self) -> String {
        let mut close_rx = self.close_rx.clone();
        let reason = close_rx
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|reason| reason.clone());
        match reason {
            Some(reason) => reason,
            None => std::future::pending().await,
        }
    }

    async fn disconnect(&mut self) -> Result<(), SessionError> {
        self.ensure_connected()?;
        self.connected.store(false, Ordering::SeqCst);
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
