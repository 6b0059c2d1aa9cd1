//! Session driver: CONNECT, one SUBSCRIBE, one PUBLISH, then wait
//!
//! The driver owns the session and walks it through
//! `Disconnected -> Connecting -> Connected -> SubscribePending -> Active ->
//! Terminating`. Every blocking step races against the [`ShutdownSignal`].

use crate::lifecycle_span;
use crate::shutdown::ShutdownSignal;
use crate::transport::mqtt::{OutboundMessage, SessionError};
use crate::transport::tls::TransportError;
use crate::transport::Session;
use rumqttc::v5::mqttbytes::QoS;
use std::time::Duration;
use tracing::{error, info, warn, Instrument};

/// Default time to wait for CONNACK
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound for the DISCONNECT sent on a signal-driven exit
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Driver lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Disconnected,
    Connecting,
    Connected,
    SubscribePending,
    Active,
    /// Final; nothing is sent after this
    Terminating,
}

/// What the driver subscribes to and publishes
#[derive(Debug, Clone, PartialEq)]
pub struct SessionPlan {
    pub topic_filter: String,
    pub subscribe_qos: QoS,
    pub message: OutboundMessage,
}

impl Default for SessionPlan {
    fn default() -> Self {
        Self {
            topic_filter: "sample/+".to_string(),
            subscribe_qos: QoS::AtLeastOnce,
            message: OutboundMessage::new("sample/topic1", "hello world", QoS::AtLeastOnce),
        }
    }
}

/// How a run ended without a fatal error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverOutcome {
    /// Shutdown was requested
    Terminated,
    /// The session ended underneath the driver
    SessionLost(String),
}

/// Drives one session from CONNECT to shutdown
pub struct SessionDriver<S: Session> {
    session: S,
    plan: SessionPlan,
    connect_timeout: Duration,
    state: DriverState,
}

impl<S: Session> SessionDriver<S> {
    pub fn new(session: S, plan: SessionPlan) -> Self {
        Self {
            session,
            plan,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            state: DriverState::Disconnected,
        }
    }

    /// Override how long CONNECT waits for CONNACK
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    fn transition(&mut self, next: DriverState) {
        tracing::debug!(from = ?self.state, to = ?next, "Driver state change");
        self.state = next;
    }

    /// Run the sequence until shutdown or until the session ends.
    ///
    /// A rejected or failed CONNECT is returned as an error and neither
    /// SUBSCRIBE nor PUBLISH is attempted.
    pub async fn run(
        &mut self,
        shutdown: &mut ShutdownSignal,
    ) -> Result<DriverOutcome, SessionError> {
        let endpoint = self.session.endpoint().to_string();
        let span = lifecycle_span!(phase = "session_driver", endpoint = %endpoint);
        self.run_inner(shutdown, endpoint).instrument(span).await
    }

    async fn run_inner(
        &mut self,
        shutdown: &mut ShutdownSignal,
        endpoint: String,
    ) -> Result<DriverOutcome, SessionError> {
        self.transition(DriverState::Connecting);
        let connected = tokio::select! {
            result = tokio::time::timeout(self.connect_timeout, self.session.connect()) => Some(result),
            _ = shutdown.wait() => None,
        };
        match connected {
            None => return Ok(self.signal_caught(false).await),
            Some(Err(_elapsed)) => {
                self.transition(DriverState::Terminating);
                return Err(SessionError::Transport(TransportError::Timeout {
                    endpoint,
                    after: self.connect_timeout,
                }));
            }
            Some(Ok(Err(e))) => {
                self.transition(DriverState::Terminating);
                if let SessionError::Rejected { code, reason } = &e {
                    error!("Failed to connect to {} : {} - {}", endpoint, code, reason);
                }
                return Err(e);
            }
            Some(Ok(Ok(()))) => self.transition(DriverState::Connected),
        }

        self.transition(DriverState::SubscribePending);
        info!(filter = %self.plan.topic_filter, "Subscribing");
        let subscribed = tokio::select! {
            result = self.session.subscribe(&self.plan.topic_filter, self.plan.subscribe_qos) => Some(result),
            _ = shutdown.wait() => None,
        };
        match subscribed {
            None => return Ok(self.signal_caught(true).await),
            Some(result) => self.fail_on_error(result)?,
        }

        info!(topic = %self.plan.message.topic, "Publishing");
        let published = tokio::select! {
            result = self.session.publish(self.plan.message.clone()) => Some(result),
            _ = shutdown.wait() => None,
        };
        match published {
            None => return Ok(self.signal_caught(true).await),
            Some(result) => self.fail_on_error(result)?,
        }

        self.transition(DriverState::Active);
        info!("Waiting for messages, press Ctrl+C to exit");
        let lost = tokio::select! {
            reason = self.session.closed() => Some(reason),
            _ = shutdown.wait() => None,
        };
        match lost {
            None => Ok(self.signal_caught(true).await),
            Some(reason) => {
                self.transition(DriverState::Terminating);
                error!("Session lost: {}", reason);
                Ok(DriverOutcome::SessionLost(reason))
            }
        }
    }

    fn fail_on_error(&mut self, result: Result<(), SessionError>) -> Result<(), SessionError> {
        if result.is_err() {
            self.transition(DriverState::Terminating);
        }
        result
    }

    async fn signal_caught(&mut self, connected: bool) -> DriverOutcome {
        self.transition(DriverState::Terminating);
        if connected {
            match tokio::time::timeout(DISCONNECT_TIMEOUT, self.session.disconnect()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("DISCONNECT failed: {}", e),
                Err(_) => warn!("DISCONNECT timed out after {:?}", DISCONNECT_TIMEOUT),
            }
        }
        info!("Signal caught - exiting");
        DriverOutcome::Terminated
    }
}
