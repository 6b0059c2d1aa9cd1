//! MQTT v5 session for the getting-started sample
//!
//! The module separates pure functions from I/O operations:
//!
//! - [`connection`] - Session state, client options and error classification
//! - [`message_handler`] - Event routing and message types
//! - [`client`] - The session itself and its background event pump
//!
//! # Usage
//!
//! ```rust,no_run
//! use mqtt_getting_started::config::ConnectionSettings;
//! use mqtt_getting_started::transport::mqtt::{MqttSession, SessionHandlers};
//! use mqtt_getting_started::transport::tls::{Credential, TlsTransport};
//! use mqtt_getting_started::transport::Session;
//!
//! # tokio_test::block_on(async {
//! let settings = ConnectionSettings::load_from_file(".env".as_ref())?;
//! let credential = Credential::load(&settings.cert_file, &settings.key_file)?;
//! let transport = TlsTransport::establish(&settings, credential)?;
//!
//! let mut session = MqttSession::new(&settings, transport, SessionHandlers::logging());
//! session.connect().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::{MqttSession, SessionHandlers};
pub use connection::{SessionError, SessionState};
pub use message_handler::{DisconnectNotice, EventRoute, InboundMessage, MessageHandler, OutboundMessage};
