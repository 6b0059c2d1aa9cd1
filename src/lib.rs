//! MQTT getting-started sample
//!
//! Connects to a managed MQTT broker over mutual TLS, subscribes to one
//! topic filter, publishes one message and waits for SIGINT or SIGTERM.
//!
//! # Overview
//!
//! - [`config`] - Connection settings loaded from a `.env` style file
//! - [`transport::tls`] - Client credential and mutual-TLS transport
//! - [`transport::mqtt`] - MQTT v5 session with its background event pump
//! - [`driver`] - The connect, subscribe, publish, wait sequence
//! - [`shutdown`] - OS signal cancellation
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use mqtt_getting_started::driver::{SessionDriver, SessionPlan};
//! use mqtt_getting_started::shutdown::ShutdownSignal;
//! use mqtt_getting_started::testing::MockSession;
//!
//! # tokio_test::block_on(async {
//! let mut shutdown = ShutdownSignal::from_os_signals()?;
//! let mut driver = SessionDriver::new(MockSession::new(), SessionPlan::default());
//! let outcome = driver.run(&mut shutdown).await?;
//! println!("{outcome:?}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod observability;
pub mod shutdown;
pub mod testing;
pub mod transport;

pub use config::{ConfigError, ConnectionSettings};
pub use driver::{DriverOutcome, DriverState, SessionDriver, SessionPlan};
pub use error::{SampleError, SampleResult};
pub use shutdown::ShutdownSignal;
pub use transport::mqtt::{MqttSession, SessionHandlers};
pub use transport::Session;
