//! Testing utilities and mock implementations
//!
//! This module provides a scripted [`Session`](crate::transport::Session) so
//! the session driver can be tested without an MQTT broker.

pub mod mocks;

pub use mocks::*;
