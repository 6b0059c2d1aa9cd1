//! Observability for the getting-started sample
//!
//! Structured logging with `tracing`; every progress line of the sample is a
//! log event.

pub mod logging;

// Re-export for convenience
pub use logging::{init_cli_logging, init_default_logging, init_logging, LogFormat};

// Span macros for structured logging
pub use logging::{lifecycle_span, mqtt_span};
