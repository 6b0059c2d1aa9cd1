//! Top-level error type for the getting-started sample
//!
//! Every failure in the connect-subscribe-publish flow is fatal. Each concern
//! keeps its own error enum; `SampleError` aggregates them for `main`.

use crate::config::ConfigError;
use crate::transport::mqtt::SessionError;
use crate::transport::tls::{CredentialError, TransportError};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Main error type for the sample
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Failed to install signal handlers: {0}")]
    Signal(#[source] std::io::Error),

    #[error("Session lost: {0}")]
    SessionLost(String),

    #[error("Failed to render settings: {0}")]
    Render(#[from] toml::ser::Error),
}

impl SampleError {
    /// Error text safe to write to logs
    pub fn sanitized_message(&self) -> String {
        sanitize_error_message(&self.to_string())
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SampleError::Config(_) => 2,
            _ => 1,
        }
    }
}

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|secret)(\s*[=:]\s*)\S+").expect("valid secret pattern")
});

/// Redact secrets that may be echoed back in parse errors (e.g. a settings
/// line containing `MQTT_PASSWORD=...`) and cap the length.
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN
        .replace_all(message, "${1}${2}***")
        .to_string();

    if sanitized.len() > 500 {
        let truncate_suffix = "...[truncated]";
        let mut cut = 500 - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for sample operations
pub type SampleResult<T> = Result<T, SampleError>;
