//! Error aggregation, exit codes and log sanitization

use mqtt_getting_started::config::{keys, ConfigError};
use mqtt_getting_started::error::{sanitize_error_message, SampleError};
use mqtt_getting_started::transport::mqtt::SessionError;
use mqtt_getting_started::transport::tls::TransportError;
use std::time::Duration;

#[test]
fn test_config_errors_exit_with_two() {
    let error = SampleError::from(ConfigError::MissingKey(keys::HOST_NAME));
    assert_eq!(error.exit_code(), 2);
}

#[test]
fn test_runtime_errors_exit_with_one() {
    let rejected = SampleError::from(SessionError::Rejected {
        code: 135,
        reason: "NotAuthorized".to_string(),
    });
    assert_eq!(rejected.exit_code(), 1);
    assert_eq!(SampleError::SessionLost("gone".into()).exit_code(), 1);
}

#[test]
fn test_rejection_message_carries_code_and_reason() {
    let error = SampleError::from(SessionError::Rejected {
        code: 135,
        reason: "NotAuthorized".to_string(),
    });
    let message = error.sanitized_message();

    assert!(message.contains("135"));
    assert!(message.contains("NotAuthorized"));
}

#[test]
fn test_timeout_message_names_endpoint() {
    let error = SampleError::from(SessionError::from(TransportError::Timeout {
        endpoint: "broker.example.net:8883".to_string(),
        after: Duration::from_secs(30),
    }));

    assert!(error.to_string().contains("broker.example.net:8883"));
}

#[test]
fn test_sanitize_redacts_key_value_secrets() {
    let sanitized = sanitize_error_message("password=abc123 token: xyz secret = s3cr3t");

    assert!(!sanitized.contains("abc123"));
    assert!(!sanitized.contains("xyz"));
    assert!(!sanitized.contains("s3cr3t"));
}
