//! Tests for logging configuration and format parsing
//!
//! Tests the pure functions in the logging module that handle
//! log format parsing and configuration from environment variables.

use mqtt_getting_started::observability::logging::{parse_level, verbosity_level, LogFormat};
use tracing::Level;

#[test]
fn test_log_format_parse_json() {
    assert_eq!(LogFormat::parse("json"), LogFormat::Json);
    assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
}

#[test]
fn test_log_format_parse_pretty() {
    assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
    assert_eq!(LogFormat::parse("Pretty"), LogFormat::Pretty);
}

#[test]
fn test_log_format_parse_invalid_defaults_to_compact() {
    // An interactive sample defaults to one line per event
    assert_eq!(LogFormat::parse("invalid"), LogFormat::Compact);
    assert_eq!(LogFormat::parse(""), LogFormat::Compact);
    assert_eq!(LogFormat::parse("yaml"), LogFormat::Compact);
}

#[test]
fn test_log_format_parse_whitespace() {
    assert_eq!(LogFormat::parse("  json  "), LogFormat::Json);
    assert_eq!(LogFormat::parse("json\n"), LogFormat::Json);
    assert_eq!(LogFormat::parse("\tpretty"), LogFormat::Pretty);
}

#[test]
fn test_log_level_from_environment_value() {
    assert_eq!(parse_level("ERROR"), Level::ERROR);
    assert_eq!(parse_level(" debug "), Level::DEBUG);
    assert_eq!(parse_level("verbose"), Level::INFO);
}

#[test]
fn test_verbose_flags_override_environment() {
    assert_eq!(verbosity_level(0), None);
    assert_eq!(verbosity_level(1), Some(Level::DEBUG));
    assert_eq!(verbosity_level(3), Some(Level::TRACE));
}
