//! Connection settings for the getting-started sample
//!
//! Settings are read from a dotenv-style key-value file. Process environment
//! variables with the same key take precedence over the file, so a deployment
//! can inject a value without editing it.

use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Keys understood by the settings loader
pub mod keys {
    pub const HOST_NAME: &str = "MQTT_HOST_NAME";
    pub const TCP_PORT: &str = "MQTT_TCP_PORT";
    pub const CLIENT_ID: &str = "MQTT_CLIENT_ID";
    pub const USERNAME: &str = "MQTT_USERNAME";
    pub const PASSWORD: &str = "MQTT_PASSWORD";
    pub const KEEP_ALIVE: &str = "MQTT_KEEP_ALIVE_IN_SECONDS";
    pub const CA_FILE: &str = "MQTT_CA_FILE";
    pub const CERT_FILE: &str = "MQTT_CERT_FILE";
    pub const KEY_FILE: &str = "MQTT_KEY_FILE";

    pub const ALL: [&str; 9] = [
        HOST_NAME, TCP_PORT, CLIENT_ID, USERNAME, PASSWORD, KEEP_ALIVE, CA_FILE, CERT_FILE,
        KEY_FILE,
    ];
}

/// Default MQTT over TLS port
pub const DEFAULT_TCP_PORT: u16 = 8883;

/// Default keep-alive interval in seconds
pub const DEFAULT_KEEP_ALIVE_SECS: u16 = 30;

/// Shortest keep-alive the MQTT client accepts
pub const MIN_KEEP_ALIVE_SECS: u16 = 5;

/// Everything needed to reach the broker, loaded once at startup
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConnectionSettings {
    /// Broker host name, also used for TLS server name verification
    pub hostname: String,
    pub tcp_port: u16,
    pub client_id: String,
    pub username: String,
    /// Optional password; never printed
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "redact_secret"
    )]
    pub password: Option<String>,
    /// Keep-alive interval in seconds, at least MIN_KEEP_ALIVE_SECS
    pub keep_alive_secs: u16,
    /// Extra CA bundle added on top of the platform trust store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,
    /// Client certificate (PEM)
    pub cert_file: PathBuf,
    /// Client private key (PEM)
    pub key_file: PathBuf,
}

fn redact_secret<S: Serializer>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(_) => serializer.serialize_str("***"),
        None => serializer.serialize_none(),
    }
}

/// Settings loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Settings file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Failed to parse settings file: {0}")]
    Parse(#[from] dotenvy::Error),
    #[error("Missing required setting: {0}")]
    MissingKey(&'static str),
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("{key} points to a file that does not exist: {}", path.display())]
    MissingFile { key: &'static str, path: PathBuf },
}

impl ConnectionSettings {
    /// Load settings from a dotenv file, letting process environment variables override it.
    ///
    /// Relative certificate paths are resolved against the directory that
    /// contains the settings file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let mut pairs = Vec::new();
        for item in dotenvy::from_path_iter(path)? {
            pairs.push(item?);
        }

        // Environment wins over the file
        for key in keys::ALL {
            if let Ok(value) = std::env::var(key) {
                pairs.push((key.to_string(), value));
            }
        }

        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        let settings = Self::from_pairs(pairs, base_dir)?;
        settings.validate_files()?;

        Ok(settings)
    }

    /// Build settings from key-value pairs without touching the filesystem.
    ///
    /// Later pairs override earlier ones. Unknown keys are ignored.
    pub fn from_pairs<I, K, V>(pairs: I, base_dir: &Path) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut values = std::collections::HashMap::new();
        for (key, value) in pairs {
            if let Some(known) = keys::ALL.iter().find(|k| **k == key.as_ref()) {
                values.insert(*known, value.into());
            }
        }

        let required = |key: &'static str| -> Result<String, ConfigError> {
            values
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingKey(key))
        };
        let optional = |key: &'static str| -> Option<String> {
            values
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let hostname = required(keys::HOST_NAME)?;
        let client_id = values
            .get(keys::CLIENT_ID)
            .cloned()
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingKey(keys::CLIENT_ID))?;
        validate_client_id(&client_id)?;
        let username = required(keys::USERNAME)?;
        let cert_file = resolve_path(base_dir, &required(keys::CERT_FILE)?);
        let key_file = resolve_path(base_dir, &required(keys::KEY_FILE)?);

        let tcp_port = match optional(keys::TCP_PORT) {
            Some(raw) => parse_port(&raw)?,
            None => DEFAULT_TCP_PORT,
        };
        let keep_alive_secs = match optional(keys::KEEP_ALIVE) {
            Some(raw) => parse_keep_alive(&raw)?,
            None => DEFAULT_KEEP_ALIVE_SECS,
        };

        Ok(Self {
            hostname,
            tcp_port,
            client_id,
            username,
            password: values.get(keys::PASSWORD).cloned().filter(|v| !v.is_empty()),
            keep_alive_secs,
            ca_file: optional(keys::CA_FILE).map(|p| resolve_path(base_dir, &p)),
            cert_file,
            key_file,
        })
    }

    /// Check that every referenced certificate file exists
    pub fn validate_files(&self) -> Result<(), ConfigError> {
        let mut files = vec![
            (keys::CERT_FILE, &self.cert_file),
            (keys::KEY_FILE, &self.key_file),
        ];
        if let Some(ca_file) = &self.ca_file {
            files.push((keys::CA_FILE, ca_file));
        }

        for (key, path) in files {
            if !path.is_file() {
                return Err(ConfigError::MissingFile {
                    key,
                    path: path.clone(),
                });
            }
        }
        Ok(())
    }

    /// Broker address in `host:port` form
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.hostname, self.tcp_port)
    }
}

fn resolve_path(base_dir: &Path, raw: &str) -> PathBuf {
    let path = PathBuf::from(raw);
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

/// Parse a TCP port; 0 is rejected
pub fn parse_port(raw: &str) -> Result<u16, ConfigError> {
    let port = raw
        .parse::<u16>()
        .map_err(|e| invalid(keys::TCP_PORT, raw, e.to_string()))?;
    if port == 0 {
        return Err(invalid(keys::TCP_PORT, raw, "port must be non-zero".to_string()));
    }
    Ok(port)
}

/// Parse a keep-alive interval of at least MIN_KEEP_ALIVE_SECS
///
/// rumqttc panics on shorter intervals, 0 included, so they never leave the
/// loader.
pub fn parse_keep_alive(raw: &str) -> Result<u16, ConfigError> {
    let secs = raw
        .parse::<u16>()
        .map_err(|e| invalid(keys::KEEP_ALIVE, raw, e.to_string()))?;
    if secs < MIN_KEEP_ALIVE_SECS {
        return Err(invalid(
            keys::KEEP_ALIVE,
            raw,
            format!("must be at least {MIN_KEEP_ALIVE_SECS} seconds"),
        ));
    }
    Ok(secs)
}

/// Leading whitespace in a client id is treated as a settings file typo
fn validate_client_id(client_id: &str) -> Result<(), ConfigError> {
    if client_id.starts_with(char::is_whitespace) {
        return Err(invalid(
            keys::CLIENT_ID,
            client_id,
            "must not start with whitespace".to_string(),
        ));
    }
    Ok(())
}

fn invalid(key: &'static str, value: &str, reason: String) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason,
    }
}
