//! Client credential loading and mutual-TLS transport setup tests


use mqtt_getting_started::config::ConnectionSettings;
use mqtt_getting_started::error::SampleError;
use mqtt_getting_started::transport::tls::{Credential, CredentialError, TlsTransport, TransportError};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use test_helpers::write_self_signed;

fn settings_for(dir: &Path, ca_file: Option<&Path>) -> ConnectionSettings {
    ConnectionSettings {
        hostname: "localhost".to_string(),
        tcp_port: 8883,
        client_id: "sample-client".to_string(),
        username: "sample-client".to_string(),
        password: None,
        keep_alive_secs: 30,
        ca_file: ca_file.map(Path::to_path_buf),
        cert_file: dir.join("client.pem"),
        key_file: dir.join("client.key"),
    }
}

#[test]
fn test_valid_pair_loads() {
    let dir = TempDir::new().unwrap();
    let (cert, key) = write_self_signed(dir.path(), "client");

    let credential = Credential::load(&cert, &key).unwrap();

    assert_eq!(credential.chain_len(), 1);
}

#[test]
fn test_chain_file_keeps_intermediates() {
    let dir = TempDir::new().unwrap();
    let (cert, key) = write_self_signed(dir.path(), "client");
    let (intermediate, _) = write_self_signed(dir.path(), "intermediate");

    let chain = dir.path().join("chain.pem");
    let body = fs::read_to_string(&cert).unwrap() + &fs::read_to_string(&intermediate).unwrap();
    fs::write(&chain, body).unwrap();

    let credential = Credential::load(&chain, &key).unwrap();
    assert_eq!(credential.chain_len(), 2);
}

#[test]
fn test_certificate_and_key_in_one_file() {
    let dir = TempDir::new().unwrap();
    let (cert, key) = write_self_signed(dir.path(), "client");

    let combined = dir.path().join("combined.pem");
    let body = fs::read_to_string(&cert).unwrap() + &fs::read_to_string(&key).unwrap();
    fs::write(&combined, body).unwrap();

    assert!(Credential::load(&combined, &combined).is_ok());
}

#[test]
fn test_mismatched_pair_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (cert, _) = write_self_signed(dir.path(), "client");
    let (_, other_key) = write_self_signed(dir.path(), "other");

    let error = Credential::load(&cert, &other_key).unwrap_err();

    assert!(matches!(error, CredentialError::KeyMismatch { .. }));
    assert_eq!(SampleError::from(error).exit_code(), 1);
}

#[test]
fn test_missing_key_file() {
    let dir = TempDir::new().unwrap();
    let (cert, _) = write_self_signed(dir.path(), "client");

    let result = Credential::load(&cert, &dir.path().join("nope.key"));

    assert!(matches!(result, Err(CredentialError::Read { .. })));
}

#[test]
fn test_transport_trusts_extra_ca_bundle() {
    let dir = TempDir::new().unwrap();
    let (cert, key) = write_self_signed(dir.path(), "client");
    let (ca, _) = write_self_signed(dir.path(), "ca");

    let settings = settings_for(dir.path(), Some(&ca));
    let credential = Credential::load(&cert, &key).unwrap();
    let transport = TlsTransport::establish(&settings, credential).unwrap();

    assert_eq!(transport.endpoint(), "localhost:8883");
}

#[test]
fn test_garbage_ca_bundle_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (cert, key) = write_self_signed(dir.path(), "client");
    let ca = dir.path().join("ca.pem");
    fs::write(
        &ca,
        "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n",
    )
    .unwrap();

    let settings = settings_for(dir.path(), Some(&ca));
    let credential = Credential::load(&cert, &key).unwrap();
    let result = TlsTransport::establish(&settings, credential);

    assert!(matches!(
        result,
        Err(TransportError::InvalidCaCertificate { .. }) | Err(TransportError::CaBundle { .. })
    ));
}
