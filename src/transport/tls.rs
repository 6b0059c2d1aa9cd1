//! Mutual-TLS credentials and transport setup
//!
//! [`Credential`] loads the client certificate chain and private key from PEM
//! files. [`TlsTransport`] combines it with a trust store into the rustls
//! client configuration the MQTT event loop dials with.

use crate::config::ConnectionSettings;
use rumqttc::tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rumqttc::tokio_rustls::rustls::{self, ClientConfig, RootCertStore};
use rumqttc::{TlsConfiguration, Transport};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Client credential loading errors
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("No PEM certificate found in {}", .0.display())]
    NoCertificate(PathBuf),
    #[error("No PEM private key found in {}", .0.display())]
    NoPrivateKey(PathBuf),
    #[error("Invalid certificate in {}: {message}", path.display())]
    InvalidCertificate { path: PathBuf, message: String },
    #[error("Private key {} does not match certificate {}", key.display(), cert.display())]
    KeyMismatch { cert: PathBuf, key: PathBuf },
    #[error("TLS stack rejected the client credential: {0}")]
    Rejected(#[source] rustls::Error),
}

/// Secure transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("Failed to read CA bundle {}: {source}", path.display())]
    CaBundle {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid CA certificate in {}: {source}", path.display())]
    InvalidCaCertificate {
        path: PathBuf,
        #[source]
        source: rustls::Error,
    },
    #[error("No trusted root certificates available")]
    EmptyTrustStore,
    #[error("Connection to {endpoint} failed: {source}")]
    Io {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
    #[error("TLS handshake with {endpoint} failed: {message}")]
    Handshake { endpoint: String, message: String },
    #[error("Timed out after {after:?} waiting for CONNACK from {endpoint}")]
    Timeout { endpoint: String, after: Duration },
}

/// Client certificate chain and private key used for mutual TLS
#[derive(Debug)]
pub struct Credential {
    certificates: Vec<CertificateDer<'static>>,
    private_key: PrivateKeyDer<'static>,
}

impl Credential {
    /// Load a certificate/key pair from PEM files.
    ///
    /// The first certificate in `cert_path` is the leaf; any following ones
    /// are sent as the chain.
    pub fn load(cert_path: &Path, key_path: &Path) -> Result<Self, CredentialError> {
        let certificates = read_certificates(cert_path)?;
        if certificates.is_empty() {
            return Err(CredentialError::NoCertificate(cert_path.to_path_buf()));
        }

        let private_key = read_private_key(key_path)?
            .ok_or_else(|| CredentialError::NoPrivateKey(key_path.to_path_buf()))?;

        verify_key_matches(&certificates[0], &private_key, cert_path, key_path)?;

        debug!(
            chain_len = certificates.len(),
            cert = %cert_path.display(),
            "Loaded client credential"
        );

        Ok(Self {
            certificates,
            private_key,
        })
    }

    /// Number of certificates in the chain (leaf included)
    pub fn chain_len(&self) -> usize {
        self.certificates.len()
    }
}

fn open(path: &Path) -> Result<BufReader<File>, std::io::Error> {
    File::open(path).map(BufReader::new)
}

fn read_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, CredentialError> {
    let read_error = |source| CredentialError::Read {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = open(path).map_err(read_error)?;
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_error)
}

fn read_private_key(path: &Path) -> Result<Option<PrivateKeyDer<'static>>, CredentialError> {
    let read_error = |source| CredentialError::Read {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = open(path).map_err(read_error)?;
    rustls_pemfile::private_key(&mut reader).map_err(read_error)
}

/// Compare the certificate's public key with the one derived from the private key.
///
/// Only PKCS#8 keys can be checked here; SEC1 and PKCS#1 keys are left to the
/// TLS handshake.
fn verify_key_matches(
    leaf: &CertificateDer<'_>,
    key: &PrivateKeyDer<'_>,
    cert_path: &Path,
    key_path: &Path,
) -> Result<(), CredentialError> {
    let (_, certificate) = x509_parser::parse_x509_certificate(leaf.as_ref()).map_err(|e| {
        CredentialError::InvalidCertificate {
            path: cert_path.to_path_buf(),
            message: e.to_string(),
        }
    })?;

    let PrivateKeyDer::Pkcs8(pkcs8) = key else {
        debug!(key = %key_path.display(), "Key is not PKCS#8, skipping local key/cert match check");
        return Ok(());
    };

    let key_pair = match rcgen::KeyPair::try_from(pkcs8.secret_pkcs8_der()) {
        Ok(key_pair) => key_pair,
        Err(e) => {
            debug!(key = %key_path.display(), "Unsupported key algorithm for local match check: {}", e);
            return Ok(());
        }
    };

    if certificate.public_key().raw != key_pair.public_key_der().as_slice() {
        return Err(CredentialError::KeyMismatch {
            cert: cert_path.to_path_buf(),
            key: key_path.to_path_buf(),
        });
    }

    Ok(())
}

/// TLS client transport for one broker endpoint
#[derive(Clone)]
pub struct TlsTransport {
    endpoint: String,
    config: Arc<ClientConfig>,
}

impl std::fmt::Debug for TlsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsTransport")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl TlsTransport {
    /// Build the mutual-TLS client configuration for the broker in `settings`.
    ///
    /// The platform trust store is used, extended with `ca_file` when set.
    /// The TCP and TLS handshake happen later, when the session connects.
    pub fn establish(
        settings: &ConnectionSettings,
        credential: Credential,
    ) -> Result<Self, TransportError> {
        let roots = build_root_store(settings.ca_file.as_deref())?;

        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_client_auth_cert(credential.certificates, credential.private_key)
            .map_err(CredentialError::Rejected)?;

        let endpoint = settings.endpoint();
        info!(endpoint = %endpoint, "Mutual TLS transport ready");

        Ok(Self {
            endpoint,
            config: Arc::new(config),
        })
    }

    /// Broker address in `host:port` form
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Convert into the MQTT client's transport setting
    pub fn into_transport(self) -> Transport {
        Transport::tls_with_config(TlsConfiguration::Rustls(self.config))
    }
}

fn build_root_store(ca_file: Option<&Path>) -> Result<RootCertStore, TransportError> {
    let mut roots = RootCertStore::empty();

    match rustls_native_certs::load_native_certs() {
        Ok(certs) => {
            let (added, ignored) = roots.add_parsable_certificates(certs);
            debug!(added, ignored, "Loaded platform root certificates");
        }
        Err(e) => warn!("Could not load platform root certificates: {}", e),
    }

    if let Some(path) = ca_file {
        let mut reader = open(path).map_err(|source| TransportError::CaBundle {
            path: path.to_path_buf(),
            source,
        })?;
        for cert in rustls_pemfile::certs(&mut reader) {
            let cert = cert.map_err(|source| TransportError::CaBundle {
                path: path.to_path_buf(),
                source,
            })?;
            roots
                .add(cert)
                .map_err(|source| TransportError::InvalidCaCertificate {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
        debug!(ca_file = %path.display(), "Added CA bundle to trust store");
    }

    if roots.is_empty() {
        return Err(TransportError::EmptyTrustStore);
    }

    Ok(roots)
}
