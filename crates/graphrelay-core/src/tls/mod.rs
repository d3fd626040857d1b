//! Server TLS context loading.
//!
//! Certificates come either from PEM files on disk or from an Azure Key
//! Vault secret holding a PKCS#12 archive or a PEM bundle. All end up as a
//! [`TlsAcceptor`].

mod keyvault;

use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use graphrelay_oauth::{AuthError, Credential};
use p12_keystore::KeyStore;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio_rustls::TlsAcceptor;
use tracing::info;
use url::Url;

pub use keyvault::{KEY_VAULT_API_VERSION, KeyVault};

/// Errors that can occur while building the TLS context.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    /// A certificate or key file could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// PEM data is malformed.
    #[error("invalid PEM in {origin}: {source}")]
    Pem {
        /// File path or secret name.
        origin: String,
        /// Underlying error.
        source: io::Error,
    },

    /// PKCS#12 archive could not be opened.
    #[error("invalid PKCS#12 data in {origin}: {reason}")]
    Pkcs12 {
        /// Secret name.
        origin: String,
        /// Decoder message.
        reason: String,
    },

    /// No certificate in the PEM data.
    #[error("no certificate found in {0}")]
    NoCertificate(String),

    /// No private key in the PEM data.
    #[error("no private key found in {0}")]
    NoPrivateKey(String),

    /// rustls refused the certificate/key pair.
    #[error("TLS configuration rejected: {0}")]
    Rustls(#[from] rustls::Error),

    /// Key Vault token exchange failed.
    #[error("Key Vault authentication failed: {0}")]
    VaultAuth(#[from] AuthError),

    /// Key Vault could not be reached.
    #[error("Key Vault request failed: {0}")]
    VaultTransport(#[from] reqwest::Error),

    /// Key Vault answered with an error status or an unreadable body.
    #[error("Key Vault returned {status}: {body}")]
    VaultRejected {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The secret is neither PKCS#12 nor PEM.
    #[error("unsupported certificate format {0}; store the certificate as PKCS#12 or PEM")]
    UnsupportedFormat(String),
}

/// Where the server certificate comes from.
#[derive(Debug)]
pub enum TlsSource {
    /// PEM files on disk.
    File {
        /// Certificate chain, leaf first.
        cert: PathBuf,
        /// Private key (PKCS#8, PKCS#1 or SEC1).
        key: PathBuf,
    },
    /// Key Vault certificate, read through its backing secret.
    KeyVault {
        /// Vault URL, e.g. `https://my-vault.vault.azure.net`.
        vault_url: Url,
        /// Secret (certificate) name.
        cert_name: String,
        /// Application identity used to read the vault.
        credential: Credential,
    },
}

impl TlsSource {
    /// Loads the certificate and builds the acceptor.
    ///
    /// # Errors
    ///
    /// Returns [`TlsError`] if the material cannot be fetched or parsed.
    pub async fn load(&self, http_timeout: Duration) -> Result<TlsAcceptor, TlsError> {
        match self {
            Self::File { cert, key } => load_files(cert, key),
            Self::KeyVault {
                vault_url,
                cert_name,
                credential,
            } => {
                KeyVault::new(vault_url.clone(), http_timeout)?
                    .load(cert_name, credential)
                    .await
            }
        }
    }
}

/// Builds an acceptor from PEM certificate and key files.
///
/// # Errors
///
/// Returns [`TlsError`] if a file is unreadable or holds no usable material.
pub fn load_files(cert: &Path, key: &Path) -> Result<TlsAcceptor, TlsError> {
    let read = |path: &Path| {
        std::fs::read(path).map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })
    };
    let cert_pem = read(cert)?;
    let key_pem = read(key)?;

    let certs = parse_certs(&cert_pem, &cert.display().to_string())?;
    let key = parse_key(&key_pem, &key.display().to_string())?;
    info!(cert = %cert.display(), chain = certs.len(), "loaded TLS certificate from file");
    acceptor(certs, key)
}

/// Builds an acceptor from a single PEM bundle holding key and chain.
///
/// # Errors
///
/// Returns [`TlsError`] if the bundle holds no usable material.
pub fn acceptor_from_pem(bundle: &[u8], origin: &str) -> Result<TlsAcceptor, TlsError> {
    let certs = parse_certs(bundle, origin)?;
    let key = parse_key(bundle, origin)?;
    acceptor(certs, key)
}

/// Builds an acceptor from a PKCS#12 archive holding a key and its chain.
///
/// # Errors
///
/// Returns [`TlsError`] if the archive cannot be decrypted or holds no key.
pub fn acceptor_from_pkcs12(
    archive: &[u8],
    password: &str,
    origin: &str,
) -> Result<TlsAcceptor, TlsError> {
    let keystore = KeyStore::from_pkcs12(archive, password).map_err(|e| TlsError::Pkcs12 {
        origin: origin.to_string(),
        reason: e.to_string(),
    })?;
    let (_, chain) = keystore
        .private_key_chain()
        .ok_or_else(|| TlsError::NoPrivateKey(origin.to_string()))?;

    let certs: Vec<CertificateDer<'static>> = chain
        .chain()
        .iter()
        .map(|cert| CertificateDer::from(cert.as_der().to_vec()))
        .collect();
    if certs.is_empty() {
        return Err(TlsError::NoCertificate(origin.to_string()));
    }
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(chain.key().to_vec()));
    acceptor(certs, key)
}

fn parse_certs(pem: &[u8], origin: &str) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(pem))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Pem {
            origin: origin.to_string(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificate(origin.to_string()));
    }
    Ok(certs)
}

fn parse_key(pem: &[u8], origin: &str) -> Result<PrivateKeyDer<'static>, TlsError> {
    rustls_pemfile::private_key(&mut BufReader::new(pem))
        .map_err(|source| TlsError::Pem {
            origin: origin.to_string(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(origin.to_string()))
}

fn acceptor(
    certs: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<TlsAcceptor, TlsError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}
