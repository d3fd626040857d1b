//! Azure Key Vault certificate retrieval.
//!
//! A Key Vault certificate is read through its backing secret, which holds
//! either a base64 PKCS#12 archive without password or a PEM bundle.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use graphrelay_oauth::{Authority, Credential, KEY_VAULT_SCOPE, TokenClient};
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info};
use url::Url;

use super::{TlsError, acceptor_from_pem, acceptor_from_pkcs12};

/// Key Vault REST API version.
pub const KEY_VAULT_API_VERSION: &str = "7.4";

const PEM_CONTENT_TYPE: &str = "application/x-pem-file";
const PKCS12_CONTENT_TYPE: &str = "application/x-pkcs12";

/// Secret as returned by `GET {vault}/secrets/{name}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecretBundle {
    value: String,
    #[serde(default)]
    content_type: Option<String>,
}

/// Reads certificate bundles from one vault.
#[derive(Debug, Clone)]
pub struct KeyVault {
    vault_url: Url,
    tokens: TokenClient,
    http_client: Client,
}

impl KeyVault {
    /// Creates a reader for `vault_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn new(vault_url: Url, timeout: Duration) -> Result<Self, TlsError> {
        Ok(Self {
            vault_url,
            tokens: TokenClient::new(timeout)?.with_scope(KEY_VAULT_SCOPE),
            http_client: Client::builder().timeout(timeout).build()?,
        })
    }

    /// Uses another token authority.
    #[must_use]
    pub fn with_authority(mut self, authority: Authority) -> Self {
        self.tokens = self.tokens.with_authority(authority);
        self
    }

    /// URL of the secret holding `cert_name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the vault URL cannot take path segments.
    pub fn secret_url(&self, cert_name: &str) -> Result<Url, TlsError> {
        let mut url = self.vault_url.clone();
        url.path_segments_mut()
            .map_err(|()| TlsError::UnsupportedFormat(format!("vault URL {}", self.vault_url)))?
            .pop_if_empty()
            .extend(["secrets", cert_name]);
        url.query_pairs_mut()
            .append_pair("api-version", KEY_VAULT_API_VERSION);
        Ok(url)
    }

    /// Fetches `cert_name` and builds an acceptor from it.
    ///
    /// # Errors
    ///
    /// Returns [`TlsError`] if authentication or retrieval fails, or the
    /// secret is neither a PKCS#12 archive nor a PEM bundle with a key and
    /// a certificate.
    pub async fn load(
        &self,
        cert_name: &str,
        credential: &Credential,
    ) -> Result<TlsAcceptor, TlsError> {
        let token = self.tokens.get_token(credential).await?;
        let url = self.secret_url(cert_name)?;
        debug!(%url, "fetching certificate from Key Vault");

        let response = self
            .http_client
            .get(url)
            .header(AUTHORIZATION, token.authorization())
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TlsError::VaultRejected {
                status: status.as_u16(),
                body,
            });
        }

        let bundle: SecretBundle =
            serde_json::from_str(&body).map_err(|e| TlsError::VaultRejected {
                status: status.as_u16(),
                body: format!("unreadable secret bundle: {e}"),
            })?;

        let acceptor = match bundle.content_type.as_deref() {
            Some(PEM_CONTENT_TYPE) => acceptor_from_pem(bundle.value.as_bytes(), cert_name)?,
            None if bundle.value.contains("-----BEGIN") => {
                acceptor_from_pem(bundle.value.as_bytes(), cert_name)?
            }
            Some(PKCS12_CONTENT_TYPE) | None => pkcs12(&bundle.value, cert_name)?,
            Some(other) => return Err(TlsError::UnsupportedFormat(other.to_string())),
        };
        info!(vault = %self.vault_url, cert_name, "loaded TLS certificate from Key Vault");
        Ok(acceptor)
    }
}

/// Decodes a certificate exported by Key Vault: base64 PKCS#12, empty password.
fn pkcs12(value: &str, cert_name: &str) -> Result<TlsAcceptor, TlsError> {
    let archive = STANDARD.decode(value.trim()).map_err(|e| TlsError::Pkcs12 {
        origin: cert_name.to_string(),
        reason: format!("invalid base64: {e}"),
    })?;
    acceptor_from_pkcs12(&archive, "", cert_name)
}
