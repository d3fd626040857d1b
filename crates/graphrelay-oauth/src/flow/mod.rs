//! Client-credentials grant (RFC 6749 section 4.4).

use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;
use uuid::Uuid;

use crate::authority::{Authority, GRAPH_SCOPE};
use crate::error::{AuthError, Result};
use crate::token::{Token, TokenResponse};

/// Default timeout for token requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Application identity presented to the token endpoint.
///
/// Lives only as long as one exchange; the secret is zeroized on drop.
#[derive(Debug)]
pub struct Credential {
    /// Directory (tenant) the application is registered in.
    pub tenant_id: Uuid,
    /// Application (client) identifier.
    pub client_id: Uuid,
    /// Client secret.
    pub secret: SecretString,
}

impl Credential {
    /// Creates a credential.
    #[must_use]
    pub const fn new(tenant_id: Uuid, client_id: Uuid, secret: SecretString) -> Self {
        Self {
            tenant_id,
            client_id,
            secret,
        }
    }
}

/// Exchanges client credentials for bearer tokens.
///
/// No caching and no retries: each call is one request.
#[derive(Debug, Clone)]
pub struct TokenClient {
    authority: Authority,
    scope: String,
    http_client: Client,
}

impl TokenClient {
    /// Creates a client for the Microsoft identity platform requesting
    /// the Graph scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            authority: Authority::microsoft()?,
            scope: GRAPH_SCOPE.to_string(),
            http_client,
        })
    }

    /// Sets the token authority.
    #[must_use]
    pub fn with_authority(mut self, authority: Authority) -> Self {
        self.authority = authority;
        self
    }

    /// Sets the requested scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Returns the requested scope.
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Requests a token for `credential`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Upstream`] if the endpoint cannot be reached
    /// - [`AuthError::Rejected`] on a non-2xx status
    /// - [`AuthError::MalformedResponse`] if a 2xx body has no `access_token`
    pub async fn get_token(&self, credential: &Credential) -> Result<Token> {
        let url = self.authority.token_url(&credential.tenant_id)?;
        let client_id = credential.client_id.to_string();
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id.as_str()),
            ("client_secret", credential.secret.expose_secret()),
            ("scope", self.scope.as_str()),
        ];

        debug!(
            tenant_id = %credential.tenant_id,
            client_id = %credential.client_id,
            scope = %self.scope,
            "requesting client-credentials token"
        );

        let response = self.http_client.post(url).form(&params).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let token_response: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;
        if token_response.access_token.is_empty() {
            return Err(AuthError::MalformedResponse("empty access_token".into()));
        }

        Ok(Token::from_response(token_response))
    }
}
