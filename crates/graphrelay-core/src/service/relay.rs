//! The [`Relay`] backend: SMTP logins become client-credential grants and
//! messages go to Graph with the resulting token.

use graphrelay_oauth::{Authority, Credential, Token, TokenClient};
use graphrelay_smtp::{AuthFailure, DeliveryFailure, Envelope, Relay};
use secrecy::SecretString;
use tracing::{info, warn};
use url::Url;

use super::graph::GraphMailer;
use crate::config::Config;
use crate::error::Result;
use crate::username::parse_username;

/// Relays authenticated SMTP sessions to Microsoft Graph.
#[derive(Debug, Clone)]
pub struct GraphRelay {
    tokens: TokenClient,
    mailer: GraphMailer,
    delimiter: String,
}

impl GraphRelay {
    /// Creates a relay from its parts.
    #[must_use]
    pub fn new(tokens: TokenClient, mailer: GraphMailer, delimiter: impl Into<String>) -> Self {
        Self {
            tokens,
            mailer,
            delimiter: delimiter.into(),
        }
    }

    /// Creates a relay against the public Microsoft endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            TokenClient::new(config.http_timeout)?,
            GraphMailer::new(config.http_timeout)?,
            config.username_delimiter.clone(),
        ))
    }

    /// Uses another token authority.
    #[must_use]
    pub fn with_authority(mut self, authority: Authority) -> Self {
        self.tokens = self.tokens.with_authority(authority);
        self
    }

    /// Uses another Graph root.
    #[must_use]
    pub fn with_graph_url(mut self, base_url: Url) -> Self {
        self.mailer = self.mailer.with_base_url(base_url);
        self
    }
}

impl Relay for GraphRelay {
    type Token = Token;

    async fn authenticate(
        &self,
        login: &str,
        password: SecretString,
    ) -> std::result::Result<Token, AuthFailure> {
        let (tenant_id, client_id) = parse_username(login, &self.delimiter).map_err(|e| {
            warn!(error = %e, "rejecting malformed login");
            AuthFailure::InvalidCredentials(e.to_string())
        })?;

        let credential = Credential::new(tenant_id, client_id, password);
        match self.tokens.get_token(&credential).await {
            Ok(token) => {
                info!(%tenant_id, %client_id, "authenticated");
                Ok(token)
            }
            Err(e) => {
                warn!(%tenant_id, %client_id, error = %e, "token exchange failed");
                Err(AuthFailure::Rejected)
            }
        }
    }

    async fn deliver(
        &self,
        token: &Token,
        envelope: Envelope,
    ) -> std::result::Result<(), DeliveryFailure> {
        if token.is_expired() {
            warn!("session token has expired; Graph will likely reject the message");
        }

        let sender = envelope.sender().as_str();
        match self.mailer.send(token, sender, envelope.body()).await {
            Ok(()) => {
                info!(
                    sender,
                    recipients = envelope.recipients().len(),
                    size = envelope.body().len(),
                    "message accepted by Graph"
                );
                Ok(())
            }
            Err(e) => {
                warn!(sender, error = %e, "Graph send failed");
                Err(DeliveryFailure::new(e.to_string()))
            }
        }
    }
}
