//! Microsoft Graph `sendMail` forwarding.
//!
//! The raw MIME message goes out base64-encoded as `text/plain`, which is
//! what Graph expects for MIME submission. Nothing is parsed or rebuilt.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use graphrelay_oauth::Token;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

/// Graph v1.0 endpoint root.
pub const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0/";

/// Errors that can occur while forwarding a message.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// Transport failure: connection refused, TLS, timeout.
    #[error("send endpoint unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    /// Graph answered with something other than 202 Accepted.
    #[error("send rejected with HTTP {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The endpoint URL could not be built.
    #[error("invalid send URL: {0}")]
    InvalidUrl(String),
}

/// Posts raw messages to `/users/{sender}/sendMail`.
#[derive(Debug, Clone)]
pub struct GraphMailer {
    base_url: Url,
    http_client: Client,
}

impl GraphMailer {
    /// Creates a mailer for the public Graph endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, SendError> {
        let http_client = Client::builder().timeout(timeout).build()?;
        let base_url =
            Url::parse(GRAPH_BASE_URL).map_err(|e| SendError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            base_url,
            http_client,
        })
    }

    /// Points the mailer at another Graph root (national clouds, tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Builds `{base}/users/{sender}/sendMail`, escaping the sender as one
    /// path segment.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL cannot take path segments.
    pub fn send_url(&self, sender: &str) -> Result<Url, SendError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| SendError::InvalidUrl(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(["users", sender, "sendMail"]);
        Ok(url)
    }

    /// Submits `raw` on behalf of `sender`. Only `202 Accepted` is success.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] on transport failure or any other status.
    pub async fn send(&self, token: &Token, sender: &str, raw: &[u8]) -> Result<(), SendError> {
        let url = self.send_url(sender)?;
        debug!(%url, size = raw.len(), "posting message to Graph");

        let response = self
            .http_client
            .post(url)
            .header(AUTHORIZATION, token.authorization())
            .header(CONTENT_TYPE, "text/plain")
            .body(STANDARD.encode(raw))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::ACCEPTED {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(SendError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
