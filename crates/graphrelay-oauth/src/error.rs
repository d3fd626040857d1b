//! Error types for token exchange.

/// Result type alias for token exchange operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Token exchange failure.
///
/// None of the variants carry the client secret.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Transport failure: connection refused, TLS, timeout.
    #[error("token endpoint unreachable: {0}")]
    Upstream(#[from] reqwest::Error),

    /// Token endpoint answered with a non-success status.
    #[error("token request rejected with HTTP {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// Success status, but no usable token in the body.
    #[error("malformed token response: {0}")]
    MalformedResponse(String),

    /// Authority URL is unusable.
    #[error("invalid authority: {0}")]
    InvalidAuthority(String),
}

impl From<url::ParseError> for AuthError {
    fn from(e: url::ParseError) -> Self {
        Self::InvalidAuthority(e.to_string())
    }
}

impl AuthError {
    /// Returns the upstream HTTP status, if the endpoint answered.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}
