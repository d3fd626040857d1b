//! Seam between the protocol engine and whatever accepts the mail.

use std::future::Future;

use secrecy::SecretString;

use crate::types::Envelope;

/// Backend that authenticates sessions and accepts finished transactions.
///
/// One value is shared by every connection; each call is independent.
pub trait Relay: Send + Sync + 'static {
    /// Credential attached to a session after successful AUTH and presented
    /// again for every delivery in that session.
    type Token: Clone + Send + Sync + 'static;

    /// Verifies an AUTH login and password, producing the session token.
    fn authenticate(
        &self,
        login: &str,
        password: SecretString,
    ) -> impl Future<Output = Result<Self::Token, AuthFailure>> + Send;

    /// Hands over a completed transaction. Called exactly once per DATA.
    fn deliver(
        &self,
        token: &Self::Token,
        envelope: Envelope,
    ) -> impl Future<Output = Result<(), DeliveryFailure>> + Send;
}

/// Reason an AUTH attempt was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    /// Login is malformed; the detail is shown to the client.
    #[error("{0}")]
    InvalidCredentials(String),

    /// Credentials were not accepted upstream; the client sees no detail.
    #[error("Authentication failed")]
    Rejected,
}

/// Reason a transaction could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct DeliveryFailure {
    reason: String,
}

impl DeliveryFailure {
    /// Creates a delivery failure with a server-side diagnostic.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Returns the diagnostic text.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}
