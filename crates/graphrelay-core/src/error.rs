//! Error types for the core library.

use thiserror::Error;

use crate::config::ConfigError;
use crate::service::SendError;
use crate::tls::TlsError;

/// Errors that can occur while setting the relay up.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// TLS context could not be built.
    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    /// Graph client could not be built.
    #[error("Send error: {0}")]
    Send(#[from] SendError),

    /// Token client could not be built.
    #[error("Auth error: {0}")]
    Auth(#[from] graphrelay_oauth::AuthError),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
