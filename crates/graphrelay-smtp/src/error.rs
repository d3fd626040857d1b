//! Error types for SMTP server operations.

use std::io;

use crate::types::{Reply, ReplyCode};

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS handshake with the client failed.
    #[error("TLS handshake failed: {0}")]
    Handshake(io::Error),

    /// Command line could not be parsed at all.
    #[error("Syntax error: {0}")]
    Syntax(String),

    /// Command verb is not known to this server.
    #[error("Command not recognized: {0}")]
    UnknownCommand(String),

    /// Command arguments are malformed.
    #[error("Syntax error in parameters: {0}")]
    Parameter(String),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Line exceeded the permitted length.
    #[error("Line too long (limit {0} bytes)")]
    LineTooLong(usize),

    /// Client stayed silent for longer than the session timeout.
    #[error("Session timed out")]
    Timeout,

    /// Invalid state for operation.
    #[error("Invalid state for operation: {0}")]
    InvalidState(String),
}

impl Error {
    /// Converts a protocol error into the reply sent to the client.
    ///
    /// Returns `None` for errors that end the connection instead.
    #[must_use]
    pub fn reply(&self) -> Option<Reply> {
        let reply = match self {
            Self::Syntax(_) | Self::UnknownCommand(_) => {
                Reply::line(ReplyCode::SYNTAX_ERROR, "Command not recognized")
            }
            Self::Parameter(msg) => {
                Reply::line(ReplyCode::PARAMETER_ERROR, format!("Syntax error: {msg}"))
            }
            Self::InvalidAddress(msg) => Reply::line(ReplyCode::PARAMETER_ERROR, msg.clone()),
            Self::LineTooLong(_) => Reply::line(ReplyCode::SYNTAX_ERROR, "Line too long"),
            Self::InvalidState(msg) => Reply::line(ReplyCode::BAD_SEQUENCE, msg.clone()),
            Self::Io(_) | Self::Handshake(_) | Self::Timeout => return None,
        };
        Some(reply)
    }
}
