//! Server configuration types.

use std::time::Duration;

use tokio_rustls::TlsAcceptor;

/// Default maximum message size (32 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 32 * 1024 * 1024;

/// Default idle time before a silent client is disconnected.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(300);

/// Connection security mode.
#[derive(Clone, Default)]
pub enum Security {
    /// No encryption offered. **Not recommended for production.**
    #[default]
    None,
    /// Start with plaintext, upgrade with STARTTLS.
    StartTls(TlsAcceptor),
    /// TLS from the first byte.
    Implicit(TlsAcceptor),
}

impl Security {
    /// Returns the TLS acceptor, if TLS is offered.
    #[must_use]
    pub const fn acceptor(&self) -> Option<&TlsAcceptor> {
        match self {
            Self::None => None,
            Self::StartTls(acceptor) | Self::Implicit(acceptor) => Some(acceptor),
        }
    }

    /// Returns true if TLS is offered in any form.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl std::fmt::Debug for Security {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::StartTls(_) => f.write_str("StartTls"),
            Self::Implicit(_) => f.write_str("Implicit"),
        }
    }
}

/// SMTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Hostname announced in the greeting and EHLO reply.
    pub hostname: String,
    /// Text following the hostname in the `220` greeting.
    pub greeting: String,
    /// Refuse everything but EHLO/HELO/STARTTLS/NOOP/QUIT until TLS is up.
    ///
    /// Has no effect when no TLS is offered.
    pub require_tls: bool,
    /// Largest accepted message body in bytes.
    pub max_message_size: usize,
    /// Idle time before a silent client is disconnected.
    pub session_timeout: Duration,
}

impl ServerConfig {
    /// Creates a configuration with defaults for everything but the hostname.
    #[must_use]
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            greeting: "ESMTP".to_string(),
            require_tls: false,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }

    /// Sets the greeting text.
    #[must_use]
    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = greeting.into();
        self
    }

    /// Sets whether TLS is required before other commands.
    #[must_use]
    pub const fn with_require_tls(mut self, require_tls: bool) -> Self {
        self.require_tls = require_tls;
        self
    }

    /// Sets the maximum message size.
    #[must_use]
    pub const fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Sets the session idle timeout.
    #[must_use]
    pub const fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }
}
