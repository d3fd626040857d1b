//! Email address types.

use crate::error::{Error, Result};

/// Email address from an SMTP envelope path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Creates a new address from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        Self::validate(&addr)?;
        Ok(Self(addr))
    }

    /// Parses a reverse-path or forward-path such as `<user@example.com>`.
    ///
    /// Angle brackets are optional; a source route (`<@a,@b:user@c>`) is
    /// discarded as RFC 5321 permits.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is empty, null (`<>`) or invalid.
    pub fn from_path(path: &str) -> Result<Self> {
        let path = path.trim();
        let malformed = || Error::InvalidAddress(format!("Malformed path: {path}"));
        let inner = match path.strip_prefix('<') {
            Some(rest) => rest.strip_suffix('>').ok_or_else(malformed)?,
            None if path.ends_with('>') => return Err(malformed()),
            None => path,
        };

        let inner = match inner.split_once(':') {
            Some((route, mailbox)) if route.starts_with('@') => mailbox,
            _ => inner,
        };

        if inner.is_empty() {
            return Err(Error::InvalidAddress("Null path not permitted".into()));
        }

        Self::new(inner)
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates an email address (basic validation).
    fn validate(addr: &str) -> Result<()> {
        if addr.is_empty() {
            return Err(Error::InvalidAddress("Address cannot be empty".into()));
        }

        if addr.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(Error::InvalidAddress(
                "Address cannot contain whitespace".into(),
            ));
        }

        let Some((local, domain)) = addr.rsplit_once('@') else {
            return Err(Error::InvalidAddress("Address must contain @".into()));
        };

        if local.is_empty() || domain.is_empty() {
            return Err(Error::InvalidAddress(
                "Local and domain parts cannot be empty".into(),
            ));
        }

        Ok(())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
