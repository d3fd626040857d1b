//! SASL response decoding.
//!
//! Implements the server side of:
//! - PLAIN (RFC 4616) - `authzid NUL authcid NUL passwd`, base64 encoded
//! - LOGIN (draft-murchison-sasl-login) - username and password in two
//!   separate base64 responses

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::SecretString;
use secrecy::zeroize::Zeroize;

/// `334` challenge asking for the LOGIN username (`Username:`).
pub const LOGIN_USERNAME_CHALLENGE: &str = "VXNlcm5hbWU6";

/// `334` challenge asking for the LOGIN password (`Password:`).
pub const LOGIN_PASSWORD_CHALLENGE: &str = "UGFzc3dvcmQ6";

/// Failure while reading a SASL exchange.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SaslError {
    /// Client cancelled with `*`.
    #[error("Authentication aborted")]
    Aborted,

    /// Response was not valid base64.
    #[error("Cannot decode response")]
    InvalidBase64,

    /// Login or password absent or empty.
    #[error("Authentication credentials missing")]
    MissingCredentials,

    /// Login or password not valid UTF-8.
    #[error("Credentials must be UTF-8")]
    InvalidEncoding,
}

/// Login and password decoded from an AUTH exchange.
///
/// The password is redacted from `Debug` output and zeroized on drop.
#[derive(Debug)]
pub struct LoginData {
    /// Authentication identity.
    pub login: String,
    /// Password.
    pub password: SecretString,
}

/// Decodes one base64 client response.
///
/// `*` cancels the exchange and `=` stands for an empty response.
///
/// # Errors
///
/// Returns [`SaslError::Aborted`] or [`SaslError::InvalidBase64`].
pub fn decode_response(response: &str) -> Result<Vec<u8>, SaslError> {
    match response.trim() {
        "*" => Err(SaslError::Aborted),
        "=" => Ok(Vec::new()),
        encoded => STANDARD
            .decode(encoded)
            .map_err(|_| SaslError::InvalidBase64),
    }
}

/// Splits a decoded PLAIN message into login and password.
///
/// The authorization identity is ignored.
///
/// # Errors
///
/// Returns an error if either field is missing, empty or not UTF-8.
pub fn parse_plain(decoded: &[u8]) -> Result<LoginData, SaslError> {
    let mut parts = decoded.splitn(3, |&b| b == 0);
    let _authzid = parts.next();
    let login = parts.next().unwrap_or_default();
    let password = parts.next().unwrap_or_default();
    login_data(login, password)
}

/// Builds [`LoginData`] from raw login and password bytes.
///
/// # Errors
///
/// Returns an error if either field is empty or not UTF-8.
pub fn login_data(login: &[u8], password: &[u8]) -> Result<LoginData, SaslError> {
    if login.is_empty() || password.is_empty() {
        return Err(SaslError::MissingCredentials);
    }

    let login = std::str::from_utf8(login)
        .map_err(|_| SaslError::InvalidEncoding)?
        .to_string();
    let password = String::from_utf8(password.to_vec()).map_err(|e| {
        e.into_bytes().zeroize();
        SaslError::InvalidEncoding
    })?;

    Ok(LoginData {
        login,
        password: SecretString::from(password),
    })
}
