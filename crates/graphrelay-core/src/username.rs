//! SMTP login to (tenant, client) identifier decoding.
//!
//! A login has the form `<tenant><delimiter><client>[.<ignored suffix>]`, where
//! each identifier is either a canonical UUID (`8-4-4-4-12` hex groups) or
//! the base64url encoding of its 16 raw bytes, padded or not. The short form
//! fits logins into clients with tight username limits.

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use uuid::Uuid;

/// Delimiters accepted between the two identifiers.
pub const DELIMITERS: [&str; 3] = ["@", ":", "|"];

/// Default delimiter.
pub const DEFAULT_DELIMITER: &str = "@";

const BASE64URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Login could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsernameError {
    /// Login does not have the expected shape. The message is safe to show
    /// to the client.
    #[error("Invalid username format: {0}")]
    InvalidFormat(String),
}

/// Decodes a login into `(tenant_id, client_id)`.
///
/// Anything from the first `.` on is dropped before splitting.
///
/// # Errors
///
/// Returns [`UsernameError::InvalidFormat`] if the delimiter does not occur
/// exactly once or either segment is neither a canonical UUID nor base64url
/// for exactly 16 bytes.
pub fn parse_username(raw: &str, delimiter: &str) -> Result<(Uuid, Uuid), UsernameError> {
    if delimiter.is_empty() {
        return Err(UsernameError::InvalidFormat("empty delimiter".into()));
    }

    let login = raw.split_once('.').map_or(raw, |(head, _)| head);
    if login.matches(delimiter).count() != 1 {
        return Err(UsernameError::InvalidFormat(format!(
            "expected <tenant>{delimiter}<client>"
        )));
    }

    let (tenant, client) = login.split_once(delimiter).ok_or_else(|| {
        UsernameError::InvalidFormat(format!("expected <tenant>{delimiter}<client>"))
    })?;

    Ok((decode_segment(tenant, "tenant")?, decode_segment(client, "client")?))
}

/// Encodes an identifier in the short base64url form (no padding).
#[must_use]
pub fn encode_short(id: &Uuid) -> String {
    BASE64URL.encode(id.as_bytes())
}

fn decode_segment(segment: &str, what: &str) -> Result<Uuid, UsernameError> {
    if is_canonical_uuid(segment) {
        return Uuid::parse_str(segment)
            .map_err(|_| UsernameError::InvalidFormat(format!("{what} id is not a valid UUID")));
    }

    let bytes = BASE64URL.decode(segment).map_err(|_| {
        UsernameError::InvalidFormat(format!(
            "{what} id is neither a UUID nor base64url-encoded"
        ))
    })?;

    Uuid::from_slice(&bytes).map_err(|_| {
        UsernameError::InvalidFormat(format!(
            "{what} id decodes to {} bytes, expected 16",
            bytes.len()
        ))
    })
}

fn is_canonical_uuid(s: &str) -> bool {
    s.len() == 36
        && s.bytes().enumerate().all(|(i, b)| match i {
            8 | 13 | 18 | 23 => b == b'-',
            _ => b.is_ascii_hexdigit(),
        })
}
