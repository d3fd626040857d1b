//! SMTP command-line parser.

use crate::error::{Error, Result};
use crate::types::Address;

/// ESMTP parameter from a `MAIL FROM` or `RCPT TO` line (e.g. `SIZE=1024`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Keyword, uppercased.
    pub keyword: String,
    /// Value after `=`, if any.
    pub value: Option<String>,
}

/// Splits a command line into its uppercased verb and the remaining arguments.
///
/// # Errors
///
/// Returns an error if the line is blank.
pub fn split_command(line: &str) -> Result<(String, &str)> {
    let line = line.trim();
    if line.is_empty() {
        return Err(Error::Syntax("Empty command".into()));
    }

    let (verb, args) = line
        .split_once(|c: char| c.is_ascii_whitespace())
        .unwrap_or((line, ""));
    Ok((verb.to_ascii_uppercase(), args.trim()))
}

/// Parses the argument of `MAIL` / `RCPT` (`FROM:<addr> [params]`).
///
/// `keyword` is `FROM` or `TO`, matched case-insensitively. Whitespace
/// between the colon and the path is tolerated.
///
/// # Errors
///
/// Returns an error if the keyword is missing or the path is invalid.
pub fn parse_path_argument(args: &str, keyword: &str) -> Result<(Address, Vec<Parameter>)> {
    let bytes = args.as_bytes();
    let has_prefix = bytes.len() > keyword.len()
        && bytes[..keyword.len()].eq_ignore_ascii_case(keyword.as_bytes())
        && bytes[keyword.len()] == b':';
    if !has_prefix {
        return Err(Error::Parameter(format!("Expected {keyword}:<address>")));
    }

    let rest = args[keyword.len() + 1..].trim_start();
    let (path, params) = if rest.starts_with('<') {
        let end = rest
            .find('>')
            .ok_or_else(|| Error::InvalidAddress(format!("Malformed path: {rest}")))?;
        rest.split_at(end + 1)
    } else {
        rest.split_once(char::is_whitespace).unwrap_or((rest, ""))
    };

    let address = Address::from_path(path)?;
    Ok((address, parse_parameters(params)))
}

/// Parses space-separated ESMTP parameters.
#[must_use]
pub fn parse_parameters(params: &str) -> Vec<Parameter> {
    params
        .split_whitespace()
        .map(|param| match param.split_once('=') {
            Some((keyword, value)) => Parameter {
                keyword: keyword.to_ascii_uppercase(),
                value: Some(value.to_string()),
            },
            None => Parameter {
                keyword: param.to_ascii_uppercase(),
                value: None,
            },
        })
        .collect()
}

/// Removes DATA transparency stuffing (RFC 5321 section 4.5.2).
///
/// A leading `.` on a body line was doubled by the client.
#[must_use]
pub fn unstuff(line: &[u8]) -> &[u8] {
    match line {
        [b'.', rest @ ..] => rest,
        _ => line,
    }
}

/// Returns true if a body line is the end-of-data marker.
#[must_use]
pub fn is_data_terminator(line: &[u8]) -> bool {
    line == b"."
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::needless_collect, clippy::unreadable_literal, clippy::used_underscore_items, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn test_split_command() {
        let (verb, args) = split_command("ehlo client.example.com\r\n").unwrap();
        assert_eq!(verb, "EHLO");
        assert_eq!(args, "client.example.com");

        let (verb, args) = split_command("QUIT").unwrap();
        assert_eq!(verb, "QUIT");
        assert_eq!(args, "");
    }

    #[test]
    fn test_split_command_blank() {
        assert!(split_command("   ").is_err());
    }

    #[test]
    fn test_parse_mail_from() {
        let (addr, params) = parse_path_argument("FROM:<a@b.com>", "FROM").unwrap();
        assert_eq!(addr.as_str(), "a@b.com");
        assert!(params.is_empty());
    }

    #[test]
    fn test_parse_mail_from_lowercase_and_space() {
        let (addr, _) = parse_path_argument("from: <a@b.com>", "FROM").unwrap();
        assert_eq!(addr.as_str(), "a@b.com");
    }

    #[test]
    fn test_parse_mail_from_with_params() {
        let (addr, params) =
            parse_path_argument("FROM:<a@b.com> SIZE=12345 body=8bitmime", "FROM").unwrap();
        assert_eq!(addr.as_str(), "a@b.com");
        assert_eq!(
            params,
            vec![
                Parameter {
                    keyword: "SIZE".into(),
                    value: Some("12345".into()),
                },
                Parameter {
                    keyword: "BODY".into(),
                    value: Some("8bitmime".into()),
                },
            ]
        );
    }

    #[test]
    fn test_parse_rcpt_without_brackets() {
        let (addr, _) = parse_path_argument("TO:c@d.com", "TO").unwrap();
        assert_eq!(addr.as_str(), "c@d.com");
    }

    #[test]
    fn test_parse_path_missing_keyword() {
        assert!(matches!(
            parse_path_argument("<a@b.com>", "FROM"),
            Err(Error::Parameter(_))
        ));
        assert!(parse_path_argument("TO:<c@d.com>", "FROM").is_err());
    }

    #[test]
    fn test_parse_null_sender_rejected() {
        assert!(matches!(
            parse_path_argument("FROM:<>", "FROM"),
            Err(Error::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_unstuff() {
        assert_eq!(unstuff(b"..leading dot"), b".leading dot");
        assert_eq!(unstuff(b"plain"), b"plain");
        assert_eq!(unstuff(b""), b"");
    }

    #[test]
    fn test_data_terminator() {
        assert!(is_data_terminator(b"."));
        assert!(!is_data_terminator(b".."));
        assert!(!is_data_terminator(b""));
    }
}
