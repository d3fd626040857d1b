//! SMTP command parsing.

use secrecy::zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::parser::{parse_path_argument, split_command};
use crate::types::Address;

/// SMTP command received from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// HELO - Simple greeting
    Helo {
        /// Client hostname
        domain: String,
    },
    /// EHLO - Extended greeting
    Ehlo {
        /// Client hostname
        domain: String,
    },
    /// STARTTLS - Upgrade to TLS
    StartTls,
    /// AUTH - Begin authentication
    Auth {
        /// Mechanism keyword, uppercased
        mechanism: String,
        /// Initial response (optional, for SASL-IR). Wiped on drop.
        initial_response: Option<Zeroizing<String>>,
    },
    /// MAIL FROM - Start mail transaction
    MailFrom {
        /// Sender address
        from: Address,
        /// SIZE parameter
        size: Option<usize>,
    },
    /// RCPT TO - Add recipient
    RcptTo {
        /// Recipient address
        to: Address,
    },
    /// DATA - Begin message data
    Data,
    /// RSET - Reset transaction
    Rset,
    /// VRFY - Verify address
    Vrfy {
        /// Address to verify
        address: String,
    },
    /// HELP - Help text
    Help,
    /// NOOP - No operation
    Noop,
    /// QUIT - Close connection
    Quit,
}

impl Command {
    /// Parses a command line (without the trailing CRLF).
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCommand`] for unknown verbs and
    /// [`Error::Parameter`] / [`Error::InvalidAddress`] for bad arguments.
    pub fn parse(line: &str) -> Result<Self> {
        let (verb, args) = split_command(line)?;

        let cmd = match verb.as_str() {
            "HELO" => Self::Helo {
                domain: required(args, "HELO hostname")?,
            },
            "EHLO" => Self::Ehlo {
                domain: required(args, "EHLO hostname")?,
            },
            "STARTTLS" => {
                no_arguments(args, "STARTTLS")?;
                Self::StartTls
            }
            "AUTH" => {
                let mut parts = args.split_whitespace();
                let mechanism = parts
                    .next()
                    .ok_or_else(|| Error::Parameter("AUTH <mechanism>".into()))?
                    .to_ascii_uppercase();
                let initial_response = parts.next().map(|r| Zeroizing::new(r.to_string()));
                if parts.next().is_some() {
                    return Err(Error::Parameter("AUTH <mechanism> [initial-response]".into()));
                }
                Self::Auth {
                    mechanism,
                    initial_response,
                }
            }
            "MAIL" => {
                let (from, params) = parse_path_argument(args, "FROM")?;
                let size = params
                    .iter()
                    .find(|p| p.keyword == "SIZE")
                    .map(|p| {
                        p.value
                            .as_deref()
                            .and_then(|v| v.parse::<usize>().ok())
                            .ok_or_else(|| Error::Parameter("SIZE=<number>".into()))
                    })
                    .transpose()?;
                Self::MailFrom { from, size }
            }
            "RCPT" => {
                let (to, _) = parse_path_argument(args, "TO")?;
                Self::RcptTo { to }
            }
            "DATA" => {
                no_arguments(args, "DATA")?;
                Self::Data
            }
            "RSET" => {
                no_arguments(args, "RSET")?;
                Self::Rset
            }
            "VRFY" => Self::Vrfy {
                address: required(args, "VRFY <address>")?,
            },
            "HELP" => Self::Help,
            "NOOP" => Self::Noop,
            "QUIT" => Self::Quit,
            _ => return Err(Error::UnknownCommand(verb)),
        };

        Ok(cmd)
    }

    /// Returns the command verb.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Helo { .. } => "HELO",
            Self::Ehlo { .. } => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::Auth { .. } => "AUTH",
            Self::MailFrom { .. } => "MAIL",
            Self::RcptTo { .. } => "RCPT",
            Self::Data => "DATA",
            Self::Rset => "RSET",
            Self::Vrfy { .. } => "VRFY",
            Self::Help => "HELP",
            Self::Noop => "NOOP",
            Self::Quit => "QUIT",
        }
    }

    /// Returns true if the command is accepted on a plaintext connection
    /// while TLS is required.
    #[must_use]
    pub const fn allowed_before_tls(&self) -> bool {
        matches!(
            self,
            Self::Helo { .. } | Self::Ehlo { .. } | Self::StartTls | Self::Noop | Self::Quit
        )
    }
}

fn required(args: &str, usage: &str) -> Result<String> {
    if args.is_empty() {
        return Err(Error::Parameter(usage.to_string()));
    }
    Ok(args.to_string())
}

fn no_arguments(args: &str, verb: &str) -> Result<()> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(Error::Parameter(format!("{verb} takes no arguments")))
    }
}
