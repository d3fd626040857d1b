//! SMTP extension types.

/// SMTP extensions advertised in the EHLO response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Extension {
    /// STARTTLS - TLS upgrade
    StartTls,
    /// AUTH - Authentication
    Auth(Vec<AuthMechanism>),
    /// SIZE - Maximum message size
    Size(usize),
    /// 8BITMIME - 8-bit MIME transport
    EightBitMime,
    /// HELP - Help command
    Help,
}

impl std::fmt::Display for Extension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StartTls => f.write_str("STARTTLS"),
            Self::Auth(mechanisms) => {
                f.write_str("AUTH")?;
                for mechanism in mechanisms {
                    write!(f, " {}", mechanism.as_str())?;
                }
                Ok(())
            }
            Self::Size(max) => write!(f, "SIZE {max}"),
            Self::EightBitMime => f.write_str("8BITMIME"),
            Self::Help => f.write_str("HELP"),
        }
    }
}

/// SASL authentication mechanism accepted by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// PLAIN - plaintext authentication
    Plain,
    /// LOGIN - legacy plaintext
    Login,
}

impl AuthMechanism {
    /// Every mechanism this server supports, in advertisement order.
    pub const ALL: [Self; 2] = [Self::Plain, Self::Login];

    /// Parses an authentication mechanism name.
    ///
    /// The keyword is matched case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "LOGIN" => Some(Self::Login),
            _ => None,
        }
    }

    /// Returns the mechanism name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
        }
    }
}
