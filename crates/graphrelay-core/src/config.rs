//! Environment-based configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use graphrelay_oauth::Credential;
use graphrelay_smtp::ServerConfig;
use secrecy::SecretString;
use url::Url;
use uuid::Uuid;

use crate::tls::TlsSource;
use crate::username::{DEFAULT_DELIMITER, DELIMITERS};

/// Configuration errors. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset.
    #[error("{0} is required")]
    Missing(&'static str),

    /// A variable has an unusable value.
    #[error("invalid {name}={value:?}: {reason}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
        /// What was expected.
        reason: String,
    },
}

/// Log verbosity, named the way operators set it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Everything, including per-command traces.
    Debug,
    /// Connections, authentications and deliveries.
    #[default]
    Info,
    /// Failures that do not stop the service.
    Warning,
    /// Errors only.
    Error,
    /// Treated like `Error`.
    Critical,
}

impl LogLevel {
    /// Directive for `tracing_subscriber::EnvFilter`.
    #[must_use]
    pub const fn directive(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error | Self::Critical => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARNING" | "WARN" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            "CRITICAL" => Ok(Self::Critical),
            _ => Err("expected DEBUG, INFO, WARNING, ERROR or CRITICAL".into()),
        }
    }
}

/// How TLS is offered on the listening port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsMode {
    /// Plaintext greeting, upgrade with STARTTLS.
    #[default]
    StartTls,
    /// TLS handshake before the greeting.
    Implicit,
}

/// Relay configuration, built once at startup.
#[derive(Debug)]
pub struct Config {
    /// Log verbosity.
    pub log_level: LogLevel,
    /// Listen address.
    pub smtp_host: IpAddr,
    /// Listen port.
    pub smtp_port: u16,
    /// Hostname announced to clients.
    pub server_hostname: String,
    /// Greeting text after the hostname.
    pub server_greeting: String,
    /// Whether REQUIRE_TLS was requested.
    pub require_tls: bool,
    /// TLS mode, when TLS is enabled.
    pub tls_mode: TlsMode,
    /// Certificate source; `None` when USE_TLS is off.
    pub tls: Option<TlsSource>,
    /// Separator between tenant and client in the AUTH login.
    pub username_delimiter: String,
    /// Timeout for token, send and vault requests.
    pub http_timeout: Duration,
    /// Largest accepted message in bytes.
    pub max_message_size: usize,
    /// Idle timeout for SMTP sessions.
    pub session_timeout: Duration,
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first bad variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`. Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first bad variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let use_tls = env.bool("USE_TLS", true)?;
        let tls_mode = match env.get("TLS_MODE") {
            None => TlsMode::default(),
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "starttls" => TlsMode::StartTls,
                "implicit" => TlsMode::Implicit,
                _ => return Err(invalid("TLS_MODE", &value, "expected starttls or implicit")),
            },
        };
        let tls = if use_tls { Some(env.tls_source()?) } else { None };

        let username_delimiter = env
            .get("USERNAME_DELIMITER")
            .unwrap_or_else(|| DEFAULT_DELIMITER.to_string());
        if !DELIMITERS.contains(&username_delimiter.as_str()) {
            return Err(invalid(
                "USERNAME_DELIMITER",
                &username_delimiter,
                "expected one of @ : |",
            ));
        }

        Ok(Self {
            log_level: env.parse("LOG_LEVEL", LogLevel::default())?,
            smtp_host: env.parse("SMTP_HOST", IpAddr::V4(Ipv4Addr::UNSPECIFIED))?,
            smtp_port: env.parse("SMTP_PORT", 8025)?,
            server_hostname: env.get("SERVER_HOSTNAME").unwrap_or_else(|| "localhost".into()),
            server_greeting: env
                .get("SERVER_GREETING")
                .unwrap_or_else(|| "Microsoft Graph SMTP OAuth Relay".into()),
            require_tls: env.bool("REQUIRE_TLS", true)?,
            tls_mode,
            tls,
            username_delimiter,
            http_timeout: Duration::from_secs(env.positive("HTTP_TIMEOUT_SECS", 30)?),
            max_message_size: usize::try_from(env.positive("MAX_MESSAGE_SIZE", 33_554_432)?)
                .map_err(|e| invalid("MAX_MESSAGE_SIZE", "", e.to_string()))?,
            session_timeout: Duration::from_secs(env.positive("SESSION_TIMEOUT_SECS", 300)?),
        })
    }

    /// Socket address to bind.
    #[must_use]
    pub const fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.smtp_host, self.smtp_port)
    }

    /// True when REQUIRE_TLS is set but USE_TLS is off, so it cannot apply.
    #[must_use]
    pub const fn tls_requirement_ignored(&self) -> bool {
        self.require_tls && self.tls.is_none()
    }

    /// SMTP engine settings derived from this configuration.
    #[must_use]
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::new(self.server_hostname.clone())
            .with_greeting(self.server_greeting.clone())
            .with_require_tls(self.require_tls && self.tls.is_some())
            .with_max_message_size(self.max_message_size)
            .with_session_timeout(self.session_timeout)
    }
}

fn invalid(name: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.into(),
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn require(&self, name: &'static str) -> Result<String, ConfigError> {
        self.get(name).ok_or(ConfigError::Missing(name))
    }

    fn parse<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| invalid(name, &value, e.to_string())),
        }
    }

    fn positive(&self, name: &'static str, default: u64) -> Result<u64, ConfigError> {
        let value = self.parse(name, default)?;
        if value == 0 {
            return Err(invalid(name, "0", "must be positive"));
        }
        Ok(value)
    }

    fn bool(&self, name: &'static str, default: bool) -> Result<bool, ConfigError> {
        let Some(value) = self.get(name) else {
            return Ok(default);
        };
        match value.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(invalid(name, &value, "expected true or false")),
        }
    }

    fn uuid(&self, name: &'static str) -> Result<Uuid, ConfigError> {
        let value = self.require(name)?;
        Uuid::parse_str(&value).map_err(|e| invalid(name, &value, e.to_string()))
    }

    fn tls_source(&self) -> Result<TlsSource, ConfigError> {
        let source = self.get("TLS_SOURCE").unwrap_or_else(|| "file".into());
        match source.to_ascii_lowercase().as_str() {
            "file" => {
                let cert = self.existing_file("TLS_CERT_FILEPATH", "certs/cert.pem")?;
                let key = self.existing_file("TLS_KEY_FILEPATH", "certs/key.pem")?;
                Ok(TlsSource::File { cert, key })
            }
            "keyvault" => {
                let url = self.require("AZURE_KEY_VAULT_URL")?;
                let vault_url =
                    Url::parse(&url).map_err(|e| invalid("AZURE_KEY_VAULT_URL", &url, e.to_string()))?;
                let cert_name = self.require("AZURE_KEY_VAULT_CERT_NAME")?;
                let credential = Credential::new(
                    self.uuid("AZURE_TENANT_ID")?,
                    self.uuid("AZURE_CLIENT_ID")?,
                    SecretString::from(self.require("AZURE_CLIENT_SECRET")?),
                );
                Ok(TlsSource::KeyVault {
                    vault_url,
                    cert_name,
                    credential,
                })
            }
            _ => Err(invalid("TLS_SOURCE", &source, "expected file or keyvault")),
        }
    }

    fn existing_file(&self, name: &'static str, default: &str) -> Result<PathBuf, ConfigError> {
        let path = PathBuf::from(self.get(name).unwrap_or_else(|| default.to_string()));
        if !path.is_file() {
            return Err(invalid(
                name,
                &path.display().to_string(),
                "file does not exist",
            ));
        }
        Ok(path)
    }
}
