//! SMTP command handling for one connection.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use secrecy::zeroize::{Zeroize, Zeroizing};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use super::config::{Security, ServerConfig};
use super::session::{Session, State};
use super::stream::SmtpStream;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{is_data_terminator, unstuff};
use crate::relay::{AuthFailure, Relay};
use crate::sasl::{self, LoginData, SaslError};
use crate::types::{Address, AuthMechanism, Envelope, Extension, Reply, ReplyCode};

/// Longest accepted command line, excluding CRLF.
pub const COMMAND_LINE_MAX: usize = 1000;

/// Longest accepted SASL response line (RFC 4954 section 4).
pub const AUTH_LINE_MAX: usize = 12288;

/// What the read loop does after a command.
enum Action {
    Reply(Reply),
    StartTls(TlsAcceptor),
    Quit,
}

/// Serves one accepted connection until QUIT, EOF or a fatal error.
///
/// With [`Security::Implicit`] the TLS handshake happens first. Handshakes
/// are bounded by the session timeout like any other read.
///
/// # Errors
///
/// Returns an error on I/O failure, a failed TLS handshake or a handshake
/// that did not finish in time ([`Error::Timeout`]).
pub async fn handle<R, S>(
    io: S,
    config: Arc<ServerConfig>,
    security: Security,
    relay: Arc<R>,
) -> Result<()>
where
    R: Relay,
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let stream = match &security {
        Security::Implicit(acceptor) => {
            within(config.session_timeout, SmtpStream::accept_tls(io, acceptor)).await?
        }
        Security::None | Security::StartTls(_) => SmtpStream::plain(io),
    };
    Connection::new(config, security, relay, stream.is_encrypted())
        .run(stream)
        .await
}

/// Protocol state machine driving one session.
pub struct Connection<R: Relay> {
    config: Arc<ServerConfig>,
    security: Security,
    relay: Arc<R>,
    session: Session<R::Token>,
}

impl<R: Relay> Connection<R> {
    /// Creates the handler for a new connection.
    #[must_use]
    pub const fn new(
        config: Arc<ServerConfig>,
        security: Security,
        relay: Arc<R>,
        encrypted: bool,
    ) -> Self {
        Self {
            config,
            security,
            relay,
            session: Session::new(encrypted),
        }
    }

    /// Returns the session state.
    #[must_use]
    pub const fn session(&self) -> &Session<R::Token> {
        &self.session
    }

    /// Sends the greeting and processes commands in arrival order.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or a failed STARTTLS handshake.
    pub async fn run<S>(mut self, mut stream: SmtpStream<S>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let greeting = format!("{} {}", self.config.hostname, self.config.greeting);
        stream
            .write_reply(&Reply::line(ReplyCode::SERVICE_READY, greeting))
            .await?;

        loop {
            let mut line = match self.read_line(&mut stream, COMMAND_LINE_MAX).await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("client closed connection");
                    return Ok(());
                }
                Err(e) => match e.reply() {
                    Some(reply) => {
                        stream.write_reply(&reply).await?;
                        continue;
                    }
                    None => return abort(stream, e).await,
                },
            };

            let parsed = Command::parse(&String::from_utf8_lossy(&line));
            // may carry an AUTH initial response
            line.zeroize();
            let command = match parsed {
                Ok(command) => command,
                Err(e) => {
                    debug!(error = %e, "rejected command line");
                    if let Some(reply) = e.reply() {
                        stream.write_reply(&reply).await?;
                    }
                    continue;
                }
            };
            debug!(command = command.verb(), state = ?self.session.state(), "command");

            match self.dispatch(&mut stream, command).await {
                Ok(Action::Reply(reply)) => stream.write_reply(&reply).await?,
                Ok(Action::StartTls(acceptor)) => {
                    stream
                        .write_reply(&Reply::line(ReplyCode::SERVICE_READY, "Ready to start TLS"))
                        .await?;
                    stream =
                        within(self.config.session_timeout, stream.upgrade_to_tls(&acceptor))
                            .await?;
                    self.session.restart_encrypted();
                    debug!("STARTTLS handshake complete");
                }
                Ok(Action::Quit) => {
                    stream
                        .write_reply(&Reply::line(ReplyCode::CLOSING, "Bye"))
                        .await?;
                    let _ = stream.shutdown().await;
                    return Ok(());
                }
                Err(e) => match e.reply() {
                    Some(reply) => stream.write_reply(&reply).await?,
                    None => return abort(stream, e).await,
                },
            }
        }
    }

    async fn dispatch<S>(&mut self, stream: &mut SmtpStream<S>, command: Command) -> Result<Action>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if self.tls_required() && !self.session.is_encrypted() && !command.allowed_before_tls() {
            return Ok(Action::Reply(Reply::line(
                ReplyCode::AUTH_REQUIRED,
                "Must issue a STARTTLS command first",
            )));
        }

        let reply = match command {
            Command::Helo { domain } => {
                self.session.greet(domain);
                Reply::line(ReplyCode::OK, self.config.hostname.clone())
            }
            Command::Ehlo { domain } => self.ehlo(domain),
            Command::StartTls => return Ok(self.starttls()),
            Command::Auth {
                mechanism,
                initial_response,
            } => self.auth(stream, &mechanism, initial_response).await?,
            Command::MailFrom { from, size } => self.mail(from, size),
            Command::RcptTo { to } => self.rcpt(to),
            Command::Data => self.data(stream).await?,
            Command::Rset => {
                self.session.reset();
                ok()
            }
            Command::Vrfy { .. } => Reply::line(
                ReplyCode::CANNOT_VERIFY,
                "Cannot VRFY user, but will accept message and attempt delivery",
            ),
            Command::Help => Reply::line(
                ReplyCode::HELP,
                "Supported commands: EHLO HELO STARTTLS AUTH MAIL RCPT DATA RSET NOOP QUIT VRFY",
            ),
            Command::Noop => ok(),
            Command::Quit => {
                self.session.close();
                return Ok(Action::Quit);
            }
        };

        Ok(Action::Reply(reply))
    }

    fn tls_required(&self) -> bool {
        self.config.require_tls && self.security.is_enabled()
    }

    fn extensions(&self) -> Vec<Extension> {
        let encrypted = self.session.is_encrypted();
        let mut extensions = vec![
            Extension::Size(self.config.max_message_size),
            Extension::EightBitMime,
        ];
        if self.security.is_enabled() && !encrypted {
            extensions.push(Extension::StartTls);
        }
        if !self.tls_required() || encrypted {
            extensions.push(Extension::Auth(AuthMechanism::ALL.to_vec()));
        }
        extensions.push(Extension::Help);
        extensions
    }

    fn ehlo(&mut self, domain: String) -> Reply {
        self.session.greet(domain);
        let mut lines = vec![self.config.hostname.clone()];
        lines.extend(self.extensions().iter().map(ToString::to_string));
        Reply::new(ReplyCode::OK, lines)
    }

    fn starttls(&self) -> Action {
        if self.session.is_encrypted() {
            return Action::Reply(Reply::line(ReplyCode::BAD_SEQUENCE, "Already running TLS"));
        }
        match self.security.acceptor() {
            Some(acceptor) => Action::StartTls(acceptor.clone()),
            None => Action::Reply(Reply::line(ReplyCode::TLS_UNAVAILABLE, "TLS not available")),
        }
    }

    async fn auth<S>(
        &mut self,
        stream: &mut SmtpStream<S>,
        mechanism: &str,
        initial_response: Option<Zeroizing<String>>,
    ) -> Result<Reply>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if self.session.client_domain().is_none() {
            return Ok(Reply::line(ReplyCode::BAD_SEQUENCE, "Send EHLO first"));
        }
        if self.session.is_authenticated() {
            return Ok(Reply::line(ReplyCode::BAD_SEQUENCE, "Already authenticated"));
        }
        if self.session.in_transaction() {
            return Ok(Reply::line(
                ReplyCode::BAD_SEQUENCE,
                "AUTH not permitted during a mail transaction",
            ));
        }
        let Some(mechanism) = AuthMechanism::parse(mechanism) else {
            debug!(mechanism, "unsupported AUTH mechanism");
            return Ok(Reply::line(
                ReplyCode::PARAMETER_NOT_IMPLEMENTED,
                "Unsupported authentication mechanism",
            ));
        };

        let credentials = match mechanism {
            AuthMechanism::Plain => self.read_plain(stream, initial_response).await?,
            AuthMechanism::Login => self.read_login(stream, initial_response).await?,
        };
        let LoginData { login, password } = match credentials {
            Ok(data) => data,
            Err(e @ SaslError::MissingCredentials) => {
                return Ok(Reply::line(ReplyCode::AUTH_FAILED, e.to_string()));
            }
            Err(e) => return Ok(Reply::line(ReplyCode::PARAMETER_ERROR, e.to_string())),
        };

        match self.relay.authenticate(&login, password).await {
            Ok(token) => {
                info!(login = %login, mechanism = mechanism.as_str(), "authenticated");
                self.session.attach_token(login, token);
                Ok(Reply::line(ReplyCode::AUTH_SUCCESS, "Authentication successful"))
            }
            Err(AuthFailure::InvalidCredentials(detail)) => {
                warn!(login = %login, %detail, "malformed login");
                Ok(Reply::line(ReplyCode::AUTH_FAILED, detail))
            }
            Err(AuthFailure::Rejected) => {
                warn!(login = %login, "authentication rejected");
                Ok(Reply::line(ReplyCode::AUTH_FAILED, "Authentication failed"))
            }
        }
    }

    async fn read_plain<S>(
        &self,
        stream: &mut SmtpStream<S>,
        initial_response: Option<Zeroizing<String>>,
    ) -> Result<std::result::Result<LoginData, SaslError>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let response = match initial_response {
            Some(response) => response,
            None => self.challenge(stream, "").await?,
        };
        let mut decoded = match sasl::decode_response(&response) {
            Ok(decoded) => decoded,
            Err(e) => return Ok(Err(e)),
        };
        let credentials = sasl::parse_plain(&decoded);
        decoded.zeroize();
        Ok(credentials)
    }

    async fn read_login<S>(
        &self,
        stream: &mut SmtpStream<S>,
        initial_response: Option<Zeroizing<String>>,
    ) -> Result<std::result::Result<LoginData, SaslError>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let response = match initial_response {
            Some(response) => response,
            None => {
                self.challenge(stream, sasl::LOGIN_USERNAME_CHALLENGE)
                    .await?
            }
        };
        let login = match sasl::decode_response(&response) {
            Ok(login) => login,
            Err(e) => return Ok(Err(e)),
        };

        let response = self
            .challenge(stream, sasl::LOGIN_PASSWORD_CHALLENGE)
            .await?;
        let mut password = match sasl::decode_response(&response) {
            Ok(password) => password,
            Err(e) => return Ok(Err(e)),
        };
        let credentials = sasl::login_data(&login, &password);
        password.zeroize();
        Ok(credentials)
    }

    /// Sends a `334` challenge and reads the client's response line.
    async fn challenge<S>(
        &self,
        stream: &mut SmtpStream<S>,
        text: &str,
    ) -> Result<Zeroizing<String>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let message = if text.is_empty() {
            Vec::new()
        } else {
            vec![text.to_string()]
        };
        stream
            .write_reply(&Reply::new(ReplyCode::AUTH_CONTINUE, message))
            .await?;
        let mut line = self
            .read_line(stream, AUTH_LINE_MAX)
            .await?
            .ok_or_else(|| Error::Io(io::ErrorKind::UnexpectedEof.into()))?;
        let response = Zeroizing::new(String::from_utf8_lossy(&line).into_owned());
        line.zeroize();
        Ok(response)
    }

    fn mail(&mut self, from: Address, size: Option<usize>) -> Reply {
        if !self.session.is_authenticated() {
            return auth_required();
        }
        if self.session.in_transaction() {
            return Reply::line(ReplyCode::BAD_SEQUENCE, "Nested MAIL command");
        }
        if size.is_some_and(|size| size > self.config.max_message_size) {
            return too_large();
        }

        debug!(sender = %from, "MAIL FROM accepted");
        self.session.begin_transaction(from);
        ok()
    }

    fn rcpt(&mut self, to: Address) -> Reply {
        if !self.session.is_authenticated() {
            return auth_required();
        }
        if !matches!(self.session.state(), State::MailFrom | State::RcptTo) {
            return Reply::line(ReplyCode::BAD_SEQUENCE, "Need MAIL command");
        }

        debug!(recipient = %to, "RCPT TO accepted");
        self.session.add_recipient(to);
        ok()
    }

    async fn data<S>(&mut self, stream: &mut SmtpStream<S>) -> Result<Reply>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if !self.session.is_authenticated() {
            return Ok(auth_required());
        }
        match self.session.state() {
            State::RcptTo => {}
            State::MailFrom => {
                return Ok(Reply::line(ReplyCode::BAD_SEQUENCE, "Need RCPT command"));
            }
            _ => return Ok(Reply::line(ReplyCode::BAD_SEQUENCE, "Need MAIL command")),
        }

        stream
            .write_reply(&Reply::line(
                ReplyCode::START_DATA,
                "End data with <CR><LF>.<CR><LF>",
            ))
            .await?;
        self.session.begin_data();

        let body = self.read_body(stream).await;
        // the envelope is cleared whatever the outcome
        let envelope = self.session.finish_transaction();
        let Some(body) = body? else {
            return Ok(too_large());
        };
        let Some(mut envelope) = envelope else {
            return Ok(Reply::line(ReplyCode::BAD_SEQUENCE, "Need MAIL command"));
        };
        let Some(token) = self.session.token().cloned() else {
            return Ok(auth_required());
        };

        envelope.set_body(body);
        Ok(self.forward(token, envelope).await)
    }

    /// Reads body lines up to the terminating `.`.
    ///
    /// Returns `None` if the body exceeded the size limit; the rest of the
    /// body is still consumed.
    async fn read_body<S>(&self, stream: &mut SmtpStream<S>) -> Result<Option<Vec<u8>>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let limit = self.config.max_message_size;
        let mut body = Vec::new();
        let mut first = true;
        let mut oversized = false;

        loop {
            let line = match self.read_line(stream, limit).await {
                Ok(Some(line)) => line,
                Ok(None) => return Err(Error::Io(io::ErrorKind::UnexpectedEof.into())),
                Err(Error::LineTooLong(_)) => {
                    oversized = true;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if is_data_terminator(&line) {
                break;
            }
            if oversized {
                continue;
            }

            let line = unstuff(&line);
            let separator = if first { 0 } else { 2 };
            if body.len() + separator + line.len() > limit {
                oversized = true;
                body = Vec::new();
                continue;
            }
            if !first {
                body.extend_from_slice(b"\r\n");
            }
            body.extend_from_slice(line);
            first = false;
        }

        if oversized {
            warn!(limit, "message exceeded size limit");
            return Ok(None);
        }
        Ok(Some(body))
    }

    /// Delivers a finished envelope on its own task so a panic in the relay
    /// becomes a failed transaction instead of a dead connection.
    async fn forward(&self, token: R::Token, envelope: Envelope) -> Reply {
        info!(
            sender = %envelope.sender(),
            recipients = ?envelope.recipients().iter().map(Address::as_str).collect::<Vec<_>>(),
            size = envelope.body().len(),
            "message received"
        );

        let relay = Arc::clone(&self.relay);
        let delivery = tokio::spawn(async move { relay.deliver(&token, envelope).await });

        match delivery.await {
            Ok(Ok(())) => {
                info!("message delivered");
                ok()
            }
            Ok(Err(e)) => {
                warn!(error = %e, "delivery failed");
                transaction_failed()
            }
            Err(e) => {
                error!(error = %e, "delivery task failed");
                transaction_failed()
            }
        }
    }

    async fn read_line<S>(&self, stream: &mut SmtpStream<S>, limit: usize) -> Result<Option<Vec<u8>>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        tokio::time::timeout(self.config.session_timeout, stream.read_line(limit))
            .await
            .map_err(|_| Error::Timeout)?
    }
}

async fn within<T, F>(deadline: Duration, handshake: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(deadline, handshake).await.map_err(|_| {
        debug!("TLS handshake timed out");
        Error::Timeout
    })?
}

/// Ends the session after a fatal error. A timeout is reported to the
/// client and is not an error.
async fn abort<S>(mut stream: SmtpStream<S>, error: Error) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if matches!(error, Error::Timeout) {
        debug!("session timed out");
        let _ = stream
            .write_reply(&Reply::line(
                ReplyCode::SERVICE_UNAVAILABLE,
                "Timeout, closing connection",
            ))
            .await;
        return Ok(());
    }
    Err(error)
}

fn ok() -> Reply {
    Reply::line(ReplyCode::OK, "OK")
}

fn auth_required() -> Reply {
    Reply::line(ReplyCode::AUTH_REQUIRED, "Authentication required")
}

fn too_large() -> Reply {
    Reply::line(
        ReplyCode::EXCEEDED_STORAGE,
        "Message size exceeds fixed limit",
    )
}

fn transaction_failed() -> Reply {
    Reply::line(ReplyCode::TRANSACTION_FAILED, "Transaction failed")
}
