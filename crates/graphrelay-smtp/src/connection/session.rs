//! Per-connection SMTP session state.

use crate::types::{Address, Envelope};

/// Protocol state of a session.
///
/// ```text
/// Connected ── HELO/EHLO ──→ AuthPending ── AUTH ──→ Authenticated
///                                                  │        ↑
///                                           MAIL FROM       │ DATA done / RSET
///                                                  ↓        │
///                                  MailFrom ── RCPT TO ──→ RcptTo ── DATA ──→ Data
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Greeting sent, waiting for HELO/EHLO.
    Connected,
    /// Client greeted, AUTH not yet completed.
    AuthPending,
    /// Authenticated, no transaction open.
    Authenticated,
    /// MAIL FROM accepted.
    MailFrom,
    /// At least one RCPT TO accepted.
    RcptTo,
    /// Receiving the message body.
    Data,
    /// QUIT received.
    Closed,
}

/// Per-connection state: greeting, attached token and open transaction.
///
/// A token is present exactly when AUTH has succeeded; it is discarded with
/// the session (or on STARTTLS, which restarts the session).
#[derive(Debug)]
pub struct Session<T> {
    state: State,
    encrypted: bool,
    client_domain: Option<String>,
    login: Option<String>,
    token: Option<T>,
    envelope: Option<Envelope>,
}

impl<T> Session<T> {
    /// Creates a session for a new connection.
    #[must_use]
    pub const fn new(encrypted: bool) -> Self {
        Self {
            state: State::Connected,
            encrypted,
            client_domain: None,
            login: None,
            token: None,
            envelope: None,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    /// Returns true if the connection is encrypted.
    #[must_use]
    pub const fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Returns the domain given in HELO/EHLO.
    #[must_use]
    pub fn client_domain(&self) -> Option<&str> {
        self.client_domain.as_deref()
    }

    /// Returns the authenticated login.
    #[must_use]
    pub fn login(&self) -> Option<&str> {
        self.login.as_deref()
    }

    /// Returns true once AUTH has succeeded.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Returns the attached token.
    #[must_use]
    pub const fn token(&self) -> Option<&T> {
        self.token.as_ref()
    }

    /// Returns true while a MAIL transaction is open.
    #[must_use]
    pub const fn in_transaction(&self) -> bool {
        matches!(self.state, State::MailFrom | State::RcptTo | State::Data)
    }

    /// Returns the open envelope.
    #[must_use]
    pub const fn envelope(&self) -> Option<&Envelope> {
        self.envelope.as_ref()
    }

    /// Records HELO/EHLO. Any open transaction is dropped; AUTH persists.
    pub fn greet(&mut self, domain: String) {
        self.client_domain = Some(domain);
        self.reset();
    }

    /// Attaches the token produced by a successful AUTH.
    pub fn attach_token(&mut self, login: String, token: T) {
        self.login = Some(login);
        self.token = Some(token);
        self.state = State::Authenticated;
    }

    /// Opens a transaction for `sender`.
    pub fn begin_transaction(&mut self, sender: Address) {
        self.envelope = Some(Envelope::new(sender));
        self.state = State::MailFrom;
    }

    /// Adds a recipient to the open transaction.
    ///
    /// Returns false if no transaction is open.
    pub fn add_recipient(&mut self, recipient: Address) -> bool {
        let Some(envelope) = self.envelope.as_mut() else {
            return false;
        };
        envelope.add_recipient(recipient);
        self.state = State::RcptTo;
        true
    }

    /// Enters body reception.
    pub const fn begin_data(&mut self) {
        self.state = State::Data;
    }

    /// Closes the transaction and hands back its envelope.
    pub fn finish_transaction(&mut self) -> Option<Envelope> {
        let envelope = self.envelope.take();
        self.reset();
        envelope
    }

    /// Drops the open transaction (RSET). The token is kept.
    pub fn reset(&mut self) {
        self.envelope = None;
        self.state = if self.token.is_some() {
            State::Authenticated
        } else if self.client_domain.is_some() {
            State::AuthPending
        } else {
            State::Connected
        };
    }

    /// Restarts the session after a STARTTLS handshake (RFC 3207 section 4.2).
    pub fn restart_encrypted(&mut self) {
        *self = Self::new(true);
    }

    /// Marks the session closed.
    pub const fn close(&mut self) {
        self.state = State::Closed;
    }
}
