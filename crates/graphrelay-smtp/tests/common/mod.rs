//! Shared fixtures: a scripted relay and a line-oriented SMTP client.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use graphrelay_smtp::{AuthFailure, DeliveryFailure, Envelope, Relay};
use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

pub const LOGIN: &str = "tenant@client";
pub const PASSWORD: &str = "s3cret";

/// What the relay saw for one DATA.
#[derive(Debug, Clone)]
pub struct Delivered {
    pub token: String,
    pub sender: String,
    pub recipients: Vec<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryMode {
    #[default]
    Accept,
    Fail,
    Panic,
}

/// Relay accepting [`PASSWORD`] for any well-formed login.
///
/// Logins without an `@` are malformed.
#[derive(Debug, Clone, Default)]
pub struct FakeRelay {
    pub delivered: Arc<Mutex<Vec<Delivered>>>,
    pub auth_calls: Arc<AtomicUsize>,
    pub mode: DeliveryMode,
}

impl FakeRelay {
    pub fn with_mode(mode: DeliveryMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn delivered(&self) -> Vec<Delivered> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }
}

impl Relay for FakeRelay {
    type Token = String;

    async fn authenticate(&self, login: &str, password: SecretString) -> Result<String, AuthFailure> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        if !login.contains('@') {
            return Err(AuthFailure::InvalidCredentials(
                "Invalid username format".to_string(),
            ));
        }
        if password.expose_secret() != PASSWORD {
            return Err(AuthFailure::Rejected);
        }
        Ok(format!("token-for-{login}"))
    }

    async fn deliver(&self, token: &String, envelope: Envelope) -> Result<(), DeliveryFailure> {
        match self.mode {
            DeliveryMode::Accept => {}
            DeliveryMode::Fail => return Err(DeliveryFailure::new("upstream returned 500")),
            DeliveryMode::Panic => panic!("relay exploded"),
        }
        self.delivered.lock().unwrap().push(Delivered {
            token: token.clone(),
            sender: envelope.sender().to_string(),
            recipients: envelope.recipients().iter().map(ToString::to_string).collect(),
            body: envelope.body().to_vec(),
        });
        Ok(())
    }
}

/// One (possibly multi-line) server reply.
#[derive(Debug)]
pub struct Response {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Response {
    /// Text of the last line.
    pub fn text(&self) -> &str {
        self.lines.last().map_or("", String::as_str)
    }
}

/// Test-side SMTP client.
pub struct Client<S> {
    stream: BufReader<S>,
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(io: S) -> Self {
        Self {
            stream: BufReader::new(io),
        }
    }

    pub async fn send(&mut self, line: &str) {
        let data = format!("{line}\r\n");
        self.stream.get_mut().write_all(data.as_bytes()).await.unwrap();
        self.stream.get_mut().flush().await.unwrap();
    }

    /// Reads one reply; panics on EOF.
    pub async fn reply(&mut self) -> Response {
        self.try_reply().await.expect("connection closed")
    }

    /// Reads one reply, or `None` on EOF.
    pub async fn try_reply(&mut self) -> Option<Response> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            if self.stream.read_line(&mut line).await.unwrap() == 0 {
                return None;
            }
            let line = line.trim_end_matches(['\r', '\n']);
            let code = line[..3].parse().unwrap();
            let more = line.as_bytes().get(3) == Some(&b'-');
            lines.push(line.get(4..).unwrap_or("").to_string());
            if !more {
                return Some(Response { code, lines });
            }
        }
    }

    pub async fn command(&mut self, line: &str) -> Response {
        self.send(line).await;
        self.reply().await
    }

    /// EHLO followed by AUTH PLAIN with an initial response.
    pub async fn login(&mut self) {
        assert_eq!(self.command("EHLO client.test").await.code, 250);
        let reply = self.command(&format!("AUTH PLAIN {}", plain(LOGIN, PASSWORD))).await;
        assert_eq!(reply.code, 235, "{reply:?}");
    }

    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }
}

/// Base64 PLAIN response with an empty authorization identity.
pub fn plain(login: &str, password: &str) -> String {
    STANDARD.encode(format!("\0{login}\0{password}"))
}

pub fn b64(text: &str) -> String {
    STANDARD.encode(text)
}
