//! # graphrelay-smtp
//!
//! Server side of SMTP submission (RFC 5321) with AUTH (RFC 4954) and
//! STARTTLS (RFC 3207).
//!
//! The engine speaks the protocol and owns the per-connection state; what
//! happens to credentials and finished messages is up to a [`Relay`].
//!
//! ## Features
//!
//! - **Submission only**: every transaction requires a successful AUTH
//! - **Authentication**: PLAIN and LOGIN, with or without initial response
//! - **TLS**: STARTTLS upgrade or implicit TLS, optionally required
//! - **Extensions**: SIZE, 8BITMIME, HELP
//!
//! ## Quick Start
//!
//! ```ignore
//! use graphrelay_smtp::{Server, ServerConfig, Security};
//! use tokio::net::TcpListener;
//!
//! let config = ServerConfig::new("relay.example.com").with_greeting("ESMTP relay");
//! let server = Server::new(config, Security::None, MyRelay::default());
//! let listener = TcpListener::bind("0.0.0.0:8025").await?;
//! server.serve_until(listener, async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! ```
//!
//! ## Session States
//!
//! ```text
//! Connected ── EHLO ──→ AuthPending ── AUTH ──→ Authenticated
//!                                                   │
//!                    MAIL FROM ─→ RCPT TO ─→ DATA ──┘
//! ```
//!
//! ## Modules
//!
//! - [`command`]: command line parsing
//! - [`connection`]: stream, session state and command dispatch
//! - [`parser`]: low-level argument and body helpers
//! - [`sasl`]: PLAIN/LOGIN response decoding
//! - [`types`]: addresses, envelopes, extensions, replies

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
mod relay;
pub mod sasl;
mod server;
pub mod types;

pub use command::Command;
pub use connection::{Security, ServerConfig, Session, State};
pub use error::{Error, Result};
pub use relay::{AuthFailure, DeliveryFailure, Relay};
pub use server::Server;
pub use types::{Address, AuthMechanism, Envelope, Extension, Reply, ReplyCode};
