//! # graphrelay-core
//!
//! Glue between the SMTP engine and Microsoft's cloud APIs.
//!
//! This crate provides:
//! - Environment configuration
//! - Login decoding into tenant and client identifiers
//! - The Graph `sendMail` client and the [`GraphRelay`] backend
//! - TLS context loading from files or Azure Key Vault

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
mod error;
pub mod service;
pub mod tls;
pub mod username;

pub use config::{Config, ConfigError, LogLevel, TlsMode};
pub use error::{Error, Result};
pub use service::{GraphMailer, GraphRelay, SendError};
pub use tls::{KeyVault, TlsError, TlsSource};
pub use username::{encode_short, parse_username};
