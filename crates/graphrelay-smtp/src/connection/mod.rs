//! Per-connection SMTP server machinery.
//!
//! - [`stream`]: plaintext/TLS stream with bounded line reads
//! - [`session`]: protocol state of one session
//! - [`handler`]: command dispatch driving a session
//! - [`config`]: server configuration and TLS mode

mod config;
mod handler;
mod session;
mod stream;

pub use config::{DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_SESSION_TIMEOUT, Security, ServerConfig};
pub use handler::{AUTH_LINE_MAX, COMMAND_LINE_MAX, Connection, handle};
pub use session::{Session, State};
pub use stream::SmtpStream;
