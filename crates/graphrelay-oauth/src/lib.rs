//! # graphrelay-oauth
//!
//! `OAuth2` client-credentials token exchange against the Microsoft identity
//! platform.
//!
//! ## Quick Start
//!
//! ```ignore
//! use graphrelay_oauth::{Credential, TokenClient, DEFAULT_TIMEOUT};
//! use secrecy::SecretString;
//!
//! let client = TokenClient::new(DEFAULT_TIMEOUT)?;
//! let credential = Credential::new(tenant_id, client_id, SecretString::from(secret));
//! let token = client.get_token(&credential).await?;
//! // Authorization: Bearer ...
//! let header = token.authorization();
//! ```
//!
//! ## Modules
//!
//! - [`authority`]: token endpoint location and well-known scopes
//! - [`flow`]: the client-credentials grant
//! - [`token`]: token and token response types

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod authority;
mod error;
pub mod flow;
pub mod token;

pub use authority::{Authority, GRAPH_SCOPE, KEY_VAULT_SCOPE};
pub use error::{AuthError, Result};
pub use flow::{Credential, DEFAULT_TIMEOUT, TokenClient};
pub use token::Token;
