//! TCP listener accepting SMTP connections.

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::connection::{Security, ServerConfig, handle};
use crate::error::Result;
use crate::relay::Relay;

/// SMTP server spawning one task per accepted connection.
#[derive(Debug)]
pub struct Server<R> {
    config: Arc<ServerConfig>,
    security: Security,
    relay: Arc<R>,
}

impl<R> Clone for Server<R> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            security: self.security.clone(),
            relay: Arc::clone(&self.relay),
        }
    }
}

impl<R: Relay> Server<R> {
    /// Creates a server.
    #[must_use]
    pub fn new(config: ServerConfig, security: Security, relay: R) -> Self {
        Self {
            config: Arc::new(config),
            security,
            relay: Arc::new(relay),
        }
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Accepts connections forever.
    ///
    /// # Errors
    ///
    /// Never returns in practice; accept errors are logged and skipped.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        self.serve_until(listener, std::future::pending()).await
    }

    /// Accepts connections until `shutdown` resolves.
    ///
    /// Sessions already running are left to finish on their own.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's local address cannot be read.
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let local = listener.local_addr()?;
        info!(address = %local, security = ?self.security, "SMTP server listening");

        tokio::pin!(shutdown);
        loop {
            let (socket, peer) = tokio::select! {
                () = &mut shutdown => {
                    info!("SMTP server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                },
            };

            let config = Arc::clone(&self.config);
            let security = self.security.clone();
            let relay = Arc::clone(&self.relay);
            let span = info_span!("session", peer = %peer);

            tokio::spawn(
                async move {
                    debug!("connection accepted");
                    match handle(socket, config, security, relay).await {
                        Ok(()) => debug!("connection closed"),
                        Err(e) => debug!(error = %e, "connection ended with error"),
                    }
                }
                .instrument(span),
            );
        }
    }
}
