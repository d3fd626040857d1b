//! `graphrelay` - SMTP to Microsoft Graph relay
//!
//! Accepts authenticated SMTP submissions and forwards each message through
//! Graph `sendMail`, using the SMTP login and password as client credentials.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use anyhow::Context as _;
use graphrelay_core::{Config, GraphRelay, LogLevel, TlsMode};
use graphrelay_smtp::{Security, Server};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    // RUST_LOG wins over LOG_LEVEL
    let level = config.as_ref().map_or(LogLevel::default(), |c| c.log_level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.directive().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config.context("invalid configuration")?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting graphrelay");

    if config.tls_requirement_ignored() {
        warn!("REQUIRE_TLS is set but USE_TLS is off; clients may authenticate in plaintext");
    }

    let security = match &config.tls {
        None => Security::None,
        Some(source) => {
            let acceptor = source
                .load(config.http_timeout)
                .await
                .context("failed to load TLS certificate")?;
            match config.tls_mode {
                TlsMode::StartTls => Security::StartTls(acceptor),
                TlsMode::Implicit => Security::Implicit(acceptor),
            }
        }
    };

    let relay = GraphRelay::from_config(&config).context("failed to build HTTP clients")?;
    let server = Server::new(config.server_config(), security, relay);

    let addr = config.listen_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    server.serve_until(listener, shutdown_signal()).await?;
    info!("graphrelay stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
