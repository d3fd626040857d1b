//! Protocol tests driving a session over an in-memory duplex stream.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::DuplexStream;
use tokio::task::JoinHandle;

use common::{Client, DeliveryMode, FakeRelay, LOGIN, PASSWORD, b64, plain};
use graphrelay_smtp::connection::handle;
use graphrelay_smtp::{Security, ServerConfig};

fn config() -> ServerConfig {
    ServerConfig::new("relay.test")
        .with_greeting("Test relay")
        .with_max_message_size(1024)
}

fn start(
    config: ServerConfig,
    relay: FakeRelay,
) -> (Client<DuplexStream>, JoinHandle<graphrelay_smtp::Result<()>>) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let task = tokio::spawn(handle(
        server,
        Arc::new(config),
        Security::None,
        Arc::new(relay),
    ));
    (Client::new(client), task)
}

async fn connect(relay: FakeRelay) -> Client<DuplexStream> {
    let (mut client, _task) = start(config(), relay);
    assert_eq!(client.reply().await.code, 220);
    client
}

async fn send_message(client: &mut Client<DuplexStream>, body: &[&str]) -> u16 {
    assert_eq!(client.command("MAIL FROM:<sender@contoso.com>").await.code, 250);
    assert_eq!(client.command("RCPT TO:<rcpt@example.com>").await.code, 250);
    assert_eq!(client.command("DATA").await.code, 354);
    for line in body {
        client.send(line).await;
    }
    client.command(".").await.code
}

#[tokio::test]
async fn test_greeting_and_ehlo() {
    let (mut client, _task) = start(config(), FakeRelay::default());

    let greeting = client.reply().await;
    assert_eq!(greeting.code, 220);
    assert_eq!(greeting.text(), "relay.test Test relay");

    let ehlo = client.command("EHLO client.test").await;
    assert_eq!(ehlo.code, 250);
    assert_eq!(ehlo.lines[0], "relay.test");
    assert!(ehlo.lines.contains(&"SIZE 1024".to_string()));
    assert!(ehlo.lines.contains(&"8BITMIME".to_string()));
    assert!(ehlo.lines.contains(&"AUTH PLAIN LOGIN".to_string()));
    assert!(ehlo.lines.contains(&"HELP".to_string()));
    assert!(!ehlo.lines.contains(&"STARTTLS".to_string()));
}

#[tokio::test]
async fn test_helo() {
    let mut client = connect(FakeRelay::default()).await;
    let reply = client.command("HELO client.test").await;
    assert_eq!(reply.code, 250);
    assert_eq!(reply.text(), "relay.test");
}

#[tokio::test]
async fn test_transaction_requires_auth() {
    let relay = FakeRelay::default();
    let mut client = connect(relay.clone()).await;
    client.command("EHLO client.test").await;

    let reply = client.command("MAIL FROM:<sender@contoso.com>").await;
    assert_eq!(reply.code, 530);
    assert_eq!(reply.text(), "Authentication required");

    assert_eq!(client.command("RCPT TO:<rcpt@example.com>").await.code, 530);
    assert_eq!(client.command("DATA").await.code, 530);
    assert_eq!(client.command("NOOP").await.code, 250);
    assert!(relay.delivered().is_empty());
}

#[tokio::test]
async fn test_auth_plain_and_deliver() {
    let relay = FakeRelay::default();
    let mut client = connect(relay.clone()).await;
    client.login().await;

    assert_eq!(send_message(&mut client, &["hello"]).await, 250);

    let delivered = relay.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].token, format!("token-for-{LOGIN}"));
    assert_eq!(delivered[0].sender, "sender@contoso.com");
    assert_eq!(delivered[0].recipients, vec!["rcpt@example.com"]);
    assert_eq!(delivered[0].body, b"hello");
}

#[tokio::test]
async fn test_auth_plain_with_challenge() {
    let mut client = connect(FakeRelay::default()).await;
    client.command("EHLO client.test").await;

    let challenge = client.command("AUTH PLAIN").await;
    assert_eq!(challenge.code, 334);
    assert_eq!(challenge.text(), "");

    let reply = client.command(&plain(LOGIN, PASSWORD)).await;
    assert_eq!(reply.code, 235);
    assert_eq!(reply.text(), "Authentication successful");
}

#[tokio::test]
async fn test_auth_login() {
    let mut client = connect(FakeRelay::default()).await;
    client.command("EHLO client.test").await;

    let username = client.command("AUTH LOGIN").await;
    assert_eq!(username.code, 334);
    assert_eq!(username.text(), "VXNlcm5hbWU6");

    let password = client.command(&b64(LOGIN)).await;
    assert_eq!(password.code, 334);
    assert_eq!(password.text(), "UGFzc3dvcmQ6");

    assert_eq!(client.command(&b64(PASSWORD)).await.code, 235);
}

#[tokio::test]
async fn test_auth_login_with_initial_username() {
    let mut client = connect(FakeRelay::default()).await;
    client.command("EHLO client.test").await;

    let password = client.command(&format!("auth login {}", b64(LOGIN))).await;
    assert_eq!(password.code, 334);
    assert_eq!(password.text(), "UGFzc3dvcmQ6");
    assert_eq!(client.command(&b64(PASSWORD)).await.code, 235);
}

#[tokio::test]
async fn test_auth_unsupported_mechanism() {
    let relay = FakeRelay::default();
    let mut client = connect(relay.clone()).await;
    client.command("EHLO client.test").await;

    let reply = client.command("AUTH CRAM-MD5").await;
    assert_eq!(reply.code, 504);
    assert_eq!(reply.text(), "Unsupported authentication mechanism");
    assert_eq!(relay.auth_calls(), 0);
    assert_eq!(client.command("MAIL FROM:<a@b.com>").await.code, 530);
}

#[tokio::test]
async fn test_auth_mechanism_case_insensitive() {
    let relay = FakeRelay::default();
    let mut client = connect(relay.clone()).await;
    client.command("ehlo client.test").await;

    let reply = client
        .command(&format!("auth plain {}", plain(LOGIN, PASSWORD)))
        .await;
    assert_eq!(reply.code, 235);
    assert_eq!(relay.auth_calls(), 1);
}

#[tokio::test]
async fn test_auth_rejected() {
    let relay = FakeRelay::default();
    let mut client = connect(relay.clone()).await;
    client.command("EHLO client.test").await;

    let reply = client
        .command(&format!("AUTH PLAIN {}", plain(LOGIN, "wrong")))
        .await;
    assert_eq!(reply.code, 535);
    assert_eq!(reply.text(), "Authentication failed");
    assert_eq!(relay.auth_calls(), 1);

    assert_eq!(client.command("MAIL FROM:<a@b.com>").await.code, 530);
}

#[tokio::test]
async fn test_auth_malformed_login_shows_detail() {
    let mut client = connect(FakeRelay::default()).await;
    client.command("EHLO client.test").await;

    let reply = client
        .command(&format!("AUTH PLAIN {}", plain("no-delimiter", PASSWORD)))
        .await;
    assert_eq!(reply.code, 535);
    assert_eq!(reply.text(), "Invalid username format");
}

#[tokio::test]
async fn test_auth_missing_credentials() {
    let relay = FakeRelay::default();
    let mut client = connect(relay.clone()).await;
    client.command("EHLO client.test").await;

    let reply = client.command(&format!("AUTH PLAIN {}", plain("", ""))).await;
    assert_eq!(reply.code, 535);
    assert_eq!(reply.text(), "Authentication credentials missing");
    assert_eq!(relay.auth_calls(), 0);
}

#[tokio::test]
async fn test_auth_aborted_and_undecodable() {
    let mut client = connect(FakeRelay::default()).await;
    client.command("EHLO client.test").await;

    assert_eq!(client.command("AUTH LOGIN").await.code, 334);
    let reply = client.command("*").await;
    assert_eq!(reply.code, 501);
    assert_eq!(reply.text(), "Authentication aborted");

    let reply = client.command("AUTH PLAIN !!!notbase64").await;
    assert_eq!(reply.code, 501);
    assert_eq!(reply.text(), "Cannot decode response");

    // session is still usable
    client.login().await;
}

#[tokio::test]
async fn test_auth_twice_is_bad_sequence() {
    let mut client = connect(FakeRelay::default()).await;
    client.login().await;
    let reply = client
        .command(&format!("AUTH PLAIN {}", plain(LOGIN, PASSWORD)))
        .await;
    assert_eq!(reply.code, 503);
}

#[tokio::test]
async fn test_token_reused_across_transactions() {
    let relay = FakeRelay::default();
    let mut client = connect(relay.clone()).await;
    client.login().await;

    assert_eq!(send_message(&mut client, &["first"]).await, 250);
    assert_eq!(send_message(&mut client, &["second"]).await, 250);

    let delivered = relay.delivered();
    assert_eq!(delivered.len(), 2);
    assert_eq!(delivered[0].token, delivered[1].token);
    assert_eq!(relay.auth_calls(), 1);
}

#[tokio::test]
async fn test_multiple_recipients_and_multiline_body() {
    let relay = FakeRelay::default();
    let mut client = connect(relay.clone()).await;
    client.login().await;

    assert_eq!(client.command("MAIL FROM:<sender@contoso.com>").await.code, 250);
    assert_eq!(client.command("RCPT TO:<a@example.com>").await.code, 250);
    assert_eq!(client.command("RCPT TO:<b@example.com>").await.code, 250);
    assert_eq!(client.command("DATA").await.code, 354);
    client.send("Subject: hi").await;
    client.send("").await;
    client.send("..leading dot").await;
    client.send("last").await;
    assert_eq!(client.command(".").await.code, 250);

    let delivered = relay.delivered();
    assert_eq!(delivered[0].recipients, vec!["a@example.com", "b@example.com"]);
    assert_eq!(
        delivered[0].body,
        b"Subject: hi\r\n\r\n.leading dot\r\nlast".to_vec()
    );
}

#[tokio::test]
async fn test_delivery_failure() {
    let mut client = connect(FakeRelay::with_mode(DeliveryMode::Fail)).await;
    client.login().await;

    assert_eq!(send_message(&mut client, &["hello"]).await, 554);
    // envelope cleared, session continues
    assert_eq!(client.command("RCPT TO:<rcpt@example.com>").await.code, 503);
    assert_eq!(client.command("NOOP").await.code, 250);
}

#[tokio::test]
async fn test_delivery_panic_becomes_transaction_failure() {
    let mut client = connect(FakeRelay::with_mode(DeliveryMode::Panic)).await;
    client.login().await;

    let reply = {
        assert_eq!(client.command("MAIL FROM:<sender@contoso.com>").await.code, 250);
        assert_eq!(client.command("RCPT TO:<rcpt@example.com>").await.code, 250);
        assert_eq!(client.command("DATA").await.code, 354);
        client.send("hello").await;
        client.command(".").await
    };
    assert_eq!(reply.code, 554);
    assert_eq!(reply.text(), "Transaction failed");
    assert_eq!(client.command("NOOP").await.code, 250);
}

#[tokio::test]
async fn test_declared_size_too_large() {
    let mut client = connect(FakeRelay::default()).await;
    client.login().await;

    let reply = client
        .command("MAIL FROM:<sender@contoso.com> SIZE=4096")
        .await;
    assert_eq!(reply.code, 552);
    assert_eq!(reply.text(), "Message size exceeds fixed limit");

    assert_eq!(
        client.command("MAIL FROM:<sender@contoso.com> SIZE=100").await.code,
        250
    );
}

#[tokio::test]
async fn test_body_too_large() {
    let relay = FakeRelay::default();
    let mut client = connect(relay.clone()).await;
    client.login().await;

    let line = "x".repeat(200);
    let body: Vec<&str> = std::iter::repeat_n(line.as_str(), 10).collect();
    assert_eq!(send_message(&mut client, &body).await, 552);
    assert!(relay.delivered().is_empty());

    assert_eq!(send_message(&mut client, &["small"]).await, 250);
}

#[tokio::test]
async fn test_rset_keeps_authentication() {
    let mut client = connect(FakeRelay::default()).await;
    client.login().await;

    assert_eq!(client.command("MAIL FROM:<sender@contoso.com>").await.code, 250);
    assert_eq!(client.command("RSET").await.code, 250);
    assert_eq!(client.command("RCPT TO:<rcpt@example.com>").await.code, 503);
    assert_eq!(client.command("MAIL FROM:<sender@contoso.com>").await.code, 250);
}

#[tokio::test]
async fn test_sequence_errors() {
    let mut client = connect(FakeRelay::default()).await;
    client.login().await;

    assert_eq!(client.command("RCPT TO:<rcpt@example.com>").await.code, 503);
    assert_eq!(client.command("DATA").await.code, 503);
    assert_eq!(client.command("MAIL FROM:<sender@contoso.com>").await.code, 250);
    assert_eq!(client.command("MAIL FROM:<sender@contoso.com>").await.code, 503);
    assert_eq!(client.command("DATA").await.code, 503);
}

#[tokio::test]
async fn test_bad_addresses() {
    let mut client = connect(FakeRelay::default()).await;
    client.login().await;

    assert_eq!(client.command("MAIL FROM:<>").await.code, 501);
    assert_eq!(client.command("MAIL FROM:<not-an-address>").await.code, 501);
    assert_eq!(client.command("MAIL TO:<a@b.com>").await.code, 501);
}

#[tokio::test]
async fn test_misc_commands() {
    let mut client = connect(FakeRelay::default()).await;

    let reply = client.command("FOO bar").await;
    assert_eq!(reply.code, 500);
    assert_eq!(reply.text(), "Command not recognized");

    assert_eq!(client.command("VRFY someone").await.code, 252);
    assert_eq!(client.command("HELP").await.code, 214);
    assert_eq!(client.command("NOOP").await.code, 250);

    let reply = client.command("STARTTLS").await;
    assert_eq!(reply.code, 454);
    assert_eq!(reply.text(), "TLS not available");
}

#[tokio::test]
async fn test_line_too_long() {
    let mut client = connect(FakeRelay::default()).await;

    let reply = client.command(&format!("NOOP {}", "x".repeat(1100))).await;
    assert_eq!(reply.code, 500);
    assert_eq!(reply.text(), "Line too long");
    assert_eq!(client.command("NOOP").await.code, 250);
}

#[tokio::test]
async fn test_quit() {
    let (mut client, task) = start(config(), FakeRelay::default());
    client.reply().await;

    let reply = client.command("QUIT").await;
    assert_eq!(reply.code, 221);
    assert_eq!(reply.text(), "Bye");
    assert!(client.try_reply().await.is_none());
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_client_disconnect_ends_session() {
    let (mut client, task) = start(config(), FakeRelay::default());
    client.reply().await;
    client.login().await;
    drop(client);

    assert!(task.await.unwrap().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_idle_timeout() {
    let config = config().with_session_timeout(Duration::from_secs(30));
    let (mut client, task) = start(config, FakeRelay::default());
    client.reply().await;

    let reply = client.reply().await;
    assert_eq!(reply.code, 421);
    assert_eq!(reply.text(), "Timeout, closing connection");
    assert!(task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_require_tls_without_tls_has_no_effect() {
    let (mut client, _task) = start(config().with_require_tls(true), FakeRelay::default());
    client.reply().await;
    client.login().await;
    assert_eq!(client.command("MAIL FROM:<sender@contoso.com>").await.code, 250);
}
