//! Certificate retrieval from a mock Key Vault.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use graphrelay_core::{KeyVault, TlsError};
use graphrelay_oauth::{Authority, Credential};
use secrecy::SecretString;
use serde_json::json;
use url::Url;
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// EC P-256 key and self-signed `relay.test` certificate, empty password.
const PFX: &str = include_str!("fixtures/relay.pfx.b64");

const TOKEN_PATH: &str = "/11111111-1111-1111-1111-111111111111/oauth2/v2.0/token";

fn credential() -> Credential {
    Credential::new(
        Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap(),
        Uuid::parse_str("33333333-3333-3333-3333-333333333333").unwrap(),
        SecretString::from("vault-secret".to_string()),
    )
}

fn vault(server: &MockServer) -> KeyVault {
    KeyVault::new(Url::parse(&server.uri()).unwrap(), Duration::from_secs(5))
        .unwrap()
        .with_authority(Authority::new(server.uri()).unwrap())
}

fn pem_bundle() -> String {
    let certified = rcgen::generate_simple_self_signed(vec!["relay.test".to_string()]).unwrap();
    format!("{}{}", certified.key_pair.serialize_pem(), certified.cert.pem())
}

async fn mount_secret(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("scope=https%3A%2F%2Fvault.azure.net%2F.default"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "access_token": "vault-token"
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/secrets/smtp-cert"))
        .and(query_param("api-version", "7.4"))
        .and(header("authorization", "Bearer vault-token"))
        .respond_with(response)
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_pem_secret() {
    let server = MockServer::start().await;
    mount_secret(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({
            "value": pem_bundle(),
            "contentType": "application/x-pem-file",
            "id": "https://relay.vault.azure.net/secrets/smtp-cert/abc"
        })),
    )
    .await;

    assert!(vault(&server).load("smtp-cert", &credential()).await.is_ok());
}

#[tokio::test]
async fn test_pem_without_content_type() {
    let server = MockServer::start().await;
    mount_secret(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "value": pem_bundle() })),
    )
    .await;

    assert!(vault(&server).load("smtp-cert", &credential()).await.is_ok());
}

#[tokio::test]
async fn test_pkcs12_secret() {
    let server = MockServer::start().await;
    mount_secret(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({
            "value": PFX.trim(),
            "contentType": "application/x-pkcs12"
        })),
    )
    .await;

    assert!(vault(&server).load("smtp-cert", &credential()).await.is_ok());
}

#[tokio::test]
async fn test_pkcs12_without_content_type() {
    let server = MockServer::start().await;
    mount_secret(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({ "value": PFX.trim() })),
    )
    .await;

    assert!(vault(&server).load("smtp-cert", &credential()).await.is_ok());
}

#[tokio::test]
async fn test_pkcs12_not_base64() {
    let server = MockServer::start().await;
    mount_secret(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({
            "value": "not base64 at all!",
            "contentType": "application/x-pkcs12"
        })),
    )
    .await;

    let err = vault(&server).load("smtp-cert", &credential()).await.err().unwrap();
    assert!(matches!(err, TlsError::Pkcs12 { .. }));
}

#[tokio::test]
async fn test_unknown_content_type() {
    let server = MockServer::start().await;
    mount_secret(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({
            "value": "opaque",
            "contentType": "application/octet-stream"
        })),
    )
    .await;

    let err = vault(&server).load("smtp-cert", &credential()).await.err().unwrap();
    assert!(matches!(err, TlsError::UnsupportedFormat(ref t) if t == "application/octet-stream"));
}

#[tokio::test]
async fn test_access_denied() {
    let server = MockServer::start().await;
    mount_secret(
        &server,
        ResponseTemplate::new(403).set_body_string("Forbidden"),
    )
    .await;

    let err = vault(&server).load("smtp-cert", &credential()).await.err().unwrap();
    assert!(matches!(err, TlsError::VaultRejected { status: 403, .. }));
}

#[tokio::test]
async fn test_token_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = vault(&server).load("smtp-cert", &credential()).await.err().unwrap();
    assert!(matches!(err, TlsError::VaultAuth(_)));
}
