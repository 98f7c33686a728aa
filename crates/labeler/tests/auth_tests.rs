//! Client-credentials exchange against a mock token endpoint.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeEngine, CLIENT_ID, CLIENT_SECRET, TENANT_ID};
use labeler::engine::{AuthDelegate, TokenRequest};
use labeler::{
    AuthError, CredentialProvider, Labeler, LabelerError, MinTlsVersion, ProxyMode,
    TransportFactory,
};
use serde_json::json;
use tempfile::TempDir;
use tokio::task::JoinSet;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RESOURCE: &str = "https://syncservice.o365syncservice.com";

fn token_path() -> String {
    format!("/{TENANT_ID}/oauth2/v2.0/token")
}

fn provider(server: &MockServer) -> CredentialProvider {
    let transport = TransportFactory::new(
        ProxyMode::Disabled,
        MinTlsVersion::Tls12,
        Duration::from_secs(5),
    )
    .build()
    .unwrap();
    CredentialProvider::new(Arc::new(common::config()), server.uri(), transport)
}

async fn mount_token(server: &MockServer, token: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path(token_path()))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains(format!("client_id={CLIENT_ID}")))
        .and(body_string_contains("scope=https%3A%2F%2Fsyncservice.o365syncservice.com%2F.default"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": 3599,
            "access_token": token,
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_token_acquired_with_client_credentials() {
    let server = MockServer::start().await;
    mount_token(&server, "token-abc", 1).await;

    let provider = provider(&server);
    let token = provider
        .acquire_token(&TokenRequest::new(RESOURCE, ""))
        .await
        .unwrap();

    assert_eq!(token, "token-abc");
    assert_eq!(provider.builds(), 1);
}

#[tokio::test]
async fn test_client_reused_but_token_requested_every_call() {
    let server = MockServer::start().await;
    mount_token(&server, "token-abc", 3).await;

    let provider = provider(&server);
    for _ in 0..3 {
        provider.token_for(RESOURCE, "").await.unwrap();
    }
    assert_eq!(provider.builds(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_build_client_once() {
    let server = MockServer::start().await;
    mount_token(&server, "token-abc", 12).await;

    let provider = Arc::new(provider(&server));
    let mut tasks = JoinSet::new();
    for _ in 0..12 {
        let provider = Arc::clone(&provider);
        tasks.spawn(async move { provider.token_for(RESOURCE, "").await });
    }
    while let Some(result) = tasks.join_next().await {
        assert_eq!(result.unwrap().unwrap(), "token-abc");
    }
    assert_eq!(provider.builds(), 1);
}

#[tokio::test]
async fn test_rejection_is_authentication_failed_with_masked_ids() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(token_path()))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
            "error_description": "AADSTS7000215: Invalid client secret provided.",
            "correlation_id": "c0ffee",
        })))
        .mount(&server)
        .await;

    let err = provider(&server).token_for(RESOURCE, "").await.unwrap_err();
    match &err {
        LabelerError::AuthenticationFailed {
            resource,
            tenant_id,
            client_id,
            source,
        } => {
            assert_eq!(resource, RESOURCE);
            assert_eq!(tenant_id, "1111…1111");
            assert_eq!(client_id, "2222…2222");
            assert!(matches!(
                source,
                AuthError::Rejected { status: 401, error, .. } if error == "invalid_client"
            ));
        }
        other => panic!("unexpected error: {other}"),
    }

    let rendered = format!("{err} {err:?}");
    assert!(!rendered.contains(CLIENT_SECRET));
    assert!(!rendered.contains(CLIENT_ID));
}

#[tokio::test]
async fn test_malformed_success_body_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(token_path()))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>captive portal</html>"))
        .mount(&server)
        .await;

    let err = provider(&server).token_for(RESOURCE, "").await.unwrap_err();
    assert!(matches!(
        err,
        LabelerError::AuthenticationFailed {
            source: AuthError::InvalidResponse(_),
            ..
        }
    ));
}

#[tokio::test]
async fn test_engine_supplied_authority_is_used() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/other-tenant/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "token-other",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token = provider(&server)
        .token_for(RESOURCE, &format!("{}/other-tenant", server.uri()))
        .await
        .unwrap();
    assert_eq!(token, "token-other");
}

#[tokio::test]
async fn test_bootstrap_authenticates_through_credential_provider() {
    let server = MockServer::start().await;
    mount_token(&server, "token-from-bootstrap", 1).await;

    let cache = TempDir::new().unwrap();
    let engine = FakeEngine::new();
    *engine.token_resource.lock().unwrap() = Some(RESOURCE.to_string());
    let mut settings = common::settings(cache.path());
    settings.authority_host = server.uri();

    let labeler = Labeler::create(engine.shared(), common::config(), settings).unwrap();
    labeler.warm_up().await.unwrap();

    assert_eq!(
        engine.last_token.lock().unwrap().as_deref(),
        Some("token-from-bootstrap")
    );
}

#[tokio::test]
async fn test_bootstrap_auth_failure_surfaces_as_initialization_failed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "unauthorized_client",
        })))
        .mount(&server)
        .await;

    let cache = TempDir::new().unwrap();
    let engine = FakeEngine::new();
    *engine.token_resource.lock().unwrap() = Some(RESOURCE.to_string());
    let mut settings = common::settings(cache.path());
    settings.authority_host = server.uri();

    let labeler = Labeler::create(engine.shared(), common::config(), settings).unwrap();
    let err = labeler.warm_up().await.unwrap_err();

    assert!(matches!(
        err,
        LabelerError::InitializationFailed {
            step: labeler::BootstrapStep::AddEngine,
            ..
        }
    ));
    assert!(err.to_string().contains("unauthorized_client"));
}
