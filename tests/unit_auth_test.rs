// tests/unit_auth_test.rs

#[path = "helpers/mod.rs"]
mod helpers;

use helpers::{FakeTransport, IDENTITY_ENDPOINT, authenticator};
use otter::core::auth::{Credentials, IdentityClient};
use otter::core::errors::OtterError;
use serde_json::json;
use url::Url;

fn identity_url() -> String {
    format!("{IDENTITY_ENDPOINT}/tokens")
}

#[tokio::test]
async fn test_cached_session_avoids_second_exchange() {
    let transport = FakeTransport::new();
    helpers::stub_identity(&transport, "tok-1");
    let auth = authenticator(transport.clone());

    let first = auth.authenticate("777").await.unwrap();
    let second = auth.authenticate("777").await.unwrap();
    assert_eq!(first.token, "tok-1");
    assert_eq!(second.token, "tok-1");
    assert_eq!(transport.count_requests("POST", &identity_url()), 1);
}

#[tokio::test]
async fn test_invalidate_forces_fresh_exchange() {
    let transport = FakeTransport::new();
    transport.stub("POST", &identity_url(), 200, helpers::token_response("tok-1"));
    transport.stub("POST", &identity_url(), 200, helpers::token_response("tok-2"));
    let auth = authenticator(transport.clone());

    assert_eq!(auth.authenticate("777").await.unwrap().token, "tok-1");
    auth.invalidate("777").await;
    assert_eq!(auth.authenticate("777").await.unwrap().token, "tok-2");
    assert_eq!(transport.count_requests("POST", &identity_url()), 2);
}

#[tokio::test]
async fn test_concurrent_authentications_coalesce() {
    let transport = FakeTransport::new();
    helpers::stub_identity(&transport, "tok-1");
    let auth = authenticator(transport.clone());

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let auth = auth.clone();
            tokio::spawn(async move { auth.authenticate("777").await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap().token, "tok-1");
    }
    // All sixteen callers coalesced onto a single upstream exchange.
    assert_eq!(transport.count_requests("POST", &identity_url()), 1);
}

#[tokio::test]
async fn test_rejected_credentials_are_fatal() {
    let transport = FakeTransport::new();
    transport.stub("POST", &identity_url(), 401, json!({ "unauthorized": {} }));
    let auth = authenticator(transport.clone());

    let err = auth.authenticate("777").await.unwrap_err();
    assert!(matches!(err, OtterError::AuthenticationFailed(_)));
}

#[tokio::test]
async fn test_identity_5xx_is_unavailable_not_failed() {
    let transport = FakeTransport::new();
    transport.stub("POST", &identity_url(), 503, json!({}));
    let auth = authenticator(transport.clone());

    let err = auth.authenticate("777").await.unwrap_err();
    assert!(matches!(err, OtterError::AuthenticationUnavailable(_)));
}

#[tokio::test]
async fn test_identity_transport_error_is_unavailable() {
    // No identity route stubbed at all.
    let transport = FakeTransport::new();
    let auth = authenticator(transport.clone());

    let err = auth.authenticate("777").await.unwrap_err();
    assert!(matches!(err, OtterError::AuthenticationUnavailable(_)));
}

#[tokio::test]
async fn test_catalog_lookup_by_name_and_region() {
    let transport = FakeTransport::new();
    helpers::stub_identity(&transport, "tok-1");
    let auth = authenticator(transport.clone());

    let session = auth.authenticate("777").await.unwrap();
    let endpoint = session
        .catalog
        .public_endpoint("cloudServersOpenStack", "ORD")
        .unwrap();
    assert_eq!(endpoint.as_str(), helpers::COMPUTE_URL);

    let err = session
        .catalog
        .public_endpoint("cloudServersOpenStack", "SYD")
        .unwrap_err();
    assert!(matches!(err, OtterError::NoSuchEndpoint { .. }));
}

#[tokio::test]
async fn test_password_strategy_payload_shape() {
    let transport = FakeTransport::new();
    helpers::stub_identity(&transport, "tok-1");
    let identity = IdentityClient::new(
        transport.clone(),
        Url::parse(IDENTITY_ENDPOINT).unwrap(),
        Credentials::Password {
            username: "otter".to_string(),
            password: "hunter2".to_string(),
        },
    );
    identity.authenticate("777").await.unwrap();

    let sent = transport.requests();
    let body = sent[0].body.as_ref().unwrap();
    assert_eq!(body["auth"]["passwordCredentials"]["username"], "otter");
    assert_eq!(body["auth"]["tenantId"], "777");
}

#[tokio::test]
async fn test_apikey_strategy_payload_shape() {
    let transport = FakeTransport::new();
    helpers::stub_identity(&transport, "tok-1");
    let identity = IdentityClient::new(
        transport.clone(),
        Url::parse(IDENTITY_ENDPOINT).unwrap(),
        Credentials::ApiKey {
            username: "otter".to_string(),
            api_key: "secret".to_string(),
        },
    );
    identity.authenticate("777").await.unwrap();

    let sent = transport.requests();
    let body = sent[0].body.as_ref().unwrap();
    assert_eq!(
        body["auth"]["RAX-KSKEY:apiKeyCredentials"]["apiKey"],
        "secret"
    );
}
