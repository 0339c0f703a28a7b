// SPDX-License-Identifier: AGPL-3.0-or-later

//! Key set cache behavior against a mock JWKS endpoint.

mod common;

use jsonwebtoken::{Algorithm, Header};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use jwt_identity::{AuthError, KeySetCache};

use common::{jwks_document, TEST_KID};

fn rs256_header(kid: &str) -> Header {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    header
}

async fn mock_jwks(server: &MockServer, template: ResponseTemplate, expected_fetches: u64) {
    Mock::given(method("GET"))
        .and(path("/.well-known/jwks.json"))
        .respond_with(template)
        .expect(expected_fetches)
        .mount(server)
        .await;
}

fn cache_for(server: &MockServer) -> KeySetCache {
    KeySetCache::new(Some(format!("{}/.well-known/jwks.json", server.uri())))
}

#[tokio::test]
async fn resolves_matching_kid() {
    let server = MockServer::start().await;
    mock_jwks(
        &server,
        ResponseTemplate::new(200).set_body_json(jwks_document(TEST_KID, Some("RS256"))),
        1,
    )
    .await;

    let cache = cache_for(&server);
    let resolved = cache.resolve(&rs256_header(TEST_KID)).await.unwrap();
    assert!(resolved.is_some());
    assert!(cache.is_cached().await);
}

#[tokio::test]
async fn unknown_kid_falls_through() {
    let server = MockServer::start().await;
    mock_jwks(
        &server,
        ResponseTemplate::new(200).set_body_json(jwks_document(TEST_KID, Some("RS256"))),
        1,
    )
    .await;

    let cache = cache_for(&server);
    let resolved = cache.resolve(&rs256_header("some-other-kid")).await.unwrap();
    assert!(resolved.is_none());
}

#[tokio::test]
async fn declared_algorithm_mismatch_is_fatal() {
    let server = MockServer::start().await;
    mock_jwks(
        &server,
        ResponseTemplate::new(200).set_body_json(jwks_document(TEST_KID, Some("RS512"))),
        1,
    )
    .await;

    let cache = cache_for(&server);
    let err = cache.resolve(&rs256_header(TEST_KID)).await.unwrap_err();
    assert!(matches!(err, AuthError::AlgorithmMismatch));
}

#[tokio::test]
async fn entry_without_declared_algorithm_is_accepted() {
    let server = MockServer::start().await;
    mock_jwks(
        &server,
        ResponseTemplate::new(200).set_body_json(jwks_document(TEST_KID, None)),
        1,
    )
    .await;

    let cache = cache_for(&server);
    let resolved = cache.resolve(&rs256_header(TEST_KID)).await.unwrap();
    assert!(resolved.is_some());
}

#[tokio::test]
async fn concurrent_cold_lookups_fetch_once() {
    let server = MockServer::start().await;
    mock_jwks(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(jwks_document(TEST_KID, Some("RS256")))
            .set_delay(std::time::Duration::from_millis(50)),
        1,
    )
    .await;

    let cache = cache_for(&server);
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let cache = cache.clone();
        tasks.push(tokio::spawn(async move {
            cache.resolve(&rs256_header(TEST_KID)).await
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap().unwrap().is_some());
    }
    // The mock's expect(1) verifies at most one outbound fetch on drop.
}

#[tokio::test]
async fn successful_empty_fetch_is_cached_for_the_process() {
    let server = MockServer::start().await;
    mock_jwks(
        &server,
        ResponseTemplate::new(200).set_body_json(serde_json::json!({ "keys": [] })),
        1,
    )
    .await;

    let cache = cache_for(&server);
    for _ in 0..3 {
        let resolved = cache.resolve(&rs256_header(TEST_KID)).await.unwrap();
        assert!(resolved.is_none());
    }
    assert!(cache.is_cached().await);
}

#[tokio::test]
async fn fetch_failure_fails_fast_within_backoff() {
    let server = MockServer::start().await;
    mock_jwks(
        &server,
        ResponseTemplate::new(500).set_body_string("Internal Server Error"),
        1,
    )
    .await;

    let cache = cache_for(&server);
    let err = cache.resolve(&rs256_header(TEST_KID)).await.unwrap_err();
    assert!(matches!(err, AuthError::KeySetUnavailable(_)));

    // Within the backoff window the cache does not go back to the network.
    let err = cache.resolve(&rs256_header(TEST_KID)).await.unwrap_err();
    assert!(matches!(err, AuthError::KeySetUnavailable(_)));
    assert!(!cache.is_cached().await);
}
