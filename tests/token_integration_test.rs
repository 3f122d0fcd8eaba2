//! Integration tests for token mirroring and refresh.
//!
//! These tests verify:
//! - Mirror-first resolution with identity fallback and write-back
//! - Refresh-token exchange against a mock identity service
//! - The executor recovering from 401 through the mirrored provider

mod common;

use common::*;
use portal_sync::adapters::{FileTokenStore, InMemoryTokenStore, MockIdentity};
use portal_sync::auth::{MirroredTokenProvider, RefreshTokenIdentity, StoredToken};
use portal_sync::{AuthenticatedExecutor, IdentityProvider, RequestOptions, TokenProvider, TokenStore};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn temp_store() -> (TempDir, FileTokenStore) {
    let dir = TempDir::new().unwrap();
    let store = FileTokenStore::at_path(dir.path().join("nested").join("token.json"));
    (dir, store)
}

#[tokio::test]
async fn test_mirror_is_used_before_identity() {
    let store = InMemoryTokenStore::with_token(StoredToken::new("mirrored"));
    let identity = MockIdentity::with_tokens(vec!["issued"]);
    let provider = MirroredTokenProvider::new(store, identity);

    assert_eq!(provider.resolve_token(false).await.unwrap(), Some("mirrored".to_string()));
    assert_eq!(provider.identity().call_count(), 0);

    assert_eq!(provider.resolve_token(true).await.unwrap(), Some("issued".to_string()));
    assert_eq!(provider.identity().forced_calls(), 1);
    assert_eq!(provider.store().get().unwrap().access_token, "issued");
}

#[tokio::test]
async fn test_invalidate_clears_file_mirror() {
    let (_dir, store) = temp_store();
    store.save(&StoredToken::new("old")).await.unwrap();
    let provider = MirroredTokenProvider::new(store, MockIdentity::signed_out());

    provider.invalidate().await.unwrap();
    assert!(provider.store().load().await.unwrap().is_none());
    assert_eq!(provider.resolve_token(false).await.unwrap(), None);
}

#[tokio::test]
async fn test_refresh_token_identity_rotates_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({"refresh_token": "r1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access-1",
            "refresh_token": "r2",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let identity = RefreshTokenIdentity::new(server.uri(), "r1");
    assert_eq!(identity.id_token(false).await.unwrap(), Some("access-1".to_string()));
    assert_eq!(identity.refresh_token(), Some("r2".to_string()));

    // The access token is reused until a refresh is forced
    assert_eq!(identity.id_token(false).await.unwrap(), Some("access-1".to_string()));
}

#[tokio::test]
async fn test_concurrent_forced_refreshes_share_one_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({"refresh_token": "r1"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "a1", "refresh_token": "r2"}))
                .set_delay(std::time::Duration::from_millis(50)),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    // A rotated-away refresh token is rejected
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({"refresh_token": "r1"})))
        .respond_with(ResponseTemplate::new(401))
        .expect(0)
        .mount(&server)
        .await;

    let identity = RefreshTokenIdentity::new(server.uri(), "r1");
    let (a, b) = tokio::join!(identity.id_token(true), identity.id_token(true));

    assert_eq!(a.unwrap(), Some("a1".to_string()));
    assert_eq!(b.unwrap(), Some("a1".to_string()));
    assert_eq!(identity.refresh_token(), Some("r2".to_string()));
    assert_eq!(identity.id_token(false).await.unwrap(), Some("a1".to_string()));
}

#[tokio::test]
async fn test_refresh_token_rejected_ends_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let identity = RefreshTokenIdentity::new(server.uri(), "revoked");
    assert_eq!(identity.id_token(true).await.unwrap(), None);
}

#[tokio::test]
async fn test_executor_recovers_through_mirrored_provider() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/stats"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/stats"))
        .and(header("authorization", "Bearer renewed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let (_dir, store) = temp_store();
    store.save(&StoredToken::new("stale")).await.unwrap();
    let provider = MirroredTokenProvider::new(store, MockIdentity::with_tokens(vec!["renewed"]));
    let executor = AuthenticatedExecutor::new(
        ReqwestHttpClient::new(),
        provider,
        test_config(&server.uri()),
    );

    let data = executor
        .execute("/api/stats", RequestOptions::get())
        .await
        .unwrap();
    assert_eq!(data, json!({"ok": true}));

    let mirrored = executor.token_provider().store().load().await.unwrap().unwrap();
    assert_eq!(mirrored.access_token, "renewed");
}
