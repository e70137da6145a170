//! End-to-end tests of the blob wire protocol against the real router.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::util::ServiceExt;

use blobvault_api::{create_router, AppState};
use blobvault_auth::{CredentialResolver, DbCredentials, JwtManager};
use blobvault_core::BlobService;
use blobvault_db::{Database, NewUser};
use blobvault_storage::{digest_bytes, InMemoryStore};

struct TestServer {
    router: Router,
    key_a: String,
    key_b: String,
}

async fn server() -> TestServer {
    let db = Database::new_in_memory().await.unwrap();

    let a = db
        .insert_user(NewUser {
            name: "alice".to_string(),
            quota: None,
        })
        .await
        .unwrap();
    let b = db
        .insert_user(NewUser {
            name: "bob".to_string(),
            quota: None,
        })
        .await
        .unwrap();
    let key_a = db.create_api_key(a.id, None).await.unwrap().key;
    let key_b = db.create_api_key(b.id, None).await.unwrap().key;

    let backend = Arc::new(InMemoryStore::default());
    let service = Arc::new(BlobService::new(db.clone(), backend));
    let resolver: Arc<dyn CredentialResolver> = Arc::new(DbCredentials::new(
        db.clone(),
        JwtManager::new("test-secret", 1),
    ));
    let state = AppState::new(db, service, resolver);

    TestServer {
        router: create_router(state, None),
        key_a,
        key_b,
    }
}

impl TestServer {
    async fn request(
        &self,
        method: &str,
        uri: &str,
        key: Option<&str>,
        body: &'static [u8],
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header("authorization", format!("Bearer {}", key));
        }
        let response = self
            .router
            .clone()
            .oneshot(builder.body(Body::from(body)).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }
}

#[tokio::test]
async fn put_then_get_round_trip() {
    let server = server().await;
    let digest = digest_bytes(b"hello wire");
    let uri = format!("/blob/{}", digest);

    let (status, body) = server
        .request("PUT", &uri, Some(&server.key_a), b"hello wire")
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["digest"], digest.to_string());
    assert_eq!(json["content_length"], 10);
    assert_eq!(json["created"], true);

    // Second PUT of the same content is a 200, not a 201.
    let (status, _) = server
        .request("PUT", &uri, Some(&server.key_a), b"hello wire")
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server.request("GET", &uri, Some(&server.key_a), b"").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"hello wire");

    let (status, body) = server
        .request("GET", &format!("{}/info", uri), Some(&server.key_a), b"")
        .await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["content_length"], 10);
}

#[tokio::test]
async fn digest_mismatch_is_rejected() {
    let server = server().await;
    let wrong = digest_bytes(b"not the payload");
    let uri = format!("/blob/{}", wrong);

    let (status, _) = server
        .request("PUT", &uri, Some(&server.key_a), b"the payload")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nothing was claimed.
    let (status, _) = server.request("GET", &uri, Some(&server.key_a), b"").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_digest_is_a_bad_request() {
    let server = server().await;
    let (status, _) = server
        .request("PUT", "/blob/deadbeef", Some(&server.key_a), b"x")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_or_bad_credentials_are_unauthorized() {
    let server = server().await;
    let digest = digest_bytes(b"secret");
    let uri = format!("/blob/{}", digest);

    let (status, _) = server.request("GET", &uri, None, b"").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = server.request("GET", &uri, Some("bogus-key"), b"").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Health needs no credential.
    let (status, _) = server.request("GET", "/health", None, b"").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn refcounted_delete_between_users() {
    let server = server().await;
    let digest = digest_bytes(b"shared blob");
    let uri = format!("/blob/{}", digest);

    for key in [&server.key_a, &server.key_b] {
        let (status, _) = server.request("PUT", &uri, Some(key), b"shared blob").await;
        assert!(status.is_success());
    }

    // Alice deletes; Bob still reads.
    let (status, _) = server.request("DELETE", &uri, Some(&server.key_a), b"").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = server.request("GET", &uri, Some(&server.key_b), b"").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"shared blob");

    // Bob deletes the last claim; the blob is gone for everyone.
    let (status, _) = server.request("DELETE", &uri, Some(&server.key_b), b"").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = server.request("GET", &uri, Some(&server.key_b), b"").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = server.request("DELETE", &uri, Some(&server.key_b), b"").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn public_blob_visibility() {
    let server = server().await;
    let digest = digest_bytes(b"for everyone");
    let uri = format!("/blob/{}?is_public=true", digest);

    let (status, _) = server
        .request("PUT", &uri, Some(&server.key_a), b"for everyone")
        .await;
    assert_eq!(status, StatusCode::CREATED);

    // Bob can read it without a claim of his own.
    let (status, body) = server
        .request("GET", &format!("/blob/{}", digest), Some(&server.key_b), b"")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"for everyone");

    // But it is only in Alice's claim list.
    let (_, body) = server.request("GET", "/blob", Some(&server.key_b), b"").await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["blobs"].as_array().unwrap().len(), 0);

    let (_, body) = server.request("GET", "/blob", Some(&server.key_a), b"").await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["blobs"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn user_endpoint_reports_usage() {
    let server = server().await;
    let digest = digest_bytes(b"12345");
    let (status, _) = server
        .request(
            "PUT",
            &format!("/blob/{}", digest),
            Some(&server.key_a),
            b"12345",
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = server.request("GET", "/user", Some(&server.key_a), b"").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["name"], "alice");
    assert_eq!(json["usage"], 5);
    assert!(json["quota"].is_null());
}

#[tokio::test]
async fn zero_byte_blob() {
    let server = server().await;
    let digest = digest_bytes(b"");
    assert_eq!(
        digest.to_string(),
        "af1349b9f5f9a1a6a0404dee36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
    );
    let uri = format!("/blob/{}", digest);

    let (status, _) = server.request("PUT", &uri, Some(&server.key_a), b"").await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = server.request("GET", &uri, Some(&server.key_a), b"").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
}
