#![cfg(feature = "r2")]

use httpmock::prelude::*;
use httpmock::Method::HEAD;
use media_reconcile::adapters::storage::r2::R2Storage;
use media_reconcile::config::R2Config;
use media_reconcile::domain::ports::Storage;

async fn storage(server: &MockServer) -> R2Storage {
    let config = R2Config {
        account_id: "acct".to_string(),
        access_key_id: "AKIDEXAMPLE".to_string(),
        secret_access_key: "secret".to_string(),
        bucket: "natural-media".to_string(),
        public_url: "https://media.example.com".to_string(),
        endpoint: Some(server.base_url()),
        region: "auto".to_string(),
    };
    R2Storage::connect(&config).await.unwrap()
}

#[tokio::test]
async fn test_head_object_existence() {
    let server = MockServer::start();
    let head = server.mock(|when, then| {
        when.method(HEAD).path("/natural-media/products/honey.jpg");
        then.status(200)
            .header("Content-Length", "5")
            .header("Content-Type", "image/jpeg");
    });
    server.mock(|when, then| {
        when.method(HEAD).path("/natural-media/products/ghost.jpg");
        then.status(404);
    });
    server.mock(|when, then| {
        when.method(HEAD).path("/natural-media/products/forbidden.jpg");
        then.status(403);
    });

    let storage = storage(&server).await;

    assert!(storage.exists("products/honey.jpg").await.unwrap());
    head.assert();
    assert!(!storage.exists("products/ghost.jpg").await.unwrap());

    let err = storage.exists("products/forbidden.jpg").await.unwrap_err();
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_put_object_returns_public_url() {
    let server = MockServer::start();
    let put = server.mock(|when, then| {
        when.method(PUT)
            .path("/natural-media/products/raw-honey.jpg")
            .header("content-type", "image/jpeg")
            .header("cache-control", "public, max-age=31536000, immutable")
            .body("jpeg-bytes");
        then.status(200).header("ETag", "\"abc\"");
    });

    let storage = storage(&server).await;
    let url = storage
        .put("products/raw-honey.jpg", b"jpeg-bytes", "image/jpeg")
        .await
        .unwrap();

    put.assert();
    assert_eq!(url, "https://media.example.com/products/raw-honey.jpg");
    assert_eq!(
        storage.key_for_url(&format!("{}/natural-media/products/raw-honey.jpg", server.base_url())),
        Some("products/raw-honey.jpg".to_string())
    );
}
