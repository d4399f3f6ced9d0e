use media_reconcile::adapters::storage::local_storage;
use media_reconcile::config::{AppConfig, UploadConfig};
use media_reconcile::domain::model::StorageBackend;
use media_reconcile::domain::ports::Storage;
use media_reconcile::utils::retry::RetryPolicy;
use media_reconcile::{MediaUploader, ReconcileError};
use tempfile::TempDir;

fn local_config(dir: &TempDir) -> AppConfig {
    let toml = format!(
        r#"
[storage]
backend = "local"

[storage.local]
public_dir = "{}"
upload_subdir = "uploads"
url_prefix = "/uploads"

[upload]
folder = "cms"
max_bytes = 1024
"#,
        dir.path().join("public").display().to_string().replace('\\', "/")
    );
    AppConfig::from_toml_str(&toml).unwrap()
}

#[tokio::test]
async fn test_upload_file_from_disk() {
    let dir = TempDir::new().unwrap();
    let config = local_config(&dir);
    assert_eq!(config.storage.backend, StorageBackend::Local);

    let source = dir.path().join("Spring Sale Banner.webp");
    std::fs::write(&source, b"webp-bytes").unwrap();

    let uploader = MediaUploader::new(
        local_storage(&config.storage),
        config.upload.clone(),
        RetryPolicy::no_retry(),
    );
    let media = uploader.upload_file(&source).await.unwrap();

    assert_eq!(media.content_type, "image/webp");
    assert_eq!(media.size, 10);
    assert!(media.key.starts_with("cms/"));
    assert!(media.key.ends_with("-Spring-Sale-Banner.webp"));
    assert_eq!(media.url, format!("/uploads/{}", media.key));
    assert!(uploader.storage().exists(&media.key).await.unwrap());
    assert_eq!(
        std::fs::read(dir.path().join("public/uploads").join(&media.key)).unwrap(),
        b"webp-bytes"
    );
}

#[tokio::test]
async fn test_upload_limits_come_from_config() {
    let dir = TempDir::new().unwrap();
    let config = local_config(&dir);
    let uploader = MediaUploader::new(
        local_storage(&config.storage),
        config.upload.clone(),
        RetryPolicy::no_retry(),
    );

    let big = vec![0u8; 2048];
    let err = uploader.upload("poster.png", &big, None).await.unwrap_err();
    assert!(matches!(err, ReconcileError::UploadRejected { .. }));

    let strict = MediaUploader::new(
        local_storage(&config.storage),
        UploadConfig {
            allowed_types: vec!["image/png".to_string()],
            ..config.upload.clone()
        },
        RetryPolicy::no_retry(),
    );
    assert!(strict.upload("logo.png", b"png", None).await.is_ok());
    assert!(strict.upload("logo.jpg", b"jpg", None).await.is_err());
    assert!(strict
        .upload("logo", b"png", Some("image/png; charset=binary"))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let config = local_config(&dir);
    let uploader = MediaUploader::new(
        local_storage(&config.storage),
        config.upload,
        RetryPolicy::no_retry(),
    );

    let err = uploader
        .upload_file(&dir.path().join("nope.png"))
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::IoError(_)));
}
