mod common;

use common::{list, touch, MemoryRepository};
use media_reconcile::core::report::write_report_bundle;
use media_reconcile::domain::model::{ColumnKind, MediaTarget, MediaValue, StorageBackend};
use media_reconcile::domain::ports::Storage;
use media_reconcile::utils::retry::RetryPolicy;
use media_reconcile::{
    LocalFileLocator, LocalStorage, PipelineOptions, ReconcileEngine, ReconcileError,
    ReconcilePipeline, Result,
};
use std::io::Read;
use std::sync::Arc;
use tempfile::TempDir;

fn category_image() -> MediaTarget {
    MediaTarget {
        table: "Category".to_string(),
        column: "image".to_string(),
        kind: ColumnKind::Single,
        ..MediaTarget::product_images()
    }
}

fn targets() -> Vec<MediaTarget> {
    vec![MediaTarget::product_images(), category_image()]
}

/// 模擬舊站搬家後的狀態：部分檔案已在 public/uploads，部分只剩 scrap 資料夾
fn seed(dir: &TempDir) -> Arc<MemoryRepository> {
    let public = dir.path().join("public");
    let scrap = dir.path().join("scrap");
    touch(&public, "uploads/products/kept.jpg", b"kept");
    touch(&public, "uploads/products/honey.jpg", b"honey");
    touch(&scrap, "Olive-Oil.JPG", b"olive");
    touch(&scrap, "2024/1712345678901-dates.png", b"dates");

    let repo = Arc::new(MemoryRepository::new());
    let products = MediaTarget::product_images();
    repo.insert(
        &products,
        "p1",
        list(&[
            "/uploads/products/kept.jpg",
            "/images/olive-oil.jpg",
            "data:image/png;base64,AAAA",
        ]),
    );
    repo.insert(
        &products,
        "p2",
        list(&[
            "uploads\\honey.jpg",
            "https://res.cloudinary.com/demo/image/upload/v1/dates.png",
            "https://example.org/partner-logo.jpg",
        ]),
    );
    repo.insert(&products, "p3", list(&["/images/ghost.jpg"]));

    let category = category_image();
    repo.insert(
        &category,
        "c1",
        MediaValue::Single(Some("./public/uploads/products/honey.jpg".to_string())),
    );
    repo.insert(&category, "c2", MediaValue::Single(None));
    repo
}

fn storage(dir: &TempDir) -> LocalStorage {
    LocalStorage::new(dir.path().join("public"), "uploads", "/uploads")
}

fn engine_with<S: Storage>(
    dir: &TempDir,
    storage: S,
    repo: Arc<MemoryRepository>,
    dry_run: bool,
) -> ReconcileEngine<ReconcilePipeline<S, Arc<MemoryRepository>>> {
    let locator = LocalFileLocator::new(dir.path().join("public"), &[dir.path().join("scrap")]);
    let options = PipelineOptions {
        key_prefix: "products".to_string(),
        batch_size: 2,
        dry_run,
        retry: RetryPolicy::no_retry(),
        ..PipelineOptions::default()
    };
    ReconcileEngine::new(ReconcilePipeline::new(storage, repo, locator, options))
}

#[tokio::test]
async fn test_full_run_then_second_run_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let repo = seed(&dir);

    let report = engine_with(&dir, storage(&dir), repo.clone(), false)
        .run(&targets())
        .await
        .unwrap();

    assert_eq!(report.backend, StorageBackend::Local);
    assert_eq!(report.rows_updated(), 3);
    let products = &report.targets[0].counts;
    assert_eq!(products.unchanged, 1);
    assert_eq!(products.uploaded, 2);
    assert_eq!(products.rewritten, 1);
    assert_eq!(products.skipped, 2);
    assert_eq!(products.missing, 1);
    assert_eq!(report.targets[1].counts.rewritten, 1);

    let products_target = MediaTarget::product_images();
    assert_eq!(
        repo.value(&products_target, "p1").unwrap(),
        list(&[
            "/uploads/products/kept.jpg",
            "/uploads/products/images/olive-oil.jpg",
            "data:image/png;base64,AAAA",
        ])
    );
    assert_eq!(
        repo.value(&products_target, "p2").unwrap(),
        list(&[
            "/uploads/products/honey.jpg",
            "/uploads/products/dates.png",
            "https://example.org/partner-logo.jpg",
        ])
    );
    // 找不到檔案的值原封不動
    assert_eq!(
        repo.value(&products_target, "p3").unwrap(),
        list(&["/images/ghost.jpg"])
    );
    assert_eq!(
        repo.value(&category_image(), "c1").unwrap(),
        MediaValue::Single(Some("/uploads/products/honey.jpg".to_string()))
    );
    assert_eq!(
        std::fs::read(dir.path().join("public/uploads/products/images/olive-oil.jpg")).unwrap(),
        b"olive"
    );
    assert_eq!(
        std::fs::read(dir.path().join("public/uploads/products/dates.png")).unwrap(),
        b"dates"
    );

    // 第二次執行不應再寫入任何東西
    let again = engine_with(&dir, storage(&dir), repo.clone(), false)
        .run(&targets())
        .await
        .unwrap();
    assert_eq!(again.rows_updated(), 0);
    assert_eq!(repo.update_count(), 3);
    let totals = again.totals();
    assert_eq!(totals.uploaded + totals.rewritten, 0);
    assert_eq!(totals.missing, 1);
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let repo = seed(&dir);

    let report = engine_with(&dir, storage(&dir), repo.clone(), true)
        .run(&targets())
        .await
        .unwrap();

    assert!(report.dry_run);
    let totals = report.totals();
    assert_eq!(totals.would_upload, 2);
    assert_eq!(totals.would_rewrite, 2);
    assert_eq!(totals.uploaded + totals.rewritten, 0);
    assert_eq!(report.rows_updated(), 0);
    assert_eq!(repo.update_count(), 0);
    assert!(!dir.path().join("public/uploads/products/images").exists());
    assert!(!dir.path().join("public/uploads/products/dates.png").exists());
}

/// 指定的 key 一律上傳失敗
struct FlakyStorage {
    inner: LocalStorage,
    broken: &'static str,
}

impl Storage for FlakyStorage {
    fn backend(&self) -> StorageBackend {
        self.inner.backend()
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key).await
    }

    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<String> {
        if key.contains(self.broken) {
            return Err(ReconcileError::storage("local", "disk quota exceeded"));
        }
        self.inner.put(key, data, content_type).await
    }

    fn public_url(&self, key: &str) -> String {
        self.inner.public_url(key)
    }

    fn key_for_url(&self, url: &str) -> Option<String> {
        self.inner.key_for_url(url)
    }
}

#[tokio::test]
async fn test_failed_upload_keeps_original_and_applies_rest_of_row() {
    let dir = TempDir::new().unwrap();
    let repo = seed(&dir);
    let flaky = FlakyStorage {
        inner: storage(&dir),
        broken: "dates",
    };

    let report = engine_with(&dir, flaky, repo.clone(), false)
        .run(&[MediaTarget::product_images()])
        .await
        .unwrap();

    let counts = &report.targets[0].counts;
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.uploaded, 1);
    assert_eq!(
        repo.value(&MediaTarget::product_images(), "p2").unwrap(),
        list(&[
            "/uploads/products/honey.jpg",
            "https://res.cloudinary.com/demo/image/upload/v1/dates.png",
            "https://example.org/partner-logo.jpg",
        ])
    );

    let failed: Vec<_> = report
        .entries()
        .filter(|e| e.outcome.as_str() == "failed")
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].row_id, "p2");
    assert_eq!(failed[0].index, 1);
    assert!(failed[0].detail.as_deref().unwrap().contains("disk quota"));
}

#[tokio::test]
async fn test_unknown_table_aborts_run() {
    let dir = TempDir::new().unwrap();
    let repo = seed(&dir);
    let missing_table = MediaTarget {
        table: "Banner".to_string(),
        ..MediaTarget::product_images()
    };

    let result = engine_with(&dir, storage(&dir), repo.clone(), false)
        .run(&[missing_table, MediaTarget::product_images()])
        .await;

    assert!(result.is_err());
    assert_eq!(repo.update_count(), 0);
}

#[tokio::test]
async fn test_report_bundle_contents() {
    let dir = TempDir::new().unwrap();
    let repo = seed(&dir);
    let report = engine_with(&dir, storage(&dir), repo, false)
        .run(&targets())
        .await
        .unwrap();

    let reports_dir = dir.path().join("reports");
    let path = write_report_bundle(&reports_dir, &report).await.unwrap();
    let file_name = path.file_name().unwrap().to_str().unwrap();
    assert!(file_name.starts_with("reconcile-"));
    assert!(file_name.ends_with(".zip"));

    let mut archive = zip::ZipArchive::new(std::fs::File::open(&path).unwrap()).unwrap();
    assert_eq!(archive.len(), 2);

    let mut summary = String::new();
    archive
        .by_name("summary.json")
        .unwrap()
        .read_to_string(&mut summary)
        .unwrap();
    let summary: serde_json::Value = serde_json::from_str(&summary).unwrap();
    assert_eq!(summary["backend"], "local");
    assert_eq!(summary["rows_updated"], 3);
    assert_eq!(summary["totals"]["missing"], 1);

    let mut entries = String::new();
    archive
        .by_name("entries.csv")
        .unwrap()
        .read_to_string(&mut entries)
        .unwrap();
    assert!(entries.starts_with("target,row_id,index,outcome,original,resolved,detail"));
    assert!(entries.contains("Product.images,p3,0,missing,/images/ghost.jpg,,"));
    assert!(entries.contains("Category.image,c1,0,rewritten"));
}
