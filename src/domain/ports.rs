use crate::domain::model::{MediaRow, MediaTarget, MediaValue, RowPlan, StorageBackend, TargetSummary};
use crate::utils::error::Result;
use async_trait::async_trait;

/// 物件儲存：本機磁碟、R2 或 Cloudinary
pub trait Storage: Send + Sync {
    fn backend(&self) -> StorageBackend;

    fn exists(&self, key: &str) -> impl std::future::Future<Output = Result<bool>> + Send;

    /// 上傳後回傳公開網址
    fn put(
        &self,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> impl std::future::Future<Output = Result<String>> + Send;

    fn public_url(&self, key: &str) -> String;

    /// 若網址屬於此儲存空間，回傳對應的物件 key
    fn key_for_url(&self, url: &str) -> Option<String>;
}

#[async_trait]
pub trait MediaRepository: Send + Sync {
    async fn fetch_page(
        &self,
        target: &MediaTarget,
        after_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MediaRow>>;

    async fn update(&self, target: &MediaTarget, row_id: &str, value: &MediaValue) -> Result<()>;
}

#[async_trait]
impl<T: MediaRepository + ?Sized> MediaRepository for std::sync::Arc<T> {
    async fn fetch_page(
        &self,
        target: &MediaTarget,
        after_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MediaRow>> {
        (**self).fetch_page(target, after_id, limit).await
    }

    async fn update(&self, target: &MediaTarget, row_id: &str, value: &MediaValue) -> Result<()> {
        (**self).update(target, row_id, value).await
    }
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    fn backend(&self) -> StorageBackend;
    fn dry_run(&self) -> bool;
    async fn extract(&self, target: &MediaTarget) -> Result<Vec<MediaRow>>;
    async fn transform(&self, target: &MediaTarget, rows: Vec<MediaRow>) -> Result<Vec<RowPlan>>;
    async fn load(&self, target: &MediaTarget, plans: Vec<RowPlan>) -> Result<TargetSummary>;
}
