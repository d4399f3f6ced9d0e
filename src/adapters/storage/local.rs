use super::encode_key;
use crate::domain::model::StorageBackend;
use crate::domain::ports::Storage;
use crate::utils::error::{ReconcileError, Result};
use std::path::{Component, Path, PathBuf};

/// 存放在網站 public 目錄下，例如 `public/uploads/products/a.jpg` → `/uploads/products/a.jpg`
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    url_prefix: String,
}

impl LocalStorage {
    pub fn new(
        public_dir: impl AsRef<Path>,
        upload_subdir: &str,
        url_prefix: &str,
    ) -> Self {
        Self {
            root: public_dir.as_ref().join(upload_subdir),
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(ReconcileError::storage(
                StorageBackend::Local.as_str(),
                format!("Refusing unsafe object key: {}", key),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl Storage for LocalStorage {
    fn backend(&self) -> StorageBackend {
        StorageBackend::Local
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.full_path(key)?;
        Ok(tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false))
    }

    async fn put(&self, key: &str, data: &[u8], _content_type: &str) -> Result<String> {
        let full_path = self.full_path(key)?;

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&full_path, data).await?;
        tracing::debug!("Wrote {} bytes to {}", data.len(), full_path.display());
        Ok(self.public_url(key))
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.url_prefix, encode_key(key))
    }

    fn key_for_url(&self, url: &str) -> Option<String> {
        let rest = url.strip_prefix(&self.url_prefix)?.strip_prefix('/')?;
        let rest = rest.split(['?', '#']).next().unwrap_or(rest);
        let key = urlencoding::decode(rest).ok()?.into_owned();
        if key.is_empty() {
            None
        } else {
            Some(key)
        }
    }
}
