pub mod cloudinary;
pub mod local;
#[cfg(feature = "r2")]
pub mod r2;

use crate::config::{AppConfig, StorageConfig};
use crate::domain::model::StorageBackend;
use crate::domain::ports::Storage;
use crate::utils::error::{ReconcileError, Result};
use cloudinary::CloudinaryStorage;
use local::LocalStorage;
#[cfg(feature = "r2")]
use r2::R2Storage;

/// 逐段 percent-encode，保留 `/`
pub fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// 依設定選出的儲存後端
#[derive(Debug, Clone)]
pub enum AnyStorage {
    Local(LocalStorage),
    #[cfg(feature = "r2")]
    R2(R2Storage),
    Cloudinary(CloudinaryStorage),
}

impl AnyStorage {
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let storage = &config.storage;
        match storage.backend {
            StorageBackend::Local => Ok(Self::Local(local_storage(storage))),
            #[cfg(feature = "r2")]
            StorageBackend::R2 => {
                let r2 = storage.r2.as_ref().ok_or_else(|| ReconcileError::MissingConfigError {
                    field: "storage.r2".to_string(),
                })?;
                Ok(Self::R2(R2Storage::connect(r2).await?))
            }
            #[cfg(not(feature = "r2"))]
            StorageBackend::R2 => Err(ReconcileError::config(
                "R2 support is not compiled in; rebuild with the `r2` feature",
            )),
            StorageBackend::Cloudinary => {
                let cloudinary =
                    storage
                        .cloudinary
                        .as_ref()
                        .ok_or_else(|| ReconcileError::MissingConfigError {
                            field: "storage.cloudinary".to_string(),
                        })?;
                Ok(Self::Cloudinary(CloudinaryStorage::new(
                    cloudinary,
                    config.http_timeout(),
                )?))
            }
        }
    }
}

pub fn local_storage(storage: &StorageConfig) -> LocalStorage {
    LocalStorage::new(
        &storage.local.public_dir,
        &storage.local.upload_subdir,
        &storage.local.url_prefix,
    )
}

impl Storage for AnyStorage {
    fn backend(&self) -> StorageBackend {
        match self {
            Self::Local(s) => s.backend(),
            #[cfg(feature = "r2")]
            Self::R2(s) => s.backend(),
            Self::Cloudinary(s) => s.backend(),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self {
            Self::Local(s) => s.exists(key).await,
            #[cfg(feature = "r2")]
            Self::R2(s) => s.exists(key).await,
            Self::Cloudinary(s) => s.exists(key).await,
        }
    }

    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<String> {
        match self {
            Self::Local(s) => s.put(key, data, content_type).await,
            #[cfg(feature = "r2")]
            Self::R2(s) => s.put(key, data, content_type).await,
            Self::Cloudinary(s) => s.put(key, data, content_type).await,
        }
    }

    fn public_url(&self, key: &str) -> String {
        match self {
            Self::Local(s) => s.public_url(key),
            #[cfg(feature = "r2")]
            Self::R2(s) => s.public_url(key),
            Self::Cloudinary(s) => s.public_url(key),
        }
    }

    fn key_for_url(&self, url: &str) -> Option<String> {
        match self {
            Self::Local(s) => s.key_for_url(url),
            #[cfg(feature = "r2")]
            Self::R2(s) => s.key_for_url(url),
            Self::Cloudinary(s) => s.key_for_url(url),
        }
    }
}
