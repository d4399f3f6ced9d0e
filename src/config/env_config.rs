use super::{AppConfig, CloudinaryConfig, R2Config};
use crate::domain::model::StorageBackend;
use crate::utils::error::{ReconcileError, Result};
use std::env;
use std::path::PathBuf;

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &str) -> Result<String> {
    var(name).ok_or_else(|| ReconcileError::MissingConfigError {
        field: name.to_string(),
    })
}

pub fn parse_backend(value: &str) -> Result<StorageBackend> {
    match value.trim().to_ascii_lowercase().as_str() {
        "local" => Ok(StorageBackend::Local),
        "r2" => Ok(StorageBackend::R2),
        "cloudinary" => Ok(StorageBackend::Cloudinary),
        other => Err(ReconcileError::InvalidConfigValueError {
            field: "STORAGE_PROVIDER".to_string(),
            value: other.to_string(),
            reason: "Expected one of: local, r2, cloudinary".to_string(),
        }),
    }
}

impl AppConfig {
    /// 只用環境變數組出配置（沿用店面 `.env` 的變數名稱）
    pub fn from_env() -> Result<Self> {
        let mut config = AppConfig::default();

        if let Some(url) = var("DATABASE_URL") {
            config.database.url = url;
        }

        if let Some(provider) = var("STORAGE_PROVIDER") {
            config.storage.backend = parse_backend(&provider)?;
        }

        if let Some(dir) = var("PUBLIC_DIR") {
            config.storage.local.public_dir = PathBuf::from(dir);
        }
        if let Some(prefix) = var("LOCAL_URL_PREFIX") {
            config.storage.local.url_prefix = prefix;
        }

        match config.storage.backend {
            StorageBackend::R2 => {
                config.storage.r2 = Some(R2Config {
                    account_id: var("R2_ACCOUNT_ID").unwrap_or_default(),
                    access_key_id: required("R2_ACCESS_KEY_ID")?,
                    secret_access_key: required("R2_SECRET_ACCESS_KEY")?,
                    bucket: required("R2_BUCKET_NAME")?,
                    public_url: required("R2_PUBLIC_URL")?,
                    endpoint: var("R2_ENDPOINT"),
                    region: var("R2_REGION").unwrap_or_else(|| "auto".to_string()),
                });
            }
            StorageBackend::Cloudinary => {
                config.storage.cloudinary = Some(CloudinaryConfig {
                    cloud_name: required("CLOUDINARY_CLOUD_NAME")?,
                    api_key: required("CLOUDINARY_API_KEY")?,
                    api_secret: required("CLOUDINARY_API_SECRET")?,
                    ..CloudinaryConfig::default()
                });
            }
            StorageBackend::Local => {}
        }

        if let Some(prefix) = var("MEDIA_KEY_PREFIX") {
            config.reconcile.key_prefix = prefix;
        }
        if let Some(dirs) = var("FALLBACK_DIRS") {
            config.reconcile.fallback_dirs = dirs
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(PathBuf::from)
                .collect();
        }
        if let Some(size) = var("RECONCILE_BATCH_SIZE") {
            config.reconcile.batch_size =
                size.parse()
                    .map_err(|_| ReconcileError::InvalidConfigValueError {
                        field: "RECONCILE_BATCH_SIZE".to_string(),
                        value: size.clone(),
                        reason: "Expected a positive integer".to_string(),
                    })?;
        }

        Ok(config)
    }
}
