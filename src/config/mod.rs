#[cfg(feature = "cli")]
pub mod cli;
pub mod env_config;
pub mod toml_config;

use crate::domain::model::{MediaTarget, StorageBackend};
use crate::utils::error::Result;
use crate::utils::retry::RetryPolicy;
use crate::utils::validation::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub targets: Vec<MediaTarget>,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 5,
            connect_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub r2: Option<R2Config>,
    #[serde(default)]
    pub cloudinary: Option<CloudinaryConfig>,
}

fn default_backend() -> StorageBackend {
    StorageBackend::R2
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            local: LocalConfig::default(),
            r2: None,
            cloudinary: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub public_dir: PathBuf,
    pub upload_subdir: String,
    pub url_prefix: String,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            public_dir: PathBuf::from("./public"),
            upload_subdir: "uploads".to_string(),
            url_prefix: "/uploads".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct R2Config {
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    pub public_url: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_r2_region")]
    pub region: String,
}

fn default_r2_region() -> String {
    "auto".to_string()
}

impl R2Config {
    pub fn endpoint_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) if !endpoint.trim().is_empty() => {
                endpoint.trim_end_matches('/').to_string()
            }
            _ => format!("https://{}.r2.cloudflarestorage.com", self.account_id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    #[serde(default = "default_cloudinary_api_base")]
    pub api_base: String,
    #[serde(default = "default_cloudinary_delivery_base")]
    pub delivery_base: String,
}

fn default_cloudinary_api_base() -> String {
    "https://api.cloudinary.com".to_string()
}

fn default_cloudinary_delivery_base() -> String {
    "https://res.cloudinary.com".to_string()
}

impl Default for CloudinaryConfig {
    fn default() -> Self {
        Self {
            cloud_name: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            api_base: default_cloudinary_api_base(),
            delivery_base: default_cloudinary_delivery_base(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub key_prefix: String,
    pub fallback_dirs: Vec<PathBuf>,
    pub legacy_hosts: Vec<String>,
    pub fetch_remote: bool,
    pub batch_size: usize,
    pub dry_run: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            key_prefix: "products".to_string(),
            fallback_dirs: vec![PathBuf::from("./public/uploads")],
            legacy_hosts: vec!["res.cloudinary.com".to_string()],
            fetch_remote: false,
            batch_size: 100,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub folder: String,
    pub max_bytes: usize,
    pub allowed_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            folder: "uploads".to_string(),
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_types: [
                "image/jpeg",
                "image/png",
                "image/webp",
                "image/gif",
                "image/avif",
                "image/svg+xml",
                "video/mp4",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_seconds: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub output_dir: Option<PathBuf>,
}

impl AppConfig {
    /// 設定檔存在就讀檔，否則改讀環境變數
    pub fn load(path: &std::path::Path) -> Result<Self> {
        if path.is_file() {
            tracing::info!("📁 Loading configuration from: {}", path.display());
            Self::from_file(path)
        } else {
            tracing::info!(
                "📁 {} not found, reading configuration from environment",
                path.display()
            );
            Self::from_env()
        }
    }

    pub fn targets(&self) -> Vec<MediaTarget> {
        if self.targets.is_empty() {
            vec![MediaTarget::product_images()]
        } else {
            self.targets.clone()
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_seconds)
    }

    /// reconcile 需要資料庫，upload/probe 不需要
    pub fn validate_for_reconcile(&self) -> Result<()> {
        self.validate()?;
        validate_non_empty_string("database.url", &self.database.url).map_err(|_| {
            crate::utils::error::ReconcileError::MissingConfigError {
                field: "database.url (DATABASE_URL)".to_string(),
            }
        })?;
        validate_database_url("database.url", &self.database.url)?;
        validate_positive_number(
            "database.max_connections",
            self.database.max_connections as usize,
            1,
        )?;
        Ok(())
    }

    /// 給 check-config 顯示用，不含任何密鑰
    pub fn redacted_summary(&self) -> Vec<(String, String)> {
        let mut lines = vec![
            (
                "database.url".to_string(),
                if self.database.url.is_empty() {
                    "<unset>".to_string()
                } else {
                    "<set>".to_string()
                },
            ),
            ("storage.backend".to_string(), self.storage.backend.to_string()),
        ];
        match self.storage.backend {
            StorageBackend::Local => {
                lines.push((
                    "storage.local.root".to_string(),
                    self.storage
                        .local
                        .public_dir
                        .join(&self.storage.local.upload_subdir)
                        .display()
                        .to_string(),
                ));
            }
            StorageBackend::R2 => {
                if let Some(r2) = &self.storage.r2 {
                    lines.push(("storage.r2.bucket".to_string(), r2.bucket.clone()));
                    lines.push(("storage.r2.endpoint".to_string(), r2.endpoint_url()));
                    lines.push(("storage.r2.public_url".to_string(), r2.public_url.clone()));
                }
            }
            StorageBackend::Cloudinary => {
                if let Some(c) = &self.storage.cloudinary {
                    lines.push(("storage.cloudinary.cloud_name".to_string(), c.cloud_name.clone()));
                }
            }
        }
        lines.push(("reconcile.key_prefix".to_string(), self.reconcile.key_prefix.clone()));
        lines.push((
            "reconcile.fallback_dirs".to_string(),
            self.reconcile
                .fallback_dirs
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        ));
        lines.push((
            "targets".to_string(),
            self.targets()
                .iter()
                .map(MediaTarget::name)
                .collect::<Vec<_>>()
                .join(", "),
        ));
        lines
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        match self.storage.backend {
            StorageBackend::Local => {
                let local = &self.storage.local;
                validate_path(
                    "storage.local.public_dir",
                    &local.public_dir.to_string_lossy(),
                )?;
                validate_non_empty_string("storage.local.upload_subdir", &local.upload_subdir)?;
                if !local.url_prefix.starts_with('/') && !local.url_prefix.starts_with("http") {
                    return Err(crate::utils::error::ReconcileError::InvalidConfigValueError {
                        field: "storage.local.url_prefix".to_string(),
                        value: local.url_prefix.clone(),
                        reason: "URL prefix must start with '/' or be an absolute URL".to_string(),
                    });
                }
            }
            StorageBackend::R2 => {
                let r2 = validate_required_field("storage.r2", &self.storage.r2)?;
                if r2.endpoint.is_none() {
                    validate_non_empty_string("storage.r2.account_id", &r2.account_id)?;
                } else {
                    validate_url("storage.r2.endpoint", &r2.endpoint_url())?;
                }
                validate_non_empty_string("storage.r2.access_key_id", &r2.access_key_id)?;
                validate_non_empty_string("storage.r2.secret_access_key", &r2.secret_access_key)?;
                validate_bucket_name("storage.r2.bucket", &r2.bucket)?;
                validate_url("storage.r2.public_url", &r2.public_url)?;
                validate_non_empty_string("storage.r2.region", &r2.region)?;
            }
            StorageBackend::Cloudinary => {
                let c = validate_required_field("storage.cloudinary", &self.storage.cloudinary)?;
                validate_non_empty_string("storage.cloudinary.cloud_name", &c.cloud_name)?;
                validate_non_empty_string("storage.cloudinary.api_key", &c.api_key)?;
                validate_non_empty_string("storage.cloudinary.api_secret", &c.api_secret)?;
                validate_url("storage.cloudinary.api_base", &c.api_base)?;
                validate_url("storage.cloudinary.delivery_base", &c.delivery_base)?;
            }
        }

        validate_key_prefix("reconcile.key_prefix", &self.reconcile.key_prefix)?;
        validate_positive_number("reconcile.batch_size", self.reconcile.batch_size, 1)?;
        for dir in &self.reconcile.fallback_dirs {
            validate_path("reconcile.fallback_dirs", &dir.to_string_lossy())?;
        }

        for target in &self.targets {
            validate_sql_identifier("targets.table", &target.table)?;
            validate_sql_identifier("targets.id_column", &target.id_column)?;
            validate_sql_identifier("targets.column", &target.column)?;
            if let Some(touch) = &target.touch_column {
                validate_sql_identifier("targets.touch_column", touch)?;
            }
        }

        validate_key_prefix("upload.folder", &self.upload.folder)?;
        validate_positive_number("upload.max_bytes", self.upload.max_bytes, 1)?;
        for content_type in &self.upload.allowed_types {
            if content_type.parse::<mime::Mime>().is_err() {
                return Err(crate::utils::error::ReconcileError::InvalidConfigValueError {
                    field: "upload.allowed_types".to_string(),
                    value: content_type.clone(),
                    reason: "Not a valid MIME type".to_string(),
                });
            }
        }

        validate_range("retry.max_attempts", self.retry.max_attempts, 1, 10)?;
        validate_positive_number("http.timeout_seconds", self.http.timeout_seconds as usize, 1)?;

        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }
}
