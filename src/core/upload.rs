use crate::config::UploadConfig;
use crate::core::normalize::{join_key, sanitize_segment};
use crate::domain::model::UploadedMedia;
use crate::domain::ports::Storage;
use crate::utils::error::{ReconcileError, Result};
use crate::utils::retry::RetryPolicy;
use mime::Mime;
use std::path::Path;

/// 依副檔名推斷 content type
pub fn content_type_for(file_name: &str) -> Option<Mime> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())?
        .to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" | "jfif" => Some(mime::IMAGE_JPEG),
        "png" => Some(mime::IMAGE_PNG),
        "gif" => Some(mime::IMAGE_GIF),
        "bmp" => Some(mime::IMAGE_BMP),
        "svg" => Some(mime::IMAGE_SVG),
        "webp" => "image/webp".parse().ok(),
        "avif" => "image/avif".parse().ok(),
        "mp4" => "video/mp4".parse().ok(),
        "webm" => "video/webm".parse().ok(),
        _ => None,
    }
}

/// 上傳前的檢查：非空、未超過大小上限、content type 在允許清單內
pub fn check_media(
    config: &UploadConfig,
    file_name: &str,
    data: &[u8],
    content_type: Option<&str>,
) -> Result<Mime> {
    if data.is_empty() {
        return Err(ReconcileError::UploadRejected {
            reason: format!("{} is empty", file_name),
        });
    }
    if data.len() > config.max_bytes {
        return Err(ReconcileError::UploadRejected {
            reason: format!(
                "{} is {} bytes; the limit is {} bytes",
                file_name,
                data.len(),
                config.max_bytes
            ),
        });
    }

    let mime = match content_type {
        Some(ct) => ct.parse::<Mime>().map_err(|_| ReconcileError::UploadRejected {
            reason: format!("Invalid content type '{}'", ct),
        })?,
        None => content_type_for(file_name).ok_or_else(|| ReconcileError::UploadRejected {
            reason: format!("Cannot determine the content type of {}", file_name),
        })?,
    };

    let essence = mime.essence_str();
    if !config
        .allowed_types
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(essence))
    {
        return Err(ReconcileError::UploadRejected {
            reason: format!("Content type {} is not allowed", essence),
        });
    }
    Ok(mime)
}

/// 店面後台的上傳流程：檢查、命名、寫入儲存空間
pub struct MediaUploader<S: Storage> {
    storage: S,
    config: UploadConfig,
    retry: RetryPolicy,
}

impl<S: Storage> MediaUploader<S> {
    pub fn new(storage: S, config: UploadConfig, retry: RetryPolicy) -> Self {
        Self {
            storage,
            config,
            retry,
        }
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.config.folder = folder.into();
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn key_for(&self, file_name: &str, unix_millis: i64) -> String {
        let name = sanitize_segment(file_name);
        join_key(&self.config.folder, &format!("{}-{}", unix_millis, name))
    }

    pub async fn upload(
        &self,
        file_name: &str,
        data: &[u8],
        content_type: Option<&str>,
    ) -> Result<UploadedMedia> {
        let mime = check_media(&self.config, file_name, data, content_type)?;
        let key = self.key_for(file_name, chrono::Utc::now().timestamp_millis());
        let content_type = mime.essence_str().to_string();

        let url = self
            .retry
            .run("upload", || self.storage.put(&key, data, &content_type))
            .await?;

        tracing::info!("📤 Uploaded {} → {}", file_name, url);
        Ok(UploadedMedia {
            key,
            url,
            content_type,
            size: data.len(),
        })
    }

    pub async fn upload_file(&self, path: &Path) -> Result<UploadedMedia> {
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ReconcileError::UploadRejected {
                reason: format!("{} has no usable file name", path.display()),
            })?;
        self.upload(file_name, &data, None).await
    }
}
