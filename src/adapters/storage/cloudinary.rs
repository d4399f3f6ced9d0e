use super::encode_key;
use crate::config::CloudinaryConfig;
use crate::core::normalize::strip_delivery_segments;
use crate::domain::model::StorageBackend;
use crate::domain::ports::Storage;
use crate::utils::error::{ReconcileError, Result};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    public_id: String,
    #[serde(default)]
    secure_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CloudinaryStorage {
    client: Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    api_base: String,
    delivery_base: String,
}

/// Cloudinary 簽章：參數依名稱排序後以 `&` 串接，再接上 api_secret 做 SHA-256
pub fn sign_params(params: &BTreeMap<&str, String>, api_secret: &str) -> String {
    let joined = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// `products/a.jpg` → `products/a`
pub fn public_id_for_key(key: &str) -> &str {
    let name_start = key.rfind('/').map(|p| p + 1).unwrap_or(0);
    match key[name_start..].rfind('.') {
        Some(0) | None => key,
        Some(dot) => &key[..name_start + dot],
    }
}

impl CloudinaryStorage {
    pub fn new(config: &CloudinaryConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            cloud_name: config.cloud_name.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            delivery_base: config.delivery_base.trim_end_matches('/').to_string(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v1_1/{}/{}", self.api_base, self.cloud_name, path)
    }

    fn status_error(&self, operation: &str, key: &str, status: StatusCode, body: &str) -> ReconcileError {
        let message = format!("{} {} returned HTTP {}: {}", operation, key, status, body.trim());
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            ReconcileError::transient_storage(StorageBackend::Cloudinary.as_str(), message)
        } else {
            ReconcileError::storage(StorageBackend::Cloudinary.as_str(), message)
        }
    }
}

impl Storage for CloudinaryStorage {
    fn backend(&self) -> StorageBackend {
        StorageBackend::Cloudinary
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let public_id = public_id_for_key(key);
        let url = self.api_url(&format!("resources/image/upload/{}", encode_key(public_id)));

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => Ok(true),
            s if s == StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(self.status_error("Resource lookup", key, status, &body))
            }
        }
    }

    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<String> {
        let public_id = public_id_for_key(key).to_string();
        let timestamp = chrono::Utc::now().timestamp().to_string();

        let mut params = BTreeMap::new();
        params.insert("public_id", public_id.clone());
        params.insert("timestamp", timestamp.clone());
        let signature = sign_params(&params, &self.api_secret);

        let file_name = key.rsplit('/').next().unwrap_or(key).to_string();
        let file = Part::bytes(data.to_vec())
            .file_name(file_name)
            .mime_str(content_type)?;

        let form = Form::new()
            .text("api_key", self.api_key.clone())
            .text("public_id", public_id)
            .text("timestamp", timestamp)
            .text("signature_algorithm", "sha256")
            .text("signature", signature)
            .part("file", file);

        let response = self
            .client
            .post(self.api_url("image/upload"))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.status_error("Upload", key, status, &body));
        }

        let uploaded: UploadResponse = response.json().await?;
        tracing::debug!(
            "Cloudinary stored {} ({})",
            uploaded.public_id,
            uploaded.secure_url.as_deref().unwrap_or("-")
        );
        Ok(self.public_url(key))
    }

    fn public_url(&self, key: &str) -> String {
        format!(
            "{}/{}/image/upload/{}",
            self.delivery_base,
            self.cloud_name,
            encode_key(key)
        )
    }

    /// 去掉轉換參數與版本段：`/demo/image/upload/w_400,c_fill/v17/products/a.jpg` → `products/a.jpg`
    fn key_for_url(&self, url: &str) -> Option<String> {
        let base = format!("{}/{}/image/upload/", self.delivery_base, self.cloud_name);
        let rest = url.strip_prefix(&base)?;
        let rest = rest.split(['?', '#']).next().unwrap_or(rest);

        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
        let segments = strip_delivery_segments(&segments);
        if segments.is_empty() {
            return None;
        }

        let key = urlencoding::decode(&segments.join("/")).ok()?.into_owned();
        Some(key)
    }
}
