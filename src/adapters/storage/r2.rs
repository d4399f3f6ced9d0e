use super::encode_key;
use crate::config::R2Config;
use crate::domain::model::StorageBackend;
use crate::domain::ports::Storage;
use crate::utils::error::{ReconcileError, Result};
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{
    Credentials, Region, RequestChecksumCalculation, ResponseChecksumValidation,
};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

const CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

#[derive(Debug, Clone)]
pub struct R2Storage {
    client: S3Client,
    bucket: String,
    public_base: String,
    endpoint: String,
}

impl R2Storage {
    pub fn new(client: S3Client, bucket: String, public_base: &str, endpoint: &str) -> Self {
        Self {
            client,
            bucket,
            public_base: public_base.trim_end_matches('/').to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    pub async fn connect(config: &R2Config) -> Result<Self> {
        let endpoint = config.endpoint_url();
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "r2-static",
        );

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(&endpoint)
            .credentials_provider(credentials)
            .load()
            .await;

        // R2 只支援 path-style，且不需要額外的 checksum trailer
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
            .response_checksum_validation(ResponseChecksumValidation::WhenRequired)
            .build();

        tracing::debug!("R2 client ready (endpoint: {}, bucket: {})", endpoint, config.bucket);
        Ok(Self::new(
            S3Client::from_conf(s3_config),
            config.bucket.clone(),
            &config.public_url,
            &endpoint,
        ))
    }

    fn classify<E>(&self, operation: &str, key: &str, err: SdkError<E, HttpResponse>) -> ReconcileError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let retryable = match &err {
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
                true
            }
            SdkError::ServiceError(service) => {
                let status = service.raw().status().as_u16();
                status == 429 || status >= 500
            }
            _ => false,
        };
        let message = format!("{} {} failed: {}", operation, key, DisplayErrorContext(&err));
        if retryable {
            ReconcileError::transient_storage(StorageBackend::R2.as_str(), message)
        } else {
            ReconcileError::storage(StorageBackend::R2.as_str(), message)
        }
    }
}

fn is_not_found<E>(err: &SdkError<E, HttpResponse>) -> bool {
    match err {
        SdkError::ServiceError(service) => service.raw().status().as_u16() == 404,
        SdkError::ResponseError(response) => response.raw().status().as_u16() == 404,
        _ => false,
    }
}

impl Storage for R2Storage {
    fn backend(&self) -> StorageBackend {
        StorageBackend::R2
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if is_not_found(&err) => Ok(false),
            Err(err) => Err(self.classify("HeadObject", key, err)),
        }
    }

    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<String> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .cache_control(CACHE_CONTROL)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|err| self.classify("PutObject", key, err))?;

        tracing::debug!("Uploaded {} ({} bytes) to bucket {}", key, data.len(), self.bucket);
        Ok(self.public_url(key))
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, encode_key(key))
    }

    fn key_for_url(&self, url: &str) -> Option<String> {
        let bucket_base = format!("{}/{}", self.endpoint, self.bucket);
        let rest = [self.public_base.as_str(), bucket_base.as_str()]
            .iter()
            .filter(|base| !base.is_empty())
            .find_map(|base| url.strip_prefix(*base).and_then(|r| r.strip_prefix('/')))?;
        let rest = rest.split(['?', '#']).next().unwrap_or(rest);
        let key = urlencoding::decode(rest).ok()?.into_owned();
        if key.is_empty() {
            None
        } else {
            Some(key)
        }
    }
}
