use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Report archive failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Storage error ({backend}): {message}")]
    StorageError {
        backend: String,
        message: String,
        retryable: bool,
    },

    #[error("Remote fetch failed for {url}: HTTP {status}")]
    RemoteFetchError { url: String, status: u16 },

    #[error("Upload rejected: {reason}")]
    UploadRejected { reason: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Database,
    Storage,
    Data,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ReconcileError {
    pub fn storage(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StorageError {
            backend: backend.into(),
            message: message.into(),
            retryable: false,
        }
    }

    pub fn transient_storage(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StorageError {
            backend: backend.into(),
            message: message.into(),
            retryable: true,
        }
    }

    pub fn processing(message: impl Into<String>) -> Self {
        Self::ProcessingError {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
            Self::HttpError(_) | Self::RemoteFetchError { .. } => ErrorCategory::Network,
            Self::DatabaseError(_) => ErrorCategory::Database,
            Self::StorageError { .. } | Self::UploadRejected { .. } => ErrorCategory::Storage,
            Self::CsvError(_) | Self::SerializationError(_) | Self::ProcessingError { .. } => {
                ErrorCategory::Data
            }
            Self::IoError(_) | Self::ZipError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        if self.is_retryable() {
            return ErrorSeverity::Medium;
        }
        match self.category() {
            ErrorCategory::Configuration | ErrorCategory::Data | ErrorCategory::Storage => {
                ErrorSeverity::High
            }
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Database | ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    /// 是否值得以相同參數再試一次
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StorageError { retryable, .. } => *retryable,
            Self::RemoteFetchError { status, .. } => *status == 429 || *status >= 500,
            Self::HttpError(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e
                        .status()
                        .map(|s| s.is_server_error() || s.as_u16() == 429)
                        .unwrap_or(false)
            }
            Self::DatabaseError(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => {
                "Check reconcile.toml and the environment variables it references".to_string()
            }
            ErrorCategory::Network => {
                "Check network connectivity and the remote host, then re-run".to_string()
            }
            ErrorCategory::Database => {
                "Verify DATABASE_URL and that the configured tables and columns exist".to_string()
            }
            ErrorCategory::Storage => match self {
                Self::UploadRejected { .. } => {
                    "Check the file type and size against the [upload] limits".to_string()
                }
                _ => "Verify storage credentials, bucket name and public URL".to_string(),
            },
            ErrorCategory::Data => {
                "Inspect the offending rows; re-run with --verbose for details".to_string()
            }
            ErrorCategory::System => {
                "Check file permissions and free disk space for the report directory".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::MissingConfigError { field } => {
                format!("Configuration value '{}' is required but not set", field)
            }
            Self::InvalidConfigValueError { field, reason, .. } => {
                format!("Configuration value '{}' is invalid: {}", field, reason)
            }
            Self::DatabaseError(_) => "Could not read or update the database".to_string(),
            Self::StorageError { backend, .. } => {
                format!("The {} storage backend reported an error", backend)
            }
            _ => self.to_string(),
        }
    }
}
