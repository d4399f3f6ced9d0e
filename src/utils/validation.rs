use crate::utils::error::{ReconcileError, Result};
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field_name: &str, value: impl ToString, reason: impl Into<String>) -> ReconcileError {
    ReconcileError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    validate_url_with_schemes(field_name, url_str, &["http", "https"])
}

pub fn validate_database_url(field_name: &str, url_str: &str) -> Result<()> {
    validate_url_with_schemes(field_name, url_str, &["postgres", "postgresql"])
}

fn validate_url_with_schemes(field_name: &str, url_str: &str, schemes: &[&str]) -> Result<()> {
    if url_str.is_empty() {
        return Err(invalid(field_name, url_str, "URL cannot be empty"));
    }

    match Url::parse(url_str) {
        Ok(url) if schemes.contains(&url.scheme()) => Ok(()),
        // 不要把帶密碼的連線字串寫進錯誤訊息
        Ok(url) => Err(invalid(
            field_name,
            url.scheme(),
            format!("Unsupported URL scheme. Expected one of: {}", schemes.join(", ")),
        )),
        Err(e) => Err(invalid(
            field_name,
            "<redacted>",
            format!("Invalid URL format: {}", e),
        )),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(invalid(field_name, path, "Path cannot be empty"));
    }

    if path.contains('\0') {
        return Err(invalid(field_name, path, "Path contains null bytes"));
    }

    validate_resolved(field_name, path)
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(invalid(
            field_name,
            value,
            format!("Value must be at least {}", min_value),
        ));
    }
    Ok(())
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value
        .as_ref()
        .ok_or_else(|| ReconcileError::MissingConfigError {
            field: field_name.to_string(),
        })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(
            field_name,
            value,
            "Value cannot be empty or whitespace-only",
        ));
    }
    validate_resolved(field_name, value)
}

/// 設定檔中的 `${VAR}` 在環境變數未設定時會原樣保留，不能當成真的值
pub fn validate_resolved(field_name: &str, value: &str) -> Result<()> {
    if let Some(start) = value.find("${") {
        if let Some(len) = value[start..].find('}') {
            let var = &value[start + 2..start + len];
            return Err(invalid(
                field_name,
                value,
                format!("Environment variable {} is not set", var),
            ));
        }
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(
            field_name,
            value,
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

/// SQL 識別字只接受簡單名稱，之後一律以雙引號包住
pub fn validate_sql_identifier(field_name: &str, ident: &str) -> Result<()> {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    let re = IDENT.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex"));

    if !re.is_match(ident) {
        return Err(invalid(
            field_name,
            ident,
            "SQL identifiers may only contain letters, digits and underscores",
        ));
    }
    Ok(())
}

pub fn validate_key_prefix(field_name: &str, prefix: &str) -> Result<()> {
    if prefix.starts_with('/') || prefix.ends_with('/') {
        return Err(invalid(
            field_name,
            prefix,
            "Key prefix must not start or end with '/'",
        ));
    }
    if prefix.split('/').any(|segment| segment.is_empty() || segment == "..") && !prefix.is_empty()
    {
        return Err(invalid(
            field_name,
            prefix,
            "Key prefix must not contain empty or '..' segments",
        ));
    }
    Ok(())
}

/// R2 沿用 S3 的 bucket 命名規則
pub fn validate_bucket_name(field_name: &str, bucket_name: &str) -> Result<()> {
    if bucket_name.is_empty() {
        return Err(invalid(field_name, bucket_name, "Bucket name cannot be empty"));
    }

    if bucket_name.len() < 3 || bucket_name.len() > 63 {
        return Err(invalid(
            field_name,
            bucket_name,
            "Bucket name must be between 3 and 63 characters",
        ));
    }

    if !bucket_name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err(invalid(
            field_name,
            bucket_name,
            "Bucket name can only contain lowercase letters, numbers, hyphens, and dots",
        ));
    }

    if bucket_name.starts_with('-') || bucket_name.ends_with('-') {
        return Err(invalid(
            field_name,
            bucket_name,
            "Bucket name cannot start or end with a hyphen",
        ));
    }

    Ok(())
}
