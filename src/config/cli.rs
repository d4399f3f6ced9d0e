use super::AppConfig;
use crate::domain::model::{ColumnKind, MediaTarget};
use crate::utils::error::{ReconcileError, Result};
use crate::utils::validation::validate_sql_identifier;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "media-reconcile")]
#[command(about = "Reconcile product media references with the configured object storage")]
#[command(version)]
pub struct Cli {
    /// Path to TOML configuration file (falls back to environment variables when absent)
    #[arg(short, long, global = true, default_value = "reconcile.toml")]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Log CPU and memory usage per phase
    #[arg(long, global = true)]
    pub monitor: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan media columns, upload what is missing and rewrite references
    Reconcile(ReconcileArgs),
    /// Upload files the same way the storefront admin does
    Upload(UploadArgs),
    /// Show how stored values would be classified, without writing anything
    Probe(ProbeArgs),
    /// Load and validate configuration, then print a redacted summary
    CheckConfig,
}

#[derive(Debug, Args)]
pub struct ReconcileArgs {
    /// Report what would change without uploading or updating rows
    #[arg(long)]
    pub dry_run: bool,

    /// Only process these columns, e.g. `Product.images` (repeatable)
    #[arg(long = "target", value_name = "TABLE.COLUMN")]
    pub targets: Vec<String>,

    /// Stop after this many rows per target
    #[arg(long)]
    pub limit: Option<usize>,

    /// Write a zip report bundle into this directory
    #[arg(long, value_name = "DIR")]
    pub report_dir: Option<PathBuf>,

    /// Download legacy URLs that have no local copy
    #[arg(long)]
    pub fetch_remote: bool,
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Key folder, defaults to `upload.folder`
    #[arg(long)]
    pub folder: Option<String>,
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    #[arg(required = true)]
    pub values: Vec<String>,
}

impl ReconcileArgs {
    /// 命令列參數覆蓋設定檔
    pub fn apply(&self, config: &mut AppConfig) {
        if self.dry_run {
            config.reconcile.dry_run = true;
        }
        if self.fetch_remote {
            config.reconcile.fetch_remote = true;
        }
        if let Some(dir) = &self.report_dir {
            config.report.output_dir = Some(dir.clone());
        }
    }
}

/// `Product.images` → (`Product`, `images`)
pub fn parse_target(value: &str) -> Result<(String, String)> {
    let (table, column) = value
        .split_once('.')
        .ok_or_else(|| ReconcileError::InvalidConfigValueError {
            field: "--target".to_string(),
            value: value.to_string(),
            reason: "Expected TABLE.COLUMN".to_string(),
        })?;
    validate_sql_identifier("--target", table)?;
    validate_sql_identifier("--target", column)?;
    Ok((table.to_string(), column.to_string()))
}

/// 依 `--target` 篩選；設定檔沒有的欄位以 `text[]` 預設值處理
pub fn select_targets(config: &AppConfig, requested: &[String]) -> Result<Vec<MediaTarget>> {
    let configured = config.targets();
    if requested.is_empty() {
        return Ok(configured);
    }

    requested
        .iter()
        .map(|value| {
            let (table, column) = parse_target(value)?;
            Ok(configured
                .iter()
                .find(|t| t.table == table && t.column == column)
                .cloned()
                .unwrap_or_else(|| MediaTarget {
                    table,
                    column,
                    kind: ColumnKind::Array,
                    ..MediaTarget::product_images()
                }))
        })
        .collect()
}
