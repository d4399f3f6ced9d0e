use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    R2,
    Cloudinary,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::R2 => "r2",
            Self::Cloudinary => "cloudinary",
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    /// Postgres `text[]`
    Array,
    /// 可為 NULL 的 `text`
    Single,
}

/// 存放媒體參照的資料表欄位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaTarget {
    pub table: String,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    pub column: String,
    #[serde(default = "default_kind")]
    pub kind: ColumnKind,
    #[serde(default)]
    pub touch_column: Option<String>,
}

fn default_id_column() -> String {
    "id".to_string()
}

fn default_kind() -> ColumnKind {
    ColumnKind::Array
}

impl MediaTarget {
    pub fn product_images() -> Self {
        Self {
            table: "Product".to_string(),
            id_column: default_id_column(),
            column: "images".to_string(),
            kind: ColumnKind::Array,
            touch_column: None,
        }
    }

    pub fn name(&self) -> String {
        format!("{}.{}", self.table, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MediaValue {
    List(Vec<String>),
    Single(Option<String>),
}

impl MediaValue {
    pub fn entries(&self) -> Vec<&str> {
        match self {
            Self::List(items) => items.iter().map(String::as_str).collect(),
            Self::Single(Some(value)) => vec![value.as_str()],
            Self::Single(None) => Vec::new(),
        }
    }

    /// 以相同形狀套用新的項目，長度與順序不變
    pub fn with_entries(&self, entries: Vec<String>) -> Self {
        match self {
            Self::List(_) => Self::List(entries),
            Self::Single(_) => Self::Single(entries.into_iter().next()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRow {
    pub id: String,
    pub value: MediaValue,
}

/// 資料庫中一筆媒體字串正規化後的樣子
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoredRef {
    Empty,
    Inline,
    Bucket { key: String },
    Local { rel_path: String },
    Remote { url: String, legacy: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UploadSource {
    LocalFile { path: PathBuf },
    Remote { url: String },
}

impl fmt::Display for UploadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalFile { path } => write!(f, "{}", path.display()),
            Self::Remote { url } => f.write_str(url),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Keep,
    Skip { reason: String },
    Rewrite { to: String },
    Upload { source: UploadSource, key: String, to: String },
    Missing { reason: String },
    /// 探測儲存空間時出錯，原值保留
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryPlan {
    pub index: usize,
    pub original: String,
    pub stored_ref: StoredRef,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowPlan {
    pub row: MediaRow,
    pub entries: Vec<EntryPlan>,
}

impl RowPlan {
    pub fn needs_write(&self) -> bool {
        self.entries
            .iter()
            .any(|e| matches!(e.action, Action::Rewrite { .. } | Action::Upload { .. }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Unchanged,
    Skipped,
    Rewritten,
    Uploaded,
    WouldRewrite,
    WouldUpload,
    Missing,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Skipped => "skipped",
            Self::Rewritten => "rewritten",
            Self::Uploaded => "uploaded",
            Self::WouldRewrite => "would_rewrite",
            Self::WouldUpload => "would_upload",
            Self::Missing => "missing",
            Self::Failed => "failed",
        }
    }

    /// 是否值得寫進報表明細
    pub fn is_notable(&self) -> bool {
        !matches!(self, Self::Unchanged | Self::Skipped)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryReport {
    pub target: String,
    pub row_id: String,
    pub index: usize,
    pub original: String,
    pub resolved: Option<String>,
    pub outcome: Outcome,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub unchanged: usize,
    pub skipped: usize,
    pub rewritten: usize,
    pub uploaded: usize,
    pub would_rewrite: usize,
    pub would_upload: usize,
    pub missing: usize,
    pub failed: usize,
}

impl OutcomeCounts {
    pub fn record(&mut self, outcome: Outcome) {
        let slot = match outcome {
            Outcome::Unchanged => &mut self.unchanged,
            Outcome::Skipped => &mut self.skipped,
            Outcome::Rewritten => &mut self.rewritten,
            Outcome::Uploaded => &mut self.uploaded,
            Outcome::WouldRewrite => &mut self.would_rewrite,
            Outcome::WouldUpload => &mut self.would_upload,
            Outcome::Missing => &mut self.missing,
            Outcome::Failed => &mut self.failed,
        };
        *slot += 1;
    }

    pub fn total(&self) -> usize {
        self.unchanged
            + self.skipped
            + self.rewritten
            + self.uploaded
            + self.would_rewrite
            + self.would_upload
            + self.missing
            + self.failed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetSummary {
    pub target: String,
    pub rows_scanned: usize,
    pub rows_updated: usize,
    pub counts: OutcomeCounts,
    #[serde(skip)]
    pub entries: Vec<EntryReport>,
}

impl TargetSummary {
    pub fn new(target: &MediaTarget) -> Self {
        Self {
            target: target.name(),
            rows_scanned: 0,
            rows_updated: 0,
            counts: OutcomeCounts::default(),
            entries: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
    pub dry_run: bool,
    pub backend: StorageBackend,
    pub targets: Vec<TargetSummary>,
}

impl RunReport {
    pub fn totals(&self) -> OutcomeCounts {
        let mut totals = OutcomeCounts::default();
        for summary in &self.targets {
            let c = &summary.counts;
            totals.unchanged += c.unchanged;
            totals.skipped += c.skipped;
            totals.rewritten += c.rewritten;
            totals.uploaded += c.uploaded;
            totals.would_rewrite += c.would_rewrite;
            totals.would_upload += c.would_upload;
            totals.missing += c.missing;
            totals.failed += c.failed;
        }
        totals
    }

    pub fn entries(&self) -> impl Iterator<Item = &EntryReport> {
        self.targets.iter().flat_map(|t| t.entries.iter())
    }

    pub fn rows_updated(&self) -> usize {
        self.targets.iter().map(|t| t.rows_updated).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedMedia {
    pub key: String,
    pub url: String,
    pub content_type: String,
    pub size: usize,
}
