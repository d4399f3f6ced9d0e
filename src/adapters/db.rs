use crate::config::DatabaseConfig;
use crate::domain::model::{ColumnKind, MediaRow, MediaTarget, MediaValue};
use crate::domain::ports::MediaRepository;
use crate::utils::error::{ReconcileError, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;

/// 識別字一律加雙引號（Prisma 建的表名有大小寫）
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub fn select_page_sql(target: &MediaTarget) -> String {
    let id = quote_ident(&target.id_column);
    format!(
        "SELECT {id}::text AS id, {col} AS value FROM {table} \
         WHERE ($1::text IS NULL OR {id}::text > $1) \
         ORDER BY {id}::text LIMIT $2",
        id = id,
        col = quote_ident(&target.column),
        table = quote_ident(&target.table),
    )
}

pub fn update_sql(target: &MediaTarget) -> String {
    let touch = target
        .touch_column
        .as_deref()
        .map(|c| format!(", {} = NOW()", quote_ident(c)))
        .unwrap_or_default();
    format!(
        "UPDATE {table} SET {col} = $1{touch} WHERE {id}::text = $2",
        table = quote_ident(&target.table),
        col = quote_ident(&target.column),
        touch = touch,
        id = quote_ident(&target.id_column),
    )
}

#[derive(Debug, Clone)]
pub struct PgMediaRepository {
    pool: PgPool,
}

impl PgMediaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .connect(&config.url)
            .await?;
        tracing::debug!("Connected to database (pool size {})", config.max_connections);
        Ok(Self::new(pool))
    }

    fn decode_row(target: &MediaTarget, row: &PgRow) -> Result<MediaRow> {
        let id: String = row.try_get("id")?;
        let value = match target.kind {
            ColumnKind::Array => {
                let items: Option<Vec<Option<String>>> = row.try_get("value")?;
                // NULL 元素視為空字串以保留陣列長度
                MediaValue::List(
                    items
                        .unwrap_or_default()
                        .into_iter()
                        .map(Option::unwrap_or_default)
                        .collect(),
                )
            }
            ColumnKind::Single => MediaValue::Single(row.try_get("value")?),
        };
        Ok(MediaRow { id, value })
    }
}

#[async_trait]
impl MediaRepository for PgMediaRepository {
    async fn fetch_page(
        &self,
        target: &MediaTarget,
        after_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MediaRow>> {
        let limit = i64::try_from(limit).map_err(|_| {
            ReconcileError::processing(format!("Page size {} is too large", limit))
        })?;

        let rows = sqlx::query(&select_page_sql(target))
            .bind(after_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|row| Self::decode_row(target, row)).collect()
    }

    async fn update(&self, target: &MediaTarget, row_id: &str, value: &MediaValue) -> Result<()> {
        let sql = update_sql(target);
        let query = match (target.kind, value) {
            (ColumnKind::Array, MediaValue::List(items)) => sqlx::query(&sql).bind(items.clone()),
            (ColumnKind::Single, MediaValue::Single(item)) => sqlx::query(&sql).bind(item.clone()),
            _ => {
                return Err(ReconcileError::processing(format!(
                    "Value shape does not match column kind of {}",
                    target.name()
                )))
            }
        };

        let result = query.bind(row_id).execute(&self.pool).await?;
        if result.rows_affected() != 1 {
            return Err(ReconcileError::processing(format!(
                "Expected to update one row of {} (id {}), updated {}",
                target.name(),
                row_id,
                result.rows_affected()
            )));
        }
        Ok(())
    }
}

/// 不連資料庫的命令（probe）使用；任何存取都會回報缺少 DATABASE_URL
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDatabase;

#[async_trait]
impl MediaRepository for NoDatabase {
    async fn fetch_page(
        &self,
        _target: &MediaTarget,
        _after_id: Option<&str>,
        _limit: usize,
    ) -> Result<Vec<MediaRow>> {
        Err(ReconcileError::MissingConfigError {
            field: "database.url (DATABASE_URL)".to_string(),
        })
    }

    async fn update(&self, _target: &MediaTarget, _row_id: &str, _value: &MediaValue) -> Result<()> {
        Err(ReconcileError::MissingConfigError {
            field: "database.url (DATABASE_URL)".to_string(),
        })
    }
}
