use crate::adapters::http::RemoteFetcher;
use crate::config::{AppConfig, UploadConfig};
use crate::core::locator::LocalFileLocator;
use crate::core::normalize::{
    escapes_root, normalize_site_path, normalize_stored_path, object_key_for_local,
    object_key_for_remote,
};
use crate::core::upload::{check_media, content_type_for};
use crate::domain::model::{
    Action, EntryPlan, EntryReport, MediaRow, MediaTarget, Outcome, RowPlan, StorageBackend,
    StoredRef, TargetSummary, UploadSource,
};
use crate::domain::ports::{MediaRepository, Pipeline, Storage};
use crate::utils::error::{ReconcileError, Result};
use crate::utils::retry::RetryPolicy;
use std::collections::HashMap;
use tokio::sync::Mutex;
use url::Url;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub key_prefix: String,
    pub legacy_hosts: Vec<String>,
    pub fetch_remote: bool,
    pub batch_size: usize,
    pub limit: Option<usize>,
    pub dry_run: bool,
    pub retry: RetryPolicy,
    /// 下載的檔案同樣受上傳大小與類型限制
    pub upload: UploadConfig,
}

impl PipelineOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            key_prefix: config.reconcile.key_prefix.clone(),
            legacy_hosts: config.reconcile.legacy_hosts.clone(),
            fetch_remote: config.reconcile.fetch_remote,
            batch_size: config.reconcile.batch_size.max(1),
            limit: None,
            dry_run: config.reconcile.dry_run,
            retry: config.retry.clone(),
            upload: config.upload.clone(),
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[derive(Debug, Default)]
struct RunState {
    /// key → 是否存在於儲存空間
    probes: HashMap<String, bool>,
    /// 本次執行已上傳的 key → 公開網址
    uploaded: HashMap<String, String>,
}

/// 把資料表中的圖片參照對齊到目前的儲存空間
pub struct ReconcilePipeline<S: Storage, R: MediaRepository> {
    storage: S,
    repository: R,
    locator: LocalFileLocator,
    fetcher: Option<RemoteFetcher>,
    options: PipelineOptions,
    state: Mutex<RunState>,
}

impl<S: Storage, R: MediaRepository> ReconcilePipeline<S, R> {
    pub fn new(
        storage: S,
        repository: R,
        locator: LocalFileLocator,
        options: PipelineOptions,
    ) -> Self {
        Self {
            storage,
            repository,
            locator,
            fetcher: None,
            options,
            state: Mutex::new(RunState::default()),
        }
    }

    /// 啟用後，找不到本機檔案的舊網址會直接下載再上傳
    pub fn with_remote_fetcher(mut self, fetcher: RemoteFetcher) -> Self {
        if self.options.fetch_remote {
            self.fetcher = Some(fetcher);
        }
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    async fn probe(&self, key: &str) -> Result<bool> {
        if let Some(found) = self.state.lock().await.probes.get(key) {
            return Ok(*found);
        }

        let exists = self
            .options
            .retry
            .run("exists", || self.storage.exists(key))
            .await?;
        tracing::debug!("🔎 {} exists in {}: {}", key, self.storage.backend(), exists);

        self.state
            .lock()
            .await
            .probes
            .insert(key.to_string(), exists);
        Ok(exists)
    }

    fn rewrite_or_keep(raw: &str, canonical: String) -> Action {
        if raw == canonical {
            Action::Keep
        } else {
            Action::Rewrite { to: canonical }
        }
    }

    fn upload_from_local(&self, rel_path: &str, key: String) -> Option<Action> {
        let found = self.locator.locate(rel_path)?;
        tracing::debug!(
            "📁 {} matched {} ({:?})",
            rel_path,
            found.path.display(),
            found.match_kind
        );
        let to = self.storage.public_url(&key);
        Some(Action::Upload {
            source: UploadSource::LocalFile { path: found.path },
            key,
            to,
        })
    }

    async fn decide(&self, raw: &str, stored_ref: &StoredRef) -> Result<Action> {
        let action = match stored_ref {
            StoredRef::Empty => Action::Skip {
                reason: "empty value".to_string(),
            },
            StoredRef::Inline => Action::Skip {
                reason: "inline data URI".to_string(),
            },
            StoredRef::Bucket { key } | StoredRef::Local { rel_path: key } if escapes_root(key) => {
                Action::Missing {
                    reason: format!("{} points outside the public directory", key),
                }
            }
            StoredRef::Bucket { key } => {
                if self.probe(key).await? {
                    Self::rewrite_or_keep(raw, self.storage.public_url(key))
                } else {
                    self.upload_from_local(key, key.clone())
                        .unwrap_or_else(|| Action::Missing {
                            reason: format!("object {} is not in storage and no local file matched", key),
                        })
                }
            }
            StoredRef::Local { rel_path } => {
                let key = object_key_for_local(rel_path, &self.options.key_prefix);
                if self.probe(&key).await? {
                    Self::rewrite_or_keep(raw, self.storage.public_url(&key))
                } else {
                    self.upload_from_local(rel_path, key)
                        .unwrap_or_else(|| Action::Missing {
                            reason: format!("no local file matched {}", rel_path),
                        })
                }
            }
            StoredRef::Remote { url, legacy: true } => {
                let key = object_key_for_remote(url, &self.options.key_prefix);
                if self.probe(&key).await? {
                    return Ok(Self::rewrite_or_keep(raw, self.storage.public_url(&key)));
                }

                let rel_path = Url::parse(url)
                    .map(|u| normalize_site_path(u.path()))
                    .unwrap_or_default();
                if let Some(action) = self.upload_from_local(&rel_path, key.clone()) {
                    action
                } else if self.fetcher.is_some() {
                    let to = self.storage.public_url(&key);
                    Action::Upload {
                        source: UploadSource::Remote { url: url.clone() },
                        key,
                        to,
                    }
                } else {
                    Action::Missing {
                        reason: "legacy URL has no local copy and remote fetch is disabled"
                            .to_string(),
                    }
                }
            }
            StoredRef::Remote { legacy: false, .. } => Action::Skip {
                reason: "foreign host".to_string(),
            },
        };
        Ok(action)
    }

    /// 單一字串的判斷結果；儲存空間探測失敗時為 `Action::Failed`
    pub async fn resolve_entry(&self, index: usize, raw: &str) -> EntryPlan {
        let stored_ref = normalize_stored_path(raw, &self.storage, &self.options.legacy_hosts);
        let action = match self.decide(raw, &stored_ref).await {
            Ok(action) => action,
            Err(e) => {
                tracing::warn!("⚠️ Could not resolve '{}': {}", raw, e);
                Action::Failed {
                    error: e.to_string(),
                }
            }
        };
        tracing::debug!("{:?} → {:?}", stored_ref, action);
        EntryPlan {
            index,
            original: raw.to_string(),
            stored_ref,
            action,
        }
    }

    async fn read_source(&self, source: &UploadSource, key: &str) -> Result<(Vec<u8>, String)> {
        let (data, content_type) = match source {
            UploadSource::LocalFile { path } => {
                let data = tokio::fs::read(path).await?;
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(key);
                (data, content_type_for(name).map(|m| m.essence_str().to_string()))
            }
            UploadSource::Remote { url } => {
                let fetcher = self.fetcher.as_ref().ok_or_else(|| {
                    ReconcileError::processing("remote fetch is disabled for this run")
                })?;
                let fetched = self.options.retry.run("fetch", || fetcher.fetch(url)).await?;
                // 未標示型別時依副檔名判斷
                let declared = fetched
                    .content_type
                    .as_deref()
                    .filter(|ct| !ct.starts_with(mime::APPLICATION_OCTET_STREAM.essence_str()));
                let checked = check_media(&self.options.upload, key, &fetched.data, declared)?;
                (fetched.data, Some(checked.essence_str().to_string()))
            }
        };

        if data.is_empty() {
            return Err(ReconcileError::UploadRejected {
                reason: format!("{} is empty", source),
            });
        }
        let content_type =
            content_type.unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());
        Ok((data, content_type))
    }

    async fn perform_upload(&self, source: &UploadSource, key: &str) -> Result<String> {
        if let Some(url) = self.state.lock().await.uploaded.get(key) {
            tracing::debug!("♻️ {} already uploaded in this run", key);
            return Ok(url.clone());
        }

        let (data, content_type) = self.read_source(source, key).await?;
        let url = self
            .options
            .retry
            .run("put", || self.storage.put(key, &data, &content_type))
            .await?;
        tracing::info!("📤 Uploaded {} → {}", source, url);

        let mut state = self.state.lock().await;
        state.uploaded.insert(key.to_string(), url.clone());
        state.probes.insert(key.to_string(), true);
        Ok(url)
    }
}

#[async_trait::async_trait]
impl<S: Storage, R: MediaRepository> Pipeline for ReconcilePipeline<S, R> {
    fn backend(&self) -> StorageBackend {
        self.storage.backend()
    }

    fn dry_run(&self) -> bool {
        self.options.dry_run
    }

    async fn extract(&self, target: &MediaTarget) -> Result<Vec<MediaRow>> {
        let mut rows: Vec<MediaRow> = Vec::new();
        let mut after_id: Option<String> = None;

        loop {
            let page_size = match self.options.limit {
                Some(limit) => self.options.batch_size.min(limit.saturating_sub(rows.len())),
                None => self.options.batch_size,
            };
            if page_size == 0 {
                break;
            }

            let page = self
                .repository
                .fetch_page(target, after_id.as_deref(), page_size)
                .await?;
            let fetched = page.len();
            tracing::debug!("Fetched {} rows from {}", fetched, target.name());

            after_id = page.last().map(|row| row.id.clone());
            rows.extend(page);

            if fetched < page_size {
                break;
            }
        }

        Ok(rows)
    }

    async fn transform(&self, _target: &MediaTarget, rows: Vec<MediaRow>) -> Result<Vec<RowPlan>> {
        let mut plans = Vec::with_capacity(rows.len());
        for row in rows {
            let mut entries = Vec::new();
            for (index, raw) in row.value.entries().into_iter().enumerate() {
                entries.push(self.resolve_entry(index, raw).await);
            }
            plans.push(RowPlan { row, entries });
        }
        Ok(plans)
    }

    async fn load(&self, target: &MediaTarget, plans: Vec<RowPlan>) -> Result<TargetSummary> {
        let dry_run = self.options.dry_run;
        let mut summary = TargetSummary::new(target);

        for plan in plans {
            summary.rows_scanned += 1;
            let mut values = Vec::with_capacity(plan.entries.len());
            let mut changed = false;

            for entry in &plan.entries {
                let (value, outcome, resolved, detail) = match &entry.action {
                    Action::Keep => (entry.original.clone(), Outcome::Unchanged, None, None),
                    Action::Skip { reason } => (
                        entry.original.clone(),
                        Outcome::Skipped,
                        None,
                        Some(reason.clone()),
                    ),
                    Action::Rewrite { to } => {
                        changed = true;
                        let outcome = if dry_run {
                            Outcome::WouldRewrite
                        } else {
                            Outcome::Rewritten
                        };
                        (to.clone(), outcome, Some(to.clone()), None)
                    }
                    Action::Upload { source, key, to } => {
                        if dry_run {
                            changed = true;
                            (
                                to.clone(),
                                Outcome::WouldUpload,
                                Some(to.clone()),
                                Some(source.to_string()),
                            )
                        } else {
                            match self.perform_upload(source, key).await {
                                Ok(url) => {
                                    changed = true;
                                    (url.clone(), Outcome::Uploaded, Some(url), Some(source.to_string()))
                                }
                                Err(e) => {
                                    tracing::warn!(
                                        "⚠️ Upload of {} for {} row {} failed: {}",
                                        source,
                                        target.name(),
                                        plan.row.id,
                                        e
                                    );
                                    (entry.original.clone(), Outcome::Failed, None, Some(e.to_string()))
                                }
                            }
                        }
                    }
                    Action::Missing { reason } => {
                        tracing::warn!(
                            "⚠️ No match for '{}' ({} row {}): {}",
                            entry.original,
                            target.name(),
                            plan.row.id,
                            reason
                        );
                        (entry.original.clone(), Outcome::Missing, None, Some(reason.clone()))
                    }
                    Action::Failed { error } => {
                        (entry.original.clone(), Outcome::Failed, None, Some(error.clone()))
                    }
                };

                summary.counts.record(outcome);
                if outcome.is_notable() {
                    summary.entries.push(EntryReport {
                        target: target.name(),
                        row_id: plan.row.id.clone(),
                        index: entry.index,
                        original: entry.original.clone(),
                        resolved,
                        outcome,
                        detail,
                    });
                }
                values.push(value);
            }

            if !changed {
                continue;
            }

            let new_value = plan.row.value.with_entries(values);
            if dry_run {
                tracing::debug!("[dry-run] {} row {} → {:?}", target.name(), plan.row.id, new_value);
                continue;
            }

            self.repository
                .update(target, &plan.row.id, &new_value)
                .await?;
            summary.rows_updated += 1;
            tracing::debug!("💾 Updated {} row {}", target.name(), plan.row.id);
        }

        Ok(summary)
    }
}
