use crate::domain::model::{MediaTarget, RunReport};
use crate::domain::ports::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;
use std::time::Instant;

pub struct ReconcileEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> ReconcileEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    /// 依序處理每個欄位；資料庫錯誤會中止整個執行
    pub async fn run(&self, targets: &[MediaTarget]) -> Result<RunReport> {
        let started_at = chrono::Utc::now();
        let dry_run = self.pipeline.dry_run();
        tracing::info!(
            "🚀 Reconciling {} target(s) against {} storage{}",
            targets.len(),
            self.pipeline.backend(),
            if dry_run { " (dry run)" } else { "" }
        );
        self.monitor.log_stats("Start");

        let mut summaries = Vec::with_capacity(targets.len());
        for target in targets {
            let start = Instant::now();
            let name = target.name();

            // Extract
            tracing::info!("📥 Extracting {}...", name);
            let rows = self.pipeline.extract(target).await?;
            tracing::info!("📥 {} rows from {}", rows.len(), name);
            self.monitor.log_stats("Extract");

            // Transform
            let plans = self.pipeline.transform(target, rows).await?;
            let pending = plans.iter().filter(|p| p.needs_write()).count();
            tracing::info!("🔄 {} of {} rows need changes", pending, plans.len());
            self.monitor.log_stats("Transform");

            // Load
            let summary = self.pipeline.load(target, plans).await?;
            self.monitor.log_stats("Load");

            tracing::info!(
                "✅ {} done in {:?}: {} updated, {} uploaded, {} rewritten, {} missing, {} failed",
                name,
                start.elapsed(),
                summary.rows_updated,
                summary.counts.uploaded + summary.counts.would_upload,
                summary.counts.rewritten + summary.counts.would_rewrite,
                summary.counts.missing,
                summary.counts.failed
            );
            summaries.push(summary);
        }

        self.monitor.log_final_stats();

        Ok(RunReport {
            started_at,
            finished_at: chrono::Utc::now(),
            dry_run,
            backend: self.pipeline.backend(),
            targets: summaries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{
        Action, EntryPlan, MediaRow, MediaValue, Outcome, RowPlan, StorageBackend, StoredRef,
        TargetSummary,
    };
    use crate::utils::error::ReconcileError;
    use std::sync::Mutex;

    struct MockPipeline {
        fail_on: Option<String>,
        calls: Mutex<Vec<String>>,
    }

    impl MockPipeline {
        fn new() -> Self {
            Self {
                fail_on: None,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl Pipeline for MockPipeline {
        fn backend(&self) -> StorageBackend {
            StorageBackend::Local
        }

        fn dry_run(&self) -> bool {
            false
        }

        async fn extract(&self, target: &MediaTarget) -> Result<Vec<MediaRow>> {
            self.calls.lock().unwrap().push(format!("extract {}", target.name()));
            if self.fail_on.as_deref() == Some(target.table.as_str()) {
                return Err(ReconcileError::processing("relation does not exist"));
            }
            Ok(vec![MediaRow {
                id: "1".to_string(),
                value: MediaValue::Single(Some("a.jpg".to_string())),
            }])
        }

        async fn transform(&self, _target: &MediaTarget, rows: Vec<MediaRow>) -> Result<Vec<RowPlan>> {
            Ok(rows
                .into_iter()
                .map(|row| RowPlan {
                    row,
                    entries: vec![EntryPlan {
                        index: 0,
                        original: "a.jpg".to_string(),
                        stored_ref: StoredRef::Local {
                            rel_path: "a.jpg".to_string(),
                        },
                        action: Action::Rewrite {
                            to: "/uploads/a.jpg".to_string(),
                        },
                    }],
                })
                .collect())
        }

        async fn load(&self, target: &MediaTarget, plans: Vec<RowPlan>) -> Result<TargetSummary> {
            let mut summary = TargetSummary::new(target);
            summary.rows_scanned = plans.len();
            summary.rows_updated = plans.len();
            for _ in &plans {
                summary.counts.record(Outcome::Rewritten);
            }
            Ok(summary)
        }
    }

    fn targets() -> Vec<MediaTarget> {
        vec![
            MediaTarget::product_images(),
            MediaTarget {
                table: "Category".to_string(),
                column: "image".to_string(),
                ..MediaTarget::product_images()
            },
        ]
    }

    #[tokio::test]
    async fn test_run_collects_summaries_in_order() {
        let engine = ReconcileEngine::new(MockPipeline::new());
        let report = engine.run(&targets()).await.unwrap();

        assert_eq!(report.targets.len(), 2);
        assert_eq!(report.targets[0].target, "Product.images");
        assert_eq!(report.targets[1].target, "Category.image");
        assert_eq!(report.rows_updated(), 2);
        assert_eq!(report.totals().rewritten, 2);
        assert!(report.finished_at >= report.started_at);
    }

    #[tokio::test]
    async fn test_extract_error_aborts_run() {
        let pipeline = MockPipeline {
            fail_on: Some("Product".to_string()),
            ..MockPipeline::new()
        };
        let engine = ReconcileEngine::new_with_monitoring(pipeline, true);

        assert!(engine.run(&targets()).await.is_err());
        assert_eq!(
            engine.pipeline().calls.lock().unwrap().clone(),
            vec!["extract Product.images".to_string()]
        );
    }
}
