use crate::domain::model::{Outcome, OutcomeCounts, RunReport};
use crate::utils::error::{ReconcileError, Result};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::{FileOptions, ZipWriter};

const ENTRY_HEADERS: [&str; 7] = [
    "target", "row_id", "index", "outcome", "original", "resolved", "detail",
];

#[derive(Serialize)]
struct SummaryDocument<'a> {
    #[serde(flatten)]
    report: &'a RunReport,
    rows_updated: usize,
    totals: OutcomeCounts,
}

pub fn summary_json(report: &RunReport) -> Result<String> {
    let document = SummaryDocument {
        report,
        rows_updated: report.rows_updated(),
        totals: report.totals(),
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

/// 每個值得注意的項目一列（未變更與略過的不列入）
pub fn entries_csv(report: &RunReport) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(ENTRY_HEADERS)?;

    for entry in report.entries() {
        let index = entry.index.to_string();
        writer.write_record([
            entry.target.as_str(),
            entry.row_id.as_str(),
            index.as_str(),
            entry.outcome.as_str(),
            entry.original.as_str(),
            entry.resolved.as_deref().unwrap_or(""),
            entry.detail.as_deref().unwrap_or(""),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ReconcileError::processing(format!("Failed to finish CSV: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| ReconcileError::processing(format!("CSV is not valid UTF-8: {}", e)))
}

pub fn report_file_name(report: &RunReport) -> String {
    format!("reconcile-{}.zip", report.finished_at.format("%Y%m%d-%H%M%S"))
}

/// 寫出 `reconcile-<時間>.zip`，內含 summary.json 與 entries.csv
pub async fn write_report_bundle(dir: &Path, report: &RunReport) -> Result<PathBuf> {
    let summary = summary_json(report)?;
    let entries = entries_csv(report)?;

    let zip_data = {
        let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

        zip.start_file::<_, ()>("summary.json", FileOptions::default())?;
        zip.write_all(summary.as_bytes())?;

        zip.start_file::<_, ()>("entries.csv", FileOptions::default())?;
        zip.write_all(entries.as_bytes())?;

        let cursor = zip.finish()?;
        cursor.into_inner()
    };

    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(report_file_name(report));
    tokio::fs::write(&path, &zip_data).await?;

    tracing::info!("📦 Report saved: {}", path.display());
    Ok(path)
}

pub fn print_summary(report: &RunReport) {
    let mode = if report.dry_run { " (dry run)" } else { "" };
    println!("Media reconcile against {} storage{}", report.backend, mode);
    println!(
        "{:<28} {:>6} {:>8} {:>9} {:>9} {:>8} {:>7} {:>7}",
        "target", "rows", "updated", "unchanged", "rewritten", "uploaded", "missing", "failed"
    );
    for summary in &report.targets {
        let c = &summary.counts;
        println!(
            "{:<28} {:>6} {:>8} {:>9} {:>9} {:>8} {:>7} {:>7}",
            summary.target,
            summary.rows_scanned,
            summary.rows_updated,
            c.unchanged,
            c.rewritten + c.would_rewrite,
            c.uploaded + c.would_upload,
            c.missing,
            c.failed
        );
    }

    let missing: Vec<_> = report
        .entries()
        .filter(|e| e.outcome == Outcome::Missing)
        .collect();
    if !missing.is_empty() {
        println!();
        println!("Unmatched ({}):", missing.len());
        for entry in missing {
            println!("  {} #{} [{}] {}", entry.target, entry.row_id, entry.index, entry.original);
        }
    }
}
