//! Output formatting utilities

use crate::diff::{DiffCounts, DiffOutcome, DiffRecord};
use crate::error::Result;
use crate::pipeline::Preview;
use crate::report::{RunOutcome, RunReport};
use serde_json::{json, Map, Value as JsonValue};

/// Pretty printer for tabmerge output
pub struct PrettyPrinter;

impl PrettyPrinter {
    /// Print the classification of a preview, at most `limit` records
    pub fn print_diff_preview(preview: &Preview, limit: usize) {
        let loaded = &preview.loaded;
        println!("🔍 Diff preview: {}", loaded.raw.directory.display());
        println!(
            "├─ Raw records: {} ({} skipped)",
            loaded.raw.relation.len(),
            loaded.raw.stats.skipped_records
        );
        println!(
            "├─ Canonical records: {}{}",
            loaded.canonical.relation.len(),
            if loaded.canonical.bootstrapped {
                " (bootstrapped)"
            } else {
                ""
            }
        );

        let diff = match &preview.outcome {
            DiffOutcome::NoChanges => {
                println!("└─ ✅ No changes");
                return;
            }
            DiffOutcome::Changes(diff) => diff,
        };

        Self::print_counts(&diff.counts, "├─");

        let shown = diff.records.len().min(limit);
        println!("└─ Records ({} of {}):", shown, diff.records.len());
        for (i, record) in diff.records.iter().take(limit).enumerate() {
            let marker = if i + 1 == shown { "   └─" } else { "   ├─" };
            println!("{} {}", marker, describe_record(record));
        }
    }

    /// Print the outcome of a completed run
    pub fn print_run_report(report: &RunReport) {
        match &report.outcome {
            RunOutcome::NoChanges => {
                println!("✅ No changes: canonical dataset already matches the latest snapshot");
                println!("├─ Run: {}", report.run_id);
                println!("├─ Snapshot: {}", report.snapshot_dir.display());
                println!("└─ Canonical records: {}", report.canonical_after);
            }
            RunOutcome::Merged { merge, export } => {
                println!("✅ Merged snapshot into canonical dataset");
                println!("├─ Run: {}", report.run_id);
                println!("├─ Snapshot: {}", report.snapshot_dir.display());
                if report.raw.skipped_records > 0 || report.raw.skipped_files > 0 {
                    println!(
                        "├─ ⚠️  Skipped: {} records, {} files",
                        report.raw.skipped_records, report.raw.skipped_files
                    );
                }
                println!("├─ Inserted: {}", merge.inserted);
                println!("├─ Updated: {}", merge.updated);
                println!("├─ Soft-deleted: {}", merge.soft_deleted);
                println!("├─ Reinstated: {}", merge.reinstated);
                println!(
                    "├─ Canonical records: {} → {}",
                    report.canonical_before, report.canonical_after
                );
                if let Some(backup) = &export.backup {
                    println!("├─ Backup: {}", backup.display());
                }
                println!(
                    "└─ Published {} rows in {} partitions to {}",
                    export.rows_written,
                    export.partitions,
                    export.destination.display()
                );
            }
        }
    }

    /// Print stored run reports, oldest first
    pub fn print_run_list(reports: &[RunReport]) {
        if reports.is_empty() {
            println!("No runs recorded.");
            return;
        }

        println!("📜 Recorded runs:");
        for (i, report) in reports.iter().enumerate() {
            let prefix = if i == reports.len() - 1 { "└─" } else { "├─" };
            let detail = match &report.outcome {
                RunOutcome::NoChanges => "no changes".to_string(),
                RunOutcome::Merged { merge, export } => format!(
                    "+{} ~{} -{} ↺{}, {} rows published",
                    merge.inserted,
                    merge.updated,
                    merge.soft_deleted,
                    merge.reinstated,
                    export.rows_written
                ),
            };
            println!(
                "{} {} [{}] {}",
                prefix,
                report.run_id,
                report.started_at.format("%Y-%m-%d %H:%M:%S"),
                detail
            );
        }
    }

    fn print_counts(counts: &DiffCounts, prefix: &str) {
        println!("{} New: {}", prefix, counts.new);
        println!("{} Updated: {}", prefix, counts.updated);
        println!("{} Deleted: {}", prefix, counts.deleted);
        println!("{} Reinstated: {}", prefix, counts.reinstated);
    }
}

fn describe_record(record: &DiffRecord) -> String {
    if record.changed_columns.is_empty() {
        format!("{} {}", record.kind, record.key)
    } else {
        format!(
            "{} {} [{}]",
            record.kind,
            record.key,
            record.changed_columns.join(", ")
        )
    }
}

/// JSON formatter for machine-readable output
pub struct JsonFormatter;

impl JsonFormatter {
    /// Format any serializable data as JSON
    pub fn format<T: serde::Serialize + ?Sized>(data: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(data)?)
    }

    /// Preview as JSON; record values are keyed by column name
    pub fn format_diff_preview(preview: &Preview, limit: usize) -> Result<String> {
        let loaded = &preview.loaded;
        let (counts, records) = match &preview.outcome {
            DiffOutcome::NoChanges => (DiffCounts::default(), Vec::new()),
            DiffOutcome::Changes(diff) => {
                let records = diff
                    .records
                    .iter()
                    .take(limit)
                    .map(|record| record_json(record, &diff.attribute_columns))
                    .collect::<Vec<_>>();
                (diff.counts, records)
            }
        };

        let json = json!({
            "snapshot_dir": loaded.raw.directory,
            "raw_records": loaded.raw.relation.len(),
            "skipped_records": loaded.raw.stats.skipped_records,
            "skipped_files": loaded.raw.stats.skipped_files,
            "canonical_records": loaded.canonical.relation.len(),
            "bootstrapped": loaded.canonical.bootstrapped,
            "no_changes": preview.outcome.is_no_changes(),
            "counts": counts,
            "records": records,
        });
        Ok(serde_json::to_string_pretty(&json)?)
    }
}

fn record_json(record: &DiffRecord, columns: &[String]) -> JsonValue {
    let values = record.values.as_ref().map(|values| {
        columns
            .iter()
            .zip(values)
            .map(|(name, value)| {
                let value = serde_json::to_value(value).unwrap_or(JsonValue::Null);
                (name.clone(), value)
            })
            .collect::<Map<String, JsonValue>>()
    });

    json!({
        "key": record.key,
        "kind": record.kind,
        "changed_columns": record.changed_columns,
        "values": values,
    })
}
