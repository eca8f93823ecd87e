//! Persisted record of each reconcile run

use crate::diff::DiffCounts;
use crate::export::ExportStats;
use crate::merge::MergeSummary;
use crate::snapshot::ParseStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How a run ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Raw and canonical agreed; nothing was merged or exported
    NoChanges,
    Merged {
        merge: MergeSummary,
        export: ExportStats,
    },
}

impl RunOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RunOutcome::NoChanges => "no_changes",
            RunOutcome::Merged { .. } => "merged",
        }
    }
}

/// Summary written to `.tabmerge/runs/<run_id>.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub snapshot_dir: PathBuf,
    /// blake3 over the names and contents of the raw files
    pub raw_fingerprint: String,
    pub raw: ParseStats,
    pub canonical_before: usize,
    pub canonical_after: usize,
    pub bootstrapped: bool,
    pub diff: DiffCounts,
    #[serde(flatten)]
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn is_no_changes(&self) -> bool {
        self.outcome == RunOutcome::NoChanges
    }
}

/// Identifier for a new run: UTC start time plus a random suffix
pub fn new_run_id(started_at: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", started_at.format("%Y%m%dT%H%M%SZ"), &suffix[..8])
}
