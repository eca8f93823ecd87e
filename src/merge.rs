//! Application of a diff set to the canonical relation

use crate::diff::{ChangeKind, DiffRecord, DiffSet};
use crate::error::{Result, TabmergeError};
use crate::relation::{CanonicalRecord, CanonicalRelation};
use crate::value::Value;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of records touched by each merge pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSummary {
    pub inserted: usize,
    pub updated: usize,
    pub soft_deleted: usize,
    pub reinstated: usize,
}

impl MergeSummary {
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.soft_deleted + self.reinstated
    }
}

/// Current time at the store's microsecond precision
pub fn run_timestamp() -> NaiveDateTime {
    let now = Utc::now();
    DateTime::from_timestamp_micros(now.timestamp_micros())
        .unwrap_or(now)
        .naive_utc()
}

/// Applies diff sets in four ordered passes
pub struct MergeApplier;

impl MergeApplier {
    /// Mutate `canonical` according to `diff`, stamping every change with `now`.
    ///
    /// Passes run insert, update, soft-delete, reinstate.
    pub fn apply(
        canonical: &mut CanonicalRelation,
        diff: &DiffSet,
        compared: &[String],
        now: NaiveDateTime,
    ) -> Result<MergeSummary> {
        if diff.attribute_columns != canonical.attribute_names() {
            return Err(TabmergeError::schema_mismatch(
                "diff was computed against a different canonical attribute layout",
            ));
        }

        let compared_idx: Vec<usize> = compared
            .iter()
            .map(|name| {
                canonical.attribute_index(name).ok_or_else(|| {
                    TabmergeError::schema_mismatch(format!(
                        "compared column '{}' is not a canonical attribute",
                        name
                    ))
                })
            })
            .collect::<Result<_>>()?;

        let mut summary = MergeSummary::default();

        for record in diff.of_kind(ChangeKind::New) {
            if canonical.get(&record.key).is_some() {
                return Err(TabmergeError::data_processing(format!(
                    "cannot insert key {}: it already exists in the canonical relation",
                    record.key
                )));
            }
            canonical.insert(CanonicalRecord {
                key: record.key.clone(),
                values: raw_values(record)?.to_vec(),
                created_at: now,
                updated_at: now,
                deleted_at: None,
            });
            summary.inserted += 1;
        }

        for record in diff.of_kind(ChangeKind::Updated) {
            let values = raw_values(record)?;
            let existing = existing_mut(canonical, record)?;
            overwrite(existing, values, &compared_idx);
            existing.updated_at = now;
            summary.updated += 1;
        }

        for record in diff.of_kind(ChangeKind::Deleted) {
            let existing = existing_mut(canonical, record)?;
            if existing.deleted_at.is_none() {
                existing.deleted_at = Some(now);
                existing.updated_at = now;
                summary.soft_deleted += 1;
            }
        }

        for record in diff.of_kind(ChangeKind::Reinstated) {
            let values = raw_values(record)?;
            let existing = existing_mut(canonical, record)?;
            existing.deleted_at = None;
            overwrite(existing, values, &compared_idx);
            existing.updated_at = now;
            summary.reinstated += 1;
        }

        log::info!(
            "Merge applied: {} inserted, {} updated, {} soft-deleted, {} reinstated",
            summary.inserted,
            summary.updated,
            summary.soft_deleted,
            summary.reinstated
        );

        Ok(summary)
    }
}

fn raw_values(record: &DiffRecord) -> Result<&[Value]> {
    record.values.as_deref().ok_or_else(|| {
        TabmergeError::data_processing(format!(
            "{} record for key {} carries no raw values",
            record.kind, record.key
        ))
    })
}

fn existing_mut<'a>(
    canonical: &'a mut CanonicalRelation,
    record: &DiffRecord,
) -> Result<&'a mut CanonicalRecord> {
    canonical.get_mut(&record.key).ok_or_else(|| {
        TabmergeError::data_processing(format!(
            "cannot apply {} to key {}: it is not in the canonical relation",
            record.kind, record.key
        ))
    })
}

fn overwrite(existing: &mut CanonicalRecord, values: &[Value], compared_idx: &[usize]) {
    for &idx in compared_idx {
        if let Some(value) = values.get(idx) {
            existing.values[idx] = value.clone();
        }
    }
}
