//! Classification of raw records against the canonical dataset

use crate::error::{Result, TabmergeError};
use crate::relation::{CanonicalRelation, RawRelation};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The single change category of a diff record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    New,
    Updated,
    Deleted,
    Reinstated,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::New => "new",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Reinstated => "reinstated",
        };
        f.write_str(label)
    }
}

/// One natural key selected for the diff set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffRecord {
    pub key: String,
    pub kind: ChangeKind,
    /// Raw values in canonical attribute order; `None` for deletions
    pub values: Option<Vec<Value>>,
    /// Compared columns whose raw value differs from the canonical one
    pub changed_columns: Vec<String>,
}

impl DiffRecord {
    pub fn is_new(&self) -> bool {
        self.kind == ChangeKind::New
    }

    pub fn is_updated(&self) -> bool {
        self.kind == ChangeKind::Updated
    }

    pub fn is_deleted(&self) -> bool {
        self.kind == ChangeKind::Deleted
    }

    pub fn is_reinstated(&self) -> bool {
        self.kind == ChangeKind::Reinstated
    }
}

/// Per-kind record counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffCounts {
    pub new: usize,
    pub updated: usize,
    pub deleted: usize,
    pub reinstated: usize,
}

impl DiffCounts {
    pub fn total(&self) -> usize {
        self.new + self.updated + self.deleted + self.reinstated
    }

    fn record(&mut self, kind: ChangeKind) {
        match kind {
            ChangeKind::New => self.new += 1,
            ChangeKind::Updated => self.updated += 1,
            ChangeKind::Deleted => self.deleted += 1,
            ChangeKind::Reinstated => self.reinstated += 1,
        }
    }
}

/// A non-empty set of classified records
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffSet {
    /// Canonical attribute order that `DiffRecord::values` follows
    pub attribute_columns: Vec<String>,
    pub counts: DiffCounts,
    pub records: Vec<DiffRecord>,
}

impl DiffSet {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn of_kind(&self, kind: ChangeKind) -> impl Iterator<Item = &DiffRecord> {
        self.records.iter().filter(move |r| r.kind == kind)
    }
}

/// Result of a diff computation
#[derive(Debug, Clone, PartialEq)]
pub enum DiffOutcome {
    /// Raw and canonical agree for every key
    NoChanges,
    Changes(DiffSet),
}

impl DiffOutcome {
    pub fn is_no_changes(&self) -> bool {
        matches!(self, DiffOutcome::NoChanges)
    }

    pub fn counts(&self) -> DiffCounts {
        match self {
            DiffOutcome::NoChanges => DiffCounts::default(),
            DiffOutcome::Changes(diff) => diff.counts,
        }
    }
}

/// Computes diff sets by hash join on the natural key
pub struct DiffEngine;

impl DiffEngine {
    /// Classify every key present in either relation.
    ///
    /// Records follow raw order first, then canonical order for deletions.
    pub fn compute(
        compared: &[String],
        raw: &RawRelation,
        canonical: &CanonicalRelation,
    ) -> Result<DiffOutcome> {
        let projection = Self::projection(raw, canonical)?;
        let compared_pairs = Self::compared_pairs(compared, raw, canonical)?;

        let mut counts = DiffCounts::default();
        let mut records = Vec::new();

        for raw_record in raw.records.values() {
            let project = || -> Vec<Value> {
                projection
                    .iter()
                    .map(|&i| raw_record.values[i].clone())
                    .collect()
            };

            let classified = match canonical.get(&raw_record.key) {
                None => Some((ChangeKind::New, Vec::new())),
                Some(existing) => {
                    let changed: Vec<String> = compared_pairs
                        .iter()
                        .filter(|(_, raw_idx, canonical_idx)| {
                            raw_record.values[*raw_idx]
                                .is_distinct_from(&existing.values[*canonical_idx])
                        })
                        .map(|(name, _, _)| name.clone())
                        .collect();

                    if !existing.is_active() {
                        Some((ChangeKind::Reinstated, changed))
                    } else if !changed.is_empty() {
                        Some((ChangeKind::Updated, changed))
                    } else {
                        None
                    }
                }
            };

            if let Some((kind, changed_columns)) = classified {
                counts.record(kind);
                records.push(DiffRecord {
                    key: raw_record.key.clone(),
                    kind,
                    values: Some(project()),
                    changed_columns,
                });
            }
        }

        for existing in canonical.records.values() {
            if existing.is_active() && raw.get(&existing.key).is_none() {
                counts.record(ChangeKind::Deleted);
                records.push(DiffRecord {
                    key: existing.key.clone(),
                    kind: ChangeKind::Deleted,
                    values: None,
                    changed_columns: Vec::new(),
                });
            }
        }

        log::info!(
            "Diff computed: {} new, {} updated, {} deleted, {} reinstated",
            counts.new,
            counts.updated,
            counts.deleted,
            counts.reinstated
        );

        if records.is_empty() {
            return Ok(DiffOutcome::NoChanges);
        }

        Ok(DiffOutcome::Changes(DiffSet {
            attribute_columns: canonical.attribute_names().to_vec(),
            counts,
            records,
        }))
    }

    /// Raw column index for every canonical attribute
    fn projection(raw: &RawRelation, canonical: &CanonicalRelation) -> Result<Vec<usize>> {
        canonical
            .attribute_names()
            .iter()
            .map(|name| {
                raw.column_index(name).ok_or_else(|| {
                    TabmergeError::schema_mismatch(format!(
                        "raw relation has no column '{}'",
                        name
                    ))
                })
            })
            .collect()
    }

    fn compared_pairs(
        compared: &[String],
        raw: &RawRelation,
        canonical: &CanonicalRelation,
    ) -> Result<Vec<(String, usize, usize)>> {
        compared
            .iter()
            .map(|name| match (raw.column_index(name), canonical.attribute_index(name)) {
                (Some(raw_idx), Some(canonical_idx)) => Ok((name.clone(), raw_idx, canonical_idx)),
                _ => Err(TabmergeError::schema_mismatch(format!(
                    "compared column '{}' is not present in both relations",
                    name
                ))),
            })
            .collect()
    }
}
