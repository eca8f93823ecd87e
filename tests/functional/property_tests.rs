//! Idempotence, created_at immutability, exclusivity and round-trip properties

use crate::common::sample_data::{brewery, page};
use crate::common::TestFixture;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::collections::{HashMap, HashSet};
use tabmerge::config::default_raw_schema;
use tabmerge::diff::{DiffEngine, DiffOutcome};
use tabmerge::export::PartitionedExporter;
use tabmerge::merge::MergeApplier;
use tabmerge::relation::{CanonicalRelation, RawRecord, RawRelation};
use tabmerge::schema::{ColumnInfo, SchemaDescriptor};
use tabmerge::value::Value;
use tabmerge::SnapshotLoader;
use tempfile::TempDir;

/// Small deterministic generator so cycles are reproducible
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

fn schema() -> SchemaDescriptor {
    SchemaDescriptor::new(default_raw_schema(), "id")
}

fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 2, 1)
        .unwrap()
        .and_hms_opt(6, 0, 0)
        .unwrap()
}

/// A raw snapshot over keys 0..20 where each key is present with some probability
fn random_snapshot(rng: &mut Lcg) -> RawRelation {
    let schema = schema();
    let columns: Vec<ColumnInfo> = schema
        .raw()
        .iter()
        .map(|c| ColumnInfo::new(c.name.clone(), c.column_type.name()))
        .collect();
    let mut relation = RawRelation::new(columns.clone());

    for n in 0..20u32 {
        if rng.below(3) == 0 {
            continue;
        }
        let id = format!("00000000-0000-4000-8000-{:012}", n);
        let values = columns
            .iter()
            .map(|c| match c.name.as_str() {
                "id" => Value::Text(id.clone()),
                "state" => Value::Text(["Ohio", "Texas", "Maine"][rng.below(3) as usize].into()),
                "name" => Value::Text(format!("Brewery {} v{}", n, rng.below(2))),
                "latitude" | "longitude" => match rng.below(3) {
                    0 => Value::Null,
                    v => Value::Double(v as f64 + 0.5),
                },
                "phone" => {
                    if rng.below(2) == 0 {
                        Value::Null
                    } else {
                        Value::Text("5550100".into())
                    }
                }
                _ => Value::Text(c.name.clone()),
            })
            .collect();
        relation.insert(RawRecord { key: id, values });
    }

    relation
}

fn reconcile(
    raw: &RawRelation,
    canonical: &mut CanonicalRelation,
    now: NaiveDateTime,
) -> Option<tabmerge::DiffSet> {
    let compared = schema().compared_columns();
    match DiffEngine::compute(&compared, raw, canonical).unwrap() {
        DiffOutcome::NoChanges => None,
        DiffOutcome::Changes(diff) => {
            MergeApplier::apply(canonical, &diff, &compared, now).unwrap();
            Some(diff)
        }
    }
}

#[test]
fn test_recomputed_diff_is_always_empty() {
    let mut rng = Lcg(7);
    let mut canonical = CanonicalRelation::bootstrap(&schema());

    for cycle in 0..25 {
        let raw = random_snapshot(&mut rng);
        reconcile(&raw, &mut canonical, t0() + Duration::minutes(cycle));

        let again = DiffEngine::compute(&schema().compared_columns(), &raw, &canonical).unwrap();
        assert!(again.is_no_changes(), "cycle {} left a non-empty diff", cycle);
    }
}

#[test]
fn test_created_at_never_changes() {
    let mut rng = Lcg(11);
    let mut canonical = CanonicalRelation::bootstrap(&schema());
    let mut first_seen: HashMap<String, NaiveDateTime> = HashMap::new();

    for cycle in 0..25 {
        let raw = random_snapshot(&mut rng);
        reconcile(&raw, &mut canonical, t0() + Duration::minutes(cycle));

        for record in canonical.records.values() {
            let created = first_seen
                .entry(record.key.clone())
                .or_insert(record.created_at);
            assert_eq!(record.created_at, *created, "created_at of {} moved", record.key);
            assert!(record.updated_at >= record.created_at);
            if let Some(deleted_at) = record.deleted_at {
                assert!(deleted_at <= record.updated_at);
            }
        }
    }
}

#[test]
fn test_each_key_appears_once_with_consistent_kind() {
    let mut rng = Lcg(23);
    let mut canonical = CanonicalRelation::bootstrap(&schema());

    for cycle in 0..25 {
        let raw = random_snapshot(&mut rng);
        let before = canonical.clone();
        let Some(diff) = reconcile(&raw, &mut canonical, t0() + Duration::minutes(cycle)) else {
            continue;
        };

        let mut seen = HashSet::new();
        for record in &diff.records {
            assert!(seen.insert(record.key.clone()), "key {} classified twice", record.key);

            let flags = [
                record.is_new(),
                record.is_updated(),
                record.is_deleted(),
                record.is_reinstated(),
            ];
            assert_eq!(flags.iter().filter(|f| **f).count(), 1);

            let existing = before.get(&record.key);
            let in_raw = raw.get(&record.key).is_some();
            if record.is_new() {
                assert!(existing.is_none() && in_raw);
            } else if record.is_deleted() {
                assert!(!in_raw && existing.unwrap().is_active());
            } else if record.is_reinstated() {
                assert!(in_raw && !existing.unwrap().is_active());
            } else {
                assert!(in_raw && existing.unwrap().is_active());
                assert!(!record.changed_columns.is_empty());
            }
        }
        assert_eq!(diff.counts.total(), diff.records.len());
    }
}

#[test]
fn test_export_and_reload_reproduce_relation() {
    let temp_dir = TempDir::new().unwrap();
    let destination = temp_dir.path().join("current_values");
    let exporter = PartitionedExporter::new(destination.clone(), "state", &schema());
    let loader = SnapshotLoader::new(
        temp_dir.path().join("bronze"),
        "pointer.json",
        "*.json",
        destination,
        schema(),
    );

    let mut rng = Lcg(42);
    let mut canonical = CanonicalRelation::bootstrap(&schema());

    for cycle in 0..4 {
        let raw = random_snapshot(&mut rng);
        reconcile(&raw, &mut canonical, t0() + Duration::hours(cycle));

        let stats = exporter.export(&canonical).unwrap();
        assert_eq!(stats.rows_written, canonical.len() as u64);

        let reloaded = loader.load_canonical().unwrap().relation;
        assert_eq!(reloaded.len(), canonical.len());
        for record in canonical.records.values() {
            let loaded = reloaded.get(&record.key).unwrap();
            assert_eq!(loaded.created_at, record.created_at);
            assert_eq!(loaded.updated_at, record.updated_at);
            assert_eq!(loaded.deleted_at, record.deleted_at);
            for name in canonical.attribute_names() {
                assert_eq!(
                    reloaded.value(loaded, name),
                    canonical.value(record, name),
                    "column {} of {}",
                    name,
                    record.key
                );
            }
        }
    }
}

#[test]
fn test_pipeline_leaves_nothing_to_diff() {
    let fixture = TestFixture::new().unwrap();
    fixture.publish_snapshot(
        "run_1",
        &[
            page(vec![brewery(1, "A", "Ohio"), brewery(2, "B", "Texas")]),
            page(vec![brewery(3, "C", "Maine")]),
        ],
    );
    fixture.run().unwrap();

    let preview = fixture.reconciler().preview().unwrap();
    assert!(preview.outcome.is_no_changes());
}
