//! Canonical store and export failures on the filesystem

use crate::common::sample_data::{brewery, initial_breweries, page};
use crate::common::{CliTestRunner, TestFixture};
use std::fs;
use std::path::Path;
use tabmerge::archive::ArchiveManager;
use tabmerge::config::default_raw_schema;
use tabmerge::data::DataProcessor;
use tabmerge::export::PartitionedExporter;
use tabmerge::relation::CanonicalRelation;
use tabmerge::schema::SchemaDescriptor;
use tabmerge::value::Value;
use tabmerge::TabmergeError;
use tempfile::TempDir;
use walkdir::WalkDir;

fn entries_named(root: &Path, needle: &str) -> Vec<String> {
    fs::read_dir(root)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.contains(needle))
        .collect()
}

#[test]
fn test_canonical_root_that_is_a_file_is_unavailable() {
    let runner = CliTestRunner::new().unwrap();
    let fixture = runner.fixture();
    fixture.publish_snapshot("run_1", &[page(initial_breweries())]);

    let canonical_root = fixture.canonical_root();
    fs::create_dir_all(canonical_root.parent().unwrap()).unwrap();
    fs::write(&canonical_root, "not a dataset").unwrap();

    let err = runner.expect_failure(&["run"]);
    assert!(matches!(err, TabmergeError::StoreUnavailable { .. }));
    assert_eq!(err.exit_code(), 4);

    // The blocking file is left alone
    assert_eq!(fs::read_to_string(&canonical_root).unwrap(), "not a dataset");
}

#[test]
fn test_corrupt_parquet_is_unavailable() {
    let fixture = TestFixture::new().unwrap();
    fixture.publish_snapshot("run_1", &[page(initial_breweries())]);

    let partition = fixture.canonical_root().join("state=Ohio");
    fs::create_dir_all(&partition).unwrap();
    fs::write(partition.join("data_0.parquet"), b"definitely not parquet").unwrap();

    let err = fixture.run().unwrap_err();
    assert!(matches!(err, TabmergeError::StoreUnavailable { .. }));
}

#[test]
fn test_store_without_lifecycle_columns_is_drift() {
    let fixture = TestFixture::new().unwrap();
    fixture.publish_snapshot("run_1", &[page(initial_breweries())]);

    // A dataset holding only the raw columns, as if written by another tool
    let columns: Vec<_> = default_raw_schema()
        .into_iter()
        .map(|c| (c.name, c.column_type))
        .collect();
    let row: Vec<Value> = columns
        .iter()
        .map(|(name, _)| match name.as_str() {
            "id" => Value::Text("00000000-0000-4000-8000-000000000001".into()),
            "state" => Value::Text("Ohio".into()),
            _ => Value::Null,
        })
        .collect();
    let processor = DataProcessor::new().unwrap();
    processor
        .load_table("legacy", &columns, std::iter::once(row))
        .unwrap();
    processor
        .copy_partitioned("legacy", "state", "id", &fixture.canonical_root())
        .unwrap();

    match fixture.run().unwrap_err() {
        TabmergeError::SchemaDrift {
            relation, missing, ..
        } => {
            assert_eq!(relation, "canonical");
            assert!(missing.contains(&"created_at".to_string()));
            assert!(missing.contains(&"updated_at".to_string()));
            assert!(missing.contains(&"deleted_at".to_string()));
        }
        other => panic!("expected schema drift, got {other:?}"),
    }
}

#[test]
fn test_empty_store_directory_bootstraps() {
    let fixture = TestFixture::new().unwrap();
    fs::create_dir_all(fixture.canonical_root()).unwrap();
    fixture.publish_snapshot("run_1", &[page(initial_breweries())]);

    let report = fixture.run().unwrap();
    assert!(report.bootstrapped);
    assert_eq!(fixture.load_canonical().len(), 3);
}

#[test]
fn test_export_with_blocked_parent_fails() {
    let temp_dir = TempDir::new().unwrap();
    let blocker = temp_dir.path().join("silver");
    fs::write(&blocker, "a file where a directory belongs").unwrap();

    let schema = SchemaDescriptor::new(default_raw_schema(), "id");
    let exporter = PartitionedExporter::new(blocker.join("current_values"), "state", &schema);

    let err = exporter
        .export(&CanonicalRelation::bootstrap(&schema))
        .unwrap_err();
    assert!(matches!(err, TabmergeError::Export { .. }));
    assert_eq!(err.exit_code(), 5);
}

#[test]
fn test_state_change_moves_record_between_partitions() {
    let fixture = TestFixture::new().unwrap();
    fixture.publish_snapshot("run_1", &[page(vec![brewery(1, "A", "Ohio")])]);
    fixture.run().unwrap();
    assert!(fixture.canonical_root().join("state=Ohio").is_dir());

    fixture.publish_snapshot("run_2", &[page(vec![brewery(1, "A", "Texas")])]);
    fixture.run().unwrap();

    let canonical_root = fixture.canonical_root();
    assert!(!canonical_root.join("state=Ohio").exists());
    assert!(canonical_root.join("state=Texas").is_dir());
    assert_eq!(fixture.load_canonical().len(), 1);
}

#[test]
fn test_runs_leave_no_staging_directories() {
    let fixture = TestFixture::new().unwrap();
    fixture.publish_snapshot("run_1", &[page(initial_breweries())]);
    fixture.run().unwrap();
    fixture.publish_snapshot("run_2", &[page(vec![brewery(1, "A", "Ohio")])]);
    fixture.run().unwrap();

    let parent = fixture.canonical_root().parent().unwrap().to_path_buf();
    assert!(entries_named(&parent, "staging").is_empty());

    let stray: Vec<_> = WalkDir::new(fixture.canonical_root())
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().map_or(true, |ext| ext != "parquet"))
        .collect();
    assert!(stray.is_empty());
}

#[test]
fn test_backup_holds_previous_partitions() {
    let runner = CliTestRunner::new().unwrap();
    let fixture = runner.fixture();
    fixture.publish_snapshot("run_1", &[page(initial_breweries())]);
    runner.expect_success(&["run"]);

    fixture.publish_snapshot("run_2", &[page(vec![brewery(1, "A", "Maine")])]);
    runner.expect_success(&["run", "--backup"]);

    let backups = entries_named(&fixture.workspace.backups_dir, ".tar.zst");
    assert_eq!(backups.len(), 1);

    let archive = fixture.workspace.backups_dir.join(&backups[0]);
    let entries = ArchiveManager::list_archive_contents(&archive).unwrap();
    assert!(entries.iter().any(|e| e.path.starts_with("state=Ohio")));
    assert!(entries.iter().any(|e| e.path.starts_with("state=Texas")));
    assert!(!entries.iter().any(|e| e.path.starts_with("state=Maine")));
}
