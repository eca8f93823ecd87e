//! Integration tests for the run, diff, validate and runs commands

use crate::common::sample_data::{brewery, brewery_id, initial_breweries, page};
use crate::common::{assertions, CliTestRunner};
use std::fs;
use tabmerge::report::RunOutcome;

#[test]
fn test_first_run_bootstraps_and_publishes() {
    let runner = CliTestRunner::new().unwrap();
    let fixture = runner.fixture();
    fixture.publish_snapshot("run_1", &[page(initial_breweries())]);

    assert_eq!(runner.expect_success(&["run"]), 0);

    let canonical_root = fixture.canonical_root();
    assertions::assert_dir_exists(&canonical_root.join("state=Ohio"));
    assertions::assert_dir_exists(&canonical_root.join("state=Texas"));

    let canonical = fixture.load_canonical();
    assert_eq!(canonical.len(), 3);
    assert_eq!(canonical.active_count(), 3);

    let reports = fixture.workspace.list_run_reports().unwrap();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert!(report.bootstrapped);
    assert_eq!(report.canonical_before, 0);
    assert_eq!(report.canonical_after, 3);
    assert_eq!(report.diff.new, 3);
    match &report.outcome {
        RunOutcome::Merged { merge, export } => {
            assert_eq!(merge.inserted, 3);
            assert_eq!(export.rows_written, 3);
            assert_eq!(export.partitions, 2);
        }
        other => panic!("expected merged outcome, got {other:?}"),
    }
}

#[test]
fn test_repeated_run_is_no_op_with_configured_exit_code() {
    let runner = CliTestRunner::new().unwrap();
    let fixture = runner.fixture();
    fixture.publish_snapshot("run_1", &[page(initial_breweries())]);
    runner.expect_success(&["run"]);
    let before = fixture.load_canonical();

    let code = runner.expect_success(&["run", "--no-changes-exit-code", "9"]);
    assert_eq!(code, 9);

    assert_eq!(fixture.load_canonical(), before);
    let reports = fixture.workspace.list_run_reports().unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().any(|r| r.is_no_changes()));
}

#[test]
fn test_dry_run_writes_nothing() {
    let runner = CliTestRunner::new().unwrap();
    let fixture = runner.fixture();
    fixture.publish_snapshot("run_1", &[page(initial_breweries())]);

    assert_eq!(runner.expect_success(&["run", "--dry-run"]), 0);
    assert_eq!(
        runner.expect_success(&["run", "--dry-run", "--format", "json"]),
        0
    );

    assert!(!fixture.canonical_root().exists());
    assert!(fixture.workspace.list_run_reports().unwrap().is_empty());
}

#[test]
fn test_pointer_selects_latest_run() {
    let runner = CliTestRunner::new().unwrap();
    let fixture = runner.fixture();
    fixture.publish_snapshot("run_1", &[page(initial_breweries())]);
    runner.expect_success(&["run"]);

    fixture.publish_snapshot(
        "run_2",
        &[
            page(vec![brewery(1, "Anchor Works", "Ohio")]),
            page(vec![brewery(4, "Hill Country", "Texas")]),
        ],
    );
    runner.expect_success(&["run"]);

    let canonical = fixture.load_canonical();
    assert_eq!(canonical.len(), 4);
    assert_eq!(canonical.active_count(), 2);
    assert!(canonical.get(&brewery_id(4)).unwrap().is_active());
    assert!(!canonical.get(&brewery_id(2)).unwrap().is_active());

    let reports = fixture.workspace.list_run_reports().unwrap();
    let last = reports.last().unwrap();
    assert!(last.snapshot_dir.ends_with("run_2"));
    assert_eq!(last.raw.files_read, 2);
    assert_eq!(last.diff.new, 1);
    assert_eq!(last.diff.deleted, 2);
}

#[test]
fn test_backup_flag_archives_previous_dataset() {
    let runner = CliTestRunner::new().unwrap();
    let fixture = runner.fixture();
    fixture.publish_snapshot("run_1", &[page(initial_breweries())]);
    runner.expect_success(&["run", "--backup"]);

    // Nothing was published before the first run, so nothing to back up
    let reports = fixture.workspace.list_run_reports().unwrap();
    match &reports[0].outcome {
        RunOutcome::Merged { export, .. } => assert!(export.backup.is_none()),
        other => panic!("expected merged outcome, got {other:?}"),
    }

    fixture.publish_snapshot("run_2", &[page(vec![brewery(1, "Anchor Works", "Ohio")])]);
    runner.expect_success(&["run", "--backup"]);

    let backups: Vec<_> = fs::read_dir(&fixture.workspace.backups_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .collect();
    assert_eq!(backups.len(), 1);
    assert!(backups[0]
        .file_name()
        .to_string_lossy()
        .ends_with(".tar.zst"));
}

#[test]
fn test_preview_commands_succeed() {
    let runner = CliTestRunner::new().unwrap();
    let fixture = runner.fixture();
    fixture.publish_snapshot("run_1", &[page(initial_breweries())]);

    assert_eq!(runner.expect_success(&["diff"]), 0);
    assert_eq!(runner.expect_success(&["diff", "--format", "json", "--limit", "1"]), 0);
    assert_eq!(runner.expect_success(&["validate"]), 0);

    runner.expect_success(&["run", "--format", "json"]);
    assert_eq!(runner.expect_success(&["runs"]), 0);
    assert_eq!(runner.expect_success(&["runs", "--format", "json"]), 0);
}

#[test]
fn test_invalid_format_is_rejected() {
    let runner = CliTestRunner::new().unwrap();
    runner
        .fixture()
        .publish_snapshot("run_1", &[page(initial_breweries())]);

    let err = runner.expect_failure(&["diff", "--format", "xml"]);
    assert!(matches!(err, tabmerge::TabmergeError::InvalidInput { .. }));
}

#[test]
fn test_run_report_file_is_written() {
    let runner = CliTestRunner::new().unwrap();
    let fixture = runner.fixture();
    fixture.publish_snapshot("run_1", &[page(initial_breweries())]);

    let report = fixture.run().unwrap();
    let path = fixture.workspace.run_report_path(&report.run_id);

    assertions::assert_json_contains_keys(
        &path,
        &[
            "run_id",
            "started_at",
            "snapshot_dir",
            "raw_fingerprint",
            "canonical_before",
            "canonical_after",
            "outcome",
            "merge",
            "export",
        ],
    )
    .unwrap();
}
