//! Integration tests for the init command

use crate::common::{assertions, CliTestRunner};

#[test]
fn test_init_command_success() {
    let runner = CliTestRunner::new_empty().unwrap();

    assert_eq!(runner.expect_success(&["init"]), 0);

    let fixture = runner.fixture();
    assertions::assert_dir_exists(&fixture.workspace.tabmerge_dir);
    assertions::assert_dir_exists(&fixture.workspace.runs_dir);
    assertions::assert_dir_exists(&fixture.workspace.backups_dir);

    let config_path = fixture.workspace.config_path();
    assertions::assert_file_exists_and_not_empty(&config_path);
    assertions::assert_json_contains_keys(
        &config_path,
        &[
            "version",
            "created",
            "raw_root",
            "run_pointer",
            "raw_file_pattern",
            "canonical_root",
            "natural_key",
            "partition_column",
            "raw_schema",
        ],
    )
    .unwrap();

    assertions::assert_file_exists_and_not_empty(&fixture.root().join(".gitignore"));
}

#[test]
fn test_init_command_already_exists() {
    let runner = CliTestRunner::new().unwrap();

    // Re-running init keeps the existing workspace
    runner.expect_success(&["init"]);
    runner.expect_success(&["init"]);
}

#[test]
fn test_init_keeps_existing_config_without_force() {
    let runner = CliTestRunner::new().unwrap();
    let config_path = runner.fixture().workspace.config_path();

    let mut config = runner.fixture().config();
    config.partition_column = "city".to_string();
    runner.fixture().save_config(&config);

    runner.expect_success(&["init"]);
    assert_eq!(runner.fixture().config().partition_column, "city");

    runner.expect_success(&["init", "--force"]);
    assert_eq!(runner.fixture().config().partition_column, "state");
    assertions::assert_file_exists_and_not_empty(&config_path);
}

#[test]
fn test_init_preserves_existing_gitignore() {
    let runner = CliTestRunner::new_empty().unwrap();

    let gitignore_path = runner.fixture().root().join(".gitignore");
    std::fs::write(&gitignore_path, "# Existing content\n*.log\n").unwrap();

    runner.expect_success(&["init"]);

    let content = std::fs::read_to_string(&gitignore_path).unwrap();
    assert!(content.contains("# Existing content"));
    assert!(content.contains("*.log"));
    assert!(content.contains(".tabmerge/backups/"));
}

#[test]
fn test_commands_require_a_workspace() {
    let runner = CliTestRunner::new_empty().unwrap();
    std::fs::create_dir(runner.fixture().root().join(".git")).unwrap();

    let err = runner.expect_failure(&["run"]);
    assert!(matches!(err, tabmerge::TabmergeError::Workspace(_)));
}
