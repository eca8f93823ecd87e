//! Command implementations for tabmerge CLI

use crate::cli::{Commands, OutputFormat};
use crate::error::{Result, TabmergeError};
use crate::output::{JsonFormatter, PrettyPrinter};
use crate::pipeline::{Reconciler, RunOptions};
use crate::workspace::TabmergeWorkspace;
use std::path::Path;

/// Execute a command, returning the process exit status on success
pub fn execute_command(
    command: Commands,
    workspace_path: Option<&Path>,
    show_progress: bool,
) -> Result<i32> {
    match command {
        Commands::Init { force } => init_command(workspace_path, force),
        Commands::Run {
            dry_run,
            backup,
            no_changes_exit_code,
            format,
        } => run_command(
            workspace_path,
            dry_run,
            backup,
            no_changes_exit_code,
            &format,
            show_progress,
        ),
        Commands::Diff { format, limit } => diff_command(workspace_path, &format, limit),
        Commands::Validate => validate_command(workspace_path),
        Commands::Runs { format } => runs_command(workspace_path, &format),
    }
}

fn parse_format(format: &str) -> Result<OutputFormat> {
    OutputFormat::parse(format).map_err(TabmergeError::invalid_input)
}

/// Initialize tabmerge workspace
fn init_command(workspace_path: Option<&Path>, force: bool) -> Result<i32> {
    let current_dir = std::env::current_dir()?;
    let root = workspace_path.unwrap_or(&current_dir);

    let workspace = if force {
        let workspace = TabmergeWorkspace::from_root(root.to_path_buf());
        workspace.create_dirs()?;
        workspace.create_config_with_force(true)?;
        workspace.ensure_gitignore()?;
        workspace
    } else {
        // Always initialise in the given directory, never a parent's workspace
        TabmergeWorkspace::create_new(root.to_path_buf())?
    };

    println!("✅ Initialized tabmerge workspace at: {}", workspace.root.display());
    println!("📁 Configuration: {}", workspace.config_path().display());

    Ok(0)
}

/// Reconcile the latest snapshot
fn run_command(
    workspace_path: Option<&Path>,
    dry_run: bool,
    backup: bool,
    no_changes_exit_code: i32,
    format: &str,
    show_progress: bool,
) -> Result<i32> {
    let format = parse_format(format)?;
    let workspace = TabmergeWorkspace::find(workspace_path)?;
    let reconciler = Reconciler::from_workspace(&workspace)?;

    if dry_run {
        let preview = reconciler.preview()?;
        match format {
            OutputFormat::Pretty => PrettyPrinter::print_diff_preview(&preview, usize::MAX),
            OutputFormat::Json => {
                println!("{}", JsonFormatter::format_diff_preview(&preview, usize::MAX)?)
            }
        }
        return Ok(if preview.outcome.is_no_changes() {
            no_changes_exit_code
        } else {
            0
        });
    }

    let report = reconciler.run(RunOptions {
        backup,
        // JSON output must stay clean on stdout
        show_progress: show_progress && format == OutputFormat::Pretty,
    })?;

    match format {
        OutputFormat::Pretty => PrettyPrinter::print_run_report(&report),
        OutputFormat::Json => println!("{}", JsonFormatter::format(&report)?),
    }

    Ok(if report.is_no_changes() {
        no_changes_exit_code
    } else {
        0
    })
}

/// Preview classification without side effects
fn diff_command(workspace_path: Option<&Path>, format: &str, limit: usize) -> Result<i32> {
    let format = parse_format(format)?;
    let workspace = TabmergeWorkspace::find(workspace_path)?;
    let preview = Reconciler::from_workspace(&workspace)?.preview()?;

    match format {
        OutputFormat::Pretty => PrettyPrinter::print_diff_preview(&preview, limit),
        OutputFormat::Json => println!("{}", JsonFormatter::format_diff_preview(&preview, limit)?),
    }

    Ok(0)
}

/// Load both relations and validate their schemas
fn validate_command(workspace_path: Option<&Path>) -> Result<i32> {
    let workspace = TabmergeWorkspace::find(workspace_path)?;
    let reconciler = Reconciler::from_workspace(&workspace)?;
    let loaded = reconciler.load()?;
    reconciler.validate(&loaded)?;

    println!("✅ Schemas match the configured descriptor");
    println!(
        "├─ Raw: {} columns, {} records ({} skipped)",
        loaded.raw.relation.columns.len(),
        loaded.raw.relation.len(),
        loaded.raw.stats.skipped_records
    );
    println!(
        "└─ Canonical: {} columns, {} records{}",
        loaded.canonical.relation.columns.len(),
        loaded.canonical.relation.len(),
        if loaded.canonical.bootstrapped {
            " (bootstrapped)"
        } else {
            ""
        }
    );

    Ok(0)
}

/// List recorded runs
fn runs_command(workspace_path: Option<&Path>, format: &str) -> Result<i32> {
    let format = parse_format(format)?;
    let workspace = TabmergeWorkspace::find(workspace_path)?;
    let reports = workspace.list_run_reports()?;

    match format {
        OutputFormat::Pretty => PrettyPrinter::print_run_list(&reports),
        OutputFormat::Json => println!("{}", JsonFormatter::format(&reports)?),
    }

    Ok(0)
}
