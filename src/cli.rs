//! Command-line interface for tabmerge

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tabmerge")]
#[command(about = "Reconcile raw snapshots into a soft-deleting canonical dataset")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override workspace location
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Hide progress spinners
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize tabmerge workspace
    Init {
        /// Overwrite an existing configuration with defaults
        #[arg(long)]
        force: bool,
    },

    /// Reconcile the latest raw snapshot into the canonical dataset
    Run {
        /// Stop after classification; nothing is merged or written
        #[arg(long)]
        dry_run: bool,

        /// Archive the published dataset before replacing it
        #[arg(long)]
        backup: bool,

        /// Exit status to use when there is nothing to merge
        #[arg(long, default_value = "0")]
        no_changes_exit_code: i32,

        /// Output format: "pretty", "json"
        #[arg(long, default_value = "pretty")]
        format: String,
    },

    /// Preview how the latest snapshot would be classified
    Diff {
        /// Output format: "pretty", "json"
        #[arg(long, default_value = "pretty")]
        format: String,

        /// Maximum number of records to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Validate raw and canonical schemas against the configuration
    Validate,

    /// List recorded runs
    Runs {
        /// Output format: "pretty", "json"
        #[arg(long, default_value = "pretty")]
        format: String,
    },
}

/// Parse output format string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Pretty,
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid output format: {}. Use 'pretty' or 'json'", s)),
        }
    }
}
