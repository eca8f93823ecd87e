//! The reconcile run: load, validate, diff, merge, export

use crate::config::PipelineConfig;
use crate::diff::{DiffEngine, DiffOutcome};
use crate::error::Result;
use crate::export::PartitionedExporter;
use crate::merge::{run_timestamp, MergeApplier};
use crate::progress::{ProgressReporter, Stage};
use crate::report::{new_run_id, RunOutcome, RunReport};
use crate::schema::{SchemaDescriptor, SchemaValidator};
use crate::snapshot::{CanonicalSnapshot, RawSnapshot, SnapshotLoader};
use crate::workspace::TabmergeWorkspace;
use chrono::Utc;

/// Options for a full run
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Archive the previously published dataset before replacing it
    pub backup: bool,
    pub show_progress: bool,
}

/// Both relations of a run, as loaded
#[derive(Debug, Clone)]
pub struct LoadedRelations {
    pub raw: RawSnapshot,
    pub canonical: CanonicalSnapshot,
}

/// Classification without side effects, for previews and dry runs
#[derive(Debug, Clone)]
pub struct Preview {
    pub loaded: LoadedRelations,
    pub outcome: DiffOutcome,
}

/// Drives one reconcile run against a workspace
pub struct Reconciler<'a> {
    workspace: &'a TabmergeWorkspace,
    config: PipelineConfig,
    schema: SchemaDescriptor,
}

impl<'a> Reconciler<'a> {
    pub fn new(workspace: &'a TabmergeWorkspace, config: PipelineConfig) -> Self {
        let schema = config.schema();
        Self {
            workspace,
            config,
            schema,
        }
    }

    /// Reconciler using the workspace's stored configuration
    pub fn from_workspace(workspace: &'a TabmergeWorkspace) -> Result<Self> {
        let config = workspace.load_config()?;
        Ok(Self::new(workspace, config))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn loader(&self) -> SnapshotLoader {
        SnapshotLoader::from_config(&self.config, self.workspace)
    }

    /// Load the raw snapshot named by the run pointer and the canonical dataset
    pub fn load(&self) -> Result<LoadedRelations> {
        let loader = self.loader();
        let raw = loader.load_raw()?;
        let canonical = loader.load_canonical()?;
        Ok(LoadedRelations { raw, canonical })
    }

    /// Validate both relations; drift in either is fatal
    pub fn validate(&self, loaded: &LoadedRelations) -> Result<()> {
        SchemaValidator::validate("raw", self.schema.raw(), &loaded.raw.relation.columns)?;
        SchemaValidator::validate(
            "canonical",
            &self.schema.canonical(),
            &loaded.canonical.relation.columns,
        )?;
        Ok(())
    }

    /// Load, validate and classify without merging or writing anything
    pub fn preview(&self) -> Result<Preview> {
        let loaded = self.load()?;
        self.validate(&loaded)?;
        let outcome = DiffEngine::compute(
            &self.schema.compared_columns(),
            &loaded.raw.relation,
            &loaded.canonical.relation,
        )?;
        Ok(Preview { loaded, outcome })
    }

    /// Run the full pipeline and persist its report
    pub fn run(&self, options: RunOptions) -> Result<RunReport> {
        let started_at = Utc::now();
        let run_id = new_run_id(started_at);
        let mut progress = ProgressReporter::new(options.show_progress);

        log::info!("Starting run {}", run_id);

        progress.start(Stage::Load);
        let loaded = self.load()?;
        progress.finish(&format!(
            "Loaded {} raw and {} canonical records",
            loaded.raw.relation.len(),
            loaded.canonical.relation.len()
        ));

        progress.start(Stage::Validate);
        self.validate(&loaded)?;
        progress.finish("Schemas match");

        progress.start(Stage::Diff);
        let compared = self.schema.compared_columns();
        let outcome = DiffEngine::compute(
            &compared,
            &loaded.raw.relation,
            &loaded.canonical.relation,
        )?;
        let diff_counts = outcome.counts();
        progress.finish(&format!("{} records classified", diff_counts.total()));

        let LoadedRelations { raw, canonical } = loaded;
        let canonical_before = canonical.relation.len();
        let bootstrapped = canonical.bootstrapped;

        let (outcome, canonical_after) = match outcome {
            DiffOutcome::NoChanges => {
                log::info!("No changes detected; skipping merge and export");
                (RunOutcome::NoChanges, canonical_before)
            }
            DiffOutcome::Changes(diff) => {
                let mut relation = canonical.relation;

                progress.start(Stage::Merge);
                let merge = MergeApplier::apply(&mut relation, &diff, &compared, run_timestamp())?;
                progress.finish(&format!("{} records changed", merge.total()));

                progress.start(Stage::Export);
                let mut exporter = PartitionedExporter::new(
                    self.workspace.resolve(&self.config.canonical_root),
                    self.config.partition_column.clone(),
                    &self.schema,
                )
                .with_progress(options.show_progress);
                if options.backup {
                    exporter = exporter.with_backup(self.workspace.backup_path(&run_id));
                }
                let export = exporter.export(&relation)?;
                progress.finish(&format!("{} rows published", export.rows_written));

                (RunOutcome::Merged { merge, export }, relation.len())
            }
        };

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            snapshot_dir: raw.directory,
            raw_fingerprint: raw.fingerprint,
            raw: raw.stats,
            canonical_before,
            canonical_after,
            bootstrapped,
            diff: diff_counts,
            outcome,
        };

        let path = self.workspace.save_run_report(&report)?;
        log::info!(
            "Run {} finished ({}) in {:.2?}; report saved to {}",
            report.run_id,
            report.outcome.label(),
            progress.elapsed(),
            path.display()
        );

        Ok(report)
    }
}
