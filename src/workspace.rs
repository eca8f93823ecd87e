//! Workspace management for tabmerge runs

use crate::config::PipelineConfig;
use crate::error::{Result, TabmergeError};
use crate::report::RunReport;
use std::fs;
use std::path::{Path, PathBuf};

/// Manages the .tabmerge workspace directory
#[derive(Debug, Clone)]
pub struct TabmergeWorkspace {
    /// Project root directory (where .tabmerge/ lives)
    pub root: PathBuf,
    /// .tabmerge/ directory path
    pub tabmerge_dir: PathBuf,
    /// .tabmerge/runs/ directory path
    pub runs_dir: PathBuf,
    /// .tabmerge/backups/ directory path
    pub backups_dir: PathBuf,
}

impl TabmergeWorkspace {
    /// Find an existing workspace, failing if there is none
    pub fn find(start_dir: Option<&Path>) -> Result<Self> {
        let current_dir = std::env::current_dir()?;
        let start = start_dir.unwrap_or(&current_dir);

        Self::find_existing(start)?.ok_or_else(|| {
            TabmergeError::workspace(format!(
                "No .tabmerge workspace found at or above {}. Run 'tabmerge init' first.",
                start.display()
            ))
        })
    }

    /// Find existing .tabmerge workspace by walking up directory tree
    fn find_existing(start_dir: &Path) -> Result<Option<Self>> {
        let mut current = start_dir;

        loop {
            let tabmerge_dir = current.join(".tabmerge");
            if tabmerge_dir.is_dir() {
                return Ok(Some(Self::from_root(current.to_path_buf())));
            }

            // Stop at a repository root
            if current.join(".git").exists() {
                break;
            }

            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }

        Ok(None)
    }

    /// Create a new workspace in the specified root directory
    pub fn create_new(root: PathBuf) -> Result<Self> {
        let workspace = Self::from_root(root);

        workspace.create_dirs()?;
        workspace.create_config_with_force(false)?;
        workspace.ensure_gitignore()?;

        log::info!("Created tabmerge workspace at: {}", workspace.root.display());

        Ok(workspace)
    }

    /// Create workspace from root directory path
    pub fn from_root(root: PathBuf) -> Self {
        let tabmerge_dir = root.join(".tabmerge");
        let runs_dir = tabmerge_dir.join("runs");
        let backups_dir = tabmerge_dir.join("backups");

        Self {
            root,
            tabmerge_dir,
            runs_dir,
            backups_dir,
        }
    }

    pub fn create_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.tabmerge_dir)?;
        fs::create_dir_all(&self.runs_dir)?;
        fs::create_dir_all(&self.backups_dir)?;
        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.tabmerge_dir.join("config.json")
    }

    /// Resolve a configured path against the workspace root
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Path of the stored report for a run
    pub fn run_report_path(&self, run_id: &str) -> PathBuf {
        self.runs_dir.join(format!("{}.json", run_id))
    }

    /// Path of the backup archive taken before a run republishes
    pub fn backup_path(&self, run_id: &str) -> PathBuf {
        self.backups_dir.join(format!("{}.tar.zst", run_id))
    }

    /// Load the pipeline configuration
    pub fn load_config(&self) -> Result<PipelineConfig> {
        let path = self.config_path();
        if !path.exists() {
            return Err(TabmergeError::config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        PipelineConfig::load(&path)
    }

    /// Create configuration file with optional force overwrite
    pub fn create_config_with_force(&self, force: bool) -> Result<()> {
        let config_path = self.config_path();

        if config_path.exists() && !force {
            return Ok(());
        }

        PipelineConfig::default().save(&config_path)
    }

    /// Ensure .gitignore keeps backup archives out of version control
    pub fn ensure_gitignore(&self) -> Result<()> {
        let gitignore_path = self.root.join(".gitignore");
        let entry = "# Ignore canonical dataset backups\n.tabmerge/backups/\n";

        if gitignore_path.exists() {
            let content = fs::read_to_string(&gitignore_path)?;
            if !content.contains(".tabmerge/backups/") {
                let new_content = if content.ends_with('\n') {
                    format!("{}\n{}", content, entry)
                } else {
                    format!("{}\n\n{}", content, entry)
                };
                fs::write(gitignore_path, new_content)?;
                log::info!("Updated .gitignore with tabmerge entries");
            }
        } else {
            fs::write(gitignore_path, entry)?;
            log::info!("Created .gitignore with tabmerge entries");
        }

        Ok(())
    }

    /// Persist a run report
    pub fn save_run_report(&self, report: &RunReport) -> Result<PathBuf> {
        fs::create_dir_all(&self.runs_dir)?;
        let path = self.run_report_path(&report.run_id);
        fs::write(&path, serde_json::to_string_pretty(report)?)?;
        Ok(path)
    }

    /// All stored run reports, oldest first
    pub fn list_run_reports(&self) -> Result<Vec<RunReport>> {
        let mut reports = Vec::new();

        if !self.runs_dir.exists() {
            return Ok(reports);
        }

        for entry in fs::read_dir(&self.runs_dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                let content = fs::read_to_string(&path)?;
                match serde_json::from_str::<RunReport>(&content) {
                    Ok(report) => reports.push(report),
                    Err(e) => log::warn!("Skipping unreadable run report {}: {}", path.display(), e),
                }
            }
        }

        reports.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.run_id.cmp(&b.run_id)));
        Ok(reports)
    }
}
