//! Pipeline configuration stored in `.tabmerge/config.json`

use crate::error::{Result, TabmergeError};
use crate::schema::{ColumnSpec, SchemaDescriptor, LIFECYCLE_COLUMNS};
use crate::value::ColumnType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Pipeline settings. Relative paths resolve against the workspace root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
    /// Directory the snapshot producer writes runs and the run pointer into
    #[serde(default = "default_raw_root")]
    pub raw_root: PathBuf,
    /// File name of the run pointer inside `raw_root`
    #[serde(default = "default_run_pointer")]
    pub run_pointer: String,
    /// File name pattern of raw snapshot files; `*` and `?` wildcards
    #[serde(default = "default_raw_file_pattern")]
    pub raw_file_pattern: String,
    /// Root of the partitioned canonical dataset
    #[serde(default = "default_canonical_root")]
    pub canonical_root: PathBuf,
    #[serde(default = "default_natural_key")]
    pub natural_key: String,
    #[serde(default = "default_partition_column")]
    pub partition_column: String,
    #[serde(default = "default_raw_schema")]
    pub raw_schema: Vec<ColumnSpec>,
}

fn default_version() -> String {
    crate::FORMAT_VERSION.to_string()
}

fn default_raw_root() -> PathBuf {
    PathBuf::from("data/bronze")
}

fn default_run_pointer() -> String {
    "last_run_metadata_bronze.json".to_string()
}

fn default_raw_file_pattern() -> String {
    "breweries_page_*.json".to_string()
}

fn default_canonical_root() -> PathBuf {
    PathBuf::from("data/silver/current_values")
}

fn default_natural_key() -> String {
    "id".to_string()
}

fn default_partition_column() -> String {
    "state".to_string()
}

/// Brewery listing schema published by the snapshot producer
pub fn default_raw_schema() -> Vec<ColumnSpec> {
    use ColumnType::*;
    [
        ("id", Uuid),
        ("name", Varchar),
        ("brewery_type", Varchar),
        ("address_1", Varchar),
        ("address_2", Varchar),
        ("address_3", Varchar),
        ("city", Varchar),
        ("state_province", Varchar),
        ("postal_code", Varchar),
        ("country", Varchar),
        ("longitude", Double),
        ("latitude", Double),
        ("phone", Varchar),
        ("website_url", Varchar),
        ("state", Varchar),
        ("street", Varchar),
    ]
    .into_iter()
    .map(|(name, column_type)| ColumnSpec::new(name, column_type))
    .collect()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            created: Utc::now(),
            raw_root: default_raw_root(),
            run_pointer: default_run_pointer(),
            raw_file_pattern: default_raw_file_pattern(),
            canonical_root: default_canonical_root(),
            natural_key: default_natural_key(),
            partition_column: default_partition_column(),
            raw_schema: default_raw_schema(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TabmergeError::config(format!("Failed to read config '{}': {}", path.display(), e))
        })?;
        let config: PipelineConfig = serde_json::from_str(&content).map_err(|e| {
            TabmergeError::config(format!("Invalid config '{}': {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Check the internal consistency of the schema settings
    pub fn validate(&self) -> Result<()> {
        if self.raw_schema.is_empty() {
            return Err(TabmergeError::config("raw_schema must declare at least one column"));
        }

        let mut seen = HashSet::new();
        for column in &self.raw_schema {
            if column.name.trim().is_empty() {
                return Err(TabmergeError::config("raw_schema contains an unnamed column"));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(TabmergeError::config(format!(
                    "raw_schema declares column '{}' more than once",
                    column.name
                )));
            }
            if LIFECYCLE_COLUMNS.contains(&column.name.as_str()) {
                return Err(TabmergeError::config(format!(
                    "raw_schema may not declare lifecycle column '{}'",
                    column.name
                )));
            }
        }

        if !seen.contains(self.natural_key.as_str()) {
            return Err(TabmergeError::config(format!(
                "natural_key '{}' is not declared in raw_schema",
                self.natural_key
            )));
        }
        if !seen.contains(self.partition_column.as_str()) {
            return Err(TabmergeError::config(format!(
                "partition_column '{}' is not declared in raw_schema",
                self.partition_column
            )));
        }
        if self.raw_file_pattern.trim().is_empty() {
            return Err(TabmergeError::config("raw_file_pattern must not be empty"));
        }

        Ok(())
    }

    pub fn schema(&self) -> SchemaDescriptor {
        SchemaDescriptor::new(self.raw_schema.clone(), self.natural_key.clone())
    }
}
