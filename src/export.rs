//! Republishing the canonical relation as a partitioned parquet dataset

use crate::archive::ArchiveManager;
use crate::data::DataProcessor;
use crate::error::{Result, TabmergeError};
use crate::relation::{CanonicalRecord, CanonicalRelation};
use crate::schema::{SchemaDescriptor, CREATED_AT, DELETED_AT, UPDATED_AT};
use crate::value::{ColumnType, Value};
use parquet::file::reader::{FileReader, SerializedFileReader};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const EXPORT_TABLE: &str = "canonical_export";

/// Completion signal of an export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportStats {
    pub rows_written: u64,
    pub partitions: usize,
    pub files: usize,
    pub destination: PathBuf,
    pub backup: Option<PathBuf>,
}

/// Writes the canonical relation to `<destination>/<partition_column>=<value>/`
#[derive(Debug, Clone)]
pub struct PartitionedExporter {
    destination: PathBuf,
    partition_column: String,
    natural_key: String,
    columns: Vec<(String, ColumnType)>,
    backup_path: Option<PathBuf>,
    show_progress: bool,
}

impl PartitionedExporter {
    pub fn new(
        destination: PathBuf,
        partition_column: impl Into<String>,
        schema: &SchemaDescriptor,
    ) -> Self {
        let columns = schema
            .canonical()
            .into_iter()
            .map(|spec| (spec.name, spec.column_type))
            .collect();
        Self {
            destination,
            partition_column: partition_column.into(),
            natural_key: schema.natural_key.clone(),
            columns,
            backup_path: None,
            show_progress: false,
        }
    }

    /// Archive the previously published tree to `path` before replacing it
    pub fn with_backup(mut self, path: PathBuf) -> Self {
        self.backup_path = Some(path);
        self
    }

    /// Draw a progress bar while backing up
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Replace everything under the destination with `relation`.
    ///
    /// The new dataset is written and verified in a sibling staging
    /// directory, then swapped in after the old tree is removed.
    pub fn export(&self, relation: &CanonicalRelation) -> Result<ExportStats> {
        let staging = self.staging_dir()?;

        if let Err(e) = self.write_staging(relation, &staging) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        let (rows_written, files, partitions) = match self.verify(&staging, relation.len() as u64) {
            Ok(counts) => counts,
            Err(e) => {
                let _ = fs::remove_dir_all(&staging);
                return Err(e);
            }
        };

        let backup = match self.backup_existing() {
            Ok(backup) => backup,
            Err(e) => {
                let _ = fs::remove_dir_all(&staging);
                return Err(e);
            }
        };

        self.publish(&staging)?;

        log::info!(
            "Exported {} rows in {} partitions ({} files) to {}",
            rows_written,
            partitions,
            files,
            self.destination.display()
        );

        Ok(ExportStats {
            rows_written,
            partitions,
            files,
            destination: self.destination.clone(),
            backup,
        })
    }

    fn staging_dir(&self) -> Result<PathBuf> {
        let parent = match self.destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .map_err(|e| TabmergeError::export(&parent, format!("cannot create parent: {}", e)))?;

        let name = self
            .destination
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "canonical".to_string());
        Ok(parent.join(format!(
            ".{}.staging-{}",
            name,
            uuid::Uuid::new_v4().simple()
        )))
    }

    fn write_staging(&self, relation: &CanonicalRelation, staging: &Path) -> Result<()> {
        if relation.is_empty() {
            fs::create_dir_all(staging).map_err(|e| TabmergeError::export(staging, e.to_string()))?;
            return Ok(());
        }

        let rows = self.rows(relation)?;
        let processor = DataProcessor::new()?;
        processor
            .load_table(EXPORT_TABLE, &self.columns, rows.into_iter())
            .and_then(|_| {
                processor.copy_partitioned(
                    EXPORT_TABLE,
                    &self.partition_column,
                    &self.natural_key,
                    staging,
                )
            })
            .map_err(|e| TabmergeError::export(staging, format!("write failed: {}", e)))
    }

    /// Rows in canonical schema order
    fn rows(&self, relation: &CanonicalRelation) -> Result<Vec<Vec<Value>>> {
        let positions: Vec<Option<usize>> = self
            .columns
            .iter()
            .map(|(name, _)| match name.as_str() {
                CREATED_AT | UPDATED_AT | DELETED_AT => Ok(None),
                _ => relation.attribute_index(name).map(Some).ok_or_else(|| {
                    TabmergeError::schema_mismatch(format!(
                        "canonical relation has no column '{}' to export",
                        name
                    ))
                }),
            })
            .collect::<Result<_>>()?;

        let row = |record: &CanonicalRecord| -> Vec<Value> {
            self.columns
                .iter()
                .zip(&positions)
                .map(|((name, _), position)| match (name.as_str(), position) {
                    (_, Some(idx)) => record.values[*idx].clone(),
                    (CREATED_AT, None) => Value::Timestamp(record.created_at),
                    (UPDATED_AT, None) => Value::Timestamp(record.updated_at),
                    (_, None) => record.deleted_at.map(Value::Timestamp).unwrap_or(Value::Null),
                })
                .collect()
        };

        Ok(relation.records.values().map(row).collect())
    }

    /// Row, file and partition counts read back from parquet footers
    fn verify(&self, staging: &Path, expected_rows: u64) -> Result<(u64, usize, usize)> {
        let mut rows = 0u64;
        let mut files = 0usize;
        let mut partitions = HashSet::new();

        for entry in WalkDir::new(staging) {
            let entry = entry.map_err(|e| TabmergeError::export(staging, e.to_string()))?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().map_or(true, |ext| ext != "parquet")
            {
                continue;
            }

            let file = File::open(path).map_err(|e| TabmergeError::export(path, e.to_string()))?;
            let reader = SerializedFileReader::new(file)
                .map_err(|e| TabmergeError::export(path, e.to_string()))?;
            rows += reader.metadata().file_metadata().num_rows().max(0) as u64;
            files += 1;

            if let Some(partition) = path.parent().filter(|p| *p != staging) {
                partitions.insert(partition.to_path_buf());
            }
        }

        if rows != expected_rows {
            return Err(TabmergeError::export(
                staging,
                format!(
                    "verification failed: wrote {} rows, expected {}",
                    rows, expected_rows
                ),
            ));
        }

        Ok((rows, files, partitions.len()))
    }

    fn backup_existing(&self) -> Result<Option<PathBuf>> {
        let Some(backup_path) = &self.backup_path else {
            return Ok(None);
        };
        if !self.destination.is_dir() {
            return Ok(None);
        }

        ArchiveManager::archive_directory(&self.destination, backup_path, self.show_progress)
            .map_err(|e| {
                TabmergeError::export(&self.destination, format!("backup failed: {}", e))
            })?;
        Ok(Some(backup_path.clone()))
    }

    /// Clear the destination and move the staged dataset into place
    fn publish(&self, staging: &Path) -> Result<()> {
        if self.destination.exists() {
            fs::remove_dir_all(&self.destination).map_err(|e| {
                TabmergeError::export(
                    &self.destination,
                    format!(
                        "failed to clear previous output: {}; staged data kept at {}",
                        e,
                        staging.display()
                    ),
                )
            })?;
        }

        fs::rename(staging, &self.destination).map_err(|e| {
            TabmergeError::export(
                &self.destination,
                format!(
                    "previous output was cleared but publishing failed: {}; staged data kept at {}",
                    e,
                    staging.display()
                ),
            )
        })
    }
}
