//! Snapshot loading: run pointer, raw snapshot files and the canonical store

use crate::config::PipelineConfig;
use crate::data::{DataProcessor, TableData};
use crate::error::{Result, TabmergeError};
use crate::hash::{self, HashValue};
use crate::relation::{CanonicalRecord, CanonicalRelation, RawRecord, RawRelation};
use crate::schema::{
    ColumnInfo, SchemaDescriptor, SchemaValidator, CREATED_AT, DELETED_AT, NULL_TYPE, UPDATED_AT,
};
use crate::value::{ColumnType, Value};
use crate::workspace::TabmergeWorkspace;
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Pointer published by the snapshot producer after each complete fetch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPointer {
    pub last_run_directory: String,
}

/// Counters describing how tolerant parsing went
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseStats {
    pub files_read: usize,
    pub skipped_files: usize,
    pub records_loaded: usize,
    pub skipped_records: usize,
}

/// The latest raw snapshot, parsed
#[derive(Debug, Clone)]
pub struct RawSnapshot {
    pub directory: PathBuf,
    pub files: Vec<PathBuf>,
    pub fingerprint: HashValue,
    pub relation: RawRelation,
    pub stats: ParseStats,
}

/// The canonical dataset as found in the store
#[derive(Debug, Clone)]
pub struct CanonicalSnapshot {
    pub relation: CanonicalRelation,
    /// True when no store existed and an empty relation was created
    pub bootstrapped: bool,
}

/// Loads the raw snapshot and the canonical dataset into memory
#[derive(Debug, Clone)]
pub struct SnapshotLoader {
    raw_root: PathBuf,
    run_pointer: String,
    raw_file_pattern: String,
    canonical_root: PathBuf,
    schema: SchemaDescriptor,
}

impl SnapshotLoader {
    pub fn new(
        raw_root: PathBuf,
        run_pointer: impl Into<String>,
        raw_file_pattern: impl Into<String>,
        canonical_root: PathBuf,
        schema: SchemaDescriptor,
    ) -> Self {
        Self {
            raw_root,
            run_pointer: run_pointer.into(),
            raw_file_pattern: raw_file_pattern.into(),
            canonical_root,
            schema,
        }
    }

    pub fn from_config(config: &PipelineConfig, workspace: &TabmergeWorkspace) -> Self {
        Self::new(
            workspace.resolve(&config.raw_root),
            config.run_pointer.clone(),
            config.raw_file_pattern.clone(),
            workspace.resolve(&config.canonical_root),
            config.schema(),
        )
    }

    pub fn canonical_root(&self) -> &Path {
        &self.canonical_root
    }

    pub fn pointer_path(&self) -> PathBuf {
        self.raw_root.join(&self.run_pointer)
    }

    /// Read the run pointer; any failure here is fatal for the run
    pub fn read_run_pointer(&self) -> Result<RunPointer> {
        let path = self.pointer_path();

        let content = fs::read_to_string(&path).map_err(|e| {
            let reason = if e.kind() == ErrorKind::NotFound {
                "run pointer does not exist".to_string()
            } else {
                format!("failed to read run pointer: {}", e)
            };
            TabmergeError::missing_pointer(&path, reason)
        })?;

        let pointer: RunPointer = serde_json::from_str(&content).map_err(|e| {
            TabmergeError::missing_pointer(&path, format!("invalid run pointer: {}", e))
        })?;

        if pointer.last_run_directory.trim().is_empty() {
            return Err(TabmergeError::missing_pointer(
                &path,
                "last_run_directory is empty",
            ));
        }

        Ok(pointer)
    }

    /// Directory of the most recent raw snapshot
    pub fn resolve_snapshot_dir(&self) -> Result<PathBuf> {
        let pointer = self.read_run_pointer()?;
        let directory = self.raw_root.join(&pointer.last_run_directory);

        if !directory.is_dir() {
            return Err(TabmergeError::missing_pointer(
                self.pointer_path(),
                format!("points at missing directory {}", directory.display()),
            ));
        }

        Ok(directory)
    }

    /// Load the raw snapshot named by the run pointer
    pub fn load_raw(&self) -> Result<RawSnapshot> {
        let directory = self.resolve_snapshot_dir()?;
        self.load_raw_from(&directory)
    }

    /// Load every matching raw file in `directory`.
    ///
    /// Files are parsed in parallel and merged in file name order, so the
    /// first occurrence of a duplicated key wins deterministically.
    pub fn load_raw_from(&self, directory: &Path) -> Result<RawSnapshot> {
        let files = self.snapshot_files(directory)?;
        if files.is_empty() {
            return Err(TabmergeError::invalid_input(format!(
                "No raw snapshot files matching '{}' in {}",
                self.raw_file_pattern,
                directory.display()
            )));
        }

        log::info!(
            "Loading {} raw snapshot files from {}",
            files.len(),
            directory.display()
        );

        let parsed: Vec<ParsedFile> = files
            .par_iter()
            .map(|path| parse_file(path))
            .collect::<Result<Vec<_>>>()?;

        let mut stats = ParseStats {
            files_read: parsed.len(),
            ..ParseStats::default()
        };
        let mut file_hashes = Vec::with_capacity(parsed.len());
        let mut builder = RawRelationBuilder::new(&self.schema.natural_key);

        for file in parsed {
            file_hashes.push((file.name.clone(), file.hash.clone()));
            if file.failed {
                log::warn!("Skipping unparseable raw file {}", file.name);
                stats.skipped_files += 1;
            }
            stats.skipped_records += file.skipped;
            for object in file.objects {
                if !builder.push(object) {
                    stats.skipped_records += 1;
                }
            }
        }

        // Every file unreadable is an upstream failure, not an empty source
        if stats.skipped_files == stats.files_read {
            return Err(TabmergeError::invalid_input(format!(
                "None of the {} raw snapshot files in {} could be parsed",
                stats.files_read,
                directory.display()
            )));
        }

        let (mut relation, duplicates) = builder.finish();
        stats.skipped_records += duplicates;

        // No records means no observable schema; take the declared one
        if relation.is_empty() {
            log::warn!(
                "Raw snapshot in {} holds no records; all active canonical records will be soft-deleted",
                directory.display()
            );
            relation = RawRelation::new(
                self.schema
                    .raw()
                    .iter()
                    .map(|c| ColumnInfo::new(c.name.clone(), c.column_type.name()))
                    .collect(),
            );
        }
        stats.records_loaded = relation.len();

        if stats.skipped_records > 0 {
            log::warn!(
                "Skipped {} malformed raw records while loading {}",
                stats.skipped_records,
                directory.display()
            );
        }
        log::info!("Loaded {} raw records", stats.records_loaded);

        Ok(RawSnapshot {
            directory: directory.to_path_buf(),
            files,
            fingerprint: hash::fingerprint(&file_hashes),
            relation,
            stats,
        })
    }

    fn snapshot_files(&self, directory: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(directory).min_depth(1).max_depth(1) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if matches_pattern(&self.raw_file_pattern, name) {
                    files.push(entry.path().to_path_buf());
                }
            }
        }
        files.sort();
        Ok(files)
    }

    /// Load the canonical dataset, bootstrapping an empty one on first run
    pub fn load_canonical(&self) -> Result<CanonicalSnapshot> {
        let root = &self.canonical_root;

        match fs::metadata(root) {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::info!(
                    "No canonical store at {}. Bootstrapping an empty canonical relation.",
                    root.display()
                );
                return Ok(self.bootstrap());
            }
            Err(e) => return Err(TabmergeError::store_unavailable(root, e.to_string())),
            Ok(metadata) if !metadata.is_dir() => {
                return Err(TabmergeError::store_unavailable(root, "not a directory"));
            }
            Ok(_) => {}
        }

        if count_parquet_files(root)? == 0 {
            log::info!(
                "Canonical store at {} holds no parquet files. Bootstrapping an empty canonical relation.",
                root.display()
            );
            return Ok(self.bootstrap());
        }

        let processor = DataProcessor::new()?;
        let table = processor.read_parquet_dataset(root)?;
        let relation = canonical_from_table(table, &self.schema)?;

        log::info!(
            "Loaded {} canonical records ({} active, {} deleted)",
            relation.len(),
            relation.active_count(),
            relation.deleted_count()
        );

        Ok(CanonicalSnapshot {
            relation,
            bootstrapped: false,
        })
    }

    fn bootstrap(&self) -> CanonicalSnapshot {
        CanonicalSnapshot {
            relation: CanonicalRelation::bootstrap(&self.schema),
            bootstrapped: true,
        }
    }
}

fn count_parquet_files(root: &Path) -> Result<usize> {
    let mut count = 0;
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| TabmergeError::store_unavailable(root, e.to_string()))?;
        if entry.file_type().is_file()
            && entry.path().extension().map_or(false, |ext| ext == "parquet")
        {
            count += 1;
        }
    }
    Ok(count)
}

/// Build a canonical relation from stored rows
fn canonical_from_table(table: TableData, schema: &SchemaDescriptor) -> Result<CanonicalRelation> {
    let find = |name: &str| table.columns.iter().position(|c| c.name == name);
    let is_timestamp = |idx: usize| {
        table.columns[idx]
            .data_type
            .eq_ignore_ascii_case(ColumnType::Timestamp.name())
    };

    let positions = (
        find(&schema.natural_key),
        find(CREATED_AT),
        find(UPDATED_AT),
        find(DELETED_AT),
    );
    let (key_idx, created_idx, updated_idx, deleted_idx) = match positions {
        (Some(k), Some(c), Some(u), Some(d)) if is_timestamp(c) && is_timestamp(u) && is_timestamp(d) => {
            (k, c, u, d)
        }
        _ => {
            // The store cannot be read as canonical records; report it as drift
            SchemaValidator::validate("canonical", &schema.canonical(), &table.columns)?;
            return Err(TabmergeError::schema_mismatch(
                "canonical store is missing its key or lifecycle columns",
            ));
        }
    };

    let mut relation = CanonicalRelation::new(table.columns.clone());
    let attribute_positions: Vec<usize> = relation
        .attribute_names()
        .iter()
        .filter_map(|name| find(name))
        .collect();

    for row in table.rows {
        let key = row[key_idx].to_text().ok_or_else(|| {
            TabmergeError::data_processing("canonical store holds a record with a NULL natural key")
        })?;
        let created_at = required_timestamp(&row[created_idx], &key, CREATED_AT)?;
        let updated_at = required_timestamp(&row[updated_idx], &key, UPDATED_AT)?;
        let deleted_at = match &row[deleted_idx] {
            Value::Null => None,
            value => Some(required_timestamp(value, &key, DELETED_AT)?),
        };
        let values = attribute_positions.iter().map(|&i| row[i].clone()).collect();

        let record = CanonicalRecord {
            key: key.clone(),
            values,
            created_at,
            updated_at,
            deleted_at,
        };
        if relation.insert(record).is_some() {
            return Err(TabmergeError::data_processing(format!(
                "canonical store holds natural key {} more than once",
                key
            )));
        }
    }

    Ok(relation)
}

fn required_timestamp(value: &Value, key: &str, column: &str) -> Result<NaiveDateTime> {
    match value {
        Value::Timestamp(ts) => Ok(*ts),
        other => Err(TabmergeError::data_processing(format!(
            "canonical record {} has invalid {}: {}",
            key, column, other
        ))),
    }
}

/// One raw file after tolerant parsing
#[derive(Debug)]
struct ParsedFile {
    name: String,
    hash: HashValue,
    objects: Vec<serde_json::Map<String, serde_json::Value>>,
    skipped: usize,
    failed: bool,
}

/// Parse a raw file holding a JSON array, a single object, or one object per line
fn parse_file(path: &Path) -> Result<ParsedFile> {
    let content = fs::read(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let hash = hash::hash_bytes(&content);

    let mut parsed = ParsedFile {
        name,
        hash,
        objects: Vec::new(),
        skipped: 0,
        failed: false,
    };

    let text = match std::str::from_utf8(&content) {
        Ok(text) => text,
        Err(_) => {
            parsed.failed = true;
            return Ok(parsed);
        }
    };
    let trimmed = text.trim_start();

    let values: Vec<serde_json::Value> = if trimmed.starts_with('[') {
        match serde_json::from_str::<Vec<serde_json::Value>>(text) {
            Ok(values) => values,
            Err(e) => {
                log::debug!("Raw file {} is not a valid JSON array: {}", parsed.name, e);
                parsed.failed = true;
                return Ok(parsed);
            }
        }
    } else if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
        vec![value]
    } else {
        let mut values = Vec::new();
        let mut bad_lines = 0;
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<serde_json::Value>(line) {
                Ok(value) => values.push(value),
                Err(_) => bad_lines += 1,
            }
        }
        // Nothing parseable at all: the file is not JSON
        if values.is_empty() && bad_lines > 0 {
            parsed.failed = true;
            return Ok(parsed);
        }
        parsed.skipped += bad_lines;
        values
    };

    for value in values {
        match value {
            serde_json::Value::Object(map) => parsed.objects.push(map),
            _ => parsed.skipped += 1,
        }
    }

    Ok(parsed)
}

/// Accumulates raw objects, inferring column types as it goes
struct RawRelationBuilder<'a> {
    natural_key: &'a str,
    column_types: IndexMap<String, Option<ColumnType>>,
    rows: Vec<HashMap<String, Value>>,
    seen_keys: HashSet<String>,
    duplicates: usize,
}

impl<'a> RawRelationBuilder<'a> {
    fn new(natural_key: &'a str) -> Self {
        Self {
            natural_key,
            column_types: IndexMap::new(),
            rows: Vec::new(),
            seen_keys: HashSet::new(),
            duplicates: 0,
        }
    }

    /// Add one object; returns false if it is malformed and was skipped.
    ///
    /// A repeated key is dropped here, before its types are folded in, and
    /// counted as a duplicate rather than as malformed.
    fn push(&mut self, object: serde_json::Map<String, serde_json::Value>) -> bool {
        let key = match object.get(self.natural_key) {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {
                if is_uuid(s) {
                    s.to_lowercase()
                } else {
                    s.clone()
                }
            }
            Some(serde_json::Value::Number(n)) if n.is_i64() || n.is_u64() => n.to_string(),
            _ => return false,
        };

        let mut row = HashMap::with_capacity(object.len());
        let mut observed = Vec::with_capacity(object.len());
        for (column, json) in object {
            match scalar_value(&json) {
                Some((value, column_type)) => {
                    observed.push((column.clone(), column_type));
                    row.insert(column, value);
                }
                None => return false,
            }
        }

        if !self.seen_keys.insert(key.clone()) {
            log::debug!("Duplicate natural key {} in raw snapshot", key);
            self.duplicates += 1;
            return true;
        }

        for (column, column_type) in observed {
            let entry = self.column_types.entry(column).or_insert(None);
            if let Some(seen) = column_type {
                *entry = Some(match *entry {
                    Some(current) => current.widen(seen),
                    None => seen,
                });
            }
        }

        self.rows.push(row);
        true
    }

    /// Align rows with the discovered columns; returns the relation and the
    /// number of records dropped as duplicate keys
    fn finish(self) -> (RawRelation, usize) {
        let columns: Vec<ColumnInfo> = self
            .column_types
            .iter()
            .map(|(name, column_type)| {
                ColumnInfo::new(
                    name.clone(),
                    column_type.map(|t| t.name()).unwrap_or(NULL_TYPE),
                )
            })
            .collect();
        let uuid_columns: Vec<bool> = self
            .column_types
            .values()
            .map(|t| *t == Some(ColumnType::Uuid))
            .collect();

        let mut relation = RawRelation::new(columns);
        let key_idx = relation.column_index(self.natural_key);
        let mut duplicates = self.duplicates;

        for mut row in self.rows {
            let values: Vec<Value> = relation
                .columns
                .iter()
                .zip(&uuid_columns)
                .map(|(column, is_uuid)| match row.remove(&column.name) {
                    Some(Value::Text(s)) if *is_uuid => Value::Text(s.to_lowercase()),
                    Some(value) => value,
                    None => Value::Null,
                })
                .collect();

            let key = match key_idx.and_then(|i| values[i].to_text()) {
                Some(key) => key,
                None => continue,
            };

            if !relation.insert(RawRecord { key: key.clone(), values }) {
                log::debug!("Duplicate natural key {} in raw snapshot", key);
                duplicates += 1;
            }
        }

        (relation, duplicates)
    }
}

/// Convert a JSON scalar into a value and its observed type; `None` for nested values
fn scalar_value(json: &serde_json::Value) -> Option<(Value, Option<ColumnType>)> {
    match json {
        serde_json::Value::Null => Some((Value::Null, None)),
        serde_json::Value::Bool(b) => Some((Value::Boolean(*b), Some(ColumnType::Boolean))),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some((Value::BigInt(i), Some(ColumnType::BigInt)))
            } else {
                n.as_f64()
                    .map(|f| (Value::Double(f), Some(ColumnType::Double)))
            }
        }
        serde_json::Value::String(s) => {
            let column_type = if is_uuid(s) {
                ColumnType::Uuid
            } else {
                ColumnType::Varchar
            };
            Some((Value::Text(s.clone()), Some(column_type)))
        }
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
    }
}

/// Hyphenated 8-4-4-4-12 form only
fn is_uuid(s: &str) -> bool {
    s.len() == 36 && uuid::Uuid::try_parse(s).is_ok()
}

/// Match a file name against a pattern with `*` and `?` wildcards
pub fn matches_pattern(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    let (mut p, mut n) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while n < name.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == name[n]) {
            p += 1;
            n += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, n));
            p += 1;
        } else if let Some((star_p, star_n)) = star {
            p = star_p + 1;
            n = star_n + 1;
            star = Some((star_p, star_n + 1));
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}
