//! In-memory relations keyed by natural key

use crate::schema::{ColumnInfo, SchemaDescriptor, LIFECYCLE_COLUMNS};
use crate::value::Value;
use chrono::NaiveDateTime;
use indexmap::IndexMap;

/// One row of the latest raw snapshot, values aligned with `RawRelation::columns`
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub key: String,
    pub values: Vec<Value>,
}

/// The raw snapshot as loaded
#[derive(Debug, Clone, Default)]
pub struct RawRelation {
    pub columns: Vec<ColumnInfo>,
    pub records: IndexMap<String, RawRecord>,
}

impl RawRelation {
    pub fn new(columns: Vec<ColumnInfo>) -> Self {
        Self {
            columns,
            records: IndexMap::new(),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Insert a record; returns false if the key is already present
    pub fn insert(&mut self, record: RawRecord) -> bool {
        if self.records.contains_key(&record.key) {
            return false;
        }
        self.records.insert(record.key.clone(), record);
        true
    }

    pub fn get(&self, key: &str) -> Option<&RawRecord> {
        self.records.get(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One row of the canonical dataset
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    pub key: String,
    /// Attribute values aligned with `CanonicalRelation::attribute_names`
    pub values: Vec<Value>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub deleted_at: Option<NaiveDateTime>,
}

impl CanonicalRecord {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// The durable canonical dataset, materialized in memory
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRelation {
    /// Full column list including lifecycle columns
    pub columns: Vec<ColumnInfo>,
    attribute_names: Vec<String>,
    pub records: IndexMap<String, CanonicalRecord>,
}

impl CanonicalRelation {
    pub fn new(columns: Vec<ColumnInfo>) -> Self {
        let attribute_names = columns
            .iter()
            .filter(|c| !LIFECYCLE_COLUMNS.contains(&c.name.as_str()))
            .map(|c| c.name.clone())
            .collect();
        Self {
            columns,
            attribute_names,
            records: IndexMap::new(),
        }
    }

    /// Empty relation shaped like the canonical schema, used on the first run
    pub fn bootstrap(schema: &SchemaDescriptor) -> Self {
        let columns = schema
            .canonical()
            .into_iter()
            .map(|spec| ColumnInfo::new(spec.name, spec.column_type.name()))
            .collect();
        Self::new(columns)
    }

    pub fn attribute_names(&self) -> &[String] {
        &self.attribute_names
    }

    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.attribute_names.iter().position(|n| n == name)
    }

    pub fn get(&self, key: &str) -> Option<&CanonicalRecord> {
        self.records.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut CanonicalRecord> {
        self.records.get_mut(key)
    }

    pub fn insert(&mut self, record: CanonicalRecord) -> Option<CanonicalRecord> {
        self.records.insert(record.key.clone(), record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.records.values().filter(|r| r.is_active()).count()
    }

    pub fn deleted_count(&self) -> usize {
        self.len() - self.active_count()
    }

    /// Value of an attribute column for a record, by column name
    pub fn value<'a>(&self, record: &'a CanonicalRecord, column: &str) -> Option<&'a Value> {
        self.attribute_index(column)
            .and_then(|idx| record.values.get(idx))
    }
}
