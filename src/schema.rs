//! Schema descriptors and drift validation

use crate::error::{Result, TabmergeError};
use crate::value::ColumnType;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";
pub const DELETED_AT: &str = "deleted_at";

/// Lifecycle columns appended to the raw schema to form the canonical schema
pub const LIFECYCLE_COLUMNS: [&str; 3] = [CREATED_AT, UPDATED_AT, DELETED_AT];

/// Declared type name reported for a raw column that only ever held `null`
pub const NULL_TYPE: &str = "NULL";

/// Actual column information of an in-memory relation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// One entry of a schema descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Ordered raw schema plus the natural key it is identified by
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDescriptor {
    pub columns: Vec<ColumnSpec>,
    pub natural_key: String,
}

impl SchemaDescriptor {
    pub fn new(columns: Vec<ColumnSpec>, natural_key: impl Into<String>) -> Self {
        Self {
            columns,
            natural_key: natural_key.into(),
        }
    }

    /// The raw schema as declared
    pub fn raw(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Raw schema followed by the three lifecycle timestamps
    pub fn canonical(&self) -> Vec<ColumnSpec> {
        let mut columns = self.columns.clone();
        columns.extend(
            LIFECYCLE_COLUMNS
                .iter()
                .map(|name| ColumnSpec::new(*name, ColumnType::Timestamp)),
        );
        columns
    }

    /// Attribute columns compared between raw and canonical, in declared order
    pub fn compared_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.name != self.natural_key)
            .map(|c| c.name.clone())
            .collect()
    }
}

/// A column present on both sides with differing declared types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMismatch {
    pub column: String,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for TypeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (expected {}, found {})",
            self.column, self.expected, self.actual
        )
    }
}

/// Result of comparing an actual schema against an expected one
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaReport {
    pub missing: Vec<String>,
    pub added: Vec<String>,
    pub mismatches: Vec<TypeMismatch>,
}

impl SchemaReport {
    pub fn has_drift(&self) -> bool {
        !self.missing.is_empty() || !self.added.is_empty() || !self.mismatches.is_empty()
    }
}

/// Validates relation schemas against descriptors
pub struct SchemaValidator;

impl SchemaValidator {
    /// Compare an actual column list against the expected descriptor.
    ///
    /// Missing and mismatched columns are reported in expected order, added
    /// columns in actual order.
    pub fn compare(expected: &[ColumnSpec], actual: &[ColumnInfo]) -> SchemaReport {
        let actual_types: HashMap<&str, &str> = actual
            .iter()
            .map(|c| (c.name.as_str(), c.data_type.as_str()))
            .collect();
        let expected_names: HashSet<&str> = expected.iter().map(|c| c.name.as_str()).collect();

        let mut report = SchemaReport::default();

        for spec in expected {
            match actual_types.get(spec.name.as_str()) {
                None => report.missing.push(spec.name.clone()),
                Some(actual_type) => {
                    if !Self::types_match(spec.column_type, actual_type) {
                        report.mismatches.push(TypeMismatch {
                            column: spec.name.clone(),
                            expected: spec.column_type.to_string(),
                            actual: actual_type.to_string(),
                        });
                    }
                }
            }
        }

        for column in actual {
            if !expected_names.contains(column.name.as_str()) {
                report.added.push(column.name.clone());
            }
        }

        report
    }

    /// Validate a relation, failing with `SchemaDrift` on any difference.
    ///
    /// Every non-empty set is logged as a warning before the error is returned.
    pub fn validate(relation: &str, expected: &[ColumnSpec], actual: &[ColumnInfo]) -> Result<()> {
        let report = Self::compare(expected, actual);

        if !report.missing.is_empty() {
            log::warn!("Missing columns in {}: {:?}", relation, report.missing);
        }
        if !report.added.is_empty() {
            log::warn!("Additional columns in {}: {:?}", relation, report.added);
        }
        if !report.mismatches.is_empty() {
            let rendered: Vec<String> = report.mismatches.iter().map(|m| m.to_string()).collect();
            log::warn!("Type mismatches in {}: {:?}", relation, rendered);
        }

        if report.has_drift() {
            return Err(TabmergeError::SchemaDrift {
                relation: relation.to_string(),
                missing: report.missing,
                added: report.added,
                mismatches: report.mismatches,
            });
        }

        log::info!("Schema validation for {} passed", relation);
        Ok(())
    }

    fn types_match(expected: ColumnType, actual: &str) -> bool {
        // An all-null raw column carries no type information
        if actual.eq_ignore_ascii_case(NULL_TYPE) {
            return true;
        }
        expected.name().eq_ignore_ascii_case(actual.trim())
    }
}
