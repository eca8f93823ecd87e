//! Cell values and declared column types

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Format used when handing timestamps to DuckDB and when printing them
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Column types a schema descriptor may declare.
///
/// Names follow DuckDB's spelling so that declared types can be compared
/// directly against `DESCRIBE` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ColumnType {
    Uuid,
    Varchar,
    Double,
    BigInt,
    Boolean,
    Timestamp,
}

impl ColumnType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uuid => "UUID",
            Self::Varchar => "VARCHAR",
            Self::Double => "DOUBLE",
            Self::BigInt => "BIGINT",
            Self::Boolean => "BOOLEAN",
            Self::Timestamp => "TIMESTAMP",
        }
    }

    /// Unify two observed types into the narrowest type that holds both
    pub fn widen(self, other: ColumnType) -> ColumnType {
        match (self, other) {
            (a, b) if a == b => a,
            (Self::BigInt, Self::Double) | (Self::Double, Self::BigInt) => Self::Double,
            _ => Self::Varchar,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "UUID" => Ok(Self::Uuid),
            "VARCHAR" | "TEXT" | "STRING" => Ok(Self::Varchar),
            "DOUBLE" | "FLOAT8" => Ok(Self::Double),
            "BIGINT" | "INT8" | "LONG" => Ok(Self::BigInt),
            "BOOLEAN" | "BOOL" => Ok(Self::Boolean),
            "TIMESTAMP" | "DATETIME" => Ok(Self::Timestamp),
            other => Err(format!(
                "Unsupported column type: {}. Use UUID, VARCHAR, DOUBLE, BIGINT, BOOLEAN or TIMESTAMP",
                other
            )),
        }
    }
}

impl TryFrom<String> for ColumnType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ColumnType> for String {
    fn from(value: ColumnType) -> Self {
        value.name().to_string()
    }
}

/// A single cell of a relation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    BigInt(i64),
    Double(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// `IS DISTINCT FROM` semantics: two NULLs are equal, NULL against a
    /// value differs, and NaN compares equal to NaN.
    pub fn is_distinct_from(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => false,
            (Value::Null, _) | (_, Value::Null) => true,
            (Value::Double(a), Value::Double(b)) => !(a == b || (a.is_nan() && b.is_nan())),
            (Value::Double(a), Value::BigInt(b)) | (Value::BigInt(b), Value::Double(a)) => {
                *a != *b as f64
            }
            (a, b) => a != b,
        }
    }

    /// Text form used for natural keys and for binding parameters
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Boolean(b) => Some(b.to_string()),
            Value::BigInt(i) => Some(i.to_string()),
            Value::Double(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Timestamp(ts) => Some(ts.format(TIMESTAMP_FORMAT).to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("NULL"),
        }
    }
}
