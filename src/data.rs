//! Parquet storage access through DuckDB

use crate::error::{Result, TabmergeError};
use crate::schema::ColumnInfo;
use crate::value::{ColumnType, Value};
use chrono::{DateTime, NaiveDateTime};
use duckdb::types::{TimeUnit, ValueRef};
use duckdb::Connection;
use std::path::Path;

/// Rows read from a parquet dataset, values aligned with `columns`
#[derive(Debug, Clone)]
pub struct TableData {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<Value>>,
}

/// In-memory DuckDB session used to read and write the canonical store
pub struct DataProcessor {
    connection: Connection,
}

impl DataProcessor {
    pub fn new() -> Result<Self> {
        let connection = Connection::open_in_memory()?;

        connection.execute_batch(
            "SET enable_progress_bar=false;
             SET preserve_insertion_order=true;",
        )?;

        Ok(Self { connection })
    }

    /// Read every parquet file below `root` into memory.
    ///
    /// The partition column is stored inside each file, so Hive path
    /// decoding is disabled and the column keeps its written type.
    pub fn read_parquet_dataset(&self, root: &Path) -> Result<TableData> {
        let glob = root.join("**").join("*.parquet");
        let create_view_sql = format!(
            "CREATE OR REPLACE VIEW canonical_view AS SELECT * FROM read_parquet({}, hive_partitioning = false, union_by_name = true)",
            sql_literal(&glob.to_string_lossy())
        );

        self.connection
            .execute(&create_view_sql, [])
            .map_err(|e| convert_store_error(e, root))?;

        let columns = self
            .describe("canonical_view")
            .map_err(|e| TabmergeError::store_unavailable(root, e.to_string()))?;

        let select_list = columns
            .iter()
            .map(|c| {
                if c.data_type.eq_ignore_ascii_case(ColumnType::Uuid.name()) {
                    format!("CAST({0} AS VARCHAR) AS {0}", quote_ident(&c.name))
                } else {
                    quote_ident(&c.name)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");

        let mut stmt = self
            .connection
            .prepare(&format!("SELECT {} FROM canonical_view", select_list))
            .map_err(|e| convert_store_error(e, root))?;

        let column_count = columns.len();
        let rows = stmt
            .query_map([], |row| {
                let mut values = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    values.push(value_from_ref(row.get_ref(i)?));
                }
                Ok(values)
            })
            .map_err(|e| convert_store_error(e, root))?;

        let mut data = Vec::new();
        for row in rows {
            data.push(row.map_err(|e| convert_store_error(e, root))?);
        }

        log::debug!("Read {} rows from {}", data.len(), root.display());

        Ok(TableData {
            columns,
            rows: data,
        })
    }

    /// Column names and declared types of a table or view
    fn describe(&self, relation: &str) -> Result<Vec<ColumnInfo>> {
        let mut stmt = self
            .connection
            .prepare(&format!("DESCRIBE {}", relation))
            .map_err(|e| {
                TabmergeError::data_processing(format!("Failed to prepare describe query: {}", e))
            })?;

        let rows = stmt
            .query_map([], |row| {
                Ok(ColumnInfo {
                    name: row.get::<_, String>(0)?,
                    data_type: row.get::<_, String>(1)?,
                })
            })
            .map_err(|e| {
                TabmergeError::data_processing(format!("Failed to query column info: {}", e))
            })?;

        let mut columns = Vec::new();
        for row in rows {
            columns.push(row.map_err(|e| {
                TabmergeError::data_processing(format!("Failed to process column info row: {}", e))
            })?);
        }

        Ok(columns)
    }

    /// Load rows into a typed table named `name`
    pub fn load_table(
        &self,
        name: &str,
        columns: &[(String, ColumnType)],
        rows: impl Iterator<Item = Vec<Value>>,
    ) -> Result<u64> {
        let table = quote_ident(name);
        let definition = columns
            .iter()
            .map(|(column, column_type)| format!("{} {}", quote_ident(column), column_type.name()))
            .collect::<Vec<_>>()
            .join(", ");
        self.connection
            .execute(&format!("CREATE OR REPLACE TABLE {} ({})", table, definition), [])?;

        let placeholders = columns
            .iter()
            .map(|(_, column_type)| format!("CAST(? AS {})", column_type.name()))
            .collect::<Vec<_>>()
            .join(", ");
        let insert_sql = format!("INSERT INTO {} VALUES ({})", table, placeholders);

        self.connection.execute_batch("BEGIN TRANSACTION")?;
        let inserted = (|| -> Result<u64> {
            let mut stmt = self.connection.prepare(&insert_sql)?;
            let mut count = 0u64;
            for row in rows {
                if row.len() != columns.len() {
                    return Err(TabmergeError::data_processing(format!(
                        "Row has {} values but table {} has {} columns",
                        row.len(),
                        name,
                        columns.len()
                    )));
                }
                let params: Vec<duckdb::types::Value> = row.iter().map(to_duckdb_value).collect();
                stmt.execute(duckdb::params_from_iter(params))?;
                count += 1;
            }
            Ok(count)
        })();

        match inserted {
            Ok(count) => {
                self.connection.execute_batch("COMMIT")?;
                Ok(count)
            }
            Err(e) => {
                let _ = self.connection.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Write a table as Hive-style partitioned parquet under `destination`
    pub fn copy_partitioned(
        &self,
        table: &str,
        partition_column: &str,
        order_column: &str,
        destination: &Path,
    ) -> Result<()> {
        let copy_sql = format!(
            "COPY (SELECT * FROM {} ORDER BY {}) TO {} (FORMAT PARQUET, PARTITION_BY ({}), WRITE_PARTITION_COLUMNS true)",
            quote_ident(table),
            quote_ident(order_column),
            sql_literal(&destination.to_string_lossy()),
            quote_ident(partition_column)
        );
        self.connection.execute(&copy_sql, [])?;
        Ok(())
    }
}

/// Quote an identifier for DuckDB
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal for DuckDB
pub fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Map DuckDB read failures onto store errors with the failing path
fn convert_store_error(error: duckdb::Error, root: &Path) -> TabmergeError {
    let error_msg = error.to_string();

    if error_msg.contains("Permission denied") {
        TabmergeError::store_unavailable(root, format!("Permission denied: {}", error_msg))
    } else if error_msg.contains("No files found") {
        TabmergeError::store_unavailable(root, "No parquet files found")
    } else {
        TabmergeError::store_unavailable(root, error_msg)
    }
}

fn value_from_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Boolean(b),
        ValueRef::TinyInt(i) => Value::BigInt(i as i64),
        ValueRef::SmallInt(i) => Value::BigInt(i as i64),
        ValueRef::Int(i) => Value::BigInt(i as i64),
        ValueRef::BigInt(i) => Value::BigInt(i),
        ValueRef::HugeInt(i) => match i64::try_from(i) {
            Ok(v) => Value::BigInt(v),
            Err(_) => Value::Text(i.to_string()),
        },
        ValueRef::UTinyInt(i) => Value::BigInt(i as i64),
        ValueRef::USmallInt(i) => Value::BigInt(i as i64),
        ValueRef::UInt(i) => Value::BigInt(i as i64),
        ValueRef::UBigInt(i) => match i64::try_from(i) {
            Ok(v) => Value::BigInt(v),
            Err(_) => Value::Text(i.to_string()),
        },
        ValueRef::Float(f) => Value::Double(f as f64),
        ValueRef::Double(f) => Value::Double(f),
        ValueRef::Decimal(d) => d
            .to_string()
            .parse::<f64>()
            .map(Value::Double)
            .unwrap_or_else(|_| Value::Text(d.to_string())),
        ValueRef::Text(s) => Value::Text(String::from_utf8_lossy(s).to_string()),
        ValueRef::Timestamp(unit, v) => timestamp_from_unit(unit, v)
            .map(Value::Timestamp)
            .unwrap_or(Value::Null),
        _ => Value::Text("<unsupported>".to_string()),
    }
}

fn timestamp_from_unit(unit: TimeUnit, value: i64) -> Option<NaiveDateTime> {
    let micros = match unit {
        TimeUnit::Second => value.checked_mul(1_000_000)?,
        TimeUnit::Millisecond => value.checked_mul(1_000)?,
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    };
    DateTime::from_timestamp_micros(micros).map(|dt| dt.naive_utc())
}

fn to_duckdb_value(value: &Value) -> duckdb::types::Value {
    match value {
        Value::Null => duckdb::types::Value::Null,
        Value::Boolean(b) => duckdb::types::Value::Boolean(*b),
        Value::BigInt(i) => duckdb::types::Value::BigInt(*i),
        Value::Double(f) => duckdb::types::Value::Double(*f),
        // Text and timestamps are cast to the column type by the INSERT
        Value::Text(_) | Value::Timestamp(_) => {
            duckdb::types::Value::Text(value.to_text().unwrap_or_default())
        }
    }
}
