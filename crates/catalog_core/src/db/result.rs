//! Query and update results as delivered by the SQL substrate.

use super::{DbError, DbResult};
use crate::model::document::Document;
use serde_json::Value;

/// Column names plus positional rows, one `Vec<Value>` per flat row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Zips every row with the column names.
    pub fn into_documents(self) -> Vec<Document> {
        let columns = self.columns;
        self.rows
            .into_iter()
            .map(|row| columns.iter().cloned().zip(row).collect())
            .collect()
    }

    /// Reads the first column of the first row as an integer (`COUNT(*)`, `MAX(id)`).
    ///
    /// `NULL` reads as `None`; an empty result is an error.
    pub fn first_i64(&self) -> DbResult<Option<i64>> {
        let value = self
            .rows
            .first()
            .and_then(|row| row.first())
            .ok_or_else(|| DbError::UnexpectedResult("expected at least one row".to_string()))?;
        match value {
            Value::Null => Ok(None),
            Value::Number(number) => number
                .as_i64()
                .map(Some)
                .ok_or_else(|| DbError::UnexpectedResult(format!("non-integer value {number}"))),
            other => Err(DbError::UnexpectedResult(format!(
                "expected integer, got {other}"
            ))),
        }
    }
}

/// Outcome of an insert/update/delete statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub updated: usize,
    /// Row id generated by the store; only set for inserts.
    pub generated_key: Option<i64>,
}
