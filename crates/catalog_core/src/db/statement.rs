//! Parameterized statements and builders for document-shaped writes.

use crate::model::document::Document;
use serde_json::Value;

/// One SQL text plus its positional bind values.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    /// `INSERT INTO table (k1, k2, ..) VALUES (?, ?, ..)` over every field of `row`.
    pub fn insert(table: &str, row: &Document) -> Self {
        let columns = row
            .keys()
            .map(|key| quote_ident(key))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; row.len()].join(", ");
        Self::with_params(
            format!(
                "INSERT INTO {} ({columns}) VALUES ({placeholders})",
                quote_ident(table)
            ),
            row.values().cloned().collect(),
        )
    }

    /// `UPDATE table SET .. WHERE key_field = ?`; `key_field` itself is never assigned.
    pub fn update(table: &str, row: &Document, key_field: &str, key: Value) -> Self {
        let mut params = Vec::with_capacity(row.len() + 1);
        let mut assignments = Vec::with_capacity(row.len());
        for (field, value) in row.iter().filter(|(field, _)| field.as_str() != key_field) {
            assignments.push(format!("{} = ?", quote_ident(field)));
            params.push(value.clone());
        }
        if assignments.is_empty() {
            // SQLite rejects an empty SET list.
            assignments.push(format!("{0} = {0}", quote_ident(key_field)));
        }
        params.push(key);

        Self::with_params(
            format!(
                "UPDATE {} SET {} WHERE {} = ?",
                quote_ident(table),
                assignments.join(", "),
                quote_ident(key_field)
            ),
            params,
        )
    }

    /// `DELETE FROM table WHERE key_field = ?`.
    pub fn delete(table: &str, key_field: &str, key: Value) -> Self {
        Self::with_params(
            format!(
                "DELETE FROM {} WHERE {} = ?",
                quote_ident(table),
                quote_ident(key_field)
            ),
            vec![key],
        )
    }

    pub(crate) fn is_insert(&self) -> bool {
        self.sql
            .trim_start()
            .get(..6)
            .is_some_and(|head| head.eq_ignore_ascii_case("insert"))
    }
}

/// Quotes an identifier for SQLite, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
