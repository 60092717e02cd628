//! Table introspection via `PRAGMA table_info`.

use super::{quote_ident, DbError, DbResult, SqlClient, Statement};
use serde_json::Value;

/// One column as declared in the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared SQL type, e.g. `INTEGER`, `REAL`, `TEXT`; may be empty.
    pub declared_type: String,
}

/// Lists the columns of `table` in declaration order.
///
/// A table without columns does not exist, which is reported as an error:
/// services cannot be constructed against a missing table.
pub async fn describe_table<C: SqlClient>(client: &C, table: &str) -> DbResult<Vec<ColumnInfo>> {
    let result = client
        .query(Statement::new(format!(
            "PRAGMA table_info({});",
            quote_ident(table)
        )))
        .await?;

    let name_idx = column_index(&result.columns, "name")?;
    let type_idx = column_index(&result.columns, "type")?;

    let columns = result
        .rows
        .iter()
        .map(|row| ColumnInfo {
            name: text_at(row, name_idx),
            declared_type: text_at(row, type_idx),
        })
        .collect::<Vec<_>>();

    if columns.is_empty() {
        return Err(DbError::UnexpectedResult(format!(
            "table `{table}` does not exist or has no columns"
        )));
    }
    Ok(columns)
}

fn column_index(columns: &[String], name: &str) -> DbResult<usize> {
    columns
        .iter()
        .position(|column| column == name)
        .ok_or_else(|| DbError::UnexpectedResult(format!("table_info without `{name}` column")))
}

fn text_at(row: &[Value], idx: usize) -> String {
    row.get(idx)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
