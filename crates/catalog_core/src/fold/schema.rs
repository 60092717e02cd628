//! Field Schemas: the ordered column list one logical table contributes to a
//! joined query.

use crate::db::quote_ident;

/// Ordered `(alias, field)` layout of one table inside a joined query.
///
/// The same table may appear several times under different aliases (`units`
/// joined once per price and once for the manufacturer price).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    table: String,
    alias: String,
    fields: Vec<String>,
}

impl FieldSchema {
    pub fn new<I, S>(table: impl Into<String>, alias: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: table.into(),
            alias: alias.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Same table and fields joined under another alias.
    pub fn with_alias(&self, alias: impl Into<String>) -> Self {
        Self {
            table: self.table.clone(),
            alias: alias.into(),
            fields: self.fields.clone(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|known| known == field)
    }

    /// Result column name of `field`: `alias.field`.
    pub fn qualified(&self, field: &str) -> String {
        format!("{}.{}", self.alias, field)
    }

    /// Select-list fragment naming every field by its qualified name.
    pub fn select_list(&self) -> String {
        self.fields
            .iter()
            .map(|field| {
                format!(
                    "{}.{} AS {}",
                    self.alias,
                    quote_ident(field),
                    quote_ident(&self.qualified(field))
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::FieldSchema;

    #[test]
    fn select_list_aliases_every_field_by_qualified_name() {
        let schema = FieldSchema::new("units", "u", ["id", "name"]);
        assert_eq!(
            schema.select_list(),
            "u.\"id\" AS \"u.id\", u.\"name\" AS \"u.name\""
        );
    }

    #[test]
    fn with_alias_keeps_table_and_fields() {
        let schema = FieldSchema::new("units", "u", ["id", "name"]);
        let aliased = schema.with_alias("mu");
        assert_eq!(aliased.table(), "units");
        assert_eq!(aliased.alias(), "mu");
        assert_eq!(aliased.fields(), schema.fields());
        assert_eq!(aliased.qualified("id"), "mu.id");
    }
}
