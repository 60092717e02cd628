//! Row-folding engine: flat join rows in, nested documents out.
//!
//! # Responsibility
//! - Resolve every Field Schema field to a result column by qualified name.
//! - Group fan-out rows by identity: one document per parent key, one per
//!   child key, children attached to parents through their foreign key.
//! - Embed single-valued lookups (a price's unit, the manufacturer unit).
//!
//! # Invariants
//! - Column/schema disagreement is reported before any row is folded.
//! - Output is deterministic: parents sorted case-insensitively by the sort
//!   field, folding case one char at a time, with ties in first-seen order;
//!   children in first-seen order.
//! - A lookup whose columns are all `NULL` folds to an empty document.
//! - A `NULL` child identity means "no child" (outer join), not an error.

mod schema;

pub use schema::FieldSchema;

use crate::db::ResultSet;
use crate::model::document::{Document, IdentityKey};
use log::error;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Key holding the scalar amount of an embedded price reference.
pub const AMOUNT_KEY: &str = "amount";
/// Key holding an embedded lookup document.
pub const UNIT_KEY: &str = "unit";

pub type FoldResult<T> = Result<T, FoldError>;

/// Folding failures. All of them indicate a query built against the wrong
/// layout, never bad user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FoldError {
    /// Column count differs from the summed schema lengths.
    SchemaMismatch { expected: usize, actual: usize },
    /// A row is narrower or wider than the column list.
    RowWidth {
        row: usize,
        expected: usize,
        actual: usize,
    },
    /// A schema field has no result column.
    MissingColumn(String),
    /// A parent row carries a `NULL` identity.
    MissingIdentity { alias: String, row: usize },
    /// A child's foreign key names no folded parent.
    OrphanChild { child: String, parent: String },
}

impl Display for FoldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SchemaMismatch { expected, actual } => write!(
                f,
                "field schemas describe {expected} columns but the result has {actual}"
            ),
            Self::RowWidth {
                row,
                expected,
                actual,
            } => write!(f, "row {row} has {actual} values, expected {expected}"),
            Self::MissingColumn(column) => write!(f, "result has no column `{column}`"),
            Self::MissingIdentity { alias, row } => {
                write!(f, "row {row} has a null identity for `{alias}`")
            }
            Self::OrphanChild { child, parent } => {
                write!(f, "child `{child}` references unknown parent `{parent}`")
            }
        }
    }
}

impl Error for FoldError {}

/// How a lookup document is embedded into its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Embed {
    /// `owner[field]` becomes `{amount: owner[field], unit: lookup}`.
    Composite { field: String },
    /// `owner.amount = owner[field]` and `owner.unit = lookup`.
    Alongside { field: String },
}

/// A single-valued lookup joined next to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub schema: FieldSchema,
    pub embed: Embed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityLayout {
    pub schema: FieldSchema,
    pub id_field: String,
    pub reference: Option<Reference>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildLayout {
    pub entity: EntityLayout,
    /// Child field holding the parent identity.
    pub parent_key_field: String,
    /// Parent key receiving the child documents.
    pub collection: String,
}

/// Full shape of one joined query.
///
/// Join (and therefore column) order: parent, child, child lookup, parent
/// lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldLayout {
    pub parent: EntityLayout,
    pub child: Option<ChildLayout>,
    pub sort_field: String,
}

impl FoldLayout {
    /// Schemas in column order.
    pub fn schemas(&self) -> Vec<&FieldSchema> {
        let mut schemas = vec![&self.parent.schema];
        if let Some(child) = &self.child {
            schemas.push(&child.entity.schema);
            if let Some(reference) = &child.entity.reference {
                schemas.push(&reference.schema);
            }
        }
        if let Some(reference) = &self.parent.reference {
            schemas.push(&reference.schema);
        }
        schemas
    }

    pub fn width(&self) -> usize {
        self.schemas().iter().map(|schema| schema.len()).sum()
    }

    /// Qualified result column names in column order.
    pub fn columns(&self) -> Vec<String> {
        self.schemas()
            .into_iter()
            .flat_map(|schema| {
                schema
                    .fields()
                    .iter()
                    .map(move |field| schema.qualified(field))
            })
            .collect()
    }

    /// Select list matching [`Self::columns`].
    pub fn select_list(&self) -> String {
        self.schemas()
            .into_iter()
            .map(FieldSchema::select_list)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Folds flat join rows into parent documents.
pub fn fold(rows: &ResultSet, layout: &FoldLayout) -> FoldResult<Vec<Document>> {
    if rows.columns.is_empty() && rows.rows.is_empty() {
        return Ok(Vec::new());
    }

    let plan = match Plan::resolve(rows, layout) {
        Ok(plan) => plan,
        Err(err) => {
            error!(
                "event=fold module=fold status=error error_code=schema_mismatch parent={} error={}",
                layout.parent.schema.table(),
                err
            );
            return Err(err);
        }
    };

    let mut parents: Vec<Document> = Vec::new();
    let mut parent_index: HashMap<IdentityKey, usize> = HashMap::new();
    let mut seen_children: HashSet<IdentityKey> = HashSet::new();
    let mut children: Vec<(Value, Document)> = Vec::new();

    for (row_no, row) in rows.rows.iter().enumerate() {
        let parent_key = IdentityKey::from_value(&row[plan.parent.id_column]).ok_or_else(|| {
            FoldError::MissingIdentity {
                alias: layout.parent.schema.alias().to_string(),
                row: row_no,
            }
        })?;

        if !parent_index.contains_key(&parent_key) {
            let mut parent = plan.parent.materialize(row);
            if let Some(child) = &layout.child {
                parent.insert(child.collection.clone(), Value::Array(Vec::new()));
            }
            parent_index.insert(parent_key, parents.len());
            parents.push(parent);
        }

        let (Some(child_plan), Some(child_layout)) = (&plan.child, &layout.child) else {
            continue;
        };
        let Some(child_key) = IdentityKey::from_value(&row[child_plan.id_column]) else {
            continue;
        };
        if seen_children.insert(child_key) {
            let child = child_plan.materialize(row);
            let parent_ref = child
                .get(&child_layout.parent_key_field)
                .cloned()
                .unwrap_or(Value::Null);
            children.push((parent_ref, child));
        }
    }

    if let Some(child_layout) = &layout.child {
        for (parent_ref, child) in children {
            let idx = IdentityKey::from_value(&parent_ref)
                .and_then(|key| parent_index.get(&key).copied())
                .ok_or_else(|| FoldError::OrphanChild {
                    child: child
                        .get(&child_layout.entity.id_field)
                        .map(Value::to_string)
                        .unwrap_or_default(),
                    parent: parent_ref.to_string(),
                })?;
            if let Some(Value::Array(collection)) = parents[idx].get_mut(&child_layout.collection) {
                collection.push(Value::Object(child));
            }
        }
    }

    let sort_field = layout.sort_field.as_str();
    parents.sort_by_cached_key(|doc| sort_key(doc, sort_field));
    Ok(parents)
}

/// Inverse of [`fold`]: one flat row per (parent, child) pair, or one row
/// with `NULL` child columns for a parent without children.
pub fn flatten(documents: &[Document], layout: &FoldLayout) -> ResultSet {
    let child_width = layout.child.as_ref().map_or(0, |child| {
        child.entity.schema.len()
            + child
                .entity
                .reference
                .as_ref()
                .map_or(0, |reference| reference.schema.len())
    });

    let mut rows = Vec::new();
    for doc in documents {
        let parent_values = entity_values(doc, &layout.parent);
        let parent_lookup = layout
            .parent
            .reference
            .as_ref()
            .map(|reference| reference_values(doc, reference))
            .unwrap_or_default();

        let children = layout
            .child
            .as_ref()
            .and_then(|child| doc.get(&child.collection))
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_object).collect::<Vec<_>>())
            .unwrap_or_default();

        let mut push_row = |child_values: Vec<Value>| {
            let mut row = parent_values.clone();
            row.extend(child_values);
            row.extend(parent_lookup.iter().cloned());
            rows.push(row);
        };

        match &layout.child {
            Some(child_layout) if !children.is_empty() => {
                for child in children {
                    let mut values = entity_values(child, &child_layout.entity);
                    if let Some(reference) = &child_layout.entity.reference {
                        values.extend(reference_values(child, reference));
                    }
                    push_row(values);
                }
            }
            _ => push_row(vec![Value::Null; child_width]),
        }
    }

    ResultSet::new(layout.columns(), rows)
}

struct EntityPlan {
    fields: Vec<(String, usize)>,
    id_column: usize,
    lookup: Option<(Vec<(String, usize)>, Embed)>,
}

impl EntityPlan {
    fn resolve(
        entity: &EntityLayout,
        index: &HashMap<&str, usize>,
    ) -> FoldResult<Self> {
        let fields = resolve_fields(&entity.schema, index)?;
        let qualified_id = entity.schema.qualified(&entity.id_field);
        let id_column = *index
            .get(qualified_id.as_str())
            .ok_or(FoldError::MissingColumn(qualified_id))?;
        let lookup = match &entity.reference {
            Some(reference) => Some((
                resolve_fields(&reference.schema, index)?,
                reference.embed.clone(),
            )),
            None => None,
        };
        Ok(Self {
            fields,
            id_column,
            lookup,
        })
    }

    fn materialize(&self, row: &[Value]) -> Document {
        let mut doc = pick(row, &self.fields);
        if let Some((lookup_fields, embed)) = &self.lookup {
            let lookup = pick_lookup(row, lookup_fields);
            match embed {
                Embed::Composite { field } => {
                    let amount = doc.get(field).cloned().unwrap_or(Value::Null);
                    let mut composite = Document::new();
                    composite.insert(AMOUNT_KEY.to_string(), amount);
                    composite.insert(UNIT_KEY.to_string(), Value::Object(lookup));
                    doc.insert(field.clone(), Value::Object(composite));
                }
                Embed::Alongside { field } => {
                    let amount = doc.get(field).cloned().unwrap_or(Value::Null);
                    doc.insert(AMOUNT_KEY.to_string(), amount);
                    doc.insert(UNIT_KEY.to_string(), Value::Object(lookup));
                }
            }
        }
        doc
    }
}

struct Plan {
    parent: EntityPlan,
    child: Option<EntityPlan>,
}

impl Plan {
    fn resolve(rows: &ResultSet, layout: &FoldLayout) -> FoldResult<Self> {
        let expected = layout.width();
        if rows.columns.len() != expected {
            return Err(FoldError::SchemaMismatch {
                expected,
                actual: rows.columns.len(),
            });
        }
        if let Some((row, values)) = rows
            .rows
            .iter()
            .enumerate()
            .find(|(_, values)| values.len() != rows.columns.len())
        {
            return Err(FoldError::RowWidth {
                row,
                expected: rows.columns.len(),
                actual: values.len(),
            });
        }

        let index: HashMap<&str, usize> = rows
            .columns
            .iter()
            .enumerate()
            .map(|(idx, column)| (column.as_str(), idx))
            .collect();

        let parent = EntityPlan::resolve(&layout.parent, &index)?;
        let child = match &layout.child {
            Some(child) => Some(EntityPlan::resolve(&child.entity, &index)?),
            None => None,
        };
        Ok(Self { parent, child })
    }
}

fn resolve_fields(
    schema: &FieldSchema,
    index: &HashMap<&str, usize>,
) -> FoldResult<Vec<(String, usize)>> {
    schema
        .fields()
        .iter()
        .map(|field| {
            let qualified = schema.qualified(field);
            index
                .get(qualified.as_str())
                .map(|idx| (field.clone(), *idx))
                .ok_or(FoldError::MissingColumn(qualified))
        })
        .collect()
}

fn pick(row: &[Value], fields: &[(String, usize)]) -> Document {
    fields
        .iter()
        .map(|(field, idx)| (field.clone(), row[*idx].clone()))
        .collect()
}

fn pick_lookup(row: &[Value], fields: &[(String, usize)]) -> Document {
    if fields.iter().all(|(_, idx)| row[*idx].is_null()) {
        Document::new()
    } else {
        pick(row, fields)
    }
}

/// Case-folded chars of the sort field; absent or null sorts as empty.
///
/// Folding is per char so one char never expands into several and shifts
/// the comparison of the chars after it.
fn sort_key(doc: &Document, field: &str) -> Vec<char> {
    match doc.get(field) {
        Some(Value::String(text)) => text.chars().map(fold_case).collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => other.to_string().chars().map(fold_case).collect(),
    }
}

/// One-to-one case fold: uppercase, then lowercase the result.
fn fold_case(c: char) -> char {
    let upper = single_char(c.to_uppercase()).unwrap_or(c);
    upper.to_lowercase().next().unwrap_or(upper)
}

fn single_char(mut chars: impl Iterator<Item = char>) -> Option<char> {
    let first = chars.next()?;
    chars.next().is_none().then_some(first)
}

fn entity_values(doc: &Document, entity: &EntityLayout) -> Vec<Value> {
    let composite_field = match entity.reference.as_ref().map(|reference| &reference.embed) {
        Some(Embed::Composite { field }) => Some(field.as_str()),
        _ => None,
    };
    entity
        .schema
        .fields()
        .iter()
        .map(|field| {
            let value = doc.get(field);
            let value = if composite_field == Some(field.as_str()) {
                value.and_then(|composite| composite.get(AMOUNT_KEY))
            } else {
                value
            };
            value.cloned().unwrap_or(Value::Null)
        })
        .collect()
}

fn reference_values(doc: &Document, reference: &Reference) -> Vec<Value> {
    let lookup = match &reference.embed {
        Embed::Composite { field } => doc.get(field).and_then(|value| value.get(UNIT_KEY)),
        Embed::Alongside { .. } => doc.get(UNIT_KEY),
    };
    reference
        .schema
        .fields()
        .iter()
        .map(|field| {
            lookup
                .and_then(|unit| unit.get(field))
                .cloned()
                .unwrap_or(Value::Null)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{fold, FieldSchema, FoldError, FoldLayout, EntityLayout};
    use crate::db::ResultSet;
    use serde_json::json;

    fn flat_layout() -> FoldLayout {
        FoldLayout {
            parent: EntityLayout {
                schema: FieldSchema::new("units", "u", ["id", "name"]),
                id_field: "id".to_string(),
                reference: None,
            },
            child: None,
            sort_field: "name".to_string(),
        }
    }

    #[test]
    fn empty_input_folds_to_empty_output() {
        assert!(fold(&ResultSet::default(), &flat_layout()).unwrap().is_empty());
    }

    #[test]
    fn width_mismatch_is_reported_even_without_rows() {
        let rows = ResultSet::new(vec!["u.id".to_string()], Vec::new());
        let err = fold(&rows, &flat_layout()).unwrap_err();
        assert_eq!(
            err,
            FoldError::SchemaMismatch {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn short_row_is_reported_before_folding() {
        let rows = ResultSet::new(
            vec!["u.id".to_string(), "u.name".to_string()],
            vec![vec![json!(1), json!("kg")], vec![json!(2)]],
        );
        let err = fold(&rows, &flat_layout()).unwrap_err();
        assert!(matches!(err, FoldError::RowWidth { row: 1, .. }));
    }

    #[test]
    fn sort_is_case_insensitive_and_stable() {
        let rows = ResultSet::new(
            vec!["u.id".to_string(), "u.name".to_string()],
            vec![
                vec![json!(1), json!("beta")],
                vec![json!(2), json!("Alpha")],
                vec![json!(3), json!("ALPHA")],
            ],
        );
        let docs = fold(&rows, &flat_layout()).unwrap();
        let ids: Vec<_> = docs.iter().map(|doc| doc["id"].clone()).collect();
        assert_eq!(ids, vec![json!(2), json!(3), json!(1)]);
    }

    #[test]
    fn sort_folds_case_char_by_char() {
        let rows = ResultSet::new(
            vec!["u.id".to_string(), "u.name".to_string()],
            vec![
                vec![json!(1), json!("ib")],
                vec![json!(2), json!("İstanbul")],
                vec![json!(3), json!("istanbul")],
                vec![json!(4), json!("İa")],
            ],
        );
        let docs = fold(&rows, &flat_layout()).unwrap();
        let ids: Vec<_> = docs.iter().map(|doc| doc["id"].clone()).collect();
        assert_eq!(ids, vec![json!(4), json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn case_fold_never_expands_a_char() {
        assert_eq!(super::fold_case('A'), 'a');
        assert_eq!(super::fold_case('İ'), 'i');
        assert_eq!(super::fold_case('ß'), 'ß');
        assert_eq!(super::fold_case('7'), '7');
    }
}
