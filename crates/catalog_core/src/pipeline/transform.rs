//! Document normalization steps applied before validation.

use crate::db::ColumnInfo;
use crate::model::document::Document;
use serde_json::{Number, Value};
use std::collections::{HashMap, HashSet};

/// One normalization step. Steps never fail; values they cannot handle pass
/// through untouched and are left for validation to reject.
pub trait Transformation: Send + Sync {
    fn transform(&self, doc: Document) -> Document;
}

/// Drops top-level fields whose value is `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveNulls;

impl Transformation for RemoveNulls {
    fn transform(&self, mut doc: Document) -> Document {
        doc.retain(|_, value| !value.is_null());
        doc
    }
}

/// Keeps only `include` fields (when set) and then drops `exclude` fields.
#[derive(Debug, Clone, Default)]
pub struct IncludeExclude {
    include: Option<HashSet<String>>,
    exclude: HashSet<String>,
}

impl IncludeExclude {
    pub fn new<I, E, S, T>(include: Option<I>, exclude: E) -> Self
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            include: include.map(|fields| fields.into_iter().map(Into::into).collect()),
            exclude: exclude.into_iter().map(Into::into).collect(),
        }
    }

    pub fn include_only<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Some(fields), Vec::<String>::new())
    }

    pub fn excluding<E, T>(fields: E) -> Self
    where
        E: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::new(None::<Vec<String>>, fields)
    }
}

impl Transformation for IncludeExclude {
    fn transform(&self, mut doc: Document) -> Document {
        doc.retain(|field, _| {
            self.include
                .as_ref()
                .map_or(true, |include| include.contains(field))
                && !self.exclude.contains(field)
        });
        doc
    }
}

/// Storage type a column's declared SQL type maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Boolean,
    Any,
}

impl ColumnType {
    /// SQLite affinity rules, with `BOOL` checked first.
    pub fn from_declared(declared: &str) -> Self {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("BOOL") {
            Self::Boolean
        } else if upper.contains("INT") {
            Self::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            Self::Text
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            Self::Real
        } else {
            Self::Any
        }
    }

    /// Converts `value` to this type, or returns it unchanged when it has no
    /// faithful representation.
    pub fn convert(self, value: Value) -> Value {
        let converted = match (self, &value) {
            (_, Value::Null) | (Self::Any, _) => None,
            (Self::Integer, Value::Number(number)) => number.as_i64().map(Value::from).or_else(|| {
                number
                    .as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                    .map(|f| Value::from(f as i64))
            }),
            (Self::Integer, Value::String(text)) => text.trim().parse::<i64>().ok().map(Value::from),
            (Self::Integer, Value::Bool(flag)) => Some(Value::from(i64::from(*flag))),
            (Self::Real, Value::Number(number)) => number
                .as_f64()
                .and_then(Number::from_f64)
                .map(Value::Number),
            (Self::Real, Value::String(text)) => text
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            (Self::Text, Value::Number(number)) => Some(Value::String(number.to_string())),
            (Self::Text, Value::Bool(flag)) => Some(Value::String(flag.to_string())),
            (Self::Boolean, Value::Number(number)) => match number.as_i64() {
                Some(0) => Some(Value::Bool(false)),
                Some(1) => Some(Value::Bool(true)),
                _ => None,
            },
            (Self::Boolean, Value::String(text)) => match text.trim() {
                "true" | "1" => Some(Value::Bool(true)),
                "false" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        };
        converted.unwrap_or(value)
    }
}

/// Converts each known field to the type of its column.
#[derive(Debug, Clone, Default)]
pub struct Converter {
    columns: HashMap<String, ColumnType>,
}

impl Converter {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = (S, ColumnType)>,
        S: Into<String>,
    {
        Self {
            columns: columns
                .into_iter()
                .map(|(name, column_type)| (name.into(), column_type))
                .collect(),
        }
    }

    /// Builds conversions from `PRAGMA table_info` output.
    pub fn from_columns(columns: &[ColumnInfo]) -> Self {
        Self::new(
            columns
                .iter()
                .map(|column| (column.name.clone(), ColumnType::from_declared(&column.declared_type))),
        )
    }
}

impl Transformation for Converter {
    fn transform(&self, doc: Document) -> Document {
        doc.into_iter()
            .map(|(field, value)| match self.columns.get(&field) {
                Some(column_type) => {
                    let value = column_type.convert(value);
                    (field, value)
                }
                None => (field, value),
            })
            .collect()
    }
}

/// Fills absent fields from a template document.
#[derive(Debug, Clone, Default)]
pub struct DefaultValues {
    defaults: Document,
}

impl DefaultValues {
    pub fn new(defaults: Document) -> Self {
        Self { defaults }
    }
}

impl Transformation for DefaultValues {
    fn transform(&self, mut doc: Document) -> Document {
        for (field, value) in &self.defaults {
            if !doc.contains_key(field) {
                doc.insert(field.clone(), value.clone());
            }
        }
        doc
    }
}

/// Applies a pipeline to every object inside an array field. Non-object
/// items are kept as-is.
pub struct ArrayItems {
    field: String,
    pipeline: TransformationPipeline,
}

impl ArrayItems {
    pub fn new(field: impl Into<String>, pipeline: TransformationPipeline) -> Self {
        Self {
            field: field.into(),
            pipeline,
        }
    }
}

impl Transformation for ArrayItems {
    fn transform(&self, mut doc: Document) -> Document {
        if let Some(Value::Array(items)) = doc.get_mut(&self.field) {
            for item in items.iter_mut() {
                if let Value::Object(object) = item {
                    let object = std::mem::take(object);
                    *item = Value::Object(self.pipeline.transform(object));
                }
            }
        }
        doc
    }
}

/// Ordered chain of transformations.
#[derive(Default)]
pub struct TransformationPipeline {
    steps: Vec<Box<dyn Transformation>>,
}

impl TransformationPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then<T: Transformation + 'static>(mut self, step: T) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Transformation for TransformationPipeline {
    fn transform(&self, doc: Document) -> Document {
        self.steps.iter().fold(doc, |doc, step| step.transform(doc))
    }
}
