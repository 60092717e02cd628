//! Document validation: per-field rule chains plus whole-document checks.

use crate::messages::{default_bundle, ErrorCode};
use crate::model::document::Document;
use serde::Serialize;
use serde_json::Value;

/// One rejected field, rendered for the reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationFailure {
    pub field: String,
    pub value: Value,
    pub error_code: u32,
    pub message_code: &'static str,
    pub message: String,
    #[serde(skip)]
    code: ErrorCode,
}

impl ValidationFailure {
    pub fn new(field: impl Into<String>, value: Value, code: ErrorCode) -> Self {
        let field = field.into();
        let mut args = Document::new();
        args.insert("field".to_string(), Value::String(field.clone()));
        args.insert("value".to_string(), value.clone());
        Self {
            message: default_bundle().translate(code.message_code(), &args),
            field,
            value,
            error_code: code.code(),
            message_code: code.message_code(),
            code,
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    fn nested_under(mut self, prefix: &str) -> Self {
        self.field = format!("{prefix}.{}", self.field);
        self
    }
}

/// Checks one document, reporting at most one failure.
pub trait Validator: Send + Sync {
    fn validate(&self, doc: &Document) -> Option<ValidationFailure>;
}

impl<F> Validator for F
where
    F: Fn(&Document) -> Option<ValidationFailure> + Send + Sync,
{
    fn validate(&self, doc: &Document) -> Option<ValidationFailure> {
        self(doc)
    }
}

/// Field-level rule. Type and sign rules skip absent and `null` values;
/// presence is the job of `NotNull` and `NotBlank`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    StringType,
    NumberType,
    NotNull,
    /// Present, non-null, and not empty or whitespace when text.
    NotBlank,
    /// Not negative.
    Positive,
    NonZero,
}

impl Rule {
    fn check(self, value: Option<&Value>) -> Result<(), ErrorCode> {
        let present = value.filter(|value| !value.is_null());
        let passed = match self {
            Self::NotNull => present.is_some(),
            Self::NotBlank => match present {
                Some(Value::String(text)) => !text.trim().is_empty(),
                Some(_) => true,
                None => false,
            },
            Self::StringType => present.map_or(true, Value::is_string),
            Self::NumberType => present.map_or(true, Value::is_number),
            Self::Positive => present
                .and_then(Value::as_f64)
                .map_or(true, |number| number >= 0.0),
            Self::NonZero => present
                .and_then(Value::as_f64)
                .map_or(true, |number| number != 0.0),
        };
        if passed {
            Ok(())
        } else {
            Err(self.error_code())
        }
    }

    fn error_code(self) -> ErrorCode {
        match self {
            Self::StringType => ErrorCode::StringType,
            Self::NumberType => ErrorCode::NumberType,
            Self::NotNull => ErrorCode::NotNull,
            Self::NotBlank => ErrorCode::NotBlank,
            Self::Positive => ErrorCode::Positive,
            Self::NonZero => ErrorCode::NonZero,
        }
    }
}

/// Rule chain for one field; stops at the first failing rule.
#[derive(Debug, Clone)]
pub struct FieldValidator {
    field: String,
    rules: Vec<Rule>,
}

impl FieldValidator {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            rules: Vec::new(),
        }
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn string_type(self) -> Self {
        self.rule(Rule::StringType)
    }

    pub fn number_type(self) -> Self {
        self.rule(Rule::NumberType)
    }

    pub fn not_null(self) -> Self {
        self.rule(Rule::NotNull)
    }

    pub fn not_blank(self) -> Self {
        self.rule(Rule::NotBlank)
    }

    pub fn positive(self) -> Self {
        self.rule(Rule::Positive)
    }

    pub fn non_zero(self) -> Self {
        self.rule(Rule::NonZero)
    }
}

impl Validator for FieldValidator {
    fn validate(&self, doc: &Document) -> Option<ValidationFailure> {
        let value = doc.get(&self.field);
        self.rules.iter().find_map(|rule| {
            rule.check(value).err().map(|code| {
                ValidationFailure::new(&self.field, value.cloned().unwrap_or(Value::Null), code)
            })
        })
    }
}

/// Runs a pipeline against every item of an array field.
///
/// Failures are reported as `field[index].inner`; a non-object item fails
/// with `OBJECT_TYPE`. An absent field passes.
pub struct ArrayItemsValidator {
    field: String,
    items: ValidationPipeline,
}

impl ArrayItemsValidator {
    pub fn new(field: impl Into<String>, items: ValidationPipeline) -> Self {
        Self {
            field: field.into(),
            items,
        }
    }

    fn validate_all(&self, doc: &Document) -> Vec<ValidationFailure> {
        let Some(Value::Array(items)) = doc.get(&self.field) else {
            return Vec::new();
        };
        items
            .iter()
            .enumerate()
            .flat_map(|(idx, item)| {
                let prefix = format!("{}[{idx}]", self.field);
                match item {
                    Value::Object(object) => self
                        .items
                        .validate(object)
                        .unwrap_or_default()
                        .into_iter()
                        .map(|failure| failure.nested_under(&prefix))
                        .collect::<Vec<_>>(),
                    other => vec![ValidationFailure::new(prefix, other.clone(), ErrorCode::ObjectType)],
                }
            })
            .collect()
    }
}

enum Check {
    Single(Box<dyn Validator>),
    Items(ArrayItemsValidator),
}

/// All validators of one document kind. Every validator runs; the result
/// lists every failure, or `None` when the document is valid.
#[derive(Default)]
pub struct ValidationPipeline {
    checks: Vec<Check>,
}

impl ValidationPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<V: Validator + 'static>(mut self, validator: V) -> Self {
        self.checks.push(Check::Single(Box::new(validator)));
        self
    }

    /// Adds a rule chain for `field`, composed by `rules`.
    pub fn field<F>(self, field: &str, rules: F) -> Self
    where
        F: FnOnce(FieldValidator) -> FieldValidator,
    {
        self.with(rules(FieldValidator::new(field)))
    }

    pub fn items(mut self, field: &str, items: ValidationPipeline) -> Self {
        self.checks
            .push(Check::Items(ArrayItemsValidator::new(field, items)));
        self
    }

    pub fn validate(&self, doc: &Document) -> Option<Vec<ValidationFailure>> {
        let failures: Vec<ValidationFailure> = self
            .checks
            .iter()
            .flat_map(|check| match check {
                Check::Single(validator) => validator.validate(doc).into_iter().collect(),
                Check::Items(items) => items.validate_all(doc),
            })
            .collect();
        (!failures.is_empty()).then_some(failures)
    }
}

#[cfg(test)]
mod tests {
    use super::{Rule, ValidationFailure, ValidationPipeline};
    use crate::messages::ErrorCode;
    use crate::model::document::Document;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn rule_chain_reports_first_failure_only() {
        let pipeline =
            ValidationPipeline::new().field("price", |f| f.number_type().positive().not_null().non_zero());
        let failures = pipeline.validate(&doc(json!({"price": -1}))).unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].code(), ErrorCode::Positive);

        let failures = pipeline.validate(&doc(json!({}))).unwrap();
        assert_eq!(failures[0].code(), ErrorCode::NotNull);

        let failures = pipeline.validate(&doc(json!({"price": 0}))).unwrap();
        assert_eq!(failures[0].code(), ErrorCode::NonZero);
    }

    #[test]
    fn valid_document_yields_none() {
        let pipeline = ValidationPipeline::new()
            .field("name", |f| f.string_type().not_blank())
            .field("remarks", |f| f.string_type());
        assert_eq!(pipeline.validate(&doc(json!({"name": "Rice"}))), None);
    }

    #[test]
    fn blank_text_fails_not_blank() {
        let pipeline = ValidationPipeline::new().field("name", |f| f.rule(Rule::NotBlank));
        let failures = pipeline.validate(&doc(json!({"name": "   "}))).unwrap();
        assert_eq!(failures[0].field, "name");
        assert_eq!(failures[0].message, "Field name must not be blank.");
    }

    #[test]
    fn closures_and_items_report_every_failure() {
        let pipeline = ValidationPipeline::new()
            .with(|doc: &Document| {
                (!doc.contains_key("prices"))
                    .then(|| ValidationFailure::new("prices", json!(null), ErrorCode::ProductPriceMissing))
            })
            .items(
                "items",
                ValidationPipeline::new().field("unitId", |f| f.number_type().not_null()),
            );
        let failures = pipeline
            .validate(&doc(json!({"items": [{"unitId": "x"}, 3]})))
            .unwrap();
        let fields: Vec<_> = failures.iter().map(|failure| failure.field.as_str()).collect();
        assert_eq!(fields, vec!["prices", "items[0].unitId", "items[1]"]);
        assert_eq!(failures[2].code(), ErrorCode::ObjectType);
    }

    #[test]
    fn failure_serializes_codes_for_replies() {
        let failure = ValidationFailure::new("sku", json!(5), ErrorCode::StringType);
        assert_eq!(
            serde_json::to_value(&failure).unwrap(),
            json!({
                "field": "sku",
                "value": 5,
                "errorCode": 1004,
                "messageCode": "stringTypeValidationError",
                "message": "Field sku must be text, got 5.",
            })
        );
    }
}
