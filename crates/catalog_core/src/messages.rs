//! Stable error codes and the message bundle that renders them.
//!
//! # Invariants
//! - Numeric codes and message codes never change once published; clients
//!   branch on them.
//! - Templates reference document fields as `{field}`; unknown placeholders
//!   render as empty text.

use crate::model::document::Document;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Machine-readable failure codes shared by replies and validation results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    ProductNotFound,
    UserNotFound,
    ProductPriceMissing,
    StringType,
    NumberType,
    ObjectType,
    NotNull,
    NotBlank,
    Positive,
    NonZero,
    InternalError,
}

impl ErrorCode {
    pub fn code(self) -> u32 {
        match self {
            Self::ValidationError => 1001,
            Self::NotNull => 1002,
            Self::NotBlank => 1003,
            Self::StringType => 1004,
            Self::NumberType => 1005,
            Self::ObjectType => 1006,
            Self::Positive => 1007,
            Self::NonZero => 1008,
            Self::ProductNotFound => 2001,
            Self::ProductPriceMissing => 2002,
            Self::UserNotFound => 3001,
            Self::InternalError => 5000,
        }
    }

    pub fn message_code(self) -> &'static str {
        match self {
            Self::ValidationError => "validationError",
            Self::ProductNotFound => "productNotFound",
            Self::UserNotFound => "userNotFound",
            Self::ProductPriceMissing => "productPriceMissing",
            Self::StringType => "stringTypeValidationError",
            Self::NumberType => "numberTypeValidationError",
            Self::ObjectType => "objectTypeValidationError",
            Self::NotNull => "notNullValidationError",
            Self::NotBlank => "notBlankValidationError",
            Self::Positive => "positiveValidationError",
            Self::NonZero => "nonZeroValidationError",
            Self::InternalError => "internalError",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::ProductNotFound => "PRODUCT_NOT_FOUND",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::ProductPriceMissing => "PRODUCT_PRICE_MISSING",
            Self::StringType => "STRING_TYPE",
            Self::NumberType => "NUMBER_TYPE",
            Self::ObjectType => "OBJECT_TYPE",
            Self::NotNull => "NOT_NULL",
            Self::NotBlank => "NOT_BLANK",
            Self::Positive => "POSITIVE",
            Self::NonZero => "NON_ZERO",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_.\[\]]*)\}").expect("valid placeholder regex"));

const DEFAULT_TEMPLATES: &[(&str, &str)] = &[
    ("validationError", "Validation failed."),
    ("productNotFound", "Product with id {id} was not found."),
    ("userNotFound", "User with id {id} was not found."),
    ("productPriceMissing", "A product needs at least one price."),
    ("stringTypeValidationError", "Field {field} must be text, got {value}."),
    ("numberTypeValidationError", "Field {field} must be a number, got {value}."),
    ("objectTypeValidationError", "Field {field} must be an object."),
    ("notNullValidationError", "Field {field} is required."),
    ("notBlankValidationError", "Field {field} must not be blank."),
    ("positiveValidationError", "Field {field} must not be negative, got {value}."),
    ("nonZeroValidationError", "Field {field} must not be zero."),
    ("internalError", "Internal error."),
];

/// Message templates keyed by message code.
#[derive(Debug, Clone)]
pub struct MessageBundle {
    templates: HashMap<String, String>,
}

impl MessageBundle {
    pub fn new<I, K, V>(templates: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            templates: templates
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// Overrides or adds one template.
    pub fn with_template(mut self, message_code: &str, template: &str) -> Self {
        self.templates
            .insert(message_code.to_string(), template.to_string());
        self
    }

    /// Renders `message_code` against `args`; an unknown code renders as itself.
    pub fn translate(&self, message_code: &str, args: &Document) -> String {
        let Some(template) = self.templates.get(message_code) else {
            return message_code.to_string();
        };
        PLACEHOLDER
            .replace_all(template, |caps: &Captures<'_>| match args.get(&caps[1]) {
                Some(Value::String(text)) => text.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            })
            .into_owned()
    }
}

impl Default for MessageBundle {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATES.iter().copied())
    }
}

/// Process-wide bundle with the built-in templates.
pub fn default_bundle() -> &'static MessageBundle {
    static BUNDLE: Lazy<MessageBundle> = Lazy::new(MessageBundle::default);
    &BUNDLE
}

#[cfg(test)]
mod tests {
    use super::{default_bundle, ErrorCode, MessageBundle};
    use crate::model::document::Document;
    use serde_json::json;

    fn args(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn translate_substitutes_document_fields() {
        let message = default_bundle().translate(
            ErrorCode::ProductNotFound.message_code(),
            &args(json!({"id": 42})),
        );
        assert_eq!(message, "Product with id 42 was not found.");
    }

    #[test]
    fn missing_placeholder_renders_empty_and_strings_render_bare() {
        let bundle = MessageBundle::new([("greet", "hi {name}{missing}!")]);
        assert_eq!(bundle.translate("greet", &args(json!({"name": "ops"}))), "hi ops!");
    }

    #[test]
    fn with_template_overrides_default_text() {
        let bundle = MessageBundle::default()
            .with_template("productNotFound", "Producto {id} no encontrado.");
        assert_eq!(
            bundle.translate("productNotFound", &args(json!({"id": "7"}))),
            "Producto 7 no encontrado."
        );
        assert_eq!(
            bundle.translate("notBlankValidationError", &args(json!({"field": "name"}))),
            "Field name must not be blank."
        );
    }

    #[test]
    fn unknown_message_code_renders_as_itself() {
        assert_eq!(
            default_bundle().translate("noSuchMessage", &Document::new()),
            "noSuchMessage"
        );
    }

    #[test]
    fn every_code_has_a_template() {
        let codes = [
            ErrorCode::ValidationError,
            ErrorCode::ProductNotFound,
            ErrorCode::UserNotFound,
            ErrorCode::ProductPriceMissing,
            ErrorCode::StringType,
            ErrorCode::NumberType,
            ErrorCode::ObjectType,
            ErrorCode::NotNull,
            ErrorCode::NotBlank,
            ErrorCode::Positive,
            ErrorCode::NonZero,
            ErrorCode::InternalError,
        ];
        for code in codes {
            assert_ne!(
                default_bundle().translate(code.message_code(), &Document::new()),
                code.message_code()
            );
        }
    }
}
