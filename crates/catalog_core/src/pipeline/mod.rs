//! Normalization and validation of incoming documents.
//!
//! # Responsibility
//! - Shape raw request documents into storable ones (`normalize`).
//! - Reject documents that break field rules before any write starts
//!   (`validate`).
//!
//! # Invariants
//! - Normalization never fails; validation reports every failure at once.

mod transform;
mod validate;

pub use transform::{
    ArrayItems, ColumnType, Converter, DefaultValues, IncludeExclude, RemoveNulls,
    Transformation, TransformationPipeline,
};
pub use validate::{
    ArrayItemsValidator, FieldValidator, Rule, ValidationFailure, ValidationPipeline, Validator,
};

use crate::model::document::Document;

/// Normalize-then-validate collaborator used by the write path of a service.
pub struct DocumentPipeline {
    transformations: TransformationPipeline,
    validations: ValidationPipeline,
}

impl DocumentPipeline {
    pub fn new(transformations: TransformationPipeline, validations: ValidationPipeline) -> Self {
        Self {
            transformations,
            validations,
        }
    }

    pub fn normalize(&self, raw: Document) -> Document {
        self.transformations.transform(raw)
    }

    pub fn validate(&self, doc: &Document) -> Option<Vec<ValidationFailure>> {
        self.validations.validate(doc)
    }

    /// Normalizes `raw` and returns it when valid, or every failure.
    pub fn process(&self, raw: Document) -> Result<Document, Vec<ValidationFailure>> {
        let doc = self.normalize(raw);
        match self.validate(&doc) {
            Some(failures) => Err(failures),
            None => Ok(doc),
        }
    }
}
