//! Service error taxonomy and structured failure replies.

use crate::db::DbError;
use crate::events::EntityKind;
use crate::fold::FoldError;
use crate::messages::{default_bundle, ErrorCode};
use crate::model::document::Document;
use crate::pipeline::ValidationFailure;
use crate::write::WriteError;
use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Terminal error of one service operation.
#[derive(Debug)]
pub enum ServiceError {
    /// Input document rejected before any write.
    Validation(Vec<ValidationFailure>),
    /// Target entity does not exist.
    NotFound { entity: EntityKind, id: Value },
    /// Coordinated write failed and was rolled back.
    Transaction(WriteError),
    /// Query shape disagrees with the fold layout.
    SchemaMismatch(FoldError),
    /// Storage failure outside a coordinated write.
    Io(DbError),
}

impl ServiceError {
    pub fn not_found(entity: EntityKind, id: impl Into<Value>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Maps a coordinator failure, turning a missing parent row into
    /// `NotFound` for `entity`.
    pub fn from_write(entity: EntityKind, err: WriteError) -> Self {
        match err {
            WriteError::NotFound(id) => Self::NotFound { entity, id },
            other => Self::Transaction(other),
        }
    }

    /// Stable code for structured errors; `None` for unstructured ones.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Validation(_) => Some(ErrorCode::ValidationError),
            Self::NotFound {
                entity: EntityKind::Product,
                ..
            } => Some(ErrorCode::ProductNotFound),
            Self::NotFound {
                entity: EntityKind::User,
                ..
            } => Some(ErrorCode::UserNotFound),
            Self::Transaction(_) | Self::SchemaMismatch(_) | Self::Io(_) => None,
        }
    }

    /// Reply body for the terminal error handler.
    ///
    /// Unstructured errors collapse into a generic internal failure so that
    /// storage details never reach the caller.
    pub fn to_reply(&self) -> FailureReply {
        let code = self.error_code().unwrap_or(ErrorCode::InternalError);
        let mut args = Document::new();
        if let Self::NotFound { id, .. } = self {
            args.insert("id".to_string(), id.clone());
        }
        FailureReply {
            response_code: code.code(),
            message_code: code.message_code(),
            message: default_bundle().translate(code.message_code(), &args),
            validation_results: match self {
                Self::Validation(failures) => Some(failures.clone()),
                _ => None,
            },
        }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(failures) => {
                write!(f, "validation failed for {} field(s)", failures.len())
            }
            Self::NotFound { entity, id } => write!(f, "{} not found: {id}", entity.as_str()),
            Self::Transaction(err) => write!(f, "{err}"),
            Self::SchemaMismatch(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transaction(err) => Some(err),
            Self::SchemaMismatch(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Validation(_) | Self::NotFound { .. } => None,
        }
    }
}

impl From<DbError> for ServiceError {
    fn from(value: DbError) -> Self {
        Self::Io(value)
    }
}

impl From<FoldError> for ServiceError {
    fn from(value: FoldError) -> Self {
        Self::SchemaMismatch(value)
    }
}

impl From<Vec<ValidationFailure>> for ServiceError {
    fn from(value: Vec<ValidationFailure>) -> Self {
        Self::Validation(value)
    }
}

/// `{responseCode, messageCode, message, validationResults?}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReply {
    pub response_code: u32,
    pub message_code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_results: Option<Vec<ValidationFailure>>,
}

#[cfg(test)]
mod tests {
    use super::ServiceError;
    use crate::db::DbError;
    use crate::events::EntityKind;
    use crate::messages::ErrorCode;
    use crate::pipeline::ValidationFailure;
    use crate::write::WriteError;
    use serde_json::json;

    #[test]
    fn not_found_reply_names_entity_and_id() {
        let reply = ServiceError::not_found(EntityKind::Product, 42).to_reply();
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({
                "responseCode": ErrorCode::ProductNotFound.code(),
                "messageCode": "productNotFound",
                "message": "Product with id 42 was not found.",
            })
        );
    }

    #[test]
    fn validation_reply_carries_every_failure() {
        let err = ServiceError::Validation(vec![
            ValidationFailure::new("name", json!(null), ErrorCode::NotBlank),
            ValidationFailure::new("prices", json!([]), ErrorCode::ProductPriceMissing),
        ]);
        let reply = err.to_reply();
        assert_eq!(reply.response_code, ErrorCode::ValidationError.code());
        assert_eq!(reply.validation_results.map(|results| results.len()), Some(2));
    }

    #[test]
    fn write_not_found_maps_to_entity_not_found() {
        let err = ServiceError::from_write(EntityKind::User, WriteError::NotFound(json!(9)));
        assert_eq!(err.error_code(), Some(ErrorCode::UserNotFound));
    }

    #[test]
    fn storage_errors_reply_as_internal_failures() {
        let err = ServiceError::from(DbError::ConnectionUnavailable);
        assert_eq!(err.error_code(), None);
        assert_eq!(err.to_reply().message_code, "internalError");
    }
}
