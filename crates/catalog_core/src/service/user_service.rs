//! User use-case service.
//!
//! # Responsibility
//! - Serve paginated user lists and user details.
//! - Normalize, validate and write users through the write coordinator.
//!
//! # Invariants
//! - The password column is never selected by reads and never carried by
//!   change events.
//! - User ids are generated by the store on insert.

use super::error::{ServiceError, ServiceResult};
use super::{log_failure, now_text};
use crate::db::{describe_table, quote_ident, ColumnInfo, SqlClient, Statement};
use crate::events::{EntityKind, EventBus};
use crate::fold::{fold, EntityLayout, FieldSchema, FoldLayout};
use crate::messages::ErrorCode;
use crate::model::actor::Actor;
use crate::model::document::{id_from_value, Document};
use crate::model::audit;
use crate::model::user::{self, USERS_TABLE};
use crate::pagination::{paginate, Page, PageRequest};
use crate::pipeline::{
    Converter, DefaultValues, DocumentPipeline, IncludeExclude, RemoveNulls,
    TransformationPipeline, ValidationFailure, ValidationPipeline,
};
use crate::write::{Identity, WriteCoordinator, WritePlan};
use serde_json::{json, Value};
use std::sync::Arc;

/// Default page size of user lists.
pub const DEFAULT_USER_PAGE_SIZE: u32 = 100;

const USER_ALIAS: &str = "us";

/// User service facade over a SQL client.
pub struct UserService<C: SqlClient> {
    client: Arc<C>,
    writer: WriteCoordinator<C>,
    layout: FoldLayout,
    create_pipeline: DocumentPipeline,
    update_pipeline: DocumentPipeline,
    page_size: u32,
}

impl<C: SqlClient> UserService<C> {
    pub async fn open(client: Arc<C>, events: EventBus) -> ServiceResult<Self> {
        let columns = describe_table(client.as_ref(), USERS_TABLE).await?;
        let readable = FieldSchema::new(
            USERS_TABLE,
            USER_ALIAS,
            columns
                .iter()
                .map(|column| column.name.clone())
                .filter(|name| name != user::PASSWORD),
        );

        Ok(Self {
            writer: WriteCoordinator::new(Arc::clone(&client), events),
            client,
            layout: FoldLayout {
                parent: EntityLayout {
                    schema: readable,
                    id_field: user::ID.to_string(),
                    reference: None,
                },
                child: None,
                sort_field: user::NAME.to_string(),
            },
            create_pipeline: DocumentPipeline::new(transformations(&columns, false), validations(false)),
            update_pipeline: DocumentPipeline::new(transformations(&columns, true), validations(true)),
            page_size: DEFAULT_USER_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn events(&self) -> &EventBus {
        self.writer.events()
    }

    /// Lists users ordered by name. Only `page` and `size` are read from
    /// `params`.
    pub async fn list(&self, mut params: Document) -> ServiceResult<Page<Document>> {
        let request = PageRequest::from_params(&mut params, self.page_size);
        let count = Statement::new(format!(
            "SELECT COUNT(*) FROM {}",
            quote_ident(USERS_TABLE)
        ));
        let page = Statement::new(format!(
            "SELECT {} FROM {} {USER_ALIAS} ORDER BY {USER_ALIAS}.{} COLLATE NOCASE, {USER_ALIAS}.{} LIMIT ? OFFSET ?",
            self.layout.select_list(),
            quote_ident(USERS_TABLE),
            quote_ident(user::NAME),
            quote_ident(user::ID),
        ))
        .bind(request.limit())
        .bind(request.offset());

        let result = paginate(
            request,
            async {
                let rows = self.client.query(count).await?;
                Ok::<_, ServiceError>(rows.first_i64()?.unwrap_or(0))
            },
            async {
                let rows = self.client.query(page).await?;
                Ok::<_, ServiceError>(fold(&rows, &self.layout)?)
            },
        )
        .await;
        result.map_err(|err| log_failure("service_list", err))
    }

    /// One user without the password.
    pub async fn find(&self, id: impl Into<Value>) -> ServiceResult<Document> {
        let id = id.into();
        let key = user_key(&id)?;
        let statement = Statement::new(format!(
            "SELECT {} FROM {} {USER_ALIAS} WHERE {USER_ALIAS}.{} = ?",
            self.layout.select_list(),
            quote_ident(USERS_TABLE),
            quote_ident(user::ID),
        ))
        .bind(key);

        self.fold_one(statement, key)
            .await
            .map_err(|err| log_failure("service_find", err))
    }

    /// Validates and creates a user; returns the store-generated id.
    pub async fn create(&self, raw: Document, actor: &Actor) -> ServiceResult<Value> {
        let mut row = self
            .create_pipeline
            .process(raw)
            .map_err(|failures| log_failure("service_create", failures.into()))?;
        row.insert(audit::CREATED_BY.to_string(), Value::from(actor.id));
        row.insert(audit::CREATE_DATE.to_string(), Value::String(now_text()));

        let plan = WritePlan::create(
            EntityKind::User,
            Statement::insert(USERS_TABLE, &row),
            Identity::Generated,
        )
        .announcing(user::ID, without_password(row), actor.clone());

        self.writer
            .write(plan)
            .await
            .map_err(|err| log_failure("service_create", ServiceError::from_write(EntityKind::User, err)))
    }

    /// Validates and updates a user; returns its id.
    pub async fn update(&self, raw: Document, actor: &Actor) -> ServiceResult<Value> {
        let mut row = self
            .update_pipeline
            .process(raw)
            .map_err(|failures| log_failure("service_update", failures.into()))?;

        let id_value = row.get(user::ID).cloned().unwrap_or(Value::Null);
        let id = id_from_value(&id_value).ok_or_else(|| {
            log_failure(
                "service_update",
                ServiceError::Validation(vec![ValidationFailure::new(
                    user::ID,
                    id_value.clone(),
                    ErrorCode::NumberType,
                )]),
            )
        })?;
        row.remove(audit::CREATED_BY);
        row.insert(audit::UPDATED_BY.to_string(), Value::from(actor.id));
        row.insert(audit::UPDATE_DATE.to_string(), Value::String(now_text()));

        let plan = WritePlan::update(
            EntityKind::User,
            Statement::update(USERS_TABLE, &row, user::ID, Value::from(id)),
            Value::from(id),
        )
        .announcing(user::ID, without_password(row), actor.clone());

        self.writer
            .write(plan)
            .await
            .map_err(|err| log_failure("service_update", ServiceError::from_write(EntityKind::User, err)))
    }

    /// Deletes a user; returns the deleted id.
    pub async fn delete(&self, id: impl Into<Value>, actor: &Actor) -> ServiceResult<Value> {
        let id = id.into();
        let key = user_key(&id)?;

        let mut document = Document::new();
        document.insert(audit::DELETED_BY.to_string(), Value::from(actor.id));
        document.insert(audit::DELETE_DATE.to_string(), Value::String(now_text()));

        let plan = WritePlan::delete(
            EntityKind::User,
            Statement::delete(USERS_TABLE, user::ID, Value::from(key)),
            Value::from(key),
        )
        .announcing(user::ID, document, actor.clone());

        self.writer
            .write(plan)
            .await
            .map_err(|err| log_failure("service_delete", ServiceError::from_write(EntityKind::User, err)))
    }

    async fn fold_one(&self, statement: Statement, key: i64) -> ServiceResult<Document> {
        let rows = self.client.query(statement).await?;
        if rows.is_empty() {
            return Err(ServiceError::not_found(EntityKind::User, key));
        }
        fold(&rows, &self.layout)?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::not_found(EntityKind::User, key))
    }
}

/// Create keeps every user column but `id`; update keeps `id` as the key.
fn transformations(columns: &[ColumnInfo], keep_id: bool) -> TransformationPipeline {
    let mut defaults = Document::new();
    defaults.insert(audit::CREATED_BY.to_string(), json!(0));
    defaults.insert(audit::UPDATED_BY.to_string(), json!(0));

    let mut excluded: Vec<&str> = audit::ALL.to_vec();
    if !keep_id {
        excluded.push(user::ID);
    }

    TransformationPipeline::new()
        .then(RemoveNulls)
        .then(IncludeExclude::new(
            Some(columns.iter().map(|column| column.name.clone())),
            excluded,
        ))
        .then(Converter::from_columns(columns))
        .then(DefaultValues::new(defaults))
}

fn validations(require_id: bool) -> ValidationPipeline {
    let pipeline = if require_id {
        ValidationPipeline::new().field(user::ID, |f| {
            f.number_type().not_null().positive().non_zero()
        })
    } else {
        ValidationPipeline::new()
    };
    [user::USER_ID, user::USERNAME, user::PASSWORD, user::NAME, user::PHONE]
        .into_iter()
        .fold(pipeline, |pipeline, field| {
            pipeline.field(field, |f| f.not_blank().string_type())
        })
}

fn without_password(mut row: Document) -> Document {
    row.remove(user::PASSWORD);
    row
}

fn user_key(id: &Value) -> ServiceResult<i64> {
    id_from_value(id).ok_or_else(|| ServiceError::not_found(EntityKind::User, id.clone()))
}

#[cfg(test)]
mod tests {
    use super::{transformations, validations};
    use crate::db::ColumnInfo;
    use crate::messages::ErrorCode;
    use crate::model::document::Document;
    use crate::pipeline::Transformation;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn columns() -> Vec<ColumnInfo> {
        [("id", "INTEGER"), ("userId", "TEXT"), ("name", "TEXT"), ("createdBy", "INTEGER")]
            .into_iter()
            .map(|(name, declared_type)| ColumnInfo {
                name: name.to_string(),
                declared_type: declared_type.to_string(),
            })
            .collect()
    }

    #[test]
    fn create_normalization_drops_id_audit_and_unknown_fields() {
        let out = transformations(&columns(), false).transform(doc(json!({
            "id": 4,
            "userId": 77,
            "name": "Ana",
            "createdBy": 9,
            "role": "admin",
        })));
        assert_eq!(out, doc(json!({"userId": "77", "name": "Ana", "createdBy": 0, "updatedBy": 0})));
    }

    #[test]
    fn every_identity_field_must_be_non_blank_text() {
        let failures = validations(false)
            .validate(&doc(json!({
                "userId": "u-1",
                "username": " ",
                "password": "secret",
                "name": "Ana",
                "phone": 5551234,
            })))
            .unwrap();
        let codes: Vec<_> = failures
            .iter()
            .map(|failure| (failure.field.as_str(), failure.code()))
            .collect();
        assert_eq!(
            codes,
            vec![("username", ErrorCode::NotBlank), ("phone", ErrorCode::StringType)]
        );
    }
}
