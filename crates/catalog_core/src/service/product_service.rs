//! Product use-case service.
//!
//! # Responsibility
//! - Serve folded product lists and details (prices with units, the
//!   manufacturer unit) and the raw "decomposed" projections.
//! - Normalize, validate and write products together with their price rows.
//!
//! # Invariants
//! - Product ids come from the injected sequence, allocated only after
//!   validation passed.
//! - Update replaces the full price set inside the same transaction.
//! - Detail reads report `NotFound` before folding; list reads return an
//!   empty page instead.

use super::error::{ServiceError, ServiceResult};
use super::{log_failure, now_text};
use crate::db::{describe_table, quote_ident, ColumnInfo, DbError, SqlClient, Statement};
use crate::events::{EntityKind, EventBus};
use crate::fold::{fold, ChildLayout, Embed, EntityLayout, FieldSchema, FoldLayout, Reference};
use crate::messages::ErrorCode;
use crate::model::actor::Actor;
use crate::model::document::{id_from_value, Document};
use crate::model::audit;
use crate::model::product::{
    product, unit_price, PRODUCTS_TABLE, PRODUCT_UNIT_PRICES_TABLE, UNITS_TABLE,
};
use crate::pagination::{paginate, Page, PageRequest};
use crate::pipeline::{
    ArrayItems, Converter, DefaultValues, DocumentPipeline, IncludeExclude, RemoveNulls,
    Transformation, TransformationPipeline, ValidationFailure, ValidationPipeline,
};
use crate::write::{AtomicIdSequence, IdSequence, Identity, WriteCoordinator, WritePlan};
use log::debug;
use serde_json::{json, Value};
use std::sync::Arc;

/// Default page size of product lists.
pub const DEFAULT_PRODUCT_PAGE_SIZE: u32 = 1000;

const PRODUCT_ALIAS: &str = "p";
const PRICE_ALIAS: &str = "up";
const UNIT_ALIAS: &str = "u";
const MANUFACTURER_UNIT_ALIAS: &str = "mu";

/// Product service facade over a SQL client.
pub struct ProductService<C: SqlClient> {
    client: Arc<C>,
    writer: WriteCoordinator<C>,
    ids: Arc<dyn IdSequence>,
    layout: FoldLayout,
    decomposed: FoldLayout,
    filters: Converter,
    create_pipeline: DocumentPipeline,
    update_pipeline: DocumentPipeline,
    page_size: u32,
}

impl<C: SqlClient> ProductService<C> {
    /// Discovers the product, price and unit schemas and seeds the id
    /// sequence from the highest persisted product id.
    pub async fn open(client: Arc<C>, events: EventBus) -> ServiceResult<Self> {
        let product_columns = describe_table(client.as_ref(), PRODUCTS_TABLE).await?;
        let price_columns = describe_table(client.as_ref(), PRODUCT_UNIT_PRICES_TABLE).await?;
        let unit_columns = describe_table(client.as_ref(), UNITS_TABLE).await?;
        let ids = AtomicIdSequence::load(client.as_ref(), PRODUCTS_TABLE, product::ID).await?;

        let products = schema_of(PRODUCTS_TABLE, PRODUCT_ALIAS, &product_columns);
        let prices = schema_of(PRODUCT_UNIT_PRICES_TABLE, PRICE_ALIAS, &price_columns);
        let units = schema_of(UNITS_TABLE, UNIT_ALIAS, &unit_columns);

        Ok(Self {
            writer: WriteCoordinator::new(Arc::clone(&client), events),
            client,
            ids: Arc::new(ids),
            layout: product_layout(&products, &prices, &units),
            decomposed: decomposed_layout(&products, &prices),
            filters: Converter::from_columns(&product_columns),
            create_pipeline: DocumentPipeline::new(
                transformations(&product_columns, &price_columns),
                validations(false),
            ),
            update_pipeline: DocumentPipeline::new(
                transformations(&product_columns, &price_columns),
                validations(true),
            ),
            page_size: DEFAULT_PRODUCT_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Replaces the id sequence, e.g. with one shared across services.
    pub fn with_id_sequence(mut self, ids: Arc<dyn IdSequence>) -> Self {
        self.ids = ids;
        self
    }

    pub fn events(&self) -> &EventBus {
        self.writer.events()
    }

    /// Fold layout of the product detail/list query.
    pub fn layout(&self) -> &FoldLayout {
        &self.layout
    }

    /// Lists folded products. Remaining `params` are equality filters over
    /// product columns; unknown keys are ignored.
    pub async fn list(&self, mut params: Document) -> ServiceResult<Page<Document>> {
        let request = PageRequest::from_params(&mut params, self.page_size);
        let (filter, values) = self.filter(params);

        let count = Statement::with_params(
            format!(
                "SELECT COUNT(*) FROM {} {PRODUCT_ALIAS}{filter}",
                quote_ident(PRODUCTS_TABLE)
            ),
            values.clone(),
        );
        let page = Statement::with_params(
            format!(
                "SELECT {} FROM (SELECT * FROM {} {PRODUCT_ALIAS}{filter} \
                 ORDER BY {PRODUCT_ALIAS}.{} COLLATE NOCASE, {PRODUCT_ALIAS}.{} LIMIT ? OFFSET ?) {PRODUCT_ALIAS} \
                 {} ORDER BY {PRODUCT_ALIAS}.{}, {PRICE_ALIAS}.{}",
                self.layout.select_list(),
                quote_ident(PRODUCTS_TABLE),
                quote_ident(product::NAME),
                quote_ident(product::ID),
                joins(),
                quote_ident(product::ID),
                quote_ident(unit_price::ID),
            ),
            values,
        )
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

    /// One folded product with its prices, units and manufacturer unit.
    pub async fn find(&self, id: impl Into<Value>) -> ServiceResult<Document> {
        let id = id.into();
        let key = product_key(&id)?;
        let statement = Statement::new(format!(
            "SELECT {} FROM {} {PRODUCT_ALIAS} {} WHERE {PRODUCT_ALIAS}.{} = ? ORDER BY {PRICE_ALIAS}.{}",
            self.layout.select_list(),
            quote_ident(PRODUCTS_TABLE),
            joins(),
            quote_ident(product::ID),
            quote_ident(unit_price::ID),
        ))
        .bind(key);

        self.fold_one(statement, &self.layout, key)
            .await
            .map_err(|err| log_failure("service_find", err))
    }

    /// Product row plus its raw price rows, without unit embedding.
    pub async fn find_decomposed(&self, id: impl Into<Value>) -> ServiceResult<Document> {
        let id = id.into();
        let key = product_key(&id)?;
        let statement = Statement::new(format!(
            "SELECT {} FROM {} {PRODUCT_ALIAS} LEFT JOIN {} {PRICE_ALIAS} \
             ON {PRICE_ALIAS}.{} = {PRODUCT_ALIAS}.{} WHERE {PRODUCT_ALIAS}.{} = ? ORDER BY {PRICE_ALIAS}.{}",
            self.decomposed.select_list(),
            quote_ident(PRODUCTS_TABLE),
            quote_ident(PRODUCT_UNIT_PRICES_TABLE),
            quote_ident(unit_price::PRODUCT_ID),
            quote_ident(product::ID),
            quote_ident(product::ID),
            quote_ident(unit_price::ID),
        ))
        .bind(key);

        self.fold_one(statement, &self.decomposed, key)
            .await
            .map_err(|err| log_failure("service_find_decomposed", err))
    }

    /// Raw product rows matching `params`, ordered by name.
    pub async fn list_decomposed(&self, params: Document) -> ServiceResult<Vec<Document>> {
        let (filter, values) = self.filter(params);
        let statement = Statement::with_params(
            format!(
                "SELECT * FROM {} {PRODUCT_ALIAS}{filter} ORDER BY {PRODUCT_ALIAS}.{} COLLATE NOCASE, {PRODUCT_ALIAS}.{}",
                quote_ident(PRODUCTS_TABLE),
                quote_ident(product::NAME),
                quote_ident(product::ID),
            ),
            values,
        );
        match self.client.query(statement).await {
            Ok(rows) => Ok(rows.into_documents()),
            Err(err) => Err(log_failure("service_list_decomposed", err.into())),
        }
    }

    /// `{productId: {unitId: price}}` over every stored price.
    pub async fn unit_wise_prices(&self) -> ServiceResult<Document> {
        let fields = [unit_price::PRODUCT_ID, unit_price::UNIT_ID, unit_price::PRICE]
            .map(quote_ident)
            .join(", ");
        let statement = Statement::new(format!(
            "SELECT {fields} FROM {} GROUP BY {fields} ORDER BY {fields}",
            quote_ident(PRODUCT_UNIT_PRICES_TABLE)
        ));
        let rows = self
            .client
            .query(statement)
            .await
            .map_err(|err| log_failure("service_unit_wise_prices", err.into()))?;

        let mut prices = Document::new();
        for row in rows.rows {
            let [product_id, unit_id, price] = <[Value; 3]>::try_from(row).map_err(|row| {
                log_failure(
                    "service_unit_wise_prices",
                    DbError::UnexpectedResult(format!(
                        "expected 3 columns, got {}",
                        row.len()
                    ))
                    .into(),
                )
            })?;
            let units = prices
                .entry(key_text(&product_id))
                .or_insert_with(|| Value::Object(Document::new()));
            if let Value::Object(units) = units {
                units.insert(key_text(&unit_id), price);
            }
        }
        Ok(prices)
    }

    /// Validates and creates a product with its prices; returns the new id.
    pub async fn create(&self, raw: Document, actor: &Actor) -> ServiceResult<Value> {
        let product = self
            .create_pipeline
            .process(raw)
            .map_err(|failures| log_failure("service_create", failures.into()))?;

        let id = self.ids.next_id();
        let (row, prices) = storable(&product, id, actor, &self.layout, Stamp::Created);
        let plan = WritePlan::create(
            EntityKind::Product,
            Statement::insert(PRODUCTS_TABLE, &row),
            Identity::Known(Value::from(id)),
        )
        .with_children(price_inserts(&prices))
        .announcing(product::ID, event_document(row, prices), actor.clone());

        self.writer
            .write(plan)
            .await
            .map_err(|err| log_failure("service_create", ServiceError::from_write(EntityKind::Product, err)))
    }

    /// Validates and updates a product, replacing its full price set.
    pub async fn update(&self, raw: Document, actor: &Actor) -> ServiceResult<Value> {
        let product = self
            .update_pipeline
            .process(raw)
            .map_err(|failures| log_failure("service_update", failures.into()))?;

        let id_value = product.get(product::ID).cloned().unwrap_or(Value::Null);
        let id = id_from_value(&id_value).ok_or_else(|| {
            log_failure(
                "service_update",
                ServiceError::Validation(vec![ValidationFailure::new(
                    product::ID,
                    id_value.clone(),
                    ErrorCode::NumberType,
                )]),
            )
        })?;

        let (row, prices) = storable(&product, id, actor, &self.layout, Stamp::Updated);
        let plan = WritePlan::update(
            EntityKind::Product,
            Statement::update(PRODUCTS_TABLE, &row, product::ID, Value::from(id)),
            Value::from(id),
        )
        .replacing_children(Statement::delete(
            PRODUCT_UNIT_PRICES_TABLE,
            unit_price::PRODUCT_ID,
            Value::from(id),
        ))
        .with_children(price_inserts(&prices))
        .announcing(product::ID, event_document(row, prices), actor.clone());

        self.writer
            .write(plan)
            .await
            .map_err(|err| log_failure("service_update", ServiceError::from_write(EntityKind::Product, err)))
    }

    /// Deletes a product and its prices; returns the deleted id.
    pub async fn delete(&self, id: impl Into<Value>, actor: &Actor) -> ServiceResult<Value> {
        let id = id.into();
        let key = product_key(&id)?;

        let mut document = Document::new();
        document.insert(audit::DELETED_BY.to_string(), Value::from(actor.id));
        document.insert(audit::DELETE_DATE.to_string(), Value::String(now_text()));

        let plan = WritePlan::delete(
            EntityKind::Product,
            Statement::delete(PRODUCTS_TABLE, product::ID, Value::from(key)),
            Value::from(key),
        )
        .replacing_children(Statement::delete(
            PRODUCT_UNIT_PRICES_TABLE,
            unit_price::PRODUCT_ID,
            Value::from(key),
        ))
        .announcing(product::ID, document, actor.clone());

        self.writer
            .write(plan)
            .await
            .map_err(|err| log_failure("service_delete", ServiceError::from_write(EntityKind::Product, err)))
    }

    async fn fold_one(&self, statement: Statement, layout: &FoldLayout, key: i64) -> ServiceResult<Document> {
        let rows = self.client.query(statement).await?;
        if rows.is_empty() {
            return Err(ServiceError::not_found(EntityKind::Product, key));
        }
        fold(&rows, layout)?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::not_found(EntityKind::Product, key))
    }

    /// ` WHERE p."field" = ? AND ..` over known product columns.
    fn filter(&self, params: Document) -> (String, Vec<Value>) {
        let params = self.filters.transform(RemoveNulls.transform(params));
        let mut clauses = Vec::with_capacity(params.len());
        let mut values = Vec::with_capacity(params.len());
        for (field, value) in params {
            if !self.layout.parent.schema.contains(&field) {
                debug!(
                    "event=service_list module=product_service status=ignored filter={}",
                    field
                );
                continue;
            }
            clauses.push(format!("{PRODUCT_ALIAS}.{} = ?", quote_ident(&field)));
            values.push(value);
        }
        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), values)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stamp {
    Created,
    Updated,
}

fn schema_of(table: &str, alias: &str, columns: &[ColumnInfo]) -> FieldSchema {
    FieldSchema::new(table, alias, columns.iter().map(|column| column.name.clone()))
}

/// parent `p`, child `up`, child lookup `u`, parent lookup `mu`.
fn product_layout(products: &FieldSchema, prices: &FieldSchema, units: &FieldSchema) -> FoldLayout {
    FoldLayout {
        parent: EntityLayout {
            schema: products.clone(),
            id_field: product::ID.to_string(),
            reference: Some(Reference {
                schema: units.with_alias(MANUFACTURER_UNIT_ALIAS),
                embed: Embed::Composite {
                    field: product::MANUFACTURER_PRICE.to_string(),
                },
            }),
        },
        child: Some(ChildLayout {
            entity: EntityLayout {
                schema: prices.clone(),
                id_field: unit_price::ID.to_string(),
                reference: Some(Reference {
                    schema: units.clone(),
                    embed: Embed::Alongside {
                        field: unit_price::PRICE.to_string(),
                    },
                }),
            },
            parent_key_field: unit_price::PRODUCT_ID.to_string(),
            collection: product::PRICES.to_string(),
        }),
        sort_field: product::NAME.to_string(),
    }
}

fn decomposed_layout(products: &FieldSchema, prices: &FieldSchema) -> FoldLayout {
    FoldLayout {
        parent: EntityLayout {
            schema: products.clone(),
            id_field: product::ID.to_string(),
            reference: None,
        },
        child: Some(ChildLayout {
            entity: EntityLayout {
                schema: prices.clone(),
                id_field: unit_price::ID.to_string(),
                reference: None,
            },
            parent_key_field: unit_price::PRODUCT_ID.to_string(),
            collection: product::PRICES.to_string(),
        }),
        sort_field: product::NAME.to_string(),
    }
}

fn joins() -> String {
    format!(
        "LEFT JOIN {prices} {PRICE_ALIAS} ON {PRICE_ALIAS}.{product_id} = {PRODUCT_ALIAS}.{id} \
         LEFT JOIN {units} {UNIT_ALIAS} ON {UNIT_ALIAS}.{id} = {PRICE_ALIAS}.{unit_id} \
         LEFT JOIN {units} {MANUFACTURER_UNIT_ALIAS} ON {MANUFACTURER_UNIT_ALIAS}.{id} = {PRODUCT_ALIAS}.{manufacturer_unit}",
        prices = quote_ident(PRODUCT_UNIT_PRICES_TABLE),
        units = quote_ident(UNITS_TABLE),
        product_id = quote_ident(unit_price::PRODUCT_ID),
        unit_id = quote_ident(unit_price::UNIT_ID),
        manufacturer_unit = quote_ident(product::MANUFACTURER_PRICE_UNIT_ID),
        id = quote_ident(product::ID),
    )
}

fn transformations(product_columns: &[ColumnInfo], price_columns: &[ColumnInfo]) -> TransformationPipeline {
    let mut defaults = Document::new();
    defaults.insert(audit::CREATED_BY.to_string(), json!(0));
    defaults.insert(audit::UPDATED_BY.to_string(), json!(0));

    let price_fields = price_columns.iter().map(|column| column.name.clone());
    let mut price_excludes = vec![unit_price::ID, unit_price::PRODUCT_ID];
    price_excludes.extend(audit::ALL);

    TransformationPipeline::new()
        .then(IncludeExclude::excluding(audit::ALL))
        .then(RemoveNulls)
        .then(Converter::from_columns(product_columns))
        .then(DefaultValues::new(defaults))
        .then(ArrayItems::new(
            product::PRICES,
            TransformationPipeline::new()
                .then(RemoveNulls)
                .then(Converter::from_columns(price_columns))
                .then(IncludeExclude::new(Some(price_fields), price_excludes)),
        ))
}

fn validations(require_id: bool) -> ValidationPipeline {
    let pipeline = if require_id {
        ValidationPipeline::new().field(product::ID, |f| {
            f.number_type().not_null().positive().non_zero()
        })
    } else {
        ValidationPipeline::new()
    };
    pipeline
        .with(prices_present)
        .field(product::NAME, |f| f.string_type().not_blank())
        .field(product::MANUFACTURER_PRICE, |f| {
            f.number_type().not_null().non_zero().positive()
        })
        .field(product::MANUFACTURER_PRICE_UNIT_ID, |f| {
            f.number_type().not_null().non_zero().positive()
        })
        .field(product::REMARKS, |f| f.string_type())
        .field(product::SKU, |f| f.string_type())
        .items(
            product::PRICES,
            ValidationPipeline::new()
                .field(unit_price::UNIT_ID, |f| {
                    f.number_type().not_null().non_zero().positive()
                })
                .field(unit_price::PRICE, |f| {
                    f.number_type().not_null().non_zero().positive()
                }),
        )
}

fn prices_present(doc: &Document) -> Option<ValidationFailure> {
    match doc.get(product::PRICES) {
        Some(Value::Array(items)) if !items.is_empty() => None,
        other => Some(ValidationFailure::new(
            product::PRICES,
            other.cloned().unwrap_or(Value::Null),
            ErrorCode::ProductPriceMissing,
        )),
    }
}

/// Splits a normalized product into its table row and price rows, stamped
/// with audit fields for `actor`.
fn storable(
    product: &Document,
    id: i64,
    actor: &Actor,
    layout: &FoldLayout,
    stamp: Stamp,
) -> (Document, Vec<Document>) {
    let now = now_text();
    let mut row = Document::new();
    row.insert(product::ID.to_string(), Value::from(id));
    for (field, value) in product {
        if field != product::ID && layout.parent.schema.contains(field) {
            row.insert(field.clone(), value.clone());
        }
    }
    match stamp {
        Stamp::Created => {
            row.insert(audit::CREATED_BY.to_string(), Value::from(actor.id));
            row.insert(audit::CREATE_DATE.to_string(), Value::String(now.clone()));
        }
        Stamp::Updated => {
            row.remove(audit::CREATED_BY);
            row.remove(audit::CREATE_DATE);
            row.insert(audit::UPDATED_BY.to_string(), Value::from(actor.id));
            row.insert(audit::UPDATE_DATE.to_string(), Value::String(now.clone()));
        }
    }

    let prices = product
        .get(product::PRICES)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(|price| {
                    let mut price = price.clone();
                    price.insert(unit_price::PRODUCT_ID.to_string(), Value::from(id));
                    price.insert(audit::CREATED_BY.to_string(), Value::from(actor.id));
                    price.insert(audit::CREATE_DATE.to_string(), Value::String(now.clone()));
                    price.insert(audit::UPDATED_BY.to_string(), json!(0));
                    price
                })
                .collect()
        })
        .unwrap_or_default();

    (row, prices)
}

fn price_inserts(prices: &[Document]) -> Vec<Statement> {
    prices
        .iter()
        .map(|price| Statement::insert(PRODUCT_UNIT_PRICES_TABLE, price))
        .collect()
}

fn event_document(mut row: Document, prices: Vec<Document>) -> Document {
    row.insert(
        product::PRICES.to_string(),
        Value::Array(prices.into_iter().map(Value::Object).collect()),
    );
    row
}

fn product_key(id: &Value) -> ServiceResult<i64> {
    id_from_value(id).ok_or_else(|| ServiceError::not_found(EntityKind::Product, id.clone()))
}

fn key_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
