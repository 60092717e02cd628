use catalog_core::db::{SqlClient, SqliteClient, Statement};
use catalog_core::events::{ChangeKind, EventBus};
use catalog_core::messages::ErrorCode;
use catalog_core::model::actor::Actor;
use catalog_core::model::document::Document;
use catalog_core::service::{ProductService, ServiceError};
use serde_json::{json, Value};
use std::sync::Arc;

struct Fixture {
    _dir: tempfile::TempDir,
    client: Arc<SqliteClient>,
    events: EventBus,
    service: ProductService<SqliteClient>,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(SqliteClient::open(dir.path().join("catalog.db")).await.unwrap());
    for (id, name) in [(1, "kg"), (2, "box")] {
        client
            .update(
                Statement::new("INSERT INTO units (id, name, fullName) VALUES (?, ?, ?)")
                    .bind(id)
                    .bind(name)
                    .bind(format!("{name} unit")),
            )
            .await
            .unwrap();
    }
    let events = EventBus::new(64);
    let service = ProductService::open(Arc::clone(&client), events.clone())
        .await
        .unwrap();
    Fixture {
        _dir: dir,
        client,
        events,
        service,
    }
}

fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

fn rice() -> Document {
    doc(json!({
        "name": "Rice",
        "sku": "R-1",
        "manufacturerPrice": "10.5",
        "manufacturerPriceUnitId": 1,
        "prices": [
            {"unitId": 1, "price": 12.5},
            {"unitId": 2, "price": 100},
        ],
    }))
}

fn named(name: &str, sku: &str) -> Document {
    doc(json!({
        "name": name,
        "sku": sku,
        "manufacturerPrice": 1.0,
        "manufacturerPriceUnitId": 2,
        "prices": [{"unitId": 1, "price": 2.0}],
    }))
}

fn ops() -> Actor {
    Actor::new(9, "ops")
}

#[tokio::test]
async fn created_product_reads_back_folded() {
    let fx = fixture().await;

    let id = fx.service.create(rice(), &ops()).await.unwrap();
    assert_eq!(id, json!(1));

    let product = fx.service.find(1).await.unwrap();
    assert_eq!(product["id"], json!(1));
    assert_eq!(product["name"], json!("Rice"));
    assert_eq!(product["createdBy"], json!(9));
    assert_eq!(product["manufacturerPrice"]["amount"], json!(10.5));
    assert_eq!(product["manufacturerPrice"]["unit"]["name"], json!("kg"));

    let prices = product["prices"].as_array().unwrap();
    assert_eq!(prices.len(), 2);
    assert_eq!(prices[0]["productId"], json!(1));
    assert_eq!(prices[0]["amount"], json!(12.5));
    assert_eq!(prices[0]["unit"]["fullName"], json!("kg unit"));
    assert_eq!(prices[1]["price"], json!(100.0));
    assert_eq!(prices[1]["unit"]["name"], json!("box"));
}

#[tokio::test]
async fn create_publishes_full_document_after_commit() {
    let fx = fixture().await;
    let mut rx = fx.events.subscribe();

    fx.service.create(rice(), &ops()).await.unwrap();

    let event = rx.try_recv().unwrap();
    assert_eq!(event.topic(), "product.created");
    assert_eq!(event.actor, ops());
    assert_eq!(event.document["id"], json!(1));
    assert_eq!(event.document["prices"].as_array().unwrap().len(), 2);
    assert_eq!(event.document["prices"][0]["productId"], json!(1));
}

#[tokio::test]
async fn product_without_prices_is_rejected_before_any_write() {
    let fx = fixture().await;
    let mut rx = fx.events.subscribe();

    let mut raw = rice();
    raw.insert("prices".to_string(), json!([]));
    let err = fx.service.create(raw, &ops()).await.unwrap_err();

    let ServiceError::Validation(failures) = &err else {
        panic!("expected validation failure, got {err}");
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].field, "prices");
    assert_eq!(failures[0].code(), ErrorCode::ProductPriceMissing);

    let reply = serde_json::to_value(err.to_reply()).unwrap();
    assert_eq!(reply["responseCode"], json!(ErrorCode::ValidationError.code()));
    assert_eq!(reply["validationResults"][0]["errorCode"], json!(ErrorCode::ProductPriceMissing.code()));

    assert!(rx.try_recv().is_err());
    assert!(fx.service.list_decomposed(Document::new()).await.unwrap().is_empty());
    // The failed create consumed no id.
    assert_eq!(fx.service.create(rice(), &ops()).await.unwrap(), json!(1));
}

#[tokio::test]
async fn invalid_fields_are_all_reported() {
    let fx = fixture().await;

    let err = fx
        .service
        .create(
            doc(json!({
                "name": "  ",
                "manufacturerPrice": -1,
                "manufacturerPriceUnitId": 1,
                "prices": [{"unitId": 1, "price": 0}],
            })),
            &ops(),
        )
        .await
        .unwrap_err();

    let ServiceError::Validation(failures) = err else {
        panic!("expected validation failure");
    };
    let fields: Vec<_> = failures
        .iter()
        .map(|failure| (failure.field.as_str(), failure.code()))
        .collect();
    assert_eq!(
        fields,
        vec![
            ("name", ErrorCode::NotBlank),
            ("manufacturerPrice", ErrorCode::Positive),
            ("prices[0].price", ErrorCode::NonZero),
        ]
    );
}

#[tokio::test]
async fn second_page_of_ten_returns_rows_eleven_to_twenty() {
    let fx = fixture().await;
    for n in 1..=25 {
        fx.service
            .create(named(&format!("Product {n:02}"), "S"), &ops())
            .await
            .unwrap();
    }

    let page = fx
        .service
        .list(doc(json!({"page": 2, "size": "10"})))
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(page.pagination).unwrap(),
        json!({"page": 2, "size": 10, "totalCount": 25})
    );
    let names: Vec<_> = page
        .data
        .iter()
        .map(|product| product["name"].as_str().unwrap().to_string())
        .collect();
    let expected: Vec<_> = (11..=20).map(|n| format!("Product {n:02}")).collect();
    assert_eq!(names, expected);
    assert!(page
        .data
        .iter()
        .all(|product| product["prices"].as_array().unwrap().len() == 1));
}

#[tokio::test]
async fn list_filters_by_known_columns_and_ignores_others() {
    let fx = fixture().await;
    fx.service.create(named("beta", "B"), &ops()).await.unwrap();
    fx.service.create(named("Alpha", "A"), &ops()).await.unwrap();
    fx.service.create(named("gamma", "B"), &ops()).await.unwrap();

    let page = fx
        .service
        .list(doc(json!({"sku": "B", "colour": "red"})))
        .await
        .unwrap();
    assert_eq!(page.pagination.total_count, 2);
    assert_eq!(page.pagination.size, 1000);
    let names: Vec<_> = page.data.iter().map(|product| product["name"].clone()).collect();
    assert_eq!(names, vec![json!("beta"), json!("gamma")]);

    let all = fx.service.list(Document::new()).await.unwrap();
    let names: Vec<_> = all.data.iter().map(|product| product["name"].clone()).collect();
    assert_eq!(names, vec![json!("Alpha"), json!("beta"), json!("gamma")]);
}

#[tokio::test]
async fn list_beyond_last_page_is_empty() {
    let fx = fixture().await;
    fx.service.create(rice(), &ops()).await.unwrap();

    let page = fx
        .service
        .list(doc(json!({"page": 3, "size": 10})))
        .await
        .unwrap();
    assert!(page.data.is_empty());
    assert_eq!(page.pagination.total_count, 1);
}

#[tokio::test]
async fn update_replaces_the_price_set() {
    let fx = fixture().await;
    fx.service.create(rice(), &ops()).await.unwrap();
    let mut rx = fx.events.subscribe();

    let editor = Actor::new(11, "editor");
    let id = fx
        .service
        .update(
            doc(json!({
                "id": "1",
                "name": "Brown rice",
                "manufacturerPrice": 11.0,
                "manufacturerPriceUnitId": 2,
                "prices": [{"unitId": 2, "price": 95.0}],
            })),
            &editor,
        )
        .await
        .unwrap();
    assert_eq!(id, json!(1));

    let product = fx.service.find(1).await.unwrap();
    assert_eq!(product["name"], json!("Brown rice"));
    assert_eq!(product["createdBy"], json!(9));
    assert_eq!(product["updatedBy"], json!(11));
    assert_eq!(product["manufacturerPrice"]["unit"]["name"], json!("box"));
    let prices = product["prices"].as_array().unwrap();
    assert_eq!(prices.len(), 1);
    assert_eq!(prices[0]["price"], json!(95.0));

    let event = rx.try_recv().unwrap();
    assert_eq!(event.change, ChangeKind::Updated);
    assert_eq!(event.actor.id, 11);
}

#[tokio::test]
async fn update_of_missing_product_is_not_found_and_changes_nothing() {
    let fx = fixture().await;
    fx.service.create(rice(), &ops()).await.unwrap();
    let mut rx = fx.events.subscribe();

    let mut raw = named("Ghost", "G");
    raw.insert("id".to_string(), json!(404));
    let err = fx.service.update(raw, &ops()).await.unwrap_err();

    assert!(matches!(err, ServiceError::NotFound { ref id, .. } if *id == json!(404)));
    let reply = err.to_reply();
    assert_eq!(reply.message_code, "productNotFound");
    assert_eq!(reply.message, "Product with id 404 was not found.");
    assert!(rx.try_recv().is_err());

    // The price rows of product 1 are untouched.
    let prices = fx.service.unit_wise_prices().await.unwrap();
    assert_eq!(prices["1"].as_object().unwrap().len(), 2);
}

#[tokio::test]
async fn update_without_id_is_a_validation_failure() {
    let fx = fixture().await;

    let err = fx.service.update(rice(), &ops()).await.unwrap_err();
    let ServiceError::Validation(failures) = err else {
        panic!("expected validation failure");
    };
    assert_eq!(failures[0].field, "id");
    assert_eq!(failures[0].code(), ErrorCode::NotNull);
}

#[tokio::test]
async fn delete_removes_product_and_prices() {
    let fx = fixture().await;
    fx.service.create(rice(), &ops()).await.unwrap();
    let mut rx = fx.events.subscribe();

    assert_eq!(fx.service.delete(1, &ops()).await.unwrap(), json!(1));

    let event = rx.try_recv().unwrap();
    assert_eq!(event.topic(), "product.deleted");
    assert_eq!(event.document["id"], json!(1));
    assert_eq!(event.document["deletedBy"], json!(9));

    assert!(matches!(
        fx.service.find(1).await,
        Err(ServiceError::NotFound { .. })
    ));
    let remaining = fx
        .client
        .query(Statement::new("SELECT COUNT(*) FROM productUnitPrices"))
        .await
        .unwrap()
        .first_i64()
        .unwrap();
    assert_eq!(remaining, Some(0));

    assert!(matches!(
        fx.service.delete(1, &ops()).await,
        Err(ServiceError::NotFound { .. })
    ));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn find_of_unknown_or_malformed_id_is_not_found() {
    let fx = fixture().await;

    for id in [json!(5), json!("abc"), json!(-1)] {
        let err = fx.service.find(id.clone()).await.unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::ProductNotFound), "id {id}");
    }
}

#[tokio::test]
async fn decomposed_reads_return_raw_rows() {
    let fx = fixture().await;
    fx.service.create(rice(), &ops()).await.unwrap();
    fx.service.create(named("Apple", "A"), &ops()).await.unwrap();

    let product = fx.service.find_decomposed(1).await.unwrap();
    assert_eq!(product["manufacturerPrice"], json!(10.5));
    let prices = product["prices"].as_array().unwrap();
    assert_eq!(prices.len(), 2);
    assert!(prices[0].get("unit").is_none());
    assert_eq!(prices[0]["unitId"], json!(1));

    let rows = fx.service.list_decomposed(Document::new()).await.unwrap();
    let names: Vec<_> = rows.iter().map(|row| row["name"].clone()).collect();
    assert_eq!(names, vec![json!("Apple"), json!("Rice")]);
    assert!(rows[0].get("prices").is_none());

    let filtered = fx
        .service
        .list_decomposed(doc(json!({"sku": "R-1"})))
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0]["id"], json!(1));
}

#[tokio::test]
async fn unit_wise_prices_group_by_product_then_unit() {
    let fx = fixture().await;
    fx.service.create(rice(), &ops()).await.unwrap();
    fx.service.create(named("Apple", "A"), &ops()).await.unwrap();

    let prices = fx.service.unit_wise_prices().await.unwrap();
    assert_eq!(
        Value::Object(prices),
        json!({
            "1": {"1": 12.5, "2": 100.0},
            "2": {"1": 2.0},
        })
    );
}

#[tokio::test]
async fn reopened_service_continues_after_highest_id() {
    let fx = fixture().await;
    fx.service.create(rice(), &ops()).await.unwrap();
    fx.service.create(named("Apple", "A"), &ops()).await.unwrap();

    let reopened = ProductService::open(Arc::clone(&fx.client), fx.events.clone())
        .await
        .unwrap();
    assert_eq!(
        reopened.create(named("Pear", "P"), &ops()).await.unwrap(),
        json!(3)
    );
}

#[tokio::test]
async fn concurrent_creates_get_distinct_ids() {
    let fx = fixture().await;

    let actor = ops();
    let (first, second, third) = tokio::join!(
        fx.service.create(named("One", "1"), &actor),
        fx.service.create(named("Two", "2"), &actor),
        fx.service.create(named("Three", "3"), &actor),
    );
    let mut ids = vec![first.unwrap(), second.unwrap(), third.unwrap()];
    ids.sort_by_key(|id| id.as_i64());
    assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);
    assert_eq!(fx.service.list(Document::new()).await.unwrap().data.len(), 3);
}
