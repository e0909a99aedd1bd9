//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use serial_test::serial;
use sqlx::PgPool;
use store::{
    AggregateId, AggregateRecord, AggregateStore, EventEnvelope, PostgresStore, RecordQuery,
    StoreError, Version,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_aggregates_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            sqlx::raw_sql(include_str!("../../../migrations/002_create_outbox_table.sql"))
                .execute(&temp_pool)
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;
    let store = PostgresStore::connect(&info.connection_string, 5)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE aggregates, outbox")
        .execute(store.pool())
        .await
        .unwrap();

    store
}

fn product_record(id: AggregateId, version: Version, stock: u32) -> AggregateRecord {
    AggregateRecord::from_state(
        id,
        "Product",
        version,
        &serde_json::json!({
            "stock_quantity": stock,
            "price": { "amount": 5000, "currency": "USD" }
        }),
        vec!["sku:WIDGET-1".to_string()],
    )
    .unwrap()
}

#[tokio::test]
#[serial]
async fn save_and_load_round_trip() {
    let store = get_test_store().await;
    let id = AggregateId::new();

    let mut tx = store.begin().await.unwrap();
    let version = tx
        .save(product_record(id, Version::initial(), 10))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(version, Version::first());
    let loaded = store.load("Product", id).await.unwrap().unwrap();
    assert_eq!(loaded.version, Version::first());
    assert_eq!(loaded.state["price"]["currency"], "USD");
    assert_eq!(loaded.index_terms, vec!["sku:WIDGET-1".to_string()]);
}

#[tokio::test]
#[serial]
async fn find_by_index_term() {
    let store = get_test_store().await;
    let id = AggregateId::new();

    let mut tx = store.begin().await.unwrap();
    tx.save(product_record(id, Version::initial(), 3))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let found = store
        .find(&RecordQuery::new("Product", "sku:WIDGET-1"))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].aggregate_id, id);

    let none = store
        .find(&RecordQuery::new("Product", "sku:OTHER"))
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
#[serial]
async fn stale_version_is_a_conflict() {
    let store = get_test_store().await;
    let id = AggregateId::new();

    let mut tx = store.begin().await.unwrap();
    tx.save(product_record(id, Version::initial(), 10))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let err = tx
        .save(product_record(id, Version::initial(), 4))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::ConcurrencyConflict { actual, .. } if actual == Version::first()
    ));
}

#[tokio::test]
#[serial]
async fn rollback_discards_writes_and_outbox() {
    let store = get_test_store().await;
    let id = AggregateId::new();
    let event = EventEnvelope::builder()
        .event_type("ProductCreated")
        .aggregate_id(id)
        .aggregate_type("Product")
        .version(Version::first())
        .payload_raw(serde_json::json!({}))
        .build()
        .unwrap();

    let mut tx = store.begin().await.unwrap();
    tx.save(product_record(id, Version::initial(), 10))
        .await
        .unwrap();
    tx.append_outbox(vec![event]).await.unwrap();
    tx.rollback().await.unwrap();

    assert!(store.load("Product", id).await.unwrap().is_none());
    assert!(store.pending_outbox(10).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn outbox_is_delivered_in_order_until_dispatched() {
    let store = get_test_store().await;
    let id = AggregateId::new();
    let events: Vec<EventEnvelope> = ["StockReduced", "LowStock"]
        .into_iter()
        .map(|event_type| {
            EventEnvelope::builder()
                .event_type(event_type)
                .aggregate_id(id)
                .aggregate_type("Product")
                .version(Version::new(2))
                .payload_raw(serde_json::json!({ "product_id": id }))
                .build()
                .unwrap()
        })
        .collect();

    let mut tx = store.begin().await.unwrap();
    tx.append_outbox(events.clone()).await.unwrap();
    tx.commit().await.unwrap();

    let pending = store.pending_outbox(10).await.unwrap();
    let types: Vec<_> = pending.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, vec!["StockReduced", "LowStock"]);

    store.mark_dispatched(&[events[0].event_id]).await.unwrap();
    let pending = store.pending_outbox(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].event_id, events[1].event_id);

    let pruned = store
        .prune_dispatched(chrono::Utc::now() + chrono::TimeDelta::seconds(5))
        .await
        .unwrap();
    assert!(pruned >= 1);
    let pending = store.pending_outbox(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].event_id, events[1].event_id);
}

#[tokio::test]
#[serial]
async fn delete_requires_matching_version() {
    let store = get_test_store().await;
    let id = AggregateId::new();

    let mut tx = store.begin().await.unwrap();
    tx.save(product_record(id, Version::initial(), 0))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    assert!(
        tx.delete("Product", id, Version::new(5))
            .await
            .unwrap_err()
            .is_conflict()
    );
    tx.rollback().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    tx.delete("Product", id, Version::first()).await.unwrap();
    tx.commit().await.unwrap();
    assert!(store.load("Product", id).await.unwrap().is_none());
}
