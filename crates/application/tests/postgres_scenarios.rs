//! Command handlers over the PostgreSQL store.
//!
//! Run with:
//!
//! ```bash
//! cargo test -p application --test postgres_scenarios -- --test-threads=1
//! ```

use std::sync::Arc;

use application::{
    AppError, CancelOrder, CreateOrder, CreateProduct, CustomerService, InMemoryEventSink,
    MarkOrderPaid, Orchestrator, OrderService, ProductService, QueryService, ReduceStock,
    RegisterCustomer, RetryPolicy,
};
use common::AggregateId;
use domain::{Currency, DomainError, Money, NewProduct, OrderStatus, ProductError};
use read_cache::InMemoryCache;
use serial_test::serial;
use sqlx::PgPool;
use store::{AggregateStore, PostgresStore};
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

            let pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_aggregates_table.sql"
            ))
            .execute(&pool)
            .await
            .unwrap();
            sqlx::raw_sql(include_str!("../../../migrations/002_create_outbox_table.sql"))
                .execute(&pool)
                .await
                .unwrap();
            pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

struct TestHarness {
    store: PostgresStore,
    orders: OrderService,
    products: ProductService,
    customers: CustomerService,
    queries: QueryService,
}

async fn harness() -> TestHarness {
    let info = get_container_info().await;
    let store = PostgresStore::connect(&info.connection_string, 5)
        .await
        .unwrap();
    sqlx::query("TRUNCATE TABLE aggregates, outbox")
        .execute(store.pool())
        .await
        .unwrap();

    let cache = InMemoryCache::new();
    let orchestrator = Arc::new(
        Orchestrator::new(
            Arc::new(store.clone()),
            Arc::new(InMemoryEventSink::new()),
            Arc::new(cache.clone()),
        )
        .with_retry_policy(RetryPolicy {
            max_attempts: 5,
            ..RetryPolicy::default()
        }),
    );

    TestHarness {
        orders: OrderService::new(orchestrator.clone()),
        products: ProductService::new(orchestrator.clone()),
        customers: CustomerService::new(orchestrator),
        queries: QueryService::new(Arc::new(store.clone()), Arc::new(cache)),
        store,
    }
}

async fn product(h: &TestHarness, stock: u32) -> AggregateId {
    let cmd = CreateProduct::new(NewProduct::new("Widget", "PG-1", Money::usd(5000), stock));
    let product_id = cmd.product_id;
    h.products.create_product(cmd).await.unwrap();
    product_id
}

#[tokio::test]
#[serial]
async fn order_lifecycle_persists_across_handlers() {
    let h = harness().await;
    let register = RegisterCustomer::new("Grace Hopper", "grace@example.com");
    let customer_id = register.customer_id;
    h.customers.register(register).await.unwrap();
    let product_id = product(&h, 10).await;

    let cmd = CreateOrder::new(customer_id, Currency::USD).with_item(product_id, 2);
    let order_id = cmd.order_id;
    h.orders.create_order(cmd).await.unwrap();
    h.orders
        .mark_paid(MarkOrderPaid::new(order_id, "card", Money::usd(10000)))
        .await
        .unwrap();

    let order = h.queries.get_order(order_id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.total_amount, Money::usd(10000));
    assert_eq!(h.queries.get_product(product_id).await.unwrap().stock_quantity, 8);

    h.orders
        .cancel(CancelOrder::new(order_id, "customer request"))
        .await
        .unwrap();
    assert_eq!(h.queries.get_product(product_id).await.unwrap().stock_quantity, 10);
    assert_eq!(
        h.queries.get_orders_by_customer(customer_id).await.unwrap()[0].status,
        OrderStatus::Cancelled
    );
    assert!(h.store.pending_outbox(100).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn concurrent_reductions_never_oversell() {
    let h = harness().await;
    let product_id = product(&h, 10).await;

    let mut handles = Vec::new();
    for _ in 0..2 {
        let products = h.products.clone();
        handles.push(tokio::spawn(async move {
            products.reduce_stock(ReduceStock::new(product_id, 6)).await
        }));
    }
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(AppError::Domain(DomainError::Product(ProductError::InsufficientStock { .. })))
    )));
    assert_eq!(h.queries.get_product(product_id).await.unwrap().stock_quantity, 4);
}
