//! Order management service.
//!
//! Wires the store, cache, event relay and command services together, runs
//! the outbox relay worker and the notification consumer, and serves health
//! and Prometheus metrics endpoints.

pub mod config;
pub mod error;
pub mod routes;
pub mod telemetry;
pub mod worker;

use std::sync::Arc;

use application::{
    BroadcastEventSink, CustomerService, Orchestrator, OrderService, ProductService, QueryService,
};
use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use read_cache::{Cache, InMemoryCache};
use store::{AggregateStore, InMemoryStore, PostgresStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use config::{Config, LogFormat};
pub use error::ServiceError;

/// Capacity of the in-process event channel feeding consumers.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Everything the running service shares.
#[derive(Clone)]
pub struct Services {
    pub orchestrator: Arc<Orchestrator>,
    pub orders: OrderService,
    pub products: ProductService,
    pub customers: CustomerService,
    pub queries: QueryService,
    pub cache: Arc<dyn Cache>,
    pub events: BroadcastEventSink,
}

impl Services {
    /// Builds the services over an already opened store.
    pub fn new(config: &Config, store: Arc<dyn AggregateStore>) -> Self {
        let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
        let events = BroadcastEventSink::new(EVENT_CHANNEL_CAPACITY);
        let orchestrator = Arc::new(
            Orchestrator::new(store.clone(), Arc::new(events.clone()), cache.clone())
                .with_retry_policy(config.retry_policy()),
        );

        Self {
            orders: OrderService::new(orchestrator.clone()),
            products: ProductService::new(orchestrator.clone()),
            customers: CustomerService::new(orchestrator.clone()),
            queries: QueryService::new(store, cache.clone()).with_ttl(config.cache_ttl),
            orchestrator,
            cache,
            events,
        }
    }

    /// Opens the configured store, running migrations for PostgreSQL.
    pub async fn connect(config: &Config) -> Result<Self, ServiceError> {
        let store: Arc<dyn AggregateStore> = match &config.database_url {
            Some(url) => {
                let store = PostgresStore::connect(url, config.database_max_connections).await?;
                store.run_migrations().await?;
                info!("Using PostgreSQL store");
                Arc::new(store)
            }
            None => {
                info!("DATABASE_URL not set; using in-memory store");
                Arc::new(InMemoryStore::new())
            }
        };
        Ok(Self::new(config, store))
    }
}

/// Creates the router for the operational endpoints.
pub fn create_app(metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
