//! Cache-aside queries over committed state.

use std::sync::Arc;
use std::time::Duration;

use common::AggregateId;
use domain::{Aggregate, Customer, Order, Product};
use read_cache::{Cache, CacheExt, CacheKey, OrderView, ProductView};
use serde::{Serialize, de::DeserializeOwned};
use store::{AggregateRecord, AggregateStore, RecordQuery};
use tracing::{debug, warn};

use crate::error::{AppError, Result};

/// Default lifetime of a cached view.
pub const DEFAULT_VIEW_TTL: Duration = Duration::from_secs(600);

/// Read side of the service.
///
/// Every query checks the cache first and falls back to the store on a miss,
/// then fills the cache. A cache that is down only costs latency: errors are
/// logged and the query is answered from the store.
///
/// Fills are not coordinated with post-commit eviction. A read that loaded
/// state just before a commit can store it after the eviction ran, and that
/// stale view is then served until its TTL runs out. The TTL is the bound on
/// staleness; commands never read through the cache.
#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn AggregateStore>,
    cache: Arc<dyn Cache>,
    ttl: Duration,
}

impl QueryService {
    pub fn new(store: Arc<dyn AggregateStore>, cache: Arc<dyn Cache>) -> Self {
        Self {
            store,
            cache,
            ttl: DEFAULT_VIEW_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: AggregateId) -> Result<OrderView> {
        let key = CacheKey::Order(order_id);
        if let Some(view) = self.cached::<OrderView>(key).await {
            return Ok(view);
        }

        let order: Order = self
            .load(order_id)
            .await?
            .ok_or_else(|| AppError::not_found(Order::aggregate_type(), order_id))?;
        let view = OrderView::from_order(&order)
            .ok_or_else(|| AppError::not_found(Order::aggregate_type(), order_id))?;
        self.fill(key, &view).await;
        Ok(view)
    }

    /// A customer's orders, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn get_orders_by_customer(&self, customer_id: AggregateId) -> Result<Vec<OrderView>> {
        let key = CacheKey::CustomerOrders(customer_id);
        if let Some(views) = self.cached::<Vec<OrderView>>(key).await {
            return Ok(views);
        }

        if self.load::<Customer>(customer_id).await?.is_none() {
            return Err(AppError::not_found(Customer::aggregate_type(), customer_id));
        }
        let orders: Vec<Order> = self.find(Order::customer_term(customer_id)).await?;
        let mut views: Vec<OrderView> = orders.iter().filter_map(OrderView::from_order).collect();
        views.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.order_number.cmp(&a.order_number))
        });
        self.fill(key, &views).await;
        Ok(views)
    }

    /// A product's view, inactive ones included. Hard-deleted products are not found.
    #[tracing::instrument(skip(self))]
    pub async fn get_product(&self, product_id: AggregateId) -> Result<ProductView> {
        let key = CacheKey::Product(product_id);
        if let Some(view) = self.cached::<ProductView>(key).await {
            return Ok(view);
        }

        let view = self
            .load::<Product>(product_id)
            .await?
            .as_ref()
            .and_then(ProductView::from_product)
            .ok_or_else(|| AppError::not_found(Product::aggregate_type(), product_id))?;
        self.fill(key, &view).await;
        Ok(view)
    }

    /// Products at or below their stock threshold, lowest stock first.
    #[tracing::instrument(skip(self))]
    pub async fn get_low_stock_products(&self) -> Result<Vec<ProductView>> {
        let key = CacheKey::LowStockProducts;
        if let Some(views) = self.cached::<Vec<ProductView>>(key).await {
            return Ok(views);
        }

        let products: Vec<Product> = self.find(Product::LOW_STOCK_TERM).await?;
        let mut views: Vec<ProductView> = products
            .iter()
            .filter(|p| p.is_low_stock())
            .filter_map(ProductView::from_product)
            .collect();
        views.sort_by(|a, b| {
            a.stock_quantity
                .cmp(&b.stock_quantity)
                .then_with(|| a.sku.cmp(&b.sku))
        });
        self.fill(key, &views).await;
        Ok(views)
    }

    async fn cached<T: DeserializeOwned>(&self, key: CacheKey) -> Option<T> {
        let name = key.to_string();
        match self.cache.get_json::<T>(&name).await {
            Ok(Some(value)) => {
                metrics::counter!("cache_hits_total").increment(1);
                debug!(key = %name, "Cache hit");
                Some(value)
            }
            Ok(None) => {
                metrics::counter!("cache_misses_total").increment(1);
                None
            }
            Err(e) => {
                metrics::counter!("cache_misses_total").increment(1);
                warn!(key = %name, error = %e, "Cache read failed; reading from store");
                None
            }
        }
    }

    async fn fill<T: Serialize + Sync>(&self, key: CacheKey, value: &T) {
        let name = key.to_string();
        if let Err(e) = self.cache.set_json(&name, value, self.ttl).await {
            warn!(key = %name, error = %e, "Cache fill failed");
        }
    }

    async fn load<A: Aggregate>(&self, id: AggregateId) -> Result<Option<A>> {
        match self.store.load(A::aggregate_type(), id).await? {
            Some(record) => Ok(Some(hydrate(&record)?)),
            None => Ok(None),
        }
    }

    async fn find<A: Aggregate>(&self, term: impl Into<String>) -> Result<Vec<A>> {
        let query = RecordQuery::new(A::aggregate_type(), term);
        self.store.find(&query).await?.iter().map(hydrate).collect()
    }
}

fn hydrate<A: Aggregate>(record: &AggregateRecord) -> Result<A> {
    let mut aggregate: A = record.to_state()?;
    aggregate.set_version(record.version);
    Ok(aggregate)
}
