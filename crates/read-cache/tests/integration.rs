//! Integration tests: views → typed cache helpers → invalidation.

use std::sync::Arc;
use std::time::Duration;

use common::{Actor, AggregateId};
use domain::{Aggregate, Money, NewProduct, Product};
use read_cache::{Cache, CacheExt, CacheInvalidator, CacheKey, InMemoryCache, ProductView};

const TTL: Duration = Duration::from_secs(600);

fn product(stock: u32) -> Product {
    let mut product = Product::default();
    let events = product
        .create(
            AggregateId::new(),
            NewProduct::new("Widget", "W-1", Money::usd(2500), stock),
            &Actor::system(),
        )
        .unwrap();
    product.apply_events(events);
    product
}

#[tokio::test]
async fn typed_views_survive_the_cache() {
    let cache: Arc<dyn Cache> = Arc::new(InMemoryCache::new());
    let view = ProductView::from_product(&product(40)).unwrap();
    let key = CacheKey::Product(view.product_id).to_string();

    cache.set_json(&key, &view, TTL).await.unwrap();
    let cached: Option<ProductView> = cache.get_json(&key).await.unwrap();

    assert_eq!(cached, Some(view));
}

#[tokio::test]
async fn invalidating_a_product_drops_its_view_and_the_low_stock_list() {
    let cache = InMemoryCache::new();
    let view = ProductView::from_product(&product(3)).unwrap();
    let product_key = CacheKey::Product(view.product_id).to_string();
    let list_key = CacheKey::LowStockProducts.to_string();

    cache.set_json(&product_key, &view, TTL).await.unwrap();
    cache.set_json(&list_key, &vec![view.clone()], TTL).await.unwrap();
    assert_eq!(cache.len().await, 2);

    let invalidator = CacheInvalidator::new(Arc::new(cache.clone()));
    invalidator
        .invalidate(&CacheKey::for_product(view.product_id))
        .await;

    assert!(cache.is_empty().await);
    let miss: Option<ProductView> = cache.get_json(&product_key).await.unwrap();
    assert!(miss.is_none());
}

#[tokio::test]
async fn mismatched_document_is_a_serialization_error() {
    let cache = InMemoryCache::new();
    cache
        .set("product:x", serde_json::json!({"unexpected": true}), TTL)
        .await
        .unwrap();

    let result: read_cache::Result<Option<ProductView>> = cache.get_json("product:x").await;
    assert!(matches!(
        result,
        Err(read_cache::CacheError::Serialization(_))
    ));
}
