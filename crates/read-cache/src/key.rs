//! Cache key naming.

use chrono::NaiveDate;
use common::AggregateId;

/// Every key the read side and the notification consumer use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// One order view.
    Order(AggregateId),
    /// The list of a customer's orders.
    CustomerOrders(AggregateId),
    /// One product view.
    Product(AggregateId),
    /// All products at or below their stock threshold.
    LowStockProducts,
    /// Suppresses repeated low-stock alerts for a product within one day.
    LowStockAlert(AggregateId, NaiveDate),
}

impl CacheKey {
    /// Keys whose content depends on an order.
    pub fn for_order(order_id: AggregateId, customer_id: Option<AggregateId>) -> Vec<CacheKey> {
        let mut keys = vec![CacheKey::Order(order_id)];
        keys.extend(customer_id.map(CacheKey::CustomerOrders));
        keys
    }

    /// Keys whose content depends on a product.
    pub fn for_product(product_id: AggregateId) -> Vec<CacheKey> {
        vec![CacheKey::Product(product_id), CacheKey::LowStockProducts]
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Order(id) => write!(f, "order:{id}"),
            CacheKey::CustomerOrders(id) => write!(f, "customer_orders:{id}"),
            CacheKey::Product(id) => write!(f, "product:{id}"),
            CacheKey::LowStockProducts => f.write_str("products:low_stock"),
            CacheKey::LowStockAlert(id, day) => {
                write!(f, "low_stock_alert:{id}:{}", day.format("%Y%m%d"))
            }
        }
    }
}
