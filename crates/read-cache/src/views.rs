//! Denormalized views stored in the cache.

use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{
    Aggregate, Currency, Money, Order, OrderItem, OrderItemId, OrderStatus, PaymentStatus, Product,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItemView {
    pub item_id: OrderItemId,
    pub product_id: AggregateId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub total_price: Money,
}

impl From<&OrderItem> for OrderItemView {
    fn from(item: &OrderItem) -> Self {
        Self {
            item_id: item.id,
            product_id: item.product_id,
            product_name: item.product_name.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            total_price: item.total_price(),
        }
    }
}

/// Read model of one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderView {
    pub order_id: AggregateId,
    pub order_number: String,
    pub customer_id: AggregateId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub currency: Currency,
    pub total_amount: Money,
    pub shipping_address: Option<String>,
    pub notes: Option<String>,
    pub items: Vec<OrderItemView>,
    pub payment_method: Option<String>,
    pub tracking_number: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl OrderView {
    /// Builds the view of a created order; `None` for an uninitialized one.
    pub fn from_order(order: &Order) -> Option<Self> {
        Some(Self {
            order_id: order.id()?,
            order_number: order.order_number()?.to_string(),
            customer_id: order.customer_id()?,
            status: order.status(),
            payment_status: order.payment_status(),
            currency: order.currency(),
            total_amount: order.total_amount(),
            shipping_address: order.shipping_address().map(str::to_string),
            notes: order.notes().map(str::to_string),
            items: order.items().iter().map(OrderItemView::from).collect(),
            payment_method: order.payment_method().map(str::to_string),
            tracking_number: order.tracking_number().map(str::to_string),
            created_at: order.audit().created_at,
            updated_at: order.audit().updated_at,
            version: order.version().as_i64(),
        })
    }
}

/// Read model of one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductView {
    pub product_id: AggregateId,
    pub name: String,
    pub description: String,
    pub sku: String,
    pub price: Money,
    pub stock_quantity: u32,
    pub min_stock_threshold: u32,
    pub category: Option<String>,
    pub is_active: bool,
    pub is_low_stock: bool,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl ProductView {
    pub fn from_product(product: &Product) -> Option<Self> {
        Some(Self {
            product_id: product.id()?,
            name: product.name().to_string(),
            description: product.description().to_string(),
            sku: product.sku().to_string(),
            price: product.price(),
            stock_quantity: product.stock_quantity(),
            min_stock_threshold: product.min_stock_threshold(),
            category: product.category().map(str::to_string),
            is_active: product.is_active(),
            is_low_stock: product.is_low_stock(),
            updated_at: product.audit().updated_at,
            version: product.version().as_i64(),
        })
    }
}
