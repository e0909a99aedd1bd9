//! Product domain events.

use chrono::{DateTime, Utc};
use common::{Actor, AggregateId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::money::Money;

use super::DeletionMode;

/// Events that can occur on a product aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ProductEvent {
    ProductCreated(ProductCreatedData),

    /// Name, description, category or threshold changed.
    ProductUpdated(ProductUpdatedData),

    PriceChanged(PriceChangedData),

    StockReduced(StockChangedData),

    StockIncreased(StockChangedData),

    /// Stock is at or below the product's minimum threshold.
    ///
    /// Raised after every qualifying mutation; consumers deduplicate.
    LowStock(LowStockData),

    ProductActivated(ProductActivationData),

    ProductDeactivated(ProductActivationData),

    ProductDeleted(ProductDeletedData),
}

impl DomainEvent for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "ProductCreated",
            ProductEvent::ProductUpdated(_) => "ProductUpdated",
            ProductEvent::PriceChanged(_) => "PriceChanged",
            ProductEvent::StockReduced(_) => "StockReduced",
            ProductEvent::StockIncreased(_) => "StockIncreased",
            ProductEvent::LowStock(_) => "LowStock",
            ProductEvent::ProductActivated(_) => "ProductActivated",
            ProductEvent::ProductDeactivated(_) => "ProductDeactivated",
            ProductEvent::ProductDeleted(_) => "ProductDeleted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCreatedData {
    pub product_id: AggregateId,
    pub name: String,
    pub description: String,
    pub sku: String,
    pub price: Money,
    pub stock_quantity: u32,
    pub min_stock_threshold: u32,
    pub category: Option<String>,
    pub created_by: Actor,
    pub created_at: DateTime<Utc>,
}

/// Data for ProductUpdated event. Carries the full set of editable
/// descriptive fields after the change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductUpdatedData {
    pub product_id: AggregateId,
    pub name: String,
    pub description: String,
    pub category: Option<String>,
    pub min_stock_threshold: u32,
    pub updated_by: Actor,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceChangedData {
    pub product_id: AggregateId,
    pub sku: String,
    pub old_price: Money,
    pub new_price: Money,
    pub changed_by: Actor,
    pub changed_at: DateTime<Utc>,
}

/// Data for StockReduced and StockIncreased events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockChangedData {
    pub product_id: AggregateId,
    pub sku: String,
    pub product_name: String,

    /// Units removed or added; always positive.
    pub quantity: u32,

    pub previous_stock: u32,
    pub new_stock: u32,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowStockData {
    pub product_id: AggregateId,
    pub sku: String,
    pub product_name: String,
    pub current_stock: u32,
    pub min_stock_threshold: u32,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductActivationData {
    pub product_id: AggregateId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDeletedData {
    pub product_id: AggregateId,
    pub sku: String,
    pub mode: DeletionMode,
    pub deleted_by: Actor,
    pub deleted_at: DateTime<Utc>,
}
