//! Value objects for the order domain.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Money;

/// Identifies one line of an order. The same product may appear on several lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderItemId(Uuid);

impl OrderItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OrderItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OrderItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Human-readable order number, e.g. `ORD-20240131-9F86D081`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Generates a number from the creation date and eight random hex digits.
    pub fn generate(at: DateTime<Utc>) -> Self {
        let random = Uuid::new_v4().simple().to_string();
        Self(format!(
            "ORD-{}-{}",
            at.format("%Y%m%d"),
            random[..8].to_ascii_uppercase()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A line of an order.
///
/// `product_name` and `unit_price` are copied from the product when the line
/// is added and are not refreshed if the product changes later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product_id: AggregateId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderItem {
    /// quantity × unit price, saturating at the largest representable amount.
    pub fn total_price(&self) -> Money {
        self.unit_price
            .checked_mul(self.quantity)
            .unwrap_or_else(|_| Money::new(u64::MAX, self.unit_price.currency()))
    }
}

/// The product data captured for a new order line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_id: AggregateId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl NewOrderItem {
    pub fn new(
        product_id: AggregateId,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            product_id,
            product_name: product_name.into(),
            quantity,
            unit_price,
        }
    }
}

/// Item snapshot carried by the OrderShipped event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippedItem {
    pub product_id: AggregateId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

/// Item snapshot carried by the OrderCancelled event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelledItem {
    pub item_id: OrderItemId,
    pub product_id: AggregateId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,

    /// Whether the quantity was put back into the product's stock.
    pub stock_restored: bool,
}
