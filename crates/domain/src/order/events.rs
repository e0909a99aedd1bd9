//! Order domain events.

use chrono::{DateTime, Utc};
use common::{Actor, AggregateId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::money::{Currency, Money};

use super::{CancelledItem, OrderItemId, OrderNumber, OrderStatus, ShippedItem};

/// Events that can occur on an order aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    OrderCreated(OrderCreatedData),

    ItemAdded(ItemAddedData),

    ItemRemoved(ItemRemovedData),

    ItemQuantityUpdated(ItemQuantityUpdatedData),

    ShippingAddressUpdated(ShippingAddressUpdatedData),

    /// Pending → Processing.
    ProcessingStarted(StatusChangedData),

    OrderPaid(OrderPaidData),

    OrderShipped(OrderShippedData),

    OrderDelivered(StatusChangedData),

    OrderRefunded(OrderRefundedData),

    OrderCancelled(OrderCancelledData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "OrderCreated",
            OrderEvent::ItemAdded(_) => "ItemAdded",
            OrderEvent::ItemRemoved(_) => "ItemRemoved",
            OrderEvent::ItemQuantityUpdated(_) => "ItemQuantityUpdated",
            OrderEvent::ShippingAddressUpdated(_) => "ShippingAddressUpdated",
            OrderEvent::ProcessingStarted(_) => "ProcessingStarted",
            OrderEvent::OrderPaid(_) => "OrderPaid",
            OrderEvent::OrderShipped(_) => "OrderShipped",
            OrderEvent::OrderDelivered(_) => "OrderDelivered",
            OrderEvent::OrderRefunded(_) => "OrderRefunded",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedData {
    pub order_id: AggregateId,
    pub order_number: OrderNumber,
    pub customer_id: AggregateId,
    pub currency: Currency,
    pub shipping_address: Option<String>,
    pub notes: Option<String>,
    pub created_by: Actor,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAddedData {
    pub order_id: AggregateId,
    pub item_id: OrderItemId,
    pub product_id: AggregateId,

    /// Product name at the time of adding.
    pub product_name: String,

    pub quantity: u32,

    /// Unit price at the time of adding.
    pub unit_price: Money,

    pub actor: Actor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRemovedData {
    pub order_id: AggregateId,
    pub item_id: OrderItemId,
    pub product_id: AggregateId,
    pub quantity: u32,
    pub unit_price: Money,
    pub actor: Actor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemQuantityUpdatedData {
    pub order_id: AggregateId,
    pub item_id: OrderItemId,
    pub product_id: AggregateId,
    pub old_quantity: u32,
    pub new_quantity: u32,
    pub unit_price: Money,
    pub actor: Actor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingAddressUpdatedData {
    pub order_id: AggregateId,
    pub shipping_address: String,
    pub actor: Actor,
}

/// Data for transitions that carry nothing beyond the new status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChangedData {
    pub order_id: AggregateId,
    pub order_number: OrderNumber,
    pub customer_id: AggregateId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPaidData {
    pub order_id: AggregateId,
    pub order_number: OrderNumber,
    pub customer_id: AggregateId,
    pub payment_method: String,
    pub amount_paid: Money,
    pub paid_by: Actor,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderShippedData {
    pub order_id: AggregateId,
    pub order_number: OrderNumber,
    pub customer_id: AggregateId,
    pub tracking_number: String,
    pub carrier: Option<String>,
    pub items: Vec<ShippedItem>,
    pub shipped_by: Actor,
    pub shipped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRefundedData {
    pub order_id: AggregateId,
    pub order_number: OrderNumber,
    pub customer_id: AggregateId,
    pub amount: Money,
    pub reason: String,
    pub refunded_by: Actor,
    pub refunded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelledData {
    pub order_id: AggregateId,
    pub order_number: OrderNumber,
    pub customer_id: AggregateId,
    pub previous_status: OrderStatus,
    pub reason: String,
    pub order_total: Money,
    pub items: Vec<CancelledItem>,
    pub cancelled_by: Actor,
    pub cancelled_at: DateTime<Utc>,
}
