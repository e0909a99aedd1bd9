//! Order aggregate and related types.

mod aggregate;
mod events;
mod status;
mod value_objects;

pub use aggregate::{NewOrder, Order};
pub use events::{
    ItemAddedData, ItemQuantityUpdatedData, ItemRemovedData, OrderCancelledData,
    OrderCreatedData, OrderEvent, OrderPaidData, OrderRefundedData, OrderShippedData,
    ShippingAddressUpdatedData, StatusChangedData,
};
pub use status::{OrderStatus, PaymentStatus};
pub use value_objects::{
    CancelledItem, NewOrderItem, OrderItem, OrderItemId, OrderNumber, ShippedItem,
};

use thiserror::Error;

use crate::money::{Money, MoneyError};

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order has not been created")]
    NotCreated,

    #[error("Order already created")]
    AlreadyCreated,

    /// The status table does not allow this move.
    #[error("Invalid status transition: cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Items cannot be changed while the order is {status}")]
    ItemsLocked { status: OrderStatus },

    #[error("Shipping address cannot be changed while the order is {status}")]
    AddressLocked { status: OrderStatus },

    #[error("Item not found: {item_id}")]
    ItemNotFound { item_id: OrderItemId },

    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    #[error("Invalid unit price: {price} (must be greater than 0)")]
    InvalidPrice { price: Money },

    #[error("Payment of {received} does not match order total {expected}")]
    PaymentMismatch { expected: Money, received: Money },

    #[error("{0} is required")]
    MissingValue(&'static str),

    #[error(transparent)]
    Money(#[from] MoneyError),
}

impl OrderError {
    /// True for malformed input, as opposed to a rule the current state forbids.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            OrderError::InvalidQuantity { .. }
                | OrderError::InvalidPrice { .. }
                | OrderError::PaymentMismatch { .. }
                | OrderError::MissingValue(_)
                | OrderError::Money(_)
        )
    }
}
