//! Product aggregate: price, activation and stock levels.

mod aggregate;
mod events;

pub use aggregate::{DEFAULT_MIN_STOCK_THRESHOLD, DeletionMode, NewProduct, Product, ProductChanges};
pub use events::{
    LowStockData, PriceChangedData, ProductActivationData, ProductCreatedData,
    ProductDeletedData, ProductEvent, ProductUpdatedData, StockChangedData,
};

use common::AggregateId;
use thiserror::Error;

use crate::money::MoneyError;

/// Errors that can occur during product operations.
#[derive(Debug, Error)]
pub enum ProductError {
    #[error("Product has not been created")]
    NotCreated,

    #[error("Product already created")]
    AlreadyCreated,

    #[error("Product name must not be empty")]
    InvalidName,

    #[error("Invalid SKU: {0:?}")]
    InvalidSku(String),

    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: AggregateId,
        available: u32,
        requested: u32,
    },

    #[error("Stock for product {product_id} would exceed the maximum")]
    StockOverflow { product_id: AggregateId },

    #[error("Product {product_id} is inactive")]
    Inactive { product_id: AggregateId },

    #[error("Product {product_id} is referenced by {count} active order(s)")]
    ReferencedByActiveOrders { product_id: AggregateId, count: usize },

    #[error(transparent)]
    Money(#[from] MoneyError),
}

impl ProductError {
    /// True for malformed input, as opposed to a rule the current state forbids.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ProductError::InvalidName
                | ProductError::InvalidSku(_)
                | ProductError::InvalidQuantity { .. }
                | ProductError::Money(_)
        )
    }
}
