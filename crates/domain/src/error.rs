//! Domain error types.

use thiserror::Error;

use crate::customer::CustomerError;
use crate::money::MoneyError;
use crate::order::OrderError;
use crate::product::ProductError;

/// Any error raised by an aggregate command.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Product error: {0}")]
    Product(#[from] ProductError),

    #[error("Customer error: {0}")]
    Customer(#[from] CustomerError),

    #[error("Money error: {0}")]
    Money(#[from] MoneyError),
}

impl DomainError {
    /// True for malformed input, false for a business rule the current state forbids.
    pub fn is_validation(&self) -> bool {
        match self {
            DomainError::Order(e) => e.is_validation(),
            DomainError::Product(e) => e.is_validation(),
            DomainError::Customer(e) => e.is_validation(),
            DomainError::Money(_) => true,
        }
    }
}
