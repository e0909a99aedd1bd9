//! Domain layer for order management.
//!
//! This crate provides the core domain abstractions including:
//! - Aggregate trait for state-persisted entities and their events
//! - Money value type with explicit currency
//! - Order aggregate with its status machine and derived total
//! - Product aggregate owning stock levels
//! - Customer aggregate owning orders

pub mod aggregate;
pub mod customer;
pub mod error;
pub mod money;
pub mod order;
pub mod product;

pub use aggregate::{Aggregate, AuditInfo, DomainEvent};
pub use customer::{Customer, CustomerError, CustomerEvent};
pub use error::DomainError;
pub use money::{Currency, Money, MoneyError};
pub use order::{
    CancelledItem, NewOrder, NewOrderItem, Order, OrderError, OrderEvent, OrderItem, OrderItemId,
    OrderNumber, OrderStatus, PaymentStatus,
};
pub use product::{
    DEFAULT_MIN_STOCK_THRESHOLD, DeletionMode, NewProduct, Product, ProductChanges, ProductError,
    ProductEvent,
};
