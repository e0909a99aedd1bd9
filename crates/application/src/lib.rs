//! Application layer for order management.
//!
//! This crate sequences every change as one unit of work:
//! - [`UnitOfWork`] groups loads, aggregate commands and saves in one store transaction
//! - [`Orchestrator`] retries conflicting units of work, then publishes and invalidates after commit
//! - [`EventRelay`] moves committed events from the outbox to an [`EventSink`]
//! - Command handlers for orders, products and customers
//! - [`QueryService`] answers reads cache-aside
//! - [`NotificationConsumer`] reacts to published events

pub mod error;
pub mod handlers;
pub mod notifications;
pub mod orchestrator;
pub mod queries;
pub mod relay;
pub mod retry;
pub mod sink;
pub mod unit_of_work;

pub use error::{AppError, ErrorKind, Result};
pub use handlers::customer::{CustomerService, DeactivateCustomer, RegisterCustomer};
pub use handlers::order::{
    AddOrderItem, CancelOrder, CreateOrder, MarkOrderDelivered, MarkOrderPaid, MarkOrderShipped,
    OrderLine, OrderService, RefundOrder, RemoveOrderItem, StartProcessing, UpdateItemQuantity,
    UpdateShippingAddress,
};
pub use handlers::product::{
    AdjustStock, CreateProduct, DeleteCheck, DeleteProduct, IncreaseStock, ProductService,
    ReduceStock, SetProductActive, UpdateProductDetails,
};
pub use notifications::{LogNotifier, Notification, NotificationConsumer, Notifier, RecordingNotifier};
pub use orchestrator::{Command, CommandResult, Orchestrator};
pub use queries::QueryService;
pub use relay::EventRelay;
pub use retry::RetryPolicy;
pub use sink::{BroadcastEventSink, EventSink, InMemoryEventSink, PublishError};
pub use unit_of_work::{CacheDependent, Committed, UnitOfWork};
