//! Order commands and the service that dispatches them.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{Actor, AggregateId};
use domain::{Currency, Customer, Money, NewOrder, Order, OrderError, OrderItemId, OrderNumber, Product};
use tracing::debug;

use super::{add_line, change, restore_stock};
use crate::error::{AppError, Result};
use crate::orchestrator::{Command, CommandResult, Orchestrator};
use crate::unit_of_work::UnitOfWork;

/// A line requested at order creation.
#[derive(Debug, Clone)]
pub struct OrderLine {
    pub item_id: OrderItemId,
    pub product_id: AggregateId,
    pub quantity: u32,
}

/// Command to create an order, optionally with initial lines.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub order_id: AggregateId,
    pub customer_id: AggregateId,
    pub currency: Currency,
    pub shipping_address: Option<String>,
    pub notes: Option<String>,
    pub items: Vec<OrderLine>,
    pub actor: Actor,
}

impl CreateOrder {
    /// Creates the command with a freshly generated order ID.
    pub fn new(customer_id: AggregateId, currency: Currency) -> Self {
        Self {
            order_id: AggregateId::new(),
            customer_id,
            currency,
            shipping_address: None,
            notes: None,
            items: Vec::new(),
            actor: Actor::system(),
        }
    }

    pub fn with_item(mut self, product_id: AggregateId, quantity: u32) -> Self {
        self.items.push(OrderLine {
            item_id: OrderItemId::new(),
            product_id,
            quantity,
        });
        self
    }

    pub fn with_shipping_address(mut self, address: impl Into<String>) -> Self {
        self.shipping_address = Some(address.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

#[async_trait]
impl Command for CreateOrder {
    type Output = Order;
    const NAME: &'static str = "create_order";

    fn actor(&self) -> &Actor {
        &self.actor
    }

    async fn execute(&self, uow: &mut UnitOfWork) -> Result<Order> {
        let customer: Customer = uow.load_required(self.customer_id).await?;
        customer.ensure_can_order()?;

        let order_number = OrderNumber::generate(Utc::now());
        if uow.count::<Order>(Order::number_term(&order_number)).await? > 0 {
            return Err(AppError::Conflict(format!(
                "order number {order_number} already taken"
            )));
        }

        let mut new = NewOrder::new(self.customer_id, self.currency);
        new.shipping_address = self.shipping_address.clone();
        new.notes = self.notes.clone();

        let mut order = Order::default();
        let events = order.create(self.order_id, order_number, new, uow.actor())?;
        uow.apply(&mut order, events)?;

        for line in &self.items {
            add_line(uow, &mut order, line.item_id, line.product_id, line.quantity).await?;
        }
        uow.save(&mut order).await?;
        Ok(order)
    }
}

/// Command to add a line to an order, taking the quantity from stock.
#[derive(Debug, Clone)]
pub struct AddOrderItem {
    pub order_id: AggregateId,
    pub item_id: OrderItemId,
    pub product_id: AggregateId,
    pub quantity: u32,
    pub actor: Actor,
}

impl AddOrderItem {
    /// Creates the command with a freshly generated item ID.
    pub fn new(order_id: AggregateId, product_id: AggregateId, quantity: u32) -> Self {
        Self {
            order_id,
            item_id: OrderItemId::new(),
            product_id,
            quantity,
            actor: Actor::system(),
        }
    }
}

#[async_trait]
impl Command for AddOrderItem {
    type Output = Order;
    const NAME: &'static str = "add_order_item";

    fn actor(&self) -> &Actor {
        &self.actor
    }

    async fn execute(&self, uow: &mut UnitOfWork) -> Result<Order> {
        let mut order: Order = uow.load_required(self.order_id).await?;
        add_line(uow, &mut order, self.item_id, self.product_id, self.quantity).await?;
        uow.save(&mut order).await?;
        Ok(order)
    }
}

/// Command to remove a line, returning its quantity to stock.
#[derive(Debug, Clone)]
pub struct RemoveOrderItem {
    pub order_id: AggregateId,
    pub item_id: OrderItemId,
    pub actor: Actor,
}

impl RemoveOrderItem {
    pub fn new(order_id: AggregateId, item_id: OrderItemId) -> Self {
        Self {
            order_id,
            item_id,
            actor: Actor::system(),
        }
    }
}

#[async_trait]
impl Command for RemoveOrderItem {
    type Output = Order;
    const NAME: &'static str = "remove_order_item";

    fn actor(&self) -> &Actor {
        &self.actor
    }

    async fn execute(&self, uow: &mut UnitOfWork) -> Result<Order> {
        let mut order: Order = uow.load_required(self.order_id).await?;
        let events = order.remove_item(self.item_id, uow.actor())?;
        let item = order
            .item(self.item_id)
            .cloned()
            .ok_or(OrderError::ItemNotFound {
                item_id: self.item_id,
            })?;

        restore_stock(uow, &item, item.quantity).await?;
        uow.apply(&mut order, events)?;
        uow.save(&mut order).await?;
        Ok(order)
    }
}

/// Command to change a line's quantity, moving the difference in or out of stock.
#[derive(Debug, Clone)]
pub struct UpdateItemQuantity {
    pub order_id: AggregateId,
    pub item_id: OrderItemId,
    pub new_quantity: u32,
    pub actor: Actor,
}

impl UpdateItemQuantity {
    pub fn new(order_id: AggregateId, item_id: OrderItemId, new_quantity: u32) -> Self {
        Self {
            order_id,
            item_id,
            new_quantity,
            actor: Actor::system(),
        }
    }
}

#[async_trait]
impl Command for UpdateItemQuantity {
    type Output = Order;
    const NAME: &'static str = "update_item_quantity";

    fn actor(&self) -> &Actor {
        &self.actor
    }

    async fn execute(&self, uow: &mut UnitOfWork) -> Result<Order> {
        let mut order: Order = uow.load_required(self.order_id).await?;
        let events = order.update_item_quantity(self.item_id, self.new_quantity, uow.actor())?;
        if events.is_empty() {
            debug!(order_id = %self.order_id, item_id = %self.item_id, "Quantity unchanged");
            return Ok(order);
        }
        let item = order
            .item(self.item_id)
            .cloned()
            .ok_or(OrderError::ItemNotFound {
                item_id: self.item_id,
            })?;

        // Unlike removal, a quantity change needs the product in both directions.
        let mut product: Product = uow.load_required(item.product_id).await?;
        let stock_events = if self.new_quantity > item.quantity {
            product.reduce_stock(self.new_quantity - item.quantity, uow.actor())?
        } else {
            product.increase_stock(item.quantity - self.new_quantity, uow.actor())?
        };
        uow.apply(&mut product, stock_events)?;
        uow.save(&mut product).await?;

        uow.apply(&mut order, events)?;
        uow.save(&mut order).await?;
        Ok(order)
    }
}

/// Command to change where an order ships.
#[derive(Debug, Clone)]
pub struct UpdateShippingAddress {
    pub order_id: AggregateId,
    pub address: String,
    pub actor: Actor,
}

impl UpdateShippingAddress {
    pub fn new(order_id: AggregateId, address: impl Into<String>) -> Self {
        Self {
            order_id,
            address: address.into(),
            actor: Actor::system(),
        }
    }
}

#[async_trait]
impl Command for UpdateShippingAddress {
    type Output = Order;
    const NAME: &'static str = "update_shipping_address";

    fn actor(&self) -> &Actor {
        &self.actor
    }

    async fn execute(&self, uow: &mut UnitOfWork) -> Result<Order> {
        change(uow, self.order_id, |order: &Order, actor| {
            order.update_shipping_address(&self.address, actor)
        })
        .await
    }
}

/// Command to move a pending order into processing.
#[derive(Debug, Clone)]
pub struct StartProcessing {
    pub order_id: AggregateId,
    pub actor: Actor,
}

impl StartProcessing {
    pub fn new(order_id: AggregateId) -> Self {
        Self {
            order_id,
            actor: Actor::system(),
        }
    }
}

#[async_trait]
impl Command for StartProcessing {
    type Output = Order;
    const NAME: &'static str = "start_processing";

    fn actor(&self) -> &Actor {
        &self.actor
    }

    async fn execute(&self, uow: &mut UnitOfWork) -> Result<Order> {
        change(uow, self.order_id, |order: &Order, actor| {
            order.start_processing(actor)
        })
        .await
    }
}

/// Command to record full payment of an order.
#[derive(Debug, Clone)]
pub struct MarkOrderPaid {
    pub order_id: AggregateId,
    pub payment_method: String,
    pub amount: Money,
    pub actor: Actor,
}

impl MarkOrderPaid {
    pub fn new(order_id: AggregateId, payment_method: impl Into<String>, amount: Money) -> Self {
        Self {
            order_id,
            payment_method: payment_method.into(),
            amount,
            actor: Actor::system(),
        }
    }
}

#[async_trait]
impl Command for MarkOrderPaid {
    type Output = Order;
    const NAME: &'static str = "mark_order_paid";

    fn actor(&self) -> &Actor {
        &self.actor
    }

    async fn execute(&self, uow: &mut UnitOfWork) -> Result<Order> {
        change(uow, self.order_id, |order: &Order, actor| {
            order.mark_paid(&self.payment_method, self.amount, actor)
        })
        .await
    }
}

/// Command to ship a paid order.
#[derive(Debug, Clone)]
pub struct MarkOrderShipped {
    pub order_id: AggregateId,
    pub tracking_number: String,
    pub carrier: Option<String>,
    pub actor: Actor,
}

impl MarkOrderShipped {
    pub fn new(order_id: AggregateId, tracking_number: impl Into<String>) -> Self {
        Self {
            order_id,
            tracking_number: tracking_number.into(),
            carrier: None,
            actor: Actor::system(),
        }
    }
}

#[async_trait]
impl Command for MarkOrderShipped {
    type Output = Order;
    const NAME: &'static str = "mark_order_shipped";

    fn actor(&self) -> &Actor {
        &self.actor
    }

    async fn execute(&self, uow: &mut UnitOfWork) -> Result<Order> {
        change(uow, self.order_id, |order: &Order, actor| {
            order.mark_shipped(&self.tracking_number, self.carrier.clone(), actor)
        })
        .await
    }
}

/// Command to record delivery of a shipped order.
#[derive(Debug, Clone)]
pub struct MarkOrderDelivered {
    pub order_id: AggregateId,
    pub actor: Actor,
}

impl MarkOrderDelivered {
    pub fn new(order_id: AggregateId) -> Self {
        Self {
            order_id,
            actor: Actor::system(),
        }
    }
}

#[async_trait]
impl Command for MarkOrderDelivered {
    type Output = Order;
    const NAME: &'static str = "mark_order_delivered";

    fn actor(&self) -> &Actor {
        &self.actor
    }

    async fn execute(&self, uow: &mut UnitOfWork) -> Result<Order> {
        change(uow, self.order_id, |order: &Order, actor| {
            order.mark_delivered(actor)
        })
        .await
    }
}

/// Command to refund a delivered order. Stock is not returned.
#[derive(Debug, Clone)]
pub struct RefundOrder {
    pub order_id: AggregateId,
    pub reason: String,
    pub actor: Actor,
}

impl RefundOrder {
    pub fn new(order_id: AggregateId, reason: impl Into<String>) -> Self {
        Self {
            order_id,
            reason: reason.into(),
            actor: Actor::system(),
        }
    }
}

#[async_trait]
impl Command for RefundOrder {
    type Output = Order;
    const NAME: &'static str = "refund_order";

    fn actor(&self) -> &Actor {
        &self.actor
    }

    async fn execute(&self, uow: &mut UnitOfWork) -> Result<Order> {
        change(uow, self.order_id, |order: &Order, actor| {
            order.refund(&self.reason, actor)
        })
        .await
    }
}

/// Command to cancel an order and return every line's quantity to stock.
#[derive(Debug, Clone)]
pub struct CancelOrder {
    pub order_id: AggregateId,
    pub reason: String,
    pub actor: Actor,
}

impl CancelOrder {
    pub fn new(order_id: AggregateId, reason: impl Into<String>) -> Self {
        Self {
            order_id,
            reason: reason.into(),
            actor: Actor::system(),
        }
    }
}

#[async_trait]
impl Command for CancelOrder {
    type Output = Order;
    const NAME: &'static str = "cancel_order";

    fn actor(&self) -> &Actor {
        &self.actor
    }

    async fn execute(&self, uow: &mut UnitOfWork) -> Result<Order> {
        let mut order: Order = uow.load_required(self.order_id).await?;
        // Validates status and reason before any stock moves.
        order.cancel(&self.reason, &[], uow.actor())?;

        let mut restored = Vec::with_capacity(order.items().len());
        for item in order.items().to_vec() {
            if restore_stock(uow, &item, item.quantity).await? {
                restored.push(item.id);
            }
        }

        let events = order.cancel(&self.reason, &restored, uow.actor())?;
        uow.apply(&mut order, events)?;
        uow.save(&mut order).await?;
        Ok(order)
    }
}

/// Service for managing orders.
///
/// Every method runs one command as a unit of work through the
/// [`Orchestrator`], retrying on concurrent-update conflicts.
#[derive(Clone)]
pub struct OrderService {
    orchestrator: Arc<Orchestrator>,
}

impl OrderService {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, customer_id = %cmd.customer_id))]
    pub async fn create_order(&self, cmd: CreateOrder) -> Result<CommandResult<Order>> {
        self.orchestrator.dispatch(&cmd).await
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, product_id = %cmd.product_id))]
    pub async fn add_item(&self, cmd: AddOrderItem) -> Result<CommandResult<Order>> {
        self.orchestrator.dispatch(&cmd).await
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, item_id = %cmd.item_id))]
    pub async fn remove_item(&self, cmd: RemoveOrderItem) -> Result<CommandResult<Order>> {
        self.orchestrator.dispatch(&cmd).await
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, item_id = %cmd.item_id))]
    pub async fn update_item_quantity(&self, cmd: UpdateItemQuantity) -> Result<CommandResult<Order>> {
        self.orchestrator.dispatch(&cmd).await
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn update_shipping_address(
        &self,
        cmd: UpdateShippingAddress,
    ) -> Result<CommandResult<Order>> {
        self.orchestrator.dispatch(&cmd).await
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn start_processing(&self, cmd: StartProcessing) -> Result<CommandResult<Order>> {
        self.orchestrator.dispatch(&cmd).await
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, amount = %cmd.amount))]
    pub async fn mark_paid(&self, cmd: MarkOrderPaid) -> Result<CommandResult<Order>> {
        self.orchestrator.dispatch(&cmd).await
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn mark_shipped(&self, cmd: MarkOrderShipped) -> Result<CommandResult<Order>> {
        self.orchestrator.dispatch(&cmd).await
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn mark_delivered(&self, cmd: MarkOrderDelivered) -> Result<CommandResult<Order>> {
        self.orchestrator.dispatch(&cmd).await
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn refund(&self, cmd: RefundOrder) -> Result<CommandResult<Order>> {
        self.orchestrator.dispatch(&cmd).await
    }

    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id))]
    pub async fn cancel(&self, cmd: CancelOrder) -> Result<CommandResult<Order>> {
        self.orchestrator.dispatch(&cmd).await
    }
}
