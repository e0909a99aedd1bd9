//! Order aggregate implementation.

use std::collections::BTreeSet;

use chrono::Utc;
use common::{Actor, AggregateId};
use serde::{Deserialize, Serialize};
use store::Version;

use crate::aggregate::{Aggregate, AuditInfo};
use crate::money::{Currency, Money, MoneyError};

use super::{
    CancelledItem, NewOrderItem, OrderError, OrderEvent, OrderItem, OrderItemId, OrderNumber,
    OrderStatus, PaymentStatus, ShippedItem,
    events::{
        ItemAddedData, ItemQuantityUpdatedData, ItemRemovedData, OrderCancelledData,
        OrderCreatedData, OrderPaidData, OrderRefundedData, OrderShippedData,
        ShippingAddressUpdatedData, StatusChangedData,
    },
};

/// Input for [`Order::create`].
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: AggregateId,
    pub currency: Currency,
    pub shipping_address: Option<String>,
    pub notes: Option<String>,
}

impl NewOrder {
    pub fn new(customer_id: AggregateId, currency: Currency) -> Self {
        Self {
            customer_id,
            currency,
            shipping_address: None,
            notes: None,
        }
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

/// Order aggregate root.
///
/// Holds its lines in insertion order and references products by id only.
/// `total_amount` is derived: it is recomputed from the lines after every
/// item change and is never set directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Order {
    id: Option<AggregateId>,

    /// Owned by the store, not part of the persisted state.
    #[serde(skip)]
    version: Version,

    order_number: Option<OrderNumber>,
    customer_id: Option<AggregateId>,
    status: OrderStatus,
    payment_status: PaymentStatus,
    currency: Currency,
    total_amount: Money,
    shipping_address: Option<String>,
    notes: Option<String>,
    items: Vec<OrderItem>,
    payment_method: Option<String>,
    tracking_number: Option<String>,
    audit: AuditInfo,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            OrderEvent::OrderCreated(data) => self.apply_created(data),
            OrderEvent::ItemAdded(data) => {
                self.items.push(OrderItem {
                    id: data.item_id,
                    product_id: data.product_id,
                    product_name: data.product_name,
                    quantity: data.quantity,
                    unit_price: data.unit_price,
                });
                self.recalculate_total();
            }
            OrderEvent::ItemRemoved(data) => {
                self.items.retain(|item| item.id != data.item_id);
                self.recalculate_total();
            }
            OrderEvent::ItemQuantityUpdated(data) => {
                if let Some(item) = self.items.iter_mut().find(|i| i.id == data.item_id) {
                    item.quantity = data.new_quantity;
                }
                self.recalculate_total();
            }
            OrderEvent::ShippingAddressUpdated(data) => {
                self.shipping_address = Some(data.shipping_address);
            }
            OrderEvent::ProcessingStarted(data) | OrderEvent::OrderDelivered(data) => {
                self.status = data.to;
            }
            OrderEvent::OrderPaid(data) => {
                self.status = OrderStatus::Paid;
                self.payment_status = PaymentStatus::Completed;
                self.payment_method = Some(data.payment_method);
            }
            OrderEvent::OrderShipped(data) => {
                self.status = OrderStatus::Shipped;
                self.tracking_number = Some(data.tracking_number);
            }
            OrderEvent::OrderRefunded(data) => {
                self.status = OrderStatus::Refunded;
                self.payment_status = PaymentStatus::Refunded;
                self.append_note(format!("Refunded: {}", data.reason));
            }
            OrderEvent::OrderCancelled(data) => {
                self.status = OrderStatus::Cancelled;
                self.payment_status = PaymentStatus::Refunded;
                self.append_note(format!("Cancelled: {}", data.reason));
            }
        }
    }

    fn index_terms(&self) -> Vec<String> {
        let mut terms = Vec::new();
        if let Some(number) = &self.order_number {
            terms.push(Self::number_term(number));
        }
        if let Some(customer_id) = self.customer_id {
            terms.push(Self::customer_term(customer_id));
        }
        if !self.status.is_terminal() {
            let products: BTreeSet<_> = self.items.iter().map(|i| i.product_id).collect();
            terms.extend(products.into_iter().map(Self::active_product_term));
        }
        terms
    }

    fn audit_mut(&mut self) -> &mut AuditInfo {
        &mut self.audit
    }
}

// Query methods
impl Order {
    pub fn number_term(number: &OrderNumber) -> String {
        format!("number:{number}")
    }

    pub fn customer_term(customer_id: AggregateId) -> String {
        format!("customer:{customer_id}")
    }

    /// Term carried while a non-terminal order has a line for the product.
    pub fn active_product_term(product_id: AggregateId) -> String {
        format!("active_product:{product_id}")
    }

    pub fn order_number(&self) -> Option<&OrderNumber> {
        self.order_number.as_ref()
    }

    pub fn customer_id(&self) -> Option<AggregateId> {
        self.customer_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn shipping_address(&self) -> Option<&str> {
        self.shipping_address.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn item(&self, item_id: OrderItemId) -> Option<&OrderItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    pub fn payment_method(&self) -> Option<&str> {
        self.payment_method.as_deref()
    }

    pub fn tracking_number(&self) -> Option<&str> {
        self.tracking_number.as_deref()
    }

    pub fn audit(&self) -> &AuditInfo {
        &self.audit
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fails unless the current status allows moving to `to`.
    pub fn ensure_transition(&self, to: OrderStatus) -> Result<(), OrderError> {
        self.require_created()?;
        if !self.status.can_transition_to(to) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        Ok(())
    }

    /// Fails unless lines can currently be added, removed or re-quantified.
    pub fn ensure_items_editable(&self) -> Result<(), OrderError> {
        self.require_created()?;
        if !self.status.can_modify_items() {
            return Err(OrderError::ItemsLocked {
                status: self.status,
            });
        }
        Ok(())
    }

    fn require_created(&self) -> Result<AggregateId, OrderError> {
        self.id.ok_or(OrderError::NotCreated)
    }

    /// (order id, order number, customer id) of a created order.
    fn header(&self) -> Result<(AggregateId, OrderNumber, AggregateId), OrderError> {
        match (self.id, &self.order_number, self.customer_id) {
            (Some(id), Some(number), Some(customer)) => Ok((id, number.clone(), customer)),
            _ => Err(OrderError::NotCreated),
        }
    }

    fn find_item(&self, item_id: OrderItemId) -> Result<&OrderItem, OrderError> {
        self.item(item_id)
            .ok_or(OrderError::ItemNotFound { item_id })
    }

    fn status_changed(&self, to: OrderStatus, actor: &Actor) -> Result<StatusChangedData, OrderError> {
        let (order_id, order_number, customer_id) = self.header()?;
        Ok(StatusChangedData {
            order_id,
            order_number,
            customer_id,
            from: self.status,
            to,
            actor: actor.clone(),
            occurred_at: Utc::now(),
        })
    }
}

fn required(value: &str, what: &'static str) -> Result<String, OrderError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(OrderError::MissingValue(what));
    }
    Ok(trimmed.to_string())
}

// Command methods (return events)
impl Order {
    pub fn create(
        &self,
        order_id: AggregateId,
        order_number: OrderNumber,
        new: NewOrder,
        actor: &Actor,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyCreated);
        }
        let shipping_address = new
            .shipping_address
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());

        Ok(vec![OrderEvent::OrderCreated(OrderCreatedData {
            order_id,
            order_number,
            customer_id: new.customer_id,
            currency: new.currency,
            shipping_address,
            notes: new.notes,
            created_by: actor.clone(),
            created_at: Utc::now(),
        })])
    }

    /// Adds a line with the given product snapshot.
    pub fn add_item(
        &self,
        item_id: OrderItemId,
        item: NewOrderItem,
        actor: &Actor,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        let order_id = self.require_created()?;
        self.ensure_items_editable()?;
        if item.quantity == 0 {
            return Err(OrderError::InvalidQuantity {
                quantity: item.quantity,
            });
        }
        if !item.unit_price.is_positive() {
            return Err(OrderError::InvalidPrice {
                price: item.unit_price,
            });
        }
        if item.unit_price.currency() != self.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency,
                right: item.unit_price.currency(),
            }
            .into());
        }
        let product_name = required(&item.product_name, "product name")?;
        // Reject lines whose total would not be representable.
        self.total_amount
            .checked_add(item.unit_price.checked_mul(item.quantity)?)?;

        Ok(vec![OrderEvent::ItemAdded(ItemAddedData {
            order_id,
            item_id,
            product_id: item.product_id,
            product_name,
            quantity: item.quantity,
            unit_price: item.unit_price,
            actor: actor.clone(),
        })])
    }

    pub fn remove_item(
        &self,
        item_id: OrderItemId,
        actor: &Actor,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        let order_id = self.require_created()?;
        self.ensure_items_editable()?;
        let item = self.find_item(item_id)?;

        Ok(vec![OrderEvent::ItemRemoved(ItemRemovedData {
            order_id,
            item_id,
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
            actor: actor.clone(),
        })])
    }

    /// Sets a line's quantity. Setting the current quantity is a no-op.
    pub fn update_item_quantity(
        &self,
        item_id: OrderItemId,
        new_quantity: u32,
        actor: &Actor,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        let order_id = self.require_created()?;
        self.ensure_items_editable()?;
        let item = self.find_item(item_id)?;
        if new_quantity == 0 {
            return Err(OrderError::InvalidQuantity {
                quantity: new_quantity,
            });
        }
        if new_quantity == item.quantity {
            return Ok(Vec::new());
        }
        self.total_amount
            .checked_sub(item.total_price())?
            .checked_add(item.unit_price.checked_mul(new_quantity)?)?;

        Ok(vec![OrderEvent::ItemQuantityUpdated(ItemQuantityUpdatedData {
            order_id,
            item_id,
            product_id: item.product_id,
            old_quantity: item.quantity,
            new_quantity,
            unit_price: item.unit_price,
            actor: actor.clone(),
        })])
    }

    pub fn update_shipping_address(
        &self,
        address: &str,
        actor: &Actor,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        let order_id = self.require_created()?;
        let shipping_address = required(address, "shipping address")?;
        if !self.status.can_change_shipping_address() {
            return Err(OrderError::AddressLocked {
                status: self.status,
            });
        }
        Ok(vec![OrderEvent::ShippingAddressUpdated(
            ShippingAddressUpdatedData {
                order_id,
                shipping_address,
                actor: actor.clone(),
            },
        )])
    }

    pub fn start_processing(&self, actor: &Actor) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_transition(OrderStatus::Processing)?;
        Ok(vec![OrderEvent::ProcessingStarted(
            self.status_changed(OrderStatus::Processing, actor)?,
        )])
    }

    /// Records full payment. A pending order passes through Processing first.
    ///
    /// `amount_paid` must equal the order total exactly.
    pub fn mark_paid(
        &self,
        payment_method: &str,
        amount_paid: Money,
        actor: &Actor,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        let (order_id, order_number, customer_id) = self.header()?;

        let mut events = Vec::new();
        if self.status == OrderStatus::Pending {
            self.ensure_transition(OrderStatus::Processing)?;
            events.push(OrderEvent::ProcessingStarted(
                self.status_changed(OrderStatus::Processing, actor)?,
            ));
        } else {
            self.ensure_transition(OrderStatus::Paid)?;
        }

        let payment_method = required(payment_method, "payment method")?;
        if amount_paid != self.total_amount {
            return Err(OrderError::PaymentMismatch {
                expected: self.total_amount,
                received: amount_paid,
            });
        }

        events.push(OrderEvent::OrderPaid(OrderPaidData {
            order_id,
            order_number,
            customer_id,
            payment_method,
            amount_paid,
            paid_by: actor.clone(),
            paid_at: Utc::now(),
        }));
        Ok(events)
    }

    pub fn mark_shipped(
        &self,
        tracking_number: &str,
        carrier: Option<String>,
        actor: &Actor,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        let (order_id, order_number, customer_id) = self.header()?;
        self.ensure_transition(OrderStatus::Shipped)?;
        let tracking_number = required(tracking_number, "tracking number")?;

        let items = self
            .items
            .iter()
            .map(|item| ShippedItem {
                product_id: item.product_id,
                product_name: item.product_name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect();

        Ok(vec![OrderEvent::OrderShipped(OrderShippedData {
            order_id,
            order_number,
            customer_id,
            tracking_number,
            carrier,
            items,
            shipped_by: actor.clone(),
            shipped_at: Utc::now(),
        })])
    }

    pub fn mark_delivered(&self, actor: &Actor) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_transition(OrderStatus::Delivered)?;
        Ok(vec![OrderEvent::OrderDelivered(
            self.status_changed(OrderStatus::Delivered, actor)?,
        )])
    }

    pub fn refund(&self, reason: &str, actor: &Actor) -> Result<Vec<OrderEvent>, OrderError> {
        let (order_id, order_number, customer_id) = self.header()?;
        self.ensure_transition(OrderStatus::Refunded)?;
        let reason = required(reason, "refund reason")?;

        Ok(vec![OrderEvent::OrderRefunded(OrderRefundedData {
            order_id,
            order_number,
            customer_id,
            amount: self.total_amount,
            reason,
            refunded_by: actor.clone(),
            refunded_at: Utc::now(),
        })])
    }

    /// Cancels the order. `restored` lists the lines whose quantity the caller
    /// has already put back into stock; the aggregate does not touch products.
    pub fn cancel(
        &self,
        reason: &str,
        restored: &[OrderItemId],
        actor: &Actor,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        let (order_id, order_number, customer_id) = self.header()?;
        self.ensure_transition(OrderStatus::Cancelled)?;
        let reason = required(reason, "cancellation reason")?;

        let items = self
            .items
            .iter()
            .map(|item| CancelledItem {
                item_id: item.id,
                product_id: item.product_id,
                product_name: item.product_name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                stock_restored: restored.contains(&item.id),
            })
            .collect();

        Ok(vec![OrderEvent::OrderCancelled(OrderCancelledData {
            order_id,
            order_number,
            customer_id,
            previous_status: self.status,
            reason,
            order_total: self.total_amount,
            items,
            cancelled_by: actor.clone(),
            cancelled_at: Utc::now(),
        })])
    }
}

// Apply event helpers
impl Order {
    fn apply_created(&mut self, data: OrderCreatedData) {
        self.id = Some(data.order_id);
        self.order_number = Some(data.order_number);
        self.customer_id = Some(data.customer_id);
        self.currency = data.currency;
        self.total_amount = Money::zero(data.currency);
        self.shipping_address = data.shipping_address;
        self.notes = data.notes;
        self.status = OrderStatus::Pending;
        self.payment_status = PaymentStatus::Pending;
    }

    fn recalculate_total(&mut self) {
        // Command methods reject lines that would overflow, so the fallback is unreachable.
        self.total_amount = Money::sum(self.currency, self.items.iter().map(OrderItem::total_price))
            .unwrap_or_else(|_| Money::new(u64::MAX, self.currency));
    }

    fn append_note(&mut self, line: String) {
        self.notes = Some(match self.notes.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}\n{line}"),
            _ => line,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::DomainEvent;

    fn actor() -> Actor {
        Actor::new("tester")
    }

    fn create_order() -> Order {
        let mut order = Order::default();
        let events = order
            .create(
                AggregateId::new(),
                OrderNumber::generate(Utc::now()),
                NewOrder::new(AggregateId::new(), Currency::USD).with_shipping_address("1 Main St"),
                &actor(),
            )
            .unwrap();
        order.apply_events(events);
        order
    }

    fn add(order: &mut Order, quantity: u32, cents: u64) -> OrderItemId {
        let item_id = OrderItemId::new();
        let events = order
            .add_item(
                item_id,
                NewOrderItem::new(AggregateId::new(), "Widget", quantity, Money::usd(cents)),
                &actor(),
            )
            .unwrap();
        order.apply_events(events);
        item_id
    }

    fn expected_total(order: &Order) -> Money {
        let cents = order
            .items()
            .iter()
            .map(|i| u64::from(i.quantity) * i.unit_price.amount())
            .sum();
        Money::usd(cents)
    }

    fn types(events: &[OrderEvent]) -> Vec<&'static str> {
        events.iter().map(|e| e.event_type()).collect()
    }

    #[test]
    fn create_order_starts_pending() {
        let order = create_order();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.payment_status(), PaymentStatus::Pending);
        assert_eq!(order.total_amount(), Money::zero(Currency::USD));
        assert_eq!(order.shipping_address(), Some("1 Main St"));
        assert!(order.order_number().is_some());
    }

    #[test]
    fn create_twice_fails() {
        let order = create_order();
        let result = order.create(
            AggregateId::new(),
            OrderNumber::generate(Utc::now()),
            NewOrder::new(AggregateId::new(), Currency::USD),
            &actor(),
        );
        assert!(matches!(result, Err(OrderError::AlreadyCreated)));
    }

    #[test]
    fn single_line_total() {
        let mut order = create_order();
        add(&mut order, 2, 5000);
        assert_eq!(order.total_amount(), Money::usd(10000));
    }

    #[test]
    fn total_tracks_every_item_mutation() {
        let mut order = create_order();
        let a = add(&mut order, 2, 1999);
        let b = add(&mut order, 1, 250);
        let c = add(&mut order, 7, 3);
        assert_eq!(order.total_amount(), expected_total(&order));

        order.apply_events(order.update_item_quantity(a, 5, &actor()).unwrap());
        assert_eq!(order.total_amount(), expected_total(&order));

        order.apply_events(order.remove_item(b, &actor()).unwrap());
        assert_eq!(order.total_amount(), expected_total(&order));

        order.apply_events(order.update_item_quantity(c, 1, &actor()).unwrap());
        assert_eq!(order.total_amount(), expected_total(&order));
        assert_eq!(order.total_amount(), Money::usd(5 * 1999 + 3));
    }

    #[test]
    fn same_product_can_have_several_lines() {
        let mut order = create_order();
        let product_id = AggregateId::new();
        for _ in 0..2 {
            let events = order
                .add_item(
                    OrderItemId::new(),
                    NewOrderItem::new(product_id, "Widget", 1, Money::usd(100)),
                    &actor(),
                )
                .unwrap();
            order.apply_events(events);
        }
        assert_eq!(order.items().len(), 2);
        assert_eq!(order.total_amount(), Money::usd(200));
    }

    #[test]
    fn add_item_validation() {
        let order = create_order();
        let zero_qty = NewOrderItem::new(AggregateId::new(), "Widget", 0, Money::usd(100));
        assert!(matches!(
            order.add_item(OrderItemId::new(), zero_qty, &actor()),
            Err(OrderError::InvalidQuantity { quantity: 0 })
        ));

        let free = NewOrderItem::new(AggregateId::new(), "Widget", 1, Money::usd(0));
        assert!(matches!(
            order.add_item(OrderItemId::new(), free, &actor()),
            Err(OrderError::InvalidPrice { .. })
        ));

        let euros = NewOrderItem::new(AggregateId::new(), "Widget", 1, Money::new(100, Currency::EUR));
        assert!(matches!(
            order.add_item(OrderItemId::new(), euros, &actor()),
            Err(OrderError::Money(MoneyError::CurrencyMismatch { .. }))
        ));
    }

    #[test]
    fn line_snapshot_is_kept() {
        let mut order = create_order();
        let item_id = add(&mut order, 1, 4200);
        let item = order.item(item_id).unwrap();
        assert_eq!(item.product_name, "Widget");
        assert_eq!(item.unit_price, Money::usd(4200));
    }

    #[test]
    fn unknown_item_is_reported() {
        let order = create_order();
        let missing = OrderItemId::new();
        assert!(matches!(
            order.remove_item(missing, &actor()),
            Err(OrderError::ItemNotFound { item_id }) if item_id == missing
        ));
    }

    #[test]
    fn update_to_same_quantity_is_noop_and_zero_is_invalid() {
        let mut order = create_order();
        let item_id = add(&mut order, 3, 100);
        assert!(order.update_item_quantity(item_id, 3, &actor()).unwrap().is_empty());
        assert!(matches!(
            order.update_item_quantity(item_id, 0, &actor()),
            Err(OrderError::InvalidQuantity { quantity: 0 })
        ));
    }

    #[test]
    fn items_locked_after_payment() {
        let mut order = create_order();
        let item_id = add(&mut order, 2, 5000);
        order.apply_events(order.mark_paid("card", Money::usd(10000), &actor()).unwrap());

        assert!(matches!(
            order.remove_item(item_id, &actor()),
            Err(OrderError::ItemsLocked {
                status: OrderStatus::Paid
            })
        ));
        assert!(matches!(
            order.add_item(
                OrderItemId::new(),
                NewOrderItem::new(AggregateId::new(), "Gadget", 1, Money::usd(1)),
                &actor()
            ),
            Err(OrderError::ItemsLocked { .. })
        ));
    }

    #[test]
    fn items_editable_while_processing() {
        let mut order = create_order();
        order.apply_events(order.start_processing(&actor()).unwrap());
        add(&mut order, 1, 100);
        assert_eq!(order.total_amount(), Money::usd(100));
    }

    #[test]
    fn exact_payment_from_pending_passes_through_processing() {
        let mut order = create_order();
        add(&mut order, 2, 5000);

        let events = order.mark_paid("card", Money::usd(10000), &actor()).unwrap();
        assert_eq!(types(&events), vec!["ProcessingStarted", "OrderPaid"]);
        order.apply_events(events);

        assert_eq!(order.status(), OrderStatus::Paid);
        assert_eq!(order.payment_status(), PaymentStatus::Completed);
        assert_eq!(order.payment_method(), Some("card"));
    }

    #[test]
    fn inexact_payment_is_rejected_and_status_kept() {
        let mut order = create_order();
        add(&mut order, 2, 5000);

        let err = order.mark_paid("card", Money::usd(9999), &actor()).unwrap_err();
        assert!(matches!(err, OrderError::PaymentMismatch { .. }));
        assert!(err.is_validation());
        assert_eq!(order.status(), OrderStatus::Pending);

        let overpaid = order.mark_paid("card", Money::usd(10001), &actor());
        assert!(matches!(overpaid, Err(OrderError::PaymentMismatch { .. })));
    }

    #[test]
    fn payment_in_other_currency_is_rejected() {
        let mut order = create_order();
        add(&mut order, 1, 100);
        assert!(matches!(
            order.mark_paid("card", Money::new(100, Currency::EUR), &actor()),
            Err(OrderError::PaymentMismatch { .. })
        ));
    }

    #[test]
    fn empty_order_is_paid_with_a_zero_amount() {
        let mut order = create_order();
        assert!(matches!(
            order.mark_paid("card", Money::usd(1), &actor()),
            Err(OrderError::PaymentMismatch { .. })
        ));

        order.apply_events(order.mark_paid("card", Money::usd(0), &actor()).unwrap());
        assert_eq!(order.status(), OrderStatus::Paid);
        assert_eq!(order.payment_status(), PaymentStatus::Completed);
    }

    #[test]
    fn shipping_requires_paid_and_snapshots_items() {
        let mut order = create_order();
        add(&mut order, 2, 5000);
        assert!(matches!(
            order.mark_shipped("TRACK-1", None, &actor()),
            Err(OrderError::InvalidTransition {
                from: OrderStatus::Pending,
                to: OrderStatus::Shipped
            })
        ));

        order.apply_events(order.mark_paid("card", Money::usd(10000), &actor()).unwrap());
        let events = order
            .mark_shipped("TRACK-1", Some("UPS".to_string()), &actor())
            .unwrap();
        match &events[0] {
            OrderEvent::OrderShipped(data) => {
                assert_eq!(data.items.len(), 1);
                assert_eq!(data.items[0].quantity, 2);
                assert_eq!(data.items[0].unit_price, Money::usd(5000));
            }
            other => panic!("unexpected event {other:?}"),
        }
        order.apply_events(events);
        assert_eq!(order.status(), OrderStatus::Shipped);
        assert_eq!(order.tracking_number(), Some("TRACK-1"));
    }

    #[test]
    fn paid_order_can_be_cancelled_but_shipped_cannot() {
        let mut order = create_order();
        let item_id = add(&mut order, 2, 5000);
        order.apply_events(order.mark_paid("card", Money::usd(10000), &actor()).unwrap());

        let events = order.cancel("changed mind", &[item_id], &actor()).unwrap();
        match &events[0] {
            OrderEvent::OrderCancelled(data) => {
                assert_eq!(data.previous_status, OrderStatus::Paid);
                assert!(data.items[0].stock_restored);
            }
            other => panic!("unexpected event {other:?}"),
        }

        order.apply_events(order.mark_shipped("TRACK-1", None, &actor()).unwrap());
        assert!(matches!(
            order.cancel("too late", &[], &actor()),
            Err(OrderError::InvalidTransition {
                from: OrderStatus::Shipped,
                to: OrderStatus::Cancelled
            })
        ));
        assert_eq!(order.status(), OrderStatus::Shipped);
    }

    #[test]
    fn cancel_records_note_and_refunds_payment() {
        let mut order = create_order();
        add(&mut order, 1, 100);
        order.apply_events(order.cancel("out of budget", &[], &actor()).unwrap());

        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.payment_status(), PaymentStatus::Refunded);
        assert_eq!(order.notes(), Some("Cancelled: out of budget"));
        assert!(order.is_terminal());
    }

    #[test]
    fn cancel_requires_reason() {
        let order = create_order();
        assert!(matches!(
            order.cancel("  ", &[], &actor()),
            Err(OrderError::MissingValue("cancellation reason"))
        ));
    }

    #[test]
    fn delivery_and_refund_complete_the_lifecycle() {
        let mut order = create_order();
        add(&mut order, 1, 100);
        order.apply_events(order.mark_paid("card", Money::usd(100), &actor()).unwrap());
        order.apply_events(order.mark_shipped("T", None, &actor()).unwrap());
        order.apply_events(order.mark_delivered(&actor()).unwrap());
        assert_eq!(order.status(), OrderStatus::Delivered);

        order.apply_events(order.refund("damaged", &actor()).unwrap());
        assert_eq!(order.status(), OrderStatus::Refunded);
        assert_eq!(order.payment_status(), PaymentStatus::Refunded);
        assert!(order.refund("again", &actor()).is_err());
    }

    #[test]
    fn rejected_transitions_leave_status_unchanged() {
        let order = create_order();
        assert!(order.mark_delivered(&actor()).is_err());
        assert!(order.refund("x", &actor()).is_err());
        assert_eq!(order.status(), OrderStatus::Pending);
    }

    #[test]
    fn shipping_address_locked_once_shipped() {
        let mut order = create_order();
        add(&mut order, 1, 100);
        order.apply_events(order.update_shipping_address("2 Side St", &actor()).unwrap());
        assert_eq!(order.shipping_address(), Some("2 Side St"));

        order.apply_events(order.mark_paid("card", Money::usd(100), &actor()).unwrap());
        order.apply_events(order.mark_shipped("T", None, &actor()).unwrap());
        assert!(matches!(
            order.update_shipping_address("3 Other St", &actor()),
            Err(OrderError::AddressLocked { .. })
        ));
        assert!(matches!(
            create_order().update_shipping_address(" ", &actor()),
            Err(OrderError::MissingValue("shipping address"))
        ));
    }

    #[test]
    fn index_terms_drop_products_when_terminal() {
        let mut order = create_order();
        let item_id = add(&mut order, 1, 100);
        let product_id = order.item(item_id).unwrap().product_id;
        let term = Order::active_product_term(product_id);

        assert!(order.index_terms().contains(&term));
        order.apply_events(order.cancel("no", &[item_id], &actor()).unwrap());
        assert!(!order.index_terms().contains(&term));
        assert!(
            order
                .index_terms()
                .contains(&Order::customer_term(order.customer_id().unwrap()))
        );
    }

    #[test]
    fn persisted_state_round_trips_money_pairs() {
        let mut order = create_order();
        add(&mut order, 2, 5000);
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(
            json["total_amount"],
            serde_json::json!({"amount": 10000, "currency": "USD"})
        );

        let restored: Order = serde_json::from_value(json).unwrap();
        assert_eq!(restored.total_amount(), Money::usd(10000));
        assert_eq!(restored.items(), order.items());
    }
}
