//! Command handlers for orders, products and customers.

pub mod customer;
pub mod order;
pub mod product;

use common::AggregateId;
use domain::{Aggregate, NewOrderItem, Order, OrderItem, OrderItemId, Product};
use tracing::warn;

use crate::error::Result;
use crate::unit_of_work::UnitOfWork;

/// Takes stock from the product and adds the line to the order.
///
/// Both aggregates are validated before either changes: order status, then
/// product availability and stock, then the line itself. The product is
/// saved here; the caller saves the order.
pub(crate) async fn add_line(
    uow: &mut UnitOfWork,
    order: &mut Order,
    item_id: OrderItemId,
    product_id: AggregateId,
    quantity: u32,
) -> Result<()> {
    order.ensure_items_editable()?;

    let mut product: Product = uow.load_required(product_id).await?;
    product.ensure_orderable()?;
    let stock_events = product.reduce_stock(quantity, uow.actor())?;

    let line = NewOrderItem::new(product_id, product.name(), quantity, product.price());
    let order_events = order.add_item(item_id, line, uow.actor())?;

    uow.apply(&mut product, stock_events)?;
    uow.save(&mut product).await?;
    uow.apply(order, order_events)?;
    Ok(())
}

/// Puts `quantity` units of the line's product back into stock.
///
/// Returns false without failing when the product no longer exists.
/// Inactive products are restocked like any other.
pub(crate) async fn restore_stock(uow: &mut UnitOfWork, item: &OrderItem, quantity: u32) -> Result<bool> {
    let Some(mut product) = uow.load::<Product>(item.product_id).await? else {
        warn!(product_id = %item.product_id, item_id = %item.id, "Product missing; stock not restored");
        return Ok(false);
    };

    let events = product.increase_stock(quantity, uow.actor())?;
    uow.apply(&mut product, events)?;
    uow.save(&mut product).await?;
    Ok(true)
}

/// Loads an aggregate, applies the events `decide` returns and saves it.
/// Nothing is written when `decide` returns no events.
pub(crate) async fn change<A, F>(uow: &mut UnitOfWork, id: AggregateId, decide: F) -> Result<A>
where
    A: Aggregate + crate::unit_of_work::CacheDependent,
    F: FnOnce(&A, &common::Actor) -> std::result::Result<Vec<A::Event>, A::Error> + Send,
    crate::error::AppError: From<A::Error>,
{
    let mut aggregate: A = uow.load_required(id).await?;
    let events = decide(&aggregate, uow.actor())?;
    if events.is_empty() {
        return Ok(aggregate);
    }
    uow.apply(&mut aggregate, events)?;
    uow.save(&mut aggregate).await?;
    Ok(aggregate)
}
