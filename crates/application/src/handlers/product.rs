//! Product commands and the service that dispatches them.

use std::sync::Arc;

use async_trait::async_trait;
use common::{Actor, AggregateId};
use domain::{Aggregate, DeletionMode, NewProduct, Order, Product, ProductChanges};
use serde::Serialize;
use store::RecordQuery;

use super::change;
use crate::error::{AppError, Result};
use crate::orchestrator::{Command, CommandResult, Orchestrator};
use crate::unit_of_work::UnitOfWork;

/// Command to add a product to the catalog.
///
/// The SKU is normalized before the uniqueness check, so `" ab-1 "` and
/// `"AB-1"` collide.
#[derive(Debug, Clone)]
pub struct CreateProduct {
    pub product_id: AggregateId,
    pub product: NewProduct,
    pub actor: Actor,
}

impl CreateProduct {
    pub fn new(product: NewProduct) -> Self {
        Self {
            product_id: AggregateId::new(),
            product,
            actor: Actor::system(),
        }
    }
}

#[async_trait]
impl Command for CreateProduct {
    type Output = Product;
    const NAME: &'static str = "create_product";

    fn actor(&self) -> &Actor {
        &self.actor
    }

    async fn execute(&self, uow: &mut UnitOfWork) -> Result<Product> {
        let sku = Product::normalize_sku(&self.product.sku)?;
        if uow.count::<Product>(Product::sku_term(&sku)).await? > 0 {
            return Err(AppError::Validation(format!("SKU {sku} already exists")));
        }

        let mut product = Product::default();
        let events = product.create(self.product_id, self.product.clone(), uow.actor())?;
        uow.apply(&mut product, events)?;
        uow.save(&mut product).await?;
        Ok(product)
    }
}

/// Command to change a product's descriptive fields or price.
#[derive(Debug, Clone)]
pub struct UpdateProductDetails {
    pub product_id: AggregateId,
    pub changes: ProductChanges,
    pub actor: Actor,
}

impl UpdateProductDetails {
    pub fn new(product_id: AggregateId, changes: ProductChanges) -> Self {
        Self {
            product_id,
            changes,
            actor: Actor::system(),
        }
    }
}

#[async_trait]
impl Command for UpdateProductDetails {
    type Output = Product;
    const NAME: &'static str = "update_product_details";

    fn actor(&self) -> &Actor {
        &self.actor
    }

    async fn execute(&self, uow: &mut UnitOfWork) -> Result<Product> {
        change(uow, self.product_id, |product: &Product, actor| {
            product.update_details(self.changes.clone(), actor)
        })
        .await
    }
}

/// Command for a signed manual stock correction.
#[derive(Debug, Clone)]
pub struct AdjustStock {
    pub product_id: AggregateId,
    pub delta: i32,
    pub reason: Option<String>,
    pub actor: Actor,
}

impl AdjustStock {
    pub fn new(product_id: AggregateId, delta: i32) -> Self {
        Self {
            product_id,
            delta,
            reason: None,
            actor: Actor::system(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[async_trait]
impl Command for AdjustStock {
    type Output = Product;
    const NAME: &'static str = "adjust_stock";

    fn actor(&self) -> &Actor {
        &self.actor
    }

    async fn execute(&self, uow: &mut UnitOfWork) -> Result<Product> {
        if let Some(reason) = &self.reason {
            tracing::info!(product_id = %self.product_id, delta = self.delta, reason = %reason, "Adjusting stock");
        }
        change(uow, self.product_id, |product: &Product, actor| {
            product.adjust_stock(self.delta, actor)
        })
        .await
    }
}

/// Command to take units out of stock. Fails rather than going negative.
#[derive(Debug, Clone)]
pub struct ReduceStock {
    pub product_id: AggregateId,
    pub quantity: u32,
    pub actor: Actor,
}

impl ReduceStock {
    pub fn new(product_id: AggregateId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
            actor: Actor::system(),
        }
    }
}

#[async_trait]
impl Command for ReduceStock {
    type Output = Product;
    const NAME: &'static str = "reduce_stock";

    fn actor(&self) -> &Actor {
        &self.actor
    }

    async fn execute(&self, uow: &mut UnitOfWork) -> Result<Product> {
        change(uow, self.product_id, |product: &Product, actor| {
            product.reduce_stock(self.quantity, actor)
        })
        .await
    }
}

/// Command to put units back into stock.
#[derive(Debug, Clone)]
pub struct IncreaseStock {
    pub product_id: AggregateId,
    pub quantity: u32,
    pub actor: Actor,
}

impl IncreaseStock {
    pub fn new(product_id: AggregateId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
            actor: Actor::system(),
        }
    }
}

#[async_trait]
impl Command for IncreaseStock {
    type Output = Product;
    const NAME: &'static str = "increase_stock";

    fn actor(&self) -> &Actor {
        &self.actor
    }

    async fn execute(&self, uow: &mut UnitOfWork) -> Result<Product> {
        change(uow, self.product_id, |product: &Product, actor| {
            product.increase_stock(self.quantity, actor)
        })
        .await
    }
}

/// Command to activate or deactivate a product.
#[derive(Debug, Clone)]
pub struct SetProductActive {
    pub product_id: AggregateId,
    pub active: bool,
    pub actor: Actor,
}

impl SetProductActive {
    pub fn new(product_id: AggregateId, active: bool) -> Self {
        Self {
            product_id,
            active,
            actor: Actor::system(),
        }
    }
}

#[async_trait]
impl Command for SetProductActive {
    type Output = Product;
    const NAME: &'static str = "set_product_active";

    fn actor(&self) -> &Actor {
        &self.actor
    }

    async fn execute(&self, uow: &mut UnitOfWork) -> Result<Product> {
        change(uow, self.product_id, |product: &Product, actor| {
            product.set_active(self.active, actor)
        })
        .await
    }
}

/// Command to delete a product that no active order references.
///
/// A soft delete deactivates the product and keeps the record, so it can be
/// reactivated or hard-deleted later. A hard delete removes the record; the
/// `ProductDeleted` event is published in both modes.
#[derive(Debug, Clone)]
pub struct DeleteProduct {
    pub product_id: AggregateId,
    pub mode: DeletionMode,
    pub actor: Actor,
}

impl DeleteProduct {
    pub fn new(product_id: AggregateId, mode: DeletionMode) -> Self {
        Self {
            product_id,
            mode,
            actor: Actor::system(),
        }
    }
}

#[async_trait]
impl Command for DeleteProduct {
    type Output = Product;
    const NAME: &'static str = "delete_product";

    fn actor(&self) -> &Actor {
        &self.actor
    }

    async fn execute(&self, uow: &mut UnitOfWork) -> Result<Product> {
        let mut product: Product = uow.load_required(self.product_id).await?;
        let active_orders = uow
            .count::<Order>(Order::active_product_term(self.product_id))
            .await?;
        let events = product.delete(self.mode, active_orders, uow.actor())?;

        match self.mode {
            DeletionMode::Soft => {
                uow.apply(&mut product, events)?;
                uow.save(&mut product).await?;
            }
            DeletionMode::Hard => {
                uow.apply(&mut product, events)?;
                uow.delete(&product).await?;
            }
        }
        Ok(product)
    }
}

/// Whether a product can currently be deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteCheck {
    pub can_delete: bool,
    pub active_order_count: usize,
}

/// Service for managing the product catalog and stock.
#[derive(Clone)]
pub struct ProductService {
    orchestrator: Arc<Orchestrator>,
}

impl ProductService {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Creates a product. A low initial stock raises `LowStock` right away.
    #[tracing::instrument(skip(self, cmd), fields(product_id = %cmd.product_id, sku = %cmd.product.sku))]
    pub async fn create_product(&self, cmd: CreateProduct) -> Result<CommandResult<Product>> {
        self.orchestrator.dispatch(&cmd).await
    }

    #[tracing::instrument(skip(self, cmd), fields(product_id = %cmd.product_id))]
    pub async fn update_details(&self, cmd: UpdateProductDetails) -> Result<CommandResult<Product>> {
        self.orchestrator.dispatch(&cmd).await
    }

    /// Applies a signed correction; zero succeeds without events.
    #[tracing::instrument(skip(self, cmd), fields(product_id = %cmd.product_id, delta = cmd.delta))]
    pub async fn adjust_stock(&self, cmd: AdjustStock) -> Result<CommandResult<Product>> {
        self.orchestrator.dispatch(&cmd).await
    }

    #[tracing::instrument(skip(self, cmd), fields(product_id = %cmd.product_id, quantity = cmd.quantity))]
    pub async fn reduce_stock(&self, cmd: ReduceStock) -> Result<CommandResult<Product>> {
        self.orchestrator.dispatch(&cmd).await
    }

    #[tracing::instrument(skip(self, cmd), fields(product_id = %cmd.product_id, quantity = cmd.quantity))]
    pub async fn increase_stock(&self, cmd: IncreaseStock) -> Result<CommandResult<Product>> {
        self.orchestrator.dispatch(&cmd).await
    }

    #[tracing::instrument(skip(self, cmd), fields(product_id = %cmd.product_id, active = cmd.active))]
    pub async fn set_active(&self, cmd: SetProductActive) -> Result<CommandResult<Product>> {
        self.orchestrator.dispatch(&cmd).await
    }

    #[tracing::instrument(skip(self, cmd), fields(product_id = %cmd.product_id, mode = ?cmd.mode))]
    pub async fn delete_product(&self, cmd: DeleteProduct) -> Result<CommandResult<Product>> {
        self.orchestrator.dispatch(&cmd).await
    }

    /// Reports whether the product could be deleted right now. Read from
    /// committed state, so a concurrent order can still change the answer.
    #[tracing::instrument(skip(self))]
    pub async fn safe_delete_check(&self, product_id: AggregateId) -> Result<DeleteCheck> {
        let store = self.orchestrator.store();
        if store.load(Product::aggregate_type(), product_id).await?.is_none() {
            return Err(AppError::not_found(Product::aggregate_type(), product_id));
        }
        let query = RecordQuery::new(
            Order::aggregate_type(),
            Order::active_product_term(product_id),
        );
        let active_order_count = store.find(&query).await?.len();
        Ok(DeleteCheck {
            can_delete: active_order_count == 0,
            active_order_count,
        })
    }
}
