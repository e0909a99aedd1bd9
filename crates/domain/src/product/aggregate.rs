//! Product aggregate implementation.

use chrono::Utc;
use common::{Actor, AggregateId};
use serde::{Deserialize, Serialize};
use store::Version;

use crate::aggregate::{Aggregate, AuditInfo};
use crate::money::Money;

use super::{
    LowStockData, PriceChangedData, ProductActivationData, ProductCreatedData, ProductDeletedData,
    ProductError, ProductEvent, ProductUpdatedData, StockChangedData,
};

/// Threshold used when a product is created without one.
pub const DEFAULT_MIN_STOCK_THRESHOLD: u32 = 10;

/// How a product is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeletionMode {
    /// Deactivate and keep the record.
    Soft,
    /// Remove the record from the store.
    Hard,
}

/// Input for [`Product::create`].
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub sku: String,
    pub price: Money,
    pub stock_quantity: u32,
    pub min_stock_threshold: Option<u32>,
    pub category: Option<String>,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, sku: impl Into<String>, price: Money, stock: u32) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            sku: sku.into(),
            price,
            stock_quantity: stock,
            min_stock_threshold: None,
            category: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.min_stock_threshold = Some(threshold);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Partial update for [`Product::update_details`]. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub category: Option<String>,
    pub min_stock_threshold: Option<u32>,
}

/// Product aggregate root.
///
/// Owns the stock level of one SKU. Stock never goes negative: a reduction
/// larger than the available quantity is rejected without changing state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Product {
    id: Option<AggregateId>,

    /// Owned by the store, not part of the persisted state.
    #[serde(skip)]
    version: Version,

    name: String,
    description: String,

    /// Upper case, immutable after creation.
    sku: String,

    price: Money,
    stock_quantity: u32,
    min_stock_threshold: u32,
    category: Option<String>,
    is_active: bool,
    audit: AuditInfo,
}

impl Aggregate for Product {
    type Event = ProductEvent;
    type Error = ProductError;

    fn aggregate_type() -> &'static str {
        "Product"
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
            ProductEvent::ProductCreated(data) => self.apply_created(data),
            ProductEvent::ProductUpdated(data) => {
                self.name = data.name;
                self.description = data.description;
                self.category = data.category;
                self.min_stock_threshold = data.min_stock_threshold;
            }
            ProductEvent::PriceChanged(data) => self.price = data.new_price,
            ProductEvent::StockReduced(data) | ProductEvent::StockIncreased(data) => {
                self.stock_quantity = data.new_stock;
            }
            ProductEvent::LowStock(_) => {}
            ProductEvent::ProductActivated(_) => self.is_active = true,
            // A hard delete also removes the record; a soft one only deactivates.
            ProductEvent::ProductDeactivated(_) | ProductEvent::ProductDeleted(_) => {
                self.is_active = false;
            }
        }
    }

    fn index_terms(&self) -> Vec<String> {
        let mut terms = vec![Self::sku_term(&self.sku)];
        if self.is_active {
            terms.push(Self::ACTIVE_TERM.to_string());
        }
        if self.is_low_stock() {
            terms.push(Self::LOW_STOCK_TERM.to_string());
        }
        terms
    }

    fn audit_mut(&mut self) -> &mut AuditInfo {
        &mut self.audit
    }
}

// Query methods
impl Product {
    pub const ACTIVE_TERM: &'static str = "status:active";
    pub const LOW_STOCK_TERM: &'static str = "stock:low";

    pub fn sku_term(sku: &str) -> String {
        format!("sku:{sku}")
    }

    /// Trims and upper-cases a SKU, rejecting empty or non-alphanumeric codes.
    pub fn normalize_sku(raw: &str) -> Result<String, ProductError> {
        let sku = raw.trim().to_ascii_uppercase();
        let valid = !sku.is_empty()
            && sku
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(sku)
        } else {
            Err(ProductError::InvalidSku(raw.to_string()))
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn price(&self) -> Money {
        self.price
    }

    pub fn stock_quantity(&self) -> u32 {
        self.stock_quantity
    }

    pub fn min_stock_threshold(&self) -> u32 {
        self.min_stock_threshold
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn is_low_stock(&self) -> bool {
        self.stock_quantity <= self.min_stock_threshold
    }

    pub fn audit(&self) -> &AuditInfo {
        &self.audit
    }

    /// Fails unless the product can be put on a new order line.
    pub fn ensure_orderable(&self) -> Result<(), ProductError> {
        let product_id = self.require_created()?;
        if !self.is_active {
            return Err(ProductError::Inactive { product_id });
        }
        Ok(())
    }

    fn require_created(&self) -> Result<AggregateId, ProductError> {
        self.id.ok_or(ProductError::NotCreated)
    }

    fn low_stock_signal(&self, product_id: AggregateId, stock: u32, threshold: u32) -> Option<ProductEvent> {
        (stock <= threshold).then(|| {
            ProductEvent::LowStock(LowStockData {
                product_id,
                sku: self.sku.clone(),
                product_name: self.name.clone(),
                current_stock: stock,
                min_stock_threshold: threshold,
                detected_at: Utc::now(),
            })
        })
    }
}

// Command methods (return events)
impl Product {
    pub fn create(
        &self,
        product_id: AggregateId,
        new: NewProduct,
        actor: &Actor,
    ) -> Result<Vec<ProductEvent>, ProductError> {
        if self.id.is_some() {
            return Err(ProductError::AlreadyCreated);
        }
        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(ProductError::InvalidName);
        }
        let sku = Self::normalize_sku(&new.sku)?;
        let threshold = new
            .min_stock_threshold
            .unwrap_or(DEFAULT_MIN_STOCK_THRESHOLD);

        let now = Utc::now();
        let mut events = vec![ProductEvent::ProductCreated(ProductCreatedData {
            product_id,
            name: name.clone(),
            description: new.description,
            sku: sku.clone(),
            price: new.price,
            stock_quantity: new.stock_quantity,
            min_stock_threshold: threshold,
            category: new.category,
            created_by: actor.clone(),
            created_at: now,
        })];

        if new.stock_quantity <= threshold {
            events.push(ProductEvent::LowStock(LowStockData {
                product_id,
                sku,
                product_name: name,
                current_stock: new.stock_quantity,
                min_stock_threshold: threshold,
                detected_at: now,
            }));
        }
        Ok(events)
    }

    /// Removes `quantity` units from stock.
    pub fn reduce_stock(
        &self,
        quantity: u32,
        actor: &Actor,
    ) -> Result<Vec<ProductEvent>, ProductError> {
        let product_id = self.require_created()?;
        if quantity == 0 {
            return Err(ProductError::InvalidQuantity { quantity });
        }
        if quantity > self.stock_quantity {
            return Err(ProductError::InsufficientStock {
                product_id,
                available: self.stock_quantity,
                requested: quantity,
            });
        }

        let new_stock = self.stock_quantity - quantity;
        let mut events = vec![ProductEvent::StockReduced(StockChangedData {
            product_id,
            sku: self.sku.clone(),
            product_name: self.name.clone(),
            quantity,
            previous_stock: self.stock_quantity,
            new_stock,
            actor: actor.clone(),
            occurred_at: Utc::now(),
        })];
        events.extend(self.low_stock_signal(product_id, new_stock, self.min_stock_threshold));
        Ok(events)
    }

    /// Adds `quantity` units to stock.
    pub fn increase_stock(
        &self,
        quantity: u32,
        actor: &Actor,
    ) -> Result<Vec<ProductEvent>, ProductError> {
        let product_id = self.require_created()?;
        if quantity == 0 {
            return Err(ProductError::InvalidQuantity { quantity });
        }
        let new_stock = self
            .stock_quantity
            .checked_add(quantity)
            .ok_or(ProductError::StockOverflow { product_id })?;

        let mut events = vec![ProductEvent::StockIncreased(StockChangedData {
            product_id,
            sku: self.sku.clone(),
            product_name: self.name.clone(),
            quantity,
            previous_stock: self.stock_quantity,
            new_stock,
            actor: actor.clone(),
            occurred_at: Utc::now(),
        })];
        events.extend(self.low_stock_signal(product_id, new_stock, self.min_stock_threshold));
        Ok(events)
    }

    /// Applies a signed stock correction. Zero is a no-op.
    pub fn adjust_stock(&self, delta: i32, actor: &Actor) -> Result<Vec<ProductEvent>, ProductError> {
        match delta {
            0 => {
                self.require_created()?;
                Ok(Vec::new())
            }
            d if d > 0 => self.increase_stock(d.unsigned_abs(), actor),
            d => self.reduce_stock(d.unsigned_abs(), actor),
        }
    }

    /// Changes descriptive fields and price. The SKU is never changed.
    pub fn update_details(
        &self,
        changes: ProductChanges,
        actor: &Actor,
    ) -> Result<Vec<ProductEvent>, ProductError> {
        let product_id = self.require_created()?;
        let name = match changes.name {
            Some(name) if name.trim().is_empty() => return Err(ProductError::InvalidName),
            Some(name) => name.trim().to_string(),
            None => self.name.clone(),
        };
        let description = changes
            .description
            .unwrap_or_else(|| self.description.clone());
        let category = changes.category.or_else(|| self.category.clone());
        let threshold = changes
            .min_stock_threshold
            .unwrap_or(self.min_stock_threshold);

        let now = Utc::now();
        let mut events = Vec::new();
        if name != self.name
            || description != self.description
            || category != self.category
            || threshold != self.min_stock_threshold
        {
            events.push(ProductEvent::ProductUpdated(ProductUpdatedData {
                product_id,
                name,
                description,
                category,
                min_stock_threshold: threshold,
                updated_by: actor.clone(),
                updated_at: now,
            }));
        }
        if let Some(new_price) = changes.price
            && new_price != self.price
        {
            events.push(ProductEvent::PriceChanged(PriceChangedData {
                product_id,
                sku: self.sku.clone(),
                old_price: self.price,
                new_price,
                changed_by: actor.clone(),
                changed_at: now,
            }));
        }
        Ok(events)
    }

    /// Toggles the active flag. Stock is untouched; setting the current value is a no-op.
    pub fn set_active(&self, active: bool, actor: &Actor) -> Result<Vec<ProductEvent>, ProductError> {
        let product_id = self.require_created()?;
        if self.is_active == active {
            return Ok(Vec::new());
        }
        let data = ProductActivationData {
            product_id,
            actor: actor.clone(),
            occurred_at: Utc::now(),
        };
        Ok(vec![if active {
            ProductEvent::ProductActivated(data)
        } else {
            ProductEvent::ProductDeactivated(data)
        }])
    }

    /// Deletes the product. `active_orders` is the number of non-terminal
    /// orders that still reference it; either mode requires it to be zero.
    ///
    /// A soft delete is a deactivation: the record stays and can be
    /// reactivated or hard-deleted later.
    pub fn delete(
        &self,
        mode: DeletionMode,
        active_orders: usize,
        actor: &Actor,
    ) -> Result<Vec<ProductEvent>, ProductError> {
        let product_id = self.require_created()?;
        if active_orders > 0 {
            return Err(ProductError::ReferencedByActiveOrders {
                product_id,
                count: active_orders,
            });
        }
        Ok(vec![ProductEvent::ProductDeleted(ProductDeletedData {
            product_id,
            sku: self.sku.clone(),
            mode,
            deleted_by: actor.clone(),
            deleted_at: Utc::now(),
        })])
    }
}

// Apply event helpers
impl Product {
    fn apply_created(&mut self, data: ProductCreatedData) {
        self.id = Some(data.product_id);
        self.name = data.name;
        self.description = data.description;
        self.sku = data.sku;
        self.price = data.price;
        self.stock_quantity = data.stock_quantity;
        self.min_stock_threshold = data.min_stock_threshold;
        self.category = data.category;
        self.is_active = true;
    }
}
