//! Read-side cache for order and product queries.
//!
//! This crate provides the query-side acceleration layer:
//! - [`Cache`] trait for key/value stores with per-entry TTL
//! - [`InMemoryCache`] implementation backed by a `tokio` lock
//! - [`CacheKey`] naming scheme for every cached view
//! - [`CacheInvalidator`] for post-commit, key-based eviction
//! - [`OrderView`] and [`ProductView`] read models stored in the cache
//!
//! The cache is advisory. Nothing in the write path reads from it.

pub mod cache;
pub mod error;
pub mod invalidator;
pub mod key;
pub mod memory;
pub mod views;

pub use cache::{Cache, CacheExt, MAX_TTL};
pub use error::{CacheError, Result};
pub use invalidator::CacheInvalidator;
pub use key::CacheKey;
pub use memory::InMemoryCache;
pub use views::{OrderItemView, OrderView, ProductView};
