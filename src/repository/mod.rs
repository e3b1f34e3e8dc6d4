//! Persistence and catalog collaborators.
//!
//! Orders are saved with a compare-and-set on `version`; coupon redemptions
//! are recorded once per `(coupon, order)` with a guarded usage increment.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{Coupon, Order, Product};
use crate::domain::value_objects::CouponCode;

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryCatalog, InMemoryCouponRepository, InMemoryOrderRepository};
pub use postgres::{PgCatalog, PgCouponRepository, PgOrderRepository};

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("order {id} was modified concurrently (expected version {expected})")]
    Conflict { id: Uuid, expected: u64 },
    #[error("order {0} not found")]
    OrderNotFound(Uuid),
    #[error("product {0} not found")]
    ProductNotFound(Uuid),
    #[error("insufficient stock for product {0}")]
    InsufficientStock(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Outcome of recording a coupon use for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redemption {
    Recorded,
    /// This order already used the coupon; nothing changed.
    AlreadyRecorded,
    LimitReached,
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, RepositoryError>;
    /// Adds `delta` to stock; fails without change if stock would go negative.
    async fn adjust_stock(&self, id: Uuid, delta: i64) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError>;
    async fn get(&self, id: Uuid) -> Result<Option<Order>, RepositoryError>;
    /// Persists `order` if the stored version still equals `order.version()`,
    /// then advances the version on both sides.
    async fn save(&self, order: &mut Order) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait CouponRepository: Send + Sync {
    async fn find_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>, RepositoryError>;
    async fn get(&self, id: Uuid) -> Result<Option<Coupon>, RepositoryError>;
    async fn record_redemption(&self, coupon_id: Uuid, order_id: Uuid) -> Result<Redemption, RepositoryError>;
}
