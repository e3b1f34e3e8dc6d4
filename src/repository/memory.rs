//! In-memory repositories for tests and local runs.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Catalog, CouponRepository, OrderRepository, Redemption, RepositoryError};
use crate::domain::aggregates::{Coupon, Order, Product};
use crate::domain::value_objects::{CouponCode, Money};

#[derive(Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashMap<Uuid, Product>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self { Self::default() }

    pub async fn insert(&self, product: Product) {
        self.products.write().await.insert(product.id, product);
    }

    pub async fn stock(&self, id: Uuid) -> Option<i64> {
        self.products.read().await.get(&id).map(|p| p.stock)
    }

    pub async fn set_base_price(&self, id: Uuid, price: Money) {
        if let Some(p) = self.products.write().await.get_mut(&id) { p.base_price = price; }
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, RepositoryError> {
        Ok(self.products.read().await.get(&id).cloned())
    }

    async fn adjust_stock(&self, id: Uuid, delta: i64) -> Result<(), RepositoryError> {
        let mut products = self.products.write().await;
        let product = products.get_mut(&id).ok_or(RepositoryError::ProductNotFound(id))?;
        if product.stock + delta < 0 { return Err(RepositoryError::InsufficientStock(id)); }
        product.stock += delta;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<Uuid, Order>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self { Self::default() }
    pub async fn len(&self) -> usize { self.orders.read().await.len() }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut snapshot = order.clone();
        snapshot.take_events();
        self.orders.write().await.insert(order.id(), snapshot);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, RepositoryError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn save(&self, order: &mut Order) -> Result<(), RepositoryError> {
        let mut orders = self.orders.write().await;
        let stored = orders.get(&order.id()).ok_or(RepositoryError::OrderNotFound(order.id()))?;
        if stored.version() != order.version() {
            return Err(RepositoryError::Conflict { id: order.id(), expected: order.version() });
        }
        order.set_version(order.version() + 1);
        let mut snapshot = order.clone();
        snapshot.take_events();
        orders.insert(order.id(), snapshot);
        Ok(())
    }
}

#[derive(Default)]
struct CouponState {
    coupons: HashMap<Uuid, Coupon>,
    redemptions: HashSet<(Uuid, Uuid)>,
}

#[derive(Default)]
pub struct InMemoryCouponRepository {
    state: RwLock<CouponState>,
}

impl InMemoryCouponRepository {
    pub fn new() -> Self { Self::default() }

    pub async fn insert(&self, coupon: Coupon) {
        self.state.write().await.coupons.insert(coupon.id, coupon);
    }
}

#[async_trait]
impl CouponRepository for InMemoryCouponRepository {
    async fn find_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>, RepositoryError> {
        Ok(self.state.read().await.coupons.values().find(|c| &c.code == code).cloned())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Coupon>, RepositoryError> {
        Ok(self.state.read().await.coupons.get(&id).cloned())
    }

    async fn record_redemption(&self, coupon_id: Uuid, order_id: Uuid) -> Result<Redemption, RepositoryError> {
        let mut state = self.state.write().await;
        if state.redemptions.contains(&(coupon_id, order_id)) {
            return Ok(Redemption::AlreadyRecorded);
        }
        let Some(coupon) = state.coupons.get_mut(&coupon_id) else { return Ok(Redemption::LimitReached) };
        if coupon.usage_limit.is_some_and(|limit| coupon.used_count >= limit) {
            return Ok(Redemption::LimitReached);
        }
        coupon.used_count += 1;
        state.redemptions.insert((coupon_id, order_id));
        Ok(Redemption::Recorded)
    }
}
