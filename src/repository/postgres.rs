//! Postgres repositories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{Catalog, CouponRepository, OrderRepository, Redemption, RepositoryError};
use crate::domain::aggregates::{Coupon, DiscountType, Order, PackPricing, Product};
use crate::domain::value_objects::{CouponCode, Money};

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: Uuid, external_id: String, name: String, category: Option<String>, base_price: i64,
    price_single: Option<i64>, price_pack_two: Option<i64>, price_pack_four: Option<i64>,
    stock: i64, is_active: bool,
}

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        let pricing = match (r.price_single, r.price_pack_two, r.price_pack_four) {
            (Some(single), Some(two), Some(four)) => Some(PackPricing {
                single: Money::new(single), pack_of_two: Money::new(two), pack_of_four: Money::new(four),
            }),
            _ => None,
        };
        Product {
            id: r.id, external_id: r.external_id, name: r.name, category: r.category,
            base_price: Money::new(r.base_price), pricing, stock: r.stock, is_active: r.is_active,
        }
    }
}

#[derive(Clone)]
pub struct PgCatalog { db: PgPool }

impl PgCatalog {
    pub fn new(db: PgPool) -> Self { Self { db } }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT id, external_id, name, category, base_price, price_single, price_pack_two, price_pack_four, stock, is_active FROM products WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Product::from))
    }

    async fn adjust_stock(&self, id: Uuid, delta: i64) -> Result<(), RepositoryError> {
        let updated = sqlx::query("UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1 AND stock + $2 >= 0")
            .bind(id)
            .bind(delta)
            .execute(&self.db)
            .await?
            .rows_affected();
        if updated == 1 { return Ok(()); }

        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM products WHERE id = $1").bind(id).fetch_optional(&self.db).await?;
        match exists {
            Some(_) => Err(RepositoryError::InsufficientStock(id)),
            None => Err(RepositoryError::ProductNotFound(id)),
        }
    }
}

#[derive(Clone)]
pub struct PgOrderRepository { db: PgPool }

impl PgOrderRepository {
    pub fn new(db: PgPool) -> Self { Self { db } }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO orders (id, order_number, version, document, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6)")
            .bind(order.id())
            .bind(order.order_number().as_str())
            .bind(order.version() as i64)
            .bind(Json(order))
            .bind(order.created_at())
            .bind(order.updated_at())
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, RepositoryError> {
        let row: Option<(Json<Order>, i64)> = sqlx::query_as("SELECT document, version FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row.map(|(Json(mut order), version)| {
            order.set_version(version as u64);
            order
        }))
    }

    async fn save(&self, order: &mut Order) -> Result<(), RepositoryError> {
        let expected = order.version();
        order.set_version(expected + 1);
        let result = sqlx::query("UPDATE orders SET document = $3, version = $4, updated_at = $5 WHERE id = $1 AND version = $2")
            .bind(order.id())
            .bind(expected as i64)
            .bind(Json(&*order))
            .bind((expected + 1) as i64)
            .bind(order.updated_at())
            .execute(&self.db)
            .await;

        let updated = match result {
            Ok(r) => r.rows_affected(),
            Err(e) => {
                order.set_version(expected);
                return Err(e.into());
            }
        };
        if updated == 1 { return Ok(()); }

        order.set_version(expected);
        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM orders WHERE id = $1").bind(order.id()).fetch_optional(&self.db).await?;
        match exists {
            Some(_) => Err(RepositoryError::Conflict { id: order.id(), expected }),
            None => Err(RepositoryError::OrderNotFound(order.id())),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CouponRow {
    id: Uuid, code: String, description: String, discount_type: String, discount_value: Decimal,
    min_purchase: i64, max_discount: Option<i64>, usage_limit: Option<i32>, used_count: i32,
    valid_from: DateTime<Utc>, valid_until: DateTime<Utc>, is_active: bool, applicable_categories: Vec<String>,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = RepositoryError;
    fn try_from(r: CouponRow) -> Result<Self, Self::Error> {
        let discount_type = match r.discount_type.as_str() {
            "percentage" => DiscountType::Percentage,
            "fixed" => DiscountType::Fixed,
            other => return Err(RepositoryError::Database(sqlx::Error::Decode(format!("unknown discount type {}", other).into()))),
        };
        let code = CouponCode::new(r.code).map_err(|e| RepositoryError::Database(sqlx::Error::Decode(Box::new(e))))?;
        Ok(Coupon {
            id: r.id, code, description: r.description, discount_type, discount_value: r.discount_value,
            min_purchase: Money::new(r.min_purchase), max_discount: r.max_discount.map(Money::new),
            usage_limit: r.usage_limit.map(|l| l.max(0) as u32), used_count: r.used_count.max(0) as u32,
            valid_from: r.valid_from, valid_until: r.valid_until, is_active: r.is_active,
            applicable_categories: r.applicable_categories,
        })
    }
}

const COUPON_COLUMNS: &str = "id, code, description, discount_type, discount_value, min_purchase, max_discount, usage_limit, used_count, valid_from, valid_until, is_active, applicable_categories";

#[derive(Clone)]
pub struct PgCouponRepository { db: PgPool }

impl PgCouponRepository {
    pub fn new(db: PgPool) -> Self { Self { db } }
}

#[async_trait]
impl CouponRepository for PgCouponRepository {
    async fn find_by_code(&self, code: &CouponCode) -> Result<Option<Coupon>, RepositoryError> {
        let sql = format!("SELECT {} FROM coupons WHERE code = $1", COUPON_COLUMNS);
        let row = sqlx::query_as::<_, CouponRow>(&sql).bind(code.as_str()).fetch_optional(&self.db).await?;
        row.map(Coupon::try_from).transpose()
    }

    async fn get(&self, id: Uuid) -> Result<Option<Coupon>, RepositoryError> {
        let sql = format!("SELECT {} FROM coupons WHERE id = $1", COUPON_COLUMNS);
        let row = sqlx::query_as::<_, CouponRow>(&sql).bind(id).fetch_optional(&self.db).await?;
        row.map(Coupon::try_from).transpose()
    }

    async fn record_redemption(&self, coupon_id: Uuid, order_id: Uuid) -> Result<Redemption, RepositoryError> {
        let mut tx = self.db.begin().await?;
        let inserted = sqlx::query("INSERT INTO coupon_redemptions (coupon_id, order_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(coupon_id)
            .bind(order_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if inserted == 0 {
            tx.rollback().await?;
            return Ok(Redemption::AlreadyRecorded);
        }

        let incremented = sqlx::query("UPDATE coupons SET used_count = used_count + 1 WHERE id = $1 AND (usage_limit IS NULL OR used_count < usage_limit)")
            .bind(coupon_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if incremented == 0 {
            tx.rollback().await?;
            return Ok(Redemption::LimitReached);
        }

        tx.commit().await?;
        Ok(Redemption::Recorded)
    }
}
