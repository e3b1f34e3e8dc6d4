//! Coupon Aggregate and validator

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use crate::domain::value_objects::{CouponCode, Money};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: Uuid,
    pub code: CouponCode,
    pub description: String,
    pub discount_type: DiscountType,
    /// Percent for [`DiscountType::Percentage`], whole currency units for [`DiscountType::Fixed`].
    pub discount_value: Decimal,
    pub min_purchase: Money,
    pub max_discount: Option<Money>,
    pub usage_limit: Option<u32>,
    pub used_count: u32,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub is_active: bool,
    /// Empty means the coupon applies to every category.
    #[serde(default)]
    pub applicable_categories: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType { Percentage, Fixed }

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponRejection {
    #[error("Coupon not found")]
    NotFound,
    #[error("Coupon is inactive")]
    Inactive,
    #[error("Coupon is not valid yet")]
    NotYetValid,
    #[error("Coupon has expired")]
    Expired,
    #[error("Coupon usage limit reached")]
    UsageLimitReached,
    #[error("Minimum purchase of {minimum} required")]
    BelowMinimumPurchase { minimum: Money },
    #[error("Coupon does not apply to these items")]
    NotApplicable,
}

impl Coupon {
    pub fn new(code: CouponCode, discount_type: DiscountType, discount_value: Decimal, valid_from: DateTime<Utc>, valid_until: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(), code, description: String::new(), discount_type, discount_value,
            min_purchase: Money::ZERO, max_discount: None, usage_limit: None, used_count: 0,
            valid_from, valid_until, is_active: true, applicable_categories: vec![],
        }
    }

    /// Active, inside the validity window and below the usage cap.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.check_window(now).is_ok()
    }

    fn check_window(&self, now: DateTime<Utc>) -> Result<(), CouponRejection> {
        if !self.is_active { return Err(CouponRejection::Inactive); }
        if now < self.valid_from { return Err(CouponRejection::NotYetValid); }
        if now > self.valid_until { return Err(CouponRejection::Expired); }
        if let Some(limit) = self.usage_limit {
            if self.used_count >= limit { return Err(CouponRejection::UsageLimitReached); }
        }
        Ok(())
    }

    /// Validates the coupon against a proposed cart total and returns the discount.
    pub fn validate(&self, now: DateTime<Utc>, cart_total: Money) -> Result<Money, CouponRejection> {
        self.check_window(now)?;
        if cart_total < self.min_purchase {
            return Err(CouponRejection::BelowMinimumPurchase { minimum: self.min_purchase });
        }
        Ok(self.discount(cart_total))
    }

    pub fn discount(&self, cart_total: Money) -> Money {
        let raw = match self.discount_type {
            DiscountType::Percentage => {
                let pct = Money::from_decimal(cart_total.to_decimal() * self.discount_value / Decimal::ONE_HUNDRED);
                match self.max_discount {
                    Some(cap) => pct.min(cap),
                    None => pct,
                }
            }
            DiscountType::Fixed => Money::from_decimal(self.discount_value),
        };
        raw.min(cart_total).clamped_sub(Money::ZERO)
    }

    pub fn applies_to<'a>(&self, mut categories: impl Iterator<Item = Option<&'a str>>) -> bool {
        if self.applicable_categories.is_empty() { return true; }
        categories.any(|c| c.is_some_and(|c| self.applicable_categories.iter().any(|a| a.eq_ignore_ascii_case(c))))
    }
}

/// Validates an optional lookup result, mapping absence to `NotFound`.
pub fn validate(coupon: Option<&Coupon>, now: DateTime<Utc>, cart_total: Money) -> Result<Money, CouponRejection> {
    coupon.ok_or(CouponRejection::NotFound)?.validate(now, cart_total)
}
