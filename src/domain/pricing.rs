//! Pricing engine.
//!
//! Pure functions only: pack pricing, item subtotals, the tiered shipping
//! rule and the order total. Carrier rate lookups happen in the service and
//! are passed in as an already-resolved quote.

use rust_decimal::Decimal;
use serde::Serialize;
use crate::domain::aggregates::{LineItem, Product};
use crate::domain::value_objects::{Money, PackSize};

/// Subtotal at or above which shipping is free.
pub const FREE_SHIPPING_THRESHOLD: Money = Money::new(499);
/// Subtotal at or above which the flat reduced rate applies.
pub const REDUCED_SHIPPING_THRESHOLD: Money = Money::new(249);
pub const REDUCED_SHIPPING_PRICE: Money = Money::new(50);
/// Charged when the carrier quote is unavailable.
pub const FALLBACK_SHIPPING_PRICE: Money = Money::new(60);

/// Price actually charged for one pack of `pack` size.
pub fn unit_price(product: &Product, pack: PackSize) -> Money {
    if let Some(pricing) = &product.pricing {
        return match pack {
            PackSize::Single => pricing.single,
            PackSize::Two => pricing.pack_of_two,
            PackSize::Four => pricing.pack_of_four,
        };
    }
    legacy_unit_price(product.base_price, pack)
}

/// Pack prices derived from a single-unit base: 5% off a pair, 10% off four.
pub fn legacy_unit_price(base: Money, pack: PackSize) -> Money {
    let ratio = match pack {
        PackSize::Single => return base,
        PackSize::Two => Decimal::new(95, 2),
        PackSize::Four => Decimal::new(90, 2),
    };
    Money::from_decimal(base.to_decimal() * Decimal::from(pack.units()) * ratio)
}

pub fn items_subtotal(items: &[LineItem]) -> Money {
    items.iter().map(LineItem::line_total).sum()
}

/// Which branch of the tiered shipping rule a subtotal falls in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingTier {
    Free,
    Reduced,
    CarrierRate,
}

pub fn shipping_tier(items_subtotal: Money) -> ShippingTier {
    if items_subtotal >= FREE_SHIPPING_THRESHOLD {
        ShippingTier::Free
    } else if items_subtotal >= REDUCED_SHIPPING_THRESHOLD {
        ShippingTier::Reduced
    } else {
        ShippingTier::CarrierRate
    }
}

/// Resolves the tiered rule. `carrier_quote` is only consulted in the
/// carrier-rate tier; a missing or non-positive quote falls back to
/// [`FALLBACK_SHIPPING_PRICE`].
pub fn shipping_price(items_subtotal: Money, carrier_quote: Option<Money>) -> Money {
    match shipping_tier(items_subtotal) {
        ShippingTier::Free => Money::ZERO,
        ShippingTier::Reduced => REDUCED_SHIPPING_PRICE,
        ShippingTier::CarrierRate => carrier_quote
            .filter(|q| q.amount() > 0)
            .unwrap_or(FALLBACK_SHIPPING_PRICE),
    }
}

/// `items_subtotal + shipping_price - coupon_discount`, never negative.
pub fn total(items_subtotal: Money, shipping_price: Money, coupon_discount: Money) -> Money {
    (items_subtotal + shipping_price).clamped_sub(coupon_discount)
}
