//! Catalog Product, as seen by checkout

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::Money;

/// Product read from the catalog at checkout time. Checkout never trusts
/// client-supplied names or prices; it re-reads this record instead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    /// Catalog's external identifier (SKU shown to the carrier).
    pub external_id: String,
    pub name: String,
    pub category: Option<String>,
    /// Legacy single-unit price, used when no pricing variants are set.
    pub base_price: Money,
    pub pricing: Option<PackPricing>,
    pub stock: i64,
    pub is_active: bool,
}

/// Explicit per-pack prices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackPricing { pub single: Money, pub pack_of_two: Money, pub pack_of_four: Money }

impl Product {
    pub fn new(external_id: impl Into<String>, name: impl Into<String>, base_price: Money, stock: i64) -> Self {
        Self {
            id: Uuid::new_v4(), external_id: external_id.into(), name: name.into(), category: None,
            base_price, pricing: None, stock, is_active: true,
        }
    }

    pub fn with_pricing(mut self, pricing: PackPricing) -> Self { self.pricing = Some(pricing); self }
    pub fn with_category(mut self, category: impl Into<String>) -> Self { self.category = Some(category.into()); self }
    pub fn is_available(&self) -> bool { self.is_active }
}
