//! Cart submitted for checkout

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::PackSize;

/// A cart line as the client submits it: only references, never prices.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub quantity: u32,
    #[serde(default)]
    pub pack: PackSize,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self { Self::default() }

    pub fn from_lines(lines: impl IntoIterator<Item = CartLine>) -> Self {
        let mut cart = Self::new();
        for line in lines { cart.add_line(line); }
        cart
    }

    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }

    /// Lines for the same product and pack are merged.
    pub fn add_line(&mut self, line: CartLine) {
        if let Some(existing) = self.lines.iter_mut().find(|l| l.product_id == line.product_id && l.pack == line.pack) {
            existing.quantity = existing.quantity.saturating_add(line.quantity);
        } else {
            self.lines.push(line);
        }
    }

    pub fn validate_for_checkout(&self) -> Result<(), CartError> {
        if self.lines.is_empty() { return Err(CartError::Empty); }
        if let Some(line) = self.lines.iter().find(|l| l.quantity == 0) {
            return Err(CartError::ZeroQuantity(line.product_id));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartError { Empty, ZeroQuantity(Uuid) }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Cart is empty"),
            Self::ZeroQuantity(id) => write!(f, "Zero quantity for product {}", id),
        }
    }
}
