//! Value Objects for checkout

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::ops::{Add, Mul};

/// Money in whole currency units. The storefront currency has no fractional
/// sub-unit, so every computed amount is rounded to the nearest integer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn new(amount: i64) -> Self { Self(amount) }
    pub fn amount(&self) -> i64 { self.0 }
    pub fn is_zero(&self) -> bool { self.0 == 0 }

    /// Rounds a decimal amount half-away-from-zero to whole units.
    pub fn from_decimal(value: Decimal) -> Self {
        let rounded = value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        Self(rounded.to_i64().unwrap_or(i64::MAX))
    }

    pub fn to_decimal(&self) -> Decimal { Decimal::from(self.0) }

    /// Amount in the smallest currency unit (1/100), as payment gateways expect.
    pub fn to_minor_units(&self) -> i64 { self.0.saturating_mul(100) }

    /// Subtraction that never goes below zero.
    pub fn clamped_sub(&self, other: Money) -> Money { Money((self.0 - other.0).max(0)) }

    pub fn min(self, other: Money) -> Money { Money(self.0.min(other.0)) }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money { Money(self.0.saturating_add(rhs.0)) }
}

impl Mul<u32> for Money {
    type Output = Money;
    fn mul(self, qty: u32) -> Money { Money(self.0.saturating_mul(i64::from(qty))) }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money { iter.fold(Money::ZERO, |acc, m| acc + m) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Bundling tier a product is sold in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PackSize {
    #[default]
    Single,
    Two,
    Four,
}

impl PackSize {
    pub fn units(&self) -> u32 {
        match self { Self::Single => 1, Self::Two => 2, Self::Four => 4 }
    }
}

impl TryFrom<u8> for PackSize {
    type Error = PackSizeError;
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Single),
            2 => Ok(Self::Two),
            4 => Ok(Self::Four),
            other => Err(PackSizeError(other)),
        }
    }
}

impl From<PackSize> for u8 {
    fn from(p: PackSize) -> u8 { p.units() as u8 }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub struct PackSizeError(pub u8);
impl std::error::Error for PackSizeError {}
impl fmt::Display for PackSizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "unsupported pack size {}", self.0) }
}

/// Human-readable order number: `PREFIX-<base36 timestamp>-<base36 random>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    pub fn generate(prefix: &str, now: DateTime<Utc>) -> Self {
        let millis = now.timestamp_millis().max(0) as u64;
        let random: u32 = rand::thread_rng().gen_range(0..36u32.pow(5));
        Self(format!("{}-{}-{:0>5}", prefix.to_uppercase(), base36(millis), base36(u64::from(random))))
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

fn base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if n == 0 { return "0".to_string(); }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Coupon code, normalised to upper case.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CouponCode(String);

impl CouponCode {
    pub fn new(value: impl Into<String>) -> Result<Self, CouponCodeError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(CouponCodeError::Empty); }
        if value.len() > 32 { return Err(CouponCodeError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for CouponCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CouponCodeError { Empty, TooLong }
impl std::error::Error for CouponCodeError {}
impl fmt::Display for CouponCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Empty => write!(f, "coupon code empty"), Self::TooLong => write!(f, "coupon code too long") }
    }
}

/// Secret handed to a guest when their order is created. The order keeps
/// only its SHA-256 digest.
#[derive(Clone, PartialEq, Eq)]
pub struct GuestToken(String);

impl GuestToken {
    pub fn generate() -> Self {
        let bytes: [u8; 32] = rand::thread_rng().gen();
        Self(hex::encode(bytes))
    }

    pub fn from_presented(value: &str) -> Self { Self(value.trim().to_string()) }
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn digest(&self) -> String { hex::encode(Sha256::digest(self.0.as_bytes())) }
}

impl fmt::Debug for GuestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("GuestToken(..)") }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_money_rounding() {
        assert_eq!(Money::from_decimal(Decimal::new(1805, 1)), Money::new(181));
        assert_eq!(Money::from_decimal(Decimal::new(1804, 1)), Money::new(180));
        assert_eq!(Money::new(440).to_minor_units(), 44000);
    }

    #[test]
    fn test_money_clamped_sub() {
        assert_eq!(Money::new(100).clamped_sub(Money::new(150)), Money::ZERO);
        assert_eq!(Money::new(100).clamped_sub(Money::new(40)), Money::new(60));
    }

    #[test]
    fn test_pack_size_from_wire() {
        assert_eq!(PackSize::try_from(2).unwrap(), PackSize::Two);
        assert!(PackSize::try_from(3).is_err());
        let parsed: PackSize = serde_json::from_str("4").unwrap();
        assert_eq!(parsed.units(), 4);
    }

    #[test]
    fn test_order_number_format() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let number = OrderNumber::generate("ord", now);
        let parts: Vec<&str> = number.as_str().split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ORD");
        assert_eq!(u64::from_str_radix(parts[1], 36).unwrap(), now.timestamp_millis() as u64);
        assert_eq!(parts[2].len(), 5);
        assert!(parts[2].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_coupon_code() {
        assert_eq!(CouponCode::new(" save50 ").unwrap().as_str(), "SAVE50");
        assert_eq!(CouponCode::new("  "), Err(CouponCodeError::Empty));
    }

    #[test]
    fn test_guest_token_digest_and_redaction() {
        let token = GuestToken::generate();
        assert_eq!(token.as_str().len(), 64);
        assert_ne!(token, GuestToken::generate());
        assert_eq!(GuestToken::from_presented(&format!(" {} ", token.as_str())).digest(), token.digest());
        assert_eq!(format!("{:?}", token), "GuestToken(..)");
    }
}
