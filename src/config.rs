//! Environment configuration.
//!
//! - `DATABASE_URL`: required
//! - `PORT`: listen port (default 8083)
//! - `NATS_URL`: optional; without it notifications are only logged
//! - `ORDER_NUMBER_PREFIX` (default `ORD`), `CURRENCY` (default `INR`)
//! - `PAYMENT_GATEWAY_URL`, `PAYMENT_GATEWAY_KEY_ID`, `PAYMENT_GATEWAY_KEY_SECRET`
//! - `SHIPPING_GATEWAY_URL`, `SHIPPING_ACCESS_TOKEN`, `SHIPPING_SECRET_KEY`
//! - `SHIPPING_ORIGIN_PINCODE`, `SHIPPING_PICKUP_ADDRESS_ID`, `SHIPPING_RETURN_ADDRESS_ID`
//! - `SHIPPING_UNIT_WEIGHT_KG` (default 0.5), `SHIPPING_PACKAGE_DIMENSIONS_CM` (default `20x15x10`)
//! - `HTTP_CONNECT_TIMEOUT_SECS` (default 5), `HTTP_TIMEOUT_SECS` (default 10)
//! - `ADMIN_EMAIL`: optional admin recipient for order confirmations
//! - `AUTH_SERVICE_URL`: identity service resolving bearer sessions; optional
//! - `OPERATOR_API_TOKEN`: static operator bearer, used when no identity service is set
//! - `POST_PAYMENT_CONCURRENCY`: post-payment jobs run at once (default 8)

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::gateways::{Dimensions, PaymentGatewayConfig, ShippingGatewayConfig};
use crate::service::CheckoutSettings;

const DEFAULT_PAYMENT_URL: &str = "https://api.razorpay.com";
const DEFAULT_SHIPPING_URL: &str = "https://my.ithinklogistics.com";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),
    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub nats_url: Option<String>,
    pub auth_service_url: Option<String>,
    pub operator_token: Option<String>,
    pub post_payment_concurrency: usize,
    pub checkout: CheckoutSettings,
    pub payment: PaymentGatewayConfig,
    pub shipping: ShippingGatewayConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let connect_timeout = Duration::from_secs(parse_or(&get, "HTTP_CONNECT_TIMEOUT_SECS", 5)?);
        let timeout = Duration::from_secs(parse_or(&get, "HTTP_TIMEOUT_SECS", 10)?);

        let pickup_address_id = required("SHIPPING_PICKUP_ADDRESS_ID")?;
        let package = match get("SHIPPING_PACKAGE_DIMENSIONS_CM") {
            Some(v) => parse_dimensions(&v).ok_or(ConfigError::Invalid { key: "SHIPPING_PACKAGE_DIMENSIONS_CM", value: v })?,
            None => CheckoutSettings::default().package,
        };
        let defaults = CheckoutSettings::default();

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            port: parse_or(&get, "PORT", 8083)?,
            nats_url: get("NATS_URL"),
            auth_service_url: get("AUTH_SERVICE_URL"),
            operator_token: get("OPERATOR_API_TOKEN"),
            post_payment_concurrency: match parse_or(&get, "POST_PAYMENT_CONCURRENCY", 8usize)? {
                0 => return Err(ConfigError::Invalid { key: "POST_PAYMENT_CONCURRENCY", value: "0".into() }),
                n => n,
            },
            checkout: CheckoutSettings {
                order_number_prefix: get("ORDER_NUMBER_PREFIX").unwrap_or(defaults.order_number_prefix),
                currency: get("CURRENCY").unwrap_or(defaults.currency),
                origin_postal_code: required("SHIPPING_ORIGIN_PINCODE")?,
                unit_weight_kg: parse_or(&get, "SHIPPING_UNIT_WEIGHT_KG", defaults.unit_weight_kg)?,
                package,
                admin_email: get("ADMIN_EMAIL"),
            },
            payment: PaymentGatewayConfig {
                base_url: get("PAYMENT_GATEWAY_URL").unwrap_or_else(|| DEFAULT_PAYMENT_URL.to_string()),
                key_id: required("PAYMENT_GATEWAY_KEY_ID")?,
                key_secret: required("PAYMENT_GATEWAY_KEY_SECRET")?,
                connect_timeout,
                timeout,
            },
            shipping: ShippingGatewayConfig {
                base_url: get("SHIPPING_GATEWAY_URL").unwrap_or_else(|| DEFAULT_SHIPPING_URL.to_string()),
                access_token: required("SHIPPING_ACCESS_TOKEN")?,
                secret_key: required("SHIPPING_SECRET_KEY")?,
                return_address_id: get("SHIPPING_RETURN_ADDRESS_ID").unwrap_or_else(|| pickup_address_id.clone()),
                pickup_address_id,
                connect_timeout,
                timeout,
            },
        })
    }
}

fn parse_or<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match get(key) {
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid { key, value: v }),
        None => Ok(default),
    }
}

/// `LxWxH` in whole centimetres, e.g. `20x15x10`.
fn parse_dimensions(value: &str) -> Option<Dimensions> {
    let parts: Vec<u32> = value.split(['x', 'X']).map(|p| p.trim().parse().ok()).collect::<Option<_>>()?;
    match parts.as_slice() {
        [l, w, h] if *l > 0 && *w > 0 && *h > 0 => Some(Dimensions { length_cm: *l, width_cm: *w, height_cm: *h }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use rust_decimal::Decimal;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("DATABASE_URL", "postgres://localhost/checkout"),
        ("PAYMENT_GATEWAY_KEY_ID", "rzp_test"),
        ("PAYMENT_GATEWAY_KEY_SECRET", "s3cr3t"),
        ("SHIPPING_ACCESS_TOKEN", "token"),
        ("SHIPPING_SECRET_KEY", "secret"),
        ("SHIPPING_ORIGIN_PINCODE", "110001"),
        ("SHIPPING_PICKUP_ADDRESS_ID", "42"),
    ];

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_lookup(env(REQUIRED)).unwrap();
        assert_eq!(config.port, 8083);
        assert_eq!(config.checkout.currency, "INR");
        assert_eq!(config.shipping.return_address_id, "42");
        assert_eq!(config.payment.timeout, Duration::from_secs(10));
        assert!(config.nats_url.is_none());
        assert!(config.auth_service_url.is_none());
        assert_eq!(config.post_payment_concurrency, 8);
    }

    #[test]
    fn test_missing_secret_reported() {
        let partial: Vec<_> = REQUIRED.iter().copied().filter(|(k, _)| *k != "PAYMENT_GATEWAY_KEY_SECRET").collect();
        assert_eq!(Config::from_lookup(env(&partial)).unwrap_err(), ConfigError::Missing("PAYMENT_GATEWAY_KEY_SECRET"));
    }

    #[test]
    fn test_overrides_parsed() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([("PORT", "9000"), ("SHIPPING_PACKAGE_DIMENSIONS_CM", "30x20x5"), ("SHIPPING_UNIT_WEIGHT_KG", "0.25")]);
        let config = Config::from_lookup(env(&pairs)).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.checkout.package, Dimensions { length_cm: 30, width_cm: 20, height_cm: 5 });
        assert_eq!(config.checkout.unit_weight_kg, Decimal::new(25, 2));
    }

    #[test]
    fn test_bad_number_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("HTTP_TIMEOUT_SECS", "soon"));
        assert!(matches!(Config::from_lookup(env(&pairs)), Err(ConfigError::Invalid { key: "HTTP_TIMEOUT_SECS", .. })));
        assert_eq!(parse_dimensions("20x15"), None);
    }

    #[test]
    fn test_auth_and_worker_settings() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([("AUTH_SERVICE_URL", "http://identity:8080"), ("OPERATOR_API_TOKEN", "op"), ("POST_PAYMENT_CONCURRENCY", "16")]);
        let config = Config::from_lookup(env(&pairs)).unwrap();
        assert_eq!(config.auth_service_url.as_deref(), Some("http://identity:8080"));
        assert_eq!(config.operator_token.as_deref(), Some("op"));
        assert_eq!(config.post_payment_concurrency, 16);

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("POST_PAYMENT_CONCURRENCY", "0"));
        assert!(matches!(Config::from_lookup(env(&pairs)), Err(ConfigError::Invalid { key: "POST_PAYMENT_CONCURRENCY", .. })));
    }
}
