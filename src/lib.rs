//! Checkout Orchestrator
//!
//! Turns a shopping cart into a paid, shipped order by coordinating the
//! local order record with one payment gateway and one logistics provider.
//!
//! ## Features
//! - Pack pricing, coupons and tiered shipping
//! - Payment signature verification
//! - Shipment creation, tracking sync, labels and manifests
//! - Background post-payment fulfillment and notifications

pub mod api;
pub mod auth;
pub mod config;
pub mod domain;
pub mod gateways;
pub mod notify;
pub mod repository;
pub mod service;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::AuthError;
use crate::domain::aggregates::{CartError, CouponRejection, OrderError};
use crate::gateways::{PaymentGatewayError, ProviderError};
use crate::notify::NotifyError;
use crate::repository::RepositoryError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Invalid quantity for product {0}")]
    InvalidQuantity(Uuid),

    #[error("Product {0} not found")]
    ProductNotFound(Uuid),

    #[error("Order {0} not found")]
    OrderNotFound(Uuid),

    #[error("Insufficient stock for product {0}")]
    InsufficientStock(Uuid),

    #[error("{0}")]
    Coupon(#[from] CouponRejection),

    #[error("{0}")]
    Order(#[from] OrderError),

    #[error("Payment signature verification failed")]
    SignatureMismatch,

    #[error("Not allowed to act on order {0}")]
    Forbidden(Uuid),

    #[error("Session token not recognised")]
    Unauthenticated,

    #[error("Session lookup failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Order {0} was modified concurrently, retry")]
    Conflict(Uuid),

    #[error("Payment gateway error: {0}")]
    PaymentGateway(#[from] PaymentGatewayError),

    #[error("Logistics provider error: {0}")]
    Shipping(#[from] ProviderError),

    #[error("Notification error: {0}")]
    Notification(#[from] NotifyError),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Coarse classification used by callers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    /// A payment or ownership proof failed. Always surfaced.
    Trust,
    Unauthenticated,
    Conflict,
    ProviderFatal,
    Internal,
}

impl CheckoutError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyCart | Self::InvalidQuantity(_) => ErrorKind::Validation,
            Self::ProductNotFound(_) | Self::OrderNotFound(_) => ErrorKind::NotFound,
            Self::Coupon(CouponRejection::NotFound) => ErrorKind::NotFound,
            Self::Coupon(_) => ErrorKind::Validation,
            Self::Order(e) => match e {
                OrderError::NoItems | OrderError::InvalidAddress(_) | OrderError::CouponExceedsSubtotal => ErrorKind::Validation,
                OrderError::StaleGatewayOrder | OrderError::GatewayOrderMismatch => ErrorKind::Trust,
                OrderError::CannotCancel | OrderError::InvalidTransition { .. } | OrderError::ShipmentAlreadyCreated => ErrorKind::Conflict,
            },
            Self::SignatureMismatch | Self::Forbidden(_) => ErrorKind::Trust,
            Self::Unauthenticated => ErrorKind::Unauthenticated,
            Self::Conflict(_) | Self::InsufficientStock(_) => ErrorKind::Conflict,
            Self::PaymentGateway(_) | Self::Shipping(_) | Self::Auth(_) => ErrorKind::ProviderFatal,
            Self::Notification(_) | Self::Storage(_) => ErrorKind::Internal,
        }
    }
}

impl From<CartError> for CheckoutError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::Empty => Self::EmptyCart,
            CartError::ZeroQuantity(id) => Self::InvalidQuantity(id),
        }
    }
}

impl From<RepositoryError> for CheckoutError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Conflict { id, .. } => Self::Conflict(id),
            RepositoryError::OrderNotFound(id) => Self::OrderNotFound(id),
            RepositoryError::ProductNotFound(id) => Self::ProductNotFound(id),
            RepositoryError::InsufficientStock(id) => Self::InsufficientStock(id),
            other => Self::Storage(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CheckoutError>;
