//! Order state machine orchestration.
pub mod checkout;
pub mod fulfillment;
pub mod locks;

#[cfg(test)]
pub(crate) mod testing;

pub use checkout::{Actor, CheckoutService, CheckoutSettings, Collaborators, CouponQuote, PlacedOrder, ShippingEstimate};
pub use fulfillment::{JobReceiver, JobSender, PostPaymentJob};
pub use locks::OrderLocks;
