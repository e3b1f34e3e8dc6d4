//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod coupon;

pub use product::{PackPricing, Product};
pub use order::{
    AppliedCoupon, CheckoutStage, GuestContact, LineItem, Order, OrderError, OrderStatus, Owner, Payment,
    PaymentMethod, PaymentStatus, Shipment, ShippingAddress, ShippingStatus, StatusEntry, TrackingUpdate,
};
pub use cart::{Cart, CartError, CartLine};
pub use coupon::{Coupon, CouponRejection, DiscountType};
