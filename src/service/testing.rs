//! Shared fixture for service tests: in-memory storage and recording doubles.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::checkout::{CheckoutService, CheckoutSettings, Collaborators};
use super::fulfillment::{self, JobReceiver};
use crate::domain::aggregates::{Cart, CartLine, Coupon, DiscountType, Order, Owner, PackPricing, Product, ShippingAddress};
use crate::domain::value_objects::{CouponCode, GuestToken, Money, PackSize};
use crate::gateways::mock::{MockPaymentGateway, MockShippingGateway};
use crate::notify::mock::RecordingNotifier;
use crate::repository::{InMemoryCatalog, InMemoryCouponRepository, InMemoryOrderRepository};

pub fn address() -> ShippingAddress {
    ShippingAddress {
        full_name: "Asha Rao".into(), email: "asha@example.com".into(), phone: "9876543210".into(),
        street: "12 MG Road".into(), city: "Pune".into(), state: "MH".into(), postal_code: "411001".into(), country: "India".into(),
    }
}

pub struct Harness {
    pub service: Arc<CheckoutService>,
    pub catalog: Arc<InMemoryCatalog>,
    pub orders: Arc<InMemoryOrderRepository>,
    pub coupons: Arc<InMemoryCouponRepository>,
    pub payments: Arc<MockPaymentGateway>,
    pub shipping: Arc<MockShippingGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub jobs: JobReceiver,
    /// ₹100, legacy pricing, stock 10.
    pub product_a: Uuid,
    /// ₹100 single, ₹190 pack of two, stock 10.
    pub product_b: Uuid,
}

impl Harness {
    pub async fn new() -> Self {
        let catalog = Arc::new(InMemoryCatalog::new());
        let a = Product::new("EXT-A", "Neem Soap", Money::new(100), 10);
        let b = Product::new("EXT-B", "Rose Soap", Money::new(100), 10).with_pricing(PackPricing {
            single: Money::new(100), pack_of_two: Money::new(190), pack_of_four: Money::new(360),
        });
        let (product_a, product_b) = (a.id, b.id);
        catalog.insert(a).await;
        catalog.insert(b).await;

        let orders = Arc::new(InMemoryOrderRepository::new());
        let coupons = Arc::new(InMemoryCouponRepository::new());
        let payments = Arc::new(MockPaymentGateway::new());
        let shipping = Arc::new(MockShippingGateway::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let (tx, jobs) = fulfillment::channel();

        let deps = Collaborators {
            catalog: catalog.clone(),
            orders: orders.clone(),
            coupons: coupons.clone(),
            payments: payments.clone(),
            shipping: shipping.clone(),
            notifier: notifier.clone(),
        };
        let settings = CheckoutSettings { admin_email: Some("ops@shop.test".into()), ..CheckoutSettings::default() };
        let service = Arc::new(CheckoutService::new(deps, settings, tx));

        Self { service, catalog, orders, coupons, payments, shipping, notifier, jobs, product_a, product_b }
    }

    /// Two of A plus one pack of two of B: subtotal 390.
    pub fn cart(&self) -> Cart {
        Cart::from_lines([
            CartLine { product_id: self.product_a, quantity: 2, pack: PackSize::Single },
            CartLine { product_id: self.product_b, quantity: 1, pack: PackSize::Two },
        ])
    }

    pub fn cart_of(&self, product_id: Uuid, quantity: u32) -> Cart {
        Cart::from_lines([CartLine { product_id, quantity, pack: PackSize::Single }])
    }

    pub async fn insert_coupon(&self, code: &str, kind: DiscountType, value: i64) -> Uuid {
        let now = Utc::now();
        let coupon = Coupon::new(CouponCode::new(code).unwrap(), kind, Decimal::from(value), now - Duration::days(1), now + Duration::days(1));
        let id = coupon.id;
        self.coupons.insert(coupon).await;
        id
    }

    /// Guest order with address attached; current gateway order is `order_2`.
    pub async fn priced_order(&self) -> Order {
        self.priced_guest_order().await.0
    }

    /// Same as [`Harness::priced_order`], keeping the token handed to the guest.
    pub async fn priced_guest_order(&self) -> (Order, GuestToken) {
        let placed = self.service.create_order_from_cart(Owner::Guest { contact: None }, &self.cart()).await.unwrap();
        let order = self.service.attach_shipping_address(placed.order.id(), address()).await.unwrap();
        (order, placed.guest_token.unwrap())
    }

    pub async fn paid_order(&self) -> Order {
        let order = self.priced_order().await;
        let gateway_order_id = order.payment().gateway_order_id.clone().unwrap();
        let sig = MockPaymentGateway::sign(&gateway_order_id, "pay_1");
        self.service.verify_payment(order.id(), &gateway_order_id, "pay_1", &sig).await.unwrap()
    }
}
