//! Order Aggregate
//!
//! The order record is mutated in place as address, shipping price, payment
//! and shipment data arrive. Money fields are recomputed and stored on every
//! change to any of their terms.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;
use crate::domain::events::OrderEvent;
use crate::domain::pricing;
use crate::domain::value_objects::{CouponCode, GuestToken, Money, OrderNumber, PackSize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    id: Uuid,
    order_number: OrderNumber,
    owner: Owner,
    items: Vec<LineItem>,
    items_subtotal: Money,
    shipping_price: Money,
    coupon: Option<AppliedCoupon>,
    total: Money,
    payment: Payment,
    shipping: Option<Shipment>,
    shipping_address: Option<ShippingAddress>,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
    /// Digest of the token a guest owner presents to act on the order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    guest_access: Option<String>,
    /// Optimistic-concurrency token, bumped by the repository on every save.
    version: u64,
    #[serde(skip)]
    events: Vec<OrderEvent>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Owner {
    Customer { user_id: Uuid },
    Guest { contact: Option<GuestContact> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestContact { pub name: String, pub email: String, pub phone: String }

/// Line item snapshot taken when the order is created. Later catalog price
/// changes never touch it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: Uuid,
    pub external_id: String,
    pub name: String,
    pub category: Option<String>,
    pub unit_price: Money,
    pub quantity: u32,
    pub pack: PackSize,
}

impl LineItem {
    pub fn line_total(&self) -> Money { self.unit_price * self.quantity }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedCoupon { pub coupon_id: Uuid, pub code: CouponCode, pub discount: Money }

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ShippingAddress {
    #[validate(length(min = 1, message = "full name is required"))]
    pub full_name: String,
    #[validate(email(message = "a valid email is required"))]
    pub email: String,
    #[validate(length(min = 10, max = 15, message = "phone must be 10-15 digits"))]
    pub phone: String,
    #[validate(length(min = 1, message = "street is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "city is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "state is required"))]
    pub state: String,
    #[validate(length(min = 4, max = 10, message = "postal code is invalid"))]
    pub postal_code: String,
    #[validate(length(min = 1, message = "country is required"))]
    pub country: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod { #[default] Gateway, CashOnDelivery }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus { #[default] Pending, Paid, Failed, Refunded }

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    /// The only gateway order id that may be verified.
    pub gateway_order_id: Option<String>,
    /// Amount the current gateway order was issued for.
    pub gateway_amount: Option<Money>,
    /// Earlier gateway order ids, kept so replays against them are recognised.
    pub superseded_gateway_order_ids: Vec<String>,
    pub payment_id: Option<String>,
    pub signature: Option<String>,
    pub transaction_id: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingStatus { Pending, Created, PickedUp, InTransit, OutForDelivery, Delivered, Failed, Cancelled, Unknown }

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub status: ShippingStatus,
    pub message: String,
    pub location: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    pub provider: String,
    pub awb: String,
    pub carrier: Option<String>,
    pub shipment_id: Option<String>,
    pub status: ShippingStatus,
    pub last_tracked_at: Option<DateTime<Utc>>,
    pub history: Vec<StatusEntry>,
    pub label_url: Option<String>,
    pub estimated_delivery: Option<NaiveDate>,
}

/// A freshly fetched carrier status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackingUpdate {
    pub status: ShippingStatus,
    pub message: String,
    pub location: Option<String>,
    pub estimated_delivery: Option<NaiveDate>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus { #[default] Processing, Confirmed, Shipped, Delivered, Cancelled }

/// Position in the checkout workflow, derived from the record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStage { Created, AddressAttached, PaymentInitiated, Paid, ShipmentCreated, Delivered, Cancelled, PaymentFailed }

impl std::fmt::Display for CheckoutStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created", Self::AddressAttached => "address_attached",
            Self::PaymentInitiated => "payment_initiated", Self::Paid => "paid",
            Self::ShipmentCreated => "shipment_created", Self::Delivered => "delivered",
            Self::Cancelled => "cancelled", Self::PaymentFailed => "payment_failed",
        };
        write!(f, "{}", s)
    }
}

impl Order {
    pub fn create(order_number: OrderNumber, owner: Owner, items: Vec<LineItem>, now: DateTime<Utc>) -> Result<Self, OrderError> {
        if items.is_empty() { return Err(OrderError::NoItems); }
        let mut order = Self {
            id: Uuid::now_v7(), order_number, owner, items,
            items_subtotal: Money::ZERO, shipping_price: Money::ZERO, coupon: None, total: Money::ZERO,
            payment: Payment::default(), shipping: None, shipping_address: None,
            status: OrderStatus::Processing, created_at: now, updated_at: now, delivered_at: None,
            guest_access: None, version: 0, events: vec![],
        };
        order.items_subtotal = pricing::items_subtotal(&order.items);
        order.recalculate();
        order.raise_event(OrderEvent::Created { order_id: order.id, order_number: order.order_number.to_string(), items_subtotal: order.items_subtotal });
        Ok(order)
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_number(&self) -> &OrderNumber { &self.order_number }
    pub fn owner(&self) -> &Owner { &self.owner }
    pub fn items(&self) -> &[LineItem] { &self.items }
    pub fn items_subtotal(&self) -> Money { self.items_subtotal }
    pub fn shipping_price(&self) -> Money { self.shipping_price }
    pub fn coupon(&self) -> Option<&AppliedCoupon> { self.coupon.as_ref() }
    pub fn coupon_discount(&self) -> Money { self.coupon.as_ref().map_or(Money::ZERO, |c| c.discount) }
    pub fn total(&self) -> Money { self.total }
    pub fn payment(&self) -> &Payment { &self.payment }
    pub fn shipping(&self) -> Option<&Shipment> { self.shipping.as_ref() }
    pub fn shipping_address(&self) -> Option<&ShippingAddress> { self.shipping_address.as_ref() }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn delivered_at(&self) -> Option<DateTime<Utc>> { self.delivered_at }
    pub fn version(&self) -> u64 { self.version }
    pub(crate) fn set_version(&mut self, version: u64) { self.version = version; }

    /// Issues a fresh access token for a guest-owned order; the previous one
    /// stops working. Customer orders get none.
    pub fn grant_guest_access(&mut self) -> Option<GuestToken> {
        if !matches!(self.owner, Owner::Guest { .. }) { return None; }
        let token = GuestToken::generate();
        self.guest_access = Some(token.digest());
        Some(token)
    }

    pub fn admits_guest(&self, token: &GuestToken) -> bool {
        matches!(self.owner, Owner::Guest { .. }) && self.guest_access.as_deref() == Some(token.digest().as_str())
    }

    /// Where customer notifications go: the guest contact or the address email.
    pub fn contact_email(&self) -> Option<&str> {
        match &self.owner {
            Owner::Guest { contact: Some(c) } => Some(c.email.as_str()),
            _ => self.shipping_address.as_ref().map(|a| a.email.as_str()),
        }
    }

    pub fn stage(&self) -> CheckoutStage {
        match self.status {
            OrderStatus::Cancelled if self.payment.status == PaymentStatus::Failed => return CheckoutStage::PaymentFailed,
            OrderStatus::Cancelled => return CheckoutStage::Cancelled,
            OrderStatus::Delivered => return CheckoutStage::Delivered,
            _ => {}
        }
        if self.is_payment_settled() {
            return if self.shipping.is_some() { CheckoutStage::ShipmentCreated } else { CheckoutStage::Paid };
        }
        match (&self.shipping_address, self.payment.gateway_amount) {
            (Some(_), Some(amount)) if amount == self.total => CheckoutStage::PaymentInitiated,
            (Some(_), _) => CheckoutStage::AddressAttached,
            (None, _) => CheckoutStage::Created,
        }
    }

    /// Paid through the gateway, or confirmed for cash on delivery.
    pub fn is_payment_settled(&self) -> bool {
        self.payment.is_paid
            || (self.payment.method == PaymentMethod::CashOnDelivery && self.status != OrderStatus::Processing)
    }

    fn ensure_pre_payment(&self, action: &'static str) -> Result<(), OrderError> {
        match self.stage() {
            CheckoutStage::Created | CheckoutStage::AddressAttached | CheckoutStage::PaymentInitiated => Ok(()),
            stage => Err(OrderError::InvalidTransition { stage, action }),
        }
    }

    pub fn attach_address(&mut self, address: ShippingAddress, shipping_price: Money) -> Result<(), OrderError> {
        self.ensure_pre_payment("attach address")?;
        address.validate().map_err(|e| OrderError::InvalidAddress(e.to_string()))?;
        if let Owner::Guest { contact } = &mut self.owner {
            *contact = Some(GuestContact { name: address.full_name.clone(), email: address.email.clone(), phone: address.phone.clone() });
        }
        self.shipping_address = Some(address);
        self.shipping_price = shipping_price;
        self.recalculate();
        self.raise_event(OrderEvent::AddressAttached { order_id: self.id, shipping_price, total: self.total });
        Ok(())
    }

    pub fn apply_coupon(&mut self, coupon: AppliedCoupon) -> Result<(), OrderError> {
        self.ensure_pre_payment("apply coupon")?;
        if coupon.discount > self.items_subtotal { return Err(OrderError::CouponExceedsSubtotal); }
        self.coupon = Some(coupon);
        self.recalculate();
        Ok(())
    }

    /// Records a newly issued gateway order; the previous id becomes stale.
    pub fn issue_gateway_order(&mut self, gateway_order_id: String, amount: Money) -> Result<(), OrderError> {
        self.ensure_pre_payment("issue payment order")?;
        if let Some(previous) = self.payment.gateway_order_id.replace(gateway_order_id.clone()) {
            if previous != gateway_order_id { self.payment.superseded_gateway_order_ids.push(previous); }
        }
        self.payment.gateway_amount = Some(amount);
        self.touch();
        self.raise_event(OrderEvent::PaymentInitiated { order_id: self.id, gateway_order_id, amount });
        Ok(())
    }

    /// Cross-checks a gateway order id presented for verification.
    pub fn check_gateway_order(&self, gateway_order_id: &str) -> Result<(), OrderError> {
        match self.payment.gateway_order_id.as_deref() {
            Some(current) if current == gateway_order_id => Ok(()),
            _ if self.payment.superseded_gateway_order_ids.iter().any(|s| s == gateway_order_id) => Err(OrderError::StaleGatewayOrder),
            _ => Err(OrderError::GatewayOrderMismatch),
        }
    }

    pub fn mark_paid(&mut self, payment_id: String, signature: String, now: DateTime<Utc>) -> Result<(), OrderError> {
        match self.stage() {
            CheckoutStage::PaymentInitiated => {}
            stage => return Err(OrderError::InvalidTransition { stage, action: "mark paid" }),
        }
        self.payment.method = PaymentMethod::Gateway;
        self.payment.status = PaymentStatus::Paid;
        self.payment.is_paid = true;
        self.payment.paid_at = Some(now);
        self.payment.transaction_id = Some(payment_id.clone());
        self.payment.payment_id = Some(payment_id.clone());
        self.payment.signature = Some(signature);
        self.status = OrderStatus::Confirmed;
        self.touch();
        self.raise_event(OrderEvent::Paid { order_id: self.id, payment_id, total: self.total });
        Ok(())
    }

    /// Terminal failure after a verification that could not be trusted.
    /// Returns the lines whose stock must be released.
    pub fn mark_payment_failed(&mut self, reason: impl Into<String>) -> Result<Vec<LineItem>, OrderError> {
        self.ensure_pre_payment("fail payment")?;
        self.payment.status = PaymentStatus::Failed;
        self.status = OrderStatus::Cancelled;
        self.touch();
        self.raise_event(OrderEvent::PaymentFailed { order_id: self.id, reason: reason.into() });
        Ok(self.items.clone())
    }

    pub fn confirm_cash_on_delivery(&mut self) -> Result<(), OrderError> {
        match self.stage() {
            CheckoutStage::AddressAttached | CheckoutStage::PaymentInitiated => {}
            stage => return Err(OrderError::InvalidTransition { stage, action: "confirm cash on delivery" }),
        }
        self.payment.method = PaymentMethod::CashOnDelivery;
        self.status = OrderStatus::Confirmed;
        self.touch();
        self.raise_event(OrderEvent::CashOnDeliveryConfirmed { order_id: self.id, total: self.total });
        Ok(())
    }

    pub fn attach_shipment(&mut self, shipment: Shipment) -> Result<(), OrderError> {
        match self.stage() {
            CheckoutStage::Paid => {}
            CheckoutStage::ShipmentCreated => return Err(OrderError::ShipmentAlreadyCreated),
            stage => return Err(OrderError::InvalidTransition { stage, action: "attach shipment" }),
        }
        let awb = shipment.awb.clone();
        self.shipping = Some(shipment);
        self.touch();
        self.raise_event(OrderEvent::ShipmentCreated { order_id: self.id, awb });
        Ok(())
    }

    /// Applies a tracking fetch. History is append-only and only grows when
    /// the status differs from the latest entry. Returns whether it grew.
    pub fn record_tracking(&mut self, update: TrackingUpdate, now: DateTime<Utc>) -> Result<bool, OrderError> {
        let stage = self.stage();
        let shipment = match (stage, self.shipping.as_mut()) {
            (CheckoutStage::ShipmentCreated | CheckoutStage::Delivered, Some(s)) => s,
            _ => return Err(OrderError::InvalidTransition { stage, action: "sync tracking" }),
        };
        shipment.last_tracked_at = Some(now);
        if update.estimated_delivery.is_some() { shipment.estimated_delivery = update.estimated_delivery; }
        let changed = shipment.history.last().map_or(true, |last| last.status != update.status);
        if changed {
            shipment.status = update.status;
            shipment.history.push(StatusEntry { status: update.status, message: update.message, location: update.location, timestamp: now });
            let awb = shipment.awb.clone();
            self.raise_event(OrderEvent::TrackingUpdated { order_id: self.id, awb, status: update.status });
            match update.status {
                ShippingStatus::Delivered if stage != CheckoutStage::Delivered => self.mark_delivered(now)?,
                ShippingStatus::PickedUp | ShippingStatus::InTransit | ShippingStatus::OutForDelivery if self.status == OrderStatus::Confirmed => {
                    self.status = OrderStatus::Shipped;
                }
                _ => {}
            }
        }
        self.touch();
        Ok(changed)
    }

    pub fn record_label(&mut self, label_url: String) -> Result<(), OrderError> {
        let stage = self.stage();
        let shipment = self.shipping.as_mut().ok_or(OrderError::InvalidTransition { stage, action: "record label" })?;
        shipment.label_url = Some(label_url);
        self.touch();
        Ok(())
    }

    pub fn mark_delivered(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        match self.stage() {
            CheckoutStage::ShipmentCreated => {}
            stage => return Err(OrderError::InvalidTransition { stage, action: "mark delivered" }),
        }
        self.status = OrderStatus::Delivered;
        self.delivered_at = Some(now);
        if self.payment.method == PaymentMethod::CashOnDelivery && !self.payment.is_paid {
            self.payment.status = PaymentStatus::Paid;
            self.payment.is_paid = true;
            self.payment.paid_at = Some(now);
        }
        if let Some(shipment) = self.shipping.as_mut() { shipment.status = ShippingStatus::Delivered; }
        self.touch();
        self.raise_event(OrderEvent::Delivered { order_id: self.id });
        Ok(())
    }

    /// Cancels from any state except delivered. Returns the lines whose
    /// stock must be restored.
    pub fn cancel(&mut self) -> Result<Vec<LineItem>, OrderError> {
        match self.stage() {
            CheckoutStage::Delivered => return Err(OrderError::CannotCancel),
            stage @ (CheckoutStage::Cancelled | CheckoutStage::PaymentFailed) => {
                return Err(OrderError::InvalidTransition { stage, action: "cancel" });
            }
            _ => {}
        }
        self.status = OrderStatus::Cancelled;
        if let Some(shipment) = self.shipping.as_mut() { shipment.status = ShippingStatus::Cancelled; }
        self.touch();
        self.raise_event(OrderEvent::Cancelled { order_id: self.id });
        Ok(self.items.clone())
    }

    fn recalculate(&mut self) {
        self.total = pricing::total(self.items_subtotal, self.shipping_price, self.coupon_discount());
        self.touch();
    }

    pub fn take_events(&mut self) -> Vec<OrderEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: OrderEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    NoItems,
    CannotCancel,
    InvalidTransition { stage: CheckoutStage, action: &'static str },
    InvalidAddress(String),
    CouponExceedsSubtotal,
    StaleGatewayOrder,
    GatewayOrderMismatch,
    ShipmentAlreadyCreated,
}
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoItems => write!(f, "No items"),
            Self::CannotCancel => write!(f, "Delivered orders cannot be cancelled"),
            Self::InvalidTransition { stage, action } => write!(f, "Cannot {} while order is {}", action, stage),
            Self::InvalidAddress(e) => write!(f, "Invalid shipping address: {}", e),
            Self::CouponExceedsSubtotal => write!(f, "Coupon discount exceeds items subtotal"),
            Self::StaleGatewayOrder => write!(f, "Payment order has been superseded"),
            Self::GatewayOrderMismatch => write!(f, "Payment order does not belong to this order"),
            Self::ShipmentAlreadyCreated => write!(f, "Shipment already created"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(price: i64, qty: u32, pack: PackSize) -> LineItem {
        LineItem { product_id: Uuid::new_v4(), external_id: "EXT".into(), name: "Soap".into(), category: None, unit_price: Money::new(price), quantity: qty, pack }
    }

    fn address() -> ShippingAddress {
        ShippingAddress {
            full_name: "Asha Rao".into(), email: "asha@example.com".into(), phone: "9876543210".into(),
            street: "12 MG Road".into(), city: "Pune".into(), state: "MH".into(), postal_code: "411001".into(), country: "India".into(),
        }
    }

    fn order() -> Order {
        Order::create(OrderNumber::generate("ORD", Utc::now()), Owner::Guest { contact: None },
            vec![item(100, 2, PackSize::Single), item(190, 1, PackSize::Two)], Utc::now()).unwrap()
    }

    fn paid_order() -> Order {
        let mut o = order();
        o.attach_address(address(), Money::new(50)).unwrap();
        o.issue_gateway_order("order_2".into(), o.total()).unwrap();
        o.mark_paid("pay_1".into(), "sig".into(), Utc::now()).unwrap();
        o
    }

    fn shipment() -> Shipment {
        Shipment { provider: "carrier".into(), awb: "AWB1".into(), carrier: Some("Delhivery".into()), shipment_id: None,
            status: ShippingStatus::Created, last_tracked_at: None, history: vec![], label_url: None, estimated_delivery: None }
    }

    #[test]
    fn test_order_totals_follow_terms() {
        let mut o = order();
        assert_eq!(o.items_subtotal(), Money::new(390));
        assert_eq!(o.total(), Money::new(390));
        assert_eq!(o.stage(), CheckoutStage::Created);

        o.attach_address(address(), Money::new(50)).unwrap();
        assert_eq!(o.total(), Money::new(440));
        assert_eq!(o.stage(), CheckoutStage::AddressAttached);

        o.apply_coupon(AppliedCoupon { coupon_id: Uuid::new_v4(), code: CouponCode::new("FLAT50").unwrap(), discount: Money::new(50) }).unwrap();
        assert_eq!(o.total(), Money::new(390));
        assert_eq!(o.total(), pricing::total(o.items_subtotal(), o.shipping_price(), o.coupon_discount()));
    }

    #[test]
    fn test_guest_contact_captured_from_address() {
        let mut o = order();
        o.attach_address(address(), Money::ZERO).unwrap();
        assert!(matches!(o.owner(), Owner::Guest { contact: Some(c) } if c.email == "asha@example.com"));
        assert_eq!(o.contact_email(), Some("asha@example.com"));
    }

    #[test]
    fn test_invalid_address_rejected() {
        let mut o = order();
        let mut bad = address();
        bad.email = "nope".into();
        assert!(matches!(o.attach_address(bad, Money::ZERO), Err(OrderError::InvalidAddress(_))));
        assert!(o.shipping_address().is_none());
    }

    #[test]
    fn test_over_discount_rejected() {
        let mut o = order();
        let coupon = AppliedCoupon { coupon_id: Uuid::new_v4(), code: CouponCode::new("BIG").unwrap(), discount: Money::new(391) };
        assert_eq!(o.apply_coupon(coupon), Err(OrderError::CouponExceedsSubtotal));
    }

    #[test]
    fn test_gateway_order_supersede() {
        let mut o = order();
        o.issue_gateway_order("order_1".into(), o.total()).unwrap();
        o.attach_address(address(), Money::new(50)).unwrap();
        o.issue_gateway_order("order_2".into(), o.total()).unwrap();
        assert_eq!(o.stage(), CheckoutStage::PaymentInitiated);
        assert_eq!(o.check_gateway_order("order_2"), Ok(()));
        assert_eq!(o.check_gateway_order("order_1"), Err(OrderError::StaleGatewayOrder));
        assert_eq!(o.check_gateway_order("order_9"), Err(OrderError::GatewayOrderMismatch));
    }

    #[test]
    fn test_paid_then_shipped_then_delivered() {
        let mut o = paid_order();
        assert_eq!(o.stage(), CheckoutStage::Paid);
        assert_eq!(o.status(), OrderStatus::Confirmed);
        assert!(o.payment().is_paid);

        o.attach_shipment(shipment()).unwrap();
        assert_eq!(o.attach_shipment(shipment()), Err(OrderError::ShipmentAlreadyCreated));
        assert_eq!(o.stage(), CheckoutStage::ShipmentCreated);

        o.mark_delivered(Utc::now()).unwrap();
        assert_eq!(o.stage(), CheckoutStage::Delivered);
        assert_eq!(o.cancel(), Err(OrderError::CannotCancel));
    }

    #[test]
    fn test_tracking_history_is_append_only() {
        let mut o = paid_order();
        o.attach_shipment(shipment()).unwrap();
        let update = TrackingUpdate { status: ShippingStatus::InTransit, message: "In Transit".into(), location: Some("Pune".into()), estimated_delivery: None };

        assert!(o.record_tracking(update.clone(), Utc::now()).unwrap());
        let first_sync = o.shipping().unwrap().last_tracked_at;
        assert!(!o.record_tracking(update, Utc::now()).unwrap());
        assert_eq!(o.shipping().unwrap().history.len(), 1);
        assert!(o.shipping().unwrap().last_tracked_at >= first_sync);
        assert_eq!(o.status(), OrderStatus::Shipped);

        let delivered = TrackingUpdate { status: ShippingStatus::Delivered, message: "Delivered".into(), location: None, estimated_delivery: None };
        assert!(o.record_tracking(delivered, Utc::now()).unwrap());
        assert_eq!(o.stage(), CheckoutStage::Delivered);
        assert!(o.delivered_at().is_some());
    }

    #[test]
    fn test_payment_failure_is_terminal() {
        let mut o = order();
        o.attach_address(address(), Money::new(50)).unwrap();
        let released = o.mark_payment_failed("signature mismatch").unwrap();
        assert_eq!(released.len(), 2);
        assert_eq!(o.stage(), CheckoutStage::PaymentFailed);
        assert_eq!(o.payment().status, PaymentStatus::Failed);
        assert!(o.mark_paid("pay".into(), "sig".into(), Utc::now()).is_err());
        assert!(o.cancel().is_err());
    }

    #[test]
    fn test_cash_on_delivery_settles_on_delivery() {
        let mut o = order();
        o.attach_address(address(), Money::new(50)).unwrap();
        o.confirm_cash_on_delivery().unwrap();
        assert_eq!(o.stage(), CheckoutStage::Paid);
        assert!(!o.payment().is_paid);
        o.attach_shipment(shipment()).unwrap();
        o.mark_delivered(Utc::now()).unwrap();
        assert!(o.payment().is_paid);
        assert_eq!(o.payment().status, PaymentStatus::Paid);
    }

    #[test]
    fn test_events_raised() {
        let mut o = paid_order();
        let events = o.take_events();
        assert!(matches!(events.first(), Some(OrderEvent::Created { .. })));
        assert!(events.iter().any(|e| matches!(e, OrderEvent::Paid { .. })));
        assert!(o.take_events().is_empty());
    }

    #[test]
    fn test_guest_access_bound_to_order() {
        let mut o = order();
        let token = o.grant_guest_access().unwrap();
        assert!(o.admits_guest(&token));
        assert!(!o.admits_guest(&GuestToken::generate()));
        assert!(!order().admits_guest(&token));

        let json = serde_json::to_string(&o).unwrap();
        assert!(!json.contains(token.as_str()));
        let restored: Order = serde_json::from_str(&json).unwrap();
        assert!(restored.admits_guest(&token));

        let mut owned = Order::create(OrderNumber::generate("ORD", Utc::now()), Owner::Customer { user_id: Uuid::new_v4() },
            vec![item(100, 1, PackSize::Single)], Utc::now()).unwrap();
        assert!(owned.grant_guest_access().is_none());
    }
}
