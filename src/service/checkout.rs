//! Checkout service.
//!
//! Drives an order from cart to delivery. Every transition on an existing
//! order runs under that order's lock, reloads the record, applies the
//! aggregate method and saves with a version check. Provider calls made
//! while pricing degrade to fallbacks; payment creation and verification
//! failures always reach the caller.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use super::fulfillment::{JobSender, PostPaymentJob};
use super::locks::OrderLocks;
use crate::domain::aggregates::coupon;
use crate::domain::aggregates::{
    AppliedCoupon, Cart, CheckoutStage, Coupon, CouponRejection, GuestContact, LineItem, Order, OrderError, Owner,
    Shipment, ShippingAddress, ShippingStatus, StatusEntry,
};
use crate::domain::pricing::{self, ShippingTier};
use crate::domain::value_objects::{CouponCode, GuestToken, Money, OrderNumber, PackSize};
use crate::gateways::{
    Dimensions, ExternalOrderRequest, LabelPageSize, Parcel, PaymentGateway, PaymentMode, RateRequest, Serviceability,
    ShipmentLine, ShipmentRequest, ShippingGateway,
};
use crate::notify::{Notifier, Recipient};
use crate::repository::{Catalog, CouponRepository, OrderRepository, Redemption, RepositoryError};
use crate::{CheckoutError, Result};

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub order_number_prefix: String,
    pub currency: String,
    /// Pickup postal code used for rate lookups.
    pub origin_postal_code: String,
    pub unit_weight_kg: Decimal,
    pub package: Dimensions,
    pub admin_email: Option<String>,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            order_number_prefix: "ORD".into(),
            currency: "INR".into(),
            origin_postal_code: "110001".into(),
            unit_weight_kg: Decimal::new(5, 1),
            package: Dimensions { length_cm: 20, width_cm: 15, height_cm: 10 },
            admin_email: None,
        }
    }
}

pub struct Collaborators {
    pub catalog: Arc<dyn Catalog>,
    pub orders: Arc<dyn OrderRepository>,
    pub coupons: Arc<dyn CouponRepository>,
    pub payments: Arc<dyn PaymentGateway>,
    pub shipping: Arc<dyn ShippingGateway>,
    pub notifier: Arc<dyn Notifier>,
}

/// Who is asking, as established from the session or the guest token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Customer { user_id: Uuid },
    /// Anonymous caller, possibly holding the token of one guest order.
    Guest { token: Option<GuestToken> },
    Operator,
}

impl Actor {
    pub fn is_operator(&self) -> bool { matches!(self, Actor::Operator) }

    /// Signed-in customers own what they order; everyone else orders as a guest.
    pub fn owner_for_new_order(&self, contact: Option<GuestContact>) -> Owner {
        match self {
            Actor::Customer { user_id } => Owner::Customer { user_id: *user_id },
            Actor::Guest { .. } | Actor::Operator => Owner::Guest { contact },
        }
    }

    pub fn may_act_on(&self, order: &Order) -> bool {
        match (self, order.owner()) {
            (Actor::Operator, _) => true,
            (Actor::Customer { user_id }, Owner::Customer { user_id: owner }) => user_id == owner,
            (Actor::Guest { token: Some(token) }, Owner::Guest { .. }) => order.admits_guest(token),
            _ => false,
        }
    }

    pub fn ensure_operator(&self, order_id: Uuid) -> Result<()> {
        if self.is_operator() { Ok(()) } else { Err(CheckoutError::Forbidden(order_id)) }
    }
}

/// A new order and, for guest orders, the token that grants access to it.
/// The token is shown once; only its digest is stored.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: Order,
    pub guest_token: Option<GuestToken>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CouponQuote { pub coupon_id: Uuid, pub code: CouponCode, pub discount: Money }

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShippingEstimate { pub items_subtotal: Money, pub tier: ShippingTier, pub shipping_price: Money }

pub struct CheckoutService {
    catalog: Arc<dyn Catalog>,
    orders: Arc<dyn OrderRepository>,
    coupons: Arc<dyn CouponRepository>,
    payments: Arc<dyn PaymentGateway>,
    shipping: Arc<dyn ShippingGateway>,
    notifier: Arc<dyn Notifier>,
    locks: OrderLocks,
    jobs: JobSender,
    settings: CheckoutSettings,
}

impl CheckoutService {
    pub fn new(deps: Collaborators, settings: CheckoutSettings, jobs: JobSender) -> Self {
        Self {
            catalog: deps.catalog, orders: deps.orders, coupons: deps.coupons,
            payments: deps.payments, shipping: deps.shipping, notifier: deps.notifier,
            locks: OrderLocks::new(), jobs, settings,
        }
    }

    pub fn settings(&self) -> &CheckoutSettings { &self.settings }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order> {
        self.orders.get(order_id).await?.ok_or(CheckoutError::OrderNotFound(order_id))
    }

    /// Loads the order if `actor` may act on it.
    pub async fn authorize(&self, order_id: Uuid, actor: &Actor) -> Result<Order> {
        let order = self.get_order(order_id).await?;
        if !actor.may_act_on(&order) {
            warn!(order_id = %order_id, actor = ?actor, "Caller may not act on order");
            return Err(CheckoutError::Forbidden(order_id));
        }
        Ok(order)
    }

    // -------------------------------------------------------------------------
    // Cart to order
    // -------------------------------------------------------------------------

    /// Snapshots the cart against the catalog, reserves stock and opens a
    /// provisional payment order. Nothing is persisted if the gateway fails.
    pub async fn create_order_from_cart(&self, owner: Owner, cart: &Cart) -> Result<PlacedOrder> {
        let items = self.resolve_items(cart).await?;
        let now = Utc::now();
        let number = OrderNumber::generate(&self.settings.order_number_prefix, now);
        let mut order = Order::create(number, owner, items, now)?;
        let guest_token = order.grant_guest_access();

        self.reserve_stock(order.items()).await?;
        let gateway_order_id = match self.open_gateway_order(&order).await {
            Ok(id) => id,
            Err(e) => {
                self.release_stock(order.items()).await;
                return Err(e);
            }
        };
        let amount = order.total();
        order.issue_gateway_order(gateway_order_id, amount)?;
        if let Err(e) = self.orders.insert(&order).await {
            self.release_stock(order.items()).await;
            return Err(e.into());
        }

        info!(order_id = %order.id(), order_number = %order.order_number(), items_subtotal = %order.items_subtotal(), "Order created from cart");
        self.publish(&mut order).await;
        Ok(PlacedOrder { order, guest_token })
    }

    /// Re-resolves every line from the catalog; client prices are never used.
    async fn resolve_items(&self, cart: &Cart) -> Result<Vec<LineItem>> {
        cart.validate_for_checkout()?;
        let mut items = Vec::with_capacity(cart.lines().len());
        for line in cart.lines() {
            let product = self
                .catalog
                .get_product(line.product_id)
                .await?
                .filter(|p| p.is_available())
                .ok_or(CheckoutError::ProductNotFound(line.product_id))?;
            items.push(LineItem {
                unit_price: pricing::unit_price(&product, line.pack),
                product_id: product.id,
                external_id: product.external_id,
                name: product.name,
                category: product.category,
                quantity: line.quantity,
                pack: line.pack,
            });
        }
        Ok(items)
    }

    async fn reserve_stock(&self, items: &[LineItem]) -> Result<()> {
        for (i, item) in items.iter().enumerate() {
            if let Err(e) = self.catalog.adjust_stock(item.product_id, -i64::from(item.quantity)).await {
                self.release_stock(&items[..i]).await;
                return Err(e.into());
            }
        }
        Ok(())
    }

    async fn release_stock(&self, items: &[LineItem]) {
        for item in items {
            if let Err(e) = self.catalog.adjust_stock(item.product_id, i64::from(item.quantity)).await {
                error!(product_id = %item.product_id, quantity = item.quantity, error = %e, "Failed to restore stock");
            }
        }
    }

    async fn open_gateway_order(&self, order: &Order) -> Result<String> {
        let mut notes = BTreeMap::new();
        notes.insert("order_id".to_string(), order.id().to_string());
        let request = ExternalOrderRequest {
            amount_minor: order.total().to_minor_units(),
            currency: self.settings.currency.clone(),
            receipt: order.order_number().to_string(),
            notes,
        };
        self.payments.create_external_order(request).await.map_err(|e| {
            error!(order_id = %order.id(), error = %e, "Payment order creation failed");
            CheckoutError::from(e)
        })
    }

    /// Issues a fresh payment order for the current total; the previous one
    /// is superseded.
    async fn reissue_gateway_order(&self, order: &mut Order) -> Result<()> {
        let gateway_order_id = self.open_gateway_order(order).await?;
        let amount = order.total();
        order.issue_gateway_order(gateway_order_id, amount)?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Shipping price
    // -------------------------------------------------------------------------

    fn parcel_for(&self, items: &[LineItem]) -> Parcel {
        let units = items.iter().fold(0u32, |acc, i| acc.saturating_add(i.quantity.saturating_mul(i.pack.units())));
        Parcel { weight_kg: self.settings.unit_weight_kg * Decimal::from(units.max(1)), dimensions: self.settings.package }
    }

    async fn quote_shipping(&self, destination: &str, items: &[LineItem], items_subtotal: Money) -> Money {
        let quote = match pricing::shipping_tier(items_subtotal) {
            ShippingTier::CarrierRate => self.carrier_quote(destination, items, items_subtotal).await,
            ShippingTier::Free | ShippingTier::Reduced => None,
        };
        pricing::shipping_price(items_subtotal, quote)
    }

    /// Cheapest positive carrier rate, or `None` when the lookup fails.
    async fn carrier_quote(&self, destination: &str, items: &[LineItem], declared_value: Money) -> Option<Money> {
        let request = RateRequest {
            origin: self.settings.origin_postal_code.clone(),
            destination: destination.to_string(),
            parcel: self.parcel_for(items),
            payment_mode: PaymentMode::Prepaid,
            declared_value,
        };
        match self.shipping.get_rate(&request).await {
            Ok(rates) => {
                let cheapest = rates.into_iter().map(|r| r.rate).filter(|r| *r > Money::ZERO).min();
                if cheapest.is_none() {
                    warn!(destination, "No usable carrier rate, using fallback shipping price");
                }
                cheapest
            }
            Err(e) => {
                warn!(destination, error = %e, "Carrier rate lookup failed, using fallback shipping price");
                None
            }
        }
    }

    /// Pre-address estimate using the same tiered rule as the final price.
    pub async fn estimate_shipping(&self, postal_code: &str, cart: &Cart) -> Result<ShippingEstimate> {
        let items = self.resolve_items(cart).await?;
        let items_subtotal = pricing::items_subtotal(&items);
        let shipping_price = self.quote_shipping(postal_code, &items, items_subtotal).await;
        Ok(ShippingEstimate { items_subtotal, tier: pricing::shipping_tier(items_subtotal), shipping_price })
    }

    /// Never blocks checkout: a failed lookup reports the code as serviceable.
    pub async fn check_serviceability(&self, postal_code: &str) -> Serviceability {
        match self.shipping.check_serviceability(postal_code).await {
            Ok(s) => s,
            Err(e) => {
                warn!(postal_code, error = %e, "Serviceability check failed, assuming serviceable");
                Serviceability { postal_code: postal_code.to_string(), serviceable: true, cod_available: false, carriers: vec![] }
            }
        }
    }

    pub async fn attach_shipping_address(&self, order_id: Uuid, address: ShippingAddress) -> Result<Order> {
        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.get_order(order_id).await?;
        address.validate().map_err(|e| OrderError::InvalidAddress(e.to_string()))?;

        let shipping_price = self.quote_shipping(&address.postal_code, order.items(), order.items_subtotal()).await;
        order.attach_address(address, shipping_price)?;
        self.reissue_gateway_order(&mut order).await?;
        self.orders.save(&mut order).await?;

        info!(order_id = %order_id, shipping_price = %order.shipping_price(), total = %order.total(), "Shipping address attached");
        self.publish(&mut order).await;
        Ok(order)
    }

    // -------------------------------------------------------------------------
    // Coupons
    // -------------------------------------------------------------------------

    pub async fn validate_coupon(&self, code: &str, cart_total: Money) -> Result<CouponQuote> {
        let code = CouponCode::new(code).map_err(|_| CouponRejection::NotFound)?;
        let found = self.coupons.find_by_code(&code).await?;
        quote_coupon(found.as_ref(), cart_total)
    }

    pub async fn apply_coupon(&self, coupon_id: Uuid, order_id: Uuid) -> Result<Order> {
        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.get_order(order_id).await?;
        let found = self.coupons.get(coupon_id).await?;
        let quote = quote_coupon(found.as_ref(), order.items_subtotal())?;
        if let Some(c) = &found {
            if !c.applies_to(order.items().iter().map(|i| i.category.as_deref())) {
                return Err(CouponRejection::NotApplicable.into());
            }
        }

        let priced = order.shipping_address().is_some();
        order.apply_coupon(AppliedCoupon { coupon_id, code: quote.code.clone(), discount: quote.discount })?;
        if priced {
            self.reissue_gateway_order(&mut order).await?;
        }
        self.orders.save(&mut order).await?;

        info!(order_id = %order_id, coupon = %quote.code, discount = %quote.discount, total = %order.total(), "Coupon applied");
        self.publish(&mut order).await;
        Ok(order)
    }

    /// Counts the coupon once per order. Runs after the order is committed.
    ///
    /// The usage cap is checked when the coupon is applied and enforced here.
    /// Two orders can both apply the last use before either pays; the later
    /// one keeps its discount because the customer has already paid that
    /// total, but `used_count` never passes the cap.
    async fn redeem_coupon(&self, order: &Order) {
        let Some(applied) = order.coupon() else { return };
        match self.coupons.record_redemption(applied.coupon_id, order.id()).await {
            Ok(Redemption::Recorded) => info!(order_id = %order.id(), coupon = %applied.code, "Coupon redeemed"),
            Ok(Redemption::AlreadyRecorded) => {}
            Ok(Redemption::LimitReached) => {
                warn!(order_id = %order.id(), coupon = %applied.code, "Coupon limit reached after payment, discount honoured");
            }
            Err(e) => error!(order_id = %order.id(), coupon = %applied.code, error = %e, "Failed to record coupon use"),
        }
    }

    // -------------------------------------------------------------------------
    // Payment
    // -------------------------------------------------------------------------

    /// Confirms a payment on the strength of its signature alone. A valid
    /// repeat returns the paid order without re-running side effects.
    pub async fn verify_payment(&self, order_id: Uuid, gateway_order_id: &str, payment_id: &str, signature: &str) -> Result<Order> {
        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.get_order(order_id).await?;

        if order.payment().is_paid {
            return self.replayed_verification(order, gateway_order_id, payment_id, signature);
        }
        let stage = order.stage();
        if matches!(stage, CheckoutStage::Cancelled | CheckoutStage::PaymentFailed) {
            return Err(OrderError::InvalidTransition { stage, action: "verify payment" }.into());
        }

        if !self.payments.verify(gateway_order_id, payment_id, signature) {
            self.fail_payment(&mut order, "signature mismatch").await?;
            return Err(CheckoutError::SignatureMismatch);
        }
        if let Err(e) = order.check_gateway_order(gateway_order_id) {
            self.fail_payment(&mut order, &e.to_string()).await?;
            return Err(e.into());
        }

        order.mark_paid(payment_id.to_string(), signature.to_string(), Utc::now())?;
        match self.orders.save(&mut order).await {
            Ok(()) => {}
            // Another instance committed first; if that was this payment, answer as a replay.
            Err(RepositoryError::Conflict { .. }) => {
                let current = self.get_order(order_id).await?;
                if current.payment().is_paid {
                    return self.replayed_verification(current, gateway_order_id, payment_id, signature);
                }
                return Err(CheckoutError::Conflict(order_id));
            }
            Err(e) => return Err(e.into()),
        }
        info!(order_id = %order_id, payment_id, total = %order.total(), "Payment verified");

        self.redeem_coupon(&order).await;
        self.enqueue_post_payment(order_id);
        self.publish(&mut order).await;
        Ok(order)
    }

    fn replayed_verification(&self, order: Order, gateway_order_id: &str, payment_id: &str, signature: &str) -> Result<Order> {
        let payment = order.payment();
        let same_payment = payment.gateway_order_id.as_deref() == Some(gateway_order_id)
            && payment.payment_id.as_deref() == Some(payment_id);
        if same_payment && self.payments.verify(gateway_order_id, payment_id, signature) {
            info!(order_id = %order.id(), payment_id, "Payment already verified");
            return Ok(order);
        }
        warn!(order_id = %order.id(), payment_id, "Rejected verification against an already paid order");
        Err(CheckoutError::SignatureMismatch)
    }

    async fn fail_payment(&self, order: &mut Order, reason: &str) -> Result<()> {
        let released = order.mark_payment_failed(reason)?;
        self.orders.save(order).await?;
        self.release_stock(&released).await;
        warn!(order_id = %order.id(), reason, "Payment verification rejected, order cancelled");
        self.publish(order).await;
        Ok(())
    }

    pub async fn confirm_cash_on_delivery(&self, order_id: Uuid) -> Result<Order> {
        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.get_order(order_id).await?;
        order.confirm_cash_on_delivery()?;
        self.orders.save(&mut order).await?;
        info!(order_id = %order_id, total = %order.total(), "Cash on delivery confirmed");

        self.redeem_coupon(&order).await;
        self.enqueue_post_payment(order_id);
        self.publish(&mut order).await;
        Ok(order)
    }

    fn enqueue_post_payment(&self, order_id: Uuid) {
        if self.jobs.send(PostPaymentJob { order_id }).is_err() {
            error!(order_id = %order_id, "Post-payment worker is not running; create the shipment manually");
        }
    }

    // -------------------------------------------------------------------------
    // Cancellation
    // -------------------------------------------------------------------------

    pub async fn cancel_order(&self, order_id: Uuid, actor: Actor) -> Result<Order> {
        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.get_order(order_id).await?;
        if !actor.may_act_on(&order) {
            return Err(CheckoutError::Forbidden(order_id));
        }

        let awb = order.shipping().map(|s| s.awb.clone());
        let released = order.cancel()?;
        self.orders.save(&mut order).await?;
        self.release_stock(&released).await;

        if let Some(awb) = awb {
            if let Err(e) = self.shipping.cancel_shipment(std::slice::from_ref(&awb)).await {
                warn!(order_id = %order_id, awb = %awb, error = %e, "Carrier cancellation failed");
            }
        }
        info!(order_id = %order_id, actor = ?actor, "Order cancelled");
        self.publish(&mut order).await;
        Ok(order)
    }

    // -------------------------------------------------------------------------
    // Fulfillment
    // -------------------------------------------------------------------------

    /// Creates the carrier shipment for a paid order. Safe to repeat: an
    /// order that already has a shipment is returned unchanged.
    pub async fn create_shipment(&self, order_id: Uuid) -> Result<Order> {
        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.get_order(order_id).await?;
        if let Some(existing) = order.shipping() {
            info!(order_id = %order_id, awb = %existing.awb, "Shipment already exists");
            return Ok(order);
        }

        let stage = order.stage();
        let not_ready = OrderError::InvalidTransition { stage, action: "create shipment" };
        if stage != CheckoutStage::Paid {
            return Err(not_ready.into());
        }
        let address = order.shipping_address().cloned().ok_or(not_ready)?;
        let request = ShipmentRequest {
            order_number: order.order_number().to_string(),
            order_date: order.created_at(),
            address,
            lines: order.items().iter().map(shipment_line).collect(),
            total: order.total(),
            payment_mode: if order.payment().is_paid { PaymentMode::Prepaid } else { PaymentMode::Cod },
            parcel: self.parcel_for(order.items()),
        };

        let created = self.shipping.create_shipment(&request).await.map_err(|e| {
            error!(order_id = %order_id, error = %e, "Shipment creation failed");
            CheckoutError::from(e)
        })?;
        let now = Utc::now();
        order.attach_shipment(Shipment {
            provider: self.shipping.provider_name().to_string(),
            awb: created.awb.clone(),
            carrier: created.carrier,
            shipment_id: created.shipment_id,
            status: ShippingStatus::Created,
            last_tracked_at: None,
            history: vec![StatusEntry { status: ShippingStatus::Created, message: "Shipment created".into(), location: None, timestamp: now }],
            label_url: None,
            estimated_delivery: None,
        })?;
        if let Err(e) = self.orders.save(&mut order).await {
            error!(order_id = %order_id, awb = %created.awb, error = %e, "Shipment created at carrier but not recorded");
            return Err(e.into());
        }

        info!(order_id = %order_id, awb = %created.awb, reference = %created.reference, "Shipment created");
        self.publish(&mut order).await;
        Ok(order)
    }

    pub async fn sync_tracking(&self, order_id: Uuid) -> Result<Order> {
        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.get_order(order_id).await?;
        let awb = awb_of(&order, "sync tracking")?;

        let update = self.shipping.track_shipment(&awb).await.map_err(|e| {
            warn!(order_id = %order_id, awb = %awb, error = %e, "Tracking lookup failed");
            CheckoutError::from(e)
        })?;
        let changed = order.record_tracking(update, Utc::now())?;
        self.orders.save(&mut order).await?;

        info!(order_id = %order_id, awb = %awb, changed, stage = %order.stage(), "Tracking synced");
        self.publish(&mut order).await;
        Ok(order)
    }

    pub async fn mark_delivered(&self, order_id: Uuid) -> Result<Order> {
        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.get_order(order_id).await?;
        order.mark_delivered(Utc::now())?;
        self.orders.save(&mut order).await?;
        info!(order_id = %order_id, "Order delivered");
        self.publish(&mut order).await;
        Ok(order)
    }

    /// Fetches the label document and records its URL on the order.
    pub async fn shipment_label(&self, order_id: Uuid, page_size: LabelPageSize) -> Result<String> {
        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.get_order(order_id).await?;
        let awb = awb_of(&order, "print label")?;
        let url = self.shipping.get_label(std::slice::from_ref(&awb), page_size).await?;
        order.record_label(url.clone())?;
        self.orders.save(&mut order).await?;
        Ok(url)
    }

    pub async fn shipment_manifest(&self, order_id: Uuid) -> Result<String> {
        let order = self.get_order(order_id).await?;
        let awb = awb_of(&order, "generate manifest")?;
        Ok(self.shipping.generate_manifest(std::slice::from_ref(&awb)).await?)
    }

    // -------------------------------------------------------------------------
    // Notifications
    // -------------------------------------------------------------------------

    /// Sends the admin and customer confirmations. Each is attempted even if
    /// the other fails; the first failure is returned.
    pub async fn send_confirmations(&self, order_id: Uuid) -> Result<()> {
        let order = self.get_order(order_id).await?;
        let mut recipients = Vec::with_capacity(2);
        if let Some(admin) = &self.settings.admin_email {
            recipients.push(Recipient::Admin(admin.clone()));
        }
        match order.contact_email() {
            Some(email) => recipients.push(Recipient::Customer(email.to_string())),
            None => warn!(order_id = %order_id, "Order has no contact email"),
        }

        let mut first_error = None;
        for recipient in recipients {
            if let Err(e) = self.notifier.send_order_confirmation(&order, recipient).await {
                error!(order_id = %order_id, error = %e, "Order confirmation failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    async fn publish(&self, order: &mut Order) {
        let events = order.take_events();
        if events.is_empty() { return; }
        if let Err(e) = self.notifier.publish_events(&events).await {
            warn!(order_id = %order.id(), error = %e, "Failed to publish order events");
        }
    }
}

fn quote_coupon(found: Option<&Coupon>, cart_total: Money) -> Result<CouponQuote> {
    let discount = coupon::validate(found, Utc::now(), cart_total)?;
    let coupon = found.ok_or(CouponRejection::NotFound)?;
    Ok(CouponQuote { coupon_id: coupon.id, code: coupon.code.clone(), discount })
}

fn awb_of(order: &Order, action: &'static str) -> Result<String> {
    order
        .shipping()
        .map(|s| s.awb.clone())
        .ok_or_else(|| OrderError::InvalidTransition { stage: order.stage(), action }.into())
}

fn shipment_line(item: &LineItem) -> ShipmentLine {
    let name = match item.pack {
        PackSize::Single => item.name.clone(),
        pack => format!("{} (Pack of {})", item.name, pack.units()),
    };
    ShipmentLine { name, sku: item.external_id.clone(), units: item.quantity, unit_price: item.unit_price }
}
