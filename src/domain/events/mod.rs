//! Domain events
use serde::Serialize;
use uuid::Uuid;
use crate::domain::aggregates::ShippingStatus;
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: Uuid, order_number: String, items_subtotal: Money },
    AddressAttached { order_id: Uuid, shipping_price: Money, total: Money },
    PaymentInitiated { order_id: Uuid, gateway_order_id: String, amount: Money },
    Paid { order_id: Uuid, payment_id: String, total: Money },
    PaymentFailed { order_id: Uuid, reason: String },
    CashOnDeliveryConfirmed { order_id: Uuid, total: Money },
    ShipmentCreated { order_id: Uuid, awb: String },
    TrackingUpdated { order_id: Uuid, awb: String, status: ShippingStatus },
    Delivered { order_id: Uuid },
    Cancelled { order_id: Uuid },
}

impl OrderEvent {
    pub fn order_id(&self) -> Uuid {
        match self {
            Self::Created { order_id, .. } | Self::AddressAttached { order_id, .. } | Self::PaymentInitiated { order_id, .. }
            | Self::Paid { order_id, .. } | Self::PaymentFailed { order_id, .. } | Self::CashOnDeliveryConfirmed { order_id, .. }
            | Self::ShipmentCreated { order_id, .. } | Self::TrackingUpdated { order_id, .. } | Self::Delivered { order_id }
            | Self::Cancelled { order_id } => *order_id,
        }
    }

    /// Subject suffix used when publishing, e.g. `orders.events.paid`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::AddressAttached { .. } => "address_attached",
            Self::PaymentInitiated { .. } => "payment_initiated",
            Self::Paid { .. } => "paid",
            Self::PaymentFailed { .. } => "payment_failed",
            Self::CashOnDeliveryConfirmed { .. } => "cod_confirmed",
            Self::ShipmentCreated { .. } => "shipment_created",
            Self::TrackingUpdated { .. } => "tracking_updated",
            Self::Delivered { .. } => "delivered",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}
