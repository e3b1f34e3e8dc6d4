//! Carrier status text to [`ShippingStatus`].

use crate::domain::aggregates::ShippingStatus;

const STATUS_TABLE: &[(&str, ShippingStatus)] = &[
    ("pending", ShippingStatus::Pending),
    ("order placed", ShippingStatus::Pending),
    ("not picked", ShippingStatus::Pending),
    ("manifested", ShippingStatus::Created),
    ("booked", ShippingStatus::Created),
    ("created", ShippingStatus::Created),
    ("pickup scheduled", ShippingStatus::Created),
    ("pickup generated", ShippingStatus::Created),
    ("picked up", ShippingStatus::PickedUp),
    ("pickup done", ShippingStatus::PickedUp),
    ("shipped", ShippingStatus::PickedUp),
    ("in transit", ShippingStatus::InTransit),
    ("reached at destination", ShippingStatus::InTransit),
    ("reached destination hub", ShippingStatus::InTransit),
    ("out for delivery", ShippingStatus::OutForDelivery),
    ("delivered", ShippingStatus::Delivered),
    ("undelivered", ShippingStatus::Failed),
    ("delivery failed", ShippingStatus::Failed),
    ("failed", ShippingStatus::Failed),
    ("lost", ShippingStatus::Failed),
    ("cancelled", ShippingStatus::Cancelled),
    ("canceled", ShippingStatus::Cancelled),
];

/// Maps free-text carrier status through the fixed table. Text the table
/// does not know becomes [`ShippingStatus::Unknown`].
pub fn map_carrier_status(text: &str) -> ShippingStatus {
    let normalized = normalize(text);
    STATUS_TABLE
        .iter()
        .find(|(key, _)| *key == normalized)
        .map_or(ShippingStatus::Unknown, |(_, status)| *status)
}

fn normalize(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_statuses() {
        assert_eq!(map_carrier_status("In Transit"), ShippingStatus::InTransit);
        assert_eq!(map_carrier_status("OUT_FOR_DELIVERY"), ShippingStatus::OutForDelivery);
        assert_eq!(map_carrier_status("  picked-up "), ShippingStatus::PickedUp);
        assert_eq!(map_carrier_status("Delivered"), ShippingStatus::Delivered);
        assert_eq!(map_carrier_status("Canceled"), ShippingStatus::Cancelled);
    }

    #[test]
    fn test_unknown_status_is_explicit() {
        assert_eq!(map_carrier_status("RTO Delivered"), ShippingStatus::Unknown);
        assert_eq!(map_carrier_status(""), ShippingStatus::Unknown);
    }
}
