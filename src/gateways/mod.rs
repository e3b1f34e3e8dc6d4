//! Clients for the external payment gateway and logistics provider.
pub mod payment;
pub mod shipping;
pub mod status;

pub use payment::{ExternalOrderRequest, HttpPaymentGateway, PaymentGateway, PaymentGatewayConfig, PaymentGatewayError};
pub use shipping::{
    CarrierRate, CreatedShipment, Dimensions, HttpShippingGateway, LabelPageSize, Parcel, PaymentMode, ProviderError,
    ProviderResult, RateRequest, Serviceability, ShipmentLine, ShipmentRequest, ShippingGateway, ShippingGatewayConfig,
};

#[cfg(test)]
pub(crate) mod mock;
