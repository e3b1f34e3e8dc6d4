//! Recording test doubles for the provider clients.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::payment::{sign, verify_signature, ExternalOrderRequest, PaymentGateway, PaymentGatewayError};
use super::shipping::{
    CarrierRate, CreatedShipment, LabelPageSize, ProviderError, ProviderResult, RateRequest, Serviceability,
    ShipmentRequest, ShippingGateway,
};
use crate::domain::aggregates::{ShippingStatus, TrackingUpdate};
use crate::domain::value_objects::Money;

pub const MOCK_SECRET: &str = "s3cr3t";

#[derive(Default)]
pub struct MockPaymentGateway {
    requests: RwLock<Vec<ExternalOrderRequest>>,
    fail_on_create: RwLock<bool>,
}

impl MockPaymentGateway {
    pub fn new() -> Self { Self::default() }

    pub async fn set_fail_on_create(&self, fail: bool) {
        *self.fail_on_create.write().await = fail;
    }

    pub async fn requests(&self) -> Vec<ExternalOrderRequest> {
        self.requests.read().await.clone()
    }

    /// Signature the real gateway would hand the client for this payment.
    pub fn sign(gateway_order_id: &str, payment_id: &str) -> String {
        sign(gateway_order_id, payment_id, MOCK_SECRET)
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_external_order(&self, request: ExternalOrderRequest) -> Result<String, PaymentGatewayError> {
        if *self.fail_on_create.read().await {
            return Err(PaymentGatewayError::Rejected { status: 503, message: "Mock gateway down".into() });
        }
        let mut requests = self.requests.write().await;
        requests.push(request);
        Ok(format!("order_{}", requests.len()))
    }

    fn verify(&self, gateway_order_id: &str, payment_id: &str, signature: &str) -> bool {
        verify_signature(gateway_order_id, payment_id, signature, MOCK_SECRET)
    }
}

pub struct MockShippingGateway {
    /// `None` makes rate lookups fail.
    rate: RwLock<Option<Money>>,
    tracking: RwLock<ShippingStatus>,
    fail_on_create: RwLock<bool>,
    /// Applied once, to the next shipment creation.
    create_delay: RwLock<Option<Duration>>,
    created: RwLock<Vec<ShipmentRequest>>,
    cancelled: RwLock<Vec<String>>,
}

impl Default for MockShippingGateway {
    fn default() -> Self {
        Self {
            rate: RwLock::new(Some(Money::new(72))),
            tracking: RwLock::new(ShippingStatus::InTransit),
            fail_on_create: RwLock::new(false),
            create_delay: RwLock::new(None),
            created: RwLock::new(vec![]),
            cancelled: RwLock::new(vec![]),
        }
    }
}

impl MockShippingGateway {
    pub fn new() -> Self { Self::default() }

    pub async fn set_rate(&self, rate: Option<Money>) { *self.rate.write().await = rate; }
    pub async fn set_tracking(&self, status: ShippingStatus) { *self.tracking.write().await = status; }
    pub async fn set_fail_on_create(&self, fail: bool) { *self.fail_on_create.write().await = fail; }
    pub async fn delay_next_create(&self, delay: Duration) { *self.create_delay.write().await = Some(delay); }
    pub async fn created_count(&self) -> usize { self.created.read().await.len() }
    pub async fn cancelled(&self) -> Vec<String> { self.cancelled.read().await.clone() }
}

#[async_trait]
impl ShippingGateway for MockShippingGateway {
    fn provider_name(&self) -> &str { "mock" }

    async fn check_serviceability(&self, postal_code: &str) -> ProviderResult<Serviceability> {
        let serviceable = !postal_code.starts_with('0');
        Ok(Serviceability {
            postal_code: postal_code.to_string(),
            serviceable,
            cod_available: serviceable,
            carriers: if serviceable { vec!["Delhivery".into()] } else { vec![] },
        })
    }

    async fn get_rate(&self, _request: &RateRequest) -> ProviderResult<Vec<CarrierRate>> {
        match *self.rate.read().await {
            Some(rate) => Ok(vec![CarrierRate { carrier: "Delhivery".into(), rate, estimated_days: Some(4) }]),
            None => Err(ProviderError::Transport("Mock rate timeout".into())),
        }
    }

    async fn create_shipment(&self, request: &ShipmentRequest) -> ProviderResult<CreatedShipment> {
        let delay = self.create_delay.write().await.take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_on_create.read().await {
            return Err(ProviderError::Failed("Mock pickup unavailable".into()));
        }
        let mut created = self.created.write().await;
        created.push(request.clone());
        Ok(CreatedShipment {
            awb: format!("AWB{}", created.len()),
            carrier: Some("Delhivery".into()),
            shipment_id: Some(created.len().to_string()),
            reference: format!("{}-{}", request.order_number, created.len()),
        })
    }

    async fn track_shipment(&self, _awb: &str) -> ProviderResult<TrackingUpdate> {
        let status = *self.tracking.read().await;
        Ok(TrackingUpdate { status, message: format!("{:?}", status), location: Some("Pune Hub".into()), estimated_delivery: None })
    }

    async fn cancel_shipment(&self, awbs: &[String]) -> ProviderResult<()> {
        self.cancelled.write().await.extend_from_slice(awbs);
        Ok(())
    }

    async fn get_label(&self, awbs: &[String], _page_size: LabelPageSize) -> ProviderResult<String> {
        Ok(format!("https://labels.test/{}.pdf", awbs.join("_")))
    }

    async fn generate_manifest(&self, awbs: &[String]) -> ProviderResult<String> {
        Ok(format!("https://manifests.test/{}.pdf", awbs.join("_")))
    }
}
