//! Logistics provider client.
//!
//! Every call wraps its payload in the provider's `data` envelope together
//! with the access token and secret. Provider responses are inconsistent
//! (`"status": "success"` vs `"status": true`, payloads keyed by pincode, by
//! AWB or by row number), so each operation normalises its response here and
//! callers only ever see [`ProviderResult`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::aggregates::{ShippingAddress, ShippingStatus, TrackingUpdate};
use crate::domain::value_objects::Money;
use super::status::map_carrier_status;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider answered and said no.
    #[error("logistics provider failed: {0}")]
    Failed(String),
    /// The provider could not be reached or answered with garbage.
    #[error("logistics provider unreachable: {0}")]
    Transport(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PaymentMode { Prepaid, Cod }

impl PaymentMode {
    fn as_wire(&self) -> &'static str {
        match self { Self::Prepaid => "Prepaid", Self::Cod => "COD" }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions { pub length_cm: u32, pub width_cm: u32, pub height_cm: u32 }

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Parcel { pub weight_kg: Decimal, pub dimensions: Dimensions }

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Serviceability {
    pub postal_code: String,
    pub serviceable: bool,
    pub cod_available: bool,
    pub carriers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateRequest {
    pub origin: String,
    pub destination: String,
    pub parcel: Parcel,
    pub payment_mode: PaymentMode,
    pub declared_value: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierRate { pub carrier: String, pub rate: Money, pub estimated_days: Option<u32> }

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipmentLine { pub name: String, pub sku: String, pub units: u32, pub unit_price: Money }

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipmentRequest {
    /// Internal order number; the client adds a per-attempt suffix.
    pub order_number: String,
    pub order_date: DateTime<Utc>,
    pub address: ShippingAddress,
    pub lines: Vec<ShipmentLine>,
    pub total: Money,
    pub payment_mode: PaymentMode,
    pub parcel: Parcel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedShipment {
    pub awb: String,
    pub carrier: Option<String>,
    pub shipment_id: Option<String>,
    /// Reference actually sent to the provider.
    pub reference: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum LabelPageSize {
    #[default]
    A4,
    #[serde(rename = "4x6")]
    Label4x6,
}

impl LabelPageSize {
    fn as_wire(&self) -> &'static str {
        match self { Self::A4 => "A4", Self::Label4x6 => "4x6" }
    }
}

#[async_trait]
pub trait ShippingGateway: Send + Sync {
    fn provider_name(&self) -> &str;
    async fn check_serviceability(&self, postal_code: &str) -> ProviderResult<Serviceability>;
    async fn get_rate(&self, request: &RateRequest) -> ProviderResult<Vec<CarrierRate>>;
    async fn create_shipment(&self, request: &ShipmentRequest) -> ProviderResult<CreatedShipment>;
    async fn track_shipment(&self, awb: &str) -> ProviderResult<TrackingUpdate>;
    async fn cancel_shipment(&self, awbs: &[String]) -> ProviderResult<()>;
    /// Returns the URL of the rendered label document.
    async fn get_label(&self, awbs: &[String], page_size: LabelPageSize) -> ProviderResult<String>;
    /// Returns the URL of the rendered manifest document.
    async fn generate_manifest(&self, awbs: &[String]) -> ProviderResult<String>;
}

/// Provider-side reference for one creation attempt. The provider
/// de-duplicates by this value, so each attempt gets its own suffix while
/// keeping the order number as a traceable prefix.
pub fn shipment_reference(order_number: &str, attempt_at: DateTime<Utc>) -> String {
    format!("{}-{}", order_number, attempt_at.timestamp_millis())
}

#[derive(Debug, Clone)]
pub struct ShippingGatewayConfig {
    pub base_url: String,
    pub access_token: String,
    pub secret_key: String,
    pub pickup_address_id: String,
    pub return_address_id: String,
    pub connect_timeout: Duration,
    pub timeout: Duration,
}

pub struct HttpShippingGateway {
    client: Client,
    config: ShippingGatewayConfig,
}

impl HttpShippingGateway {
    pub fn new(config: ShippingGatewayConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Posts `payload` inside the credential envelope and returns the raw body.
    async fn post(&self, path: &str, mut payload: Map<String, Value>) -> ProviderResult<Value> {
        payload.insert("access_token".into(), Value::String(self.config.access_token.clone()));
        payload.insert("secret_key".into(), Value::String(self.config.secret_key.clone()));
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path);

        let response = self
            .client
            .post(&url)
            .json(&json!({ "data": payload }))
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(path, status = %status, "Logistics provider returned HTTP error");
            return Err(ProviderError::Transport(format!("HTTP {}", status)));
        }
        let body = response
            .json::<Value>()
            .await
            .map_err(|e| ProviderError::Transport(format!("invalid JSON: {}", e)))?;
        debug!(path, "Logistics provider responded");
        Ok(body)
    }
}

fn object(pairs: Value) -> Map<String, Value> {
    match pairs {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[async_trait]
impl ShippingGateway for HttpShippingGateway {
    fn provider_name(&self) -> &str { "ithink" }

    async fn check_serviceability(&self, postal_code: &str) -> ProviderResult<Serviceability> {
        let body = self.post("api_v3/pincode/check.json", object(json!({ "pincode": postal_code }))).await?;
        normalize_serviceability(&body, postal_code)
    }

    async fn get_rate(&self, request: &RateRequest) -> ProviderResult<Vec<CarrierRate>> {
        let dims = request.parcel.dimensions;
        let payload = object(json!({
            "from_pincode": request.origin,
            "to_pincode": request.destination,
            "shipping_weight_kg": request.parcel.weight_kg.to_string(),
            "shipping_length_cms": dims.length_cm,
            "shipping_width_cms": dims.width_cm,
            "shipping_height_cms": dims.height_cm,
            "order_type": "forward",
            "payment_method": request.payment_mode.as_wire().to_lowercase(),
            "product_mrp": request.declared_value.amount(),
        }));
        let body = self.post("api_v3/rate/check.json", payload).await?;
        normalize_rates(&body)
    }

    async fn create_shipment(&self, request: &ShipmentRequest) -> ProviderResult<CreatedShipment> {
        let reference = shipment_reference(&request.order_number, Utc::now());
        let a = &request.address;
        let dims = request.parcel.dimensions;
        let products: Vec<Value> = request
            .lines
            .iter()
            .map(|l| json!({
                "product_name": l.name,
                "product_sku": l.sku,
                "product_quantity": l.units,
                "product_price": l.unit_price.amount(),
            }))
            .collect();
        let cod_amount = match request.payment_mode {
            PaymentMode::Cod => request.total.amount(),
            PaymentMode::Prepaid => 0,
        };
        let payload = object(json!({
            "shipments": [{
                "order": reference,
                "order_date": request.order_date.format("%d-%m-%Y").to_string(),
                "total_amount": request.total.amount(),
                "name": a.full_name,
                "add": a.street,
                "pin": a.postal_code,
                "city": a.city,
                "state": a.state,
                "country": a.country,
                "phone": a.phone,
                "email": a.email,
                "products": products,
                "shipment_length": dims.length_cm,
                "shipment_width": dims.width_cm,
                "shipment_height": dims.height_cm,
                "weight": request.parcel.weight_kg.to_string(),
                "payment_mode": request.payment_mode.as_wire(),
                "cod_amount": cod_amount,
                "return_address_id": self.config.return_address_id,
            }],
            "pickup_address_id": self.config.pickup_address_id,
            "order_type": "forward",
        }));
        let body = self.post("api_v3/order/add.json", payload).await?;
        normalize_created_shipment(&body, reference)
    }

    async fn track_shipment(&self, awb: &str) -> ProviderResult<TrackingUpdate> {
        let body = self.post("api_v3/order/track.json", object(json!({ "awb_number_list": awb }))).await?;
        normalize_tracking(&body, awb)
    }

    async fn cancel_shipment(&self, awbs: &[String]) -> ProviderResult<()> {
        let body = self.post("api_v3/order/cancel.json", object(json!({ "awb_numbers": awbs.join(",") }))).await?;
        normalize_rows_ok(&body)
    }

    async fn get_label(&self, awbs: &[String], page_size: LabelPageSize) -> ProviderResult<String> {
        let payload = object(json!({
            "awb_numbers": awbs.join(","),
            "page_size": page_size.as_wire(),
            "display_cod_prepaid": "1",
        }));
        let body = self.post("api_v3/shipping/label.json", payload).await?;
        normalize_document_url(&body)
    }

    async fn generate_manifest(&self, awbs: &[String]) -> ProviderResult<String> {
        let body = self.post("api_v3/shipping/manifest.json", object(json!({ "awb_numbers": awbs.join(",") }))).await?;
        normalize_document_url(&body)
    }
}

// ---------------------------------------------------------------------------
// Response normalisation
// ---------------------------------------------------------------------------

/// `"success"` (any case) or `true`.
fn is_success(v: &Value) -> bool {
    match v.get("status") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("success"),
        _ => false,
    }
}

fn provider_message(v: &Value) -> String {
    ["html_message", "message", "remark", "error"]
        .iter()
        .filter_map(|k| v.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty() && !s.eq_ignore_ascii_case("success"))
        .unwrap_or("unknown provider error")
        .to_string()
}

fn envelope_ok(v: &Value) -> ProviderResult<&Value> {
    if !is_success(v) {
        return Err(ProviderError::Failed(provider_message(v)));
    }
    v.get("data").ok_or_else(|| ProviderError::Transport("response has no data".into()))
}

fn str_field<'a>(v: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().filter_map(|k| v.get(*k).and_then(Value::as_str)).find(|s| !s.is_empty())
}

/// Accepts `120`, `120.5` or `"120.50"`.
fn lenient_money(v: &Value) -> Option<Money> {
    match v {
        Value::Number(n) => n.to_string().parse::<Decimal>().ok().map(Money::from_decimal),
        Value::String(s) => s.trim().parse::<Decimal>().ok().map(Money::from_decimal),
        _ => None,
    }
}

fn is_yes(v: Option<&Value>) -> bool {
    match v {
        Some(Value::String(s)) => s.eq_ignore_ascii_case("y") || s.eq_ignore_ascii_case("yes"),
        Some(Value::Bool(b)) => *b,
        _ => false,
    }
}

pub(crate) fn normalize_serviceability(v: &Value, postal_code: &str) -> ProviderResult<Serviceability> {
    let data = envelope_ok(v)?;
    let per_carrier = data.get(postal_code).and_then(Value::as_object);
    let mut carriers = Vec::new();
    let mut cod_available = false;
    for (carrier, flags) in per_carrier.into_iter().flatten() {
        let prepaid = is_yes(flags.get("prepaid"));
        let cod = is_yes(flags.get("cod"));
        if prepaid || cod { carriers.push(carrier.clone()); }
        cod_available |= cod;
    }
    Ok(Serviceability { postal_code: postal_code.to_string(), serviceable: !carriers.is_empty(), cod_available, carriers })
}

pub(crate) fn normalize_rates(v: &Value) -> ProviderResult<Vec<CarrierRate>> {
    let data = envelope_ok(v)?;
    let rows: Vec<&Value> = match data {
        Value::Array(rows) => rows.iter().collect(),
        Value::Object(map) => map.values().collect(),
        _ => vec![],
    };
    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let rate = row.get("rate").and_then(lenient_money)?;
            let carrier = str_field(row, &["logistic_name", "logistics_name", "courier"]).unwrap_or("unknown");
            let estimated_days = row.get("delivery_tat").and_then(|t| match t {
                Value::Number(n) => n.as_u64().map(|d| d as u32),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            });
            Some(CarrierRate { carrier: carrier.to_string(), rate, estimated_days })
        })
        .collect())
}

/// Rows come back keyed by position (`{"1": {...}}`) or as a single object.
fn first_row(data: &Value) -> Option<&Value> {
    match data {
        Value::Object(map) if map.contains_key("status") || map.contains_key("waybill") => Some(data),
        Value::Object(map) => map.values().next(),
        Value::Array(rows) => rows.first(),
        _ => None,
    }
}

pub(crate) fn normalize_created_shipment(v: &Value, reference: String) -> ProviderResult<CreatedShipment> {
    let data = envelope_ok(v)?;
    let row = first_row(data).ok_or_else(|| ProviderError::Transport("no shipment row in response".into()))?;
    if row.get("status").is_some() && !is_success(row) {
        return Err(ProviderError::Failed(provider_message(row)));
    }
    let awb = str_field(row, &["waybill", "awb", "awb_number"])
        .ok_or_else(|| ProviderError::Failed(provider_message(row)))?;
    Ok(CreatedShipment {
        awb: awb.to_string(),
        carrier: str_field(row, &["logistic_name", "logistics_name"]).map(String::from),
        shipment_id: str_field(row, &["refnum", "shipment_id"]).map(String::from)
            .or_else(|| row.get("refnum").and_then(Value::as_u64).map(|n| n.to_string())),
        reference,
    })
}

pub(crate) fn normalize_tracking(v: &Value, awb: &str) -> ProviderResult<TrackingUpdate> {
    let data = envelope_ok(v)?;
    let row = data.get(awb).ok_or_else(|| ProviderError::Failed(format!("no tracking for {}", awb)))?;
    if let Some(msg) = row.get("message").and_then(Value::as_str) {
        if !msg.eq_ignore_ascii_case("success") {
            return Err(ProviderError::Failed(msg.to_string()));
        }
    }
    let status_text = str_field(row, &["current_status", "status"]).unwrap_or_default();
    let status = map_carrier_status(status_text);
    if status == ShippingStatus::Unknown {
        warn!(awb, status_text, "Unrecognised carrier status");
    }
    let null = Value::Null;
    let scan = row.get("last_scan_details").unwrap_or(&null);
    let location = str_field(scan, &["scan_location", "location"]).map(String::from);
    let message = str_field(scan, &["status_remark", "remark", "status"]).unwrap_or(status_text).to_string();
    let estimated_delivery = str_field(row, &["expected_delivery_date", "edd"]).and_then(parse_provider_date);
    Ok(TrackingUpdate { status, message, location, estimated_delivery })
}

fn parse_provider_date(s: &str) -> Option<NaiveDate> {
    let date_part = s.split_whitespace().next()?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%d-%m-%Y"))
        .ok()
}

pub(crate) fn normalize_rows_ok(v: &Value) -> ProviderResult<()> {
    let data = envelope_ok(v)?;
    let failed: Vec<String> = match data {
        Value::Object(map) => map.values().filter(|row| row.get("status").is_some() && !is_success(row)).map(provider_message).collect(),
        _ => vec![],
    };
    if failed.is_empty() { Ok(()) } else { Err(ProviderError::Failed(failed.join("; "))) }
}

pub(crate) fn normalize_document_url(v: &Value) -> ProviderResult<String> {
    if !is_success(v) {
        return Err(ProviderError::Failed(provider_message(v)));
    }
    str_field(v, &["file_name", "url"])
        .or_else(|| v.get("data").and_then(|d| str_field(d, &["file_name", "url"])))
        .map(String::from)
        .ok_or_else(|| ProviderError::Transport("response has no document url".into()))
}
