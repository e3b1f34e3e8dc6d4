//! HTTP surface over [`CheckoutService`].
//!
//! Callers are identified from the request, never from its body: a bearer
//! token is resolved through the session service, otherwise the caller is a
//! guest who may present the token of one order in `X-Guest-Token`.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::auth::{Principal, SessionResolver};
use crate::domain::aggregates::{Cart, CartLine, CheckoutStage, GuestContact, Order, ShippingAddress};
use crate::domain::value_objects::{GuestToken, Money};
use crate::gateways::{LabelPageSize, Serviceability};
use crate::service::{Actor, CheckoutService, CouponQuote, PlacedOrder, ShippingEstimate};
use crate::{CheckoutError, ErrorKind};

pub const GUEST_TOKEN_HEADER: &str = "x-guest-token";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CheckoutService>,
    pub sessions: Arc<dyn SessionResolver>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "checkout-orchestrator"})) }))
        .route("/api/v1/orders", post(create_order))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/orders/:id/address", put(attach_address))
        .route("/api/v1/orders/:id/coupon", post(apply_coupon))
        .route("/api/v1/orders/:id/payment/verify", post(verify_payment))
        .route("/api/v1/orders/:id/cod", post(confirm_cod))
        .route("/api/v1/orders/:id/cancel", post(cancel_order))
        .route("/api/v1/orders/:id/shipment", post(create_shipment))
        .route("/api/v1/orders/:id/tracking/sync", post(sync_tracking))
        .route("/api/v1/orders/:id/delivered", post(mark_delivered))
        .route("/api/v1/orders/:id/label", get(shipment_label))
        .route("/api/v1/orders/:id/manifest", get(shipment_manifest))
        .route("/api/v1/shipping/estimate", post(estimate_shipping))
        .route("/api/v1/shipping/serviceability/:postal_code", get(check_serviceability))
        .route("/api/v1/coupons/validate", post(validate_coupon))
        .layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()).with_state(state)
}

// =============================================================================
// Caller
// =============================================================================

/// The authenticated caller of a request.
pub struct Caller(pub Actor);

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|v| !v.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = CheckoutError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(authorization) = header(parts, AUTHORIZATION.as_str()) {
            let token = authorization.strip_prefix("Bearer ").map(str::trim).ok_or(CheckoutError::Unauthenticated)?;
            return match state.sessions.current_user(token).await? {
                Some(Principal::Customer { user_id }) => Ok(Caller(Actor::Customer { user_id })),
                Some(Principal::Operator) => Ok(Caller(Actor::Operator)),
                None => Err(CheckoutError::Unauthenticated),
            };
        }
        Ok(Caller(Actor::Guest { token: header(parts, GUEST_TOKEN_HEADER).map(GuestToken::from_presented) }))
    }
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Serialize)] struct ErrorBody { error: String, kind: ErrorKind }

impl IntoResponse for CheckoutError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = match kind {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Trust => StatusCode::FORBIDDEN,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::ProviderFatal => StatusCode::BAD_GATEWAY,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(ErrorBody { error: self.to_string(), kind })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, CheckoutError>;

// =============================================================================
// Payloads
// =============================================================================

/// Order with its derived checkout stage.
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub stage: CheckoutStage,
    #[serde(flatten)]
    pub order: Order,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self { Self { stage: order.stage(), order } }
}

/// A freshly created order. Guests get their access token exactly once, here.
#[derive(Debug, Serialize)]
pub struct PlacedOrderResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guest_token: Option<String>,
    #[serde(flatten)]
    pub order: OrderResponse,
}

impl From<PlacedOrder> for PlacedOrderResponse {
    fn from(placed: PlacedOrder) -> Self {
        Self { guest_token: placed.guest_token.map(|t| t.as_str().to_string()), order: placed.order.into() }
    }
}

#[derive(Debug, Deserialize)] pub struct CreateOrderRequest { pub lines: Vec<CartLine>, #[serde(default)] pub contact: Option<GuestContact> }
#[derive(Debug, Deserialize)] pub struct EstimateRequest { pub postal_code: String, pub lines: Vec<CartLine> }
#[derive(Debug, Deserialize)] pub struct ValidateCouponRequest { pub code: String, pub cart_total: Money }
#[derive(Debug, Deserialize)] pub struct ApplyCouponRequest { pub coupon_id: Uuid }
#[derive(Debug, Deserialize)] pub struct LabelParams { pub page_size: Option<LabelPageSize> }
#[derive(Debug, Serialize)] pub struct DocumentResponse { pub url: String }

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub gateway_order_id: String,
    pub payment_id: String,
    pub signature: String,
}

// =============================================================================
// Handlers
// =============================================================================

async fn create_order(State(s): State<AppState>, Caller(actor): Caller, Json(r): Json<CreateOrderRequest>) -> Result<(StatusCode, Json<PlacedOrderResponse>), CheckoutError> {
    let placed = s.service.create_order_from_cart(actor.owner_for_new_order(r.contact), &Cart::from_lines(r.lines)).await?;
    Ok((StatusCode::CREATED, Json(placed.into())))
}

async fn get_order(State(s): State<AppState>, Caller(actor): Caller, Path(id): Path<Uuid>) -> ApiResult<OrderResponse> {
    Ok(Json(s.service.authorize(id, &actor).await?.into()))
}

async fn attach_address(State(s): State<AppState>, Caller(actor): Caller, Path(id): Path<Uuid>, Json(address): Json<ShippingAddress>) -> ApiResult<OrderResponse> {
    s.service.authorize(id, &actor).await?;
    Ok(Json(s.service.attach_shipping_address(id, address).await?.into()))
}

async fn apply_coupon(State(s): State<AppState>, Caller(actor): Caller, Path(id): Path<Uuid>, Json(r): Json<ApplyCouponRequest>) -> ApiResult<OrderResponse> {
    s.service.authorize(id, &actor).await?;
    Ok(Json(s.service.apply_coupon(r.coupon_id, id).await?.into()))
}

async fn verify_payment(State(s): State<AppState>, Caller(actor): Caller, Path(id): Path<Uuid>, Json(r): Json<VerifyPaymentRequest>) -> ApiResult<OrderResponse> {
    s.service.authorize(id, &actor).await?;
    Ok(Json(s.service.verify_payment(id, &r.gateway_order_id, &r.payment_id, &r.signature).await?.into()))
}

async fn confirm_cod(State(s): State<AppState>, Caller(actor): Caller, Path(id): Path<Uuid>) -> ApiResult<OrderResponse> {
    s.service.authorize(id, &actor).await?;
    Ok(Json(s.service.confirm_cash_on_delivery(id).await?.into()))
}

async fn cancel_order(State(s): State<AppState>, Caller(actor): Caller, Path(id): Path<Uuid>) -> ApiResult<OrderResponse> {
    Ok(Json(s.service.cancel_order(id, actor).await?.into()))
}

async fn create_shipment(State(s): State<AppState>, Caller(actor): Caller, Path(id): Path<Uuid>) -> ApiResult<OrderResponse> {
    actor.ensure_operator(id)?;
    Ok(Json(s.service.create_shipment(id).await?.into()))
}

async fn sync_tracking(State(s): State<AppState>, Caller(actor): Caller, Path(id): Path<Uuid>) -> ApiResult<OrderResponse> {
    actor.ensure_operator(id)?;
    Ok(Json(s.service.sync_tracking(id).await?.into()))
}

async fn mark_delivered(State(s): State<AppState>, Caller(actor): Caller, Path(id): Path<Uuid>) -> ApiResult<OrderResponse> {
    actor.ensure_operator(id)?;
    Ok(Json(s.service.mark_delivered(id).await?.into()))
}

async fn shipment_label(State(s): State<AppState>, Caller(actor): Caller, Path(id): Path<Uuid>, Query(p): Query<LabelParams>) -> ApiResult<DocumentResponse> {
    actor.ensure_operator(id)?;
    let url = s.service.shipment_label(id, p.page_size.unwrap_or_default()).await?;
    Ok(Json(DocumentResponse { url }))
}

async fn shipment_manifest(State(s): State<AppState>, Caller(actor): Caller, Path(id): Path<Uuid>) -> ApiResult<DocumentResponse> {
    actor.ensure_operator(id)?;
    Ok(Json(DocumentResponse { url: s.service.shipment_manifest(id).await? }))
}

async fn estimate_shipping(State(s): State<AppState>, Json(r): Json<EstimateRequest>) -> ApiResult<ShippingEstimate> {
    Ok(Json(s.service.estimate_shipping(&r.postal_code, &Cart::from_lines(r.lines)).await?))
}

async fn check_serviceability(State(s): State<AppState>, Path(postal_code): Path<String>) -> Json<Serviceability> {
    Json(s.service.check_serviceability(&postal_code).await)
}

async fn validate_coupon(State(s): State<AppState>, Json(r): Json<ValidateCouponRequest>) -> ApiResult<CouponQuote> {
    Ok(Json(s.service.validate_coupon(&r.code, r.cart_total).await?))
}
