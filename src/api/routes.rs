use actix_web::{web, HttpResponse};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::{require_admin, require_staff, GatewayCaller};
use super::error::ApiError;
use super::AppState;
use crate::domain::checkout::{CheckoutRequest, PaymentCallback};
use crate::domain::order::{
    compute_delivery_metrics, simulate_shipment, BulkStatusUpdate, BulkTransitionResult, Order,
    OrderError, OrderStatus, OrderTimeline, Principal, ShipmentEvent, TrackingView,
    TransitionContext,
};

// ============================================================================
// Routes
// ============================================================================

/// Register every API route. `bulk-status` is registered ahead of the
/// `{order_id}` routes so the literal segment wins.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/tracking/{tracking_number}", web::get().to(track_shipment))
        .route("/orders/bulk-status", web::patch().to(bulk_update_status))
        .route("/orders/{order_id}", web::get().to(get_order))
        .route("/orders/{order_id}/tracking", web::get().to(order_timeline))
        .route("/orders/{order_id}/status", web::patch().to(update_status))
        .route("/orders/{order_id}/simulate", web::get().to(simulate))
        .route("/metrics/delivery", web::get().to(delivery_metrics))
        .route("/automated-updates", web::post().to(run_automated_updates))
        .route("/checkout", web::post().to(checkout))
        .route("/payments/callback", web::post().to(payment_callback))
        .route("/outbox/dead-letters", web::get().to(dead_letters));
}

// ============================================================================
// Request / Response Bodies
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateBody {
    pub status: OrderStatus,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub estimated_delivery: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
}

impl StatusUpdateBody {
    fn context(&self, principal: &Principal) -> TransitionContext {
        let mut ctx = TransitionContext::by(principal);
        ctx.note = self.note.clone();
        ctx.carrier = self.carrier.clone();
        ctx.estimated_delivery = self.estimated_delivery;
        ctx.delivered_at = self.delivered_at;
        ctx
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkStatusBody {
    pub order_ids: Vec<Uuid>,
    #[serde(flatten)]
    pub update: StatusUpdateBody,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkStatusResponse {
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BulkTransitionResult>,
}

#[derive(Debug, Deserialize)]
pub struct DeliveryQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResponse {
    pub order_id: Uuid,
    pub tracking_number: Option<String>,
    pub events: Vec<ShipmentEvent>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn load_order(state: &AppState, order_id: Uuid) -> Result<Order, ApiError> {
    Ok(state
        .engine
        .store()
        .get(order_id)
        .await
        .map_err(OrderError::from)?
        .ok_or_else(|| OrderError::order_not_found(order_id))?)
}

/// GET /tracking/{tracking_number} (public)
async fn track_shipment(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let tracking_number = path.into_inner();
    let order = state
        .engine
        .store()
        .find_by_tracking_number(&tracking_number)
        .await
        .map_err(OrderError::from)?
        .ok_or(OrderError::NotFound {
            entity: "tracking number",
            id: tracking_number,
        })?;

    let view = TrackingView::of(&order, state.clock.now())?;
    Ok(HttpResponse::Ok().json(view))
}

/// GET /orders/{order_id} (owner or staff)
async fn get_order(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let order = load_order(&state, path.into_inner()).await?;
    order.ensure_visible_to(&principal)?;
    Ok(HttpResponse::Ok().json(order))
}

/// GET /orders/{order_id}/tracking (owner or staff)
async fn order_timeline(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let order = load_order(&state, path.into_inner()).await?;
    order.ensure_visible_to(&principal)?;
    Ok(HttpResponse::Ok().json(OrderTimeline::of(&order, state.clock.now())))
}

/// PATCH /orders/{order_id}/status (staff)
async fn update_status(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<Uuid>,
    body: web::Json<StatusUpdateBody>,
) -> Result<HttpResponse, ApiError> {
    require_staff(&principal)?;
    let body = body.into_inner();
    let outcome = state
        .engine
        .transition(path.into_inner(), body.status, body.context(&principal))
        .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// PATCH /orders/bulk-status (admin)
async fn bulk_update_status(
    state: web::Data<AppState>,
    principal: Principal,
    body: web::Json<BulkStatusBody>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&principal)?;
    let body = body.into_inner();
    if body.order_ids.is_empty() {
        return Err(ApiError::validation("orderIds must not be empty"));
    }

    let results = state
        .engine
        .bulk_transition(BulkStatusUpdate {
            context: body.update.context(&principal),
            status: body.update.status,
            order_ids: body.order_ids,
        })
        .await;

    let succeeded = results.iter().filter(|r| r.success).count();
    Ok(HttpResponse::Ok().json(BulkStatusResponse {
        succeeded,
        failed: results.len() - succeeded,
        results,
    }))
}

/// GET /metrics/delivery?start=&end= (admin)
async fn delivery_metrics(
    state: web::Data<AppState>,
    principal: Principal,
    query: web::Query<DeliveryQuery>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&principal)?;
    let start = parse_bound("start", query.start.as_deref(), start_of_day())?;
    let end = parse_bound("end", query.end.as_deref(), end_of_day())?;

    let metrics = compute_delivery_metrics(state.engine.store().as_ref(), start, end).await?;
    Ok(HttpResponse::Ok().json(metrics))
}

/// POST /automated-updates (admin)
async fn run_automated_updates(
    state: web::Data<AppState>,
    principal: Principal,
) -> Result<HttpResponse, ApiError> {
    require_admin(&principal)?;
    tracing::info!(requested_by = %principal.label(), "Manual sweep requested");
    let report = state.sweeper.run().await?;
    Ok(HttpResponse::Ok().json(report))
}

/// GET /orders/{order_id}/simulate (admin)
async fn simulate(
    state: web::Data<AppState>,
    principal: Principal,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&principal)?;
    let order = load_order(&state, path.into_inner()).await?;
    let events = simulate_shipment(&order, state.clock.now())?;
    Ok(HttpResponse::Ok().json(SimulationResponse {
        order_id: order.id,
        tracking_number: order.tracking_number().map(str::to_string),
        events,
    }))
}

/// POST /checkout (authenticated customer)
async fn checkout(
    state: web::Data<AppState>,
    principal: Principal,
    body: web::Json<CheckoutRequest>,
) -> Result<HttpResponse, ApiError> {
    let outcome = state.checkout.checkout(&principal, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(outcome))
}

/// POST /payments/callback (payment gateway)
async fn payment_callback(
    state: web::Data<AppState>,
    _gateway: GatewayCaller,
    body: web::Json<PaymentCallback>,
) -> Result<HttpResponse, ApiError> {
    let outcome = state.checkout.handle_payment_callback(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// GET /outbox/dead-letters?limit= (admin)
async fn dead_letters(
    state: web::Data<AppState>,
    principal: Principal,
    query: web::Query<LimitQuery>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&principal)?;
    let limit = query.limit.unwrap_or(50).min(500);
    let letters = state
        .engine
        .store()
        .dead_letters(limit)
        .await
        .map_err(OrderError::from)?;
    Ok(HttpResponse::Ok().json(letters))
}

// ============================================================================
// Helpers
// ============================================================================

fn start_of_day() -> NaiveTime {
    NaiveTime::MIN
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN)
}

/// RFC 3339 timestamp, or a bare `YYYY-MM-DD` taken at `day_time` UTC
fn parse_bound(name: &str, raw: Option<&str>, day_time: NaiveTime) -> Result<DateTime<Utc>, ApiError> {
    let raw = raw
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| ApiError::validation(format!("query parameter `{}` is required", name)))?;

    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|date| date.and_time(day_time).and_utc())
        .map_err(|_| ApiError::validation(format!("`{}` must be a date or RFC 3339 timestamp", name)))
}
