//! Shipment tracking. The public lookup by code exposes only the status and
//! the event history.

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use mercado_core::{OrderId, OrderStatus};

use super::{optional_text, required_text};
use crate::db::orders::Order;
use crate::db::tracking::TrackingEvent;
use crate::db::{OrderRepository, TrackingRepository, orders, tracking};
use crate::error::{AppError, ErrorBody, Result};
use crate::extract::AppJson;
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::state::AppState;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct NewTrackingEvent {
    /// Stored only if the order has no code yet.
    pub tracking_code: Option<String>,
    pub carrier: Option<String>,
    /// Carrier status label, e.g. `in_transit`.
    pub status: String,
    pub location: Option<String>,
    pub description: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TrackingView {
    pub order_status: OrderStatus,
    pub tracking_code: Option<String>,
    pub carrier: Option<String>,
    pub events: Vec<TrackingEvent>,
}

impl TrackingView {
    fn new(order: Order, events: Vec<TrackingEvent>) -> Self {
        Self {
            order_status: order.status,
            tracking_code: order.tracking_code,
            carrier: order.carrier,
            events,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders/{order_id}", get(for_order).post(add_event))
        .route("/code/{tracking_code}", get(by_code))
}

#[utoipa::path(
    post,
    path = "/tracking/orders/{order_id}",
    tag = "tracking",
    params(("order_id" = i32, Path, description = "Order ID")),
    request_body = NewTrackingEvent,
    responses(
        (status = 201, description = "Event recorded", body = TrackingEvent),
        (status = 404, description = "Order not found", body = ErrorBody),
        (status = 409, description = "Tracking code used by another order", body = ErrorBody),
    )
)]
pub async fn add_event(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(order_id): Path<OrderId>,
    AppJson(request): AppJson<NewTrackingEvent>,
) -> Result<(StatusCode, AppJson<TrackingEvent>)> {
    let status = required_text("status", &request.status, 60)?;
    let description = required_text("description", &request.description, 500)?;
    let location = optional_text("location", request.location.as_deref(), 120)?;
    let code = optional_text("tracking_code", request.tracking_code.as_deref(), 60)?;
    let carrier = optional_text("carrier", request.carrier.as_deref(), 60)?;

    let mut tx = state.pool().begin().await?;
    orders::lock(&mut tx, order_id).await?;
    if code.is_some() || carrier.is_some() {
        orders::set_tracking(&mut tx, order_id, code.as_deref(), carrier.as_deref()).await?;
    }
    let event = tracking::append(&mut tx, order_id, &status, location.as_deref(), &description).await?;
    tx.commit().await?;

    info!(order_id = %order_id, status = %event.status, admin_id = %admin.id, "Tracking event added");
    Ok((StatusCode::CREATED, AppJson(event)))
}

#[utoipa::path(
    get,
    path = "/tracking/orders/{order_id}",
    tag = "tracking",
    params(("order_id" = i32, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Tracking history", body = TrackingView),
        (status = 404, description = "Not found", body = ErrorBody),
    )
)]
pub async fn for_order(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(order_id): Path<OrderId>,
) -> Result<AppJson<TrackingView>> {
    let order = OrderRepository::new(state.pool())
        .get(order_id)
        .await?
        .filter(|order| order.user_id == user.id || user.is_admin())
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;
    let events = TrackingRepository::new(state.pool()).events(order.id).await?;
    Ok(AppJson(TrackingView::new(order, events)))
}

#[utoipa::path(
    get,
    path = "/tracking/code/{tracking_code}",
    tag = "tracking",
    params(("tracking_code" = String, Path, description = "Carrier tracking code")),
    responses(
        (status = 200, description = "Tracking history", body = TrackingView),
        (status = 404, description = "Unknown code", body = ErrorBody),
    )
)]
pub async fn by_code(
    State(state): State<AppState>,
    Path(tracking_code): Path<String>,
) -> Result<AppJson<TrackingView>> {
    let order = OrderRepository::new(state.pool())
        .get_by_tracking_code(tracking_code.trim())
        .await?
        .ok_or_else(|| AppError::NotFound("Tracking code not found".to_string()))?;
    let events = TrackingRepository::new(state.pool()).events(order.id).await?;
    Ok(AppJson(TrackingView::new(order, events)))
}
