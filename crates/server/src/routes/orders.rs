//! Order routes: checkout, history, cancellation and admin status changes.

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
};

use mercado_core::OrderId;

use crate::db::orders::Order;
use crate::db::{OrderRepository, Page, Pagination};
use crate::error::{ErrorBody, Result};
use crate::extract::{AppJson, AppQuery};
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::services::orders::{OrderDetail, OrderService, PlaceOrder, StatusUpdate};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(checkout))
        .route("/{id}", get(show))
        .route("/{id}/cancel", post(cancel))
        .route("/{id}/status", patch(update_status))
}

#[utoipa::path(
    post,
    path = "/orders",
    tag = "orders",
    request_body = PlaceOrder,
    responses(
        (status = 201, description = "Order placed", body = OrderDetail),
        (status = 400, description = "Empty cart or invalid coupon/points", body = ErrorBody),
        (status = 409, description = "A product is unavailable", body = ErrorBody),
    )
)]
pub async fn checkout(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    AppJson(request): AppJson<PlaceOrder>,
) -> Result<(StatusCode, AppJson<OrderDetail>)> {
    let detail = OrderService::new(&state).checkout(&user, &request).await?;
    Ok((StatusCode::CREATED, AppJson(detail)))
}

#[utoipa::path(
    get,
    path = "/orders",
    tag = "orders",
    params(Pagination),
    responses((status = 200, description = "The user's orders, newest first", body = Page<Order>))
)]
pub async fn list(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    AppQuery(pagination): AppQuery<Pagination>,
) -> Result<AppJson<Page<Order>>> {
    let (orders, total) = OrderRepository::new(state.pool())
        .list_for_user(user.id, pagination)
        .await?;
    Ok(AppJson(Page::new(orders, pagination, total)))
}

#[utoipa::path(
    get,
    path = "/orders/{id}",
    tag = "orders",
    params(("id" = i32, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order with items", body = OrderDetail),
        (status = 404, description = "Not found", body = ErrorBody),
    )
)]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<AppJson<OrderDetail>> {
    Ok(AppJson(OrderService::new(&state).get_for_viewer(&user, id).await?))
}

#[utoipa::path(
    post,
    path = "/orders/{id}/cancel",
    tag = "orders",
    params(("id" = i32, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Cancelled", body = Order),
        (status = 409, description = "Order can no longer be cancelled", body = ErrorBody),
    )
)]
pub async fn cancel(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<AppJson<Order>> {
    Ok(AppJson(OrderService::new(&state).cancel(&user, id).await?))
}

#[utoipa::path(
    patch,
    path = "/orders/{id}/status",
    tag = "orders",
    params(("id" = i32, Path, description = "Order ID")),
    request_body = StatusUpdate,
    responses(
        (status = 200, description = "Status changed", body = Order),
        (status = 400, description = "Missing tracking code", body = ErrorBody),
        (status = 409, description = "Transition not allowed", body = ErrorBody),
    )
)]
pub async fn update_status(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<OrderId>,
    AppJson(request): AppJson<StatusUpdate>,
) -> Result<AppJson<Order>> {
    Ok(AppJson(OrderService::new(&state).update_status(id, &request).await?))
}
