//! Hosted checkout and gateway notifications.

use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::post,
};

use mercado_core::OrderId;

use crate::error::{ErrorBody, Result};
use crate::extract::AppJson;
use crate::middleware::RequireAuth;
use crate::services::payments::{CheckoutStarted, PaymentService, SIGNATURE_HEADER};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders/{order_id}/checkout", post(start_checkout))
        .route("/notifications", post(notification))
}

#[utoipa::path(
    post,
    path = "/payments/orders/{order_id}/checkout",
    tag = "payments",
    params(("order_id" = i32, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Redirect the customer to checkout_url", body = CheckoutStarted),
        (status = 404, description = "Order not found", body = ErrorBody),
        (status = 409, description = "Order is not awaiting payment", body = ErrorBody),
        (status = 502, description = "Gateway unavailable", body = ErrorBody),
    )
)]
pub async fn start_checkout(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(order_id): Path<OrderId>,
) -> Result<AppJson<CheckoutStarted>> {
    Ok(AppJson(PaymentService::new(&state).start_checkout(&user, order_id).await?))
}

/// The signature covers the exact bytes received, so the body is taken raw.
#[utoipa::path(
    post,
    path = "/payments/notifications",
    tag = "payments",
    request_body(content = String, description = "Gateway JSON notification", content_type = "application/json"),
    responses(
        (status = 204, description = "Accepted"),
        (status = 400, description = "Malformed notification", body = ErrorBody),
        (status = 401, description = "Bad signature", body = ErrorBody),
    )
)]
pub async fn notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    PaymentService::new(&state)
        .handle_notification(signature, &body)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
