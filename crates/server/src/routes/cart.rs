//! Cart routes. Every cart belongs to the logged-in user and is created on
//! first use.

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
};

use mercado_core::ProductId;

use crate::error::{ErrorBody, Result};
use crate::extract::AppJson;
use crate::middleware::RequireAuth;
use crate::services::cart::{AddToCart, CartService, CartView, SetQuantity};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(show).delete(clear))
        .route("/items", post(add_item))
        .route("/items/{product_id}", patch(set_quantity).delete(remove_item))
}

#[utoipa::path(
    get,
    path = "/cart",
    tag = "cart",
    responses(
        (status = 200, description = "Current cart", body = CartView),
        (status = 401, description = "Not logged in", body = ErrorBody),
    )
)]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<AppJson<CartView>> {
    Ok(AppJson(CartService::new(state.pool()).view(user.id).await?))
}

#[utoipa::path(
    post,
    path = "/cart/items",
    tag = "cart",
    request_body = AddToCart,
    responses(
        (status = 200, description = "Updated cart", body = CartView),
        (status = 404, description = "Product not found", body = ErrorBody),
        (status = 409, description = "Not enough stock", body = ErrorBody),
    )
)]
pub async fn add_item(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    AppJson(request): AppJson<AddToCart>,
) -> Result<AppJson<CartView>> {
    Ok(AppJson(CartService::new(state.pool()).add(user.id, &request).await?))
}

#[utoipa::path(
    patch,
    path = "/cart/items/{product_id}",
    tag = "cart",
    params(("product_id" = i32, Path, description = "Product ID")),
    request_body = SetQuantity,
    responses(
        (status = 200, description = "Updated cart", body = CartView),
        (status = 404, description = "Item not in cart", body = ErrorBody),
    )
)]
pub async fn set_quantity(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(product_id): Path<ProductId>,
    AppJson(request): AppJson<SetQuantity>,
) -> Result<AppJson<CartView>> {
    let cart = CartService::new(state.pool())
        .set_quantity(user.id, product_id, request.quantity)
        .await?;
    Ok(AppJson(cart))
}

#[utoipa::path(
    delete,
    path = "/cart/items/{product_id}",
    tag = "cart",
    params(("product_id" = i32, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Updated cart", body = CartView),
        (status = 404, description = "Item not in cart", body = ErrorBody),
    )
)]
pub async fn remove_item(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(product_id): Path<ProductId>,
) -> Result<AppJson<CartView>> {
    Ok(AppJson(CartService::new(state.pool()).remove(user.id, product_id).await?))
}

#[utoipa::path(
    delete,
    path = "/cart",
    tag = "cart",
    responses((status = 204, description = "Cart emptied"))
)]
pub async fn clear(State(state): State<AppState>, RequireAuth(user): RequireAuth) -> Result<StatusCode> {
    CartService::new(state.pool()).clear(user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
