//! Wishlist routes.

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use serde::Deserialize;

use mercado_core::ProductId;

use crate::db::wishlist::WishlistItem;
use crate::db::{ProductRepository, WishlistRepository};
use crate::error::{AppError, ErrorBody, Result};
use crate::extract::AppJson;
use crate::middleware::RequireAuth;
use crate::services::cart::{AddToCart, CartService, CartView};
use crate::state::AppState;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct AddToWishlist {
    pub product_id: ProductId,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(add))
        .route("/{product_id}", delete(remove))
        .route("/{product_id}/move-to-cart", post(move_to_cart))
}

#[utoipa::path(
    get,
    path = "/wishlist",
    tag = "wishlist",
    responses((status = 200, description = "Saved products", body = Vec<WishlistItem>))
)]
pub async fn list(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<AppJson<Vec<WishlistItem>>> {
    Ok(AppJson(WishlistRepository::new(state.pool()).list(user.id).await?))
}

#[utoipa::path(
    post,
    path = "/wishlist",
    tag = "wishlist",
    request_body = AddToWishlist,
    responses(
        (status = 200, description = "Wishlist after the add", body = Vec<WishlistItem>),
        (status = 404, description = "Product not found", body = ErrorBody),
    )
)]
pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    AppJson(request): AppJson<AddToWishlist>,
) -> Result<AppJson<Vec<WishlistItem>>> {
    ProductRepository::new(state.pool())
        .get_active(request.product_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;

    let wishlist = WishlistRepository::new(state.pool());
    wishlist.add(user.id, request.product_id).await?;
    Ok(AppJson(wishlist.list(user.id).await?))
}

#[utoipa::path(
    delete,
    path = "/wishlist/{product_id}",
    tag = "wishlist",
    params(("product_id" = i32, Path, description = "Product ID")),
    responses(
        (status = 204, description = "Removed"),
        (status = 404, description = "Not in wishlist", body = ErrorBody),
    )
)]
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(product_id): Path<ProductId>,
) -> Result<StatusCode> {
    if WishlistRepository::new(state.pool()).remove(user.id, product_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("Product not in wishlist".to_string()))
    }
}

/// Add one unit to the cart, then drop the product from the wishlist.
#[utoipa::path(
    post,
    path = "/wishlist/{product_id}/move-to-cart",
    tag = "wishlist",
    params(("product_id" = i32, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Cart after the move", body = CartView),
        (status = 404, description = "Not in wishlist", body = ErrorBody),
        (status = 409, description = "Out of stock", body = ErrorBody),
    )
)]
pub async fn move_to_cart(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(product_id): Path<ProductId>,
) -> Result<AppJson<CartView>> {
    let wishlist = WishlistRepository::new(state.pool());
    if !wishlist
        .list(user.id)
        .await?
        .iter()
        .any(|item| item.product_id == product_id)
    {
        return Err(AppError::NotFound("Product not in wishlist".to_string()));
    }

    let cart = CartService::new(state.pool())
        .add(
            user.id,
            &AddToCart {
                product_id,
                quantity: 1,
            },
        )
        .await?;
    wishlist.remove(user.id, product_id).await?;
    Ok(AppJson(cart))
}
