//! Product reviews.

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use mercado_core::{ProductId, ReviewId};

use super::optional_text;
use crate::db::reviews::Review;
use crate::db::{OrderRepository, ProductRepository, ReviewRepository};
use crate::error::{AppError, ErrorBody, Result};
use crate::extract::AppJson;
use crate::middleware::RequireAuth;
use crate::state::AppState;

const MAX_COMMENT_CHARS: usize = 2_000;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateReview {
    pub product_id: ProductId,
    pub rating: i16,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateReview {
    pub rating: i16,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ProductReviews {
    pub reviews: Vec<Review>,
    pub average_rating: Option<f64>,
    pub review_count: i64,
}

fn check_rating(rating: i16) -> Result<()> {
    if (1..=5).contains(&rating) {
        Ok(())
    } else {
        Err(AppError::Validation("rating must be between 1 and 5".to_string()))
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create))
        .route("/product/{product_id}", get(for_product))
        .route("/{id}", put(update).delete(delete))
}

#[utoipa::path(
    get,
    path = "/reviews/product/{product_id}",
    tag = "reviews",
    params(("product_id" = i32, Path, description = "Product ID")),
    responses((status = 200, description = "Reviews with the average rating", body = ProductReviews))
)]
pub async fn for_product(
    State(state): State<AppState>,
    Path(product_id): Path<ProductId>,
) -> Result<AppJson<ProductReviews>> {
    let reviews = ReviewRepository::new(state.pool()).list_for_product(product_id).await?;
    let (average_rating, review_count) = ProductRepository::new(state.pool()).rating(product_id).await?;
    Ok(AppJson(ProductReviews {
        reviews,
        average_rating,
        review_count,
    }))
}

#[utoipa::path(
    post,
    path = "/reviews",
    tag = "reviews",
    request_body = CreateReview,
    responses(
        (status = 201, description = "Created", body = Review),
        (status = 404, description = "Product not found", body = ErrorBody),
        (status = 409, description = "Already reviewed", body = ErrorBody),
    )
)]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    AppJson(request): AppJson<CreateReview>,
) -> Result<(StatusCode, AppJson<Review>)> {
    check_rating(request.rating)?;
    let comment = optional_text("comment", request.comment.as_deref(), MAX_COMMENT_CHARS)?;

    let pool = state.pool();
    ProductRepository::new(pool)
        .get_active(request.product_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;
    let verified = OrderRepository::new(pool)
        .has_delivered_purchase(user.id, request.product_id)
        .await?;

    let review = ReviewRepository::new(pool)
        .create(user.id, request.product_id, request.rating, comment.as_deref(), verified)
        .await?;
    info!(review_id = %review.id, product_id = %review.product_id, verified, "Review created");
    Ok((StatusCode::CREATED, AppJson(review)))
}

#[utoipa::path(
    put,
    path = "/reviews/{id}",
    tag = "reviews",
    params(("id" = i32, Path, description = "Review ID")),
    request_body = UpdateReview,
    responses(
        (status = 200, description = "Updated", body = Review),
        (status = 404, description = "Not found or not yours", body = ErrorBody),
    )
)]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ReviewId>,
    AppJson(request): AppJson<UpdateReview>,
) -> Result<AppJson<Review>> {
    check_rating(request.rating)?;
    let comment = optional_text("comment", request.comment.as_deref(), MAX_COMMENT_CHARS)?;

    let reviews = ReviewRepository::new(state.pool());
    reviews
        .get(id)
        .await?
        .filter(|review| review.user_id == user.id)
        .ok_or_else(|| AppError::NotFound("Review not found".to_string()))?;

    Ok(AppJson(reviews.update(id, request.rating, comment.as_deref()).await?))
}

#[utoipa::path(
    delete,
    path = "/reviews/{id}",
    tag = "reviews",
    params(("id" = i32, Path, description = "Review ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found", body = ErrorBody),
    )
)]
pub async fn delete(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ReviewId>,
) -> Result<StatusCode> {
    let reviews = ReviewRepository::new(state.pool());
    reviews
        .get(id)
        .await?
        .filter(|review| review.user_id == user.id || user.is_admin())
        .ok_or_else(|| AppError::NotFound("Review not found".to_string()))?;

    reviews.delete(id).await?;
    info!(review_id = %id, by = %user.id, "Review deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_range() {
        assert!(check_rating(1).is_ok());
        assert!(check_rating(5).is_ok());
        assert!(check_rating(0).is_err());
        assert!(check_rating(6).is_err());
    }
}
