//! Category tree routes.

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;
use tracing::info;

use mercado_core::CategoryId;
use mercado_core::slug::{is_valid_slug, slugify};

use super::{optional_text, required_text};
use crate::db::CategoryRepository;
use crate::db::categories::{Category, CategoryInput};
use crate::error::{AppError, ErrorBody, Result};
use crate::extract::AppJson;
use crate::middleware::RequireAdmin;
use crate::state::AppState;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CategoryRequest {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<CategoryId>,
}

impl CategoryRequest {
    fn validate(self) -> Result<CategoryInput> {
        let name = required_text("name", &self.name, 120)?;
        let slug = match self.slug.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(slug) if is_valid_slug(slug) => slug.to_string(),
            Some(_) => return Err(AppError::Validation("slug is not valid".to_string())),
            None => slugify(&name),
        };
        if slug.is_empty() {
            return Err(AppError::Validation("name must contain letters or digits".to_string()));
        }
        Ok(CategoryInput {
            name,
            slug,
            description: optional_text("description", self.description.as_deref(), 2_000)?,
            parent_id: self.parent_id,
        })
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", get(show).put(update).delete(delete))
}

#[utoipa::path(
    get,
    path = "/categories",
    tag = "catalog",
    responses((status = 200, description = "All categories", body = Vec<Category>))
)]
pub async fn list(State(state): State<AppState>) -> Result<AppJson<Vec<Category>>> {
    Ok(AppJson(CategoryRepository::new(state.pool()).list().await?))
}

#[utoipa::path(
    get,
    path = "/categories/{id}",
    tag = "catalog",
    params(("id" = i32, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Category", body = Category),
        (status = 404, description = "Not found", body = ErrorBody),
    )
)]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
) -> Result<AppJson<Category>> {
    CategoryRepository::new(state.pool())
        .get(id)
        .await?
        .map(AppJson)
        .ok_or_else(|| AppError::NotFound("Category not found".to_string()))
}

#[utoipa::path(
    post,
    path = "/categories",
    tag = "catalog",
    request_body = CategoryRequest,
    responses(
        (status = 201, description = "Created", body = Category),
        (status = 409, description = "Slug taken or parent missing", body = ErrorBody),
    )
)]
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    AppJson(request): AppJson<CategoryRequest>,
) -> Result<(StatusCode, AppJson<Category>)> {
    let input = request.validate()?;
    let category = CategoryRepository::new(state.pool()).create(&input).await?;
    info!(category_id = %category.id, admin_id = %admin.id, "Category created");
    Ok((StatusCode::CREATED, AppJson(category)))
}

#[utoipa::path(
    put,
    path = "/categories/{id}",
    tag = "catalog",
    params(("id" = i32, Path, description = "Category ID")),
    request_body = CategoryRequest,
    responses(
        (status = 200, description = "Updated", body = Category),
        (status = 400, description = "Parent would create a cycle", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody),
    )
)]
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<CategoryId>,
    AppJson(request): AppJson<CategoryRequest>,
) -> Result<AppJson<Category>> {
    let input = request.validate()?;
    let categories = CategoryRepository::new(state.pool());
    if let Some(parent_id) = input.parent_id
        && categories.is_self_or_descendant(id, parent_id).await?
    {
        return Err(AppError::BadRequest(
            "A category cannot be moved under itself or its subcategories".to_string(),
        ));
    }
    Ok(AppJson(categories.update(id, &input).await?))
}

#[utoipa::path(
    delete,
    path = "/categories/{id}",
    tag = "catalog",
    params(("id" = i32, Path, description = "Category ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 409, description = "Still referenced", body = ErrorBody),
    )
)]
pub async fn delete(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<CategoryId>,
) -> Result<StatusCode> {
    CategoryRepository::new(state.pool()).delete(id).await?;
    info!(category_id = %id, admin_id = %admin.id, "Category deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_category_request_validation() {
        let input = CategoryRequest {
            name: "Casa & Cozinha".to_string(),
            slug: None,
            description: Some("  ".to_string()),
            parent_id: None,
        }
        .validate()
        .unwrap();
        assert_eq!(input.slug, "casa-cozinha");
        assert_eq!(input.description, None);

        let bad = CategoryRequest {
            name: "Casa".to_string(),
            slug: Some("Casa_Cozinha".to_string()),
            description: None,
            parent_id: None,
        };
        assert!(bad.validate().is_err());
    }
}
