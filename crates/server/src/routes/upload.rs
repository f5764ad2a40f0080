//! Admin image uploads.

use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
};
use serde::Serialize;
use tracing::info;

use mercado_core::ProductId;

use crate::db::ProductRepository;
use crate::db::products::ProductImage;
use crate::error::{AppError, ErrorBody, Result};
use crate::extract::AppJson;
use crate::middleware::RequireAdmin;
use crate::services::upload::{MAX_IMAGE_BYTES, store_image, validate_image};
use crate::state::AppState;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UploadedImage {
    pub url: String,
    /// Present when the upload was attached to a product.
    pub image: Option<ProductImage>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/images", post(upload_image))
        // Room for the multipart framing around a maximum-size file.
        .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 64 * 1024))
}

struct ImageForm {
    content_type: Option<String>,
    bytes: Vec<u8>,
    product_id: Option<ProductId>,
}

async fn read_form(mut multipart: Multipart) -> Result<ImageForm> {
    let mut file = None;
    let mut product_id = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        match field.name() {
            Some("file") => {
                let content_type = field.content_type().map(String::from);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                file = Some((content_type, bytes.to_vec()));
            }
            Some("product_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;
                let id = text
                    .trim()
                    .parse::<i32>()
                    .map_err(|_| AppError::Validation("product_id must be an integer".to_string()))?;
                product_id = Some(ProductId::new(id));
            }
            _ => {}
        }
    }

    let (content_type, bytes) =
        file.ok_or_else(|| AppError::BadRequest("Missing 'file' field".to_string()))?;
    Ok(ImageForm {
        content_type,
        bytes,
        product_id,
    })
}

#[utoipa::path(
    post,
    path = "/upload/images",
    tag = "upload",
    request_body(content_type = "multipart/form-data", description = "`file` plus optional `product_id`"),
    responses(
        (status = 201, description = "Stored", body = UploadedImage),
        (status = 400, description = "Unsupported, mislabelled or oversized file", body = ErrorBody),
        (status = 404, description = "Product not found", body = ErrorBody),
    )
)]
pub async fn upload_image(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    multipart: Multipart,
) -> Result<(StatusCode, AppJson<UploadedImage>)> {
    let form = read_form(multipart).await?;
    let kind = validate_image(form.content_type.as_deref(), &form.bytes)?;

    let products = ProductRepository::new(state.pool());
    if let Some(product_id) = form.product_id {
        products
            .get(product_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Product not found".to_string()))?;
    }

    let url = store_image(&state.config().upload_dir, kind, &form.bytes).await?;
    let image = match form.product_id {
        Some(product_id) => Some(products.add_image(product_id, &url, None).await?),
        None => None,
    };

    info!(url = %url, admin_id = %admin.id, "Image uploaded");
    Ok((StatusCode::CREATED, AppJson(UploadedImage { url, image })))
}
