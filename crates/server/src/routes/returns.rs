//! Return and exchange requests.

use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;

use mercado_core::{ReturnId, ReturnStatus};

use crate::db::returns::ReturnRequest;
use crate::db::{Page, Pagination, ReturnRepository};
use crate::error::{AppError, ErrorBody, Result};
use crate::extract::{AppJson, AppQuery};
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::services::returns::{CreateReturn, ReturnDetail, ReturnService};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReturnQuery {
    /// Only honoured for staff.
    #[param(inline)]
    pub status: Option<ReturnStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct ResolutionNote {
    pub note: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", get(show))
        .route("/{id}/approve", post(approve))
        .route("/{id}/reject", post(reject))
        .route("/{id}/complete", post(complete))
}

#[utoipa::path(
    post,
    path = "/returns",
    tag = "returns",
    request_body = CreateReturn,
    responses(
        (status = 201, description = "Return requested", body = ReturnDetail),
        (status = 400, description = "Order not eligible or quantities invalid", body = ErrorBody),
        (status = 409, description = "A return is already open for this order", body = ErrorBody),
    )
)]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    AppJson(request): AppJson<CreateReturn>,
) -> Result<(StatusCode, AppJson<ReturnDetail>)> {
    let detail = ReturnService::new(&state).create(&user, &request).await?;
    Ok((StatusCode::CREATED, AppJson(detail)))
}

#[utoipa::path(
    get,
    path = "/returns",
    tag = "returns",
    params(ReturnQuery),
    responses((status = 200, description = "Returns, newest first", body = Page<ReturnRequest>))
)]
pub async fn list(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    AppQuery(query): AppQuery<ReturnQuery>,
) -> Result<AppJson<Page<ReturnRequest>>> {
    let pagination = Pagination {
        page: query.page,
        per_page: query.per_page,
    };
    let repo = ReturnRepository::new(state.pool());
    let (items, total) = if user.is_admin() {
        repo.list_all(query.status, pagination).await?
    } else {
        repo.list_for_user(user.id, pagination).await?
    };
    Ok(AppJson(Page::new(items, pagination, total)))
}

#[utoipa::path(
    get,
    path = "/returns/{id}",
    tag = "returns",
    params(("id" = i32, Path, description = "Return ID")),
    responses(
        (status = 200, description = "Return with items", body = ReturnDetail),
        (status = 404, description = "Not found", body = ErrorBody),
    )
)]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<ReturnId>,
) -> Result<AppJson<ReturnDetail>> {
    Ok(AppJson(ReturnService::new(&state).get_for_viewer(&user, id).await?))
}

#[utoipa::path(
    post,
    path = "/returns/{id}/approve",
    tag = "returns",
    params(("id" = i32, Path, description = "Return ID")),
    request_body(content = ResolutionNote, description = "Optional note"),
    responses(
        (status = 200, description = "Approved", body = ReturnRequest),
        (status = 409, description = "Not awaiting a decision", body = ErrorBody),
    )
)]
pub async fn approve(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<ReturnId>,
    body: Bytes,
) -> Result<AppJson<ReturnRequest>> {
    // The note is optional here, so an empty body is accepted.
    let note = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<ResolutionNote>(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {e}")))?
            .note
    };
    Ok(AppJson(ReturnService::new(&state).approve(id, note.as_deref()).await?))
}

#[utoipa::path(
    post,
    path = "/returns/{id}/reject",
    tag = "returns",
    params(("id" = i32, Path, description = "Return ID")),
    request_body = ResolutionNote,
    responses(
        (status = 200, description = "Rejected", body = ReturnRequest),
        (status = 409, description = "Not awaiting a decision", body = ErrorBody),
    )
)]
pub async fn reject(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<ReturnId>,
    AppJson(body): AppJson<ResolutionNote>,
) -> Result<AppJson<ReturnRequest>> {
    Ok(AppJson(ReturnService::new(&state).reject(id, body.note.as_deref()).await?))
}

#[utoipa::path(
    post,
    path = "/returns/{id}/complete",
    tag = "returns",
    params(("id" = i32, Path, description = "Return ID")),
    responses(
        (status = 200, description = "Completed; stock restored and refund computed", body = ReturnRequest),
        (status = 409, description = "Return is not approved", body = ErrorBody),
    )
)]
pub async fn complete(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<ReturnId>,
) -> Result<AppJson<ReturnRequest>> {
    Ok(AppJson(ReturnService::new(&state).complete(id).await?))
}
