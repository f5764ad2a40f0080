//! Support tickets. Customers see their own tickets; staff see all of them.

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use mercado_core::{OrderId, TicketId, TicketPriority, TicketStatus};

use super::required_text;
use crate::db::support::{Ticket, TicketMessage};
use crate::db::{OrderRepository, Page, Pagination, SupportRepository};
use crate::error::{AppError, ErrorBody, Result};
use crate::extract::{AppJson, AppQuery};
use crate::middleware::RequireAuth;
use crate::models::CurrentUser;
use crate::state::AppState;

const MAX_MESSAGE_CHARS: usize = 5_000;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateTicket {
    pub subject: String,
    pub message: String,
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub priority: TicketPriority,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct PostMessage {
    pub body: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ChangeTicketStatus {
    pub status: TicketStatus,
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TicketQuery {
    /// Only honoured for staff.
    #[param(inline)]
    pub status: Option<TicketStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TicketDetail {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub messages: Vec<TicketMessage>,
}

/// Whether `user` may move a ticket to `status`. Customers can only wind
/// their own tickets down.
const fn may_set_status(user_is_admin: bool, status: TicketStatus) -> bool {
    user_is_admin || matches!(status, TicketStatus::Resolved | TicketStatus::Closed)
}

async fn visible_ticket(state: &AppState, user: &CurrentUser, id: TicketId) -> Result<Ticket> {
    SupportRepository::new(state.pool())
        .get(id)
        .await?
        .filter(|ticket| ticket.user_id == user.id || user.is_admin())
        .ok_or_else(|| AppError::NotFound("Ticket not found".to_string()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tickets", get(list).post(create))
        .route("/tickets/{id}", get(show))
        .route("/tickets/{id}/messages", post(reply))
        .route("/tickets/{id}/status", patch(set_status))
}

#[utoipa::path(
    post,
    path = "/support/tickets",
    tag = "support",
    request_body = CreateTicket,
    responses(
        (status = 201, description = "Ticket opened", body = Ticket),
        (status = 404, description = "Order not found", body = ErrorBody),
    )
)]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    AppJson(request): AppJson<CreateTicket>,
) -> Result<(StatusCode, AppJson<Ticket>)> {
    let subject = required_text("subject", &request.subject, 200)?;
    let message = required_text("message", &request.message, MAX_MESSAGE_CHARS)?;

    if let Some(order_id) = request.order_id {
        OrderRepository::new(state.pool())
            .get(order_id)
            .await?
            .filter(|order| order.user_id == user.id)
            .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;
    }

    let ticket = SupportRepository::new(state.pool())
        .create(user.id, request.order_id, &subject, request.priority, &message)
        .await?;
    info!(ticket_id = %ticket.id, user_id = %user.id, priority = %ticket.priority, "Ticket opened");
    Ok((StatusCode::CREATED, AppJson(ticket)))
}

#[utoipa::path(
    get,
    path = "/support/tickets",
    tag = "support",
    params(TicketQuery),
    responses((status = 200, description = "Tickets, most recently updated first", body = Page<Ticket>))
)]
pub async fn list(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    AppQuery(query): AppQuery<TicketQuery>,
) -> Result<AppJson<Page<Ticket>>> {
    let pagination = Pagination {
        page: query.page,
        per_page: query.per_page,
    };
    let (owner, status) = if user.is_admin() {
        (None, query.status)
    } else {
        (Some(user.id), None)
    };
    let (tickets, total) = SupportRepository::new(state.pool())
        .list(owner, status, pagination)
        .await?;
    Ok(AppJson(Page::new(tickets, pagination, total)))
}

#[utoipa::path(
    get,
    path = "/support/tickets/{id}",
    tag = "support",
    params(("id" = i32, Path, description = "Ticket ID")),
    responses(
        (status = 200, description = "Ticket with its messages", body = TicketDetail),
        (status = 404, description = "Not found", body = ErrorBody),
    )
)]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<TicketId>,
) -> Result<AppJson<TicketDetail>> {
    let ticket = visible_ticket(&state, &user, id).await?;
    let messages = SupportRepository::new(state.pool()).messages(id).await?;
    Ok(AppJson(TicketDetail { ticket, messages }))
}

#[utoipa::path(
    post,
    path = "/support/tickets/{id}/messages",
    tag = "support",
    params(("id" = i32, Path, description = "Ticket ID")),
    request_body = PostMessage,
    responses(
        (status = 200, description = "Ticket after the reply", body = Ticket),
        (status = 409, description = "Ticket is closed", body = ErrorBody),
    )
)]
pub async fn reply(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<TicketId>,
    AppJson(request): AppJson<PostMessage>,
) -> Result<AppJson<Ticket>> {
    let body = required_text("body", &request.body, MAX_MESSAGE_CHARS)?;
    let ticket = visible_ticket(&state, &user, id).await?;

    // Staff replying to their own ticket count as the customer.
    let from_staff = user.is_admin() && ticket.user_id != user.id;
    let ticket = SupportRepository::new(state.pool())
        .reply(id, user.id, from_staff, &body, ticket.status.after_reply(from_staff))
        .await?;
    Ok(AppJson(ticket))
}

#[utoipa::path(
    patch,
    path = "/support/tickets/{id}/status",
    tag = "support",
    params(("id" = i32, Path, description = "Ticket ID")),
    request_body = ChangeTicketStatus,
    responses(
        (status = 200, description = "Status changed", body = Ticket),
        (status = 403, description = "Customers may only resolve or close", body = ErrorBody),
    )
)]
pub async fn set_status(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<TicketId>,
    AppJson(request): AppJson<ChangeTicketStatus>,
) -> Result<AppJson<Ticket>> {
    visible_ticket(&state, &user, id).await?;
    if !may_set_status(user.is_admin(), request.status) {
        return Err(AppError::Forbidden(
            "Customers can only mark tickets resolved or closed".to_string(),
        ));
    }
    let ticket = SupportRepository::new(state.pool()).set_status(id, request.status).await?;
    info!(ticket_id = %id, status = %ticket.status, by = %user.id, "Ticket status changed");
    Ok(AppJson(ticket))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_customer_status_changes() {
        assert!(may_set_status(false, TicketStatus::Closed));
        assert!(may_set_status(false, TicketStatus::Resolved));
        assert!(!may_set_status(false, TicketStatus::Open));
        assert!(!may_set_status(false, TicketStatus::Answered));
        assert!(may_set_status(true, TicketStatus::Open));
    }
}
