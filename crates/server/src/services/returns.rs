//! Return requests and their resolution.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use mercado_core::returns::{
    ReturnQuantityError, ReturnedLine, check_return_quantity, order_status_after_return,
    points_to_revert, refund_for_items, within_return_window,
};
use mercado_core::{
    LoyaltyTransactionKind, OrderId, OrderItemId, OrderStatus, PaymentStatus, Price, ReturnId,
    ReturnKind, ReturnStatus,
};

use crate::db::orders::OrderItem;
use crate::db::returns::{ReturnItem, ReturnRequest};
use crate::db::{ReturnRepository, UserRepository, loyalty, orders, products, returns, tracking};
use crate::error::AppError;
use crate::models::CurrentUser;
use crate::services::email::OutgoingEmail;
use crate::services::events::DomainEvent;
use crate::state::AppState;

const MAX_REASON_CHARS: usize = 1_000;

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct ReturnLineInput {
    pub order_item_id: OrderItemId,
    pub quantity: u32,
}

/// A customer's return request.
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct CreateReturn {
    pub order_id: OrderId,
    pub kind: ReturnKind,
    pub reason: String,
    pub items: Vec<ReturnLineInput>,
}

/// A return with its items.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct ReturnDetail {
    #[serde(flatten)]
    pub request: ReturnRequest,
    pub items: Vec<ReturnItem>,
}

pub struct ReturnService<'a> {
    state: &'a AppState,
}

impl<'a> ReturnService<'a> {
    #[must_use]
    pub const fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Open a return on a delivered order.
    ///
    /// # Errors
    ///
    /// `Validation` for a missing reason, `BadRequest` for bad quantities or
    /// a closed window, `NotFound` for foreign orders, `Conflict` when the
    /// order is not delivered or already has an open return.
    #[instrument(skip(self, user, input), fields(user_id = %user.id, order_id = %input.order_id))]
    pub async fn create(&self, user: &CurrentUser, input: &CreateReturn) -> Result<ReturnDetail, AppError> {
        let reason = input.reason.trim();
        if reason.is_empty() {
            return Err(AppError::Validation("reason is required".to_string()));
        }
        if reason.chars().count() > MAX_REASON_CHARS {
            return Err(AppError::Validation(format!(
                "reason must be at most {MAX_REASON_CHARS} characters"
            )));
        }

        let mut tx = self.state.pool().begin().await?;

        let order = orders::lock(&mut tx, input.order_id).await?;
        if order.user_id != user.id {
            return Err(AppError::NotFound("Order not found".to_string()));
        }
        if !matches!(order.status, OrderStatus::Delivered | OrderStatus::PartiallyRefunded) {
            return Err(AppError::Conflict(
                "Only delivered orders can be returned".to_string(),
            ));
        }
        let delivered_at = order
            .delivered_at
            .ok_or_else(|| AppError::Conflict("Order has no delivery date".to_string()))?;
        if !within_return_window(delivered_at, Utc::now()) {
            return Err(AppError::BadRequest(
                "The return window for this order has closed".to_string(),
            ));
        }

        let purchased = orders::items(&mut tx, order.id).await?;
        let already = returns::returned_quantities(&mut tx, order.id).await?;
        check_lines(&input.items, &purchased, &already)?;

        let request = returns::insert(&mut tx, order.id, user.id, input.kind, reason).await?;
        for line in &input.items {
            let quantity = i32::try_from(line.quantity)
                .map_err(|_| AppError::Validation("quantity is too large".to_string()))?;
            returns::insert_item(&mut tx, request.id, line.order_item_id, quantity).await?;
        }
        let items = returns::items(&mut tx, request.id).await?;

        tx.commit().await?;
        info!(return_id = %request.id, kind = %request.kind, "Return requested");

        Ok(ReturnDetail { request, items })
    }

    /// A return visible to its owner and to admins.
    ///
    /// # Errors
    ///
    /// `NotFound` if missing or owned by someone else.
    pub async fn get_for_viewer(&self, viewer: &CurrentUser, id: ReturnId) -> Result<ReturnDetail, AppError> {
        let repo = ReturnRepository::new(self.state.pool());
        let request = repo
            .get(id)
            .await?
            .filter(|r| r.user_id == viewer.id || viewer.is_admin())
            .ok_or_else(|| AppError::NotFound("Return not found".to_string()))?;
        let items = repo.items(request.id).await?;
        Ok(ReturnDetail { request, items })
    }

    /// Accept a requested return.
    ///
    /// # Errors
    ///
    /// `Conflict` unless the return is `requested`.
    #[instrument(skip(self))]
    pub async fn approve(&self, id: ReturnId, note: Option<&str>) -> Result<ReturnRequest, AppError> {
        self.transition(id, ReturnStatus::Approved, note).await
    }

    /// Refuse a requested return.
    ///
    /// # Errors
    ///
    /// `Conflict` unless the return is `requested`.
    #[instrument(skip(self))]
    pub async fn reject(&self, id: ReturnId, note: Option<&str>) -> Result<ReturnRequest, AppError> {
        self.transition(id, ReturnStatus::Rejected, note).await
    }

    async fn transition(
        &self,
        id: ReturnId,
        next: ReturnStatus,
        note: Option<&str>,
    ) -> Result<ReturnRequest, AppError> {
        let note = note.map(str::trim).filter(|n| !n.is_empty());
        let mut tx = self.state.pool().begin().await?;

        let current = returns::lock(&mut tx, id).await?;
        if !current.status.can_transition_to(next) {
            return Err(AppError::Conflict(format!(
                "Return is {} and cannot become {next}",
                current.status
            )));
        }
        let updated = returns::set_status(&mut tx, id, next, note).await?;
        tx.commit().await?;

        info!(return_id = %id, status = %next, "Return status changed");
        Ok(updated)
    }

    /// Receive the goods back and settle an approved return.
    ///
    /// Stock is restored, the refund computed (zero for exchanges), earned
    /// points reverted in proportion, and the order marked refunded or
    /// partially refunded.
    ///
    /// # Errors
    ///
    /// `Conflict` unless the return is `approved`.
    #[instrument(skip(self))]
    pub async fn complete(&self, id: ReturnId) -> Result<ReturnRequest, AppError> {
        let mut tx = self.state.pool().begin().await?;

        let request = returns::lock(&mut tx, id).await?;
        if !request.status.can_transition_to(ReturnStatus::Completed) {
            return Err(AppError::Conflict(format!(
                "Return is {} and cannot be completed",
                request.status
            )));
        }

        let order = orders::lock(&mut tx, request.order_id).await?;
        let items = returns::items(&mut tx, id).await?;

        for item in &items {
            products::restore_stock(&mut tx, item.product_id, item.quantity).await?;
        }

        let refund = match request.kind {
            ReturnKind::Refund => {
                let lines = returned_lines(&items)?;
                refund_for_items(&lines, order.subtotal, order.discount + order.points_discount)
            }
            ReturnKind::Exchange => Price::ZERO,
        };

        let wanted = points_to_revert(order.points_earned, refund, order.merchandise_value());
        let balance = loyalty::lock_balance(&mut tx, order.user_id).await?;
        let reverted = wanted.min(balance.loyalty_points);
        if reverted < wanted {
            warn!(
                return_id = %id,
                wanted,
                reverted,
                "Points already spent, reverting what is left"
            );
        }
        if reverted > 0 {
            loyalty::record(
                &mut tx,
                order.user_id,
                Some(order.id),
                LoyaltyTransactionKind::Revert,
                -reverted,
                &format!("Reverted for return #{id}"),
            )
            .await?;
        }

        let purchased = orders::items(&mut tx, order.id).await?;
        let returned = returns::returned_quantities(&mut tx, order.id).await?;
        let fully = fully_returned(&purchased, &returned);
        let next = order_status_after_return(fully);

        if order.status.can_transition_to(next) {
            orders::set_status(&mut tx, order.id, next).await?;
            tracking::append(
                &mut tx,
                order.id,
                next.as_str(),
                None,
                &format!("Return #{id} completed"),
            )
            .await?;
        } else {
            warn!(order_id = %order.id, status = %order.status, "Order status left unchanged by return");
        }
        if fully && request.kind == ReturnKind::Refund {
            orders::set_payment_status(&mut tx, order.id, PaymentStatus::Refunded).await?;
        }

        let completed = returns::complete(&mut tx, id, refund, reverted).await?;
        tx.commit().await?;

        info!(return_id = %id, refund = %refund, points = reverted, "Return completed");

        self.state
            .publish(DomainEvent::ReturnCompleted {
                return_id: id,
                order_id: order.id,
                refund_amount: refund,
            })
            .await;
        match UserRepository::new(self.state.pool()).get_by_id(completed.user_id).await {
            Ok(Some(owner)) => self.state.notify(OutgoingEmail::ReturnCompleted {
                to: owner.email.to_string(),
                name: owner.name,
                request: Box::new(completed.clone()),
            }),
            Ok(None) => warn!(return_id = %id, "Return owner not found, email skipped"),
            Err(e) => warn!(return_id = %id, error = %e, "Failed to load return owner"),
        }

        Ok(completed)
    }
}

/// Check requested lines against what was bought and already returned.
fn check_lines(
    lines: &[ReturnLineInput],
    purchased: &[OrderItem],
    already: &HashMap<OrderItemId, i64>,
) -> Result<(), AppError> {
    if lines.is_empty() {
        return Err(ReturnQuantityError::Empty.into());
    }

    let mut seen = HashSet::new();
    for line in lines {
        if !seen.insert(line.order_item_id) {
            return Err(AppError::BadRequest(format!(
                "Item {} is listed more than once",
                line.order_item_id
            )));
        }
        let item = purchased
            .iter()
            .find(|item| item.id == line.order_item_id)
            .ok_or_else(|| {
                AppError::BadRequest(format!("Item {} is not part of this order", line.order_item_id))
            })?;

        let bought = u32::try_from(item.quantity).unwrap_or(0);
        let returned = already
            .get(&item.id)
            .map_or(0, |&n| u32::try_from(n).unwrap_or(u32::MAX));
        check_return_quantity(line.quantity, bought, returned)?;
    }
    Ok(())
}

fn returned_lines(items: &[ReturnItem]) -> Result<Vec<ReturnedLine>, AppError> {
    items
        .iter()
        .map(|item| {
            let quantity = u32::try_from(item.quantity)
                .map_err(|_| AppError::Internal(format!("negative return quantity on item {}", item.id)))?;
            Ok(ReturnedLine {
                unit_price: item.unit_price,
                quantity,
            })
        })
        .collect()
}

/// Whether every purchased unit is covered by a return.
fn fully_returned(purchased: &[OrderItem], returned: &HashMap<OrderItemId, i64>) -> bool {
    purchased.iter().all(|item| {
        returned.get(&item.id).copied().unwrap_or(0) >= i64::from(item.quantity)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mercado_core::ProductId;

    use super::*;

    fn item(id: i32, quantity: i32) -> OrderItem {
        OrderItem {
            id: OrderItemId::new(id),
            order_id: OrderId::new(1),
            product_id: ProductId::new(id * 10),
            product_name: format!("Product {id}"),
            unit_price: Price::from_cents(5_000),
            quantity,
        }
    }

    fn line(id: i32, quantity: u32) -> ReturnLineInput {
        ReturnLineInput {
            order_item_id: OrderItemId::new(id),
            quantity,
        }
    }

    #[test]
    fn test_check_lines_accepts_remaining_quantity() {
        let purchased = [item(1, 3), item(2, 1)];
        let already = HashMap::from([(OrderItemId::new(1), 1)]);

        assert!(check_lines(&[line(1, 2), line(2, 1)], &purchased, &already).is_ok());
    }

    #[test]
    fn test_check_lines_rejects_over_return() {
        let purchased = [item(1, 3)];
        let already = HashMap::from([(OrderItemId::new(1), 2)]);

        let err = check_lines(&[line(1, 2)], &purchased, &already).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref msg) if msg.contains("only 1 remain")));
    }

    #[test]
    fn test_check_lines_rejects_bad_input() {
        let purchased = [item(1, 3)];
        let none = HashMap::new();

        assert!(check_lines(&[], &purchased, &none).is_err());
        assert!(check_lines(&[line(1, 0)], &purchased, &none).is_err());
        assert!(check_lines(&[line(9, 1)], &purchased, &none).is_err());
        assert!(check_lines(&[line(1, 1), line(1, 1)], &purchased, &none).is_err());
    }

    #[test]
    fn test_fully_returned() {
        let purchased = [item(1, 2), item(2, 1)];

        let partial = HashMap::from([(OrderItemId::new(1), 2)]);
        assert!(!fully_returned(&purchased, &partial));

        let all = HashMap::from([(OrderItemId::new(1), 2), (OrderItemId::new(2), 1)]);
        assert!(fully_returned(&purchased, &all));
    }
}
