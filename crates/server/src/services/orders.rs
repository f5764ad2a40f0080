//! Order lifecycle: checkout, cancellation and fulfilment.
//!
//! Every workflow here touches several tables (products, coupons, users,
//! orders, carts) and runs in one transaction. Events and emails go out only
//! after the commit.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use tracing::{info, instrument, warn};

use mercado_core::coupon::normalize_code;
use mercado_core::loyalty::{LoyaltyTier, points_for_purchase};
use mercado_core::pricing::{PricedLine, PricingInput, compute_totals};
use mercado_core::{AddressId, LoyaltyTransactionKind, OrderId, OrderStatus, PaymentStatus, ProductId};

use crate::db::carts::CartLine;
use crate::db::orders::{NewOrder, Order, OrderItem};
use crate::db::products::LockedProduct;
use crate::db::{
    AddressRepository, OrderRepository, UserRepository, carts, coupons, loyalty, orders, products,
    tracking,
};
use crate::error::AppError;
use crate::models::CurrentUser;
use crate::services::email::OutgoingEmail;
use crate::services::events::DomainEvent;
use crate::state::AppState;

/// Checkout request.
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct PlaceOrder {
    pub address_id: AddressId,
    pub coupon_code: Option<String>,
    /// Points to spend; 100 points = 1.00.
    #[serde(default)]
    pub redeem_points: i64,
    pub notes: Option<String>,
}

/// Admin status change.
#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct StatusUpdate {
    pub status: OrderStatus,
    pub tracking_code: Option<String>,
    pub carrier: Option<String>,
    /// Shown in the tracking history.
    pub note: Option<String>,
}

/// An order with its lines.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

pub struct OrderService<'a> {
    state: &'a AppState,
}

impl<'a> OrderService<'a> {
    #[must_use]
    pub const fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Turn the customer's cart into a pending order.
    ///
    /// # Errors
    ///
    /// `BadRequest` for an empty cart or a coupon/points problem, `NotFound`
    /// for an unknown address or coupon, `Conflict` when a product is
    /// unavailable or short on stock.
    #[instrument(skip(self, user, input), fields(user_id = %user.id))]
    pub async fn checkout(&self, user: &CurrentUser, input: &PlaceOrder) -> Result<OrderDetail, AppError> {
        if input.redeem_points < 0 {
            return Err(AppError::Validation(
                "redeem_points cannot be negative".to_string(),
            ));
        }
        let notes = input
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());
        if notes.is_some_and(|n| n.chars().count() > 500) {
            return Err(AppError::Validation(
                "notes must be at most 500 characters".to_string(),
            ));
        }

        let pool = self.state.pool();
        let address = AddressRepository::new(pool)
            .get(user.id, input.address_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Address not found".to_string()))?;
        let snapshot = address.snapshot();

        let mut tx = pool.begin().await?;

        let cart = carts::lines_for_user(&mut tx, user.id).await?;
        if cart.is_empty() {
            return Err(AppError::BadRequest("Cart is empty".to_string()));
        }

        let mut ids: Vec<ProductId> = cart.iter().map(|line| line.product_id).collect();
        ids.sort_unstable();
        let locked = products::lock_for_update(&mut tx, &ids).await?;
        let lines = reserve_lines(&cart, &locked)?;

        let coupon = match input.coupon_code.as_deref().map(normalize_code) {
            Some(code) if !code.is_empty() => Some(
                coupons::lock_by_code(&mut tx, &code)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Coupon not found".to_string()))?,
            ),
            _ => None,
        };
        let rule = coupon.as_ref().map(crate::db::coupons::Coupon::rule);

        let points_balance = if input.redeem_points > 0 {
            loyalty::lock_balance(&mut tx, user.id).await?.loyalty_points
        } else {
            0
        };

        let priced: Vec<PricedLine> = lines.iter().map(|line| line.priced).collect();
        let totals = compute_totals(&PricingInput {
            lines: &priced,
            coupon: rule.as_ref(),
            points_requested: input.redeem_points,
            points_balance,
            shipping: self.state.config().shipping,
            now: Utc::now(),
        })?;

        for line in &lines {
            products::decrement_stock(&mut tx, line.product_id, line.quantity).await?;
        }
        if let Some(coupon) = &coupon {
            coupons::increment_usage(&mut tx, coupon.id).await?;
        }

        let order = orders::insert(
            &mut tx,
            &NewOrder {
                user_id: user.id,
                totals: &totals,
                coupon_id: coupon.as_ref().map(|c| c.id),
                shipping_address: &snapshot,
                notes,
            },
        )
        .await?;

        for line in &lines {
            orders::insert_item(
                &mut tx,
                order.id,
                line.product_id,
                &line.name,
                line.priced.unit_price,
                line.quantity,
            )
            .await?;
        }

        if totals.points_redeemed > 0 {
            loyalty::record(
                &mut tx,
                user.id,
                Some(order.id),
                LoyaltyTransactionKind::Redeem,
                -totals.points_redeemed,
                &format!("Redeemed on order #{}", order.id),
            )
            .await?;
        }

        tracking::append(&mut tx, order.id, OrderStatus::Pending.as_str(), None, "Order placed").await?;
        carts::clear(&mut tx, user.id).await?;
        let items = orders::items(&mut tx, order.id).await?;

        tx.commit().await?;

        info!(order_id = %order.id, total = %order.total, "Order placed");
        let order_ref = order.id.to_string();
        crate::error::add_breadcrumb("checkout", "Order placed", Some(&[("order_id", order_ref.as_str())]));

        self.state
            .publish(DomainEvent::OrderCreated {
                order_id: order.id,
                user_id: user.id,
                total: order.total,
            })
            .await;
        self.state.notify(OutgoingEmail::OrderPlaced {
            to: user.email.to_string(),
            name: user.name.clone(),
            order: Box::new(order.clone()),
            items: items.clone(),
        });

        Ok(OrderDetail { order, items })
    }

    /// Cancel one of the customer's own orders.
    ///
    /// # Errors
    ///
    /// `NotFound` for foreign orders, `Conflict` once the order has shipped.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn cancel(&self, user: &CurrentUser, order_id: OrderId) -> Result<Order, AppError> {
        let mut tx = self.state.pool().begin().await?;

        let order = orders::lock(&mut tx, order_id).await?;
        if order.user_id != user.id {
            return Err(AppError::NotFound("Order not found".to_string()));
        }
        if !order.status.is_cancellable() {
            return Err(AppError::Conflict(format!(
                "Order is {} and can no longer be cancelled",
                order.status.label().to_lowercase()
            )));
        }

        let cancelled = cancel_locked(&mut tx, &order, "Cancelled by customer").await?;
        tx.commit().await?;

        info!(order_id = %order.id, "Order cancelled by customer");
        self.after_status_change(order.status, &cancelled).await;
        Ok(cancelled)
    }

    /// Move an order through fulfilment (admin).
    ///
    /// # Errors
    ///
    /// `BadRequest` for refund statuses or a missing tracking code,
    /// `Conflict` for transitions the order status does not allow.
    #[instrument(skip(self, update), fields(status = %update.status))]
    pub async fn update_status(&self, order_id: OrderId, update: &StatusUpdate) -> Result<Order, AppError> {
        let next = update.status;
        if matches!(next, OrderStatus::Refunded | OrderStatus::PartiallyRefunded) {
            return Err(AppError::BadRequest(
                "Refund statuses are set by completing a return".to_string(),
            ));
        }

        let mut tx = self.state.pool().begin().await?;
        let order = orders::lock(&mut tx, order_id).await?;

        if !order.status.can_transition_to(next) {
            return Err(AppError::Conflict(format!(
                "Cannot move order from {} to {}",
                order.status, next
            )));
        }

        let note = update
            .note
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());

        let updated = match next {
            OrderStatus::Cancelled => {
                cancel_locked(&mut tx, &order, note.unwrap_or("Cancelled by store")).await?
            }
            OrderStatus::Shipped => {
                let code = update
                    .tracking_code
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty());
                let carrier = update.carrier.as_deref().map(str::trim).filter(|c| !c.is_empty());
                let tracked = orders::set_tracking(&mut tx, order.id, code, carrier).await?;
                if tracked.tracking_code.is_none() {
                    return Err(AppError::BadRequest(
                        "A tracking code is required to ship an order".to_string(),
                    ));
                }
                let shipped = orders::set_status(&mut tx, order.id, next).await?;
                tracking::append(&mut tx, order.id, next.as_str(), None, note.unwrap_or(next.label())).await?;
                shipped
            }
            OrderStatus::Delivered => {
                let earned = award_points(&mut tx, &order).await?;
                let delivered = orders::set_status(&mut tx, order.id, next).await?;
                tracking::append(&mut tx, order.id, next.as_str(), None, note.unwrap_or(next.label())).await?;
                info!(order_id = %order.id, points = earned, "Loyalty points awarded");
                delivered
            }
            OrderStatus::Paid => {
                orders::set_payment_status(&mut tx, order.id, PaymentStatus::Paid).await?;
                let paid = orders::set_status(&mut tx, order.id, next).await?;
                tracking::append(&mut tx, order.id, next.as_str(), None, note.unwrap_or("Payment confirmed")).await?;
                paid
            }
            _ => {
                let moved = orders::set_status(&mut tx, order.id, next).await?;
                tracking::append(&mut tx, order.id, next.as_str(), None, note.unwrap_or(next.label())).await?;
                moved
            }
        };

        tx.commit().await?;

        info!(order_id = %order.id, from = %order.status, to = %next, "Order status changed");
        self.after_status_change(order.status, &updated).await;
        Ok(updated)
    }

    /// An order with its lines, visible to its owner and to admins.
    ///
    /// # Errors
    ///
    /// `NotFound` if the order does not exist or belongs to someone else.
    pub async fn get_for_viewer(&self, viewer: &CurrentUser, order_id: OrderId) -> Result<OrderDetail, AppError> {
        let repo = OrderRepository::new(self.state.pool());
        let order = repo
            .get(order_id)
            .await?
            .filter(|order| order.user_id == viewer.id || viewer.is_admin())
            .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;
        let items = repo.items(order.id).await?;
        Ok(OrderDetail { order, items })
    }

    async fn after_status_change(&self, from: OrderStatus, order: &Order) {
        self.state
            .publish(DomainEvent::OrderStatusChanged {
                order_id: order.id,
                from,
                to: order.status,
            })
            .await;
        if order.status == OrderStatus::Cancelled {
            self.state
                .publish(DomainEvent::OrderCancelled {
                    order_id: order.id,
                    user_id: order.user_id,
                })
                .await;
        }

        match UserRepository::new(self.state.pool()).get_by_id(order.user_id).await {
            Ok(Some(owner)) => self.state.notify(OutgoingEmail::OrderStatusChanged {
                to: owner.email.to_string(),
                name: owner.name,
                order: Box::new(order.clone()),
            }),
            Ok(None) => warn!(order_id = %order.id, "Order owner not found, status email skipped"),
            Err(e) => warn!(order_id = %order.id, error = %e, "Failed to load order owner"),
        }
    }
}

/// A cart line checked against its locked product row.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ReservedLine {
    product_id: ProductId,
    name: String,
    quantity: i32,
    priced: PricedLine,
}

/// Match cart lines to locked products, priced at the current price.
fn reserve_lines(cart: &[CartLine], locked: &[LockedProduct]) -> Result<Vec<ReservedLine>, AppError> {
    let by_id: HashMap<ProductId, &LockedProduct> = locked.iter().map(|p| (p.id, p)).collect();

    cart.iter()
        .map(|line| {
            let product = by_id
                .get(&line.product_id)
                .filter(|product| product.active)
                .ok_or_else(|| {
                    AppError::Conflict(format!("{} is no longer available", line.name))
                })?;

            if line.quantity > product.stock {
                return Err(AppError::Conflict(format!(
                    "Only {} units of {} in stock",
                    product.stock.max(0),
                    product.name
                )));
            }

            let quantity = u32::try_from(line.quantity)
                .map_err(|_| AppError::Internal(format!("negative cart quantity for {}", line.product_id)))?;

            Ok(ReservedLine {
                product_id: product.id,
                name: product.name.clone(),
                quantity: line.quantity,
                priced: PricedLine {
                    unit_price: product.price,
                    quantity,
                },
            })
        })
        .collect()
}

/// Undo a placed order: stock, redeemed points and coupon usage come back.
async fn cancel_locked(conn: &mut PgConnection, order: &Order, description: &str) -> Result<Order, AppError> {
    for item in orders::items(conn, order.id).await? {
        products::restore_stock(conn, item.product_id, item.quantity).await?;
    }

    if order.points_redeemed > 0 {
        loyalty::record(
            conn,
            order.user_id,
            Some(order.id),
            LoyaltyTransactionKind::Revert,
            order.points_redeemed,
            &format!("Refund of points redeemed on cancelled order #{}", order.id),
        )
        .await?;
    }

    if let Some(coupon_id) = order.coupon_id {
        coupons::decrement_usage(conn, coupon_id).await?;
    }

    let cancelled = orders::set_status(conn, order.id, OrderStatus::Cancelled).await?;
    tracking::append(conn, order.id, OrderStatus::Cancelled.as_str(), None, description).await?;
    Ok(cancelled)
}

/// Credit loyalty points for a delivered order at the owner's current tier.
async fn award_points(conn: &mut PgConnection, order: &Order) -> Result<i64, AppError> {
    let balance = loyalty::lock_balance(conn, order.user_id).await?;
    let tier = LoyaltyTier::for_points(balance.lifetime_points);
    let points = points_for_purchase(order.merchandise_value(), tier);

    if points > 0 {
        loyalty::record(
            conn,
            order.user_id,
            Some(order.id),
            LoyaltyTransactionKind::Earn,
            points,
            &format!("Earned on order #{} ({} tier)", order.id, tier.label()),
        )
        .await?;
        orders::set_points_earned(conn, order.id, points).await?;
    }
    Ok(points)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use mercado_core::Price;

    use super::*;

    fn cart_line(id: i32, name: &str, quantity: i32) -> CartLine {
        CartLine {
            product_id: ProductId::new(id),
            name: name.to_string(),
            slug: name.to_lowercase(),
            unit_price: Price::from_cents(1_000),
            quantity,
            stock: 10,
            active: true,
            image_url: None,
            added_at: Utc::now(),
        }
    }

    fn locked(id: i32, name: &str, price_cents: i64, stock: i32, active: bool) -> LockedProduct {
        LockedProduct {
            id: ProductId::new(id),
            name: name.to_string(),
            price: Price::from_cents(price_cents),
            stock,
            active,
        }
    }

    #[test]
    fn test_reserve_uses_locked_price() {
        let cart = [cart_line(1, "Mug", 2), cart_line(2, "Tee", 1)];
        let rows = [locked(1, "Mug", 1_250, 5, true), locked(2, "Tee", 4_990, 1, true)];

        let lines = reserve_lines(&cart, &rows).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].priced.unit_price, Price::from_cents(1_250));
        assert_eq!(lines[0].priced.quantity, 2);
        assert_eq!(lines[1].quantity, 1);
    }

    #[test]
    fn test_reserve_rejects_short_stock() {
        let cart = [cart_line(1, "Mug", 3)];
        let rows = [locked(1, "Mug", 1_000, 2, true)];

        let err = reserve_lines(&cart, &rows).unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref msg) if msg.contains("Mug")));
    }

    #[test]
    fn test_reserve_rejects_inactive_or_missing() {
        let cart = [cart_line(1, "Mug", 1)];

        let err = reserve_lines(&cart, &[locked(1, "Mug", 1_000, 5, false)]).unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref msg) if msg.contains("no longer available")));

        let err = reserve_lines(&cart, &[]).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
