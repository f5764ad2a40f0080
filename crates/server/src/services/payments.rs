//! Hosted checkout at the payment gateway and its webhook.
//!
//! The gateway is reached through [`PaymentGateway`] so handlers never see
//! the wire format. Notifications are authenticated with an HMAC-SHA256 of
//! the raw body and applied idempotently inside one transaction.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use mercado_core::{OrderId, OrderStatus, PaymentStatus, Price};

use crate::config::PaymentConfig;
use crate::db::payments::{self, Payment};
use crate::db::{OrderRepository, PaymentRepository, orders};
use crate::error::AppError;
use crate::models::CurrentUser;
use crate::routes::store::order_page_path;
use crate::services::events::DomainEvent;
use crate::state::AppState;

/// Header carrying the hex HMAC of the notification body.
pub const SIGNATURE_HEADER: &str = "x-signature";

/// Public path of the webhook handler, as advertised to the gateway.
pub const NOTIFICATION_PATH: &str = "/api/payments/notifications";

/// Errors from the payment gateway.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        Self::BadGateway(err.to_string())
    }
}

/// What the gateway needs to open a hosted checkout.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRequest {
    pub reference: String,
    pub amount: Price,
    pub currency: &'static str,
    pub description: String,
    pub customer_email: String,
    pub return_url: String,
    pub notification_url: String,
}

/// A checkout opened at the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub reference: String,
    pub checkout_url: String,
}

/// Payment provider seam.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a hosted checkout session.
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, PaymentError>;
}

/// JSON-over-HTTPS gateway client.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: Client,
    api_url: String,
    api_token: SecretString,
}

impl std::fmt::Debug for HttpPaymentGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPaymentGateway")
            .field("api_url", &self.api_url)
            .field("api_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl HttpPaymentGateway {
    #[must_use]
    pub fn new(client: Client, config: &PaymentConfig) -> Self {
        Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            api_token: config.api_token.clone(),
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, request), fields(reference = %request.reference))]
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, PaymentError> {
        let response = self
            .client
            .post(format!("{}/checkouts", self.api_url))
            .bearer_auth(self.api_token.expose_secret())
            .timeout(std::time::Duration::from_secs(15))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PaymentError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let session = response.json::<CheckoutSession>().await?;
        debug!(checkout_url = %session.checkout_url, "Checkout session created");
        Ok(session)
    }
}

/// Check a hex HMAC-SHA256 `signature` of `body` under `secret`.
#[must_use]
pub fn verify_signature(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_compare(&expected, &signature.trim().to_ascii_lowercase())
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

/// Status reported by a gateway notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Authorized,
    Paid,
    Failed,
    Cancelled,
}

/// Webhook body.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentNotification {
    pub reference: String,
    pub status: NotificationStatus,
    pub amount: Price,
}

/// Result of applying a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    Applied,
    /// Already in that state, or superseded by a settled payment.
    Ignored,
}

/// Redirect returned to the customer.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct CheckoutStarted {
    pub payment_id: mercado_core::PaymentId,
    pub reference: String,
    pub checkout_url: String,
}

/// Payment workflows.
pub struct PaymentService<'a> {
    state: &'a AppState,
}

impl<'a> PaymentService<'a> {
    #[must_use]
    pub const fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Open a hosted checkout for one of the customer's pending orders.
    ///
    /// # Errors
    ///
    /// `NotFound` for foreign orders, `Conflict` unless the order is pending
    /// and unpaid, `BadGateway` if the gateway is missing or fails.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn start_checkout(
        &self,
        user: &CurrentUser,
        order_id: OrderId,
    ) -> Result<CheckoutStarted, AppError> {
        let gateway = self
            .state
            .payments()
            .ok_or_else(|| AppError::BadGateway("payment gateway is not configured".to_string()))?;

        let pool = self.state.pool();
        let order = OrderRepository::new(pool)
            .get(order_id)
            .await?
            .filter(|order| order.user_id == user.id)
            .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

        if order.payment_status == PaymentStatus::Paid {
            return Err(AppError::Conflict("Order has already been paid".to_string()));
        }
        if order.status != OrderStatus::Pending {
            return Err(AppError::Conflict(format!(
                "Order is {} and cannot be paid",
                order.status.label().to_lowercase()
            )));
        }

        let config = self.state.config();
        let request = CheckoutRequest {
            reference: format!("MRC-{}-{}", order.id, uuid::Uuid::new_v4().simple()),
            amount: order.total,
            currency: "BRL",
            description: format!("Mercado order #{}", order.id),
            customer_email: user.email.to_string(),
            return_url: config.url_for(&order_page_path(order.id)),
            notification_url: config.url_for(NOTIFICATION_PATH),
        };

        let session = gateway.create_checkout(&request).await?;
        let payment = PaymentRepository::new(pool)
            .create(order.id, &session.reference, order.total, &session.checkout_url)
            .await?;

        info!(order_id = %order.id, reference = %payment.provider_reference, "Checkout started");
        Ok(CheckoutStarted {
            payment_id: payment.id,
            reference: payment.provider_reference,
            checkout_url: session.checkout_url,
        })
    }

    /// Authenticate and apply a gateway notification.
    ///
    /// # Errors
    ///
    /// `Unauthorized` for a bad signature, `BadRequest` for a malformed body
    /// or an amount mismatch, `NotFound` for an unknown reference.
    #[instrument(skip(self, signature, body))]
    pub async fn handle_notification(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<NotificationOutcome, AppError> {
        let secret = self
            .state
            .config()
            .payment
            .as_ref()
            .map(|payment| payment.webhook_secret.clone())
            .ok_or_else(|| AppError::BadGateway("payment gateway is not configured".to_string()))?;

        let valid = signature
            .is_some_and(|sig| verify_signature(secret.expose_secret().as_bytes(), body, sig));
        if !valid {
            warn!("Payment notification with invalid signature");
            return Err(AppError::Unauthorized("Invalid signature".to_string()));
        }

        let notification: PaymentNotification = serde_json::from_slice(body)
            .map_err(|e| AppError::BadRequest(format!("Invalid notification: {e}")))?;

        let mut tx = self.state.pool().begin().await?;

        let payment = payments::lock_by_reference(&mut tx, &notification.reference)
            .await?
            .ok_or_else(|| AppError::NotFound("Unknown payment reference".to_string()))?;

        if notification.amount != payment.amount {
            warn!(
                reference = %payment.provider_reference,
                expected = %payment.amount,
                received = %notification.amount,
                "Payment notification amount mismatch"
            );
            return Err(AppError::BadRequest("Amount does not match payment".to_string()));
        }

        let Some(next) = next_payment_status(payment.status, notification.status) else {
            tx.commit().await?;
            debug!(reference = %payment.provider_reference, "Notification already applied");
            return Ok(NotificationOutcome::Ignored);
        };

        payments::set_status(&mut tx, payment.id, next).await?;

        let order = orders::lock(&mut tx, payment.order_id).await?;
        match next_order_payment_status(order.payment_status, next) {
            Some(status) => orders::set_payment_status(&mut tx, order.id, status).await?,
            None => debug!(
                order_id = %order.id,
                order_payment_status = %order.payment_status,
                payment_status = %next,
                "Order payment already settled, leaving it unchanged"
            ),
        }

        let mut events = Vec::new();
        if next == PaymentStatus::Paid {
            events = self.confirm_order(&mut tx, &payment).await?;
        }

        tx.commit().await?;
        info!(
            reference = %payment.provider_reference,
            status = %next,
            "Payment notification applied"
        );

        for event in events {
            self.state.publish(event).await;
        }
        Ok(NotificationOutcome::Applied)
    }

    async fn confirm_order(
        &self,
        conn: &mut sqlx::PgConnection,
        payment: &Payment,
    ) -> Result<Vec<DomainEvent>, AppError> {
        let order = orders::lock(conn, payment.order_id).await?;
        let mut events = vec![DomainEvent::PaymentConfirmed {
            order_id: order.id,
            provider_reference: payment.provider_reference.clone(),
            amount: payment.amount,
        }];

        if order.status.can_transition_to(OrderStatus::Paid) {
            let updated = orders::set_status(conn, order.id, OrderStatus::Paid).await?;
            events.push(DomainEvent::OrderStatusChanged {
                order_id: order.id,
                from: order.status,
                to: updated.status,
            });
        } else {
            warn!(
                order_id = %order.id,
                status = %order.status,
                "Payment confirmed for an order that is no longer pending"
            );
        }
        Ok(events)
    }
}

/// Payment status after a notification, or `None` when nothing changes.
///
/// A settled payment never moves back; a repeated status is a no-op.
fn next_payment_status(current: PaymentStatus, reported: NotificationStatus) -> Option<PaymentStatus> {
    let next = match reported {
        NotificationStatus::Paid => PaymentStatus::Paid,
        NotificationStatus::Authorized => PaymentStatus::Authorized,
        NotificationStatus::Failed | NotificationStatus::Cancelled => PaymentStatus::Failed,
    };

    if current == next || current.is_settled() {
        return None;
    }
    if next == PaymentStatus::Authorized && current == PaymentStatus::Failed {
        return None;
    }
    Some(next)
}

/// Order-level payment status after one of its payments moves to
/// `payment`, or `None` to leave the order as it is.
///
/// An order can hold several checkout attempts. Once any of them settles the
/// order, later attempts no longer change it.
fn next_order_payment_status(order: PaymentStatus, payment: PaymentStatus) -> Option<PaymentStatus> {
    if order == payment || order.is_settled() {
        return None;
    }
    Some(payment)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "abcd"));
    }

    #[test]
    fn test_signature_valid() {
        let body = br#"{"reference":"MRC-1-abc","status":"paid","amount":"220.00"}"#;
        let signature = sign("whsec_test", body);
        assert!(verify_signature(b"whsec_test", body, &signature));
        assert!(verify_signature(b"whsec_test", body, &signature.to_uppercase()));
    }

    #[test]
    fn test_signature_rejects_tampering() {
        let body = br#"{"reference":"MRC-1-abc","status":"paid","amount":"220.00"}"#;
        let signature = sign("whsec_test", body);

        let tampered = br#"{"reference":"MRC-1-abc","status":"paid","amount":"1.00"}"#;
        assert!(!verify_signature(b"whsec_test", tampered, &signature));
        assert!(!verify_signature(b"other_secret", body, &signature));
        assert!(!verify_signature(b"whsec_test", body, "not-hex"));
    }

    #[test]
    fn test_notification_parses() {
        let body = r#"{"reference":"MRC-7-x","status":"cancelled","amount":"99.90"}"#;
        let notification: PaymentNotification = serde_json::from_str(body).unwrap();
        assert_eq!(notification.status, NotificationStatus::Cancelled);
        assert_eq!(notification.amount, Price::from_cents(9_990));
    }

    #[test]
    fn test_next_payment_status() {
        use NotificationStatus as N;
        use PaymentStatus as P;

        assert_eq!(next_payment_status(P::Pending, N::Paid), Some(P::Paid));
        assert_eq!(next_payment_status(P::Authorized, N::Paid), Some(P::Paid));
        assert_eq!(next_payment_status(P::Pending, N::Authorized), Some(P::Authorized));
        assert_eq!(next_payment_status(P::Pending, N::Cancelled), Some(P::Failed));
        assert_eq!(next_payment_status(P::Authorized, N::Failed), Some(P::Failed));

        // idempotent
        assert_eq!(next_payment_status(P::Paid, N::Paid), None);
        assert_eq!(next_payment_status(P::Failed, N::Failed), None);

        // settled payments stay settled
        assert_eq!(next_payment_status(P::Paid, N::Failed), None);
        assert_eq!(next_payment_status(P::Refunded, N::Paid), None);
        assert_eq!(next_payment_status(P::Failed, N::Authorized), None);
    }

    #[test]
    fn test_second_checkout_does_not_unsettle_order() {
        use PaymentStatus as P;

        // first attempt paid the order; a second, abandoned attempt expires
        let expired = next_payment_status(P::Pending, NotificationStatus::Cancelled).unwrap();
        assert_eq!(expired, P::Failed);
        assert_eq!(next_order_payment_status(P::Paid, expired), None);
        assert_eq!(next_order_payment_status(P::Refunded, P::Paid), None);

        assert_eq!(next_order_payment_status(P::Pending, P::Paid), Some(P::Paid));
        assert_eq!(next_order_payment_status(P::Failed, P::Paid), Some(P::Paid));
        assert_eq!(next_order_payment_status(P::Authorized, P::Failed), Some(P::Failed));
        assert_eq!(next_order_payment_status(P::Paid, P::Paid), None);
    }

    #[test]
    fn test_notification_path_is_under_api() {
        assert_eq!(NOTIFICATION_PATH, "/api/payments/notifications");
    }
}
