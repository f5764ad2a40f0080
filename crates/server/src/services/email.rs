//! Transactional email.
//!
//! SMTP via lettre, multipart text + HTML bodies rendered from Askama
//! templates. Sending happens on a spawned task; failures are logged and
//! never reach the request that triggered them.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use mercado_core::{CurrencyCode, OrderStatus, Price};

use crate::config::EmailConfig;
use crate::db::orders::{Order, OrderItem};
use crate::db::returns::ReturnRequest;
use crate::routes::store::order_page_path;

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// An email waiting to be rendered and sent.
#[derive(Debug, Clone)]
pub enum OutgoingEmail {
    Welcome {
        to: String,
        name: String,
    },
    OrderPlaced {
        to: String,
        name: String,
        order: Box<Order>,
        items: Vec<OrderItem>,
    },
    OrderStatusChanged {
        to: String,
        name: String,
        order: Box<Order>,
    },
    ReturnCompleted {
        to: String,
        name: String,
        request: Box<ReturnRequest>,
    },
}

impl OutgoingEmail {
    fn recipient(&self) -> &str {
        match self {
            Self::Welcome { to, .. }
            | Self::OrderPlaced { to, .. }
            | Self::OrderStatusChanged { to, .. }
            | Self::ReturnCompleted { to, .. } => to,
        }
    }
}

/// A rendered email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub text: String,
    pub html: String,
}

fn money(price: Price) -> String {
    price.display(CurrencyCode::BRL)
}

/// One order line as shown in an email.
struct EmailLine {
    name: String,
    quantity: i32,
    total: String,
}

#[derive(Template)]
#[template(path = "email/welcome.html")]
struct WelcomeHtml<'a> {
    name: &'a str,
    shop_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/welcome.txt")]
struct WelcomeText<'a> {
    name: &'a str,
    shop_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_placed.html")]
struct OrderPlacedHtml<'a> {
    name: &'a str,
    order_id: String,
    lines: &'a [EmailLine],
    subtotal: String,
    discount: String,
    shipping: String,
    total: String,
    order_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_placed.txt")]
struct OrderPlacedText<'a> {
    name: &'a str,
    order_id: String,
    lines: &'a [EmailLine],
    subtotal: String,
    discount: String,
    shipping: String,
    total: String,
    order_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_status.html")]
struct OrderStatusHtml<'a> {
    name: &'a str,
    order_id: String,
    status: &'a str,
    tracking_code: Option<&'a str>,
    carrier: Option<&'a str>,
    order_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_status.txt")]
struct OrderStatusText<'a> {
    name: &'a str,
    order_id: String,
    status: &'a str,
    tracking_code: Option<&'a str>,
    carrier: Option<&'a str>,
    order_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/return_completed.html")]
struct ReturnCompletedHtml<'a> {
    name: &'a str,
    return_id: String,
    order_id: String,
    refund: Option<String>,
    points_reverted: i64,
}

#[derive(Template)]
#[template(path = "email/return_completed.txt")]
struct ReturnCompletedText<'a> {
    name: &'a str,
    return_id: String,
    order_id: String,
    refund: Option<String>,
    points_reverted: i64,
}

/// Render an email. `base_url` is used for links back to the storefront.
///
/// # Errors
///
/// Returns `EmailError::Template` if a template fails to render.
pub fn render(email: &OutgoingEmail, base_url: &str) -> Result<RenderedEmail, EmailError> {
    let base_url = base_url.trim_end_matches('/');

    match email {
        OutgoingEmail::Welcome { name, .. } => {
            let shop_url = format!("{base_url}/store");
            Ok(RenderedEmail {
                subject: "Welcome to Mercado".to_owned(),
                text: WelcomeText { name, shop_url: &shop_url }.render()?,
                html: WelcomeHtml { name, shop_url: &shop_url }.render()?,
            })
        }
        OutgoingEmail::OrderPlaced {
            name, order, items, ..
        } => {
            let lines: Vec<EmailLine> = items
                .iter()
                .map(|item| EmailLine {
                    name: item.product_name.clone(),
                    quantity: item.quantity,
                    total: money(item.line_total()),
                })
                .collect();
            let order_url = format!("{base_url}{}", order_page_path(order.id));
            let discount = money(order.discount + order.points_discount);

            Ok(RenderedEmail {
                subject: format!("Order #{} received", order.id),
                text: OrderPlacedText {
                    name,
                    order_id: order.id.to_string(),
                    lines: &lines,
                    subtotal: money(order.subtotal),
                    discount: discount.clone(),
                    shipping: money(order.shipping),
                    total: money(order.total),
                    order_url: &order_url,
                }
                .render()?,
                html: OrderPlacedHtml {
                    name,
                    order_id: order.id.to_string(),
                    lines: &lines,
                    subtotal: money(order.subtotal),
                    discount,
                    shipping: money(order.shipping),
                    total: money(order.total),
                    order_url: &order_url,
                }
                .render()?,
            })
        }
        OutgoingEmail::OrderStatusChanged { name, order, .. } => {
            let order_url = format!("{base_url}{}", order_page_path(order.id));
            let status = order.status.label();
            let tracking_code = (order.status == OrderStatus::Shipped)
                .then_some(order.tracking_code.as_deref())
                .flatten();
            let carrier = order.carrier.as_deref();

            Ok(RenderedEmail {
                subject: format!("Order #{}: {status}", order.id),
                text: OrderStatusText {
                    name,
                    order_id: order.id.to_string(),
                    status,
                    tracking_code,
                    carrier,
                    order_url: &order_url,
                }
                .render()?,
                html: OrderStatusHtml {
                    name,
                    order_id: order.id.to_string(),
                    status,
                    tracking_code,
                    carrier,
                    order_url: &order_url,
                }
                .render()?,
            })
        }
        OutgoingEmail::ReturnCompleted { name, request, .. } => {
            let refund = (!request.refund_amount.is_zero()).then(|| money(request.refund_amount));
            Ok(RenderedEmail {
                subject: format!("Return #{} completed", request.id),
                text: ReturnCompletedText {
                    name,
                    return_id: request.id.to_string(),
                    order_id: request.order_id.to_string(),
                    refund: refund.clone(),
                    points_reverted: request.points_reverted,
                }
                .render()?,
                html: ReturnCompletedHtml {
                    name,
                    return_id: request.id.to_string(),
                    order_id: request.order_id.to_string(),
                    refund,
                    points_reverted: request.points_reverted,
                }
                .render()?,
            })
        }
    }
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    base_url: String,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig, base_url: &str) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
            base_url: base_url.to_owned(),
        })
    }

    /// Render and send an email.
    ///
    /// # Errors
    ///
    /// Returns error if the email fails to render or send.
    pub async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        let rendered = render(email, &self.base_url)?;
        self.send_multipart_email(
            email.recipient(),
            &rendered.subject,
            &rendered.text,
            &rendered.html,
        )
        .await
    }

    /// Send on a background task, logging failures.
    pub fn dispatch(&self, email: OutgoingEmail) {
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.send(&email).await {
                tracing::warn!(error = %e, to = %email.recipient(), "Failed to send email");
            }
        });
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        self.mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use sqlx::types::Json;

    use mercado_core::{OrderId, OrderItemId, PaymentStatus, ProductId, UserId};

    use super::*;
    use crate::db::addresses::AddressSnapshot;

    fn order(status: OrderStatus) -> Order {
        Order {
            id: OrderId::new(1001),
            user_id: UserId::new(1),
            status,
            payment_status: PaymentStatus::Pending,
            subtotal: Price::from_cents(25_000),
            discount: Price::from_cents(2_500),
            points_discount: Price::from_cents(500),
            shipping: Price::ZERO,
            total: Price::from_cents(22_000),
            coupon_id: None,
            points_redeemed: 500,
            points_earned: 0,
            shipping_address: Json(AddressSnapshot {
                recipient: "Ana Souza".to_string(),
                street: "Praça da Sé".to_string(),
                number: "100".to_string(),
                complement: None,
                district: "Sé".to_string(),
                city: "São Paulo".to_string(),
                state: "SP".to_string(),
                postal_code: "01001000".to_string(),
                phone: None,
            }),
            tracking_code: Some("BR123456789".to_string()),
            carrier: Some("Correios".to_string()),
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            paid_at: None,
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
        }
    }

    #[test]
    fn test_render_welcome() {
        let email = OutgoingEmail::Welcome {
            to: "ana@example.com".to_string(),
            name: "Ana".to_string(),
        };
        let rendered = render(&email, "https://loja.test/").unwrap();
        assert_eq!(rendered.subject, "Welcome to Mercado");
        assert!(rendered.text.contains("Ana"));
        assert!(rendered.text.contains("https://loja.test/store"));
        assert!(rendered.html.contains("Ana"));
    }

    #[test]
    fn test_render_order_placed() {
        let email = OutgoingEmail::OrderPlaced {
            to: "ana@example.com".to_string(),
            name: "Ana".to_string(),
            order: Box::new(order(OrderStatus::Pending)),
            items: vec![OrderItem {
                id: OrderItemId::new(1),
                order_id: OrderId::new(1001),
                product_id: ProductId::new(5),
                product_name: "Café especial 500g".to_string(),
                unit_price: Price::from_cents(12_500),
                quantity: 2,
            }],
        };
        let rendered = render(&email, "https://loja.test").unwrap();
        assert_eq!(rendered.subject, "Order #1001 received");
        assert!(rendered.text.contains("Café especial 500g"));
        assert!(rendered.text.contains("R$ 220,00"));
        assert!(rendered.text.contains("https://loja.test/store/account/orders/1001"));
        assert!(rendered.html.contains("Café especial 500g"));
    }

    #[test]
    fn test_render_status_includes_tracking_only_when_shipped() {
        let shipped = OutgoingEmail::OrderStatusChanged {
            to: "ana@example.com".to_string(),
            name: "Ana".to_string(),
            order: Box::new(order(OrderStatus::Shipped)),
        };
        assert!(render(&shipped, "https://loja.test").unwrap().text.contains("BR123456789"));

        let paid = OutgoingEmail::OrderStatusChanged {
            to: "ana@example.com".to_string(),
            name: "Ana".to_string(),
            order: Box::new(order(OrderStatus::Paid)),
        };
        assert!(!render(&paid, "https://loja.test").unwrap().text.contains("BR123456789"));
    }
}
