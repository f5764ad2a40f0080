//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;
use thiserror::Error;

use crate::config::ServerConfig;
use crate::services::cep::CepClient;
use crate::services::email::{EmailService, OutgoingEmail};
use crate::services::events::{DomainEvent, EventPublisher};
use crate::services::payments::{HttpPaymentGateway, PaymentGateway};

/// Error building the application state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("email transport: {0}")]
    Email(#[from] lettre::transport::smtp::Error),
    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    pool: PgPool,
    email: Option<EmailService>,
    events: EventPublisher,
    payments: Option<Arc<dyn PaymentGateway>>,
    cep: CepClient,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Optional integrations (email, payments) are built only when their
    /// configuration is present.
    ///
    /// # Errors
    ///
    /// Returns an error if the SMTP transport or HTTP client cannot be built.
    pub fn new(
        config: ServerConfig,
        pool: PgPool,
        events: EventPublisher,
    ) -> Result<Self, StateError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("mercado/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let email = config
            .email
            .as_ref()
            .map(|email| EmailService::new(email, &config.base_url))
            .transpose()?;
        if email.is_none() {
            tracing::info!("SMTP not configured, transactional email disabled");
        }

        let payments = config.payment.as_ref().map(|payment| {
            Arc::new(HttpPaymentGateway::new(http.clone(), payment)) as Arc<dyn PaymentGateway>
        });

        let cep = CepClient::new(http, &config.cep_api_base_url);

        Ok(Self::from_parts(config, pool, email, events, payments, cep))
    }

    /// Assemble a state from already-built parts.
    #[must_use]
    pub fn from_parts(
        config: ServerConfig,
        pool: PgPool,
        email: Option<EmailService>,
        events: EventPublisher,
        payments: Option<Arc<dyn PaymentGateway>>,
        cep: CepClient,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                email,
                events,
                payments,
                cep,
            }),
        }
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Payment gateway, when configured.
    #[must_use]
    pub fn payments(&self) -> Option<&dyn PaymentGateway> {
        self.inner.payments.as_deref()
    }

    /// Postal code lookup client.
    #[must_use]
    pub fn cep(&self) -> &CepClient {
        &self.inner.cep
    }

    /// Publish a domain event (best-effort).
    pub async fn publish(&self, event: DomainEvent) {
        self.inner.events.publish(event).await;
    }

    /// Queue a transactional email (best-effort, skipped without SMTP).
    pub fn notify(&self, email: OutgoingEmail) {
        match &self.inner.email {
            Some(service) => service.dispatch(email),
            None => tracing::debug!(?email, "Email skipped (SMTP not configured)"),
        }
    }
}
