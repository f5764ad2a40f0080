//! Best-effort domain event fan-out over NATS.
//!
//! Events are published on `<prefix>.<event>` (e.g. `mercado.order.created`)
//! as JSON envelopes. Publishing never fails the caller: without a NATS
//! configuration events are logged at debug and dropped, and publish errors
//! are logged at warn.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use mercado_core::{OrderId, OrderStatus, Price, ReturnId, UserId};

use crate::config::NatsConfig;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Something that happened that other systems may care about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    OrderCreated {
        order_id: OrderId,
        user_id: UserId,
        total: Price,
    },
    OrderStatusChanged {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },
    OrderCancelled {
        order_id: OrderId,
        user_id: UserId,
    },
    PaymentConfirmed {
        order_id: OrderId,
        provider_reference: String,
        amount: Price,
    },
    ReturnCompleted {
        return_id: ReturnId,
        order_id: OrderId,
        refund_amount: Price,
    },
}

impl DomainEvent {
    /// Event name, which is also the subject suffix.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::OrderCreated { .. } => "order.created",
            Self::OrderStatusChanged { .. } => "order.status_changed",
            Self::OrderCancelled { .. } => "order.cancelled",
            Self::PaymentConfirmed { .. } => "payment.confirmed",
            Self::ReturnCompleted { .. } => "return.completed",
        }
    }
}

/// Wire format of a published event.
#[derive(Debug, Serialize)]
struct Envelope<'a> {
    event: &'static str,
    occurred_at: DateTime<Utc>,
    data: &'a DomainEvent,
}

/// Publishes [`DomainEvent`]s. Cheap to clone.
#[derive(Clone)]
pub struct EventPublisher {
    client: Option<async_nats::Client>,
    subject_prefix: String,
}

impl EventPublisher {
    /// A publisher that drops every event.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            client: None,
            subject_prefix: "mercado".to_owned(),
        }
    }

    /// Connect to NATS, or return a disabled publisher when `config` is `None`.
    ///
    /// The initial connection is retried in the background, so an unreachable
    /// server at startup does not block the API.
    ///
    /// # Errors
    ///
    /// Returns an error if the server URL cannot be parsed.
    pub async fn connect(config: Option<&NatsConfig>) -> Result<Self, async_nats::ConnectError> {
        let Some(config) = config else {
            tracing::info!("NATS not configured, domain events will be dropped");
            return Ok(Self::disabled());
        };

        let client = async_nats::ConnectOptions::new()
            .connection_timeout(CONNECT_TIMEOUT)
            .retry_on_initial_connect()
            .connect(config.url.as_str())
            .await?;

        tracing::info!(url = %config.url, "NATS event publisher connected");
        Ok(Self {
            client: Some(client),
            subject_prefix: config.subject_prefix.clone(),
        })
    }

    /// Subject an event is published on.
    #[must_use]
    pub fn subject_for(&self, event: &DomainEvent) -> String {
        format!("{}.{}", self.subject_prefix, event.name())
    }

    /// Publish an event, logging instead of failing.
    pub async fn publish(&self, event: DomainEvent) {
        let subject = self.subject_for(&event);

        let Some(client) = &self.client else {
            tracing::debug!(subject = %subject, ?event, "Event dropped (NATS not configured)");
            return;
        };

        let payload = match encode(&event, Utc::now()) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(subject = %subject, error = %e, "Failed to encode event");
                return;
            }
        };

        if let Err(e) = client.publish(subject.clone(), payload.into()).await {
            tracing::warn!(subject = %subject, error = %e, "Failed to publish event");
        }
    }
}

fn encode(event: &DomainEvent, occurred_at: DateTime<Utc>) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&Envelope {
        event: event.name(),
        occurred_at,
        data: event,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_subjects() {
        let publisher = EventPublisher::disabled();
        let event = DomainEvent::OrderCancelled {
            order_id: OrderId::new(7),
            user_id: UserId::new(3),
        };
        assert_eq!(publisher.subject_for(&event), "mercado.order.cancelled");
    }

    #[test]
    fn test_envelope_shape() {
        let event = DomainEvent::OrderStatusChanged {
            order_id: OrderId::new(42),
            from: OrderStatus::Paid,
            to: OrderStatus::Processing,
        };
        let payload = encode(&event, Utc::now()).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();

        assert_eq!(json["event"], "order.status_changed");
        assert_eq!(json["data"]["order_id"], 42);
        assert_eq!(json["data"]["from"], "paid");
        assert_eq!(json["data"]["to"], "processing");
        assert!(json["occurred_at"].is_string());
    }

    #[tokio::test]
    async fn test_disabled_publish_is_noop() {
        EventPublisher::disabled()
            .publish(DomainEvent::OrderCreated {
                order_id: OrderId::new(1),
                user_id: UserId::new(1),
                total: Price::from_cents(1000),
            })
            .await;
    }
}
