//! Shipment tracking events.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};

use mercado_core::{OrderId, TrackingEventId};

use super::RepositoryError;

/// A carrier or warehouse event on an order's shipment.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct TrackingEvent {
    pub id: TrackingEventId,
    #[serde(skip)]
    pub order_id: OrderId,
    /// Free-form carrier status, e.g. `in_transit`.
    pub status: String,
    pub location: Option<String>,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

pub struct TrackingRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> TrackingRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Events of an order, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn events(&self, order_id: OrderId) -> Result<Vec<TrackingEvent>, RepositoryError> {
        let events = sqlx::query_as::<_, TrackingEvent>(
            r"
            SELECT id, order_id, status, location, description, occurred_at
            FROM order_tracking_events
            WHERE order_id = $1
            ORDER BY occurred_at, id
            ",
        )
        .bind(order_id)
        .fetch_all(self.pool)
        .await?;

        Ok(events)
    }
}

/// Append an event.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the insert fails.
pub async fn append(
    conn: &mut PgConnection,
    order_id: OrderId,
    status: &str,
    location: Option<&str>,
    description: &str,
) -> Result<TrackingEvent, RepositoryError> {
    let event = sqlx::query_as::<_, TrackingEvent>(
        r"
        INSERT INTO order_tracking_events (order_id, status, location, description)
        VALUES ($1, $2, $3, $4)
        RETURNING id, order_id, status, location, description, occurred_at
        ",
    )
    .bind(order_id)
    .bind(status)
    .bind(location)
    .bind(description)
    .fetch_one(conn)
    .await?;

    Ok(event)
}
