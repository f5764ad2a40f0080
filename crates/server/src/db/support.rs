//! Support ticket repository.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use mercado_core::{OrderId, TicketId, TicketMessageId, TicketPriority, TicketStatus, UserId};

use super::{Pagination, RepositoryError};

const TICKET_COLUMNS: &str =
    "id, user_id, order_id, subject, status, priority, created_at, updated_at";

#[derive(Debug, Clone, Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct Ticket {
    pub id: TicketId,
    pub user_id: UserId,
    pub order_id: Option<OrderId>,
    pub subject: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct TicketMessage {
    pub id: TicketMessageId,
    pub author_id: UserId,
    pub author_name: String,
    pub is_staff: bool,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

pub struct SupportRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SupportRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Open a ticket with its first message.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the referenced order does not exist.
    pub async fn create(
        &self,
        user_id: UserId,
        order_id: Option<OrderId>,
        subject: &str,
        priority: TicketPriority,
        body: &str,
    ) -> Result<Ticket, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let ticket = sqlx::query_as::<_, Ticket>(&format!(
            r"
            INSERT INTO support_tickets (user_id, order_id, subject, priority)
            VALUES ($1, $2, $3, $4)
            RETURNING {TICKET_COLUMNS}
            "
        ))
        .bind(user_id)
        .bind(order_id)
        .bind(subject)
        .bind(priority)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "order does not exist"))?;

        sqlx::query(
            "INSERT INTO support_messages (ticket_id, author_id, is_staff, body) VALUES ($1, $2, FALSE, $3)",
        )
        .bind(ticket.id)
        .bind(user_id)
        .bind(body)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ticket)
    }

    /// Get a ticket by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: TicketId) -> Result<Option<Ticket>, RepositoryError> {
        let ticket = sqlx::query_as::<_, Ticket>(&format!(
            "SELECT {TICKET_COLUMNS} FROM support_tickets WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(ticket)
    }

    /// Tickets, most recently active first. `user_id` restricts to one
    /// customer; `status` filters.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        user_id: Option<UserId>,
        status: Option<TicketStatus>,
        pagination: Pagination,
    ) -> Result<(Vec<Ticket>, i64), RepositoryError> {
        let filter = r"
            ($1::INTEGER IS NULL OR user_id = $1)
            AND ($2::ticket_status IS NULL OR status = $2)
        ";

        let tickets = sqlx::query_as::<_, Ticket>(&format!(
            r"
            SELECT {TICKET_COLUMNS} FROM support_tickets
            WHERE {filter}
            ORDER BY updated_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "
        ))
        .bind(user_id)
        .bind(status)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM support_tickets WHERE {filter}"
        ))
        .bind(user_id)
        .bind(status)
        .fetch_one(self.pool)
        .await?;

        Ok((tickets, total))
    }

    /// Messages of a ticket, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn messages(&self, ticket_id: TicketId) -> Result<Vec<TicketMessage>, RepositoryError> {
        let messages = sqlx::query_as::<_, TicketMessage>(
            r"
            SELECT m.id, m.author_id, u.name AS author_name, m.is_staff, m.body, m.created_at
            FROM support_messages m
            JOIN users u ON u.id = m.author_id
            WHERE m.ticket_id = $1
            ORDER BY m.created_at, m.id
            ",
        )
        .bind(ticket_id)
        .fetch_all(self.pool)
        .await?;
        Ok(messages)
    }

    /// Append a reply and move the ticket to `next_status`, unless the ticket
    /// was closed in the meantime.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the ticket is closed and
    /// `RepositoryError::NotFound` if it does not exist.
    pub async fn reply(
        &self,
        ticket_id: TicketId,
        author_id: UserId,
        is_staff: bool,
        body: &str,
        next_status: TicketStatus,
    ) -> Result<Ticket, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let status = sqlx::query_scalar::<_, TicketStatus>(
            "SELECT status FROM support_tickets WHERE id = $1 FOR UPDATE",
        )
        .bind(ticket_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        if !status.accepts_replies() {
            return Err(RepositoryError::Conflict("ticket is closed".to_owned()));
        }

        sqlx::query(
            "INSERT INTO support_messages (ticket_id, author_id, is_staff, body) VALUES ($1, $2, $3, $4)",
        )
        .bind(ticket_id)
        .bind(author_id)
        .bind(is_staff)
        .bind(body)
        .execute(&mut *tx)
        .await?;

        let ticket = sqlx::query_as::<_, Ticket>(&format!(
            r"
            UPDATE support_tickets SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {TICKET_COLUMNS}
            "
        ))
        .bind(ticket_id)
        .bind(next_status)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ticket)
    }

    /// Change a ticket's status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the ticket does not exist.
    pub async fn set_status(
        &self,
        ticket_id: TicketId,
        status: TicketStatus,
    ) -> Result<Ticket, RepositoryError> {
        sqlx::query_as::<_, Ticket>(&format!(
            r"
            UPDATE support_tickets SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {TICKET_COLUMNS}
            "
        ))
        .bind(ticket_id)
        .bind(status)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Tickets waiting on anyone (open or answered).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count_open(&self) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM support_tickets WHERE status IN ('open', 'answered')",
        )
        .fetch_one(self.pool)
        .await?;
        Ok(count)
    }
}
