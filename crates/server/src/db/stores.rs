//! Store (seller) repository.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use mercado_core::{StoreId, UserId};

use super::RepositoryError;

/// A seller storefront that products can belong to.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct Store {
    pub id: StoreId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub owner_id: UserId,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

pub struct StoreRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> StoreRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All stores, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<Store>, RepositoryError> {
        let stores = sqlx::query_as::<_, Store>(
            r"
            SELECT id, name, slug, description, owner_id, active, created_at
            FROM stores
            ORDER BY created_at DESC
            ",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(stores)
    }

    /// Create a store.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the slug is taken or the owner
    /// does not exist.
    pub async fn create(
        &self,
        name: &str,
        slug: &str,
        description: Option<&str>,
        owner_id: UserId,
    ) -> Result<Store, RepositoryError> {
        sqlx::query_as::<_, Store>(
            r"
            INSERT INTO stores (name, slug, description, owner_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, slug, description, owner_id, active, created_at
            ",
        )
        .bind(name)
        .bind(slug)
        .bind(description)
        .bind(owner_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "store slug already exists or owner is invalid"))
    }
}
