//! Admin account management.
//!
//! Admins are ordinary accounts with the `admin` role. Register through the
//! storefront or the API first, then promote:
//!
//! ```bash
//! mercado admin promote --email ana@example.com
//! ```
//!
//! The new role applies from the account's next login.

use thiserror::Error;

use mercado_core::{Email, Role};
use mercado_server::db::{RepositoryError, UserRepository};

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("No account registered with email: {0}")]
    UserNotFound(String),

    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Give the account registered with `email` the admin role.
///
/// # Errors
///
/// Returns an error for an invalid email, an unknown account or a database
/// failure.
pub async fn promote(email: &str) -> Result<(), Box<dyn std::error::Error>> {
    let email: Email = email
        .parse()
        .map_err(|_| AdminError::InvalidEmail(email.to_owned()))?;

    let pool = super::connect().await?;
    let user = UserRepository::new(&pool)
        .set_role_by_email(&email, Role::Admin)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => AdminError::UserNotFound(email.to_string()),
            other => AdminError::Repository(other),
        })?;

    tracing::info!(user_id = %user.id, email = %user.email, "Account promoted to admin");
    Ok(())
}
