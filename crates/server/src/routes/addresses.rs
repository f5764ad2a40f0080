//! Saved shipping addresses and CEP lookup.

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;
use tracing::info;

use mercado_core::AddressId;

use super::{optional_text, required_text};
use crate::db::AddressRepository;
use crate::db::addresses::{Address, AddressInput};
use crate::error::{AppError, ErrorBody, Result};
use crate::extract::AppJson;
use crate::middleware::RequireAuth;
use crate::services::cep::{PostalAddress, normalize_cep};
use crate::state::AppState;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct AddressRequest {
    pub label: Option<String>,
    pub recipient: String,
    pub street: String,
    pub number: String,
    pub complement: Option<String>,
    pub district: String,
    pub city: String,
    /// Two-letter state code, e.g. `SP`.
    pub state: String,
    /// With or without the hyphen.
    pub postal_code: String,
    pub phone: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

impl AddressRequest {
    fn validate(self) -> Result<AddressInput> {
        let postal_code = normalize_cep(&self.postal_code)
            .ok_or_else(|| AppError::Validation("postal_code must have 8 digits".to_string()))?;
        let state = self.state.trim().to_ascii_uppercase();
        if state.len() != 2 || !state.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(AppError::Validation("state must be a two-letter code".to_string()));
        }

        Ok(AddressInput {
            label: optional_text("label", self.label.as_deref(), 60)?,
            recipient: required_text("recipient", &self.recipient, 120)?,
            street: required_text("street", &self.street, 200)?,
            number: required_text("number", &self.number, 20)?,
            complement: optional_text("complement", self.complement.as_deref(), 120)?,
            district: required_text("district", &self.district, 120)?,
            city: required_text("city", &self.city, 120)?,
            state,
            postal_code,
            phone: optional_text("phone", self.phone.as_deref(), 30)?,
            is_default: self.is_default,
        })
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/{id}", get(show).put(update).delete(delete))
        .route("/cep/{cep}", get(lookup_cep))
}

#[utoipa::path(
    get,
    path = "/addresses",
    tag = "addresses",
    responses((status = 200, description = "Saved addresses, default first", body = Vec<Address>))
)]
pub async fn list(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<AppJson<Vec<Address>>> {
    Ok(AppJson(AddressRepository::new(state.pool()).list(user.id).await?))
}

#[utoipa::path(
    get,
    path = "/addresses/{id}",
    tag = "addresses",
    params(("id" = i32, Path, description = "Address ID")),
    responses(
        (status = 200, description = "Address", body = Address),
        (status = 404, description = "Not found", body = ErrorBody),
    )
)]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<AddressId>,
) -> Result<AppJson<Address>> {
    AddressRepository::new(state.pool())
        .get(user.id, id)
        .await?
        .map(AppJson)
        .ok_or_else(|| AppError::NotFound("Address not found".to_string()))
}

#[utoipa::path(
    post,
    path = "/addresses",
    tag = "addresses",
    request_body = AddressRequest,
    responses(
        (status = 201, description = "Created", body = Address),
        (status = 400, description = "Invalid fields", body = ErrorBody),
    )
)]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    AppJson(request): AppJson<AddressRequest>,
) -> Result<(StatusCode, AppJson<Address>)> {
    let input = request.validate()?;
    let address = AddressRepository::new(state.pool()).create(user.id, &input).await?;
    info!(address_id = %address.id, user_id = %user.id, "Address created");
    Ok((StatusCode::CREATED, AppJson(address)))
}

#[utoipa::path(
    put,
    path = "/addresses/{id}",
    tag = "addresses",
    params(("id" = i32, Path, description = "Address ID")),
    request_body = AddressRequest,
    responses(
        (status = 200, description = "Updated", body = Address),
        (status = 404, description = "Not found", body = ErrorBody),
    )
)]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<AddressId>,
    AppJson(request): AppJson<AddressRequest>,
) -> Result<AppJson<Address>> {
    let input = request.validate()?;
    Ok(AppJson(AddressRepository::new(state.pool()).update(user.id, id, &input).await?))
}

#[utoipa::path(
    delete,
    path = "/addresses/{id}",
    tag = "addresses",
    params(("id" = i32, Path, description = "Address ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found", body = ErrorBody),
    )
)]
pub async fn delete(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<AddressId>,
) -> Result<StatusCode> {
    AddressRepository::new(state.pool()).delete(user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/addresses/cep/{cep}",
    tag = "addresses",
    params(("cep" = String, Path, description = "Postal code, 8 digits")),
    responses(
        (status = 200, description = "Address for the CEP", body = PostalAddress),
        (status = 400, description = "Malformed CEP", body = ErrorBody),
        (status = 404, description = "Unknown CEP", body = ErrorBody),
        (status = 502, description = "Lookup service failed", body = ErrorBody),
    )
)]
pub async fn lookup_cep(
    State(state): State<AppState>,
    RequireAuth(_user): RequireAuth,
    Path(cep): Path<String>,
) -> Result<AppJson<PostalAddress>> {
    Ok(AppJson(state.cep().lookup(&cep).await?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn request() -> AddressRequest {
        AddressRequest {
            label: Some("Casa".to_string()),
            recipient: "Ana Souza".to_string(),
            street: "Rua das Flores".to_string(),
            number: "120".to_string(),
            complement: Some(String::new()),
            district: "Centro".to_string(),
            city: "Campinas".to_string(),
            state: "sp".to_string(),
            postal_code: "13010-050".to_string(),
            phone: None,
            is_default: false,
        }
    }

    #[test]
    fn test_normalizes_cep_and_state() {
        let input = request().validate().unwrap();
        assert_eq!(input.postal_code, "13010050");
        assert_eq!(input.state, "SP");
        assert_eq!(input.complement, None);
    }

    #[test]
    fn test_rejects_bad_cep_and_state() {
        let mut bad_cep = request();
        bad_cep.postal_code = "1301".to_string();
        assert!(bad_cep.validate().is_err());

        let mut bad_state = request();
        bad_state.state = "São".to_string();
        assert!(bad_state.validate().is_err());

        let mut blank = request();
        blank.street = "   ".to_string();
        assert!(blank.validate().is_err());
    }
}
