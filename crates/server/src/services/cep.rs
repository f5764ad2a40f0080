//! Brazilian postal code (CEP) lookup.
//!
//! Talks to a ViaCEP-compatible API (`GET {base}/{cep}/json/`). Successful
//! lookups are cached in-process for 24 hours.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;

/// Cache lifetime for successful lookups.
const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Upstream request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from a CEP lookup.
#[derive(Debug, Error)]
pub enum CepError {
    /// Input is not 8 digits after stripping separators.
    #[error("invalid CEP: {0}")]
    Invalid(String),

    /// Upstream has no address for the CEP.
    #[error("CEP not found: {0}")]
    NotFound(String),

    /// Upstream request failed or returned garbage.
    #[error("CEP lookup failed: {0}")]
    Upstream(String),
}

impl From<reqwest::Error> for CepError {
    fn from(err: reqwest::Error) -> Self {
        Self::Upstream(err.to_string())
    }
}

impl From<CepError> for AppError {
    fn from(err: CepError) -> Self {
        match err {
            CepError::Invalid(_) => Self::BadRequest("CEP must have 8 digits".to_string()),
            CepError::NotFound(_) => Self::NotFound("CEP not found".to_string()),
            CepError::Upstream(msg) => Self::BadGateway(msg),
        }
    }
}

/// Address returned for a CEP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct PostalAddress {
    /// Normalized 8-digit CEP.
    pub postal_code: String,
    pub street: String,
    pub complement: String,
    pub district: String,
    pub city: String,
    /// Two-letter state code.
    pub state: String,
}

/// Upstream response shape. Unknown CEPs come back as `{"erro": true}`.
#[derive(Debug, Deserialize)]
struct ViaCepResponse {
    #[serde(default)]
    erro: Option<serde_json::Value>,
    #[serde(default)]
    logradouro: String,
    #[serde(default)]
    complemento: String,
    #[serde(default)]
    bairro: String,
    #[serde(default)]
    localidade: String,
    #[serde(default)]
    uf: String,
}

impl ViaCepResponse {
    fn is_error(&self) -> bool {
        match &self.erro {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::Bool(flag)) => *flag,
            Some(serde_json::Value::String(flag)) => flag == "true",
            Some(_) => true,
        }
    }

    fn into_address(self, postal_code: String) -> PostalAddress {
        PostalAddress {
            postal_code,
            street: self.logradouro,
            complement: self.complemento,
            district: self.bairro,
            city: self.localidade,
            state: self.uf,
        }
    }
}

/// Strip separators and check for exactly 8 digits.
///
/// Accepts `01001-000`, `01001000` and `01.001-000`.
#[must_use]
pub fn normalize_cep(raw: &str) -> Option<String> {
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, '-' | '.' | ' '))
        .collect();
    (digits.len() == 8 && digits.chars().all(|c| c.is_ascii_digit())).then_some(digits)
}

/// Client for the postal code API.
#[derive(Clone)]
pub struct CepClient {
    inner: Arc<CepClientInner>,
}

struct CepClientInner {
    client: reqwest::Client,
    base_url: String,
    cache: Cache<String, PostalAddress>,
}

impl CepClient {
    /// Create a client for `base_url` (e.g. `https://viacep.com.br/ws`).
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(CACHE_TTL)
            .build();

        Self {
            inner: Arc::new(CepClientInner {
                client,
                base_url: base_url.trim_end_matches('/').to_owned(),
                cache,
            }),
        }
    }

    /// Look up the address of a CEP.
    ///
    /// # Errors
    ///
    /// Returns `CepError::Invalid` for malformed input, `CepError::NotFound`
    /// when upstream knows no such CEP, and `CepError::Upstream` when the
    /// upstream call fails.
    #[tracing::instrument(skip(self))]
    pub async fn lookup(&self, raw: &str) -> Result<PostalAddress, CepError> {
        let cep = normalize_cep(raw).ok_or_else(|| CepError::Invalid(raw.to_owned()))?;

        if let Some(hit) = self.inner.cache.get(&cep).await {
            return Ok(hit);
        }

        let url = format!("{}/{cep}/json/", self.inner.base_url);
        let response = self
            .inner
            .client
            .get(&url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        // ViaCEP answers 400 for well-formed but unknown ranges
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::BAD_REQUEST {
            return Err(CepError::NotFound(cep));
        }
        if !status.is_success() {
            tracing::warn!(status = %status, "CEP API returned non-success status");
            return Err(CepError::Upstream(format!("HTTP {status}")));
        }

        let body: ViaCepResponse = response.json().await?;
        if body.is_error() {
            return Err(CepError::NotFound(cep));
        }

        let address = body.into_address(cep.clone());
        self.inner.cache.insert(cep, address.clone()).await;
        Ok(address)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use super::*;

    #[test]
    fn test_normalize_cep() {
        assert_eq!(normalize_cep("01001-000").as_deref(), Some("01001000"));
        assert_eq!(normalize_cep("01001000").as_deref(), Some("01001000"));
        assert_eq!(normalize_cep("01.001-000").as_deref(), Some("01001000"));
        assert_eq!(normalize_cep(" 01001 000 ").as_deref(), Some("01001000"));
    }

    #[test]
    fn test_normalize_cep_rejects() {
        assert_eq!(normalize_cep("1001-000"), None);
        assert_eq!(normalize_cep("01001-0000"), None);
        assert_eq!(normalize_cep("0100A-000"), None);
        assert_eq!(normalize_cep(""), None);
    }

    #[test]
    fn test_viacep_error_flag() {
        let found: ViaCepResponse = serde_json::from_str(
            r#"{"cep":"01001-000","logradouro":"Praça da Sé","complemento":"lado ímpar",
                "bairro":"Sé","localidade":"São Paulo","uf":"SP"}"#,
        )
        .unwrap();
        assert!(!found.is_error());
        let address = found.into_address("01001000".to_string());
        assert_eq!(address.city, "São Paulo");
        assert_eq!(address.state, "SP");

        let missing: ViaCepResponse = serde_json::from_str(r#"{"erro": true}"#).unwrap();
        assert!(missing.is_error());

        let missing_str: ViaCepResponse = serde_json::from_str(r#"{"erro": "true"}"#).unwrap();
        assert!(missing_str.is_error());
    }

    #[test]
    fn test_error_statuses() {
        let status = |e: CepError| AppError::from(e).into_response().status();
        assert_eq!(status(CepError::Invalid("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(CepError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(CepError::Upstream("x".into())), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_invalid_cep_skips_network() {
        let client = CepClient::new(reqwest::Client::new(), "http://127.0.0.1:9");
        assert!(matches!(
            client.lookup("123").await,
            Err(CepError::Invalid(_))
        ));
    }
}
