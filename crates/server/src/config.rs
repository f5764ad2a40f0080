//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `MERCADO_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `MERCADO_BASE_URL` - Public URL of the server
//! - `MERCADO_SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//!
//! ## Optional
//! - `MERCADO_HOST` - Bind address (default: 127.0.0.1)
//! - `MERCADO_PORT` - Listen port (default: 3000)
//! - `MERCADO_UPLOAD_DIR` - Directory for uploaded images (default: uploads)
//! - `MERCADO_SHIPPING_FEE` - Flat shipping fee (default: 15.00)
//! - `MERCADO_FREE_SHIPPING_THRESHOLD` - Free shipping from this value (default: 200.00)
//! - `CEP_API_BASE_URL` - Postal code lookup API (default: <https://viacep.com.br/ws>)
//! - `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`, `EMAIL_FROM` - Email (all or none)
//! - `PAYMENT_API_URL`, `PAYMENT_API_TOKEN`, `PAYMENT_WEBHOOK_SECRET` - Payment gateway (all or none)
//! - `NATS_URL` - Event broker
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`
//! - `LOG_FORMAT` - `json` for structured logs, anything else for human-readable

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use mercado_core::Price;
use mercado_core::pricing::ShippingPolicy;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

const DEFAULT_CEP_API_BASE_URL: &str = "https://viacep.com.br/ws";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
    #[error("Incomplete {group} configuration: set all of {vars} or none")]
    IncompleteGroup {
        group: &'static str,
        vars: &'static str,
    },
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL
    pub base_url: String,
    /// Session signing secret
    pub session_secret: SecretString,
    /// Where uploaded images are written
    pub upload_dir: PathBuf,
    /// Shipping fee rules used at checkout
    pub shipping: ShippingPolicy,
    /// Base URL of the postal code lookup API
    pub cep_api_base_url: String,
    /// SMTP settings; email is skipped when absent
    pub email: Option<EmailConfig>,
    /// Payment gateway settings; hosted checkout is disabled when absent
    pub payment: Option<PaymentConfig>,
    /// NATS settings; events are dropped when absent
    pub nats: Option<NatsConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
    /// Emit JSON logs
    pub json_logs: bool,
}

/// SMTP configuration for transactional email.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    /// SMTP server hostname
    pub smtp_host: String,
    /// SMTP server port
    pub smtp_port: u16,
    /// SMTP authentication username
    pub smtp_username: String,
    /// SMTP authentication password
    pub smtp_password: SecretString,
    /// Email sender address (From header)
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

/// Payment gateway configuration.
///
/// Implements `Debug` manually to redact credentials.
#[derive(Clone)]
pub struct PaymentConfig {
    /// Gateway API base URL
    pub api_url: String,
    /// Bearer token for gateway API calls
    pub api_token: SecretString,
    /// Shared secret for webhook signatures
    pub webhook_secret: SecretString,
}

impl std::fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("api_url", &self.api_url)
            .field("api_token", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .finish()
    }
}

/// NATS configuration.
#[derive(Debug, Clone)]
pub struct NatsConfig {
    /// Server URL, e.g. `nats://localhost:4222`
    pub url: String,
    /// Subject prefix; events go to `<prefix>.<event>`
    pub subject_prefix: String,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("MERCADO_DATABASE_URL")?;
        let host = parse_env("MERCADO_HOST", "127.0.0.1")?;
        let port = parse_env("MERCADO_PORT", "3000")?;
        let base_url = get_required_env("MERCADO_BASE_URL")?;
        let session_secret = get_validated_secret("MERCADO_SESSION_SECRET")?;
        validate_session_secret(&session_secret, "MERCADO_SESSION_SECRET")?;

        let upload_dir = PathBuf::from(get_env_or_default("MERCADO_UPLOAD_DIR", "uploads"));
        let shipping = ShippingPolicy {
            flat_fee: parse_price_env("MERCADO_SHIPPING_FEE", "15.00")?,
            free_threshold: parse_price_env("MERCADO_FREE_SHIPPING_THRESHOLD", "200.00")?,
        };
        let cep_api_base_url = get_env_or_default("CEP_API_BASE_URL", DEFAULT_CEP_API_BASE_URL)
            .trim_end_matches('/')
            .to_owned();

        let email = EmailConfig::from_env()?;
        let payment = PaymentConfig::from_env()?;
        let nats = get_optional_env("NATS_URL").map(|url| NatsConfig {
            url,
            subject_prefix: get_env_or_default("NATS_SUBJECT_PREFIX", "mercado"),
        });

        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.1);
        let json_logs = get_optional_env("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json"));

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            session_secret,
            upload_dir,
            shipping,
            cep_api_base_url,
            email,
            payment,
            nats,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
            json_logs,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should carry the `Secure` flag.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }

    /// Absolute URL for a path on this server.
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }
}

impl EmailConfig {
    const VARS: &'static str = "SMTP_HOST, SMTP_USERNAME, SMTP_PASSWORD, EMAIL_FROM";

    fn from_env() -> Result<Option<Self>, ConfigError> {
        let host = get_optional_env("SMTP_HOST");
        let username = get_optional_env("SMTP_USERNAME");
        let password = get_optional_env("SMTP_PASSWORD");
        let from = get_optional_env("EMAIL_FROM");

        match (host, username, password, from) {
            (None, None, None, None) => Ok(None),
            (Some(smtp_host), Some(smtp_username), Some(password), Some(from_address)) => {
                Ok(Some(Self {
                    smtp_host,
                    smtp_port: parse_env("SMTP_PORT", "587")?,
                    smtp_username,
                    smtp_password: SecretString::from(password),
                    from_address,
                }))
            }
            _ => Err(ConfigError::IncompleteGroup {
                group: "email",
                vars: Self::VARS,
            }),
        }
    }
}

impl PaymentConfig {
    const VARS: &'static str = "PAYMENT_API_URL, PAYMENT_API_TOKEN, PAYMENT_WEBHOOK_SECRET";

    fn from_env() -> Result<Option<Self>, ConfigError> {
        let api_url = get_optional_env("PAYMENT_API_URL");
        let api_token = get_optional_env("PAYMENT_API_TOKEN");
        let webhook_secret = get_optional_env("PAYMENT_WEBHOOK_SECRET");

        match (api_url, api_token, webhook_secret) {
            (None, None, None) => Ok(None),
            (Some(api_url), Some(api_token), Some(webhook_secret)) => {
                validate_secret_strength(&webhook_secret, "PAYMENT_WEBHOOK_SECRET")?;
                Ok(Some(Self {
                    api_url: api_url.trim_end_matches('/').to_owned(),
                    api_token: SecretString::from(api_token),
                    webhook_secret: SecretString::from(webhook_secret),
                }))
            }
            _ => Err(ConfigError::IncompleteGroup {
                group: "payment",
                vars: Self::VARS,
            }),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable (or its default) into `T`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse a non-negative money amount.
fn parse_price(key: &str, raw: &str) -> Result<Price, ConfigError> {
    let amount = Decimal::from_str(raw.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if amount.is_sign_negative() {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must not be negative".to_string(),
        ));
    }
    Ok(Price::new(amount))
}

fn parse_price_env(key: &str, default: &str) -> Result<Price, ConfigError> {
    parse_price(key, &get_env_or_default(key, default))
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    /// A config suitable for router tests; nothing optional is enabled.
    pub(crate) fn test_config() -> ServerConfig {
        ServerConfig {
            database_url: SecretString::from("postgres://localhost/mercado_test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            session_secret: SecretString::from("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6"),
            upload_dir: PathBuf::from("target/test-uploads"),
            shipping: ShippingPolicy::default(),
            cep_api_base_url: DEFAULT_CEP_API_BASE_URL.to_string(),
            email: None,
            payment: None,
            nats: None,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
            json_logs: false,
        }
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let err = validate_secret_strength("your-session-key-here", "TEST_VAR").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let err =
            validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        assert!(validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR").is_ok());
    }

    #[test]
    fn test_validate_session_secret_length() {
        assert!(validate_session_secret(&SecretString::from("short"), "S").is_err());
        assert!(validate_session_secret(&SecretString::from("a".repeat(32)), "S").is_ok());
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(
            parse_price("FEE", "15").unwrap(),
            Price::from_cents(1500)
        );
        assert_eq!(
            parse_price("FEE", " 9.999 ").unwrap(),
            Price::from_cents(1000)
        );
        assert!(matches!(
            parse_price("FEE", "-1"),
            Err(ConfigError::InvalidEnvVar(_, _))
        ));
        assert!(parse_price("FEE", "abc").is_err());
    }

    #[test]
    fn test_socket_addr_and_urls() {
        let config = test_config();
        assert_eq!(config.socket_addr().port(), 3000);
        assert!(!config.is_secure());
        assert_eq!(
            config.url_for("/store/orders"),
            "http://localhost:3000/store/orders"
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let email = EmailConfig {
            smtp_host: "smtp.mercado.test".to_string(),
            smtp_port: 587,
            smtp_username: "mailer".to_string(),
            smtp_password: SecretString::from("hunter2-smtp"),
            from_address: "loja@mercado.test".to_string(),
        };
        let payment = PaymentConfig {
            api_url: "https://pay.test".to_string(),
            api_token: SecretString::from("tok_live_abc"),
            webhook_secret: SecretString::from("whsec_abc"),
        };

        let output = format!("{email:?} {payment:?}");
        assert!(output.contains("smtp.mercado.test"));
        assert!(output.contains("[REDACTED]"));
        assert!(!output.contains("hunter2-smtp"));
        assert!(!output.contains("tok_live_abc"));
        assert!(!output.contains("whsec_abc"));
    }
}
