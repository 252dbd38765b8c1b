//! API configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DERMOSUL_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `DERMOSUL_ADMIN_TOKEN` - Bearer token for dashboard routes (min 32 chars, high entropy)
//! - `ASAAS_API_BASE` - Asaas REST base URL (e.g. `https://api.asaas.com/v3`)
//! - `ASAAS_API_KEY` - Asaas access token
//!
//! ## Optional
//! - `DERMOSUL_HOST` - Bind address (default: 127.0.0.1)
//! - `PORT` - Listen port (default: 3003)
//! - `ASAAS_WEBHOOK_TOKEN` - Expected `asaas-access-token` header on webhooks
//! - `SMTP_HOST`, `SMTP_PORT` (587), `SMTP_USER`, `SMTP_PASS` - Outgoing mail
//! - `SMTP_FROM` - Sender (default: `Dermosul <no-reply@dermosul.com.br>`)
//! - `SMTP_REPLY_TO` - Reply-To address
//! - `TEST_CARD_NUMBER` (default: 4111111111111111), `TEST_CARD_CVV`, `TEST_CARD_CPF`
//! - `ORDER_TRACKING_URL` - Base URL of the customer order tracking page
//! - `BASE_URL`, `STAGING_BASE_URL`, `DEV_BASE_URL` - Public storefront origins
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_ADMIN_TOKEN_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

pub const DEFAULT_SMTP_FROM: &str = "Dermosul <no-reply@dermosul.com.br>";
pub const DEFAULT_TEST_CARD_NUMBER: &str = "4111111111111111";

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
}

/// API application configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Bearer token accepted on dashboard routes
    pub admin_token: SecretString,
    /// Asaas gateway configuration
    pub asaas: AsaasConfig,
    /// Outgoing mail, `None` when SMTP is not configured
    pub smtp: Option<SmtpConfig>,
    /// Card/CPF values that bypass the gateway
    pub test_card: TestCardConfig,
    /// Public origins used to build product links
    pub origins: PublicOrigins,
    /// Base URL of the order tracking page linked from emails
    pub order_tracking_url: Option<String>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
    pub sentry_sample_rate: f32,
    pub sentry_traces_sample_rate: f32,
}

/// Asaas payment gateway configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct AsaasConfig {
    /// REST base URL, without trailing slash
    pub api_base: String,
    /// `access_token` header value
    pub api_key: SecretString,
    /// Token Asaas sends back in the `asaas-access-token` webhook header
    pub webhook_token: Option<SecretString>,
}

impl std::fmt::Debug for AsaasConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsaasConfig")
            .field("api_base", &self.api_base)
            .field("api_key", &"[REDACTED]")
            .field(
                "webhook_token",
                &self.webhook_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// SMTP configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    /// Sender mailbox, e.g. `Dermosul <no-reply@dermosul.com.br>`
    pub from: String,
    pub reply_to: Option<String>,
}

impl SmtpConfig {
    /// Port 465 means implicit TLS; anything else upgrades with STARTTLS.
    #[must_use]
    pub const fn implicit_tls(&self) -> bool {
        self.port == 465
    }
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("from", &self.from)
            .field("reply_to", &self.reply_to)
            .finish()
    }
}

/// Values that mark a checkout as a test purchase.
#[derive(Debug, Clone)]
pub struct TestCardConfig {
    pub number: String,
    pub cvv: Option<String>,
    pub cpf: Option<String>,
}

impl Default for TestCardConfig {
    fn default() -> Self {
        Self {
            number: DEFAULT_TEST_CARD_NUMBER.to_string(),
            cvv: None,
            cpf: None,
        }
    }
}

/// Candidate public origins, highest priority first.
#[derive(Debug, Clone, Default)]
pub struct PublicOrigins {
    pub base_url: Option<String>,
    pub staging_base_url: Option<String>,
    pub dev_base_url: Option<String>,
}

impl PublicOrigins {
    /// Read `BASE_URL`, `STAGING_BASE_URL` and `DEV_BASE_URL`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            base_url: get_optional_env("BASE_URL"),
            staging_base_url: get_optional_env("STAGING_BASE_URL"),
            dev_base_url: get_optional_env("DEV_BASE_URL"),
        }
    }

    /// Configured origins in precedence order.
    pub fn candidates(&self) -> impl Iterator<Item = &str> {
        [
            self.base_url.as_deref(),
            self.staging_base_url.as_deref(),
            self.dev_base_url.as_deref(),
        ]
        .into_iter()
        .flatten()
    }
}

impl ApiConfig {
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

        let database_url = get_database_url("DERMOSUL_DATABASE_URL")?;
        let host = get_env_or_default("DERMOSUL_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("DERMOSUL_HOST".to_string(), e.to_string()))?;
        let port = parse_env("PORT", "3003")?;

        let admin_token = get_validated_secret("DERMOSUL_ADMIN_TOKEN")?;
        validate_min_length(&admin_token, "DERMOSUL_ADMIN_TOKEN")?;

        let asaas = AsaasConfig::from_env()?;
        let smtp = SmtpConfig::from_env()?;
        let test_card = TestCardConfig {
            number: get_env_or_default("TEST_CARD_NUMBER", DEFAULT_TEST_CARD_NUMBER),
            cvv: get_optional_env("TEST_CARD_CVV"),
            cpf: get_optional_env("TEST_CARD_CPF"),
        };

        Ok(Self {
            database_url,
            host,
            port,
            admin_token,
            asaas,
            smtp,
            test_card,
            origins: PublicOrigins::from_env(),
            order_tracking_url: get_optional_env("ORDER_TRACKING_URL"),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env("SENTRY_TRACES_SAMPLE_RATE", "0.1")?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl AsaasConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let api_base = get_required_env("ASAAS_API_BASE")?;
        url::Url::parse(&api_base)
            .map_err(|e| ConfigError::InvalidEnvVar("ASAAS_API_BASE".to_string(), e.to_string()))?;

        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: get_required_secret("ASAAS_API_KEY")?,
            webhook_token: get_optional_env("ASAAS_WEBHOOK_TOKEN").map(SecretString::from),
        })
    }
}

impl SmtpConfig {
    /// SMTP is enabled only when host, user and password are all present.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let (Some(host), Some(username), Some(password)) = (
            get_optional_env("SMTP_HOST"),
            get_optional_env("SMTP_USER"),
            get_optional_env("SMTP_PASS"),
        ) else {
            return Ok(None);
        };

        Ok(Some(Self {
            host,
            port: parse_env("SMTP_PORT", "587")?,
            username,
            password: SecretString::from(password),
            from: get_env_or_default("SMTP_FROM", DEFAULT_SMTP_FROM),
            reply_to: get_optional_env("SMTP_REPLY_TO"),
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
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

/// Get an optional environment variable, treating blank values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable (or its default) into `T`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Validate that a token meets minimum length requirements.
fn validate_min_length(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_ADMIN_TOKEN_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_ADMIN_TOKEN_LENGTH,
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
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated token."
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
