//! Service configuration.
//!
//! Each service builds its config struct once at startup from the
//! environment and passes it by reference into the components that need
//! it. Handlers never read the environment themselves. Missing required
//! values fail startup with a clear error instead of misbehaving later.

use anyhow::{bail, Context, Result};
use dotenv::dotenv;
use std::env;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default bearer-token lifetime in hours.
pub const DEFAULT_TOKEN_LIFETIME_HOURS: i64 = 24;

/// Timeout on the api-service -> auth-service verify call before the
/// local-decode fallback kicks in.
pub const DEFAULT_VERIFY_TIMEOUT_MS: u64 = 3_000;

/// Configuration for the authentication service.
#[derive(Debug, Clone)]
pub struct AuthServiceConfig {
    pub port: u16,
    pub db_path: String,
    pub jwt_secret: String,
    pub token_lifetime_hours: i64,
    pub allowed_origins: Vec<String>,
    pub rate_limiting_enabled: bool,
}

impl AuthServiceConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            port: parse_port("AUTH_SERVICE_PORT", 3001)?,
            db_path: env::var("AUTH_DB_PATH").unwrap_or_else(|_| "supportdesk_auth.db".to_string()),
            jwt_secret: require_secret("JWT_SECRET")?,
            token_lifetime_hours: parse_i64("JWT_LIFETIME_HOURS", DEFAULT_TOKEN_LIFETIME_HOURS)?,
            allowed_origins: parse_origins(),
            rate_limiting_enabled: is_production(),
        })
    }
}

/// Configuration for the ticket/audit/webhook service.
#[derive(Debug, Clone)]
pub struct ApiServiceConfig {
    pub port: u16,
    pub db_path: String,
    pub jwt_secret: String,
    pub auth_service_url: String,
    pub verify_timeout: Duration,
    pub webhook_secret: String,
    pub allowed_origins: Vec<String>,
    pub rate_limiting_enabled: bool,
}

impl ApiServiceConfig {
    pub fn from_env() -> Result<Self> {
        let verify_timeout_ms = env::var("AUTH_VERIFY_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(DEFAULT_VERIFY_TIMEOUT_MS);

        Ok(Self {
            port: parse_port("API_SERVICE_PORT", 3002)?,
            db_path: env::var("API_DB_PATH").unwrap_or_else(|_| "supportdesk_api.db".to_string()),
            jwt_secret: require_secret("JWT_SECRET")?,
            auth_service_url: env::var("AUTH_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:3001".to_string()),
            verify_timeout: Duration::from_millis(verify_timeout_ms),
            webhook_secret: require_secret("WEBHOOK_SECRET")?,
            allowed_origins: parse_origins(),
            rate_limiting_enabled: is_production(),
        })
    }
}

fn require_secret(var: &str) -> Result<String> {
    let value = env::var(var).with_context(|| format!("{var} must be set"))?;
    if value.trim().is_empty() {
        bail!("{var} must not be empty");
    }
    Ok(value)
}

fn parse_port(var: &str, default: u16) -> Result<u16> {
    match env::var(var) {
        Ok(v) => v
            .parse::<u16>()
            .with_context(|| format!("{var} is not a valid port: {v}")),
        Err(_) => Ok(default),
    }
}

fn parse_i64(var: &str, default: i64) -> Result<i64> {
    match env::var(var) {
        Ok(v) => v
            .parse::<i64>()
            .with_context(|| format!("{var} is not a valid integer: {v}")),
        Err(_) => Ok(default),
    }
}

fn parse_origins() -> Vec<String> {
    env::var("ALLOWED_ORIGINS")
        .unwrap_or_default()
        .split(',')
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect()
}

fn is_production() -> bool {
    env::var("APP_ENV")
        .or_else(|_| env::var("NODE_ENV"))
        .map(|v| v == "production")
        .unwrap_or(false)
}

/// Load `.env` from the working directory or the crate root.
pub fn load_env() {
    let _ = dotenv();

    let manifest_dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    let candidate = manifest_dir.join(".env");
    if candidate.exists() {
        let _ = dotenv::from_path(&candidate);
    }
}

/// Install the global tracing subscriber.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "supportdesk_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
