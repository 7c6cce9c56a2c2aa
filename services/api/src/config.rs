//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development. Token secrets are loaded here once and
//! injected into the session manager at construction; nothing deeper in the
//! call chain reads the environment.

use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    /// Signing secret for short-lived access tokens.
    pub access_token_secret: String,
    /// Signing secret for refresh tokens; an independent key domain.
    pub refresh_token_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub cors_origin: String,
    /// Marks the refresh cookie `Secure`; on in production deployments.
    pub cookie_secure: bool,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:4000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Token Settings ---
        // Both secrets are required: refusing to start beats minting
        // tokens with a guessable default.
        let access_token_secret = std::env::var("ACCESS_TOKEN_SECRET")
            .map_err(|_| ConfigError::MissingVar("ACCESS_TOKEN_SECRET".to_string()))?;
        let refresh_token_secret = std::env::var("REFRESH_TOKEN_SECRET")
            .map_err(|_| ConfigError::MissingVar("REFRESH_TOKEN_SECRET".to_string()))?;

        let access_token_ttl = duration_var("ACCESS_TOKEN_TTL_SECS", 900)?;
        let refresh_token_ttl = duration_var("REFRESH_TOKEN_TTL_SECS", 7 * 24 * 60 * 60)?;

        let cors_origin =
            std::env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());

        let cookie_secure = match std::env::var("COOKIE_SECURE") {
            Ok(v) => v.parse::<bool>().map_err(|_| {
                ConfigError::InvalidValue(
                    "COOKIE_SECURE".to_string(),
                    format!("'{}' is not a boolean", v),
                )
            })?,
            Err(_) => false,
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            access_token_secret,
            refresh_token_secret,
            access_token_ttl,
            refresh_token_ttl,
            cors_origin,
            cookie_secure,
        })
    }
}

/// Reads a positive seconds value, falling back to `default_secs`.
fn duration_var(name: &str, default_secs: u64) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(v) => {
            let secs = v.parse::<u64>().map_err(|_| {
                ConfigError::InvalidValue(name.to_string(), format!("'{}' is not a number", v))
            })?;
            if secs == 0 {
                return Err(ConfigError::InvalidValue(
                    name.to_string(),
                    "must be greater than zero".to_string(),
                ));
            }
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(Duration::from_secs(default_secs)),
    }
}
