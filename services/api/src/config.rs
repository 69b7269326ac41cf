//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Settings for minting and validating bearer tokens.
#[derive(Clone, Debug)]
pub struct JwtSettings {
    pub secret_key: String,
    pub token_lifetime_minutes: i64,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    /// Deployment toggles; tokens always carry `iss`/`aud` when configured.
    pub validate_issuer: bool,
    pub validate_audience: bool,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// When absent the service runs against the in-memory store.
    pub database_url: Option<String>,
    pub log_level: Level,
    pub cors_origins: Vec<String>,
    pub jwt: JwtSettings,
    pub seed_admin: Option<(String, String)>,
}

const DEFAULT_CORS_ORIGINS: &str =
    "http://localhost:5173,http://localhost:3000,http://localhost:5000,https://localhost:5173";

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
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:5000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origins = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| DEFAULT_CORS_ORIGINS.to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        // --- Load Token Settings ---
        let jwt = JwtSettings::from_env()?;

        let seed_admin = match (
            std::env::var("SEED_ADMIN_EMAIL").ok(),
            std::env::var("SEED_ADMIN_PASSWORD").ok(),
        ) {
            (Some(email), Some(password)) => Some((email, password)),
            _ => None,
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            cors_origins,
            jwt,
            seed_admin,
        })
    }
}

impl JwtSettings {
    /// The signing secret is mandatory: without it no token can be issued or checked.
    pub fn from_env() -> Result<Self, ConfigError> {
        let secret_key = std::env::var("JWT_SECRET_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ConfigError::MissingVar("JWT_SECRET_KEY".to_string()))?;

        let lifetime_str =
            std::env::var("JWT_TOKEN_LIFETIME_MINUTES").unwrap_or_else(|_| "240".to_string());
        let token_lifetime_minutes = lifetime_str
            .parse::<i64>()
            .ok()
            .filter(|minutes| *minutes > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "JWT_TOKEN_LIFETIME_MINUTES".to_string(),
                    format!("'{}' is not a positive number of minutes", lifetime_str),
                )
            })?;

        Ok(Self {
            secret_key,
            token_lifetime_minutes,
            issuer: std::env::var("JWT_ISSUER").ok(),
            audience: std::env::var("JWT_AUDIENCE").ok(),
            validate_issuer: parse_flag("JWT_VALIDATE_ISSUER")?,
            validate_audience: parse_flag("JWT_VALIDATE_AUDIENCE")?,
        })
    }
}

fn parse_flag(name: &str) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Err(_) => Ok(false),
        Ok(value) => match value.to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" | "" => Ok(false),
            other => Err(ConfigError::InvalidValue(
                name.to_string(),
                format!("'{}' is not a boolean", other),
            )),
        },
    }
}
