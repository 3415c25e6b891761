use std::{env, net::SocketAddr, time::Duration};

use chrono_tz::Tz;
use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://acme.db?mode=rwc";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 86_400;
const DEV_SESSION_SECRET: &str = "acme-development-session-secret";
const DEFAULT_ADMIN_USERNAME: &str = "admin";
const DEFAULT_ADMIN_PASSWORD: &str = "password";

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns `true` when the current environment should behave as development.
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    /// Zone used to decide which calendar day an invoice is issued on.
    pub timezone: Tz,
    pub session_secret: Vec<u8>,
    pub session_ttl: Duration,
    pub admin_username: String,
    pub admin_password: String,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_value =
            env::var("APP_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let bind_addr: SocketAddr = bind_value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(bind_value.clone()))?;
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        let timezone_value = env::var("APP_TIMEZONE").unwrap_or_else(|_| "UTC".to_string());
        let timezone: Tz = timezone_value
            .parse()
            .map_err(|_| ConfigError::InvalidTimezone(timezone_value.clone()))?;

        let session_secret = match env::var("APP_SESSION_SECRET") {
            Ok(value) if !value.is_empty() => value.into_bytes(),
            _ if environment.is_production() => {
                return Err(ConfigError::Missing("APP_SESSION_SECRET"))
            }
            _ => DEV_SESSION_SECRET.as_bytes().to_vec(),
        };

        let session_ttl = match env::var("APP_SESSION_TTL_SECS") {
            Ok(value) => value
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or(ConfigError::InvalidSessionTtl(value))?,
            Err(_) => Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
        };

        let admin_username =
            env::var("APP_ADMIN_USERNAME").unwrap_or_else(|_| DEFAULT_ADMIN_USERNAME.to_string());
        let admin_password = match env::var("APP_ADMIN_PASSWORD") {
            Ok(value) if !value.is_empty() => value,
            _ if environment.is_production() => {
                return Err(ConfigError::Missing("APP_ADMIN_PASSWORD"))
            }
            _ => DEFAULT_ADMIN_PASSWORD.to_string(),
        };

        Ok(Self {
            bind_addr,
            environment,
            database_url,
            timezone,
            session_secret,
            session_ttl,
            admin_username,
            admin_password,
        })
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("APP_ENV must be one of 'development', 'production', or 'test' (got {0})")]
    InvalidEnvironment(String),
    #[error("APP_BIND_ADDR must be a socket address such as 127.0.0.1:8080 (got {0})")]
    InvalidBindAddress(String),
    #[error("APP_TIMEZONE must be an IANA time zone name (got {0})")]
    InvalidTimezone(String),
    #[error("APP_SESSION_TTL_SECS must be a positive number of seconds (got {0})")]
    InvalidSessionTtl(String),
    #[error("{0} must be set in production")]
    Missing(&'static str),
}
