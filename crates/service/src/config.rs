//! Service configuration loaded from environment variables.

use std::time::Duration;

use application::RetryPolicy;

use crate::error::ServiceError;
use crate::worker::RelaySchedule;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Service configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json` (default: `pretty`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset selects the in-memory store
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `CACHE_TTL_SECS`: lifetime of cached views (default: `600`)
/// - `RETRY_MAX_ATTEMPTS`: attempts per command, including the first (default: `3`)
/// - `RETRY_INITIAL_DELAY_MS`: backoff before the first retry (default: `20`)
/// - `RELAY_INTERVAL_MS`: outbox redelivery period (default: `1000`)
/// - `RELAY_BATCH_SIZE`: outbox entries per redelivery pass (default: `100`)
/// - `OUTBOX_RETENTION_SECS`: how long dispatched outbox entries are kept (default: `86400`)
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub cache_ttl: Duration,
    pub retry_max_attempts: u32,
    pub retry_initial_delay: Duration,
    pub relay_interval: Duration,
    pub relay_batch_size: usize,
    pub outbox_retention: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    /// A variable that is set but malformed is an error.
    pub fn from_env() -> Result<Self, ServiceError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServiceError> {
        let defaults = Self::default();
        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None => defaults.log_format,
            Some(v) if v.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            Some(other) => {
                return Err(ServiceError::Config(format!(
                    "LOG_FORMAT must be 'pretty' or 'json', got {other:?}"
                )));
            }
        };

        let config = Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse(&lookup, "PORT")?.unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format,
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: parse(&lookup, "DATABASE_MAX_CONNECTIONS")?
                .unwrap_or(defaults.database_max_connections),
            cache_ttl: parse(&lookup, "CACHE_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            retry_max_attempts: parse(&lookup, "RETRY_MAX_ATTEMPTS")?
                .unwrap_or(defaults.retry_max_attempts),
            retry_initial_delay: parse(&lookup, "RETRY_INITIAL_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_initial_delay),
            relay_interval: parse(&lookup, "RELAY_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.relay_interval),
            relay_batch_size: parse(&lookup, "RELAY_BATCH_SIZE")?
                .unwrap_or(defaults.relay_batch_size),
            outbox_retention: parse(&lookup, "OUTBOX_RETENTION_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.outbox_retention),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ServiceError> {
        if self.retry_max_attempts == 0 {
            return Err(ServiceError::Config("RETRY_MAX_ATTEMPTS must be at least 1".into()));
        }
        if self.cache_ttl.is_zero() || self.cache_ttl > read_cache::MAX_TTL {
            return Err(ServiceError::Config(format!(
                "CACHE_TTL_SECS must be between 1 and {}",
                read_cache::MAX_TTL.as_secs()
            )));
        }
        if self.relay_interval.is_zero() {
            return Err(ServiceError::Config("RELAY_INTERVAL_MS must be positive".into()));
        }
        if self.relay_batch_size == 0 {
            return Err(ServiceError::Config("RELAY_BATCH_SIZE must be positive".into()));
        }
        if self.database_max_connections == 0 {
            return Err(ServiceError::Config(
                "DATABASE_MAX_CONNECTIONS must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn relay_schedule(&self) -> RelaySchedule {
        RelaySchedule {
            period: self.relay_interval,
            batch_size: self.relay_batch_size,
            retention: self.outbox_retention,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            initial_delay: self.retry_initial_delay,
            ..RetryPolicy::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            database_max_connections: 10,
            cache_ttl: Duration::from_secs(600),
            retry_max_attempts: 3,
            retry_initial_delay: Duration::from_millis(20),
            relay_interval: Duration::from_millis(1000),
            relay_batch_size: 100,
            outbox_retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ServiceError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ServiceError::Config(format!("{key} has invalid value {raw:?}"))),
    }
}
