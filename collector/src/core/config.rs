use std::fmt::Display;
use std::str::FromStr;

use anyhow::{Context, Result};

use super::constants::{
    DEFAULT_BUFFER_MAX_SIZE, DEFAULT_DATABASE_URL, DEFAULT_DB_RETRY_INTERVAL_SECONDS,
    DEFAULT_HOST, DEFAULT_PORT, DEFAULT_RATE_LIMIT_BURST_SIZE,
    DEFAULT_RATE_LIMIT_REQUESTS_PER_SECOND, DEFAULT_RETENTION_DAYS, DEFAULT_WRITE_BATCH_SIZE,
    ENV_BUFFER_MAX_SIZE, ENV_DATABASE_URL, ENV_DB_RETRY_INTERVAL_SECONDS, ENV_HOST, ENV_PORT,
    ENV_RATE_LIMIT_BURST_SIZE, ENV_RATE_LIMIT_ENABLED, ENV_RATE_LIMIT_REQUESTS_PER_SECOND,
    ENV_RETENTION_DAYS, ENV_WRITE_BATCH_SIZE,
};

/// Rate limit configuration (final/runtime)
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_second: f64,
    pub burst_size: u32,
}

/// Final merged application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub buffer_max_size: usize,
    pub write_batch_size: usize,
    pub db_retry_interval_seconds: u64,
    pub retention_days: u32,
    pub host: String,
    pub port: u16,
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    /// Load configuration from the process environment (`HIKARI_*` variables)
    pub fn load() -> Result<Self> {
        Self::load_from(&|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn load_from(env: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = env(ENV_DATABASE_URL).unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let buffer_max_size = parse_var(env, ENV_BUFFER_MAX_SIZE, DEFAULT_BUFFER_MAX_SIZE)?;
        let write_batch_size = parse_var(env, ENV_WRITE_BATCH_SIZE, DEFAULT_WRITE_BATCH_SIZE)?;
        let db_retry_interval_seconds = parse_var(
            env,
            ENV_DB_RETRY_INTERVAL_SECONDS,
            DEFAULT_DB_RETRY_INTERVAL_SECONDS,
        )?;
        let retention_days = parse_var(env, ENV_RETENTION_DAYS, DEFAULT_RETENTION_DAYS)?;
        let host = env(ENV_HOST).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_var(env, ENV_PORT, DEFAULT_PORT)?;

        let rate_limit = RateLimitConfig {
            enabled: parse_var(env, ENV_RATE_LIMIT_ENABLED, true)?,
            requests_per_second: parse_var(
                env,
                ENV_RATE_LIMIT_REQUESTS_PER_SECOND,
                DEFAULT_RATE_LIMIT_REQUESTS_PER_SECOND,
            )?,
            burst_size: parse_var(env, ENV_RATE_LIMIT_BURST_SIZE, DEFAULT_RATE_LIMIT_BURST_SIZE)?,
        };

        let config = Self {
            database_url,
            buffer_max_size,
            write_batch_size,
            db_retry_interval_seconds,
            retention_days,
            host,
            port,
            rate_limit,
        };

        config.validate()?;

        tracing::debug!(
            host = %config.host,
            port = config.port,
            buffer_max_size = config.buffer_max_size,
            write_batch_size = config.write_batch_size,
            db_retry_interval_seconds = config.db_retry_interval_seconds,
            retention_days = config.retention_days,
            rate_limit_enabled = config.rate_limit.enabled,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    fn validate(&self) -> Result<()> {
        if self.database_url.is_empty() {
            anyhow::bail!("Configuration error: {} must not be empty", ENV_DATABASE_URL);
        }
        if self.host.is_empty() {
            anyhow::bail!("Configuration error: {} must not be empty", ENV_HOST);
        }
        if self.port == 0 {
            anyhow::bail!("Configuration error: {} must be greater than 0", ENV_PORT);
        }
        if !(1000..=1_000_000).contains(&self.buffer_max_size) {
            anyhow::bail!(
                "Configuration error: {} must be between 1000 and 1000000",
                ENV_BUFFER_MAX_SIZE
            );
        }
        if !(1..=10_000).contains(&self.write_batch_size) {
            anyhow::bail!(
                "Configuration error: {} must be between 1 and 10000",
                ENV_WRITE_BATCH_SIZE
            );
        }
        if !(1..=300).contains(&self.db_retry_interval_seconds) {
            anyhow::bail!(
                "Configuration error: {} must be between 1 and 300",
                ENV_DB_RETRY_INTERVAL_SECONDS
            );
        }
        if !(1..=365).contains(&self.retention_days) {
            anyhow::bail!(
                "Configuration error: {} must be between 1 and 365",
                ENV_RETENTION_DAYS
            );
        }
        if self.rate_limit.requests_per_second <= 0.0 {
            anyhow::bail!(
                "Configuration error: {} must be positive",
                ENV_RATE_LIMIT_REQUESTS_PER_SECOND
            );
        }
        if self.rate_limit.burst_size == 0 {
            anyhow::bail!(
                "Configuration error: {} must be greater than 0",
                ENV_RATE_LIMIT_BURST_SIZE
            );
        }
        Ok(())
    }
}

fn parse_var<T>(env: &dyn Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("Invalid value for {}: {:?}", name, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::load_from(&env_from(&[])).unwrap();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.buffer_max_size, 50_000);
        assert_eq!(config.write_batch_size, 500);
        assert_eq!(config.db_retry_interval_seconds, 10);
        assert_eq!(config.retention_days, 30);
        assert!(config.rate_limit.enabled);
    }

    #[test]
    fn test_env_overrides() {
        let env = env_from(&[
            (ENV_PORT, "9090"),
            (ENV_BUFFER_MAX_SIZE, "2000"),
            (ENV_RATE_LIMIT_ENABLED, "false"),
        ]);
        let config = AppConfig::load_from(&env).unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.buffer_max_size, 2000);
        assert!(!config.rate_limit.enabled);
    }

    #[test]
    fn test_rejects_unparseable_value() {
        let env = env_from(&[(ENV_PORT, "not-a-port")]);
        assert!(AppConfig::load_from(&env).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_buffer() {
        let env = env_from(&[(ENV_BUFFER_MAX_SIZE, "10")]);
        assert!(AppConfig::load_from(&env).is_err());
    }

    #[test]
    fn test_rejects_zero_port() {
        let env = env_from(&[(ENV_PORT, "0")]);
        assert!(AppConfig::load_from(&env).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_retry_interval() {
        let env = env_from(&[(ENV_DB_RETRY_INTERVAL_SECONDS, "500")]);
        assert!(AppConfig::load_from(&env).is_err());
    }
}
