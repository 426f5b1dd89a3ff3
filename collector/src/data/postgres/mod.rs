//! PostgreSQL/TimescaleDB database service
//!
//! Owns the connection pool and schema lifecycle. The pool is created
//! lazily so the collector can start (and buffer spans) while the database
//! is unreachable; the writer applies the schema once connectivity returns.

mod migrations;
pub mod schema;

pub use sqlx::PgPool;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use sqlx::ConnectOptions;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::log::LevelFilter;

use super::error::DataError;
use crate::core::constants::{
    DB_WRITE_TIMEOUT_SECS, POSTGRES_ACQUIRE_TIMEOUT_SECS, POSTGRES_MAX_CONNECTIONS,
    POSTGRES_MIN_CONNECTIONS,
};

pub struct PostgresService {
    pool: PgPool,
    migrated: Arc<AtomicBool>,
    retention_days: u32,
}

impl PostgresService {
    /// Build the pool and attempt initial schema application.
    ///
    /// A failed first migration is downgraded to a warning: the collector
    /// keeps accepting spans into the buffer, and the writer re-attempts
    /// the schema before its first insert.
    pub async fn init(database_url: &str, retention_days: u32) -> Result<Self, DataError> {
        // Accept SQLAlchemy-style URLs from existing deployments
        let url = database_url.replace("postgresql+asyncpg://", "postgresql://");

        let mut options: PgConnectOptions = url
            .parse()
            .map_err(|e| DataError::Config(format!("Invalid PostgreSQL URL: {}", e)))?;
        options = options
            .log_statements(LevelFilter::Trace)
            .options([("statement_timeout", format!("{}s", DB_WRITE_TIMEOUT_SECS))]);

        let pool = PgPoolOptions::new()
            .max_connections(POSTGRES_MAX_CONNECTIONS)
            .min_connections(POSTGRES_MIN_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(POSTGRES_ACQUIRE_TIMEOUT_SECS))
            .connect_lazy_with(options);

        let service = Self {
            pool,
            migrated: Arc::new(AtomicBool::new(false)),
            retention_days,
        };

        match service.ensure_schema().await {
            Ok(()) => tracing::debug!("PostgresService initialized, schema applied"),
            Err(e) => tracing::warn!(
                error = %e,
                "Database unreachable at startup; schema application deferred"
            ),
        }

        Ok(service)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Whether the schema has been applied on this connection target
    pub fn is_migrated(&self) -> bool {
        self.migrated.load(Ordering::Relaxed)
    }

    /// Apply the schema if it has not been applied yet
    pub async fn ensure_schema(&self) -> Result<(), DataError> {
        if self.is_migrated() {
            return Ok(());
        }
        migrations::run_migrations(&self.pool, self.retention_days).await?;
        self.migrated.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Close the connection pool gracefully
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("PostgreSQL pool closed");
    }
}
