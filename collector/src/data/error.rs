//! Unified error type for data layer

use thiserror::Error;

/// Unified error type for data layer operations
#[derive(Error, Debug)]
pub enum DataError {
    /// PostgreSQL database error
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// Migration failed
    #[error("Migration {version} ({name}) failed: {error}")]
    MigrationFailed {
        version: i32,
        name: String,
        error: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Query timeout
    #[error("Query timeout after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
}

impl DataError {
    /// Create a timeout error
    pub fn timeout(timeout_secs: u64) -> Self {
        Self::Timeout { timeout_secs }
    }

    /// Check if this error is transient and worth retrying.
    ///
    /// Transient: lost connections, pool pressure, lock/serialization
    /// conflicts, server shutdown. Everything else (schema drift,
    /// constraint violations, encode errors) is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Postgres(e) => match e {
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
                sqlx::Error::Database(db) => db
                    .code()
                    .map(|code| {
                        // Class 08: connection exception; class 57: operator
                        // intervention (shutdown); 40001/40P01: serialization
                        // failure / deadlock; 55P03: lock not available.
                        code.starts_with("08")
                            || code.starts_with("57")
                            || code == "40001"
                            || code == "40P01"
                            || code == "55P03"
                    })
                    .unwrap_or(false),
                _ => false,
            },
            Self::MigrationFailed { .. } | Self::Config(_) => false,
        }
    }
}
