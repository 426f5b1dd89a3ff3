//! Schema initialization and versioned migrations

use sqlx::PgPool;

use super::schema::{
    CONTINUOUS_AGGREGATES, REFRESH_POLICIES, SCHEMA, SCHEMA_VERSION, VERSION_TABLE,
    retention_policy,
};
use crate::data::error::DataError;

/// Apply the schema if missing and run any pending migrations
pub async fn run_migrations(pool: &PgPool, retention_days: u32) -> Result<(), DataError> {
    sqlx::raw_sql(VERSION_TABLE).execute(pool).await?;

    let current_version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version WHERE id = 1")
            .fetch_optional(pool)
            .await?;

    match current_version {
        None => {
            tracing::debug!("Applying initial schema v{}", SCHEMA_VERSION);
            apply_initial_schema(pool, retention_days).await?;
        }
        Some(v) if v < SCHEMA_VERSION => {
            tracing::debug!("Migrating schema from v{} to v{}", v, SCHEMA_VERSION);
            for version in (v + 1)..=SCHEMA_VERSION {
                apply_versioned_migration(pool, version).await?;
            }
        }
        Some(v) if v > SCHEMA_VERSION => {
            tracing::warn!(
                "Schema version {} is newer than application version {}. This may cause issues.",
                v,
                SCHEMA_VERSION
            );
        }
        _ => {
            tracing::debug!("Schema is up to date (v{})", SCHEMA_VERSION);
        }
    }

    Ok(())
}

async fn apply_initial_schema(pool: &PgPool, retention_days: u32) -> Result<(), DataError> {
    let now = chrono::Utc::now().timestamp();

    sqlx::raw_sql(SCHEMA).execute(pool).await?;

    // Continuous aggregates cannot run inside a transaction block, so each
    // view and policy is executed as its own statement.
    for (name, sql) in CONTINUOUS_AGGREGATES {
        sqlx::raw_sql(sql).execute(pool).await?;
        tracing::debug!(view = name, "Continuous aggregate created");
    }
    for sql in REFRESH_POLICIES {
        sqlx::raw_sql(sql).execute(pool).await?;
    }
    sqlx::raw_sql(&retention_policy(retention_days))
        .execute(pool)
        .await?;

    sqlx::query(
        "INSERT INTO schema_version (id, version, applied_at, description)
         VALUES (1, $1, $2, 'Initial schema')
         ON CONFLICT (id) DO UPDATE SET version = $1, applied_at = $2",
    )
    .bind(SCHEMA_VERSION)
    .bind(now)
    .execute(pool)
    .await?;

    tracing::debug!("Schema v{} applied successfully", SCHEMA_VERSION);
    Ok(())
}

/// Apply a specific versioned migration.
///
/// No versioned migrations exist yet; schema v1 is applied via the SCHEMA
/// constants. Add new versions here as match arms.
#[allow(unused_variables, clippy::match_single_binding)]
async fn apply_versioned_migration(pool: &PgPool, version: i32) -> Result<(), DataError> {
    let now = chrono::Utc::now().timestamp();

    let (name, sql): (&str, &str) = match version {
        _ => {
            return Err(DataError::MigrationFailed {
                version,
                name: "unknown".to_string(),
                error: format!("No migration defined for version {}", version),
            });
        }
    };

    #[allow(unreachable_code)]
    {
        sqlx::raw_sql(sql)
            .execute(pool)
            .await
            .map_err(|e| DataError::MigrationFailed {
                version,
                name: name.to_string(),
                error: e.to_string(),
            })?;

        sqlx::query("UPDATE schema_version SET version = $1, applied_at = $2 WHERE id = 1")
            .bind(version)
            .bind(now)
            .execute(pool)
            .await?;

        tracing::debug!("Migration v{} ({}) applied", version, name);
        Ok(())
    }
}
