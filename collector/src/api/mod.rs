//! HTTP API: ingestion and query endpoints

pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod server;
pub mod types;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use sqlx::PgPool;

use crate::data::SpanBuffer;

pub use server::ApiServer;
pub use types::ApiError;

/// Shared state for all API handlers
#[derive(Clone)]
pub struct ApiState {
    pub buffer: Arc<SpanBuffer>,
    pub pool: PgPool,
    pub db_connected: Arc<AtomicBool>,
}

impl ApiState {
    /// Guard for query endpoints: the database must be reachable
    pub fn require_db(&self) -> Result<(), ApiError> {
        if self.db_connected.load(std::sync::atomic::Ordering::Relaxed) {
            Ok(())
        } else {
            Err(ApiError::service_unavailable("Database unavailable"))
        }
    }
}
