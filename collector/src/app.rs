//! Core application

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::Result;

use crate::api::middleware::TokenBucketLimiter;
use crate::api::{ApiServer, ApiState};
use crate::core::config::AppConfig;
use crate::core::constants::{
    APP_NAME_LOWER, ENV_LOG, RATE_LIMIT_CLEANUP_INTERVAL_SECS, RATE_LIMIT_STALE_BUCKET_SECS,
};
use crate::core::shutdown::ShutdownService;
use crate::data::{PostgresService, SpanBuffer, SpanWriter};

pub struct CoreApp {
    pub config: AppConfig,
    pub shutdown: ShutdownService,
    pub buffer: Arc<SpanBuffer>,
    pub db: Arc<PostgresService>,
    pub db_connected: Arc<AtomicBool>,
    pub limiter: Arc<TokenBucketLimiter>,
    writer: SpanWriter,
}

impl CoreApp {
    /// Run the application until shutdown
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let app = Self::init().await?;
        Self::start_server(app).await
    }

    async fn init() -> Result<Self> {
        let config = AppConfig::load()?;

        let db = Arc::new(PostgresService::init(&config.database_url, config.retention_days).await?);
        let buffer = Arc::new(SpanBuffer::new(config.buffer_max_size));
        let limiter = Arc::new(TokenBucketLimiter::new(
            config.rate_limit.requests_per_second,
            config.rate_limit.burst_size,
        ));

        let writer = SpanWriter::new(
            Arc::clone(&buffer),
            Arc::clone(&db),
            config.write_batch_size,
            config.db_retry_interval_seconds,
        );
        let db_connected = writer.connected_flag();

        let shutdown = ShutdownService::new();

        Ok(Self {
            config,
            shutdown,
            buffer,
            db,
            db_connected,
            limiter,
            writer,
        })
    }

    /// Handler-facing state shared with the API router
    pub fn api_state(&self) -> ApiState {
        ApiState {
            buffer: Arc::clone(&self.buffer),
            pool: self.db.pool().clone(),
            db_connected: Arc::clone(&self.db_connected),
        }
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn start_server(app: Self) -> Result<()> {
        app.shutdown.install_signal_handlers();
        app.start_background_tasks().await;

        tracing::info!(
            host = %app.config.host,
            port = app.config.port,
            version = env!("CARGO_PKG_VERSION"),
            "Hikari Collector started"
        );

        let server = ApiServer::new(app);
        let app = server.start().await?;

        app.shutdown.shutdown().await;
        app.db.close().await;
        tracing::info!("Hikari Collector stopped");

        Ok(())
    }

    async fn start_background_tasks(&self) {
        self.shutdown
            .register(self.writer.clone().start(self.shutdown.subscribe()))
            .await;

        // Periodically prune idle rate-limit buckets
        let limiter = Arc::clone(&self.limiter);
        let mut shutdown_rx = self.shutdown.subscribe();
        let cleanup = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(RATE_LIMIT_CLEANUP_INTERVAL_SECS));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        let removed = limiter
                            .cleanup_stale(Duration::from_secs(RATE_LIMIT_STALE_BUCKET_SECS));
                        if removed > 0 {
                            tracing::debug!(removed, "Pruned stale rate-limit buckets");
                        }
                    }
                }
            }
        });
        self.shutdown.register(cleanup).await;

        tracing::debug!("Background tasks started");
    }
}
