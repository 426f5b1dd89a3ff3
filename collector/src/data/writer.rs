//! Background database writer
//!
//! Exactly one writer task owns the buffer-to-database path. It drains the
//! buffer in batches, inserts them, and keeps `db_connected` honest:
//! transient failures re-queue the batch at the buffer head and back off;
//! permanent failures drop the batch after a single retry so one poison
//! batch cannot stall the pipeline. A supervisor restarts the drain loop
//! with the same backoff if it ever dies.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::buffer::SpanBuffer;
use super::postgres::PostgresService;
use super::repositories::spans::insert_spans;
use super::types::SpanRecord;
use crate::core::constants::{WRITER_DRAIN_TIMEOUT_SECS, WRITER_POLL_INTERVAL_MS};
use crate::data::error::DataError;

#[derive(Clone)]
pub struct SpanWriter {
    buffer: Arc<SpanBuffer>,
    db: Arc<PostgresService>,
    connected: Arc<AtomicBool>,
    batch_size: usize,
    retry_interval: Duration,
}

impl SpanWriter {
    pub fn new(
        buffer: Arc<SpanBuffer>,
        db: Arc<PostgresService>,
        batch_size: usize,
        retry_interval_seconds: u64,
    ) -> Self {
        let connected = Arc::new(AtomicBool::new(db.is_migrated()));
        Self {
            buffer,
            db,
            connected,
            batch_size,
            retry_interval: Duration::from_secs(retry_interval_seconds),
        }
    }

    /// Shared reachability flag, read by the health endpoint
    pub fn connected_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.connected)
    }

    /// Spawn the writer under a supervisor that restarts it on panic
    pub fn start(self, shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let writer = self.clone();
                let rx = shutdown_rx.clone();
                let handle = tokio::spawn(async move { writer.run(rx).await });

                match handle.await {
                    Ok(()) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "Writer task died, restarting");
                        let mut rx = shutdown_rx.clone();
                        tokio::select! {
                            _ = rx.wait_for(|&v| v) => break,
                            _ = tokio::time::sleep(self.retry_interval) => {}
                        }
                    }
                }
            }
            tracing::debug!("SpanWriter shutdown complete");
        })
    }

    async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        tracing::debug!(
            batch_size = self.batch_size,
            retry_interval_secs = self.retry_interval.as_secs(),
            "SpanWriter started"
        );

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            if self.buffer.is_empty() {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => continue,
                    _ = self.buffer.notified() => {}
                    _ = tokio::time::sleep(Duration::from_millis(WRITER_POLL_INTERVAL_MS)) => {}
                }
            }

            self.write_next_batch(&mut shutdown_rx).await;
        }

        self.drain_on_shutdown().await;
    }

    async fn write_next_batch(&self, shutdown_rx: &mut watch::Receiver<bool>) {
        let batch = self.buffer.drain(self.batch_size);
        if batch.is_empty() {
            return;
        }
        let count = batch.len();

        match self.insert(&batch).await {
            Ok(()) => {
                if !self.connected.swap(true, Ordering::Relaxed) {
                    tracing::info!("Database connection restored");
                }
                tracing::debug!(spans = count, "Wrote spans to database");
            }
            Err(e) if e.is_transient() => {
                self.connected.store(false, Ordering::Relaxed);
                tracing::warn!(
                    error = %e,
                    spans = count,
                    retry_secs = self.retry_interval.as_secs(),
                    "Transient database error, re-queueing batch"
                );
                self.buffer.requeue_front(batch);
                tokio::select! {
                    _ = shutdown_rx.wait_for(|&v| v) => {}
                    _ = tokio::time::sleep(self.retry_interval) => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, spans = count, "Insert failed, retrying once");
                match self.insert(&batch).await {
                    Ok(()) => {
                        self.connected.store(true, Ordering::Relaxed);
                        tracing::debug!(spans = count, "Wrote spans to database after retry");
                    }
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            dropped = count,
                            "Dropping batch after permanent database error"
                        );
                    }
                }
            }
        }
    }

    async fn insert(&self, batch: &[SpanRecord]) -> Result<(), DataError> {
        self.db.ensure_schema().await?;
        insert_spans(self.db.pool(), batch).await
    }

    /// Flush remaining records with a bounded deadline; anything left over
    /// is counted and discarded.
    async fn drain_on_shutdown(&self) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(WRITER_DRAIN_TIMEOUT_SECS);

        while !self.buffer.is_empty() && tokio::time::Instant::now() < deadline {
            let batch = self.buffer.drain(self.batch_size);
            if batch.is_empty() {
                break;
            }
            let count = batch.len();
            match self.insert(&batch).await {
                Ok(()) => tracing::debug!(spans = count, "Drained spans during shutdown"),
                Err(e) => {
                    tracing::warn!(error = %e, "Drain insert failed during shutdown");
                    self.buffer.requeue_front(batch);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        let residual = self.buffer.len();
        if residual > 0 {
            tracing::error!(residual, "Discarding unsent spans at shutdown");
        }
    }
}
