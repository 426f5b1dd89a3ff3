//! Span insert repository

use std::time::Duration;

use sqlx::{PgPool, QueryBuilder};

use crate::core::constants::DB_WRITE_TIMEOUT_SECS;
use crate::data::error::DataError;
use crate::data::types::SpanRecord;

/// Multi-row insert into the spans hypertable.
///
/// Conflicting `(time, span_id)` pairs are skipped; otherwise re-posted
/// batches insert again (ingest is not idempotent by design).
pub async fn insert_spans(pool: &PgPool, records: &[SpanRecord]) -> Result<(), DataError> {
    if records.is_empty() {
        return Ok(());
    }

    let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
        "INSERT INTO spans (time, trace_id, span_id, span_name, pipeline_id, \
         stage, model, provider, tokens_input, tokens_output, \
         cost_input, cost_output, cost_total, duration_ms) ",
    );

    builder.push_values(records, |mut b, r| {
        b.push_bind(r.time)
            .push_bind(&r.trace_id)
            .push_bind(&r.span_id)
            .push_bind(&r.span_name)
            .push_bind(&r.pipeline_id)
            .push_bind(&r.stage)
            .push_bind(&r.model)
            .push_bind(&r.provider)
            .push_bind(r.tokens_input)
            .push_bind(r.tokens_output)
            .push_bind(r.cost_input)
            .push_bind(r.cost_output)
            .push_bind(r.cost_total)
            .push_bind(r.duration_ms);
    });
    builder.push(" ON CONFLICT (time, span_id) DO NOTHING");

    tokio::time::timeout(
        Duration::from_secs(DB_WRITE_TIMEOUT_SECS),
        builder.build().execute(pool),
    )
    .await
    .map_err(|_| DataError::timeout(DB_WRITE_TIMEOUT_SECS))??;

    Ok(())
}
