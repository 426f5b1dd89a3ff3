//! TimescaleDB schema definitions
//!
//! One hypertable (`spans`, day-partitioned) plus three continuous
//! aggregates rolling costed spans up by hour/day/week. The aggregates
//! filter `cost_total IS NOT NULL` so unknown costs never appear as zeros
//! in trend data.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Version tracking table, applied before anything else
pub const VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    applied_at BIGINT NOT NULL,
    description TEXT
);
"#;

/// Spans hypertable and secondary indexes
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS spans (
    time TIMESTAMPTZ NOT NULL,
    trace_id TEXT NOT NULL,
    span_id TEXT NOT NULL,
    span_name TEXT NOT NULL,
    pipeline_id TEXT NOT NULL,
    stage TEXT NOT NULL,
    model TEXT NOT NULL,
    provider TEXT NOT NULL,
    tokens_input BIGINT,
    tokens_output BIGINT,
    cost_input DOUBLE PRECISION,
    cost_output DOUBLE PRECISION,
    cost_total DOUBLE PRECISION,
    duration_ms DOUBLE PRECISION NOT NULL,
    PRIMARY KEY (time, span_id)
);

SELECT create_hypertable('spans', 'time',
    chunk_time_interval => INTERVAL '1 day',
    if_not_exists => TRUE);

CREATE INDEX IF NOT EXISTS idx_spans_pipeline ON spans (pipeline_id, time DESC);
CREATE INDEX IF NOT EXISTS idx_spans_trace ON spans (trace_id, time DESC);
CREATE INDEX IF NOT EXISTS idx_spans_model ON spans (model, time DESC);
CREATE INDEX IF NOT EXISTS idx_spans_provider ON spans (provider, time DESC);
"#;

/// The continuous-aggregate views keyed by trending interval.
///
/// Each must run outside a transaction block, so they are executed one
/// statement at a time rather than as part of `SCHEMA`.
pub const CONTINUOUS_AGGREGATES: &[(&str, &str)] = &[
    (
        "cost_hourly",
        r#"
CREATE MATERIALIZED VIEW IF NOT EXISTS cost_hourly
WITH (timescaledb.continuous) AS
SELECT
    time_bucket(INTERVAL '1 hour', time) AS bucket,
    pipeline_id,
    stage,
    model,
    provider,
    SUM(cost_total) AS cost_total,
    SUM(tokens_input) AS tokens_input,
    SUM(tokens_output) AS tokens_output,
    COUNT(*) AS span_count,
    AVG(cost_total) AS avg_cost
FROM spans
WHERE cost_total IS NOT NULL
GROUP BY bucket, pipeline_id, stage, model, provider
WITH NO DATA;
"#,
    ),
    (
        "cost_daily",
        r#"
CREATE MATERIALIZED VIEW IF NOT EXISTS cost_daily
WITH (timescaledb.continuous) AS
SELECT
    time_bucket(INTERVAL '1 day', time) AS bucket,
    pipeline_id,
    stage,
    model,
    provider,
    SUM(cost_total) AS cost_total,
    SUM(tokens_input) AS tokens_input,
    SUM(tokens_output) AS tokens_output,
    COUNT(*) AS span_count,
    AVG(cost_total) AS avg_cost
FROM spans
WHERE cost_total IS NOT NULL
GROUP BY bucket, pipeline_id, stage, model, provider
WITH NO DATA;
"#,
    ),
    (
        "cost_weekly",
        r#"
CREATE MATERIALIZED VIEW IF NOT EXISTS cost_weekly
WITH (timescaledb.continuous) AS
SELECT
    time_bucket(INTERVAL '1 week', time) AS bucket,
    pipeline_id,
    stage,
    model,
    provider,
    SUM(cost_total) AS cost_total,
    SUM(tokens_input) AS tokens_input,
    SUM(tokens_output) AS tokens_output,
    COUNT(*) AS span_count,
    AVG(cost_total) AS avg_cost
FROM spans
WHERE cost_total IS NOT NULL
GROUP BY bucket, pipeline_id, stage, model, provider
WITH NO DATA;
"#,
    ),
];

/// Refresh policies: hourly every 5 min, daily every hour, weekly every 6h
pub const REFRESH_POLICIES: &[&str] = &[
    r#"
SELECT add_continuous_aggregate_policy('cost_hourly',
    start_offset => INTERVAL '2 hours',
    end_offset => INTERVAL '5 minutes',
    schedule_interval => INTERVAL '5 minutes',
    if_not_exists => TRUE);
"#,
    r#"
SELECT add_continuous_aggregate_policy('cost_daily',
    start_offset => INTERVAL '2 days',
    end_offset => INTERVAL '1 hour',
    schedule_interval => INTERVAL '1 hour',
    if_not_exists => TRUE);
"#,
    r#"
SELECT add_continuous_aggregate_policy('cost_weekly',
    start_offset => INTERVAL '2 weeks',
    end_offset => INTERVAL '1 day',
    schedule_interval => INTERVAL '6 hours',
    if_not_exists => TRUE);
"#,
];

/// Retention policy template; `{days}` is replaced with the validated
/// `HIKARI_RETENTION_DAYS` value (an integer, never raw user input).
pub fn retention_policy(days: u32) -> String {
    format!(
        "SELECT add_retention_policy('spans', INTERVAL '{} days', if_not_exists => TRUE);",
        days
    )
}
