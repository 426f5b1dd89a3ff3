//! Pipeline cost breakdown and listing queries
//!
//! SQL does the grouping; coverage arithmetic and response assembly happen
//! in pure functions so the partial-coverage contract is unit-testable.

use std::cmp::Ordering;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::core::constants::DB_READ_TIMEOUT_SECS;
use crate::data::error::DataError;
use crate::data::types::{PipelineCost, PipelineList, PipelineSummary, StageCost};

/// One `(stage, model, provider)` group as returned by the breakdown query
#[derive(Debug, sqlx::FromRow)]
pub struct StageRow {
    pub stage: String,
    pub model: String,
    pub provider: String,
    pub tokens_input: Option<i64>,
    pub tokens_output: Option<i64>,
    pub cost_input: Option<f64>,
    pub cost_output: Option<f64>,
    pub cost_total: Option<f64>,
    pub span_count: i64,
    pub costed_count: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Get the cost breakdown for a pipeline, or None if it has no spans
pub async fn get_pipeline_cost(
    pool: &PgPool,
    pipeline_id: &str,
) -> Result<Option<PipelineCost>, DataError> {
    let rows: Vec<StageRow> = read_timeout(
        sqlx::query_as(
            r#"
            SELECT
                stage,
                model,
                provider,
                SUM(tokens_input)::BIGINT AS tokens_input,
                SUM(tokens_output)::BIGINT AS tokens_output,
                SUM(cost_input) AS cost_input,
                SUM(cost_output) AS cost_output,
                SUM(cost_total) AS cost_total,
                COUNT(*) AS span_count,
                COUNT(*) FILTER (WHERE cost_total IS NOT NULL) AS costed_count,
                MIN(time) AS first_seen,
                MAX(time) AS last_seen
            FROM spans
            WHERE pipeline_id = $1
            GROUP BY stage, model, provider
            "#,
        )
        .bind(pipeline_id)
        .fetch_all(pool),
    )
    .await?;

    Ok(build_pipeline_cost(pipeline_id, rows))
}

/// Assemble the breakdown response from grouped rows.
///
/// `total_cost` sums only known costs; `coverage_ratio` is the fraction of
/// spans with a known `cost_total`. Stages are ordered by cost descending
/// with unknown costs last, ties broken by stage then model.
pub fn build_pipeline_cost(pipeline_id: &str, rows: Vec<StageRow>) -> Option<PipelineCost> {
    if rows.is_empty() {
        return None;
    }

    let mut total_cost = 0.0;
    let mut total_spans = 0i64;
    let mut costed_spans = 0i64;
    let mut first_seen = rows[0].first_seen;
    let mut last_seen = rows[0].last_seen;

    let mut stages: Vec<StageCost> = Vec::with_capacity(rows.len());
    for row in rows {
        total_spans += row.span_count;
        costed_spans += row.costed_count;
        if let Some(cost) = row.cost_total {
            total_cost += cost;
        }
        if row.first_seen < first_seen {
            first_seen = row.first_seen;
        }
        if row.last_seen > last_seen {
            last_seen = row.last_seen;
        }
        stages.push(StageCost {
            stage: row.stage,
            model: row.model,
            provider: row.provider,
            tokens_input: row.tokens_input,
            tokens_output: row.tokens_output,
            cost_input: row.cost_input,
            cost_output: row.cost_output,
            cost_total: row.cost_total,
            span_count: row.span_count,
        });
    }

    stages.sort_by(|a, b| {
        cmp_cost_desc_nulls_last(a.cost_total, b.cost_total)
            .then_with(|| a.stage.cmp(&b.stage))
            .then_with(|| a.model.cmp(&b.model))
    });

    let coverage_ratio = if total_spans > 0 {
        costed_spans as f64 / total_spans as f64
    } else {
        0.0
    };

    Some(PipelineCost {
        pipeline_id: pipeline_id.to_string(),
        total_cost,
        is_partial: coverage_ratio < 1.0,
        coverage_ratio,
        stages,
        first_seen,
        last_seen,
    })
}

fn cmp_cost_desc_nulls_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// List pipelines whose span window intersects `[start, end]`, newest first
pub async fn list_pipelines(
    pool: &PgPool,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    limit: u32,
    offset: u32,
) -> Result<PipelineList, DataError> {
    let mut having: Vec<String> = Vec::new();
    let mut param_idx = 1;
    if start.is_some() {
        having.push(format!("MAX(time) >= ${}", param_idx));
        param_idx += 1;
    }
    if end.is_some() {
        having.push(format!("MIN(time) <= ${}", param_idx));
        param_idx += 1;
    }
    let having_sql = if having.is_empty() {
        String::new()
    } else {
        format!("HAVING {}", having.join(" AND "))
    };

    let count_sql = format!(
        "SELECT COUNT(*) FROM (SELECT pipeline_id FROM spans GROUP BY pipeline_id {}) p",
        having_sql
    );
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(s) = start {
        count_query = count_query.bind(s);
    }
    if let Some(e) = end {
        count_query = count_query.bind(e);
    }
    let total = read_timeout(count_query.fetch_one(pool)).await?;

    let list_sql = format!(
        r#"
        SELECT
            pipeline_id,
            MIN(time) AS first_seen,
            MAX(time) AS last_seen,
            COUNT(*) AS span_count,
            COALESCE(SUM(cost_total), 0) AS total_cost,
            COUNT(*) FILTER (WHERE cost_total IS NULL) > 0 AS is_partial
        FROM spans
        GROUP BY pipeline_id
        {}
        ORDER BY last_seen DESC, pipeline_id ASC
        LIMIT ${} OFFSET ${}
        "#,
        having_sql,
        param_idx,
        param_idx + 1
    );

    type ListRow = (String, DateTime<Utc>, DateTime<Utc>, i64, f64, bool);
    let mut list_query = sqlx::query_as::<_, ListRow>(&list_sql);
    if let Some(s) = start {
        list_query = list_query.bind(s);
    }
    if let Some(e) = end {
        list_query = list_query.bind(e);
    }
    let rows = read_timeout(
        list_query
            .bind(limit as i64)
            .bind(offset as i64)
            .fetch_all(pool),
    )
    .await?;

    let pipelines = rows
        .into_iter()
        .map(
            |(pipeline_id, first_seen, last_seen, span_count, total_cost, is_partial)| {
                PipelineSummary {
                    pipeline_id,
                    total_cost,
                    is_partial,
                    span_count,
                    first_seen,
                    last_seen,
                }
            },
        )
        .collect();

    Ok(PipelineList {
        pipelines,
        total,
        limit,
        offset,
    })
}

async fn read_timeout<T>(
    fut: impl Future<Output = Result<T, sqlx::Error>>,
) -> Result<T, DataError> {
    tokio::time::timeout(Duration::from_secs(DB_READ_TIMEOUT_SECS), fut)
        .await
        .map_err(|_| DataError::timeout(DB_READ_TIMEOUT_SECS))?
        .map_err(DataError::from)
}
