//! Shared data types: the persisted span record and query result shapes

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// One accepted LLM call, ready for persistence.
///
/// Null cost/token fields mean unknown, never zero; writers must not
/// substitute defaults for them.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanRecord {
    pub time: DateTime<Utc>,
    pub trace_id: String,
    pub span_id: String,
    pub span_name: String,
    pub pipeline_id: String,
    pub stage: String,
    pub model: String,
    pub provider: String,
    pub tokens_input: Option<i64>,
    pub tokens_output: Option<i64>,
    pub cost_input: Option<f64>,
    pub cost_output: Option<f64>,
    pub cost_total: Option<f64>,
    pub duration_ms: f64,
}

/// Per-(stage, model, provider) cost rollup inside a pipeline
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StageCost {
    pub stage: String,
    pub model: String,
    pub provider: String,
    pub tokens_input: Option<i64>,
    pub tokens_output: Option<i64>,
    pub cost_input: Option<f64>,
    pub cost_output: Option<f64>,
    pub cost_total: Option<f64>,
    pub span_count: i64,
}

/// Full cost breakdown for one pipeline
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PipelineCost {
    pub pipeline_id: String,
    pub total_cost: f64,
    pub is_partial: bool,
    pub coverage_ratio: f64,
    pub stages: Vec<StageCost>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// One row of the pipeline listing
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PipelineSummary {
    pub pipeline_id: String,
    pub total_cost: f64,
    pub is_partial: bool,
    pub span_count: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Paginated pipeline listing
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PipelineList {
    pub pipelines: Vec<PipelineSummary>,
    pub total: i64,
    pub limit: u32,
    pub offset: u32,
}

/// One dimension's share of a trending bucket
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BucketBreakdown {
    pub key: String,
    pub cost: f64,
    pub percentage: f64,
}

/// One time bucket of the trending response
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TrendingBucket {
    pub timestamp: DateTime<Utc>,
    pub total_cost: f64,
    pub request_count: i64,
    pub avg_cost_per_request: f64,
    pub breakdown: Vec<BucketBreakdown>,
}

/// Cost trending over time
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Trending {
    pub buckets: Vec<TrendingBucket>,
}
