//! Pipeline cost breakdown and listing endpoints

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

use crate::api::types::parse_timestamp_param;
use crate::api::{ApiError, ApiState};
use crate::core::constants::{PIPELINES_DEFAULT_LIMIT, PIPELINES_MAX_LIMIT};
use crate::data::repositories::pipelines;
use crate::data::types::{PipelineCost, PipelineList};
use crate::domain::ingest::is_valid_pipeline_id;

/// Get the cost breakdown for a pipeline
#[utoipa::path(
    get,
    path = "/v1/pipelines/{pipeline_id}/cost",
    tag = "pipelines",
    params(
        ("pipeline_id" = String, Path, description = "Pipeline identifier")
    ),
    responses(
        (status = 200, description = "Cost breakdown by stage", body = PipelineCost),
        (status = 400, description = "Invalid pipeline id"),
        (status = 404, description = "Unknown pipeline"),
        (status = 503, description = "Database unavailable"),
    )
)]
pub async fn get_pipeline_cost(
    State(state): State<ApiState>,
    Path(pipeline_id): Path<String>,
) -> Result<Json<PipelineCost>, ApiError> {
    if !is_valid_pipeline_id(&pipeline_id) {
        return Err(ApiError::bad_request(
            "INVALID_PIPELINE_ID",
            "pipeline_id must be 1-256 characters of [A-Za-z0-9-_:.]",
        ));
    }

    state.require_db()?;

    let result = pipelines::get_pipeline_cost(&state.pool, &pipeline_id)
        .await
        .map_err(ApiError::from_data)?;

    result.map(Json).ok_or_else(|| {
        ApiError::not_found(
            "PIPELINE_NOT_FOUND",
            format!("Pipeline {} not found", pipeline_id),
        )
    })
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// List pipelines with pagination and optional time filtering
#[utoipa::path(
    get,
    path = "/v1/pipelines",
    tag = "pipelines",
    params(
        ("start" = Option<String>, Query, description = "Window start (ISO 8601)"),
        ("end" = Option<String>, Query, description = "Window end (ISO 8601)"),
        ("limit" = Option<u32>, Query, description = "Page size (1-1000, default 100)"),
        ("offset" = Option<u32>, Query, description = "Pipelines to skip (default 0)"),
    ),
    responses(
        (status = 200, description = "Paginated pipeline summaries", body = PipelineList),
        (status = 400, description = "Invalid parameters"),
        (status = 503, description = "Database unavailable"),
    )
)]
pub async fn list_pipelines(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PipelineList>, ApiError> {
    let start = parse_timestamp_param(&query.start)?;
    let end = parse_timestamp_param(&query.end)?;

    let limit = query.limit.unwrap_or(PIPELINES_DEFAULT_LIMIT);
    if limit == 0 || limit > PIPELINES_MAX_LIMIT {
        return Err(ApiError::bad_request(
            "INVALID_LIMIT",
            format!("limit must be between 1 and {}", PIPELINES_MAX_LIMIT),
        ));
    }
    let offset = query.offset.unwrap_or(0);

    state.require_db()?;

    let list = pipelines::list_pipelines(&state.pool, start, end, limit, offset)
        .await
        .map_err(ApiError::from_data)?;

    Ok(Json(list))
}
