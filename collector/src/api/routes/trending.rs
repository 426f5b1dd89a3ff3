//! Cost trending endpoint

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;

use crate::api::types::parse_timestamp_param;
use crate::api::{ApiError, ApiState};
use crate::data::repositories::trending::{self, TrendingGroupBy, TrendingInterval};
use crate::data::types::Trending;

#[derive(Debug, Deserialize)]
pub struct TrendingQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    pub interval: Option<String>,
    pub group_by: Option<String>,
}

/// Get cost trending over time with a dimensional breakdown
#[utoipa::path(
    get,
    path = "/v1/cost/trending",
    tag = "trending",
    params(
        ("start" = String, Query, description = "Window start (ISO 8601, required)"),
        ("end" = String, Query, description = "Window end (ISO 8601, required)"),
        ("interval" = String, Query, description = "Bucket width: hour, day or week"),
        ("group_by" = String, Query, description = "Breakdown dimension: model, provider or stage"),
    ),
    responses(
        (status = 200, description = "Bucketed cost trend", body = Trending),
        (status = 400, description = "Missing or invalid parameters"),
        (status = 503, description = "Database unavailable"),
    )
)]
pub async fn get_cost_trending(
    State(state): State<ApiState>,
    Query(query): Query<TrendingQuery>,
) -> Result<Json<Trending>, ApiError> {
    let start = parse_timestamp_param(&query.start)?
        .ok_or_else(|| ApiError::bad_request("MISSING_PARAM", "start is required"))?;
    let end = parse_timestamp_param(&query.end)?
        .ok_or_else(|| ApiError::bad_request("MISSING_PARAM", "end is required"))?;
    if start >= end {
        return Err(ApiError::bad_request(
            "INVALID_TIME_RANGE",
            "start must be strictly before end",
        ));
    }

    let interval = query
        .interval
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("MISSING_PARAM", "interval is required"))
        .and_then(|raw| {
            TrendingInterval::parse(raw).ok_or_else(|| {
                ApiError::bad_request(
                    "INVALID_INTERVAL",
                    format!("Invalid interval: {}. Must be one of: hour, day, week", raw),
                )
            })
        })?;

    let group_by = query
        .group_by
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("MISSING_PARAM", "group_by is required"))
        .and_then(|raw| {
            TrendingGroupBy::parse(raw).ok_or_else(|| {
                ApiError::bad_request(
                    "INVALID_GROUP_BY",
                    format!(
                        "Invalid group_by: {}. Must be one of: model, provider, stage",
                        raw
                    ),
                )
            })
        })?;

    state.require_db()?;

    let result = trending::get_trending(&state.pool, start, end, interval, group_by)
        .await
        .map_err(ApiError::from_data)?;

    Ok(Json(result))
}
