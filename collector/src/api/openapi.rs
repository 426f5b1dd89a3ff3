//! OpenAPI document generation

use axum::Json;
use axum::response::IntoResponse;
use utoipa::OpenApi;

use super::routes;
use crate::data::types::{
    BucketBreakdown, PipelineCost, PipelineList, PipelineSummary, StageCost, Trending,
    TrendingBucket,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Hikari Collector",
        description = "OpenTelemetry-based LLM pipeline cost intelligence",
    ),
    paths(
        routes::traces::ingest,
        routes::pipelines::get_pipeline_cost,
        routes::pipelines::list_pipelines,
        routes::trending::get_cost_trending,
        routes::health::health,
    ),
    components(schemas(
        routes::traces::IngestResponse,
        routes::health::HealthResponse,
        PipelineCost,
        PipelineList,
        PipelineSummary,
        StageCost,
        Trending,
        TrendingBucket,
        BucketBreakdown,
    )),
    tags(
        (name = "ingest", description = "OTLP span ingestion"),
        (name = "pipelines", description = "Pipeline cost queries"),
        (name = "trending", description = "Cost trending"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDoc;

/// Serve the generated OpenAPI document
pub async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
