//! OTLP trace ingestion endpoint

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::{ApiError, ApiState};
use crate::domain::ingest::{ExportRequest, parse_export_request};

#[derive(Serialize, ToSchema)]
pub struct IngestResponse {
    pub accepted: usize,
    #[serde(skip_serializing_if = "is_zero")]
    pub rejected: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Ingest OTLP trace spans carrying Hikari cost attributes.
///
/// The body is decoded by hand so a malformed envelope is a clean 400;
/// per-span faults surface in a 207 while sibling spans are still
/// enqueued. Decoding and enqueueing happen without an await point in
/// between, so a cancelled request never leaves partial state.
#[utoipa::path(
    post,
    path = "/v1/traces",
    tag = "ingest",
    request_body(content = String, description = "OTLP-JSON export request"),
    responses(
        (status = 200, description = "All spans accepted", body = IngestResponse),
        (status = 207, description = "Some spans rejected", body = IngestResponse),
        (status = 400, description = "Malformed envelope"),
    )
)]
pub async fn ingest(State(state): State<ApiState>, body: Bytes) -> Response {
    let request: ExportRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return ApiError::bad_request("INVALID_BODY", format!("Invalid OTLP envelope: {}", e))
                .into_response();
        }
    };

    let (accepted, rejections) = parse_export_request(&request);
    let accepted_count = accepted.len();

    if accepted_count > 0 {
        state.buffer.push_batch(accepted);
    }

    let status = if rejections.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::MULTI_STATUS
    };

    (
        status,
        Json(IngestResponse {
            accepted: accepted_count,
            rejected: rejections.len(),
            errors: rejections.iter().map(|r| r.message()).collect(),
        }),
    )
        .into_response()
}
