//! OTLP span parsing and validation for Hikari cost attributes
//!
//! Turns an OTLP-JSON export request into accepted `SpanRecord`s plus
//! per-span rejections. Faults are isolated per span: one bad span never
//! blocks its siblings. Only the outer envelope shape is the caller's
//! problem (HTTP 400).

pub mod attributes;

use chrono::{TimeDelta, Utc};
use serde::Deserialize;
use serde_json::Value;

use self::attributes::{AttrValue, flatten_attributes};
use crate::data::types::SpanRecord;
use crate::utils::time::{nanos_to_datetime, nanos_to_millis};

// Attribute vocabulary accepted from clients
pub const ATTR_PIPELINE_ID: &str = "hikari.pipeline_id";
pub const ATTR_STAGE: &str = "hikari.stage";
pub const ATTR_MODEL: &str = "hikari.model";
pub const ATTR_PROVIDER: &str = "hikari.provider";
pub const ATTR_TOKENS_INPUT: &str = "hikari.tokens.input";
pub const ATTR_TOKENS_OUTPUT: &str = "hikari.tokens.output";
pub const ATTR_COST_INPUT: &str = "hikari.cost.input";
pub const ATTR_COST_OUTPUT: &str = "hikari.cost.output";
pub const ATTR_COST_TOTAL: &str = "hikari.cost.total";

const REQUIRED_ATTRIBUTES: [&str; 3] = [ATTR_STAGE, ATTR_MODEL, ATTR_PROVIDER];

/// Earliest plausible LLM telemetry: 2020-01-01T00:00:00Z in nanoseconds
const MIN_TIMESTAMP_NS: i64 = 1_577_836_800_000_000_000;

/// Clock-skew allowance before a timestamp counts as far-future
const MAX_TIMESTAMP_FUTURE_DAYS: i64 = 365;

/// Spans longer than 24 hours are treated as malformed
const MAX_SPAN_DURATION_NS: i64 = 24 * 60 * 60 * 1_000_000_000;

/// Absolute tolerance when comparing a client-sent total against the
/// component sum
const COST_SUM_TOLERANCE: f64 = 1e-9;

const MAX_ID_LENGTH: usize = 64;
const MAX_NAME_LENGTH: usize = 256;
const MAX_PIPELINE_ID_LENGTH: usize = 256;

// =============================================================================
// OTLP-JSON request models
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SpanAttribute {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: Value,
}

/// One span as it appears on the wire. Fields are optional so that a
/// structurally broken span is rejected on its own instead of failing the
/// whole request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtlpSpan {
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub span_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub start_time_unix_nano: Value,
    #[serde(default)]
    pub end_time_unix_nano: Value,
    #[serde(default)]
    pub attributes: Vec<SpanAttribute>,
}

#[derive(Debug, Deserialize)]
pub struct ScopeSpans {
    #[serde(default)]
    pub spans: Vec<OtlpSpan>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpans {
    #[serde(default)]
    pub scope_spans: Vec<ScopeSpans>,
}

/// The `/v1/traces` envelope; a missing `resourceSpans` key is a request
/// shape error
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    pub resource_spans: Vec<ResourceSpans>,
}

/// A span that failed validation, with the reason clients will see
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub span_id: String,
    pub reason: String,
}

impl Rejection {
    pub fn message(&self) -> String {
        format!("span {}: {}", self.span_id, self.reason)
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse and validate an export request.
///
/// Returns the accepted records in payload order together with per-span
/// rejection details.
pub fn parse_export_request(request: &ExportRequest) -> (Vec<SpanRecord>, Vec<Rejection>) {
    let mut accepted = Vec::new();
    let mut rejections = Vec::new();

    for resource_spans in &request.resource_spans {
        for scope_spans in &resource_spans.scope_spans {
            for span in &scope_spans.spans {
                match parse_span(span) {
                    Ok(record) => accepted.push(record),
                    Err(reason) => {
                        let span_id = span
                            .span_id
                            .clone()
                            .unwrap_or_else(|| "<unknown>".to_string());
                        tracing::warn!(span_id = %span_id, reason = %reason, "Span rejected");
                        rejections.push(Rejection { span_id, reason });
                    }
                }
            }
        }
    }

    (accepted, rejections)
}

fn parse_span(span: &OtlpSpan) -> Result<SpanRecord, String> {
    let trace_id = span
        .trace_id
        .as_deref()
        .ok_or_else(|| "traceId is required".to_string())?;
    if !is_valid_id(trace_id) {
        return Err("traceId must be 1-64 alphanumeric, hyphen or underscore characters".into());
    }

    let span_id = span
        .span_id
        .as_deref()
        .ok_or_else(|| "spanId is required".to_string())?;
    if !is_valid_id(span_id) {
        return Err("spanId must be 1-64 alphanumeric, hyphen or underscore characters".into());
    }

    let span_name = span
        .name
        .as_deref()
        .ok_or_else(|| "name is required".to_string())?;
    if span_name.is_empty() || span_name.len() > MAX_NAME_LENGTH {
        return Err(format!("name must be 1-{} characters", MAX_NAME_LENGTH));
    }

    let attrs = flatten_attributes(&span.attributes);

    let mut missing: Vec<&str> = REQUIRED_ATTRIBUTES
        .iter()
        .copied()
        .filter(|key| !attrs.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        missing.sort_unstable();
        return Err(if missing.len() == 1 {
            format!("missing required attribute {}", missing[0])
        } else {
            format!("missing required attributes {}", missing.join(", "))
        });
    }

    let stage = required_string(&attrs, ATTR_STAGE)?;
    let model = required_string(&attrs, ATTR_MODEL)?;
    let provider = required_string(&attrs, ATTR_PROVIDER)?;

    let start_ns = validate_timestamp_ns(&span.start_time_unix_nano, "startTimeUnixNano")?;
    let end_ns = validate_timestamp_ns(&span.end_time_unix_nano, "endTimeUnixNano")?;
    if end_ns < start_ns {
        return Err(format!(
            "endTimeUnixNano ({}) must be >= startTimeUnixNano ({})",
            end_ns, start_ns
        ));
    }
    let duration_ns = end_ns - start_ns;
    if duration_ns > MAX_SPAN_DURATION_NS {
        return Err(format!(
            "span duration ({:.2}s) exceeds maximum allowed duration ({}s)",
            duration_ns as f64 / 1e9,
            MAX_SPAN_DURATION_NS / 1_000_000_000
        ));
    }

    let pipeline_id = match attrs.get(ATTR_PIPELINE_ID) {
        Some(value) => {
            let id = value
                .as_str()
                .ok_or_else(|| format!("attribute {} must be a string", ATTR_PIPELINE_ID))?;
            if !is_valid_pipeline_id(id) {
                return Err(format!(
                    "attribute {} must be 1-{} characters of [A-Za-z0-9-_:.]",
                    ATTR_PIPELINE_ID, MAX_PIPELINE_ID_LENGTH
                ));
            }
            id.to_string()
        }
        None => trace_id.to_string(),
    };

    let tokens_input = optional_tokens(&attrs, ATTR_TOKENS_INPUT)?;
    let tokens_output = optional_tokens(&attrs, ATTR_TOKENS_OUTPUT)?;
    let cost_input = optional_cost(&attrs, ATTR_COST_INPUT)?;
    let cost_output = optional_cost(&attrs, ATTR_COST_OUTPUT)?;
    let declared_total = optional_cost(&attrs, ATTR_COST_TOTAL)?;

    // Null propagation: an unknown component makes the total unknown. With
    // both components known, an absent or inconsistent declared total is
    // replaced by the component sum.
    let cost_total = match (cost_input, cost_output) {
        (Some(ci), Some(co)) => {
            let sum = ci + co;
            match declared_total {
                Some(ct) if (ct - sum).abs() <= COST_SUM_TOLERANCE => Some(ct),
                _ => Some(sum),
            }
        }
        _ => None,
    };

    Ok(SpanRecord {
        time: nanos_to_datetime(end_ns),
        trace_id: trace_id.to_string(),
        span_id: span_id.to_string(),
        span_name: span_name.to_string(),
        pipeline_id,
        stage,
        model,
        provider,
        tokens_input,
        tokens_output,
        cost_input,
        cost_output,
        cost_total,
        duration_ms: nanos_to_millis(duration_ns),
    })
}

fn required_string(
    attrs: &std::collections::HashMap<String, AttrValue>,
    key: &str,
) -> Result<String, String> {
    attrs[key]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| format!("attribute {} must be a string", key))
}

fn optional_tokens(
    attrs: &std::collections::HashMap<String, AttrValue>,
    key: &str,
) -> Result<Option<i64>, String> {
    match attrs.get(key) {
        None => Ok(None),
        Some(value) => {
            let tokens = value
                .to_i64()
                .ok_or_else(|| format!("attribute {} must be an integer", key))?;
            if tokens < 0 {
                return Err(format!("attribute {} must be non-negative", key));
            }
            Ok(Some(tokens))
        }
    }
}

fn optional_cost(
    attrs: &std::collections::HashMap<String, AttrValue>,
    key: &str,
) -> Result<Option<f64>, String> {
    match attrs.get(key) {
        None => Ok(None),
        Some(value) => {
            let cost = value
                .to_f64()
                .ok_or_else(|| format!("attribute {} must be a number", key))?;
            if !cost.is_finite() || cost < 0.0 {
                return Err(format!("attribute {} must be non-negative", key));
            }
            Ok(Some(cost))
        }
    }
}

fn validate_timestamp_ns(raw: &Value, field: &str) -> Result<i64, String> {
    let nanos = match raw {
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| format!("{} must be a valid integer: {}", field, e))?,
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| format!("{} must be a valid integer", field))?,
        Value::Null => return Err(format!("{} is required", field)),
        _ => return Err(format!("{} must be a valid integer", field)),
    };

    if nanos < 0 {
        return Err(format!("{} cannot be negative", field));
    }
    if nanos < MIN_TIMESTAMP_NS {
        return Err(format!(
            "{} is too old (before 2020-01-01). Value: {}, minimum: {}",
            field, nanos, MIN_TIMESTAMP_NS
        ));
    }
    let max_ns = (Utc::now() + TimeDelta::days(MAX_TIMESTAMP_FUTURE_DAYS))
        .timestamp_nanos_opt()
        .unwrap_or(i64::MAX);
    if nanos > max_ns {
        return Err(format!(
            "{} is too far in the future (more than {} days). Value: {}, maximum: {}",
            field, MAX_TIMESTAMP_FUTURE_DAYS, nanos, max_ns
        ));
    }

    Ok(nanos)
}

fn is_valid_id(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_ID_LENGTH
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Pipeline identifiers allow the same characters as common trace id
/// formats (hex, UUID, custom prefixes with colons and dots)
pub fn is_valid_pipeline_id(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_PIPELINE_ID_LENGTH
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
}

#[cfg(test)]
mod tests;
