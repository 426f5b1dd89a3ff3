use chrono::{TimeZone, Utc};
use serde_json::{Value, json};

use super::*;

// 2025-06-01T10:00:00Z
const START_NS: i64 = 1_748_772_000_000_000_000;
// 1.5 seconds later
const END_NS: i64 = 1_748_772_001_500_000_000;

fn attr(key: &str, value: Value) -> Value {
    json!({"key": key, "value": value})
}

fn required_attrs() -> Vec<Value> {
    vec![
        attr("hikari.stage", json!({"stringValue": "extract"})),
        attr("hikari.model", json!({"stringValue": "gpt-4o"})),
        attr("hikari.provider", json!({"stringValue": "openai"})),
    ]
}

fn span_with_attrs(span_id: &str, attributes: Vec<Value>) -> Value {
    json!({
        "traceId": "tr-abc",
        "spanId": span_id,
        "name": "openai.chat",
        "startTimeUnixNano": START_NS.to_string(),
        "endTimeUnixNano": END_NS.to_string(),
        "attributes": attributes,
    })
}

fn request_with_spans(spans: Vec<Value>) -> ExportRequest {
    serde_json::from_value(json!({
        "resourceSpans": [{"scopeSpans": [{"spans": spans}]}]
    }))
    .unwrap()
}

fn parse_single(span: Value) -> (Vec<crate::data::types::SpanRecord>, Vec<Rejection>) {
    parse_export_request(&request_with_spans(vec![span]))
}

#[test]
fn test_accepts_full_span() {
    let mut attributes = required_attrs();
    attributes.extend([
        attr("hikari.tokens.input", json!({"intValue": "100"})),
        attr("hikari.tokens.output", json!({"intValue": 50})),
        attr("hikari.cost.input", json!({"doubleValue": 0.00025})),
        attr("hikari.cost.output", json!({"doubleValue": 0.0005})),
        attr("hikari.cost.total", json!({"doubleValue": 0.00075})),
        attr("hikari.pipeline_id", json!({"stringValue": "pipe-a"})),
    ]);
    let (accepted, rejections) = parse_single(span_with_attrs("sp-1", attributes));

    assert!(rejections.is_empty());
    assert_eq!(accepted.len(), 1);
    let record = &accepted[0];
    assert_eq!(record.pipeline_id, "pipe-a");
    assert_eq!(record.stage, "extract");
    assert_eq!(record.model, "gpt-4o");
    assert_eq!(record.provider, "openai");
    assert_eq!(record.tokens_input, Some(100));
    assert_eq!(record.tokens_output, Some(50));
    assert_eq!(record.cost_input, Some(0.00025));
    assert_eq!(record.cost_output, Some(0.0005));
    assert_eq!(record.cost_total, Some(0.00075));
    assert_eq!(record.duration_ms, 1500.0);
    // time is the span end time
    assert_eq!(
        record.time,
        Utc.timestamp_opt(1_748_772_001, 500_000_000).unwrap()
    );
}

#[test]
fn test_pipeline_id_defaults_to_trace_id() {
    let (accepted, rejections) = parse_single(span_with_attrs("sp-1", required_attrs()));
    assert!(rejections.is_empty());
    assert_eq!(accepted[0].pipeline_id, "tr-abc");
}

#[test]
fn test_missing_stage_is_rejected() {
    let attributes = vec![
        attr("hikari.model", json!({"stringValue": "gpt-4o"})),
        attr("hikari.provider", json!({"stringValue": "openai"})),
    ];
    let (accepted, rejections) = parse_single(span_with_attrs("sp-1", attributes));
    assert!(accepted.is_empty());
    assert_eq!(rejections.len(), 1);
    assert_eq!(rejections[0].span_id, "sp-1");
    assert_eq!(
        rejections[0].reason,
        "missing required attribute hikari.stage"
    );
    assert_eq!(
        rejections[0].message(),
        "span sp-1: missing required attribute hikari.stage"
    );
}

#[test]
fn test_multiple_missing_attributes_listed_sorted() {
    let attributes = vec![attr("hikari.provider", json!({"stringValue": "openai"}))];
    let (_, rejections) = parse_single(span_with_attrs("sp-1", attributes));
    assert_eq!(
        rejections[0].reason,
        "missing required attributes hikari.model, hikari.stage"
    );
}

#[test]
fn test_bad_span_does_not_block_siblings() {
    let spans = vec![
        span_with_attrs("sp-1", required_attrs()),
        span_with_attrs("sp-2", vec![]),
        span_with_attrs("sp-3", required_attrs()),
    ];
    let (accepted, rejections) = parse_export_request(&request_with_spans(spans));

    assert_eq!(accepted.len(), 2);
    assert_eq!(accepted[0].span_id, "sp-1");
    assert_eq!(accepted[1].span_id, "sp-3");
    assert_eq!(rejections.len(), 1);
    assert_eq!(rejections[0].span_id, "sp-2");
}

#[test]
fn test_unknown_and_foreign_attributes_ignored() {
    let mut attributes = required_attrs();
    attributes.extend([
        attr("hikari.something_else", json!({"stringValue": "x"})),
        attr("http.method", json!({"stringValue": "POST"})),
    ]);
    let (accepted, rejections) = parse_single(span_with_attrs("sp-1", attributes));
    assert!(rejections.is_empty());
    assert_eq!(accepted.len(), 1);
}

#[test]
fn test_cost_total_nulled_when_component_missing() {
    let mut attributes = required_attrs();
    attributes.extend([
        attr("hikari.cost.input", json!({"doubleValue": 0.01})),
        attr("hikari.cost.total", json!({"doubleValue": 0.03})),
    ]);
    let (accepted, _) = parse_single(span_with_attrs("sp-1", attributes));
    let record = &accepted[0];
    assert_eq!(record.cost_input, Some(0.01));
    assert_eq!(record.cost_output, None);
    assert_eq!(record.cost_total, None);
}

#[test]
fn test_cost_total_computed_when_absent() {
    let mut attributes = required_attrs();
    attributes.extend([
        attr("hikari.cost.input", json!({"doubleValue": 0.00025})),
        attr("hikari.cost.output", json!({"doubleValue": 0.0005})),
    ]);
    let (accepted, _) = parse_single(span_with_attrs("sp-1", attributes));
    assert_eq!(accepted[0].cost_total, Some(0.00075));
}

#[test]
fn test_inconsistent_cost_total_replaced_by_sum() {
    let mut attributes = required_attrs();
    attributes.extend([
        attr("hikari.cost.input", json!({"doubleValue": 0.01})),
        attr("hikari.cost.output", json!({"doubleValue": 0.02})),
        attr("hikari.cost.total", json!({"doubleValue": 0.5})),
    ]);
    let (accepted, _) = parse_single(span_with_attrs("sp-1", attributes));
    let total = accepted[0].cost_total.unwrap();
    assert!((total - 0.03).abs() < 1e-12);
}

#[test]
fn test_consistent_cost_total_kept_as_sent() {
    let mut attributes = required_attrs();
    attributes.extend([
        attr("hikari.cost.input", json!({"doubleValue": 0.01})),
        attr("hikari.cost.output", json!({"doubleValue": 0.02})),
        attr("hikari.cost.total", json!({"doubleValue": 0.030000000000000002})),
    ]);
    let (accepted, rejections) = parse_single(span_with_attrs("sp-1", attributes));
    assert!(rejections.is_empty());
    assert_eq!(accepted[0].cost_total, Some(0.030000000000000002));
}

#[test]
fn test_non_integer_tokens_rejected() {
    let mut attributes = required_attrs();
    attributes.push(attr("hikari.tokens.input", json!({"stringValue": "lots"})));
    let (accepted, rejections) = parse_single(span_with_attrs("sp-1", attributes));
    assert!(accepted.is_empty());
    assert_eq!(
        rejections[0].reason,
        "attribute hikari.tokens.input must be an integer"
    );
}

#[test]
fn test_negative_cost_rejected() {
    let mut attributes = required_attrs();
    attributes.push(attr("hikari.cost.input", json!({"doubleValue": -0.5})));
    let (_, rejections) = parse_single(span_with_attrs("sp-1", attributes));
    assert_eq!(
        rejections[0].reason,
        "attribute hikari.cost.input must be non-negative"
    );
}

#[test]
fn test_non_string_required_attribute_rejected() {
    let attributes = vec![
        attr("hikari.stage", json!({"intValue": "3"})),
        attr("hikari.model", json!({"stringValue": "gpt-4o"})),
        attr("hikari.provider", json!({"stringValue": "openai"})),
    ];
    let (_, rejections) = parse_single(span_with_attrs("sp-1", attributes));
    assert_eq!(
        rejections[0].reason,
        "attribute hikari.stage must be a string"
    );
}

#[test]
fn test_unparseable_timestamp_rejected() {
    let mut span = span_with_attrs("sp-1", required_attrs());
    span["endTimeUnixNano"] = json!("not-a-number");
    let (_, rejections) = parse_single(span);
    assert!(rejections[0].reason.contains("endTimeUnixNano"));
}

#[test]
fn test_missing_timestamp_rejected() {
    let mut span = span_with_attrs("sp-1", required_attrs());
    span.as_object_mut().unwrap().remove("startTimeUnixNano");
    let (_, rejections) = parse_single(span);
    assert_eq!(rejections[0].reason, "startTimeUnixNano is required");
}

#[test]
fn test_numeric_timestamp_accepted() {
    let mut span = span_with_attrs("sp-1", required_attrs());
    span["startTimeUnixNano"] = json!(START_NS);
    span["endTimeUnixNano"] = json!(END_NS);
    let (accepted, rejections) = parse_single(span);
    assert!(rejections.is_empty());
    assert_eq!(accepted.len(), 1);
}

#[test]
fn test_pre_2020_timestamp_rejected() {
    let mut span = span_with_attrs("sp-1", required_attrs());
    span["startTimeUnixNano"] = json!("1000000000000000000"); // 2001
    let (_, rejections) = parse_single(span);
    assert!(rejections[0].reason.contains("too old"));
}

#[test]
fn test_far_future_timestamp_rejected() {
    let future = (Utc::now() + chrono::TimeDelta::days(400))
        .timestamp_nanos_opt()
        .unwrap();
    let mut span = span_with_attrs("sp-1", required_attrs());
    span["startTimeUnixNano"] = json!(future.to_string());
    span["endTimeUnixNano"] = json!(future.to_string());
    let (_, rejections) = parse_single(span);
    assert!(rejections[0].reason.contains("too far in the future"));
}

#[test]
fn test_end_before_start_rejected() {
    let mut span = span_with_attrs("sp-1", required_attrs());
    span["startTimeUnixNano"] = json!(END_NS.to_string());
    span["endTimeUnixNano"] = json!(START_NS.to_string());
    let (_, rejections) = parse_single(span);
    assert!(rejections[0].reason.contains("must be >="));
}

#[test]
fn test_span_longer_than_a_day_rejected() {
    let mut span = span_with_attrs("sp-1", required_attrs());
    let end = START_NS + 25 * 3600 * 1_000_000_000;
    span["endTimeUnixNano"] = json!(end.to_string());
    let (_, rejections) = parse_single(span);
    assert!(rejections[0].reason.contains("exceeds maximum"));
}

#[test]
fn test_invalid_trace_id_rejected() {
    let mut span = span_with_attrs("sp-1", required_attrs());
    span["traceId"] = json!("bad id with spaces");
    let (_, rejections) = parse_single(span);
    assert!(rejections[0].reason.contains("traceId"));
}

#[test]
fn test_missing_span_id_rejected_as_unknown() {
    let mut span = span_with_attrs("sp-1", required_attrs());
    span.as_object_mut().unwrap().remove("spanId");
    let (_, rejections) = parse_single(span);
    assert_eq!(rejections[0].span_id, "<unknown>");
    assert_eq!(rejections[0].reason, "spanId is required");
}

#[test]
fn test_overlong_name_rejected() {
    let mut span = span_with_attrs("sp-1", required_attrs());
    span["name"] = json!("x".repeat(300));
    let (_, rejections) = parse_single(span);
    assert!(rejections[0].reason.contains("name"));
}

#[test]
fn test_invalid_pipeline_id_attribute_rejected() {
    let mut attributes = required_attrs();
    attributes.push(attr("hikari.pipeline_id", json!({"stringValue": "has spaces"})));
    let (_, rejections) = parse_single(span_with_attrs("sp-1", attributes));
    assert!(rejections[0].reason.contains("hikari.pipeline_id"));
}

#[test]
fn test_envelope_requires_resource_spans() {
    let result: Result<ExportRequest, _> = serde_json::from_value(json!({"spans": []}));
    assert!(result.is_err());
}

#[test]
fn test_empty_scope_lists_accepted() {
    let request: ExportRequest =
        serde_json::from_value(json!({"resourceSpans": [{"scopeSpans": []}]})).unwrap();
    let (accepted, rejections) = parse_export_request(&request);
    assert!(accepted.is_empty());
    assert!(rejections.is_empty());
}

#[test]
fn test_pipeline_id_validation() {
    assert!(is_valid_pipeline_id("pipe-a"));
    assert!(is_valid_pipeline_id("tr:xyz.01_2"));
    assert!(!is_valid_pipeline_id(""));
    assert!(!is_valid_pipeline_id("has spaces"));
    assert!(!is_valid_pipeline_id(&"x".repeat(257)));
}
