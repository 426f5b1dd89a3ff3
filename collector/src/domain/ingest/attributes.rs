//! OTLP attribute flattening and typed value coercion

use std::collections::HashMap;

use serde_json::Value;

use super::SpanAttribute;

/// Typed attribute value after decoding the OTLP tagged union
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Str(String),
    Int(i64),
    Double(f64),
    Bool(bool),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Coerce to an integer. Accepts integer-valued doubles and numeric
    /// strings, mirroring what permissive exporters put on the wire.
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Double(d) if d.fract() == 0.0 && d.is_finite() => Some(*d as i64),
            Self::Str(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Coerce to a float. Integer-valued inputs stay exact.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Self::Double(d) => Some(*d),
            Self::Int(i) => Some(*i as f64),
            Self::Str(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }
}

/// Decode one OTLP-JSON attribute value.
///
/// The wire format is a tagged union (`{"stringValue": ...}`,
/// `{"intValue": "123"}`, ...); intValue arrives as a decimal string per
/// the OTLP JSON mapping but integer JSON numbers are accepted too. Bare
/// scalars are tolerated for hand-written test payloads.
pub fn decode_attr_value(raw: &Value) -> Option<AttrValue> {
    if let Value::Object(map) = raw {
        if let Some(v) = map.get("stringValue") {
            return v.as_str().map(|s| AttrValue::Str(s.to_string()));
        }
        if let Some(v) = map.get("intValue") {
            return match v {
                Value::String(s) => s.trim().parse::<i64>().ok().map(AttrValue::Int),
                Value::Number(n) => n.as_i64().map(AttrValue::Int),
                _ => None,
            };
        }
        if let Some(v) = map.get("doubleValue") {
            return match v {
                Value::Number(n) => n.as_f64().map(AttrValue::Double),
                Value::String(s) => s.trim().parse::<f64>().ok().map(AttrValue::Double),
                _ => None,
            };
        }
        if let Some(v) = map.get("boolValue") {
            return v.as_bool().map(AttrValue::Bool);
        }
        return None;
    }

    match raw {
        Value::String(s) => Some(AttrValue::Str(s.clone())),
        Value::Number(n) => n
            .as_i64()
            .map(AttrValue::Int)
            .or_else(|| n.as_f64().map(AttrValue::Double)),
        Value::Bool(b) => Some(AttrValue::Bool(*b)),
        _ => None,
    }
}

/// Flatten a span's attribute list into a keyed map; undecodable values
/// are dropped (the caller decides whether the key was required)
pub fn flatten_attributes(attributes: &[SpanAttribute]) -> HashMap<String, AttrValue> {
    let mut map = HashMap::with_capacity(attributes.len());
    for attr in attributes {
        if let Some(value) = decode_attr_value(&attr.value) {
            map.insert(attr.key.clone(), value);
        }
    }
    map
}
