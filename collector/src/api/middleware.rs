//! HTTP middleware (rate limiting, 404 handler)
//!
//! Token-bucket rate limiting protects the ingestion endpoint while
//! allowing legitimate bursts. State is in-memory and per-process; a
//! multi-instance deployment would need a shared limiter.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Json;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;

/// Outcome of a rate limit check, including the headers to attach
#[derive(Debug, Clone, PartialEq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_secs: u64,
    pub retry_after_secs: Option<u64>,
}

/// Token bucket rate limiter keyed by client.
///
/// Tokens refill at `rate` per second up to `burst`; each request consumes
/// one token.
pub struct TokenBucketLimiter {
    rate: f64,
    burst: f64,
    buckets: Mutex<HashMap<String, (f64, Instant)>>,
}

impl TokenBucketLimiter {
    pub fn new(rate: f64, burst: u32) -> Self {
        Self {
            rate,
            burst: burst as f64,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Check whether a request from `client_id` may proceed, consuming a
    /// token when it does
    pub fn check(&self, client_id: &str) -> RateDecision {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        let (tokens, last_update) = buckets
            .get(client_id)
            .copied()
            .unwrap_or((self.burst, now));

        let elapsed = now.duration_since(last_update).as_secs_f64();
        let tokens = (tokens + elapsed * self.rate).min(self.burst);

        let limit = self.burst as u32;
        let reset_secs = ((self.burst - tokens) / self.rate).ceil() as u64;

        if tokens >= 1.0 {
            buckets.insert(client_id.to_string(), (tokens - 1.0, now));
            RateDecision {
                allowed: true,
                limit,
                remaining: (tokens - 1.0) as u32,
                reset_secs,
                retry_after_secs: None,
            }
        } else {
            buckets.insert(client_id.to_string(), (tokens, now));
            let retry_after = ((1.0 - tokens) / self.rate).ceil() as u64 + 1;
            RateDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_secs,
                retry_after_secs: Some(retry_after),
            }
        }
    }

    /// Remove client buckets idle for longer than `max_age`. Returns the
    /// number removed.
    pub fn cleanup_stale(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        buckets.retain(|_, (_, last_update)| now.duration_since(*last_update) <= max_age);
        before - buckets.len()
    }
}

/// Rate limit middleware state
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<TokenBucketLimiter>,
    pub enabled: bool,
}

/// Apply token-bucket rate limiting to the wrapped routes
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.enabled {
        return next.run(request).await;
    }

    let client_id = client_key(&request);
    let decision = state.limiter.check(&client_id);

    if decision.allowed {
        let mut response = next.run(request).await;
        append_rate_headers(response.headers_mut(), &decision);
        response
    } else {
        tracing::warn!(client = %client_id, "Rate limit exceeded");
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": "rate_limited",
                "message": "Rate limit exceeded. Please reduce request frequency."
            })),
        )
            .into_response();
        append_rate_headers(response.headers_mut(), &decision);
        if let Some(retry_after) = decision.retry_after_secs
            && let Ok(value) = HeaderValue::from_str(&retry_after.to_string())
        {
            response
                .headers_mut()
                .insert(HeaderName::from_static("retry-after"), value);
        }
        response
    }
}

/// Client identity: first X-Forwarded-For entry when present (reverse
/// proxy setups), else the peer address
fn client_key(request: &Request) -> String {
    if let Some(forwarded) = request.headers().get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first) = value.split(',').next()
    {
        let first = first.trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn append_rate_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    let pairs = [
        ("x-ratelimit-limit", decision.limit.to_string()),
        ("x-ratelimit-remaining", decision.remaining.to_string()),
        ("x-ratelimit-reset", decision.reset_secs.to_string()),
    ];
    for (name, value) in pairs {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
}

/// Fallback for unmatched routes
pub async fn handle_404() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": "not_found",
            "message": "Route not found"
        })),
    )
        .into_response()
}
