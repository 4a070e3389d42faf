//! Rate limiting middleware
//!
//! Checks every request against one operation class before it reaches the
//! handler. Callers are keyed by client IP as reported by the fronting proxy.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::{self as axum_middleware, Next},
    response::{IntoResponse, Response},
    Json, Router,
};
use std::sync::Arc;
use switchboard_control::{OperationClass, RateLimitDecision, SlidingWindowLimiter};
use tracing::error;

use crate::models::{ErrorResponse, RateLimitedResponse};

const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Limiter and operation class applied by one middleware instance
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: SlidingWindowLimiter,
    pub class: OperationClass,
}

/// Caller key for a request
///
/// First entry of `X-Forwarded-For`, else `X-Real-IP`, else `"unknown"`. All
/// callers without either header share one bucket.
pub fn client_identifier(headers: &HeaderMap) -> String {
    if let Some(forwarded_for) = headers.get("x-forwarded-for") {
        if let Ok(value) = forwarded_for.to_str() {
            // First entry is the original client
            if let Some(first) = value.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return first.to_string();
                }
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(value) = real_ip.to_str() {
            let value = value.trim();
            if !value.is_empty() {
                return value.to_string();
            }
        }
    }

    "unknown".to_string()
}

/// Why a request was turned away
#[derive(Debug)]
pub enum RateLimitRejection {
    Exceeded(RateLimitDecision),
    /// The limiter could not reach its store; requests fail closed
    Unavailable(String),
}

impl IntoResponse for RateLimitRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Exceeded(decision) => {
                let body = RateLimitedResponse {
                    error: "Too many requests".to_string(),
                    retry_after: decision.reset_in,
                };

                let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
                let headers = response.headers_mut();
                headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
                headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
                headers.insert(X_RATELIMIT_RESET, HeaderValue::from(decision.reset_in));
                headers.insert(header::RETRY_AFTER, HeaderValue::from(decision.reset_in));
                response
            }
            Self::Unavailable(reason) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Rate limiter unavailable: {}", reason),
                    code: Some("RATE_LIMIT_UNAVAILABLE".to_string()),
                }),
            )
                .into_response(),
        }
    }
}

/// Middleware enforcing the class in `state` on every request
pub async fn enforce_rate_limit(
    State(state): State<Arc<RateLimitState>>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitRejection> {
    let caller = client_identifier(request.headers());

    let decision = state
        .limiter
        .check(state.class, &caller)
        .await
        .map_err(|e| {
            error!(class = %state.class, "Rate limit check failed: {}", e);
            RateLimitRejection::Unavailable(e.to_string())
        })?;

    if !decision.allowed {
        return Err(RateLimitRejection::Exceeded(decision));
    }

    Ok(next.run(request).await)
}

/// Wrap every route of `router` with the limit of `class`
pub fn rate_limited<S>(
    router: Router<S>,
    limiter: SlidingWindowLimiter,
    class: OperationClass,
) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let state = Arc::new(RateLimitState { limiter, class });
    router.layer(axum_middleware::from_fn_with_state(
        state,
        enforce_rate_limit,
    ))
}
