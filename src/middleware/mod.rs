//! Admission middleware: the ordered pipeline wrapped around every gated
//! handler. Lock outermost, then auth, then the handler, then usage
//! recording, with the remaining-allowance header stamped on the way out.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::errors::AppError;
use crate::AppState;

/// Primary and fallback auth header names; first one present wins.
pub const AUTH_TOKEN_HEADER: &str = "auth_token";
pub const AUTH_TOKEN_HEADER_ALT: &str = "x-auth-token";
/// Caller-identifying header, observability only.
pub const CALLER_HEADER: &str = "x-caller";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Description label used when a token has no cache entry.
const NOT_IN_CACHE: &str = "[Not in cache!]";

/// Gate one call end to end. The admission mutex is held across the entire
/// check → execute → record sequence, serializing all gated traffic in this
/// process (correctness over throughput; see the gate module).
pub async fn admission(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let _admitted = state.gate.lock().await;
    state.metrics.admission_started();

    let response = match gated_call(&state, req, next).await {
        Ok(response) => response,
        // Store failures after the handler ran cost the client its response;
        // usage accounting is not atomic with response delivery.
        Err(err) => err.into_response(),
    };

    state.metrics.admission_finished();
    response
}

async fn gated_call(state: &AppState, req: Request, next: Next) -> Result<Response, AppError> {
    let endpoint = req.uri().path().to_string();
    let token = auth_token(req.headers());
    let caller = caller_name(req.headers()).unwrap_or_else(|| "None".into());
    let units = call_units(req.headers());

    let Some(token) = token else {
        tracing::info!(caller = %caller, "admission: no authorisation token provided");
        state.metrics.denied("None", &caller);
        return Ok(with_remaining(AppError::NoToken.into_response(), 0));
    };

    let auth_desc = state
        .gate
        .cached_description(&token)
        .unwrap_or_else(|| NOT_IN_CACHE.into());

    if !state.gate.check_and_refresh(&token).await? {
        tracing::info!(
            token = %token,
            caller = %caller,
            "admission: invalid authorisation token or rate limit exceeded"
        );
        state.metrics.denied(&auth_desc, &caller);
        return Ok(with_remaining(
            AppError::InvalidOrExhausted.into_response(),
            state.gate.remaining(&token),
        ));
    }

    // Description may have just been refreshed by the validity check.
    let auth_desc = state
        .gate
        .cached_description(&token)
        .unwrap_or_else(|| NOT_IN_CACHE.into());

    let started = Instant::now();
    let response = next.run(req).await;
    let elapsed = started.elapsed().as_secs_f64();

    let status = response.status();
    state
        .metrics
        .http_response(&auth_desc, &caller, &endpoint, status.as_u16());

    if status.is_success() {
        // Only successful calls are billed; a failed call is free.
        state.gate.record_usage(&token, units, Some(&endpoint)).await?;
        state
            .metrics
            .observe_latency(&auth_desc, &caller, &endpoint, elapsed);
        if let Some((count, _)) = state.gate.cached_counts(&token) {
            state.metrics.set_call_count(&auth_desc, &caller, count);
        }
        tracing::info!(
            token = %token,
            caller = %caller,
            endpoint = %endpoint,
            units,
            "admission: usage recorded"
        );
    }

    Ok(with_remaining(response, state.gate.remaining(&token)))
}

/// An empty header value counts as absent: an empty token is rejected as
/// "no token provided", never as invalid.
pub fn auth_token(headers: &HeaderMap) -> Option<String> {
    [AUTH_TOKEN_HEADER, AUTH_TOKEN_HEADER_ALT]
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|v| v.to_str().ok())
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn caller_name(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CALLER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Call units from the request size: one unit per started 100 bytes of body,
/// minimum 1. Bodyless requests cost a single unit.
pub fn call_units(headers: &HeaderMap) -> i64 {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .map(|len| len / 100 + 1)
        .unwrap_or(1)
}

fn with_remaining(mut response: Response, remaining: i64) -> Response {
    if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
        response
            .headers_mut()
            .insert(RATE_LIMIT_REMAINING_HEADER, value);
    }
    response
}
