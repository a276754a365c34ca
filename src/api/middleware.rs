//! Admission-edge middleware (spec §6): api key auth and a global
//! `rate_limit_per_min` cap, ahead of the scheduler's own capacity and
//! worker-liveness checks.

use std::num::NonZeroU32;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};

use crate::error::AppError;

use super::AppState;

pub type GlobalRateLimiter = DefaultDirectRateLimiter;

pub fn rate_limiter(per_minute: u32) -> Arc<GlobalRateLimiter> {
    let quota = NonZeroU32::new(per_minute.max(1))
        .map(Quota::per_minute)
        .expect("per_minute clamped to at least 1");
    Arc::new(RateLimiter::direct(quota))
}

/// Reject requests once the process-wide `rate_limit_per_min` budget is
/// exhausted. A no-op layer would be simpler to skip, but keeping a single
/// limiter in `AppState` means the limit holds even with `api_key` unset.
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    if state.rate_limiter.check().is_err() {
        return Err(AppError::RateLimited);
    }
    Ok(next.run(request).await)
}

/// Reject requests missing `Authorization: Bearer <api_key>` when
/// `config.api_key` is set. No-op when unset (local/dev deployments).
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = &state.config.api_key else {
        return Ok(next.run(request).await);
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if presented != Some(expected.as_str()) {
        return Err(AppError::Unauthorized);
    }
    Ok(next.run(request).await)
}
