//! Error taxonomy (spec §7) → HTTP status + JSON body.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use thiserror::Error;

/// Top-level API error. Each variant corresponds to one row of spec §7's
/// taxonomy table for admission-time failures; per-segment failures are
/// recorded on the segment (`job::SegmentError`) rather than raised here.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid request: {0}")]
    InvalidText(String),

    #[error("text too large: {0}")]
    TooLarge(String),

    #[error("rate limited")]
    RateLimited,

    #[error("too many active jobs")]
    Capacity,

    #[error("model not allowed: {0}")]
    ModelDisallowed(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("segment not found: {0}")]
    SegmentNotFound(String),

    #[error("merge lock timeout")]
    MergeLockTimeout,

    #[error("no workers available")]
    NoWorkers,

    #[error("missing or invalid api key")]
    Unauthorized,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::InvalidText(_) => "admission.invalid_text",
            AppError::TooLarge(_) => "admission.too_large",
            AppError::RateLimited => "admission.rate_limited",
            AppError::Capacity => "admission.capacity",
            AppError::ModelDisallowed(_) => "admission.model_disallowed",
            AppError::JobNotFound(_) => "job.not_found",
            AppError::SegmentNotFound(_) => "segment.not_found",
            AppError::MergeLockTimeout => "merge.lock_timeout",
            AppError::NoWorkers => "admission.no_workers",
            AppError::Unauthorized => "auth.unauthorized",
            AppError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidText(_) => StatusCode::BAD_REQUEST,
            AppError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RateLimited | AppError::Capacity => StatusCode::TOO_MANY_REQUESTS,
            AppError::ModelDisallowed(_) => StatusCode::BAD_REQUEST,
            AppError::JobNotFound(_) | AppError::SegmentNotFound(_) => StatusCode::NOT_FOUND,
            AppError::MergeLockTimeout => StatusCode::SERVICE_UNAVAILABLE,
            AppError::NoWorkers => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        if matches!(self, AppError::Internal(_)) {
            tracing::error!(error = %self, "internal error");
        }
        let body = ErrorBody { error: self.to_string(), code: self.code() };
        (self.status(), Json(body)).into_response()
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;
