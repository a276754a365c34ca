//! Health, model listing, and observability endpoints (spec §6).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use super::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Serialize)]
pub struct ModelsResponse {
    pub models: Vec<String>,
    pub default: String,
}

pub async fn models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.config.model_allowlist.clone(),
        default: state.config.model_id.clone(),
    })
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics.render_prometheus(),
    )
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub role: &'static str,
    pub metrics: crate::metrics::MetricsSnapshot,
    pub active_jobs: usize,
    pub workers_online: usize,
    pub queue_len: usize,
    pub retry_counts: u64,
    pub fallback_model_usage: std::collections::HashMap<String, u64>,
    pub merge_lock_contention: u64,
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    use crate::config::Role;
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    let active_jobs = state.store.active_job_count().await.unwrap_or(0);
    let workers_online = state
        .store
        .active_worker_count(now, state.config.segment_stale_seconds as i64)
        .await
        .unwrap_or(0);
    let queue_len = state.queue.queue_len().await.unwrap_or(0);
    let retry_counts = state.store.active_retry_count().await.unwrap_or(0);

    Json(StatusResponse {
        role: match state.config.role {
            Role::All => "all",
            Role::Api => "api",
            Role::Worker => "worker",
        },
        merge_lock_contention: state.metrics.merge_lock_contention.load(std::sync::atomic::Ordering::Relaxed),
        fallback_model_usage: state.metrics.model_usage_snapshot(),
        metrics: state.metrics.snapshot(),
        active_jobs,
        workers_online,
        queue_len,
        retry_counts,
    })
}
