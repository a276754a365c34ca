//! HTTP surface (spec §6): playlist/segment/merged-audio retrieval,
//! dictionary management, and admin/observability endpoints.

mod admin;
mod dicts;
mod jobs;
pub mod middleware;

use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::cache::SegmentCache;
use crate::config::Config;
use crate::dict::DictionaryStore;
use crate::merger::Merger;
use crate::metrics::Metrics;
use crate::resolver::{AutoLearnBuffer, Resolver};
use crate::scheduler::Scheduler;
use crate::store::{JobStore, Queue};

use self::middleware::{rate_limiter, GlobalRateLimiter};

/// Shared application state handed to every handler (spec §6 surface is
/// all served from one process per the `all` role, or split by `api`/
/// `worker` role — either way the HTTP layer only needs these).
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub merger: Arc<Merger>,
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn Queue>,
    pub cache: Arc<SegmentCache>,
    pub dict_store: Arc<DictionaryStore>,
    pub auto_learn: Arc<AutoLearnBuffer>,
    pub resolver: Arc<Resolver>,
    pub metrics: Arc<Metrics>,
    pub config: Config,
    pub rate_limiter: Arc<GlobalRateLimiter>,
}

impl AppState {
    /// Convenience constructor so callers don't build the rate limiter by
    /// hand from `config.rate_limit_per_min`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scheduler: Arc<Scheduler>,
        merger: Arc<Merger>,
        store: Arc<dyn JobStore>,
        queue: Arc<dyn Queue>,
        cache: Arc<SegmentCache>,
        dict_store: Arc<DictionaryStore>,
        auto_learn: Arc<AutoLearnBuffer>,
        resolver: Arc<Resolver>,
        metrics: Arc<Metrics>,
        config: Config,
    ) -> Self {
        let rate_limiter = rate_limiter(config.rate_limit_per_min);
        Self { scheduler, merger, store, queue, cache, dict_store, auto_learn, resolver, metrics, config, rate_limiter }
    }
}

pub fn router(state: AppState) -> Router {
    // `/health` stays open and unthrottled so orchestrators can probe
    // liveness without an api key or tripping the rate limiter.
    let health = Router::new().route("/health", get(admin::health));

    let guarded = Router::new()
        .route("/v1/models", get(admin::models))
        .route("/v1/metrics", get(admin::metrics))
        .route("/v1/admin/status", get(admin::status))
        .route("/v1/dicts", get(dicts::list))
        .route("/v1/dicts/upload", post(dicts::upload))
        .route("/v1/dicts/promote", post(dicts::promote))
        .route("/v1/dicts/compile", post(dicts::compile))
        .route("/v1/dicts/lookup", get(dicts::lookup))
        .route("/v1/dicts/learn", post(dicts::learn))
        .route("/v1/dicts/override", post(dicts::override_entry))
        .route("/v1/tts/jobs", post(jobs::create))
        .route("/v1/tts/jobs/{id}", get(jobs::get_job))
        .route("/v1/tts/jobs/{id}/cancel", post(jobs::cancel))
        .route("/v1/tts/jobs/{id}/playlist.json", get(jobs::get_playlist))
        .route("/v1/tts/jobs/{id}/segments/{index}", get(jobs::get_segment_audio))
        .route("/v1/tts/jobs/{id}/audio.ogg", get(jobs::get_merged_audio))
        .layer(from_fn_with_state(state.clone(), middleware::require_api_key))
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit));

    health
        .merge(guarded)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
