//! Dictionary management endpoints (spec §4.2, §6): list packs, bulk
//! upload entries, promote an auto-learned entry into a target pack.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

use super::AppState;

#[derive(Serialize)]
pub struct PackSummary {
    pub name: String,
    pub version: String,
    pub entry_count: usize,
}

#[derive(Serialize)]
pub struct ListResponse {
    pub packs: Vec<PackSummary>,
}

pub async fn list(State(state): State<AppState>) -> AppResult<Json<ListResponse>> {
    let packs = state.dict_store.load_all().map_err(AppError::Internal)?;
    Ok(Json(ListResponse {
        packs: packs
            .into_iter()
            .map(|p| PackSummary { name: p.name, version: p.version, entry_count: p.entries.len() })
            .collect(),
    }))
}

#[derive(Deserialize)]
pub struct UploadRequest {
    pub pack: String,
    pub entries: HashMap<String, String>,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub pack: String,
    pub version: String,
    pub entry_count: usize,
}

pub async fn upload(
    State(state): State<AppState>,
    Json(req): Json<UploadRequest>,
) -> AppResult<Json<UploadResponse>> {
    let pack = state
        .dict_store
        .upload(&req.pack, &req.entries)
        .map_err(AppError::Internal)?;
    Ok(Json(UploadResponse { pack: pack.name, version: pack.version, entry_count: pack.entries.len() }))
}

#[derive(Deserialize)]
pub struct PromoteRequest {
    pub key: String,
    pub target_pack: String,
    #[serde(default)]
    pub overwrite: bool,
}

#[derive(Serialize)]
pub struct PromoteResponse {
    pub pack: String,
    pub version: String,
}

pub async fn promote(
    State(state): State<AppState>,
    Json(req): Json<PromoteRequest>,
) -> AppResult<Json<PromoteResponse>> {
    let pack = state
        .dict_store
        .promote(&req.key, &req.target_pack, req.overwrite)
        .map_err(AppError::Internal)?;
    Ok(Json(PromoteResponse { pack: pack.name, version: pack.version }))
}

#[derive(Serialize)]
pub struct CompileResponse {
    pub version: String,
    pub entry_count: usize,
}

/// Flatten every pack into one priority-resolved snapshot under
/// `compiled_dir`, for offline/CDN distribution of the full dictionary.
pub async fn compile(State(state): State<AppState>) -> AppResult<Json<CompileResponse>> {
    let compiled = state
        .dict_store
        .compile(&state.config.compiled_dir)
        .map_err(AppError::Internal)?;
    Ok(Json(CompileResponse { version: compiled.version, entry_count: compiled.entries.len() }))
}

#[derive(Deserialize)]
pub struct LookupQuery {
    pub key: String,
}

#[derive(Serialize)]
pub struct LookupResponse {
    pub key: String,
    pub phonemes: String,
    pub source_pack: String,
}

pub async fn lookup(
    State(state): State<AppState>,
    Query(q): Query<LookupQuery>,
) -> AppResult<Json<LookupResponse>> {
    let found = state.dict_store.lookup(&q.key).map_err(AppError::Internal)?;
    match found {
        Some((source_pack, phonemes)) => Ok(Json(LookupResponse { key: q.key, phonemes, source_pack })),
        None => Err(AppError::SegmentNotFound(format!("no dictionary entry for '{}'", q.key))),
    }
}

#[derive(Deserialize)]
pub struct LearnRequest {
    pub key: String,
}

#[derive(Serialize)]
pub struct LearnResponse {
    pub key: String,
    pub phonemes: String,
    pub used_phonemes: bool,
}

/// Resolve `key` through the same pack-stack + fallback pipeline used for
/// job segments, then store the result in `auto_learn` (spec §4.2
/// auto-learn path, exposed here for on-demand learning outside a job).
pub async fn learn(State(state): State<AppState>, Json(req): Json<LearnRequest>) -> AppResult<Json<LearnResponse>> {
    let resolved = state.resolver.resolve(&req.key).map_err(AppError::Internal)?;
    state
        .dict_store
        .upsert("auto_learn", &req.key, &resolved.phonemes)
        .map_err(AppError::Internal)?;
    Ok(Json(LearnResponse { key: req.key, phonemes: resolved.phonemes, used_phonemes: resolved.used_phonemes }))
}

#[derive(Deserialize)]
pub struct OverrideRequest {
    pub pack: String,
    pub key: String,
    pub phonemes: String,
}

#[derive(Serialize)]
pub struct OverrideResponse {
    pub pack: String,
    pub version: String,
}

pub async fn override_entry(
    State(state): State<AppState>,
    Json(req): Json<OverrideRequest>,
) -> AppResult<Json<OverrideResponse>> {
    let pack = state
        .dict_store
        .upsert(&req.pack, &req.key, &req.phonemes)
        .map_err(AppError::Internal)?;
    Ok(Json(OverrideResponse { pack: pack.name, version: pack.version }))
}
