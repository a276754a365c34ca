//! Job lifecycle endpoints (spec §4.5, §4.6, §6): submit, inspect, cancel,
//! and fetch per-segment, playlist, or merged audio.

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::chunk::ReadingProfile;
use crate::error::{AppError, AppResult};
use crate::job::{Job, JobStatus, SegmentStatus};
use crate::scheduler::JobRequest;

use super::AppState;

#[derive(Deserialize)]
pub struct CreateJobRequest {
    pub text: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_voice_id")]
    pub voice_id: String,
    #[serde(default)]
    pub reading_profile: ReadingProfile,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub prefer_phonemes: bool,
}

fn default_model_id() -> String {
    "kitten-tts-mini-0.8".to_string()
}

fn default_voice_id() -> String {
    "Jasper".to_string()
}

#[derive(Serialize)]
pub struct JobView {
    pub id: String,
    pub status: crate::job::JobStatus,
    pub segment_count: usize,
    pub prefer_phonemes: bool,
    pub segments: Vec<SegmentView>,
}

#[derive(Serialize)]
pub struct SegmentErrorView {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct SegmentView {
    pub index: usize,
    pub status: SegmentStatus,
    pub retries: u32,
    pub error: Option<SegmentErrorView>,
    pub resolved_phonemes: Option<String>,
    pub used_phonemes: bool,
    pub resolve_source_counts: std::collections::HashMap<String, u32>,
}

impl JobView {
    fn from(job: Job, segments: Vec<crate::job::Segment>) -> Self {
        Self {
            id: job.id,
            status: job.status,
            segment_count: job.segment_count,
            prefer_phonemes: job.prefer_phonemes,
            segments: segments
                .into_iter()
                .map(|s| SegmentView {
                    index: s.index,
                    status: s.status,
                    retries: s.retries,
                    error: s.error.map(|e| SegmentErrorView { code: e.code, message: e.message }),
                    resolved_phonemes: s.resolved_phonemes,
                    used_phonemes: s.used_phonemes,
                    resolve_source_counts: s.resolve_source_counts,
                })
                .collect(),
        }
    }
}

pub async fn create(State(state): State<AppState>, Json(req): Json<CreateJobRequest>) -> AppResult<Json<JobView>> {
    let job_id = uuid::Uuid::new_v4().to_string();
    let job = state
        .scheduler
        .submit(
            JobRequest {
                text: req.text,
                model_id: req.model_id,
                voice_id: req.voice_id,
                reading_profile: req.reading_profile,
                idempotency_key: req.idempotency_key,
                prefer_phonemes: req.prefer_phonemes,
            },
            job_id,
        )
        .await?;
    let segments = state.store.list_segments(&job.id).await.map_err(AppError::Internal)?;
    Ok(Json(JobView::from(job, segments)))
}

pub async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<JobView>> {
    let job = state
        .store
        .get_job(&id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::JobNotFound(id.clone()))?;
    let segments = state.store.list_segments(&id).await.map_err(AppError::Internal)?;
    Ok(Json(JobView::from(job, segments)))
}

pub async fn cancel(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<StatusCode> {
    state.scheduler.cancel(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct PlaylistEntry {
    pub segment_id: String,
    pub index: usize,
    pub status: SegmentStatus,
    pub url_proxy: String,
    pub url_backend: String,
    pub url_best: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct PlaylistResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub entries: Vec<PlaylistEntry>,
}

/// Ordered segment entries for reader playback (spec §4.5): non-ready
/// entries carry a `retry_after_ms` hint so clients don't poll faster than
/// the service can usefully answer.
pub async fn get_playlist(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<PlaylistResponse>> {
    let job = state
        .store
        .get_job(&id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::JobNotFound(id.clone()))?;
    let segments = state.store.list_segments(&id).await.map_err(AppError::Internal)?;

    let entries = segments
        .into_iter()
        .map(|s| {
            let url_proxy = format!("/v1/tts/jobs/{id}/segments/{}", s.index);
            let ready = matches!(s.status, SegmentStatus::Ready);
            PlaylistEntry {
                segment_id: format!("{id}:{}", s.index),
                index: s.index,
                status: s.status,
                url_backend: url_proxy.clone(),
                url_best: ready.then(|| url_proxy.clone()),
                url_proxy,
                retry_after_ms: (!ready).then_some(1000),
            }
        })
        .collect();

    Ok(Json(PlaylistResponse { job_id: id, status: job.status, entries }))
}

/// `audio/ogg` response headers shared by segment and merged-audio
/// retrieval, with `Range` support for scrubbing (spec §4.5 playback
/// contract).
fn serve_audio(headers: &HeaderMap, audio: Vec<u8>, filename: &str) -> AppResult<Response> {
    let total = audio.len() as u64;
    let disposition = format!("inline; filename=\"{filename}\"");

    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok()).and_then(parse_range);

    let (status, body, content_range) = match range {
        Some((start, end)) if start < total => {
            let end = end.min(total.saturating_sub(1));
            let slice = audio[start as usize..=end as usize].to_vec();
            (StatusCode::PARTIAL_CONTENT, slice, Some(format!("bytes {start}-{end}/{total}")))
        }
        Some(_) => {
            return Ok((
                StatusCode::RANGE_NOT_SATISFIABLE,
                [(header::CONTENT_RANGE, format!("bytes */{total}"))],
            )
                .into_response());
        }
        None => (StatusCode::OK, audio, None),
    };

    let mut response = (
        status,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("audio/ogg")),
            (header::ACCEPT_RANGES, HeaderValue::from_static("bytes")),
            (header::CONTENT_LENGTH, HeaderValue::from_str(&body.len().to_string()).unwrap()),
            (header::CONTENT_DISPOSITION, HeaderValue::from_str(&disposition).unwrap()),
        ],
        body,
    )
        .into_response();

    if let Some(range) = content_range {
        response.headers_mut().insert(header::CONTENT_RANGE, HeaderValue::from_str(&range).unwrap());
    }
    Ok(response)
}

/// Parse a single-range `bytes=start-end` header (the only form reader
/// clients send for scrubbing); multi-range requests fall back to a full
/// response by returning `None`.
fn parse_range(raw: &str) -> Option<(u64, u64)> {
    let spec = raw.strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None;
    }
    let (start, end) = spec.split_once('-')?;
    let start: u64 = start.parse().ok()?;
    let end: u64 = if end.is_empty() { u64::MAX } else { end.parse().ok()? };
    Some((start, end))
}

pub async fn get_segment_audio(
    State(state): State<AppState>,
    Path((job_id, index)): Path<(String, usize)>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let segment = state
        .store
        .get_segment(&job_id, index)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::SegmentNotFound(format!("{job_id}/{index}")))?;

    if !matches!(segment.status, SegmentStatus::Ready) {
        return Err(AppError::SegmentNotFound(format!("{job_id}/{index} not ready")));
    }
    let key = segment.cache_key.ok_or_else(|| AppError::SegmentNotFound(format!("{job_id}/{index}")))?;
    let (audio, _meta) = state
        .cache
        .read(&key)
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::SegmentNotFound(format!("{job_id}/{index} evicted from cache")))?;

    serve_audio(&headers, audio, &format!("job_{job_id}_segment_{index}.ogg"))
}

#[derive(Serialize)]
pub struct MergeProgress {
    pub status: JobStatus,
    pub progress_pct: u8,
}

pub async fn get_merged_audio(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let job = state
        .store
        .get_job(&id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::JobNotFound(id.clone()))?;

    if !matches!(job.status, JobStatus::Complete | JobStatus::CompleteWithErrors) {
        let segments = state.store.list_segments(&id).await.map_err(AppError::Internal)?;
        let ready = segments.iter().filter(|s| matches!(s.status, SegmentStatus::Ready)).count();
        let pct = if segments.is_empty() { 0 } else { (ready * 100 / segments.len()) as u8 };
        return Ok((
            StatusCode::ACCEPTED,
            [(header::RETRY_AFTER, HeaderValue::from_static("1"))],
            Json(MergeProgress { status: job.status, progress_pct: pct }),
        )
            .into_response());
    }

    let (audio, _key) = state.merger.merge(&id).await.map_err(AppError::Internal)?;
    serve_audio(&headers, audio, &format!("job_{id}.ogg"))
}
