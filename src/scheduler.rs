//! Admission scheduler (spec §4.5): validates and chunks incoming text,
//! applies backpressure/capacity limits, and is idempotency-key aware so a
//! retried submission returns the original job instead of duplicating work.

use std::sync::Arc;

use anyhow::Result;

use crate::cache::SegmentCache;
use crate::chunk::{chunk_text, ChunkConfig, ReadingProfile};
use crate::config::Config;
use crate::dict::DictionaryStore;
use crate::error::{AppError, AppResult};
use crate::fingerprint::{cache_key, FingerprintInputs};
use crate::job::{Job, Segment, SegmentStatus};
use crate::metrics::Metrics;
use crate::store::{JobStore, Queue, WorkItem};

pub struct JobRequest {
    pub text: String,
    pub model_id: String,
    pub voice_id: String,
    pub reading_profile: ReadingProfile,
    pub idempotency_key: Option<String>,
    pub prefer_phonemes: bool,
}

pub struct Scheduler {
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn Queue>,
    pub dict_store: Arc<DictionaryStore>,
    pub cache: Arc<SegmentCache>,
    pub config: Config,
    pub metrics: Arc<Metrics>,
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl Scheduler {
    /// Admit a job request, or return the existing job if `idempotency_key`
    /// matches a prior admission (spec §4.5).
    pub async fn submit(&self, req: JobRequest, job_id: String) -> AppResult<Job> {
        if let Some(key) = &req.idempotency_key {
            if let Some(existing) = self.store.find_by_idempotency_key(key).await.map_err(AppError::Internal)? {
                return Ok(existing);
            }
        }

        if req.text.trim().is_empty() {
            return Err(AppError::InvalidText("text must not be empty".to_string()));
        }
        if req.text.chars().count() > self.config.max_text_chars {
            return Err(AppError::TooLarge(format!(
                "text exceeds max_text_chars ({} > {})",
                req.text.chars().count(),
                self.config.max_text_chars
            )));
        }
        if !self.config.model_allowlist.iter().any(|m| m == &req.model_id) {
            return Err(AppError::ModelDisallowed(req.model_id.clone()));
        }

        if self.config.require_workers {
            let alive = self
                .store
                .active_worker_count(now_unix(), self.config.segment_stale_seconds as i64)
                .await
                .map_err(AppError::Internal)?;
            if alive == 0 {
                return Err(AppError::NoWorkers);
            }
        }

        let active = self.store.active_job_count().await.map_err(AppError::Internal)?;
        if active >= self.config.max_active_jobs {
            self.metrics.jobs_rejected.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return Err(AppError::Capacity);
        }

        let cfg = ChunkConfig {
            target_chars: self.config.chunk_target_chars,
            max_chars: self.config.chunk_max_chars,
            min_segment_chars: self.config.min_segment_chars,
        };
        let profile = req.reading_profile.clamped();
        let normalized = crate::normalize::normalize(&req.text, &profile);
        let segment_texts = chunk_text(&normalized, &cfg);
        if segment_texts.len() > self.config.max_segments {
            return Err(AppError::TooLarge(format!(
                "text chunks into {} segments, exceeding max_segments ({})",
                segment_texts.len(),
                self.config.max_segments
            )));
        }

        let packs = self.dict_store.load_all().map_err(AppError::Internal)?;
        let pack_versions: Vec<(String, String)> = packs.iter().map(|p| (p.name.clone(), p.version.clone())).collect();

        self.metrics.record_model_usage(&req.model_id);

        let job = Job::new(
            job_id.clone(),
            req.idempotency_key,
            req.model_id.clone(),
            req.voice_id.clone(),
            profile.clone(),
            pack_versions.clone(),
            req.prefer_phonemes,
            segment_texts.len(),
            now_unix(),
        );
        self.store.put_job(&job).await.map_err(AppError::Internal)?;

        // Cache-check at admission (spec §4.5 fast path): a segment whose
        // audio is already cached from a prior identical request is marked
        // `Ready` immediately instead of waiting for a worker claim.
        for (index, text) in segment_texts.into_iter().enumerate() {
            let mut segment = Segment::new(&job_id, index, text);
            let key = cache_key(&FingerprintInputs {
                normalized_text: &segment.text,
                model_id: &job.model_id,
                voice_id: &job.voice_id,
                pack_versions: &pack_versions,
                reading_profile: &profile,
                compiler_version: &self.config.compiler_version,
                phoneme_mode: &self.config.phoneme_mode,
            });

            if self.cache.contains(&key) {
                segment.status = SegmentStatus::Ready;
                segment.cache_key = Some(key);
                self.store.put_segment(&segment).await.map_err(AppError::Internal)?;
            } else {
                self.store.put_segment(&segment).await.map_err(AppError::Internal)?;
                self.queue
                    .push(WorkItem { job_id: job_id.clone(), segment_index: index })
                    .await
                    .map_err(AppError::Internal)?;
            }
        }

        self.metrics.jobs_admitted.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        let segments = self.store.list_segments(&job_id).await.map_err(AppError::Internal)?;
        let mut job = job;
        job.derive_status(&segments, now_unix());
        self.store.put_job(&job).await.map_err(AppError::Internal)?;
        Ok(job)
    }

    pub async fn cancel(&self, job_id: &str) -> AppResult<()> {
        let mut job = self
            .store
            .get_job(job_id)
            .await
            .map_err(AppError::Internal)?
            .ok_or_else(|| AppError::JobNotFound(job_id.to_string()))?;
        job.cancel(now_unix());
        self.store.put_job(&job).await.map_err(AppError::Internal)?;

        for mut segment in self.store.list_segments(job_id).await.map_err(AppError::Internal)? {
            segment.cancel();
            self.store.put_segment(&segment).await.map_err(AppError::Internal)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn scheduler_with(dict_dir: std::path::PathBuf, config: Config) -> Scheduler {
        Scheduler {
            store: Arc::new(MemoryStore::new()),
            queue: Arc::new(MemoryStore::new()),
            dict_store: Arc::new(DictionaryStore::new(dict_dir)),
            cache: Arc::new(SegmentCache::new(std::env::temp_dir().join("pxtts-test-cache"), 512)),
            config,
            metrics: Arc::new(Metrics::new()),
        }
    }

    fn req(text: &str) -> JobRequest {
        JobRequest {
            text: text.to_string(),
            model_id: "kitten-tts-mini-0.8".to_string(),
            voice_id: "Jasper".to_string(),
            reading_profile: ReadingProfile::default(),
            idempotency_key: None,
            prefer_phonemes: false,
        }
    }

    #[tokio::test]
    async fn rejects_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler_with(dir.path().to_path_buf(), Config::default());
        let err = scheduler.submit(req("   "), "j1".into()).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidText(_)));
    }

    #[tokio::test]
    async fn rejects_model_outside_allowlist() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler_with(dir.path().to_path_buf(), Config::default());
        let mut r = req("Hello world.");
        r.model_id = "unknown-model".to_string();
        let err = scheduler.submit(r, "j1".into()).await.unwrap_err();
        assert!(matches!(err, AppError::ModelDisallowed(_)));
    }

    #[tokio::test]
    async fn idempotency_key_returns_existing_job() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler_with(dir.path().to_path_buf(), Config::default());
        let mut r = req("Gojo meets Sukuna.");
        r.idempotency_key = Some("idem-1".to_string());
        let first = scheduler.submit(r, "j1".into()).await.unwrap();

        let mut r2 = req("different text entirely");
        r2.idempotency_key = Some("idem-1".to_string());
        let second = scheduler.submit(r2, "j2".into()).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn capacity_limit_rejects_when_active_jobs_at_max() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.max_active_jobs = 1;
        let scheduler = scheduler_with(dir.path().to_path_buf(), cfg);
        scheduler.submit(req("First job here."), "j1".into()).await.unwrap();
        let err = scheduler.submit(req("Second job here."), "j2".into()).await.unwrap_err();
        assert!(matches!(err, AppError::Capacity));
    }

    #[tokio::test]
    async fn require_workers_rejects_admission_with_no_live_worker() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.require_workers = true;
        let scheduler = scheduler_with(dir.path().to_path_buf(), cfg);
        let err = scheduler.submit(req("Hello world."), "j1".into()).await.unwrap_err();
        assert!(matches!(err, AppError::NoWorkers));
    }

    #[tokio::test]
    async fn require_workers_admits_once_a_worker_has_heartbeat() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.require_workers = true;
        let scheduler = scheduler_with(dir.path().to_path_buf(), cfg);
        scheduler.store.heartbeat_worker("w1", now_unix()).await.unwrap();
        scheduler.submit(req("Hello world."), "j1".into()).await.unwrap();
    }

    #[tokio::test]
    async fn cancel_marks_job_and_segments_canceled() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = scheduler_with(dir.path().to_path_buf(), Config::default());
        let job = scheduler.submit(req("Gojo meets Sukuna."), "j1".into()).await.unwrap();
        scheduler.cancel(&job.id).await.unwrap();
        let updated = scheduler.store.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(updated.status, crate::job::JobStatus::Canceled);
    }
}
