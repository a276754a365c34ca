//! Merge capability (spec §4.5, §4.9, §9): joins a job's ready segments,
//! in order, into one playable Ogg/Opus stream, guarded by a per-job lock
//! so concurrent merge requests for the same job don't duplicate work.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;

use crate::cache::SegmentCache;
use crate::codec::AudioCodec;
use crate::fingerprint::merge_fingerprint;
use crate::job::{Job, JobStatus, Segment, SegmentStatus};
use crate::metrics::Metrics;
use crate::store::JobStore;

pub struct Merger {
    store: Arc<dyn JobStore>,
    codec: Arc<dyn AudioCodec>,
    cache_dir: PathBuf,
    segment_cache: Arc<SegmentCache>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    metrics: Option<Arc<Metrics>>,
}

impl Merger {
    /// `segment_cache` must be the same cache instance the worker writes
    /// segment audio into, so the merger reads from the root it actually
    /// wrote to rather than a separately configured path.
    pub fn new(store: Arc<dyn JobStore>, codec: Arc<dyn AudioCodec>, cache_dir: PathBuf, segment_cache: Arc<SegmentCache>) -> Self {
        Self { store, codec, cache_dir, segment_cache, locks: Mutex::new(HashMap::new()), metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn merged_path(&self, merge_key: &str) -> PathBuf {
        self.cache_dir.join("merged").join(format!("{merge_key}.ogg"))
    }

    async fn lock_for(&self, job_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(job_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Merge `job_id`'s ready segments, returning the merged audio bytes
    /// and its merge fingerprint (used as the playlist's `merged` cache
    /// key). Fails if the job isn't in a terminal, non-canceled state or
    /// any segment is missing its cached audio.
    pub async fn merge(&self, job_id: &str) -> Result<(Vec<u8>, String)> {
        let lock = self.lock_for(job_id).await;
        let _guard = match lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                if let Some(metrics) = &self.metrics {
                    metrics.merge_lock_contention.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                }
                lock.lock().await
            }
        };

        let job = self.store.get_job(job_id).await?.context("job not found")?;
        if !matches!(job.status, JobStatus::Complete | JobStatus::CompleteWithErrors) {
            anyhow::bail!("job '{job_id}' is not ready to merge (status {:?})", job.status);
        }

        let segments = self.store.list_segments(job_id).await?;
        let ready: Vec<&Segment> = segments.iter().filter(|s| matches!(s.status, SegmentStatus::Ready)).collect();

        let cache_keys: Vec<String> = segments
            .iter()
            .filter_map(|s| if matches!(s.status, SegmentStatus::Ready) { s.cache_key.clone() } else { None })
            .collect();
        let merge_key = merge_fingerprint(&cache_keys, job.reading_profile.pause_scale);

        if let Ok(existing) = std::fs::read(self.merged_path(&merge_key)) {
            return Ok((existing, merge_key));
        }

        let mut parts = Vec::with_capacity(ready.len());
        for segment in &ready {
            let key = segment.cache_key.as_ref().context("ready segment missing cache_key")?;
            let (bytes, _meta) = self
                .segment_cache
                .read(key)?
                .with_context(|| format!("reading cached segment audio for {key}"))?;
            parts.push(bytes);
        }

        let merged = self.codec.concat_ogg(&parts)?;
        self.write_merged(&merge_key, &merged, &job)?;
        Ok((merged, merge_key))
    }

    fn write_merged(&self, merge_key: &str, data: &[u8], _job: &Job) -> Result<()> {
        let path = self.merged_path(merge_key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ReadingProfile;
    use crate::store::MemoryStore;

    struct FakeCodec;
    impl AudioCodec for FakeCodec {
        fn encode_pcm_to_ogg(&self, _pcm: &[f32], _ms: u32) -> Result<Vec<u8>> {
            Ok(vec![])
        }
        fn concat_ogg(&self, parts: &[Vec<u8>]) -> Result<Vec<u8>> {
            Ok(parts.concat())
        }
    }

    #[tokio::test]
    async fn merge_rejects_unready_job() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
        let job = Job::new("j1".into(), None, "m".into(), "v".into(), ReadingProfile::default(), vec![], false, 1, 0);
        store.put_job(&job).await.unwrap();

        let cache = Arc::new(SegmentCache::new(dir.path().join("segments"), 512));
        let merger = Merger::new(store, Arc::new(FakeCodec), dir.path().to_path_buf(), cache);
        assert!(merger.merge("j1").await.is_err());
    }

    #[tokio::test]
    async fn merge_joins_ready_segments_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(SegmentCache::new(dir.path().join("segments"), 512));
        cache
            .write("aa1", b"AAA", &crate::cache::SegmentMeta { cache_key: "aa1".into(), sample_count: 1, trailing_silence_ms: 0 })
            .unwrap();
        cache
            .write("bb1", b"BBB", &crate::cache::SegmentMeta { cache_key: "bb1".into(), sample_count: 1, trailing_silence_ms: 0 })
            .unwrap();

        let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
        let mut job = Job::new("j1".into(), None, "m".into(), "v".into(), ReadingProfile::default(), vec![], false, 2, 0);
        job.status = JobStatus::Complete;
        store.put_job(&job).await.unwrap();

        let mut seg0 = Segment::new("j1", 0, "a".into());
        seg0.complete("aa1".into());
        let mut seg1 = Segment::new("j1", 1, "b".into());
        seg1.complete("bb1".into());
        store.put_segment(&seg0).await.unwrap();
        store.put_segment(&seg1).await.unwrap();

        let merger = Merger::new(store, Arc::new(FakeCodec), dir.path().to_path_buf(), cache);
        let (merged, _key) = merger.merge("j1").await.unwrap();
        assert_eq!(merged, b"AAABBB");
    }

    #[tokio::test]
    async fn contended_merge_increments_the_metric() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(SegmentCache::new(dir.path().join("segments"), 512));
        let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
        let mut job = Job::new("j1".into(), None, "m".into(), "v".into(), ReadingProfile::default(), vec![], false, 0, 0);
        job.status = JobStatus::Complete;
        store.put_job(&job).await.unwrap();

        let metrics = Arc::new(crate::metrics::Metrics::new());
        let merger =
            Arc::new(Merger::new(store, Arc::new(FakeCodec), dir.path().to_path_buf(), cache).with_metrics(metrics.clone()));

        let held = merger.lock_for("j1").await;
        let guard = held.lock().await;

        let merger2 = merger.clone();
        let handle = tokio::spawn(async move { merger2.merge("j1").await });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        drop(guard);
        handle.await.unwrap().unwrap();

        assert_eq!(metrics.merge_lock_contention.load(std::sync::atomic::Ordering::Relaxed), 1);
    }
}
