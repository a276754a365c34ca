//! Worker role (spec §4.4, §4.6, §5): claims queued segments, resolves
//! pronunciation, synthesizes, encodes, and commits results; periodically
//! reclaims stale claims.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::cache::{SegmentCache, SegmentMeta};
use crate::codec::{base_pause_ms, AudioCodec};
use crate::config::Config;
use crate::fingerprint::{cache_key, FingerprintInputs};
use crate::job::{Job, SegmentStatus};
use crate::metrics::Metrics;
use crate::resolver::{Resolver, ResolveOutput};
use crate::store::{JobStore, Queue, WorkItem};
use crate::synth::Synthesizer;

pub struct Worker {
    pub id: String,
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn Queue>,
    pub resolver: Arc<Resolver>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub codec: Arc<dyn AudioCodec>,
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

impl Worker {
    /// Process a single claimed item end to end (spec §4.6 segment
    /// transitions: `InProgress` → `Ready` or `Queued`/`Error`).
    pub async fn process_item(&self, item: WorkItem) -> Result<()> {
        let Some(mut segment) = self.store.get_segment(&item.job_id, item.segment_index).await? else {
            return Ok(());
        };
        let Some(job) = self.store.get_job(&item.job_id).await? else { return Ok(()) };

        if matches!(segment.status, SegmentStatus::Canceled) {
            return Ok(());
        }

        segment.claim(&self.id, now_unix());
        self.store.put_segment(&segment).await?;

        match self.synthesize_segment(&job, &segment.text).await {
            Ok((audio, key, resolved)) => {
                segment.complete(key);
                segment.resolved_phonemes = Some(resolved.phonemes);
                segment.used_phonemes = resolved.used_phonemes;
                segment.resolve_source_counts = resolved.resolve_source_counts;
                self.store.put_segment(&segment).await?;
                let _ = audio;
            }
            Err(e) => {
                self.metrics.segments_failed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                let terminal = segment.fail("synth.failed", &e.to_string(), self.config.segment_max_retries);
                self.store.put_segment(&segment).await?;
                if !terminal {
                    self.queue.push(WorkItem { job_id: item.job_id.clone(), segment_index: item.segment_index }).await?;
                }
            }
        }

        self.refresh_job_status(&item.job_id).await?;
        Ok(())
    }

    async fn synthesize_segment(&self, job: &Job, text: &str) -> Result<(Vec<u8>, String, ResolveOutput)> {
        let resolved = self.resolver.resolve(text)?;
        if resolved.resolve_source_counts.contains_key("fallback") {
            self.metrics.resolver_fallback_count.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }

        let key = cache_key(&FingerprintInputs {
            normalized_text: text,
            model_id: &job.model_id,
            voice_id: &job.voice_id,
            pack_versions: &job.pack_versions,
            reading_profile: &job.reading_profile,
            compiler_version: &self.config.compiler_version,
            phoneme_mode: &self.config.phoneme_mode,
        });

        if let Some((audio, _meta)) = self.cache.read(&key)? {
            self.metrics.segments_cache_hit.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return Ok((audio, key, resolved));
        }

        // `prefer_phonemes` routes resolved phonemes into the synthesizer;
        // otherwise the model synthesizes from the segment's own text.
        let synth_input = if job.prefer_phonemes { resolved.phonemes.as_str() } else { text };
        let pcm = self.synthesizer.synthesize(synth_input, &job.model_id, &job.voice_id, job.reading_profile.rate)?;
        let pause_ms = (base_pause_ms(text.trim_end().chars().last()) as f32
            * job.reading_profile.pause_scale) as u32;
        let audio = self.codec.encode_pcm_to_ogg(&pcm, pause_ms)?;

        self.cache.write(
            &key,
            &audio,
            &SegmentMeta { cache_key: key.clone(), sample_count: pcm.len(), trailing_silence_ms: pause_ms },
        )?;
        self.metrics.segments_synthesized.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Ok((audio, key, resolved))
    }

    async fn refresh_job_status(&self, job_id: &str) -> Result<()> {
        let Some(mut job) = self.store.get_job(job_id).await? else { return Ok(()) };
        let segments = self.store.list_segments(job_id).await?;
        job.derive_status(&segments, now_unix());
        self.store.put_job(&job).await?;
        Ok(())
    }

    /// Run `config.workers` concurrent claim loops sharing this `Worker`'s
    /// resolver/synthesizer/cache (spec §4.4: "within a worker, segment
    /// work may also fan out to a thread pool of size `workers`"). Each
    /// lane heartbeats under its own id so `active_worker_count` reflects
    /// real claim concurrency.
    pub async fn run_pool(self: Arc<Self>, shutdown: tokio::sync::watch::Receiver<bool>) {
        let lanes = self.config.workers.max(1);
        let mut handles = Vec::with_capacity(lanes);
        for lane in 0..lanes {
            let worker = self.clone();
            let shutdown = shutdown.clone();
            let lane_id = if lanes == 1 { self.id.clone() } else { format!("{}-{lane}", self.id) };
            handles.push(tokio::spawn(worker.run(lane_id, shutdown)));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// A single claim/process/sleep loop; periodically reclaims stale
    /// claims (spec §4.4).
    async fn run(self: Arc<Self>, lane_id: String, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut since_reclaim = tokio::time::Instant::now();
        loop {
            if *shutdown.borrow() {
                return;
            }

            if since_reclaim.elapsed() > Duration::from_secs(30) {
                if let Err(e) = self.queue.reclaim_stale(now_unix(), self.config.segment_stale_seconds as i64).await {
                    tracing::warn!(error = %e, "stale-claim reclaim failed");
                }
                since_reclaim = tokio::time::Instant::now();
            }

            if let Err(e) = self.store.heartbeat_worker(&lane_id, now_unix()).await {
                tracing::warn!(error = %e, "worker heartbeat failed");
            }

            let claimed = self
                .queue
                .claim_next(&lane_id, now_unix(), self.config.max_concurrent_segments)
                .await;
            match claimed {
                Ok(Some(item)) => {
                    if let Err(e) = self.process_item(item).await {
                        tracing::error!(error = %e, "segment processing failed");
                    }
                }
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(200)) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "queue claim failed");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ReadingProfile;
    use crate::dict::Pack;
    use crate::store::MemoryStore;
    use std::collections::HashMap;

    struct FakeCodec;
    impl AudioCodec for FakeCodec {
        fn encode_pcm_to_ogg(&self, pcm: &[f32], _silence_ms: u32) -> Result<Vec<u8>> {
            Ok(vec![b'O', b'g', b'g', b'S', pcm.len() as u8])
        }
        fn concat_ogg(&self, parts: &[Vec<u8>]) -> Result<Vec<u8>> {
            Ok(parts.concat())
        }
    }

    struct FakeSynth;
    impl Synthesizer for FakeSynth {
        fn synthesize(&self, phonemes: &str, _m: &str, _v: &str, _rate: f32) -> Result<Vec<f32>> {
            Ok(vec![0.0; phonemes.len()])
        }
    }

    /// Records whatever text it was last asked to synthesize, so tests can
    /// assert on the `prefer_phonemes` branch without a real model.
    struct RecordingSynth(std::sync::Mutex<Option<String>>);
    impl Synthesizer for RecordingSynth {
        fn synthesize(&self, input: &str, _m: &str, _v: &str, _rate: f32) -> Result<Vec<f32>> {
            *self.0.lock().unwrap() = Some(input.to_string());
            Ok(vec![0.0; input.len()])
        }
    }

    fn empty_pack(name: &str) -> Pack {
        Pack { name: name.to_string(), version: "1".into(), format: "espeak".into(), entries: HashMap::new() }
    }

    #[tokio::test]
    async fn processing_a_segment_marks_it_ready_and_job_complete() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
        let queue: Arc<dyn Queue> = Arc::new(MemoryStore::new());
        let resolver = Arc::new(Resolver::new(
            vec![empty_pack("local_overrides"), empty_pack("auto_learn"), empty_pack("anime_en"), empty_pack("en_core")],
            None,
            false,
        ));
        let worker = Arc::new(Worker {
            id: "w1".into(),
            store: store.clone(),
            queue: queue.clone(),
            resolver,
            synthesizer: Arc::new(FakeSynth),
            codec: Arc::new(FakeCodec),
            cache: Arc::new(SegmentCache::new(dir.path().to_path_buf(), 512)),
            config: Config::default(),
            metrics: Arc::new(Metrics::new()),
        });

        let job = Job::new("j1".into(), None, "kitten-tts-mini-0.8".into(), "Jasper".into(), ReadingProfile::default(), vec![], false, 1, 0);
        store.put_job(&job).await.unwrap();
        let segment = crate::job::Segment::new("j1", 0, "Hello world.".into());
        store.put_segment(&segment).await.unwrap();

        worker.process_item(WorkItem { job_id: "j1".into(), segment_index: 0 }).await.unwrap();

        let updated = store.get_segment("j1", 0).await.unwrap().unwrap();
        assert_eq!(updated.status, SegmentStatus::Ready);
        let updated_job = store.get_job("j1").await.unwrap().unwrap();
        assert_eq!(updated_job.status, crate::job::JobStatus::Complete);
    }

    async fn run_prefer_phonemes_case(prefer_phonemes: bool) -> String {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
        let queue: Arc<dyn Queue> = Arc::new(MemoryStore::new());
        let resolver = Arc::new(Resolver::new(
            vec![
                empty_pack("local_overrides"),
                empty_pack("auto_learn"),
                Pack {
                    name: "anime_en".into(),
                    version: "1".into(),
                    format: "espeak".into(),
                    entries: HashMap::from([("Gojo".to_string(), "g o j o".to_string())]),
                },
                empty_pack("en_core"),
            ],
            None,
            false,
        ));
        let synth = Arc::new(RecordingSynth(std::sync::Mutex::new(None)));
        let worker = Arc::new(Worker {
            id: "w1".into(),
            store: store.clone(),
            queue: queue.clone(),
            resolver,
            synthesizer: synth.clone(),
            codec: Arc::new(FakeCodec),
            cache: Arc::new(SegmentCache::new(dir.path().to_path_buf(), 512)),
            config: Config::default(),
            metrics: Arc::new(Metrics::new()),
        });

        let job = Job::new(
            "j1".into(), None, "kitten-tts-mini-0.8".into(), "Jasper".into(),
            ReadingProfile::default(), vec![], prefer_phonemes, 1, 0,
        );
        store.put_job(&job).await.unwrap();
        let segment = crate::job::Segment::new("j1", 0, "Gojo".into());
        store.put_segment(&segment).await.unwrap();

        worker.process_item(WorkItem { job_id: "j1".into(), segment_index: 0 }).await.unwrap();
        synth.0.lock().unwrap().clone().unwrap()
    }

    #[tokio::test]
    async fn prefer_phonemes_false_synthesizes_from_segment_text() {
        assert_eq!(run_prefer_phonemes_case(false).await, "Gojo");
    }

    #[tokio::test]
    async fn prefer_phonemes_true_synthesizes_from_resolved_phonemes() {
        assert_eq!(run_prefer_phonemes_case(true).await, "g o j o");
    }

    #[tokio::test]
    async fn resolver_output_is_recorded_on_the_segment() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
        let queue: Arc<dyn Queue> = Arc::new(MemoryStore::new());
        let resolver = Arc::new(Resolver::new(
            vec![
                empty_pack("local_overrides"),
                empty_pack("auto_learn"),
                Pack {
                    name: "anime_en".into(),
                    version: "1".into(),
                    format: "espeak".into(),
                    entries: HashMap::from([("Gojo".to_string(), "g o j o".to_string())]),
                },
                empty_pack("en_core"),
            ],
            None,
            false,
        ));
        let worker = Arc::new(Worker {
            id: "w1".into(),
            store: store.clone(),
            queue: queue.clone(),
            resolver,
            synthesizer: Arc::new(FakeSynth),
            codec: Arc::new(FakeCodec),
            cache: Arc::new(SegmentCache::new(dir.path().to_path_buf(), 512)),
            config: Config::default(),
            metrics: Arc::new(Metrics::new()),
        });

        let job = Job::new("j1".into(), None, "kitten-tts-mini-0.8".into(), "Jasper".into(), ReadingProfile::default(), vec![], false, 1, 0);
        store.put_job(&job).await.unwrap();
        let segment = crate::job::Segment::new("j1", 0, "Gojo".into());
        store.put_segment(&segment).await.unwrap();

        worker.process_item(WorkItem { job_id: "j1".into(), segment_index: 0 }).await.unwrap();

        let updated = store.get_segment("j1", 0).await.unwrap().unwrap();
        assert_eq!(updated.resolved_phonemes.as_deref(), Some("g o j o"));
        assert!(updated.used_phonemes);
        assert_eq!(updated.resolve_source_counts.get("anime_en"), Some(&1));
        assert_eq!(worker.metrics.segments_synthesized.load(std::sync::atomic::Ordering::Relaxed), 1);
    }
}
