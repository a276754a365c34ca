//! End-to-end exercise of the in-process store/queue pipeline: submit a
//! job, drain it through a worker with fake synth/codec backends, then
//! merge the result (spec §8 testable properties).

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use pxtts::cache::SegmentCache;
use pxtts::codec::AudioCodec;
use pxtts::config::Config;
use pxtts::dict::{DictionaryStore, Pack};
use pxtts::job::JobStatus;
use pxtts::merger::Merger;
use pxtts::metrics::Metrics;
use pxtts::resolver::Resolver;
use pxtts::scheduler::{JobRequest, Scheduler};
use pxtts::store::{JobStore, MemoryStore, Queue};
use pxtts::synth::Synthesizer;
use pxtts::worker::Worker;

struct FakeSynth;
impl Synthesizer for FakeSynth {
    fn synthesize(&self, phonemes: &str, _model_id: &str, _voice_id: &str, rate: f32) -> Result<Vec<f32>> {
        Ok(vec![0.0; (phonemes.chars().count() as f32 * rate).max(1.0) as usize])
    }
}

struct FakeCodec;
impl AudioCodec for FakeCodec {
    fn encode_pcm_to_ogg(&self, pcm: &[f32], silence_ms: u32) -> Result<Vec<u8>> {
        let mut out = b"OggS".to_vec();
        out.extend((pcm.len() as u32).to_le_bytes());
        out.extend(silence_ms.to_le_bytes());
        Ok(out)
    }

    fn concat_ogg(&self, parts: &[Vec<u8>]) -> Result<Vec<u8>> {
        Ok(parts.concat())
    }
}

fn empty_pack(name: &str) -> Pack {
    Pack { name: name.to_string(), version: "1".to_string(), format: "espeak".to_string(), entries: HashMap::new() }
}

#[tokio::test]
async fn job_flows_from_submission_through_merge() {
    let dict_dir = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();

    let dict_store = Arc::new(DictionaryStore::new(dict_dir.path().to_path_buf()));
    // Seed anime_en with every word in the test sentence so the resolver
    // never reaches the real espeak-ng fallback.
    dict_store.upload(
        "anime_en",
        &HashMap::from([
            ("Gojo".to_string(), "g o j o".to_string()),
            ("meets".to_string(), "m i: t s".to_string()),
            ("Sukuna".to_string(), "s u k u n a".to_string()),
        ]),
    ).unwrap();

    let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
    let queue: Arc<dyn Queue> = Arc::new(MemoryStore::new());
    let metrics = Arc::new(Metrics::new());
    let config = Config::default();
    let cache = Arc::new(SegmentCache::new(cache_dir.path().to_path_buf(), 512));

    let scheduler = Scheduler {
        store: store.clone(),
        queue: queue.clone(),
        dict_store: dict_store.clone(),
        cache: cache.clone(),
        config: config.clone(),
        metrics: metrics.clone(),
    };

    let job = scheduler
        .submit(
            JobRequest {
                text: "Gojo meets Sukuna.".to_string(),
                model_id: config.model_id.clone(),
                voice_id: "Jasper".to_string(),
                reading_profile: Default::default(),
                idempotency_key: Some("test-key-1".to_string()),
                prefer_phonemes: false,
            },
            "job-1".to_string(),
        )
        .await
        .unwrap();
    assert_eq!(job.segment_count, 1);

    let packs = dict_store.load_all().unwrap();
    let resolver = Arc::new(Resolver::new(packs, None, false));
    let codec: Arc<dyn AudioCodec> = Arc::new(FakeCodec);

    let worker = Arc::new(Worker {
        id: "worker-test".to_string(),
        store: store.clone(),
        queue: queue.clone(),
        resolver,
        synthesizer: Arc::new(FakeSynth),
        codec: codec.clone(),
        cache: cache.clone(),
        config: config.clone(),
        metrics: metrics.clone(),
    });

    while let Some(item) = queue.claim_next("worker-test", 0, 1).await.unwrap() {
        worker.process_item(item).await.unwrap();
    }

    let finished = store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(finished.status, JobStatus::Complete);

    let merger = Merger::new(store.clone(), codec, cache_dir.path().to_path_buf(), cache.clone());
    let (merged, _key) = merger.merge(&job.id).await.unwrap();
    assert!(merged.starts_with(b"OggS"));
}

#[tokio::test]
async fn resubmitting_same_idempotency_key_does_not_duplicate_job() {
    let dict_dir = tempfile::tempdir().unwrap();
    let dict_store = Arc::new(DictionaryStore::new(dict_dir.path().to_path_buf()));
    let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
    let queue: Arc<dyn Queue> = Arc::new(MemoryStore::new());
    let config = Config::default();
    let cache_dir = tempfile::tempdir().unwrap();

    let scheduler = Scheduler {
        store: store.clone(),
        queue: queue.clone(),
        dict_store,
        cache: Arc::new(SegmentCache::new(cache_dir.path().to_path_buf(), 512)),
        config: config.clone(),
        metrics: Arc::new(Metrics::new()),
    };

    let req = || JobRequest {
        text: "Some ordinary sentence here.".to_string(),
        model_id: config.model_id.clone(),
        voice_id: "Jasper".to_string(),
        reading_profile: Default::default(),
        idempotency_key: Some("dup-key".to_string()),
        prefer_phonemes: false,
    };

    let first = scheduler.submit(req(), "job-a".to_string()).await.unwrap();
    let second = scheduler.submit(req(), "job-b".to_string()).await.unwrap();
    assert_eq!(first.id, second.id);
    assert!(store.get_job("job-b").await.unwrap().is_none());
}
