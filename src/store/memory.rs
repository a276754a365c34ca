//! In-process job store and queue: a `Mutex`-guarded map plus a FIFO deque,
//! used when `role` runs without `redis_url` configured (spec §4.4
//! "in-process mode"). Grounded on the teacher's `Mutex`-pooled-session
//! pattern in `model.rs`, generalized to job/segment state.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::job::{Job, Segment};
use super::{JobStore, Queue, WorkItem};

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, Job>,
    idempotency_index: HashMap<String, String>,
    segments: HashMap<(String, usize), Segment>,
    queue: VecDeque<WorkItem>,
    in_flight: HashMap<(String, usize), (String, i64)>,
    worker_heartbeats: HashMap<String, i64>,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn put_job(&self, job: &Job) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(key) = &job.idempotency_key {
            inner.idempotency_index.insert(key.clone(), job.id.clone());
        }
        inner.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> anyhow::Result<Option<Job>> {
        Ok(self.inner.lock().unwrap().jobs.get(job_id).cloned())
    }

    async fn find_by_idempotency_key(&self, key: &str) -> anyhow::Result<Option<Job>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.idempotency_index.get(key).and_then(|id| inner.jobs.get(id)).cloned())
    }

    async fn put_segment(&self, segment: &Segment) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .segments
            .insert((segment.job_id.clone(), segment.index), segment.clone());
        Ok(())
    }

    async fn get_segment(&self, job_id: &str, index: usize) -> anyhow::Result<Option<Segment>> {
        Ok(self.inner.lock().unwrap().segments.get(&(job_id.to_string(), index)).cloned())
    }

    async fn list_segments(&self, job_id: &str) -> anyhow::Result<Vec<Segment>> {
        let inner = self.inner.lock().unwrap();
        let mut segs: Vec<Segment> = inner
            .segments
            .values()
            .filter(|s| s.job_id == job_id)
            .cloned()
            .collect();
        segs.sort_by_key(|s| s.index);
        Ok(segs)
    }

    async fn active_job_count(&self) -> anyhow::Result<usize> {
        use crate::job::JobStatus;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .jobs
            .values()
            .filter(|j| matches!(j.status, JobStatus::Queued | JobStatus::Running))
            .count())
    }

    async fn reap_expired(&self, now_unix: i64, ttl_seconds: i64) -> anyhow::Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        let expired: Vec<String> = inner
            .jobs
            .values()
            .filter(|j| j.is_expired(now_unix, ttl_seconds))
            .map(|j| j.id.clone())
            .collect();
        for id in &expired {
            if let Some(job) = inner.jobs.remove(id) {
                if let Some(key) = &job.idempotency_key {
                    inner.idempotency_index.remove(key);
                }
            }
            inner.segments.retain(|(job_id, _), _| job_id != id);
        }
        Ok(expired.len())
    }

    async fn heartbeat_worker(&self, worker_id: &str, now_unix: i64) -> anyhow::Result<()> {
        self.inner.lock().unwrap().worker_heartbeats.insert(worker_id.to_string(), now_unix);
        Ok(())
    }

    async fn active_worker_count(&self, now_unix: i64, ttl_seconds: i64) -> anyhow::Result<usize> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .worker_heartbeats
            .values()
            .filter(|&&t| now_unix - t < ttl_seconds)
            .count())
    }

    async fn active_retry_count(&self) -> anyhow::Result<u64> {
        use crate::job::JobStatus;
        let inner = self.inner.lock().unwrap();
        let active_ids: std::collections::HashSet<&String> = inner
            .jobs
            .values()
            .filter(|j| matches!(j.status, JobStatus::Queued | JobStatus::Running))
            .map(|j| &j.id)
            .collect();
        Ok(inner
            .segments
            .values()
            .filter(|s| active_ids.contains(&s.job_id))
            .map(|s| s.retries as u64)
            .sum())
    }
}

#[async_trait]
impl Queue for MemoryStore {
    async fn push(&self, item: WorkItem) -> anyhow::Result<()> {
        self.inner.lock().unwrap().queue.push_back(item);
        Ok(())
    }

    async fn claim_next(
        &self,
        worker_id: &str,
        now_unix: i64,
        max_concurrent_per_job: usize,
    ) -> anyhow::Result<Option<WorkItem>> {
        let mut inner = self.inner.lock().unwrap();

        let pos = inner.queue.iter().position(|item| {
            let in_flight_for_job =
                inner.in_flight.keys().filter(|(job_id, _)| *job_id == item.job_id).count();
            in_flight_for_job < max_concurrent_per_job
        });
        let Some(pos) = pos else { return Ok(None) };
        let item = inner.queue.remove(pos).expect("position came from this deque");

        inner
            .in_flight
            .insert((item.job_id.clone(), item.segment_index), (worker_id.to_string(), now_unix));
        Ok(Some(item))
    }

    async fn reclaim_stale(&self, now_unix: i64, stale_seconds: i64) -> anyhow::Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        let stale: Vec<(String, usize)> = inner
            .in_flight
            .iter()
            .filter(|(_, (_, claimed_at))| now_unix - claimed_at >= stale_seconds)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            inner.in_flight.remove(key);
            inner.queue.push_back(WorkItem { job_id: key.0.clone(), segment_index: key.1 });
        }
        Ok(stale.len())
    }

    async fn queue_len(&self) -> anyhow::Result<usize> {
        Ok(self.inner.lock().unwrap().queue.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ReadingProfile;

    #[tokio::test]
    async fn put_and_get_job_round_trips() {
        let store = MemoryStore::new();
        let job = Job::new("j1".into(), Some("idem-1".into()), "m".into(), "v".into(), ReadingProfile::default(), vec![], false, 1, 0);
        store.put_job(&job).await.unwrap();
        assert!(store.get_job("j1").await.unwrap().is_some());
        assert_eq!(store.find_by_idempotency_key("idem-1").await.unwrap().unwrap().id, "j1");
    }

    #[tokio::test]
    async fn queue_push_claim_reclaim() {
        let store = MemoryStore::new();
        store.push(WorkItem { job_id: "j1".into(), segment_index: 0 }).await.unwrap();
        let claimed = store.claim_next("worker-a", 1000, 1).await.unwrap().unwrap();
        assert_eq!(claimed.job_id, "j1");
        assert!(store.claim_next("worker-b", 1000, 1).await.unwrap().is_none());

        let requeued = store.reclaim_stale(1400, 300).await.unwrap();
        assert_eq!(requeued, 1);
        let reclaimed = store.claim_next("worker-c", 1400, 1).await.unwrap();
        assert!(reclaimed.is_some());
    }

    #[tokio::test]
    async fn active_job_count_excludes_terminal_jobs() {
        use crate::job::JobStatus;
        let store = MemoryStore::new();
        let mut running = Job::new("j1".into(), None, "m".into(), "v".into(), ReadingProfile::default(), vec![], false, 1, 0);
        let mut done = Job::new("j2".into(), None, "m".into(), "v".into(), ReadingProfile::default(), vec![], false, 1, 0);
        running.status = JobStatus::Running;
        done.status = JobStatus::Complete;
        store.put_job(&running).await.unwrap();
        store.put_job(&done).await.unwrap();
        assert_eq!(store.active_job_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn claim_next_skips_job_already_at_concurrency_cap() {
        let store = MemoryStore::new();
        store.push(WorkItem { job_id: "j1".into(), segment_index: 0 }).await.unwrap();
        store.push(WorkItem { job_id: "j1".into(), segment_index: 1 }).await.unwrap();
        store.push(WorkItem { job_id: "j2".into(), segment_index: 0 }).await.unwrap();

        let first = store.claim_next("worker-a", 1000, 1).await.unwrap().unwrap();
        assert_eq!(first.job_id, "j1");

        // j1 is now at its cap of 1; the next claim should skip straight to j2.
        let second = store.claim_next("worker-b", 1000, 1).await.unwrap().unwrap();
        assert_eq!(second.job_id, "j2");

        // Nothing left that respects the cap: j1's second segment is still blocked.
        assert!(store.claim_next("worker-c", 1000, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reap_expired_removes_terminal_jobs_past_ttl() {
        use crate::job::JobStatus;
        let store = MemoryStore::new();
        let mut job = Job::new("j1".into(), None, "m".into(), "v".into(), ReadingProfile::default(), vec![], false, 1, 0);
        job.status = JobStatus::Complete;
        job.finished_at_unix = Some(1000);
        store.put_job(&job).await.unwrap();

        assert_eq!(store.reap_expired(1100, 300).await.unwrap(), 0);
        assert_eq!(store.reap_expired(1400, 300).await.unwrap(), 1);
        assert!(store.get_job("j1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn queue_len_reflects_pending_items() {
        let store = MemoryStore::new();
        assert_eq!(store.queue_len().await.unwrap(), 0);
        store.push(WorkItem { job_id: "j1".into(), segment_index: 0 }).await.unwrap();
        store.push(WorkItem { job_id: "j1".into(), segment_index: 1 }).await.unwrap();
        assert_eq!(store.queue_len().await.unwrap(), 2);
        store.claim_next("worker-a", 1000, 2).await.unwrap();
        assert_eq!(store.queue_len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn active_retry_count_sums_only_active_jobs_segments() {
        use crate::job::{JobStatus, Segment};
        let store = MemoryStore::new();

        let mut running = Job::new("j1".into(), None, "m".into(), "v".into(), ReadingProfile::default(), vec![], false, 2, 0);
        running.status = JobStatus::Running;
        store.put_job(&running).await.unwrap();
        let mut seg0 = Segment::new("j1", 0, "a".into());
        seg0.retries = 2;
        let mut seg1 = Segment::new("j1", 1, "b".into());
        seg1.retries = 1;
        store.put_segment(&seg0).await.unwrap();
        store.put_segment(&seg1).await.unwrap();

        let mut done = Job::new("j2".into(), None, "m".into(), "v".into(), ReadingProfile::default(), vec![], false, 1, 0);
        done.status = JobStatus::Complete;
        store.put_job(&done).await.unwrap();
        let mut seg2 = Segment::new("j2", 0, "c".into());
        seg2.retries = 5;
        store.put_segment(&seg2).await.unwrap();

        assert_eq!(store.active_retry_count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn active_worker_count_excludes_stale_heartbeats() {
        let store = MemoryStore::new();
        store.heartbeat_worker("w1", 1000).await.unwrap();
        assert_eq!(store.active_worker_count(1050, 300).await.unwrap(), 1);
        assert_eq!(store.active_worker_count(1400, 300).await.unwrap(), 0);
    }
}
