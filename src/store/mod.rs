//! Job/segment storage and queueing (spec §4.4): an in-process mode and a
//! Redis-backed distributed mode behind the same trait pair.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;

use crate::job::{Job, Segment};

/// A claimed unit of work handed to a worker by [`Queue::claim_next`].
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub job_id: String,
    pub segment_index: usize,
}

/// Durable storage for jobs and their segments.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn put_job(&self, job: &Job) -> anyhow::Result<()>;
    async fn get_job(&self, job_id: &str) -> anyhow::Result<Option<Job>>;
    async fn find_by_idempotency_key(&self, key: &str) -> anyhow::Result<Option<Job>>;

    async fn put_segment(&self, segment: &Segment) -> anyhow::Result<()>;
    async fn get_segment(&self, job_id: &str, index: usize) -> anyhow::Result<Option<Segment>>;
    async fn list_segments(&self, job_id: &str) -> anyhow::Result<Vec<Segment>>;

    /// Active job count, for admission backpressure (spec §4.5
    /// `max_active_jobs`).
    async fn active_job_count(&self) -> anyhow::Result<usize>;

    /// Delete jobs (and their segments) that have sat past
    /// `jobs_ttl_seconds` since reaching a terminal status (spec §6
    /// lifecycle). Returns how many jobs were reaped.
    async fn reap_expired(&self, now_unix: i64, ttl_seconds: i64) -> anyhow::Result<usize>;

    /// Record that `worker_id` is alive as of `now_unix` (spec §6
    /// `require_workers`).
    async fn heartbeat_worker(&self, worker_id: &str, now_unix: i64) -> anyhow::Result<()>;

    /// Count workers whose last heartbeat is within `ttl_seconds` of
    /// `now_unix`. Used to serve `503` on admission when `require_workers`
    /// is set and no worker is currently alive.
    async fn active_worker_count(&self, now_unix: i64, ttl_seconds: i64) -> anyhow::Result<usize>;

    /// Sum of `retries` across every segment of every active (non-terminal)
    /// job, for the `retry_counts` admin-status field.
    async fn active_retry_count(&self) -> anyhow::Result<u64>;
}

/// Work queue feeding worker roles (spec §4.4, §4.6).
#[async_trait]
pub trait Queue: Send + Sync {
    async fn push(&self, item: WorkItem) -> anyhow::Result<()>;

    /// Atomically claim the next available item for `worker_id`, or `None`
    /// if the queue is empty or every queued item belongs to a job already
    /// at `max_concurrent_per_job` in-flight segments (spec §8 invariant:
    /// concurrent claims per job never exceed `max_concurrent_segments`).
    /// Implementations set the segment's `InProgress` claim fields as part
    /// of the same atomic step.
    async fn claim_next(
        &self,
        worker_id: &str,
        now_unix: i64,
        max_concurrent_per_job: usize,
    ) -> anyhow::Result<Option<WorkItem>>;

    /// Re-queue items whose claim has gone stale past `stale_seconds`
    /// (spec §4.4 "stale claim recovery"). Returns how many were requeued.
    async fn reclaim_stale(&self, now_unix: i64, stale_seconds: i64) -> anyhow::Result<usize>;

    /// Number of items currently waiting to be claimed, for the `queue_len`
    /// admin-status field.
    async fn queue_len(&self) -> anyhow::Result<usize>;
}
