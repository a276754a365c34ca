//! Redis-backed distributed job store and queue (spec §4.4 "distributed
//! mode"). Keys are all prefixed `px:` per the deployment's key-space
//! convention.
//!
//! ```text
//! px:job:<id>              -> JSON Job
//! px:job:idem:<key>         -> job id
//! px:job:active             -> set of active job ids
//! px:job:all                -> set of every job id ever admitted (jobs_ttl_seconds reaper)
//! px:seg:<job_id>:<index>   -> JSON Segment
//! px:seg:index:<job_id>     -> set of segment indices
//! px:queue                  -> list of JSON WorkItem, RPUSH/LPOP
//! px:inflight               -> hash "job_id:index" -> JSON (worker_id, claimed_at)
//! px:workers                -> hash worker_id -> last heartbeat unix
//! ```

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::job::{Job, Segment};
use super::{JobStore, Queue, WorkItem};

pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    pub fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    async fn conn(&self) -> anyhow::Result<redis::aio::ConnectionManager> {
        Ok(self.client.get_connection_manager().await?)
    }
}

fn job_key(id: &str) -> String {
    format!("px:job:{id}")
}

fn idem_key(key: &str) -> String {
    format!("px:job:idem:{key}")
}

fn segment_key(job_id: &str, index: usize) -> String {
    format!("px:seg:{job_id}:{index}")
}

fn segment_index_key(job_id: &str) -> String {
    format!("px:seg:index:{job_id}")
}

#[async_trait]
impl JobStore for RedisStore {
    async fn put_job(&self, job: &Job) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        let body = serde_json::to_string(job)?;
        conn.set::<_, _, ()>(job_key(&job.id), &body).await?;
        conn.sadd::<_, _, ()>("px:job:all", &job.id).await?;
        if let Some(key) = &job.idempotency_key {
            conn.set::<_, _, ()>(idem_key(key), &job.id).await?;
        }
        use crate::job::JobStatus;
        if matches!(job.status, JobStatus::Queued | JobStatus::Running) {
            conn.sadd::<_, _, ()>("px:job:active", &job.id).await?;
        } else {
            conn.srem::<_, _, ()>("px:job:active", &job.id).await?;
        }
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> anyhow::Result<Option<Job>> {
        let mut conn = self.conn().await?;
        let body: Option<String> = conn.get(job_key(job_id)).await?;
        Ok(body.map(|b| serde_json::from_str(&b)).transpose()?)
    }

    async fn find_by_idempotency_key(&self, key: &str) -> anyhow::Result<Option<Job>> {
        let mut conn = self.conn().await?;
        let job_id: Option<String> = conn.get(idem_key(key)).await?;
        match job_id {
            Some(id) => self.get_job(&id).await,
            None => Ok(None),
        }
    }

    async fn put_segment(&self, segment: &Segment) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        let body = serde_json::to_string(segment)?;
        conn.set::<_, _, ()>(segment_key(&segment.job_id, segment.index), &body).await?;
        conn.sadd::<_, _, ()>(segment_index_key(&segment.job_id), segment.index).await?;
        Ok(())
    }

    async fn get_segment(&self, job_id: &str, index: usize) -> anyhow::Result<Option<Segment>> {
        let mut conn = self.conn().await?;
        let body: Option<String> = conn.get(segment_key(job_id, index)).await?;
        Ok(body.map(|b| serde_json::from_str(&b)).transpose()?)
    }

    async fn list_segments(&self, job_id: &str) -> anyhow::Result<Vec<Segment>> {
        let mut conn = self.conn().await?;
        let indices: Vec<usize> = conn.smembers(segment_index_key(job_id)).await?;
        let mut segments = Vec::with_capacity(indices.len());
        for idx in indices {
            if let Some(seg) = self.get_segment(job_id, idx).await? {
                segments.push(seg);
            }
        }
        segments.sort_by_key(|s| s.index);
        Ok(segments)
    }

    async fn active_job_count(&self) -> anyhow::Result<usize> {
        let mut conn = self.conn().await?;
        Ok(conn.scard("px:job:active").await?)
    }

    async fn reap_expired(&self, now_unix: i64, ttl_seconds: i64) -> anyhow::Result<usize> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn.smembers("px:job:all").await?;
        let mut reaped = 0usize;
        for id in ids {
            let Some(job) = self.get_job(&id).await? else {
                conn.srem::<_, _, ()>("px:job:all", &id).await?;
                continue;
            };
            if !job.is_expired(now_unix, ttl_seconds) {
                continue;
            }
            let indices: Vec<usize> = conn.smembers(segment_index_key(&id)).await?;
            for idx in indices {
                conn.del::<_, ()>(segment_key(&id, idx)).await?;
            }
            conn.del::<_, ()>(segment_index_key(&id)).await?;
            conn.del::<_, ()>(job_key(&id)).await?;
            if let Some(key) = &job.idempotency_key {
                conn.del::<_, ()>(idem_key(key)).await?;
            }
            conn.srem::<_, _, ()>("px:job:active", &id).await?;
            conn.srem::<_, _, ()>("px:job:all", &id).await?;
            reaped += 1;
        }
        Ok(reaped)
    }

    async fn heartbeat_worker(&self, worker_id: &str, now_unix: i64) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        conn.hset::<_, _, _, ()>("px:workers", worker_id, now_unix).await?;
        Ok(())
    }

    async fn active_worker_count(&self, now_unix: i64, ttl_seconds: i64) -> anyhow::Result<usize> {
        let mut conn = self.conn().await?;
        let all: std::collections::HashMap<String, i64> = conn.hgetall("px:workers").await?;
        Ok(all.values().filter(|&&t| now_unix - t < ttl_seconds).count())
    }

    async fn active_retry_count(&self) -> anyhow::Result<u64> {
        let mut conn = self.conn().await?;
        let active_ids: Vec<String> = conn.smembers("px:job:active").await?;
        let mut total = 0u64;
        for id in active_ids {
            for segment in self.list_segments(&id).await? {
                total += segment.retries as u64;
            }
        }
        Ok(total)
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct InFlightEntry {
    worker_id: String,
    claimed_at_unix: i64,
}

#[async_trait]
impl Queue for RedisStore {
    async fn push(&self, item: WorkItem) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        let body = serde_json::to_string(&(item.job_id, item.segment_index))?;
        conn.rpush::<_, _, ()>("px:queue", body).await?;
        Ok(())
    }

    async fn claim_next(
        &self,
        worker_id: &str,
        now_unix: i64,
        max_concurrent_per_job: usize,
    ) -> anyhow::Result<Option<WorkItem>> {
        let mut conn = self.conn().await?;

        // Pop candidates until one belongs to a job under its concurrency
        // cap, deferring the rest back onto the queue. Bounded by the
        // queue's length at entry so a queue full of capped jobs doesn't
        // spin forever.
        let attempts: usize = conn.llen("px:queue").await?;
        let mut deferred: Vec<String> = Vec::new();
        let mut claimed = None;

        for _ in 0..attempts {
            let body: Option<String> = conn.lpop("px:queue", None).await?;
            let Some(body) = body else { break };
            let (job_id, segment_index): (String, usize) = serde_json::from_str(&body)?;

            let in_flight_keys: Vec<String> = conn.hkeys("px:inflight").await?;
            let prefix = format!("{job_id}:");
            let in_flight_for_job = in_flight_keys.iter().filter(|k| k.starts_with(&prefix)).count();

            if in_flight_for_job < max_concurrent_per_job {
                claimed = Some((job_id, segment_index));
                break;
            }
            deferred.push(body);
        }

        for body in deferred {
            conn.rpush::<_, _, ()>("px:queue", body).await?;
        }

        let Some((job_id, segment_index)) = claimed else { return Ok(None) };
        let entry = InFlightEntry { worker_id: worker_id.to_string(), claimed_at_unix: now_unix };
        conn.hset::<_, _, _, ()>(
            "px:inflight",
            format!("{job_id}:{segment_index}"),
            serde_json::to_string(&entry)?,
        )
        .await?;
        Ok(Some(WorkItem { job_id, segment_index }))
    }

    async fn reclaim_stale(&self, now_unix: i64, stale_seconds: i64) -> anyhow::Result<usize> {
        let mut conn = self.conn().await?;
        let all: std::collections::HashMap<String, String> = conn.hgetall("px:inflight").await?;
        let mut requeued = 0usize;
        for (key, raw) in all {
            let entry: InFlightEntry = serde_json::from_str(&raw)?;
            if now_unix - entry.claimed_at_unix >= stale_seconds {
                let Some((job_id, idx)) = key.split_once(':') else { continue };
                let segment_index: usize = idx.parse()?;
                conn.hdel::<_, _, ()>("px:inflight", &key).await?;
                self.push(WorkItem { job_id: job_id.to_string(), segment_index }).await?;
                requeued += 1;
            }
        }
        Ok(requeued)
    }

    async fn queue_len(&self) -> anyhow::Result<usize> {
        let mut conn = self.conn().await?;
        Ok(conn.llen("px:queue").await?)
    }
}
