//! Job/segment data model and state machine (spec §3, §4.6).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::chunk::ReadingProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    Queued,
    InProgress,
    Ready,
    Error,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Complete,
    CompleteWithErrors,
    Canceled,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentError {
    pub code: String,
    pub message: String,
}

/// One synthesizable unit of a job (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub job_id: String,
    pub index: usize,
    pub text: String,
    pub status: SegmentStatus,
    pub cache_key: Option<String>,
    pub retries: u32,
    pub claimed_by: Option<String>,
    pub claimed_at_unix: Option<i64>,
    pub error: Option<SegmentError>,
    /// The phoneme string the resolver produced for this segment's text,
    /// independent of whether synthesis actually consumed it (spec §4.2,
    /// surfaced for debugging/QA).
    pub resolved_phonemes: Option<String>,
    pub used_phonemes: bool,
    pub resolve_source_counts: HashMap<String, u32>,
}

impl Segment {
    pub fn new(job_id: &str, index: usize, text: String) -> Self {
        Self {
            job_id: job_id.to_string(),
            index,
            text,
            status: SegmentStatus::Queued,
            cache_key: None,
            retries: 0,
            claimed_by: None,
            claimed_at_unix: None,
            error: None,
            resolved_phonemes: None,
            used_phonemes: false,
            resolve_source_counts: HashMap::new(),
        }
    }

    /// Claim this segment for `worker_id` at `now_unix` (spec §4.4). Only
    /// legal from `Queued`, or from `InProgress` when the prior claim is
    /// stale (checked by the caller via `segment_stale_seconds`).
    pub fn claim(&mut self, worker_id: &str, now_unix: i64) {
        self.status = SegmentStatus::InProgress;
        self.claimed_by = Some(worker_id.to_string());
        self.claimed_at_unix = Some(now_unix);
    }

    pub fn is_claim_stale(&self, now_unix: i64, stale_seconds: i64) -> bool {
        matches!(self.status, SegmentStatus::InProgress)
            && self.claimed_at_unix.map(|t| now_unix - t >= stale_seconds).unwrap_or(false)
    }

    pub fn complete(&mut self, cache_key: String) {
        self.status = SegmentStatus::Ready;
        self.cache_key = Some(cache_key);
        self.claimed_by = None;
        self.claimed_at_unix = None;
        self.error = None;
    }

    /// Record a failure. Returns `true` if the retry cap is reached and the
    /// segment has moved to its terminal `Error` state (spec §4.6 edge
    /// case: "segment exhausts retries").
    pub fn fail(&mut self, code: &str, message: &str, max_retries: u32) -> bool {
        self.claimed_by = None;
        self.claimed_at_unix = None;
        self.error = Some(SegmentError { code: code.to_string(), message: message.to_string() });
        if self.retries >= max_retries {
            self.status = SegmentStatus::Error;
            true
        } else {
            self.retries += 1;
            self.status = SegmentStatus::Queued;
            false
        }
    }

    pub fn cancel(&mut self) {
        if !matches!(self.status, SegmentStatus::Ready | SegmentStatus::Error) {
            self.status = SegmentStatus::Canceled;
            self.claimed_by = None;
            self.claimed_at_unix = None;
        }
    }
}

/// A long-form synthesis job (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub idempotency_key: Option<String>,
    pub model_id: String,
    pub voice_id: String,
    pub reading_profile: ReadingProfile,
    pub pack_versions: Vec<(String, String)>,
    pub prefer_phonemes: bool,
    pub status: JobStatus,
    pub segment_count: usize,
    pub created_at_unix: i64,
    pub finished_at_unix: Option<i64>,
    pub merged_cache_key: Option<String>,
}

impl Job {
    pub fn new(
        id: String,
        idempotency_key: Option<String>,
        model_id: String,
        voice_id: String,
        reading_profile: ReadingProfile,
        pack_versions: Vec<(String, String)>,
        prefer_phonemes: bool,
        segment_count: usize,
        now_unix: i64,
    ) -> Self {
        Self {
            id,
            idempotency_key,
            model_id,
            voice_id,
            reading_profile,
            pack_versions,
            prefer_phonemes,
            status: JobStatus::Queued,
            segment_count,
            created_at_unix: now_unix,
            finished_at_unix: None,
            merged_cache_key: None,
        }
    }

    fn is_terminal(status: JobStatus) -> bool {
        matches!(status, JobStatus::Complete | JobStatus::CompleteWithErrors | JobStatus::Canceled | JobStatus::Failed)
    }

    /// Derive the job's status from its segments' current statuses (spec
    /// §4.6). Called after every segment transition. `now_unix` stamps
    /// `finished_at_unix` the moment the job first reaches a terminal
    /// status, which anchors the `jobs_ttl_seconds` eviction clock.
    pub fn derive_status(&mut self, segments: &[Segment], now_unix: i64) {
        if matches!(self.status, JobStatus::Canceled) {
            return;
        }
        let any_canceled = segments.iter().any(|s| matches!(s.status, SegmentStatus::Canceled));
        if any_canceled {
            self.status = JobStatus::Canceled;
            self.finished_at_unix = Some(now_unix);
            return;
        }

        let all_terminal = segments
            .iter()
            .all(|s| matches!(s.status, SegmentStatus::Ready | SegmentStatus::Error));
        if !all_terminal {
            self.status = JobStatus::Running;
            return;
        }

        let any_error = segments.iter().any(|s| matches!(s.status, SegmentStatus::Error));
        self.status = if any_error {
            JobStatus::CompleteWithErrors
        } else {
            JobStatus::Complete
        };
        self.finished_at_unix = Some(now_unix);
    }

    pub fn cancel(&mut self, now_unix: i64) {
        self.status = JobStatus::Canceled;
        self.finished_at_unix = Some(now_unix);
    }

    /// Whether this job has passed `jobs_ttl_seconds` since reaching a
    /// terminal status (spec §6 lifecycle: "lives `jobs_ttl_seconds` past
    /// terminal state, then evicted").
    pub fn is_expired(&self, now_unix: i64, ttl_seconds: i64) -> bool {
        Self::is_terminal(self.status)
            && self.finished_at_unix.map(|t| now_unix - t >= ttl_seconds).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> ReadingProfile {
        ReadingProfile::default()
    }

    #[test]
    fn fresh_job_all_segments_queued_is_running_once_claimed() {
        let mut segs = vec![Segment::new("j1", 0, "a".into()), Segment::new("j1", 1, "b".into())];
        let mut job = Job::new("j1".into(), None, "m".into(), "v".into(), profile(), vec![], false, 2, 0);
        job.derive_status(&segs, 0);
        assert_eq!(job.status, JobStatus::Running);

        segs[0].complete("key1".into());
        job.derive_status(&segs, 0);
        assert_eq!(job.status, JobStatus::Running);

        segs[1].complete("key2".into());
        job.derive_status(&segs, 0);
        assert_eq!(job.status, JobStatus::Complete);
    }

    #[test]
    fn one_errored_segment_yields_complete_with_errors() {
        let mut segs = vec![Segment::new("j1", 0, "a".into())];
        segs[0].fail("synth.failed", "oops", 0);
        let mut job = Job::new("j1".into(), None, "m".into(), "v".into(), profile(), vec![], false, 1, 0);
        job.derive_status(&segs, 0);
        assert_eq!(job.status, JobStatus::CompleteWithErrors);
    }

    #[test]
    fn fail_retries_then_errors_out() {
        let mut seg = Segment::new("j1", 0, "a".into());
        assert!(!seg.fail("synth.failed", "oops", 2));
        assert_eq!(seg.status, SegmentStatus::Queued);
        assert_eq!(seg.retries, 1);
        assert!(!seg.fail("synth.failed", "oops", 2));
        assert_eq!(seg.retries, 2);
        assert!(seg.fail("synth.failed", "oops", 2));
        assert_eq!(seg.status, SegmentStatus::Error);
    }

    #[test]
    fn stale_claim_detection() {
        let mut seg = Segment::new("j1", 0, "a".into());
        seg.claim("worker-1", 1000);
        assert!(!seg.is_claim_stale(1100, 300));
        assert!(seg.is_claim_stale(1301, 300));
    }

    #[test]
    fn cancel_propagates_to_job_status() {
        let mut segs = vec![Segment::new("j1", 0, "a".into()), Segment::new("j1", 1, "b".into())];
        segs[0].cancel();
        let mut job = Job::new("j1".into(), None, "m".into(), "v".into(), profile(), vec![], false, 2, 0);
        job.derive_status(&segs, 0);
        assert_eq!(job.status, JobStatus::Canceled);
    }

    #[test]
    fn cancel_is_noop_on_ready_segment() {
        let mut seg = Segment::new("j1", 0, "a".into());
        seg.complete("key".into());
        seg.cancel();
        assert_eq!(seg.status, SegmentStatus::Ready);
    }
}
