//! Metrics (spec §2.1, §6): atomic counters exposed as Prometheus text at
//! `/v1/metrics` and as a JSON snapshot at `/v1/admin/status`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;

#[derive(Default)]
pub struct Metrics {
    pub jobs_admitted: AtomicU64,
    pub jobs_rejected: AtomicU64,
    pub segments_synthesized: AtomicU64,
    pub segments_cache_hit: AtomicU64,
    pub segments_failed: AtomicU64,
    pub resolver_fallback_count: AtomicU64,
    pub merge_lock_contention: AtomicU64,
    model_usage: Mutex<HashMap<String, u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn load(v: &AtomicU64) -> u64 {
        v.load(Ordering::Relaxed)
    }

    /// Record that a job was admitted against `model_id`, for the
    /// `fallback_model_usage` breakdown in `/v1/admin/status`.
    pub fn record_model_usage(&self, model_id: &str) {
        let mut usage = self.model_usage.lock().unwrap();
        *usage.entry(model_id.to_string()).or_insert(0) += 1;
    }

    pub fn model_usage_snapshot(&self) -> HashMap<String, u64> {
        self.model_usage.lock().unwrap().clone()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_admitted: Self::load(&self.jobs_admitted),
            jobs_rejected: Self::load(&self.jobs_rejected),
            segments_synthesized: Self::load(&self.segments_synthesized),
            segments_cache_hit: Self::load(&self.segments_cache_hit),
            segments_failed: Self::load(&self.segments_failed),
            resolver_fallback_count: Self::load(&self.resolver_fallback_count),
            merge_lock_contention: Self::load(&self.merge_lock_contention),
        }
    }

    /// Render in Prometheus text exposition format for `/v1/metrics`.
    pub fn render_prometheus(&self) -> String {
        let s = self.snapshot();
        format!(
            "# TYPE pxtts_jobs_admitted_total counter\n\
             pxtts_jobs_admitted_total {}\n\
             # TYPE pxtts_jobs_rejected_total counter\n\
             pxtts_jobs_rejected_total {}\n\
             # TYPE pxtts_segments_synthesized_total counter\n\
             pxtts_segments_synthesized_total {}\n\
             # TYPE pxtts_segments_cache_hit_total counter\n\
             pxtts_segments_cache_hit_total {}\n\
             # TYPE pxtts_segments_failed_total counter\n\
             pxtts_segments_failed_total {}\n\
             # TYPE pxtts_resolver_fallback_total counter\n\
             pxtts_resolver_fallback_total {}\n\
             # TYPE pxtts_merge_lock_contention_total counter\n\
             pxtts_merge_lock_contention_total {}\n",
            s.jobs_admitted,
            s.jobs_rejected,
            s.segments_synthesized,
            s.segments_cache_hit,
            s.segments_failed,
            s.resolver_fallback_count,
            s.merge_lock_contention,
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub jobs_admitted: u64,
    pub jobs_rejected: u64,
    pub segments_synthesized: u64,
    pub segments_cache_hit: u64,
    pub segments_failed: u64,
    pub resolver_fallback_count: u64,
    pub merge_lock_contention: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prometheus_output_includes_all_counters() {
        let m = Metrics::new();
        m.jobs_admitted.fetch_add(3, Ordering::Relaxed);
        let text = m.render_prometheus();
        assert!(text.contains("pxtts_jobs_admitted_total 3"));
        assert!(text.contains("pxtts_segments_failed_total 0"));
    }
}
