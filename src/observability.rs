//! Tracing setup and process-local metrics counters

use std::sync::atomic::{AtomicU64, Ordering};

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// Filter resolution order: `RUST_LOG`, then `LOG_LEVEL`, then "info".
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            std::env::var("LOG_LEVEL").map(EnvFilter::new).map_err(|_| ())
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Metrics handle for recording counters
#[derive(Debug, Default)]
pub struct Metrics {
    jobs_submitted: AtomicU64,
    jobs_deduplicated: AtomicU64,
    renders_succeeded: AtomicU64,
    renders_failed: AtomicU64,
    renders_retried: AtomicU64,
    artifacts_cleaned: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_submitted(&self) {
        self.jobs_submitted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_submitted", "Metric incremented");
    }

    pub fn job_deduplicated(&self) {
        self.jobs_deduplicated.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "jobs_deduplicated", "Metric incremented");
    }

    pub fn render_succeeded(&self) {
        self.renders_succeeded.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "renders_succeeded", "Metric incremented");
    }

    pub fn render_failed(&self) {
        self.renders_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "renders_failed", "Metric incremented");
    }

    pub fn render_retried(&self) {
        self.renders_retried.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "renders_retried", "Metric incremented");
    }

    pub fn artifact_cleaned(&self) {
        self.artifacts_cleaned.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "artifacts_cleaned", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_submitted: self.jobs_submitted.load(Ordering::Relaxed),
            jobs_deduplicated: self.jobs_deduplicated.load(Ordering::Relaxed),
            renders_succeeded: self.renders_succeeded.load(Ordering::Relaxed),
            renders_failed: self.renders_failed.load(Ordering::Relaxed),
            renders_retried: self.renders_retried.load(Ordering::Relaxed),
            artifacts_cleaned: self.artifacts_cleaned.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub jobs_submitted: u64,
    pub jobs_deduplicated: u64,
    pub renders_succeeded: u64,
    pub renders_failed: u64,
    pub renders_retried: u64,
    pub artifacts_cleaned: u64,
}
