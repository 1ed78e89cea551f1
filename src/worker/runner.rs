//! The render loop and the artifact cleanup sweep

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::observability::Metrics;
use crate::queue::models::{ErrorCode, Job};
use crate::queue::{QueueError, QueueService, RetryDecision};
use crate::safety;

use super::renderer::{RenderError, Renderer};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("artifact I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WorkerError>;

/// Worker configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub storage_root: PathBuf,
    pub poll_interval: Duration,
    pub cleanup_interval: Duration,
    pub cleanup_file_age: Duration,
}

/// The single render worker. One job in flight at a time; claim order and
/// per-domain exclusion are the store's business, rendering and artifact
/// handling are this loop's.
pub struct Runner {
    queue: QueueService,
    renderer: Arc<dyn Renderer>,
    config: RunnerConfig,
    metrics: Arc<Metrics>,
}

impl Runner {
    pub fn new(
        queue: QueueService,
        renderer: Arc<dyn Renderer>,
        config: RunnerConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            queue,
            renderer,
            config,
            metrics,
        }
    }

    /// Render loop: recover, then sweep + claim + process until shutdown.
    ///
    /// Store faults are logged and the loop keeps polling; an in-flight job
    /// stays `running` and is reclaimed by the next startup recovery.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        match self.queue.recover() {
            Ok(stats) => {
                if stats.jobs_requeued > 0 || stats.locks_released > 0 {
                    info!(
                        requeued = stats.jobs_requeued,
                        locks_released = stats.locks_released,
                        "Recovered dangling state from previous run"
                    );
                }
            }
            Err(e) => error!(error = %e, "Startup recovery failed"),
        }

        info!(poll_interval = ?self.config.poll_interval, "Render loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.run_once().await {
                // Processed a job: poll again immediately, more may be ready.
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => error!(error = %e, "Render loop iteration failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }

        info!("Render loop stopped");
    }

    /// One iteration: sweep over-aged waiters, then claim and process at most
    /// one job. Returns whether a job was processed.
    pub async fn run_once(&self) -> Result<bool> {
        for job in self.queue.sweep_wait_timeouts()? {
            warn!(job_id = %job.id, domain = %job.domain_key, "Job failed waiting for domain lock");
        }

        let Some(job) = self.queue.claim_next()? else {
            return Ok(false);
        };
        self.process(job).await?;
        Ok(true)
    }

    async fn process(&self, job: Job) -> Result<()> {
        let job_id = job.id;
        info!(%job_id, url = %job.url, attempts = job.attempts, "Processing job");

        // The URL was vetted at submit time, but rules may have changed since
        // and rows predating a policy tightening must not render.
        if let Err(reason) = safety::validate(&job.url) {
            let code = if reason.is_ssrf() {
                ErrorCode::SsrfBlocked
            } else {
                ErrorCode::InvalidUrl
            };
            warn!(%job_id, error = %reason, "URL rejected at render time");
            self.queue.fail(&job_id, code, reason.to_string())?;
            self.metrics.render_failed();
            return Ok(());
        }

        self.queue.record_attempt(&job_id)?;

        // Overall deadline runs from started_at, so requeue delays and the
        // render itself share one budget.
        let started_at = job.started_at.unwrap_or_else(Utc::now);
        let deadline = started_at + chrono::Duration::seconds(job.job_timeout_s as i64);
        let remaining = (deadline - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);

        let navigation_timeout = Duration::from_secs(job.navigation_timeout_s);
        let render = self
            .renderer
            .render(&job.url, job.render_mode, navigation_timeout);

        match tokio::time::timeout(remaining, render).await {
            Ok(Ok(bytes)) => {
                let path = self.write_artifact(&job_id, &bytes).await?;
                let job = self.queue.complete(&job_id, path)?;
                self.metrics.render_succeeded();
                info!(%job_id, attempts = job.attempts, size = bytes.len(), "Render succeeded");
            }
            Ok(Err(RenderError::Permanent(message))) => {
                warn!(%job_id, %message, "Permanent render failure");
                self.queue
                    .fail(&job_id, ErrorCode::RenderFailed, message)?;
                self.metrics.render_failed();
            }
            Ok(Err(RenderError::Transient(message))) => {
                self.handle_transient(&job_id, &message)?;
            }
            Err(_elapsed) => {
                let message = format!("job timeout after {}s", job.job_timeout_s);
                self.handle_transient(&job_id, &message)?;
            }
        }

        Ok(())
    }

    fn handle_transient(&self, job_id: &Uuid, message: &str) -> Result<()> {
        warn!(%job_id, %message, "Transient render failure");
        match self.queue.retry_or_fail(job_id, message)? {
            RetryDecision::Retrying(_) => self.metrics.render_retried(),
            RetryDecision::Failed(_) => self.metrics.render_failed(),
        }
        Ok(())
    }

    /// Write to a temp name, then rename: a crash never leaves a partial PDF
    /// at the published path.
    async fn write_artifact(&self, job_id: &Uuid, bytes: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.config.storage_root).await?;

        let final_path = self.config.storage_root.join(format!("{job_id}.pdf"));
        let temp_path = self.config.storage_root.join(format!("{job_id}.pdf.tmp"));

        tokio::fs::write(&temp_path, bytes).await?;
        tokio::fs::rename(&temp_path, &final_path).await?;

        Ok(final_path)
    }

    /// Cleanup loop: every `cleanup_interval`, delete artifacts older than
    /// `cleanup_file_age` and clear their job rows.
    pub async fn run_cleanup(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval = ?self.config.cleanup_interval,
            file_age = ?self.config.cleanup_file_age,
            "Cleanup loop started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.cleanup_interval) => {}
                _ = shutdown.changed() => {}
            }
            if *shutdown.borrow() {
                break;
            }

            match self.cleanup_once().await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "Cleanup sweep removed artifacts"),
                Err(e) => error!(error = %e, "Cleanup sweep failed"),
            }
        }

        info!("Cleanup loop stopped");
    }

    /// One cleanup sweep. Missing files are tolerated; deletion failures keep
    /// the row so the next sweep retries.
    pub async fn cleanup_once(&self) -> Result<usize> {
        let stale = self.queue.stale_artifacts(self.config.cleanup_file_age)?;
        let mut removed = 0;

        for (job_id, path) in stale {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    self.queue.forget_artifact(&job_id)?;
                    self.metrics.artifact_cleaned();
                    removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    self.queue.forget_artifact(&job_id)?;
                }
                Err(e) => {
                    warn!(%job_id, path = %path.display(), error = %e, "Failed to delete artifact");
                }
            }
        }

        Ok(removed)
    }
}
