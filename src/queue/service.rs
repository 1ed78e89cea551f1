use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::store::{JobOutcome, JobStore, RecoveryStats, StoreError};

use super::models::{ErrorCode, Job, JobStatus, NewJob, SubmitOutcome};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// What the retry policy decided for a transiently failed render.
#[derive(Debug, Clone)]
pub enum RetryDecision {
    /// Budget remains: job is back in `queued`, lock released.
    Retrying(Job),
    /// Attempts exhausted: job is terminally `failed(RENDER_FAILED)`.
    Failed(Job),
}

/// Business logic over the store: owns the job state machine and is its sole
/// writer. Job-level failures never surface as errors here; they materialize
/// as `failed` job rows.
#[derive(Clone)]
pub struct QueueService {
    store: Arc<JobStore>,
}

impl QueueService {
    pub fn new(store: Arc<JobStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Create a job, or return the existing one when the same normalized URL
    /// was already submitted this UTC day (whatever state that job is in,
    /// terminal included).
    pub fn submit(&self, new_job: NewJob) -> Result<SubmitOutcome> {
        let now = Utc::now();
        let date = now.date_naive();

        if let Some(existing) = self.store.find_dedup(&new_job.normalized_url, date)? {
            let job = self.require(&existing)?;
            debug!(job_id = %job.id, url = %new_job.normalized_url, "Submit deduplicated");
            return Ok(SubmitOutcome {
                job,
                deduplicated: true,
            });
        }

        let job = Job {
            id: Uuid::now_v7(),
            url: new_job.url,
            normalized_url: new_job.normalized_url,
            domain_key: new_job.domain_key,
            render_mode: new_job.render_mode,
            status: JobStatus::Queued,
            attempts: 0,
            max_retries: new_job.limits.max_retries,
            navigation_timeout_s: new_job.limits.navigation_timeout_s,
            job_timeout_s: new_job.limits.job_timeout_s,
            max_domain_wait_s: new_job.limits.max_domain_wait_s,
            metadata: new_job.metadata,
            error_code: None,
            error_message: None,
            created_at: now,
            started_at: None,
            finished_at: None,
            artifact_path: None,
        };

        match self.store.insert_job(&job) {
            Ok(()) => {
                info!(job_id = %job.id, domain = %job.domain_key, "Job submitted");
                Ok(SubmitOutcome {
                    job,
                    deduplicated: false,
                })
            }
            // Lost a submit race for the same dedup pair: hand back the winner.
            Err(StoreError::Duplicate { normalized_url, date }) => {
                let existing = self
                    .store
                    .find_dedup(&normalized_url, date)?
                    .ok_or(StoreError::JobNotFound(job.id))?;
                let job = self.require(&existing)?;
                Ok(SubmitOutcome {
                    job,
                    deduplicated: true,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Claim the oldest ready job whose domain is unlocked, marking it
    /// running and taking the lock.
    pub fn claim_next(&self) -> Result<Option<Job>> {
        Ok(self.store.claim_next(Utc::now())?)
    }

    /// Fail over-aged `waiting_domain_lock` jobs. Runs alongside each claim
    /// poll.
    pub fn sweep_wait_timeouts(&self) -> Result<Vec<Job>> {
        Ok(self.store.sweep_wait_timeouts(Utc::now())?)
    }

    /// Count a render attempt against the job's budget.
    pub fn record_attempt(&self, job_id: &Uuid) -> Result<u32> {
        Ok(self.store.bump_attempt(job_id)?)
    }

    pub fn complete(&self, job_id: &Uuid, artifact_path: PathBuf) -> Result<Job> {
        Ok(self
            .store
            .finish_job(job_id, JobOutcome::Succeeded { artifact_path })?)
    }

    pub fn fail(&self, job_id: &Uuid, code: ErrorCode, message: String) -> Result<Job> {
        Ok(self
            .store
            .finish_job(job_id, JobOutcome::Failed { code, message })?)
    }

    /// Apply the retry policy after a transient render failure: requeue while
    /// attempts remain, otherwise fail terminally with `RENDER_FAILED`.
    pub fn retry_or_fail(&self, job_id: &Uuid, message: &str) -> Result<RetryDecision> {
        let job = self.require(job_id)?;
        if job.attempts <= job.max_retries {
            let job = self.store.release_for_retry(job_id)?;
            info!(
                job_id = %job.id,
                attempts = job.attempts,
                max_retries = job.max_retries,
                "Transient failure, retrying"
            );
            Ok(RetryDecision::Retrying(job))
        } else {
            let job = self.fail(job_id, ErrorCode::RenderFailed, message.to_string())?;
            info!(job_id = %job.id, attempts = job.attempts, "Render attempts exhausted");
            Ok(RetryDecision::Failed(job))
        }
    }

    pub fn get_job(&self, job_id: &Uuid) -> Result<Option<Job>> {
        Ok(self.store.get_job(job_id)?)
    }

    /// Artifacts of succeeded jobs older than `max_age`.
    pub fn stale_artifacts(&self, max_age: Duration) -> Result<Vec<(Uuid, PathBuf)>> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::zero());
        Ok(self.store.list_stale_artifacts(cutoff)?)
    }

    pub fn forget_artifact(&self, job_id: &Uuid) -> Result<()> {
        Ok(self.store.forget_artifact(job_id)?)
    }

    /// Startup sweep over dangling `running` jobs and stale locks.
    pub fn recover(&self) -> Result<RecoveryStats> {
        Ok(self.store.recover()?)
    }

    fn require(&self, job_id: &Uuid) -> Result<Job> {
        Ok(self
            .store
            .get_job(job_id)?
            .ok_or(StoreError::JobNotFound(*job_id))?)
    }
}
