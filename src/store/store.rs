use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::queue::models::{DomainLock, ErrorCode, Job, JobStatus};

use super::error::{Result, StoreError};
use super::partitions::{
    decode_dedup_value, decode_pending_value, encode_dedup_key, encode_job_key,
    encode_lock_key, encode_pending_key,
};

/// Terminal outcome handed to [`JobStore::finish_job`].
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Succeeded { artifact_path: std::path::PathBuf },
    Failed { code: ErrorCode, message: String },
}

/// Counts reported by the startup recovery sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryStats {
    pub jobs_requeued: usize,
    pub locks_released: usize,
}

/// Fjall-backed persistent storage for jobs, domain locks, and the dedup and
/// claim indexes.
///
/// All mutating operations run under a single write gate, which is what makes
/// `claim_next` and `finish_job` serializable with respect to each other.
/// Multi-key updates go through fjall batches so a crash never leaves a lock
/// row disagreeing with its job row.
#[derive(Clone)]
pub struct JobStore {
    keyspace: Keyspace,
    jobs: PartitionHandle,
    dedup: PartitionHandle,
    locks: PartitionHandle,
    pending: PartitionHandle,
    write_gate: std::sync::Arc<Mutex<()>>,
}

impl JobStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening job store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;

        let jobs = keyspace.open_partition("jobs", PartitionCreateOptions::default())?;
        let dedup = keyspace.open_partition("dedup", PartitionCreateOptions::default())?;
        let locks = keyspace.open_partition("locks", PartitionCreateOptions::default())?;
        let pending = keyspace.open_partition("pending", PartitionCreateOptions::default())?;

        info!("Job store opened");
        Ok(Self {
            keyspace,
            jobs,
            dedup,
            locks,
            pending,
            write_gate: std::sync::Arc::new(Mutex::new(())),
        })
    }

    /// Get a job by id
    pub fn get_job(&self, job_id: &Uuid) -> Result<Option<Job>> {
        match self.jobs.get(encode_job_key(job_id))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn get_job_required(&self, job_id: &Uuid) -> Result<Job> {
        self.get_job(job_id)?
            .ok_or(StoreError::JobNotFound(*job_id))
    }

    /// Look up an existing job id for `(normalized_url, date)`
    pub fn find_dedup(&self, normalized_url: &str, date: NaiveDate) -> Result<Option<Uuid>> {
        match self.dedup.get(encode_dedup_key(date, normalized_url))? {
            Some(value) => Ok(decode_dedup_value(&value)),
            None => Ok(None),
        }
    }

    /// Insert a freshly created job, registering its dedup key and claim
    /// index entry. Fails with [`StoreError::Duplicate`] if the dedup pair is
    /// already taken.
    pub fn insert_job(&self, job: &Job) -> Result<()> {
        let _gate = self.write_gate.lock();

        let date = job.dedup_date();
        if self.find_dedup(&job.normalized_url, date)?.is_some() {
            return Err(StoreError::Duplicate {
                normalized_url: job.normalized_url.clone(),
                date,
            });
        }

        let mut batch = self.keyspace.batch();
        batch.insert(&self.jobs, encode_job_key(&job.id), serde_json::to_vec(job)?);
        batch.insert(
            &self.dedup,
            encode_dedup_key(date, &job.normalized_url),
            job.id.to_string().as_bytes(),
        );
        batch.insert(
            &self.pending,
            encode_pending_key(job.created_at.timestamp_millis(), &job.id),
            job.id.to_string().as_bytes(),
        );
        batch.commit()?;

        debug!(job_id = %job.id, domain = %job.domain_key, "Job inserted");
        Ok(())
    }

    /// Atomically claim the oldest ready job whose domain lock is free.
    ///
    /// Queued jobs whose lock is busy are demoted to `waiting_domain_lock` in
    /// passing. Over-aged waiting jobs are left for
    /// [`JobStore::sweep_wait_timeouts`].
    pub fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<Job>> {
        let _gate = self.write_gate.lock();

        for entry in self.pending_entries()? {
            let (pending_key, job_id) = entry;
            let mut job = match self.get_job(&job_id)? {
                Some(job) => job,
                None => {
                    warn!(%job_id, "Pending index entry without job row, dropping");
                    self.pending.remove(pending_key)?;
                    continue;
                }
            };

            match job.status {
                JobStatus::Queued | JobStatus::WaitingDomainLock => {}
                // Stale index entry (job finished through another path).
                _ => {
                    self.pending.remove(pending_key)?;
                    continue;
                }
            }

            if job.status == JobStatus::WaitingDomainLock && self.wait_expired(&job, now) {
                continue;
            }

            let lock = self.read_lock(&job.domain_key)?;
            let free = lock.as_ref().map(DomainLock::is_free).unwrap_or(true);

            if !free {
                if job.status == JobStatus::Queued {
                    job.status = JobStatus::WaitingDomainLock;
                    self.jobs
                        .insert(encode_job_key(&job.id), serde_json::to_vec(&job)?)?;
                    debug!(job_id = %job.id, domain = %job.domain_key, "Domain busy, job waiting");
                }
                continue;
            }

            job.status = JobStatus::Running;
            job.started_at = Some(now);

            let mut batch = self.keyspace.batch();
            batch.insert(
                &self.locks,
                encode_lock_key(&job.domain_key),
                serde_json::to_vec(&DomainLock {
                    domain_key: job.domain_key.clone(),
                    held_by_job_id: Some(job.id),
                    acquired_at: Some(now),
                })?,
            );
            batch.insert(&self.jobs, encode_job_key(&job.id), serde_json::to_vec(&job)?);
            batch.remove(&self.pending, pending_key);
            batch.commit()?;

            debug!(job_id = %job.id, domain = %job.domain_key, "Job claimed");
            return Ok(Some(job));
        }

        Ok(None)
    }

    /// Demote a queued job to `waiting_domain_lock`.
    pub fn mark_waiting(&self, job_id: &Uuid) -> Result<()> {
        let _gate = self.write_gate.lock();

        let mut job = self.get_job_required(job_id)?;
        if job.status != JobStatus::Queued {
            return Err(StoreError::UnexpectedStatus {
                job_id: *job_id,
                status: job.status,
                expected: JobStatus::Queued,
            });
        }
        job.status = JobStatus::WaitingDomainLock;
        self.jobs.insert(encode_job_key(job_id), serde_json::to_vec(&job)?)?;
        Ok(())
    }

    /// Move a job into a terminal state, release its domain lock, and stamp
    /// `finished_at`. Atomic.
    pub fn finish_job(&self, job_id: &Uuid, outcome: JobOutcome) -> Result<Job> {
        let _gate = self.write_gate.lock();
        self.finish_job_locked(job_id, outcome, Utc::now())
    }

    fn finish_job_locked(
        &self,
        job_id: &Uuid,
        outcome: JobOutcome,
        now: DateTime<Utc>,
    ) -> Result<Job> {
        let mut job = self.get_job_required(job_id)?;
        if job.status.is_terminal() {
            return Err(StoreError::TerminalTransition {
                job_id: *job_id,
                status: job.status,
            });
        }

        match outcome {
            JobOutcome::Succeeded { artifact_path } => {
                job.status = JobStatus::Succeeded;
                job.artifact_path = Some(artifact_path);
                job.error_code = None;
                job.error_message = None;
            }
            JobOutcome::Failed { code, message } => {
                job.status = JobStatus::Failed;
                job.artifact_path = None;
                job.error_code = Some(code);
                job.error_message = Some(message);
            }
        }
        job.finished_at = Some(now);

        let mut batch = self.keyspace.batch();
        batch.insert(&self.jobs, encode_job_key(job_id), serde_json::to_vec(&job)?);
        batch.remove(
            &self.pending,
            encode_pending_key(job.created_at.timestamp_millis(), job_id),
        );
        self.release_lock_in_batch(&mut batch, &job.domain_key, job_id)?;
        batch.commit()?;

        debug!(job_id = %job.id, status = job.status.as_str(), "Job finished");
        Ok(job)
    }

    /// Increment the attempt counter; returns the new count.
    pub fn bump_attempt(&self, job_id: &Uuid) -> Result<u32> {
        let _gate = self.write_gate.lock();

        let mut job = self.get_job_required(job_id)?;
        job.attempts += 1;
        self.jobs.insert(encode_job_key(job_id), serde_json::to_vec(&job)?)?;
        Ok(job.attempts)
    }

    /// Return a running job to `queued` after a transient failure, releasing
    /// its domain lock so other domains can progress. The job keeps its
    /// original `created_at` and therefore its place in claim order.
    pub fn release_for_retry(&self, job_id: &Uuid) -> Result<Job> {
        let _gate = self.write_gate.lock();

        let mut job = self.get_job_required(job_id)?;
        if job.status != JobStatus::Running {
            return Err(StoreError::UnexpectedStatus {
                job_id: *job_id,
                status: job.status,
                expected: JobStatus::Running,
            });
        }

        job.status = JobStatus::Queued;

        let mut batch = self.keyspace.batch();
        batch.insert(&self.jobs, encode_job_key(job_id), serde_json::to_vec(&job)?);
        batch.insert(
            &self.pending,
            encode_pending_key(job.created_at.timestamp_millis(), job_id),
            job_id.to_string().as_bytes(),
        );
        self.release_lock_in_batch(&mut batch, &job.domain_key, job_id)?;
        batch.commit()?;

        debug!(job_id = %job.id, attempts = job.attempts, "Job released for retry");
        Ok(job)
    }

    /// Fail every `waiting_domain_lock` job that has exceeded its
    /// `max_domain_wait_s`. Returns the failed jobs.
    pub fn sweep_wait_timeouts(&self, now: DateTime<Utc>) -> Result<Vec<Job>> {
        let _gate = self.write_gate.lock();

        let mut failed = Vec::new();
        for (_key, job_id) in self.pending_entries()? {
            let Some(job) = self.get_job(&job_id)? else {
                continue;
            };
            if job.status == JobStatus::WaitingDomainLock && self.wait_expired(&job, now) {
                let job = self.finish_job_locked(
                    &job_id,
                    JobOutcome::Failed {
                        code: ErrorCode::DomainWaitTimeout,
                        message: format!(
                            "domain lock not acquired within {}s",
                            job.max_domain_wait_s
                        ),
                    },
                    now,
                )?;
                info!(job_id = %job.id, domain = %job.domain_key, "Domain wait timed out");
                failed.push(job);
            }
        }
        Ok(failed)
    }

    /// Succeeded jobs whose artifact is older than `cutoff` and still
    /// recorded. Returns `(job_id, artifact_path)` pairs.
    pub fn list_stale_artifacts(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<(Uuid, std::path::PathBuf)>> {
        let mut stale = Vec::new();
        for item in self.jobs.iter() {
            let (_key, value) = item?;
            let job: Job = serde_json::from_slice(&value)?;
            if job.status != JobStatus::Succeeded {
                continue;
            }
            let (Some(finished_at), Some(path)) = (job.finished_at, job.artifact_path) else {
                continue;
            };
            if finished_at < cutoff {
                stale.push((job.id, path));
            }
        }
        Ok(stale)
    }

    /// Clear `artifact_path` after the file has been deleted.
    pub fn forget_artifact(&self, job_id: &Uuid) -> Result<()> {
        let _gate = self.write_gate.lock();

        let mut job = self.get_job_required(job_id)?;
        job.artifact_path = None;
        self.jobs.insert(encode_job_key(job_id), serde_json::to_vec(&job)?)?;
        debug!(%job_id, "Artifact forgotten");
        Ok(())
    }

    /// Startup sweep: the single worker crashed mid-render if any job is
    /// still `running`, so re-queue it and release its lock. Locks whose
    /// holder is not running are cleared as well.
    pub fn recover(&self) -> Result<RecoveryStats> {
        let _gate = self.write_gate.lock();

        let mut stats = RecoveryStats::default();

        let mut dangling = Vec::new();
        for item in self.jobs.iter() {
            let (_key, value) = item?;
            let job: Job = serde_json::from_slice(&value)?;
            if job.status == JobStatus::Running {
                dangling.push(job);
            }
        }

        for mut job in dangling {
            job.status = JobStatus::Queued;

            let mut batch = self.keyspace.batch();
            batch.insert(&self.jobs, encode_job_key(&job.id), serde_json::to_vec(&job)?);
            batch.insert(
                &self.pending,
                encode_pending_key(job.created_at.timestamp_millis(), &job.id),
                job.id.to_string().as_bytes(),
            );
            batch.commit()?;

            info!(job_id = %job.id, "Requeued dangling running job");
            stats.jobs_requeued += 1;
        }

        // Any lock still held now points at a non-running job.
        let mut held = Vec::new();
        for item in self.locks.iter() {
            let (key, value) = item?;
            let lock: DomainLock = serde_json::from_slice(&value)?;
            if !lock.is_free() {
                held.push((key.to_vec(), lock));
            }
        }
        for (key, lock) in held {
            self.locks.insert(
                key,
                serde_json::to_vec(&DomainLock::free(lock.domain_key.clone()))?,
            )?;
            info!(domain = %lock.domain_key, "Released stale domain lock");
            stats.locks_released += 1;
        }

        if stats != RecoveryStats::default() {
            info!(
                requeued = stats.jobs_requeued,
                locks = stats.locks_released,
                "Startup recovery applied"
            );
        }
        Ok(stats)
    }

    /// Health check - verify the keyspace is readable
    pub fn health_check(&self) -> Result<()> {
        let _ = self.jobs.get(b"job:health")?;
        Ok(())
    }

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    /// Read the lock row for a domain (None = never locked).
    pub fn get_lock(&self, domain_key: &str) -> Result<Option<DomainLock>> {
        self.read_lock(domain_key)
    }

    fn read_lock(&self, domain_key: &str) -> Result<Option<DomainLock>> {
        match self.locks.get(encode_lock_key(domain_key))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn release_lock_in_batch(
        &self,
        batch: &mut fjall::Batch,
        domain_key: &str,
        job_id: &Uuid,
    ) -> Result<()> {
        if let Some(lock) = self.read_lock(domain_key)? {
            if lock.held_by_job_id == Some(*job_id) {
                batch.insert(
                    &self.locks,
                    encode_lock_key(domain_key),
                    serde_json::to_vec(&DomainLock::free(domain_key))?,
                );
            }
        }
        Ok(())
    }

    fn wait_expired(&self, job: &Job, now: DateTime<Utc>) -> bool {
        let waited = now.signed_duration_since(job.created_at);
        waited.num_seconds() > job.max_domain_wait_s as i64
    }

    /// Snapshot the pending index in claim order.
    fn pending_entries(&self) -> Result<Vec<(Vec<u8>, Uuid)>> {
        let mut entries = Vec::new();
        for item in self.pending.iter() {
            let (key, value) = item?;
            if let Some(job_id) = decode_pending_value(&value) {
                entries.push((key.to_vec(), job_id));
            }
        }
        Ok(entries)
    }
}
