use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::queue::models::JobStatus;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("job not found: {0}")]
    JobNotFound(Uuid),

    #[error("duplicate job for {normalized_url} on {date}")]
    Duplicate {
        normalized_url: String,
        date: NaiveDate,
    },

    #[error("job {job_id} cannot leave terminal state {status:?}")]
    TerminalTransition { job_id: Uuid, status: JobStatus },

    #[error("job {job_id} is {status:?}, expected {expected:?}")]
    UnexpectedStatus {
        job_id: Uuid,
        status: JobStatus,
        expected: JobStatus,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
