//! API models for the PagePress job endpoints.
//!
//! The external contract:
//! - `POST /v1/pdf-jobs` accepts a [`SubmitJobRequest`] and answers 202 with
//!   a [`JobAcceptedResponse`] (whether freshly created or deduplicated)
//! - `GET /v1/pdf-jobs/{job_id}` returns a [`JobView`]
//! - `GET /v1/pdf-jobs/{job_id}/file` streams the finished PDF
//!
//! A submit body looks like:
//!
//! ```json
//! {
//!   "url": "https://example.com/report",
//!   "render_mode": "print_to_pdf",
//!   "navigation_timeout_seconds": 45,
//!   "job_timeout_seconds": 120,
//!   "max_domain_wait_seconds": 600,
//!   "max_retries": 2,
//!   "metadata": {"requested_by": "billing"}
//! }
//! ```
//!
//! Everything except `url` is optional; absent bounds take configured
//! defaults and all bounds are clamped into their allowed ranges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::queue::models::{ErrorCode, Job, JobStatus, RenderMode};

#[derive(Debug, Deserialize, Clone)]
pub struct SubmitJobRequest {
    pub url: String,
    #[serde(default)]
    pub render_mode: Option<RenderMode>,
    #[serde(default)]
    pub navigation_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub job_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub max_domain_wait_seconds: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JobAcceptedResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub deduplicated: bool,
}

/// Full job state as reported to clients. Timestamps are ISO-8601 UTC.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JobView {
    pub job_id: Uuid,
    pub url: String,
    pub render_mode: RenderMode,
    pub status: JobStatus,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,
    pub metadata: Option<Value>,
    /// True only on submit responses that hit the same-day dedup path.
    pub deduplicated: bool,
}

impl JobView {
    pub fn from_job(job: Job, deduplicated: bool) -> Self {
        Self {
            job_id: job.id,
            url: job.url,
            render_mode: job.render_mode,
            status: job.status,
            attempts: job.attempts,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            error_code: job.error_code,
            error_message: job.error_message,
            metadata: job.metadata,
            deduplicated,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
}
