//! Job domain model: the durable entities and their vocabulary types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use uuid::Uuid;

/// Clamp range for per-job navigation timeout (seconds).
pub const NAVIGATION_TIMEOUT_RANGE_S: (u64, u64) = (5, 300);
/// Clamp range for per-job overall deadline (seconds).
pub const JOB_TIMEOUT_RANGE_S: (u64, u64) = (10, 600);
/// Clamp range for the bounded domain-lock wait (seconds).
pub const MAX_DOMAIN_WAIT_RANGE_S: (u64, u64) = (10, 3600);
/// Clamp range for render retries.
pub const MAX_RETRIES_RANGE: (u32, u32) = (0, 5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    WaitingDomainLock,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::WaitingDomainLock => "waiting_domain_lock",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    PrintToPdf,
    ScreenshotToPdf,
}

impl RenderMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderMode::PrintToPdf => "print_to_pdf",
            RenderMode::ScreenshotToPdf => "screenshot_to_pdf",
        }
    }
}

impl std::str::FromStr for RenderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "print_to_pdf" => Ok(RenderMode::PrintToPdf),
            "screenshot_to_pdf" => Ok(RenderMode::ScreenshotToPdf),
            other => Err(format!("unknown render mode: {other}")),
        }
    }
}

/// Terminal error taxonomy, surfaced on failed jobs and at the HTTP edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidUrl,
    SsrfBlocked,
    DomainWaitTimeout,
    RenderFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidUrl => "INVALID_URL",
            ErrorCode::SsrfBlocked => "SSRF_BLOCKED",
            ErrorCode::DomainWaitTimeout => "DOMAIN_WAIT_TIMEOUT",
            ErrorCode::RenderFailed => "RENDER_FAILED",
        }
    }
}

/// Per-job execution bounds, already clamped to their allowed ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLimits {
    pub navigation_timeout_s: u64,
    pub job_timeout_s: u64,
    pub max_domain_wait_s: u64,
    pub max_retries: u32,
}

impl JobLimits {
    /// Apply caller overrides on top of these defaults, clamping each value
    /// into its allowed range.
    pub fn with_overrides(
        &self,
        navigation_timeout_s: Option<u64>,
        job_timeout_s: Option<u64>,
        max_domain_wait_s: Option<u64>,
        max_retries: Option<u32>,
    ) -> JobLimits {
        JobLimits {
            navigation_timeout_s: navigation_timeout_s
                .unwrap_or(self.navigation_timeout_s)
                .clamp(NAVIGATION_TIMEOUT_RANGE_S.0, NAVIGATION_TIMEOUT_RANGE_S.1),
            job_timeout_s: job_timeout_s
                .unwrap_or(self.job_timeout_s)
                .clamp(JOB_TIMEOUT_RANGE_S.0, JOB_TIMEOUT_RANGE_S.1),
            max_domain_wait_s: max_domain_wait_s
                .unwrap_or(self.max_domain_wait_s)
                .clamp(MAX_DOMAIN_WAIT_RANGE_S.0, MAX_DOMAIN_WAIT_RANGE_S.1),
            max_retries: max_retries
                .unwrap_or(self.max_retries)
                .clamp(MAX_RETRIES_RANGE.0, MAX_RETRIES_RANGE.1),
        }
    }
}

/// One unit of conversion work. Created on submit, mutated only by the queue
/// service, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    /// Submitted URL, stored verbatim for audit.
    pub url: String,
    /// Canonical form used for same-day dedup.
    pub normalized_url: String,
    /// Registrable domain (eTLD+1), the per-domain lock key.
    pub domain_key: String,
    pub render_mode: RenderMode,
    pub status: JobStatus,
    /// Render attempts made so far. At most `max_retries + 1`.
    pub attempts: u32,
    pub max_retries: u32,
    pub navigation_timeout_s: u64,
    pub job_timeout_s: u64,
    pub max_domain_wait_s: u64,
    /// Opaque caller blob, preserved but never interpreted.
    pub metadata: Option<Value>,
    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub artifact_path: Option<PathBuf>,
}

impl Job {
    /// Calendar day half of the dedup key.
    pub fn dedup_date(&self) -> NaiveDate {
        self.created_at.date_naive()
    }
}

/// A per-domain mutex row. Free when `held_by_job_id` is null.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainLock {
    pub domain_key: String,
    pub held_by_job_id: Option<Uuid>,
    pub acquired_at: Option<DateTime<Utc>>,
}

impl DomainLock {
    pub fn free(domain_key: impl Into<String>) -> Self {
        Self {
            domain_key: domain_key.into(),
            held_by_job_id: None,
            acquired_at: None,
        }
    }

    pub fn is_free(&self) -> bool {
        self.held_by_job_id.is_none()
    }
}

/// Validated submit input, produced by the API edge from a request body.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub url: String,
    pub normalized_url: String,
    pub domain_key: String,
    pub render_mode: RenderMode,
    pub limits: JobLimits,
    pub metadata: Option<Value>,
}

/// What `submit` hands back: the job (new or pre-existing) plus whether the
/// dedup path was taken.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub job: Job,
    pub deduplicated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> JobLimits {
        JobLimits {
            navigation_timeout_s: 45,
            job_timeout_s: 120,
            max_domain_wait_s: 600,
            max_retries: 2,
        }
    }

    #[test]
    fn overrides_default_when_absent() {
        let limits = defaults().with_overrides(None, None, None, None);
        assert_eq!(limits, defaults());
    }

    #[test]
    fn overrides_are_clamped() {
        let limits = defaults().with_overrides(Some(1), Some(10_000), Some(1), Some(99));
        assert_eq!(limits.navigation_timeout_s, 5);
        assert_eq!(limits.job_timeout_s, 600);
        assert_eq!(limits.max_domain_wait_s, 10);
        assert_eq!(limits.max_retries, 5);
    }

    #[test]
    fn in_range_overrides_pass_through() {
        let limits = defaults().with_overrides(Some(30), Some(240), Some(120), Some(0));
        assert_eq!(limits.navigation_timeout_s, 30);
        assert_eq!(limits.job_timeout_s, 240);
        assert_eq!(limits.max_domain_wait_s, 120);
        assert_eq!(limits.max_retries, 0);
    }

    #[test]
    fn error_codes_serialize_screaming() {
        let json = serde_json::to_string(&ErrorCode::DomainWaitTimeout).unwrap();
        assert_eq!(json, "\"DOMAIN_WAIT_TIMEOUT\"");
        assert_eq!(ErrorCode::SsrfBlocked.as_str(), "SSRF_BLOCKED");
    }

    #[test]
    fn status_terminality() {
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::WaitingDomainLock.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn render_mode_round_trips_config_names() {
        assert_eq!("print_to_pdf".parse::<RenderMode>().unwrap(), RenderMode::PrintToPdf);
        assert_eq!(
            "screenshot_to_pdf".parse::<RenderMode>().unwrap(),
            RenderMode::ScreenshotToPdf
        );
        assert!("pdf".parse::<RenderMode>().is_err());
    }
}
