use axum::{Json, extract::State, http::HeaderMap, response::IntoResponse};
use http_body_util::BodyExt;
use tracing::debug;

use super::{
    models::{HealthResponse, JobAcceptedResponse, JobView, SubmitJobRequest},
    state::AppState,
};
use crate::api::error::ApiError;
use crate::queue::models::{JobStatus, NewJob};
use crate::safety;

/// Submit bodies are small JSON documents; the cap only guards against junk.
const MAX_PAYLOAD_SIZE: usize = 256 * 1024;

/// Job submission endpoint (POST /v1/pdf-jobs)
///
/// ## Flow:
/// 1. Validate Content-Type, read body under the size cap
/// 2. Deserialize the job spec
/// 3. Vet the URL (SSRF + normalization); rejected URLs create no job row
/// 4. Resolve per-job bounds (defaults + clamping)
/// 5. Hand to the queue service: same-day resubmits of the same normalized
///    URL return the existing job with `deduplicated: true`
/// 6. Return 202 Accepted
pub async fn submit_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;
    super::utils::parse_content_type(content_type)?;

    let body_bytes = read_body(body).await?;
    let request: SubmitJobRequest = serde_json::from_slice(&body_bytes)?;

    // Vetting happens before anything touches the store; a blocked URL must
    // leave no trace.
    let validated = safety::validate(&request.url)?;

    let limits = state.config.job_defaults().with_overrides(
        request.navigation_timeout_seconds,
        request.job_timeout_seconds,
        request.max_domain_wait_seconds,
        request.max_retries,
    );
    let render_mode = request
        .render_mode
        .unwrap_or(state.config.renderer.default_mode);

    let outcome = state.queue.submit(NewJob {
        url: request.url,
        normalized_url: validated.normalized_url,
        domain_key: validated.domain_key,
        render_mode,
        limits,
        metadata: request.metadata,
    })?;

    if outcome.deduplicated {
        state.metrics.job_deduplicated();
    } else {
        state.metrics.job_submitted();
    }

    debug!(
        job_id = %outcome.job.id,
        deduplicated = outcome.deduplicated,
        "Submit accepted"
    );

    let response = JobAcceptedResponse {
        job_id: outcome.job.id,
        status: outcome.job.status,
        deduplicated: outcome.deduplicated,
    };

    Ok((axum::http::StatusCode::ACCEPTED, Json(response)))
}

/// Reads request body and validates size
///
/// Decompression is handled by the RequestDecompressionLayer middleware, so
/// this receives already-decompressed data.
async fn read_body(body: axum::body::Body) -> Result<Vec<u8>, ApiError> {
    let data = body
        .collect()
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?
        .to_bytes()
        .to_vec();

    super::utils::validate_body_size(&data, MAX_PAYLOAD_SIZE)?;

    Ok(data)
}

/// Job status endpoint (GET /v1/pdf-jobs/{job_id})
pub async fn get_job(
    State(state): State<AppState>,
    axum::extract::Path(job_id): axum::extract::Path<uuid::Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .queue
        .get_job(&job_id)?
        .ok_or_else(|| ApiError::NotFound(format!("job {job_id}")))?;

    Ok((
        axum::http::StatusCode::OK,
        Json(JobView::from_job(job, false)),
    ))
}

/// Artifact download endpoint (GET /v1/pdf-jobs/{job_id}/file)
///
/// Only `succeeded` jobs have a PDF; anything else is 400 with the current
/// status. A succeeded job whose artifact has been reaped answers 404.
pub async fn download_file(
    State(state): State<AppState>,
    axum::extract::Path(job_id): axum::extract::Path<uuid::Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .queue
        .get_job(&job_id)?
        .ok_or_else(|| ApiError::NotFound(format!("job {job_id}")))?;

    if job.status != JobStatus::Succeeded {
        return Err(ApiError::JobNotReady(job.status.as_str().to_string()));
    }

    let path = job.artifact_path.ok_or(ApiError::ArtifactCleaned)?;

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::ArtifactCleaned);
        }
        Err(e) => return Err(ApiError::Internal(e.to_string())),
    };

    let headers = [
        (axum::http::header::CONTENT_TYPE, "application/pdf".to_string()),
        (
            axum::http::header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{job_id}.pdf\""),
        ),
    ];

    Ok((axum::http::StatusCode::OK, headers, bytes))
}

/// Health check endpoint (GET /healthz)
///
/// Reports per-component health; 503 when any component is down.
pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    use std::collections::HashMap;

    let mut components = HashMap::new();

    components.insert("api".to_string(), "healthy".to_string());
    components.insert(
        "store".to_string(),
        match state.store.health_check() {
            Ok(()) => "healthy".to_string(),
            Err(_) => "unhealthy".to_string(),
        },
    );

    let all_healthy = components.values().all(|status| status == "healthy");
    let (overall_status, status_code) = if all_healthy {
        ("healthy", axum::http::StatusCode::OK)
    } else {
        ("unhealthy", axum::http::StatusCode::SERVICE_UNAVAILABLE)
    };

    let response = HealthResponse {
        status: overall_status.to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response))
}
