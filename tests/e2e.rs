//! End-to-end scenario tests for PagePress
//!
//! These drive the production router and the worker loops against a shared
//! store, with a scripted renderer standing in for the headless-browser
//! sidecar. Each test follows one of the externally observable flows: submit,
//! serialize per domain, retry, clean up, recover after restart.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use pagepress::api::state::AppState;
use pagepress::config::Config;
use pagepress::observability::Metrics;
use pagepress::queue::QueueService;
use pagepress::queue::models::{ErrorCode, Job, JobStatus, RenderMode};
use pagepress::store::JobStore;
use pagepress::worker::{RenderError, Renderer, Runner, RunnerConfig};

/// Renderer scripted per URL; unscripted URLs render successfully.
struct MockRenderer {
    scripts: Mutex<HashMap<String, VecDeque<Result<Bytes, RenderError>>>>,
}

impl MockRenderer {
    fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
        }
    }

    fn script(&self, url: &str, outcomes: Vec<Result<Bytes, RenderError>>) {
        self.scripts
            .lock()
            .insert(url.to_string(), outcomes.into_iter().collect());
    }
}

#[async_trait]
impl Renderer for MockRenderer {
    async fn render(
        &self,
        url: &str,
        _mode: RenderMode,
        _navigation_timeout: Duration,
    ) -> Result<Bytes, RenderError> {
        if let Some(queue) = self.scripts.lock().get_mut(url) {
            if let Some(outcome) = queue.pop_front() {
                return outcome;
            }
        }
        Ok(Bytes::from_static(b"%PDF-1.7 rendered page"))
    }
}

struct Harness {
    app: Router,
    queue: QueueService,
    runner: Runner,
    renderer: Arc<MockRenderer>,
    _temp: TempDir,
}

fn harness() -> Harness {
    let temp = TempDir::new().expect("temp dir");
    let store = Arc::new(JobStore::open(temp.path().join("store")).expect("store"));
    let queue = QueueService::new(store.clone());
    let metrics = Arc::new(Metrics::new());
    let renderer = Arc::new(MockRenderer::new());

    let runner = Runner::new(
        queue.clone(),
        renderer.clone(),
        RunnerConfig {
            storage_root: temp.path().join("pdfs"),
            poll_interval: Duration::from_millis(10),
            cleanup_interval: Duration::from_millis(10),
            // Everything is instantly stale; sweeps only run when invoked.
            cleanup_file_age: Duration::ZERO,
        },
        metrics.clone(),
    );

    let state = AppState::new(Config::default(), queue.clone(), store, metrics);
    let app = pagepress::api::router(state);

    Harness {
        app,
        queue,
        runner,
        renderer,
        _temp: temp,
    }
}

async fn submit(app: &Router, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/pdf-jobs")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn get_view(app: &Router, job_id: &str) -> Value {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/v1/pdf-jobs/{job_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn download(app: &Router, job_id: &str) -> (StatusCode, Option<String>, Bytes) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/v1/pdf-jobs/{job_id}/file"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, content_type, bytes)
}

fn job_of(queue: &QueueService, id: &str) -> Job {
    queue
        .get_job(&Uuid::parse_str(id).unwrap())
        .unwrap()
        .unwrap()
}

/// Intervals [started_at, finished_at] of same-domain jobs must not overlap.
fn assert_serial_execution(jobs: &[Job]) {
    for (i, a) in jobs.iter().enumerate() {
        for b in jobs.iter().skip(i + 1) {
            if a.domain_key != b.domain_key {
                continue;
            }
            let (a_start, a_end) = (a.started_at.unwrap(), a.finished_at.unwrap());
            let (b_start, b_end) = (b.started_at.unwrap(), b.finished_at.unwrap());
            let overlap = a_start < b_end && b_start < a_end;
            assert!(
                !overlap,
                "jobs {} and {} overlapped on domain {}",
                a.id, b.id, a.domain_key
            );
        }
    }
}

// S1: submit, poll to succeeded, download a non-empty PDF.
#[tokio::test]
async fn happy_path_submit_render_download() {
    let h = harness();

    let (status, accepted) = submit(&h.app, json!({"url": "https://example.com/a"})).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(accepted["deduplicated"], false);
    let job_id = accepted["job_id"].as_str().unwrap().to_string();

    assert!(h.runner.run_once().await.unwrap());

    let view = get_view(&h.app, &job_id).await;
    assert_eq!(view["status"], "succeeded");
    assert_eq!(view["attempts"], 1);
    assert!(view["finished_at"].is_string());

    let (status, content_type, bytes) = download(&h.app, &job_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("application/pdf"));
    assert!(!bytes.is_empty());
}

// S3: same-domain jobs serialize through waiting_domain_lock.
#[tokio::test]
async fn same_domain_jobs_serialize() {
    let h = harness();

    let (_, a) = submit(&h.app, json!({"url": "https://example.com/a"})).await;
    // Distinct created_at millis keep the claim order deterministic.
    tokio::time::sleep(Duration::from_millis(5)).await;
    let (_, b) = submit(&h.app, json!({"url": "https://example.com/b"})).await;
    let a_id = a["job_id"].as_str().unwrap().to_string();
    let b_id = b["job_id"].as_str().unwrap().to_string();

    // Claim the first; the second must park behind the domain lock.
    let claimed = h.queue.claim_next().unwrap().unwrap();
    assert_eq!(claimed.id.to_string(), a_id);
    assert!(h.queue.claim_next().unwrap().is_none());
    assert_eq!(get_view(&h.app, &b_id).await["status"], "waiting_domain_lock");

    // Finish the first; the second becomes claimable.
    h.queue.record_attempt(&claimed.id).unwrap();
    let artifact = h._temp.path().join("a.pdf");
    std::fs::write(&artifact, b"%PDF-1.7").unwrap();
    h.queue.complete(&claimed.id, artifact).unwrap();

    let reclaimed = h.queue.claim_next().unwrap().unwrap();
    assert_eq!(reclaimed.id.to_string(), b_id);
    h.queue.record_attempt(&reclaimed.id).unwrap();
    let artifact = h._temp.path().join("b.pdf");
    std::fs::write(&artifact, b"%PDF-1.7").unwrap();
    h.queue.complete(&reclaimed.id, artifact).unwrap();

    let jobs = vec![job_of(&h.queue, &a_id), job_of(&h.queue, &b_id)];
    assert_serial_execution(&jobs);
}

// S4: different domains never pass through waiting_domain_lock.
#[tokio::test]
async fn cross_domain_jobs_do_not_wait() {
    let h = harness();

    let (_, a) = submit(&h.app, json!({"url": "https://alpha.com/"})).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let (_, b) = submit(&h.app, json!({"url": "https://beta.com/"})).await;
    let a_id = a["job_id"].as_str().unwrap().to_string();
    let b_id = b["job_id"].as_str().unwrap().to_string();

    // FIFO: alpha first.
    assert!(h.runner.run_once().await.unwrap());
    assert_eq!(get_view(&h.app, &a_id).await["status"], "succeeded");
    // beta went straight from queued to running on its turn, never waiting.
    let view = get_view(&h.app, &b_id).await;
    assert_eq!(view["status"], "queued");

    assert!(h.runner.run_once().await.unwrap());
    assert_eq!(get_view(&h.app, &b_id).await["status"], "succeeded");
}

// S6: transient failure retries with the lock released in between, then
// succeeds with attempts=2.
#[tokio::test]
async fn retry_then_succeed_releases_lock_between_attempts() {
    let h = harness();
    h.renderer.script(
        "https://example.com/flaky",
        vec![
            Err(RenderError::Transient("navigation timeout".into())),
            Ok(Bytes::from_static(b"%PDF-1.7 second try")),
        ],
    );

    let (_, flaky) = submit(
        &h.app,
        json!({"url": "https://example.com/flaky", "max_retries": 2}),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let (_, other) = submit(&h.app, json!({"url": "https://other.com/"})).await;
    let flaky_id = flaky["job_id"].as_str().unwrap().to_string();
    let other_id = other["job_id"].as_str().unwrap().to_string();

    // Attempt 1 fails; the flaky job is requeued with its lock released, so
    // the other-domain job claims in between.
    assert!(h.runner.run_once().await.unwrap());
    assert_eq!(get_view(&h.app, &flaky_id).await["status"], "queued");

    assert!(h.runner.run_once().await.unwrap());
    assert_eq!(get_view(&h.app, &other_id).await["status"], "succeeded");

    // Attempt 2 succeeds.
    assert!(h.runner.run_once().await.unwrap());
    let view = get_view(&h.app, &flaky_id).await;
    assert_eq!(view["status"], "succeeded");
    assert_eq!(view["attempts"], 2);

    let (status, _, bytes) = download(&h.app, &flaky_id).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&bytes[..], b"%PDF-1.7 second try");
}

// S7: cleanup deletes the artifact; status survives, download explains.
#[tokio::test]
async fn cleanup_reaps_artifact_but_keeps_job() {
    let h = harness();

    let (_, accepted) = submit(&h.app, json!({"url": "https://example.com/a"})).await;
    let job_id = accepted["job_id"].as_str().unwrap().to_string();

    assert!(h.runner.run_once().await.unwrap());
    let (status, _, _) = download(&h.app, &job_id).await;
    assert_eq!(status, StatusCode::OK);

    // File age threshold is zero in the harness: the sweep reaps immediately.
    assert_eq!(h.runner.cleanup_once().await.unwrap(), 1);

    let view = get_view(&h.app, &job_id).await;
    assert_eq!(view["status"], "succeeded");

    let (status, _, bytes) = download(&h.app, &job_id).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["message"], "PDF file not found (may have been cleaned up)");
}

// Restart recovery: no running rows without a worker, no stale lock holders.
#[tokio::test]
async fn restart_recovery_requeues_in_flight_work() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("store");

    let job_id = {
        let store = Arc::new(JobStore::open(&path).unwrap());
        let queue = QueueService::new(store.clone());
        let (_, accepted) = {
            let state = AppState::new(
                Config::default(),
                queue.clone(),
                store.clone(),
                Arc::new(Metrics::new()),
            );
            let app = pagepress::api::router(state);
            submit(&app, json!({"url": "https://example.com/a"})).await
        };
        let job_id = accepted["job_id"].as_str().unwrap().to_string();

        // Claim but never finish: the process "crashes" mid-render.
        queue.claim_next().unwrap().unwrap();
        store.persist().unwrap();
        job_id
    };

    // New process: recovery runs before the loop claims anything.
    let store = Arc::new(JobStore::open(&path).unwrap());
    let queue = QueueService::new(store.clone());
    let stats = queue.recover().unwrap();
    assert_eq!(stats.jobs_requeued, 1);
    assert_eq!(stats.locks_released, 1);

    let job = job_of(&queue, &job_id);
    assert_eq!(job.status, JobStatus::Queued);
    assert!(store.get_lock("example.com").unwrap().unwrap().is_free());

    // The job renders normally on the next claim.
    let claimed = queue.claim_next().unwrap().unwrap();
    assert_eq!(claimed.id.to_string(), job_id);
}

// Exhausted retries surface RENDER_FAILED with the renderer's message.
#[tokio::test]
async fn exhausted_retries_surface_render_failed() {
    let h = harness();
    h.renderer.script(
        "https://example.com/broken",
        vec![
            Err(RenderError::Transient("connection refused".into())),
            Err(RenderError::Transient("connection refused".into())),
        ],
    );

    let (_, accepted) = submit(
        &h.app,
        json!({"url": "https://example.com/broken", "max_retries": 1}),
    )
    .await;
    let job_id = accepted["job_id"].as_str().unwrap().to_string();

    assert!(h.runner.run_once().await.unwrap());
    assert!(h.runner.run_once().await.unwrap());

    let job = job_of(&h.queue, &job_id);
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_code, Some(ErrorCode::RenderFailed));
    assert_eq!(job.attempts, 2);
    assert!(job.error_message.unwrap().contains("connection refused"));

    let view = get_view(&h.app, &job_id).await;
    assert_eq!(view["error_code"], "RENDER_FAILED");
}

// Mixed workload: FIFO across domains, serialization within them.
#[tokio::test]
async fn mixed_workload_preserves_ordering_properties() {
    let h = harness();

    let mut ids = Vec::new();
    for url in [
        "https://example.com/1",
        "https://alpha.com/1",
        "https://example.com/2",
        "https://beta.com/1",
    ] {
        let (status, accepted) = submit(&h.app, json!({"url": url})).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        ids.push(accepted["job_id"].as_str().unwrap().to_string());
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // Drain the queue.
    for _ in 0..8 {
        if !h.runner.run_once().await.unwrap() {
            break;
        }
    }

    let jobs: Vec<Job> = ids.iter().map(|id| job_of(&h.queue, id)).collect();
    for job in &jobs {
        assert_eq!(job.status, JobStatus::Succeeded, "job {} not done", job.id);
        assert_eq!(job.attempts, 1);
        let (created, started, finished) =
            (job.created_at, job.started_at.unwrap(), job.finished_at.unwrap());
        assert!(created <= started && started <= finished);
    }
    assert_serial_execution(&jobs);
}
