use std::sync::Arc;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::info;

use super::{
    services::{download_file, get_job, healthz, submit_job},
    state::AppState,
};
use crate::config::Config;
use crate::observability::Metrics;
use crate::queue::QueueService;
use crate::store::JobStore;
use crate::worker::{HttpRenderer, Runner, shutdown_signal};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Build the API router over an already-assembled state. Separated from
/// [`run`] so tests drive the exact production routes in-process.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/pdf-jobs", post(submit_job))
        .route("/v1/pdf-jobs/{job_id}", get(get_job))
        .route("/v1/pdf-jobs/{job_id}/file", get(download_file))
        .route("/healthz", get(healthz))
        .with_state(state)
        // Transparently decompress gzip/deflate/brotli request bodies
        .layer(RequestDecompressionLayer::new())
}

/// Run the full service: HTTP surface plus the embedded render worker and
/// cleanup sweep. One process owns the store; the worker loops are spawned
/// here so the render pipeline shares the keyspace with request handlers.
pub async fn run(config: Config) -> Result<(), AnyError> {
    info!(path = %config.store.db_path.display(), "Opening job store");
    let store = Arc::new(JobStore::open(&config.store.db_path)?);

    let queue = QueueService::new(store.clone());
    let metrics = Arc::new(Metrics::new());

    let renderer = Arc::new(HttpRenderer::new(config.renderer.http_config())?);
    let runner = Arc::new(Runner::new(
        queue.clone(),
        renderer,
        config.runner_config(),
        metrics.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let render_task = tokio::spawn({
        let runner = runner.clone();
        let shutdown = shutdown_rx.clone();
        async move { runner.run(shutdown).await }
    });
    let cleanup_task = tokio::spawn({
        let runner = runner.clone();
        let shutdown = shutdown_rx;
        async move { runner.run_cleanup(shutdown).await }
    });

    let address = config.server.bind_addr;
    let state = AppState::new(config, queue, store, metrics);
    let app = router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "PagePress API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(render_task, cleanup_task);

    Ok(())
}
