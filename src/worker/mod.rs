//! Render worker service
//!
//! Two cooperating loops over the shared store: the render loop (claim one
//! job, render it, persist the artifact) and the cleanup sweep (reap
//! artifacts past their age threshold). Exactly one render is in flight at
//! any time.
//!
//! `run` is the headless entry point: the same loops the API process embeds,
//! without the HTTP surface, for draining a queue offline.

pub mod renderer;
pub mod runner;

pub use renderer::{HttpRenderer, HttpRendererConfig, RenderError, Renderer};
pub use runner::{Runner, RunnerConfig, WorkerError};

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::config::Config;
use crate::observability::Metrics;
use crate::queue::QueueService;
use crate::store::JobStore;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Run the worker loops as a standalone process until ctrl-c/SIGTERM.
pub async fn run(config: Config) -> Result<(), AnyError> {
    info!(path = %config.store.db_path.display(), "Opening job store");
    let store = Arc::new(JobStore::open(&config.store.db_path)?);
    let queue = QueueService::new(store);

    let renderer = Arc::new(HttpRenderer::new(config.renderer.http_config())?);
    let metrics = Arc::new(Metrics::new());
    let runner = Arc::new(Runner::new(
        queue,
        renderer,
        config.runner_config(),
        metrics,
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

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(render_task, cleanup_task);

    Ok(())
}

pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
