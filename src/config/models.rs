use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::queue::models::{JobLimits, RenderMode};
use crate::worker::renderer::HttpRendererConfig;
use crate::worker::runner::RunnerConfig;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub renderer: RendererConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl Config {
    /// Per-job defaults, before caller overrides and clamping.
    pub fn job_defaults(&self) -> JobLimits {
        JobLimits {
            navigation_timeout_s: self.jobs.navigation_timeout_s,
            job_timeout_s: self.jobs.job_timeout_s,
            max_domain_wait_s: self.jobs.max_domain_wait_s,
            max_retries: self.jobs.max_retries,
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            storage_root: self.artifacts.storage_root.clone(),
            poll_interval: Duration::from_millis(self.worker.poll_interval_ms),
            cleanup_interval: Duration::from_secs(self.artifacts.cleanup_interval_s),
            cleanup_file_age: Duration::from_secs(self.artifacts.cleanup_file_age_s),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().unwrap()
}

/// Durable store location
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/jobs")
}

/// Artifact storage and cleanup policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtifactsConfig {
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,
    #[serde(default = "default_cleanup_interval_s")]
    pub cleanup_interval_s: u64,
    #[serde(default = "default_cleanup_file_age_s")]
    pub cleanup_file_age_s: u64,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            cleanup_interval_s: default_cleanup_interval_s(),
            cleanup_file_age_s: default_cleanup_file_age_s(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data/pdfs")
}

fn default_cleanup_interval_s() -> u64 {
    300
}

fn default_cleanup_file_age_s() -> u64 {
    3600
}

/// Render sidecar configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RendererConfig {
    #[serde(default = "default_renderer_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_render_mode")]
    pub default_mode: RenderMode,
    #[serde(default = "default_connect_timeout_s")]
    pub connect_timeout_s: u64,
}

impl RendererConfig {
    pub fn http_config(&self) -> HttpRendererConfig {
        HttpRendererConfig {
            endpoint: self.endpoint.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_s),
            ..HttpRendererConfig::default()
        }
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            endpoint: default_renderer_endpoint(),
            default_mode: default_render_mode(),
            connect_timeout_s: default_connect_timeout_s(),
        }
    }
}

fn default_renderer_endpoint() -> String {
    "http://127.0.0.1:9222".to_string()
}

fn default_render_mode() -> RenderMode {
    RenderMode::PrintToPdf
}

fn default_connect_timeout_s() -> u64 {
    10
}

/// Per-job bound defaults (caller overrides are clamped separately)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobsConfig {
    #[serde(default = "default_navigation_timeout_s")]
    pub navigation_timeout_s: u64,
    #[serde(default = "default_job_timeout_s")]
    pub job_timeout_s: u64,
    #[serde(default = "default_max_domain_wait_s")]
    pub max_domain_wait_s: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_s: default_navigation_timeout_s(),
            job_timeout_s: default_job_timeout_s(),
            max_domain_wait_s: default_max_domain_wait_s(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_navigation_timeout_s() -> u64 {
    45
}

fn default_job_timeout_s() -> u64 {
    120
}

fn default_max_domain_wait_s() -> u64 {
    600
}

fn default_max_retries() -> u32 {
    2
}

/// Worker loop pacing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}
