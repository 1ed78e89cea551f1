//! Configuration management for PagePress
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables
//!
//! # Environment Variables
//!
//! Structured overrides use the pattern `PAGEPRESS__<section>__<key>`:
//!
//! - `PAGEPRESS__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `PAGEPRESS__RENDERER__ENDPOINT=http://chrome-sidecar:9222`
//!
//! Flat deployment-style variables are applied on top and win over
//! everything: `DB_PATH`, `PDF_STORAGE_PATH`, `DEFAULT_RENDER_MODE`,
//! `RENDERER_ENDPOINT`, `NAVIGATION_TIMEOUT_SECONDS`, `JOB_TIMEOUT_SECONDS`,
//! `MAX_DOMAIN_WAIT_SECONDS`, `MAX_RETRIES`, `CLEANUP_INTERVAL_SECONDS`,
//! `CLEANUP_FILE_AGE_SECONDS`, `API_HOST`, `API_PORT`,
//! `WORKER_POLL_INTERVAL_SECONDS`. (`LOG_LEVEL` is read by tracing setup.)
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/pagepress.toml`.
//! This can be overridden using the `PAGEPRESS_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use models::{
    ArtifactsConfig, Config, JobsConfig, RendererConfig, ServerConfig, StoreConfig,
    WorkerConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}
