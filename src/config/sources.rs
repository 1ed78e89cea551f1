use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "PAGEPRESS_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/pagepress.toml";
const ENV_PREFIX: &str = "PAGEPRESS";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. `PAGEPRESS__*` environment variables
/// 5. Flat deployment variables (`DB_PATH`, `API_PORT`, ...), highest priority
pub fn load() -> Result<Config, ConfigError> {
    // Load .env file if it exists (ignore errors if file doesn't exist)
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from_sources(config_path)?;

    apply_flat_env(&mut config);

    Ok(config)
}

/// Load configuration from a specific path and environment
/// Useful for testing with custom config files
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // PAGEPRESS__SERVER__BIND_ADDR -> server.bind_addr
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

/// Apply the flat, deployment-style variable names on top of the structured
/// config. These are the names operators set in container environments; each
/// maps onto exactly one field.
fn apply_flat_env(config: &mut Config) {
    if let Ok(path) = env::var("DB_PATH") {
        config.store.db_path = PathBuf::from(path);
    }
    if let Ok(path) = env::var("PDF_STORAGE_PATH") {
        config.artifacts.storage_root = PathBuf::from(path);
    }
    if let Ok(mode) = env::var("DEFAULT_RENDER_MODE") {
        match mode.parse() {
            Ok(mode) => config.renderer.default_mode = mode,
            Err(e) => tracing::warn!(error = %e, "Ignoring DEFAULT_RENDER_MODE"),
        }
    }
    if let Ok(endpoint) = env::var("RENDERER_ENDPOINT") {
        config.renderer.endpoint = endpoint;
    }

    apply_u64(&mut config.jobs.navigation_timeout_s, "NAVIGATION_TIMEOUT_SECONDS");
    apply_u64(&mut config.jobs.job_timeout_s, "JOB_TIMEOUT_SECONDS");
    apply_u64(&mut config.jobs.max_domain_wait_s, "MAX_DOMAIN_WAIT_SECONDS");
    apply_u64(&mut config.artifacts.cleanup_interval_s, "CLEANUP_INTERVAL_SECONDS");
    apply_u64(&mut config.artifacts.cleanup_file_age_s, "CLEANUP_FILE_AGE_SECONDS");

    if let Ok(value) = env::var("MAX_RETRIES") {
        match value.parse() {
            Ok(parsed) => config.jobs.max_retries = parsed,
            Err(e) => tracing::warn!(error = %e, "Ignoring MAX_RETRIES"),
        }
    }

    if let Ok(value) = env::var("WORKER_POLL_INTERVAL_SECONDS") {
        match value.parse::<u64>() {
            Ok(seconds) => config.worker.poll_interval_ms = seconds * 1000,
            Err(e) => tracing::warn!(error = %e, "Ignoring WORKER_POLL_INTERVAL_SECONDS"),
        }
    }

    // API_HOST / API_PORT compose into the bind address.
    let host = env::var("API_HOST").ok();
    let port = env::var("API_PORT").ok().and_then(|p| p.parse::<u16>().ok());
    if host.is_some() || port.is_some() {
        let current = config.server.bind_addr;
        let host = host.unwrap_or_else(|| current.ip().to_string());
        let port = port.unwrap_or_else(|| current.port());
        match format!("{host}:{port}").parse() {
            Ok(addr) => config.server.bind_addr = addr,
            Err(e) => tracing::warn!(error = %e, "Ignoring API_HOST/API_PORT"),
        }
    }
}

fn apply_u64(field: &mut u64, name: &str) {
    if let Ok(value) = env::var(name) {
        match value.parse() {
            Ok(parsed) => *field = parsed,
            Err(e) => tracing::warn!(var = name, error = %e, "Ignoring unparseable variable"),
        }
    }
}
