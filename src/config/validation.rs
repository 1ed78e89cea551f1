use thiserror::Error;
use url::Url;

use super::models::Config;
use crate::queue::models::{
    JOB_TIMEOUT_RANGE_S, MAX_DOMAIN_WAIT_RANGE_S, MAX_RETRIES_RANGE,
    NAVIGATION_TIMEOUT_RANGE_S,
};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("renderer endpoint '{0}' is not a valid http(s) URL")]
    InvalidRendererEndpoint(String),

    #[error("{name} default {value} is outside the allowed range [{min}, {max}]")]
    DefaultOutOfRange {
        name: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
}

pub fn validate(config: &Config) -> Result<(), ValidationError> {
    match Url::parse(&config.renderer.endpoint) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => {
            return Err(ValidationError::InvalidRendererEndpoint(
                config.renderer.endpoint.clone(),
            ));
        }
    }

    check_range(
        "jobs.navigation_timeout_s",
        config.jobs.navigation_timeout_s,
        NAVIGATION_TIMEOUT_RANGE_S,
    )?;
    check_range("jobs.job_timeout_s", config.jobs.job_timeout_s, JOB_TIMEOUT_RANGE_S)?;
    check_range(
        "jobs.max_domain_wait_s",
        config.jobs.max_domain_wait_s,
        MAX_DOMAIN_WAIT_RANGE_S,
    )?;
    check_range(
        "jobs.max_retries",
        config.jobs.max_retries as u64,
        (MAX_RETRIES_RANGE.0 as u64, MAX_RETRIES_RANGE.1 as u64),
    )?;

    if config.worker.poll_interval_ms == 0 {
        return Err(ValidationError::ZeroInterval("worker.poll_interval_ms"));
    }
    if config.artifacts.cleanup_interval_s == 0 {
        return Err(ValidationError::ZeroInterval("artifacts.cleanup_interval_s"));
    }
    if config.artifacts.cleanup_file_age_s == 0 {
        return Err(ValidationError::ZeroInterval("artifacts.cleanup_file_age_s"));
    }

    Ok(())
}

fn check_range(
    name: &'static str,
    value: u64,
    (min, max): (u64, u64),
) -> Result<(), ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::DefaultOutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    Ok(())
}
