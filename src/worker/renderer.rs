//! Renderer contract and the HTTP sidecar implementation
//!
//! The core treats rendering as an abstract capability: URL in, PDF bytes
//! out, failures split into transient (retryable) and permanent. The shipped
//! implementation talks to a headless-browser sidecar over HTTP; anything
//! honoring the trait works, which is also how the tests script failures.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::queue::models::RenderMode;

#[derive(Debug, Error)]
pub enum RenderError {
    /// Worth retrying: navigation timeout, network error, renderer hiccup.
    #[error("transient render failure: {0}")]
    Transient(String),

    /// Retrying cannot help: bad content, renderer rejected the page.
    #[error("permanent render failure: {0}")]
    Permanent(String),
}

impl RenderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RenderError::Transient(_))
    }
}

/// Converts a URL into PDF bytes. Implementations must honor the navigation
/// timeout and classify their failures.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        url: &str,
        mode: RenderMode,
        navigation_timeout: Duration,
    ) -> Result<Bytes, RenderError>;
}

/// Render request wire format for the sidecar.
#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    url: &'a str,
    mode: RenderMode,
    navigation_timeout_ms: u64,
}

/// HTTP renderer configuration
#[derive(Debug, Clone)]
pub struct HttpRendererConfig {
    /// Base URL of the render sidecar, e.g. `http://127.0.0.1:9222`.
    pub endpoint: String,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpRendererConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9222".to_string(),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("PagePress/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Renderer speaking to a headless-browser sidecar over HTTP
pub struct HttpRenderer {
    client: Client,
    endpoint: String,
}

impl HttpRenderer {
    pub fn new(config: HttpRendererConfig) -> Result<Self, RenderError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| RenderError::Permanent(format!("client build failed: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn render(
        &self,
        url: &str,
        mode: RenderMode,
        navigation_timeout: Duration,
    ) -> Result<Bytes, RenderError> {
        debug!(url, mode = mode.as_str(), "Requesting render");

        let request = RenderRequest {
            url,
            mode,
            navigation_timeout_ms: navigation_timeout.as_millis() as u64,
        };

        // The sidecar enforces the navigation timeout itself; the request
        // timeout only adds slack for transfer of the finished PDF.
        let response = self
            .client
            .post(format!("{}/render", self.endpoint))
            .timeout(navigation_timeout + Duration::from_secs(15))
            .json(&request)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if let Some(err) = classify_status(status) {
            let body = response.text().await.unwrap_or_default();
            let detail = body.chars().take(256).collect::<String>();
            return Err(match err {
                RenderError::Transient(_) => {
                    RenderError::Transient(format!("renderer returned {status}: {detail}"))
                }
                RenderError::Permanent(_) => {
                    RenderError::Permanent(format!("renderer returned {status}: {detail}"))
                }
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with("application/pdf") {
            return Err(RenderError::Permanent(format!(
                "renderer returned unexpected content type: {content_type}"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RenderError::Transient(format!("failed to read render body: {e}")))?;

        if bytes.is_empty() {
            return Err(RenderError::Transient("renderer returned empty body".into()));
        }

        debug!(url, size = bytes.len(), "Render completed");
        Ok(bytes)
    }
}

/// Status-code taxonomy: overload and server-side errors retry, the rest of
/// the 4xx family does not.
fn classify_status(status: StatusCode) -> Option<RenderError> {
    if status.is_success() {
        return None;
    }
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        Some(RenderError::Transient(status.to_string()))
    } else {
        Some(RenderError::Permanent(status.to_string()))
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> RenderError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        RenderError::Transient(e.to_string())
    } else {
        RenderError::Permanent(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_statuses_pass() {
        assert!(classify_status(StatusCode::OK).is_none());
        assert!(classify_status(StatusCode::CREATED).is_none());
    }

    #[test]
    fn overload_and_server_errors_are_transient() {
        for status in [
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            let err = classify_status(status).unwrap();
            assert!(err.is_transient(), "{status} should be transient");
        }
    }

    #[test]
    fn client_errors_are_permanent() {
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::NOT_FOUND,
            StatusCode::UNPROCESSABLE_ENTITY,
        ] {
            let err = classify_status(status).unwrap();
            assert!(!err.is_transient(), "{status} should be permanent");
        }
    }

    #[test]
    fn render_request_wire_format() {
        let request = RenderRequest {
            url: "https://example.com/",
            mode: RenderMode::PrintToPdf,
            navigation_timeout_ms: 45_000,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["url"], "https://example.com/");
        assert_eq!(json["mode"], "print_to_pdf");
        assert_eq!(json["navigation_timeout_ms"], 45_000);
    }
}
