//! Shared HTTP client and error mapping.

use std::time::Duration;

use relief_core::UpstreamError;
use reqwest::{Client, Response};

/// Default bound on any upstream call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Identifies the platform to third-party services.
pub const DEFAULT_USER_AGENT: &str = "DisasterResponsePlatform/1.0";

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Build the one `reqwest::Client` all providers share. Every request made
/// through it is bounded by `settings.timeout`.
pub fn build_client(settings: &HttpSettings) -> Result<Client, UpstreamError> {
    Client::builder()
        .timeout(settings.timeout)
        .user_agent(settings.user_agent.clone())
        .build()
        .map_err(|e| UpstreamError::Transport {
            provider: "http".to_string(),
            message: e.to_string(),
        })
}

/// Map a transport failure, separating timeouts out.
pub(crate) fn transport_error(
    provider: &str,
    timeout: Duration,
    e: reqwest::Error,
) -> UpstreamError {
    if e.is_timeout() {
        UpstreamError::Timeout {
            provider: provider.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        UpstreamError::Transport {
            provider: provider.to_string(),
            message: e.to_string(),
        }
    }
}

pub(crate) fn invalid_response(provider: &str, reason: impl Into<String>) -> UpstreamError {
    UpstreamError::InvalidResponse {
        provider: provider.to_string(),
        reason: reason.into(),
    }
}

/// Pass 2xx responses through; turn anything else into `RequestFailed`
/// carrying the body text.
pub(crate) async fn ensure_success(
    provider: &str,
    response: Response,
) -> Result<Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(UpstreamError::RequestFailed {
        provider: provider.to_string(),
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = HttpSettings::default();
        assert_eq!(settings.timeout, Duration::from_secs(10));
        assert_eq!(settings.user_agent, "DisasterResponsePlatform/1.0");
        assert!(build_client(&settings).is_ok());
    }
}
