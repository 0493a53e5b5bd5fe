use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Transport-level failure of one HTTP exchange
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("response body is not valid JSON: {0}")]
    Decode(String),
}

impl RequestError {
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self.status(), Some(404))
    }

    pub const fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401))
    }

    /// Timeouts, connection failures and 5xx responses are worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Decode(_) => false,
        }
    }
}

/// Retry schedule for idempotent GET requests
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn none() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
        }
    }

    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// HTTP client wrapper for metadata sources
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RequestError> {
        let client = Client::builder()
            .user_agent(concat!("tvrecon/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Get the underlying reqwest client
    #[must_use]
    pub const fn inner(&self) -> &Client {
        &self.client
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build full URL from endpoint
    #[must_use]
    pub fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// GET a JSON document, optionally with a bearer token
    pub async fn get_json(
        &self,
        endpoint: &str,
        bearer: Option<&str>,
    ) -> Result<Value, RequestError> {
        let mut request = self.client.get(self.url(endpoint));
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        Self::send(request).await
    }

    /// GET a JSON document, retrying transient failures
    pub async fn get_json_with_retry(
        &self,
        endpoint: &str,
        bearer: Option<&str>,
        policy: RetryPolicy,
    ) -> Result<Value, RequestError> {
        let attempts = policy.attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.get_json(endpoint, bearer).await {
                Err(e) if e.is_transient() && attempt < attempts => {
                    debug!(
                        "GET {} failed (attempt {}/{}): {}",
                        endpoint, attempt, attempts, e
                    );
                    attempt += 1;
                    tokio::time::sleep(policy.delay).await;
                }
                other => return other,
            }
        }
    }

    /// POST a JSON body and parse the JSON response
    pub async fn post_json<B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<Value, RequestError> {
        let request = self
            .client
            .post(self.url(endpoint))
            .header("Accept", "application/json")
            .json(body);
        Self::send(request).await
    }

    async fn send(request: RequestBuilder) -> Result<Value, RequestError> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RequestError::Status {
                status: status.as_u16(),
                message: if message.is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("unknown status")
                        .to_string()
                } else {
                    message
                },
            });
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| RequestError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let not_found = RequestError::Status {
            status: 404,
            message: "Not Found".to_string(),
        };
        let server = RequestError::Status {
            status: 503,
            message: "Unavailable".to_string(),
        };

        assert!(not_found.is_not_found());
        assert!(!not_found.is_transient());
        assert!(server.is_transient());
        assert!(!RequestError::Decode("eof".to_string()).is_transient());
    }

    #[tokio::test]
    async fn test_retry_recovers_from_server_error() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("GET", "/flaky")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("GET", "/flaky")
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let client = HttpClient::new(server.url(), Duration::from_secs(5)).unwrap();
        let value = client
            .get_json_with_retry("/flaky", None, RetryPolicy::new(3, Duration::from_millis(10)))
            .await
            .unwrap();

        assert_eq!(value["ok"], Value::Bool(true));
        failing.assert_async().await;
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let missing = server
            .mock("GET", "/missing")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let client = HttpClient::new(server.url(), Duration::from_secs(5)).unwrap();
        let err = client
            .get_json_with_retry("/missing", None, RetryPolicy::new(3, Duration::from_millis(10)))
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        missing.assert_async().await;
    }
}
