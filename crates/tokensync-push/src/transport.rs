//! HTTP transport for registration requests.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::TransportError;

/// A registration POST.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationRequest {
    pub url: String,
    pub body: Value,
}

/// Status and body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    status: u16,
    body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Whether the status is in the 2xx range.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> &str {
        &self.body
    }
}

/// Sends registration requests.
///
/// Implementations must return promptly with [`TransportError::Aborted`] once
/// `signal` is cancelled.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn post(
        &self,
        request: &RegistrationRequest,
        signal: &CancellationToken,
    ) -> Result<TransportResponse, TransportError>;
}

/// [`PushTransport`] backed by reqwest.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport without a request timeout.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(None)
    }

    pub fn with_timeout(timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self { client })
    }

    async fn send(&self, request: &RegistrationRequest) -> Result<TransportResponse, TransportError> {
        let json = serde_json::to_string(&request.body)
            .map_err(|e| TransportError::Client(e.to_string()))?;

        let response = self
            .client
            .post(&request.url)
            .header("Content-Type", "application/json")
            .body(json)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!(status, error = %e, "Failed to read registration response body");
                String::new()
            }
        };

        trace!("Registration request to {} returned {}", request.url, status);
        Ok(TransportResponse::new(status, body))
    }
}

#[async_trait]
impl PushTransport for HttpTransport {
    async fn post(
        &self,
        request: &RegistrationRequest,
        signal: &CancellationToken,
    ) -> Result<TransportResponse, TransportError> {
        if signal.is_cancelled() {
            return Err(TransportError::Aborted);
        }

        tokio::select! {
            biased;
            _ = signal.cancelled() => Err(TransportError::Aborted),
            result = self.send(request) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request_to(server: &MockServer) -> RegistrationRequest {
        RegistrationRequest {
            url: format!("{}/register", server.uri()),
            body: json!({"deviceToken": "tok", "type": "apns"}),
        }
    }

    #[test]
    fn test_response_ok_range() {
        assert!(TransportResponse::new(200, "").ok());
        assert!(TransportResponse::new(204, "").ok());
        assert!(!TransportResponse::new(199, "").ok());
        assert!(!TransportResponse::new(301, "").ok());
        assert!(!TransportResponse::new(500, "boom").ok());
        assert_eq!(TransportResponse::new(500, "boom").text(), "boom");
    }

    #[tokio::test]
    async fn test_post_sends_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/register"))
            .and(header("Content-Type", "application/json"))
            .and(body_json(json!({"deviceToken": "tok", "type": "apns"})))
            .respond_with(ResponseTemplate::new(200).set_body_string("registered"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new().unwrap();
        let response = transport
            .post(&request_to(&server), &CancellationToken::new())
            .await
            .unwrap();

        assert!(response.ok());
        assert_eq!(response.text(), "registered");
    }

    #[tokio::test]
    async fn test_post_returns_error_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new().unwrap();
        let response = transport
            .post(&request_to(&server), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.status(), 503);
        assert!(!response.ok());
        assert_eq!(response.text(), "unavailable");
    }

    #[tokio::test]
    async fn test_post_aborts_when_cancelled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;

        let transport = HttpTransport::new().unwrap();
        let signal = CancellationToken::new();
        let cancel = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let result = transport.post(&request_to(&server), &signal).await;
        assert!(matches!(result, Err(TransportError::Aborted)));
    }

    #[tokio::test]
    async fn test_post_refuses_cancelled_signal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let signal = CancellationToken::new();
        signal.cancel();

        let transport = HttpTransport::new().unwrap();
        let result = transport.post(&request_to(&server), &signal).await;
        assert!(matches!(result, Err(TransportError::Aborted)));
    }

    #[tokio::test]
    async fn test_post_network_error() {
        let transport = HttpTransport::with_timeout(Some(Duration::from_secs(2))).unwrap();
        let request = RegistrationRequest {
            url: "http://127.0.0.1:1/register".to_string(),
            body: json!({}),
        };

        let result = transport.post(&request, &CancellationToken::new()).await;
        assert!(matches!(result, Err(TransportError::Network(_))));
    }
}
