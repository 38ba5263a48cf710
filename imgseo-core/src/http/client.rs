//! Transport trait and implementations.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Network-level failure: no HTTP status was received.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_builder() {
            TransportError::InvalidUrl(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

/// A received HTTP response, whatever its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl TransportResponse {
    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self {
            status,
            content_type: Some("application/json".to_string()),
            body: body.to_string(),
        }
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: Some("text/html; charset=UTF-8".to_string()),
            body: body.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for the endpoint transport, enabling mockability in tests.
///
/// Paths are relative to the server's API root, e.g. `generate`.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<TransportResponse, TransportError>;

    async fn get_json(&self, path: &str) -> Result<TransportResponse, TransportError>;
}

/// Configuration for [`ReqwestTransport`].
#[derive(Clone)]
pub struct TransportBuilder {
    base_url: String,
    token: Option<String>,
    timeout: Duration,
    user_agent: String,
}

impl TransportBuilder {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            timeout: Duration::from_secs(120),
            user_agent: format!("imgseo/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Bearer token sent with every request.
    pub fn token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    /// Overall per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn build(self) -> Result<ReqwestTransport, reqwest::Error> {
        let inner = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .build()?;

        Ok(ReqwestTransport {
            inner: Arc::new(inner),
            base_url: self.base_url,
            token: self.token,
        })
    }
}

/// Production transport over reqwest.
pub struct ReqwestTransport {
    /// Shared reqwest client for connection pooling.
    inner: Arc<reqwest::Client>,
    base_url: String,
    token: Option<String>,
}

impl ReqwestTransport {
    pub fn builder(base_url: &str) -> TransportBuilder {
        TransportBuilder::new(base_url)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<TransportResponse, TransportError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = response.text().await?;

        Ok(TransportResponse {
            status,
            content_type,
            body,
        })
    }
}

#[async_trait]
impl ApiTransport for ReqwestTransport {
    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<TransportResponse, TransportError> {
        let url = self.url(path);
        tracing::debug!(url = %url, "network: POST");
        self.send(self.inner.post(&url).json(body)).await
    }

    async fn get_json(&self, path: &str) -> Result<TransportResponse, TransportError> {
        let url = self.url(path);
        tracing::debug!(url = %url, "network: GET");
        self.send(self.inner.get(&url)).await
    }
}

/// Scripted reply for [`MockTransport`].
#[derive(Clone, Debug)]
pub enum MockReply {
    Response(TransportResponse),
    Error(TransportError),
}

/// One request seen by [`MockTransport`].
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedCall {
    pub method: &'static str,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

/// Mock transport for testing.
///
/// Replies are queued per path and consumed in order. The last reply of a
/// queue repeats once the queue is drained, so a single scripted 503 serves
/// every retry.
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<HashMap<String, VecDeque<MockReply>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for a path.
    pub fn with_reply(self, path: &str, reply: MockReply) -> Self {
        self.push(path, reply);
        self
    }

    /// Queue a JSON response for a path.
    pub fn with_json(self, path: &str, status: u16, body: serde_json::Value) -> Self {
        self.with_reply(path, MockReply::Response(TransportResponse::json(status, &body)))
    }

    /// Queue a network failure for a path.
    pub fn with_error(self, path: &str, error: TransportError) -> Self {
        self.with_reply(path, MockReply::Error(error))
    }

    /// Queue a reply on an already shared mock.
    pub fn push(&self, path: &str, reply: MockReply) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|c| c.path == path)
            .count()
    }

    fn respond(
        &self,
        method: &'static str,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<TransportResponse, TransportError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedCall {
                method,
                path: path.to_string(),
                body: body.cloned(),
            });

        let mut replies = self.replies.lock().unwrap_or_else(|e| e.into_inner());
        let queue = replies.get_mut(path).ok_or_else(|| {
            TransportError::Other(format!("No mock response for path: {}", path))
        })?;
        let reply = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };

        match reply {
            Some(MockReply::Response(response)) => Ok(response),
            Some(MockReply::Error(e)) => Err(e),
            None => Err(TransportError::Other(format!(
                "No mock response for path: {}",
                path
            ))),
        }
    }
}

#[async_trait]
impl ApiTransport for MockTransport {
    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<TransportResponse, TransportError> {
        self.respond("POST", path, Some(body))
    }

    async fn get_json(&self, path: &str) -> Result<TransportResponse, TransportError> {
        self.respond("GET", path, None)
    }
}

#[async_trait]
impl<T: ApiTransport + ?Sized> ApiTransport for Arc<T> {
    async fn post_json(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<TransportResponse, TransportError> {
        (**self).post_json(path, body).await
    }

    async fn get_json(&self, path: &str) -> Result<TransportResponse, TransportError> {
        (**self).get_json(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn mock_replays_queue_then_repeats_last() {
        let mock = MockTransport::new()
            .with_json("generate", 503, json!({"code": "x"}))
            .with_json("generate", 200, json!({"title": "t", "alt": "a"}));

        let first = mock.post_json("generate", &json!({})).await.unwrap();
        let second = mock.post_json("generate", &json!({})).await.unwrap();
        let third = mock.post_json("generate", &json!({})).await.unwrap();

        assert_eq!(first.status, 503);
        assert_eq!(second.status, 200);
        assert_eq!(third.status, 200);
        assert_eq!(mock.call_count("generate"), 3);
    }

    #[tokio::test]
    async fn mock_records_bodies_and_unknown_paths_fail() {
        let mock = MockTransport::new().with_error("update", TransportError::Timeout);

        let err = mock
            .post_json("update", &json!({"image_id": 4}))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Timeout);
        assert!(mock.get_json("ping").await.is_err());

        let calls = mock.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].body, Some(json!({"image_id": 4})));
        assert_eq!(calls[1].method, "GET");
    }

    #[test]
    fn success_covers_2xx_only() {
        assert!(TransportResponse::json(200, &json!({})).is_success());
        assert!(TransportResponse::text(204, "").is_success());
        assert!(!TransportResponse::text(500, "<html>").is_success());
        assert!(!TransportResponse::json(403, &json!({})).is_success());
    }

    #[test]
    fn builder_carries_settings() {
        let builder = ReqwestTransport::builder("http://127.0.0.1:3000/api/v1/")
            .token(Some(String::new()))
            .timeout(Duration::from_secs(5))
            .user_agent("imgseo-cli/test".to_string());
        assert_eq!(builder.base_url, "http://127.0.0.1:3000/api/v1");
        assert_eq!(builder.token, None);
        assert_eq!(builder.timeout, Duration::from_secs(5));
        assert_eq!(builder.user_agent, "imgseo-cli/test");

        let transport = builder.build().unwrap();
        assert_eq!(transport.url("/ping"), "http://127.0.0.1:3000/api/v1/ping");
    }
}
