//! Retrying client for the generate/update endpoints.
//!
//! Each operation is one HTTP round trip wrapped in a bounded retry loop:
//! transient failures (network errors, 429, 500-504) are retried after a fixed
//! delay until the attempt budget runs out; everything else returns at once.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY_MS};
use crate::error::{snippet, ApiFailure};
use crate::http::{ApiTransport, TransportResponse};
use crate::types::{
    ErrorBody, GenerateRequest, GeneratedMeta, PageImagesResponse, PingResponse, UpdateRequest,
    UpdateResponse, WorkItem,
};

/// How many times to try a call and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

/// Result of a single attempt.
#[derive(Debug)]
pub enum RequestOutcome<T> {
    Success(T),
    RetryableFailure(ApiFailure),
    FatalFailure(ApiFailure),
}

impl<T> RequestOutcome<T> {
    fn from_failure(failure: ApiFailure) -> Self {
        if failure.is_retryable() {
            RequestOutcome::RetryableFailure(failure)
        } else {
            RequestOutcome::FatalFailure(failure)
        }
    }
}

/// The two remote operations a bulk run drives.
#[async_trait]
pub trait MetaApi: Send + Sync {
    async fn generate(&self, item: &WorkItem) -> Result<GeneratedMeta, ApiFailure>;

    async fn update(&self, request: &UpdateRequest) -> Result<UpdateResponse, ApiFailure>;
}

/// [`MetaApi`] over an [`ApiTransport`], with retries.
pub struct MetaApiClient<T> {
    transport: T,
    policy: RetryPolicy,
}

impl<T: ApiTransport> MetaApiClient<T> {
    pub fn new(transport: T) -> Self {
        Self::with_policy(transport, RetryPolicy::default())
    }

    pub fn with_policy(transport: T, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Images found on a page, as the server resolves them.
    pub async fn page_images(&self, page_id: u64) -> Result<PageImagesResponse, ApiFailure> {
        let path = format!("pages/{}/images", page_id);
        self.execute("analyze", &path, None).await
    }

    /// Server health and whether it can generate. Not retried.
    pub async fn ping(&self) -> Result<PingResponse, ApiFailure> {
        let response = self
            .transport
            .get_json("ping")
            .await
            .map_err(|e| ApiFailure::transport(e.to_string()))?;
        if !response.is_success() {
            return Err(failure_from_error_response(&response));
        }
        serde_json::from_str(&response.body).map_err(|_| {
            ApiFailure::malformed("Invalid response from server.", response.status, &response.body)
        })
    }

    /// Run one call under the retry policy.
    async fn execute<R: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        body: Option<&Value>,
    ) -> Result<R, ApiFailure> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.attempt(path, body).await {
                RequestOutcome::Success(value) => {
                    if attempt > 1 {
                        tracing::info!(operation, attempt, "request succeeded after retry");
                    }
                    return Ok(value);
                }
                RequestOutcome::FatalFailure(failure) => return Err(failure),
                RequestOutcome::RetryableFailure(failure) => {
                    if attempt >= max_attempts {
                        tracing::warn!(
                            operation,
                            attempt,
                            error = %failure,
                            "giving up after final attempt"
                        );
                        return Err(failure);
                    }
                    tracing::warn!(
                        operation,
                        attempt,
                        status = ?failure.status(),
                        error = %failure,
                        delay_ms = self.policy.retry_delay.as_millis() as u64,
                        "retryable failure, retrying"
                    );
                    tokio::time::sleep(self.policy.retry_delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt<R: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&Value>,
    ) -> RequestOutcome<R> {
        let result = match body {
            Some(body) => self.transport.post_json(path, body).await,
            None => self.transport.get_json(path).await,
        };

        let response = match result {
            Ok(response) => response,
            Err(e) => return RequestOutcome::RetryableFailure(ApiFailure::transport(e.to_string())),
        };

        if !response.is_success() {
            return RequestOutcome::from_failure(failure_from_error_response(&response));
        }

        let value: Value = match serde_json::from_str(&response.body) {
            Ok(value) => value,
            Err(_) => {
                return RequestOutcome::FatalFailure(ApiFailure::malformed(
                    "Invalid response from server.",
                    response.status,
                    &response.body,
                ))
            }
        };

        // Soft failures arrive with a success status and an error body
        if value.get("code").is_some_and(Value::is_string) {
            return match serde_json::from_value::<ErrorBody>(value) {
                Ok(error) => RequestOutcome::from_failure(ApiFailure::from_error_body(
                    error,
                    response.status,
                )),
                Err(_) => RequestOutcome::FatalFailure(ApiFailure::malformed(
                    "Invalid response from server.",
                    response.status,
                    &response.body,
                )),
            };
        }

        match serde_json::from_value::<R>(value) {
            Ok(parsed) => RequestOutcome::Success(parsed),
            Err(e) => {
                let mut failure = ApiFailure::malformed(
                    "Invalid response format from server.",
                    response.status,
                    &response.body,
                );
                if let ApiFailure::FatalFormat { parse_error, .. } = &mut failure {
                    *parse_error = Some(e.to_string());
                }
                RequestOutcome::FatalFailure(failure)
            }
        }
    }
}

/// Map a non-success response to a failure, preferring the structured body.
fn failure_from_error_response(response: &TransportResponse) -> ApiFailure {
    if let Ok(body) = serde_json::from_str::<ErrorBody>(&response.body) {
        return ApiFailure::from_error_body(body, response.status);
    }

    let message = if response.body.trim().is_empty() {
        format!("Request failed with HTTP status {}.", response.status)
    } else {
        format!(
            "Request failed with HTTP status {}: {}",
            response.status,
            snippet(response.body.trim(), 120)
        )
    };
    ApiFailure::from_status(response.status, message)
}

#[async_trait]
impl<T: ApiTransport> MetaApi for MetaApiClient<T> {
    async fn generate(&self, item: &WorkItem) -> Result<GeneratedMeta, ApiFailure> {
        let request = GenerateRequest::from(item);
        let body = serde_json::to_value(&request).map_err(|e| ApiFailure::FatalValidation {
            code: crate::error::ErrorCode::InvalidRequest,
            message: e.to_string(),
            status: 400,
            detail: None,
        })?;

        let meta: GeneratedMeta = self.execute("generate", "generate", Some(&body)).await?;
        if meta.is_empty() {
            return Err(ApiFailure::SoftEmpty {
                message: "AI returned empty title and alt text.".to_string(),
            });
        }
        Ok(meta)
    }

    async fn update(&self, request: &UpdateRequest) -> Result<UpdateResponse, ApiFailure> {
        let body = serde_json::to_value(request).map_err(|e| ApiFailure::FatalValidation {
            code: crate::error::ErrorCode::InvalidRequest,
            message: e.to_string(),
            status: 400,
            detail: None,
        })?;
        self.execute("update", "update", Some(&body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorClass, ErrorCode};
    use crate::http::{MockReply, MockTransport, TransportError};
    use serde_json::json;
    use tokio::time::Instant;

    fn client(mock: MockTransport) -> MetaApiClient<MockTransport> {
        MetaApiClient::new(mock)
    }

    fn error_json(code: &str, status: u16) -> Value {
        json!({"code": code, "message": format!("{} happened", code), "data": {"status": status}})
    }

    #[tokio::test(start_paused = true)]
    async fn always_503_is_attempted_max_times_with_fixed_delay() {
        let client = client(MockTransport::new().with_reply(
            "generate",
            MockReply::Response(TransportResponse::text(503, "<h1>Service Unavailable</h1>")),
        ));

        let start = Instant::now();
        let err = client.generate(&WorkItem::new(5)).await.unwrap_err();
        let elapsed = start.elapsed();

        assert_eq!(client.transport().call_count("generate"), 2);
        assert_eq!(err.class(), ErrorClass::Transient);
        assert_eq!(err.status(), Some(503));
        assert!(elapsed >= Duration::from_millis(4000));
        assert!(elapsed < Duration::from_millis(8000));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_budget_follows_policy() {
        let client = MetaApiClient::with_policy(
            MockTransport::new().with_json("update", 429, error_json("upstream_api_error", 429)),
            RetryPolicy {
                max_attempts: 3,
                retry_delay: Duration::from_millis(100),
            },
        );

        let start = Instant::now();
        let err = client
            .update(&UpdateRequest {
                image_id: 1,
                new_title: Some("t".into()),
                new_alt: None,
            })
            .await
            .unwrap_err();

        assert_eq!(client.transport().call_count("update"), 3);
        assert!(err.is_retryable());
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_then_success() {
        let client = client(
            MockTransport::new()
                .with_error("generate", TransportError::Timeout)
                .with_json("generate", 200, json!({"title": "Red bike", "alt": "A red bike"})),
        );

        let meta = client
            .generate(&WorkItem::new(5).with_keywords("bike", ""))
            .await
            .unwrap();

        assert_eq!(meta.title, "Red bike");
        let calls = client.transport().calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0].body,
            Some(json!({"image_id": 5, "focus_keyword": "bike", "secondary_keyword": ""}))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn soft_empty_is_not_retried() {
        let client = client(
            MockTransport::new().with_json("generate", 200, error_json("returned_empty", 200)),
        );

        let err = client.generate(&WorkItem::new(5)).await.unwrap_err();

        assert!(matches!(err, ApiFailure::SoftEmpty { .. }));
        assert_eq!(client.transport().call_count("generate"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_strings_are_soft_empty() {
        let client = client(MockTransport::new().with_json(
            "generate",
            200,
            json!({"title": "", "alt": ""}),
        ));

        let err = client.generate(&WorkItem::new(5)).await.unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ReturnedEmpty));
        assert_eq!(client.transport().call_count("generate"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn validation_errors_are_fatal_with_detail() {
        let client = client(MockTransport::new().with_json(
            "update",
            500,
            json!({
                "code": "update_failed",
                "message": "Failed to update some metadata.",
                "data": {"status": 500, "errors": {"alt": "Failed to update alt text."}}
            }),
        ));

        let err = client
            .update(&UpdateRequest {
                image_id: 3,
                new_title: None,
                new_alt: Some("x".into()),
            })
            .await
            .unwrap_err();

        assert_eq!(err.class(), ErrorClass::FatalValidation);
        assert!(err.display_message().contains("Failed to update alt text."));
        assert_eq!(client.transport().call_count("update"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn forbidden_is_fatal_auth() {
        let client =
            client(MockTransport::new().with_json("generate", 403, error_json("forbidden", 403)));

        let err = client.generate(&WorkItem::new(1)).await.unwrap_err();
        assert!(err.halts_batch());
        assert_eq!(client.transport().call_count("generate"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_json_success_is_format_failure() {
        let client = client(MockTransport::new().with_reply(
            "generate",
            MockReply::Response(TransportResponse::text(200, "<html>login</html>")),
        ));

        let err = client.generate(&WorkItem::new(1)).await.unwrap_err();
        match err {
            ApiFailure::FatalFormat { raw_snippet, .. } => {
                assert_eq!(raw_snippet.as_deref(), Some("<html>login</html>"));
            }
            other => panic!("expected format failure, got {:?}", other),
        }
        assert_eq!(client.transport().call_count("generate"), 1);
    }

    #[tokio::test]
    async fn missing_fields_are_format_failure() {
        let client =
            client(MockTransport::new().with_json("generate", 200, json!({"title": "only"})));

        let err = client.generate(&WorkItem::new(1)).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::FatalFormat);
    }

    #[tokio::test]
    async fn page_images_uses_get() {
        let client = client(MockTransport::new().with_json(
            "pages/9/images",
            200,
            json!({"page_id": 9, "images": [
                {"image_id": 4, "url": "https://x.com/a.jpg", "filename": "a.jpg", "title": "", "alt": ""}
            ]}),
        ));

        let page = client.page_images(9).await.unwrap();
        assert_eq!(page.images.len(), 1);
        assert_eq!(client.transport().calls()[0].method, "GET");
    }
    #[tokio::test]
    async fn ping_reports_key_status() {
        let client = client(MockTransport::new().with_json(
            "ping",
            200,
            json!({"message": "pong", "version": "0.3.0", "key_configured": false}),
        ));

        let status = client.ping().await.unwrap();
        assert_eq!(status.message, "pong");
        assert!(!status.key_configured);
    }

    #[tokio::test(start_paused = true)]
    async fn ping_is_not_retried() {
        let client = client(MockTransport::new().with_reply(
            "ping",
            MockReply::Response(TransportResponse::text(503, "<h1>down</h1>")),
        ));

        let err = client.ping().await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Transient);
        assert_eq!(client.transport().call_count("ping"), 1);
    }
}
