//! Fake vision provider for testing.
//!
//! Returns deterministic responses based on prompt matching, so the service
//! and server can be exercised without network access or API costs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use super::{ImageInput, KeyStatus, ProviderError, VisionProvider};

/// A fake vision provider for testing.
///
/// Responses are matched by checking if the prompt contains a registered
/// substring (case-insensitive). If no match is found, returns the default
/// response or an error. A scripted error, when set, wins over everything.
#[derive(Debug)]
pub struct FakeProvider {
    /// Map of prompt substring -> response
    responses: RwLock<HashMap<String, String>>,
    default_response: Option<String>,
    error: Option<ProviderError>,
    key_status: KeyStatus,
    calls: AtomicUsize,
}

impl Default for FakeProvider {
    fn default() -> Self {
        Self::new().with_default_response(
            r#"{"title": "Sample image title", "alt": "Sample image description"}"#,
        )
    }
}

impl FakeProvider {
    /// Create a new FakeProvider with no registered responses.
    pub fn new() -> Self {
        Self {
            responses: RwLock::new(HashMap::new()),
            default_response: None,
            error: None,
            key_status: KeyStatus::Supported,
            calls: AtomicUsize::new(0),
        }
    }

    /// Create a FakeProvider that returns a specific response for prompts containing a substring.
    pub fn with_response(prompt_contains: &str, response: &str) -> Self {
        let provider = Self::new();
        provider.add_response(prompt_contains, response);
        provider
    }

    /// Add a response for prompts containing a specific substring.
    pub fn add_response(&self, prompt_contains: &str, response: &str) {
        self.responses
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(prompt_contains.to_lowercase(), response.to_string());
    }

    /// Set the default response when no pattern matches.
    pub fn with_default_response(mut self, response: &str) -> Self {
        self.default_response = Some(response.to_string());
        self
    }

    /// Fail every generate call with `error`.
    pub fn with_error(mut self, error: ProviderError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_key_status(mut self, status: KeyStatus) -> Self {
        self.key_status = status;
        self
    }

    /// Number of generate calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionProvider for FakeProvider {
    async fn generate(&self, prompt: &str, _image: &ImageInput) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = &self.error {
            return Err(error.clone());
        }

        let responses = self.responses.read().unwrap_or_else(|e| e.into_inner());
        let prompt_lower = prompt.to_lowercase();
        if let Some(response) = responses
            .iter()
            .find(|(pattern, _)| prompt_lower.contains(pattern.as_str()))
            .map(|(_, response)| response)
        {
            return Ok(response.clone());
        }

        match &self.default_response {
            Some(response) => Ok(response.clone()),
            None => Err(ProviderError::NotConfigured(format!(
                "FakeProvider: No response configured for prompt (first 100 chars): {}",
                prompt.chars().take(100).collect::<String>()
            ))),
        }
    }

    async fn check_key(&self) -> Result<KeyStatus, ProviderError> {
        Ok(self.key_status.clone())
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }

    fn model_name(&self) -> &str {
        "fake-model"
    }
}
