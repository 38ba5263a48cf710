//! Vision model provider abstraction.
//!
//! A provider takes a text prompt plus one image and returns the model's raw
//! text. Turning that text into a title/alt pair is [`parse_generated_meta`]'s
//! job, so fakes only need to produce text.

mod fake;
mod parse;
pub mod prompt;
mod provider;

pub use fake::FakeProvider;
pub use parse::{parse_generated_meta, ParseFailure};
pub use prompt::{render_prompt, DEFAULT_PROMPT};
pub use provider::GeminiProvider;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::config::ServerSettings;

/// Image bytes plus MIME type, as sent inline to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Error type for provider calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("{message}")]
    Connection { message: String },

    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Received an unexpected non-JSON response from the AI service despite a success code.")]
    InvalidJson { status: u16 },

    #[error("AI generation blocked due to safety settings ({reason}).")]
    Blocked { reason: String },

    #[error("AI response structure is missing expected data (candidates).")]
    MissingCandidates,

    #[error("{}", finish_reason_message(.finish_reason))]
    EmptyCandidates { finish_reason: String },

    #[error("Could not extract text part from AI response.")]
    MissingText,

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// User-facing explanation for a generation that produced no content.
pub fn finish_reason_message(finish_reason: &str) -> String {
    match finish_reason {
        "MAX_TOKENS" => "AI generation stopped because the maximum output length was reached. Try a shorter prompt or check model limits.".to_string(),
        "SAFETY" => "AI generation blocked due to safety settings (SAFETY).".to_string(),
        "RECITATION" => "AI generation stopped due to potential recitation issues (RECITATION).".to_string(),
        "STOP" | "REASON_UNSPECIFIED" => format!("AI returned no content. Finish Reason: {}.", finish_reason),
        other if other.starts_with("UNKNOWN") => {
            format!("AI returned no content. Finish Reason: {}.", other)
        }
        other => format!("AI generation finished unexpectedly ({}).", other),
    }
}

/// Outcome of checking the configured key against the model list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStatus {
    /// Key works and the model supports `generateContent`.
    Supported,
    /// Key works, the model exists but does not list `generateContent`.
    ModelWithoutGenerate,
    /// Key works but the model is not available to it.
    ModelNotFound,
}

impl KeyStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, KeyStatus::Supported)
    }

    pub fn message(&self, model: &str) -> String {
        match self {
            KeyStatus::Supported => format!(
                "API Key is valid and the selected model \"{}\" supports content generation!",
                model
            ),
            KeyStatus::ModelWithoutGenerate => format!(
                "API Key is valid, but the selected model \"{}\" does not list support for \"generateContent\".",
                model
            ),
            KeyStatus::ModelNotFound => format!(
                "API Key is valid, but the selected model \"{}\" was NOT found in the list of available models for your key.",
                model
            ),
        }
    }
}

/// Trait for vision model providers.
#[async_trait]
pub trait VisionProvider: Send + Sync + fmt::Debug {
    /// Send a prompt and an image, returning the model's text response.
    async fn generate(&self, prompt: &str, image: &ImageInput) -> Result<String, ProviderError>;

    /// Verify the API key and that the configured model can generate content.
    async fn check_key(&self) -> Result<KeyStatus, ProviderError>;

    /// Get the provider name (e.g., "gemini", "fake").
    fn provider_name(&self) -> &'static str;

    /// Get the model name (e.g., "gemini-1.5-flash").
    fn model_name(&self) -> &str;
}

/// Build the provider named by `settings.provider`.
///
/// Returns `Ok(None)` for Gemini without an API key: the service then
/// answers generate requests with `api_key_missing` instead of refusing to
/// start.
pub fn create_provider(
    settings: &ServerSettings,
) -> Result<Option<Arc<dyn VisionProvider>>, ProviderError> {
    match settings.provider.as_str() {
        "fake" => Ok(Some(Arc::new(FakeProvider::default()))),
        "gemini" => Ok(settings.api_key.as_ref().map(|key| {
            Arc::new(
                GeminiProvider::new(key.clone(), settings.model.clone())
                    .with_base_url(settings.base_url.clone()),
            ) as Arc<dyn VisionProvider>
        })),
        other => Err(ProviderError::NotConfigured(format!(
            "Unknown provider: {}",
            other
        ))),
    }
}
