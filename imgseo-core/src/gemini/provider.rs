//! Gemini (Google Generative Language) vision provider.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ImageInput, KeyStatus, ProviderError, VisionProvider};
use crate::config::DEFAULT_GEMINI_BASE_URL;
use crate::error::snippet;

const GENERATE_TIMEOUT: Duration = Duration::from_secs(90);
const CHECK_KEY_TIMEOUT: Duration = Duration::from_secs(30);

static TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("Invalid HTML tag regex"));

/// Gemini API provider.
#[derive(Debug)]
pub struct GeminiProvider {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    /// Create a new GeminiProvider with the given API key and model.
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point the provider at a different API root (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn connection_error(e: reqwest::Error) -> ProviderError {
        let message = if e.is_timeout() {
            "Connection to Gemini API timed out. Please try again later.".to_string()
        } else {
            format!("Failed to connect to Gemini API: {}", e)
        };
        ProviderError::Connection { message }
    }

    /// Map an HTTP error from the generate endpoint to a user-facing message.
    fn api_error(&self, status: u16, body: &str) -> ProviderError {
        let upstream = upstream_message(body);
        let lower = upstream.to_lowercase();

        let message = if status == 400 && lower.contains("api key not valid") {
            "Invalid API Key. Check Settings.".to_string()
        } else if status == 403 {
            "API Key Forbidden. Check Google Project/API permissions.".to_string()
        } else if status == 429 {
            "API Quota Exceeded or Rate Limit hit. Please wait and try again.".to_string()
        } else if status == 400 && lower.contains("user location is not supported") {
            "API access denied based on user location.".to_string()
        } else if lower.contains("model") && lower.contains("not found") {
            format!(
                "Model \"{}\" not found or inaccessible with your API key.",
                self.model
            )
        } else {
            format!("Gemini API Error ({}): {}", status, upstream)
        };

        ProviderError::Api { status, message }
    }
}

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Gemini generateContent request format.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

impl<'a> GenerateRequest<'a> {
    fn new(prompt: &'a str, image: &ImageInput) -> Self {
        Self {
            contents: vec![RequestContent {
                parts: vec![
                    RequestPart::Text(prompt),
                    RequestPart::InlineData(InlineData {
                        mime_type: image.mime_type.clone(),
                        data: base64::engine::general_purpose::STANDARD.encode(&image.data),
                    }),
                ],
            }],
            generation_config: GenerationConfig {
                temperature: 0.5,
                top_p: 0.95,
                top_k: 40,
                candidate_count: 1,
                max_output_tokens: 250,
                stop_sequences: Vec::new(),
            },
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .map(|&category| SafetySetting {
                    category,
                    threshold: "BLOCK_MEDIUM_AND_ABOVE",
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum RequestPart<'a> {
    Text(&'a str),
    InlineData(InlineData),
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    candidate_count: u32,
    max_output_tokens: u32,
    stop_sequences: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

/// Gemini generateContent response format.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    candidates: Option<Vec<ResponseCandidate>>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseCandidate {
    content: Option<ResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelInfo {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

/// Error message from a Gemini error body, or the start of the stripped body.
fn upstream_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            let stripped = TAG_REGEX.replace_all(body, "");
            format!("{}...", snippet(stripped.trim(), 150))
        })
}

/// Turn a successful generateContent body into the model's text.
fn extract_text(status: u16, body: &str) -> Result<String, ProviderError> {
    let value: Value =
        serde_json::from_str(body).map_err(|_| ProviderError::InvalidJson { status })?;
    let response: GenerateResponse =
        serde_json::from_value(value).map_err(|_| ProviderError::MissingCandidates)?;

    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ProviderError::Blocked { reason });
    }

    let candidates = response
        .candidates
        .ok_or(ProviderError::MissingCandidates)?;
    let first = candidates
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::EmptyCandidates {
            finish_reason: "UNKNOWN (Empty candidates array)".to_string(),
        })?;

    let text = first
        .content
        .and_then(|c| c.parts.into_iter().find_map(|p| p.text));

    match (text, first.finish_reason) {
        (Some(text), _) => Ok(text),
        (None, Some(reason)) if reason != "STOP" => {
            Err(ProviderError::EmptyCandidates { finish_reason: reason })
        }
        (None, _) => Err(ProviderError::MissingText),
    }
}

#[async_trait]
impl VisionProvider for GeminiProvider {
    async fn generate(&self, prompt: &str, image: &ImageInput) -> Result<String, ProviderError> {
        let request = GenerateRequest::new(prompt, image);

        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, self.model
        );
        tracing::debug!(
            model = %self.model,
            mime_type = %image.mime_type,
            image_bytes = image.data.len(),
            "calling Gemini generateContent"
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .timeout(GENERATE_TIMEOUT)
            .json(&request)
            .send()
            .await
            .map_err(Self::connection_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(Self::connection_error)?;

        if status >= 400 {
            tracing::warn!(status, model = %self.model, "Gemini API returned an error");
            return Err(self.api_error(status, &body));
        }

        extract_text(status, &body)
    }

    async fn check_key(&self) -> Result<KeyStatus, ProviderError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .query(&[("key", self.api_key.as_str())])
            .timeout(CHECK_KEY_TIMEOUT)
            .send()
            .await
            .map_err(Self::connection_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(Self::connection_error)?;

        if status >= 400 {
            let message = match status {
                400 => "Invalid API Key format or key not recognized.".to_string(),
                403 => "API Key is likely valid but forbidden. Check Google Project/API permissions (ensure Generative Language API is enabled).".to_string(),
                _ => format!("API Key test failed ({}): {}", status, upstream_message(&body)),
            };
            return Err(ProviderError::Api { status, message });
        }

        let list: ModelList =
            serde_json::from_str(&body).map_err(|_| ProviderError::InvalidJson { status })?;
        let wanted = format!("models/{}", self.model);

        Ok(match list.models.iter().find(|m| m.name == wanted) {
            Some(model)
                if model
                    .supported_generation_methods
                    .iter()
                    .any(|m| m == "generateContent") =>
            {
                KeyStatus::Supported
            }
            Some(_) => KeyStatus::ModelWithoutGenerate,
            None => KeyStatus::ModelNotFound,
        })
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let image = ImageInput {
            mime_type: "image/png".to_string(),
            data: vec![0, 0, 0],
        };
        let json = serde_json::to_value(GenerateRequest::new("describe", &image)).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "describe");
        assert_eq!(
            json["contents"][0]["parts"][1]["inline_data"]["mime_type"],
            "image/png"
        );
        assert_eq!(json["contents"][0]["parts"][1]["inline_data"]["data"], "AAAA");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 250);
        assert_eq!(json["generationConfig"]["topK"], 40);
        assert_eq!(json["generationConfig"]["candidateCount"], 1);
        assert_eq!(json["safetySettings"].as_array().unwrap().len(), 4);
        assert_eq!(json["safetySettings"][0]["threshold"], "BLOCK_MEDIUM_AND_ABOVE");
    }

    #[test]
    fn extracts_first_text_part() {
        let body = r#"{"candidates": [{"content": {"parts": [{"text": "{\"title\":\"a\",\"alt\":\"b\"}"}]}, "finishReason": "STOP"}]}"#;
        assert_eq!(extract_text(200, body).unwrap(), r#"{"title":"a","alt":"b"}"#);
    }

    #[test]
    fn classifies_bad_bodies() {
        assert_eq!(
            extract_text(200, "<html>ok</html>"),
            Err(ProviderError::InvalidJson { status: 200 })
        );
        assert_eq!(
            extract_text(200, r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#),
            Err(ProviderError::Blocked { reason: "SAFETY".to_string() })
        );
        assert_eq!(extract_text(200, "{}"), Err(ProviderError::MissingCandidates));
        assert!(matches!(
            extract_text(200, r#"{"candidates": []}"#),
            Err(ProviderError::EmptyCandidates { .. })
        ));
        assert_eq!(
            extract_text(200, r#"{"candidates": [{"finishReason": "MAX_TOKENS"}]}"#),
            Err(ProviderError::EmptyCandidates { finish_reason: "MAX_TOKENS".to_string() })
        );
        assert_eq!(
            extract_text(200, r#"{"candidates": [{"content": {"parts": []}, "finishReason": "STOP"}]}"#),
            Err(ProviderError::MissingText)
        );
    }

    #[test]
    fn api_error_messages() {
        let provider = GeminiProvider::new("k".into(), "gemini-1.5-pro".into());

        let err = provider.api_error(
            400,
            r#"{"error": {"message": "API key not valid. Please pass a valid API key."}}"#,
        );
        assert_eq!(err.to_string(), "Invalid API Key. Check Settings.");

        let err = provider.api_error(429, "{}");
        assert!(err.to_string().starts_with("API Quota Exceeded"));

        let err = provider.api_error(
            404,
            r#"{"error": {"message": "models/gemini-1.5-pro is not found"}}"#,
        );
        assert_eq!(
            err.to_string(),
            "Model \"gemini-1.5-pro\" not found or inaccessible with your API key."
        );

        let err = provider.api_error(502, "<html><body>Bad gateway</body></html>");
        assert_eq!(err.to_string(), "Gemini API Error (502): Bad gateway...");
        assert!(matches!(err, ProviderError::Api { status: 502, .. }));
    }
}
