use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ErrorCode;

/// Where in the page an image reference was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SourceHint {
    StandardHtml,
    BuilderModule,
    BuilderGallery,
    BuilderSlider,
    BuilderBackground,
    InlineStyle,
    MetaSerialized,
    RawScan,
}

/// A normalized image URL found in page markup or page metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ImageReference {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_id: Option<u64>,
    pub source_hint: SourceHint,
}

/// One image queued for generate/update processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub image_id: u64,
    #[serde(default)]
    pub focus_keyword: String,
    #[serde(default)]
    pub secondary_keyword: String,
}

impl WorkItem {
    pub fn new(image_id: u64) -> Self {
        Self {
            image_id,
            focus_keyword: String::new(),
            secondary_keyword: String::new(),
        }
    }

    pub fn with_keywords(mut self, focus: &str, secondary: &str) -> Self {
        self.focus_keyword = focus.trim().to_string();
        self.secondary_keyword = secondary.trim().to_string();
        self
    }
}

/// SEO title and alt text produced by one generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GeneratedMeta {
    pub title: String,
    pub alt: String,
}

impl GeneratedMeta {
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.alt.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GenerateRequest {
    pub image_id: u64,
    #[serde(default)]
    pub focus_keyword: String,
    #[serde(default)]
    pub secondary_keyword: String,
}

impl From<&WorkItem> for GenerateRequest {
    fn from(item: &WorkItem) -> Self {
        Self {
            image_id: item.image_id,
            focus_keyword: item.focus_keyword.clone(),
            secondary_keyword: item.secondary_keyword.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateRequest {
    pub image_id: u64,
    #[serde(default)]
    pub new_title: Option<String>,
    #[serde(default)]
    pub new_alt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UpdateResponse {
    pub message: String,
    pub updated_title: String,
    pub updated_alt: String,
}

/// Error body returned by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default)]
    pub data: ErrorData,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorData {
    #[serde(default)]
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text_snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
}

/// A media-library image found on an analyzed page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PageImage {
    pub image_id: u64,
    pub url: String,
    pub filename: String,
    pub title: String,
    pub alt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PageImagesResponse {
    pub page_id: u64,
    pub images: Vec<PageImage>,
}

/// Health check reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PingResponse {
    pub message: String,
    pub version: String,
    /// Whether the server has a vision provider key, i.e. can generate.
    pub key_configured: bool,
}
