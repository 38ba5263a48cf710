//! Generate, update and page-analysis endpoints, independent of HTTP framing.
//!
//! Every failure is a [`ServiceError`]: a machine-readable code, a message
//! safe to show an operator, and the HTTP status the server should answer
//! with (carried in `data.status`, so it survives serialization).

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::error::{snippet, ErrorCode};
use crate::extract::extract_page;
use crate::gemini::{
    parse_generated_meta, render_prompt, ImageInput, ProviderError, VisionProvider,
};
use crate::media::{Attachment, MediaStore};
use crate::text::sanitize_text_field;
use crate::types::{
    ErrorBody, ErrorData, GenerateRequest, GeneratedMeta, PageImage, PageImagesResponse,
    UpdateRequest, UpdateResponse,
};

const FALLBACK_MIME_TYPE: &str = "image/jpeg";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ServiceError {
    pub code: ErrorCode,
    pub message: String,
    pub data: ErrorData,
}

impl ServiceError {
    pub fn new(code: ErrorCode, status: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: ErrorData {
                status,
                ..Default::default()
            },
        }
    }

    pub fn http_status(&self) -> u16 {
        self.data.status
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code,
            message: self.message.clone(),
            data: self.data.clone(),
        }
    }

    fn invalid_request(message: &str) -> Self {
        Self::new(ErrorCode::InvalidRequest, 400, message)
    }

    fn invalid_image() -> Self {
        Self::new(
            ErrorCode::InvalidImage,
            404,
            "Invalid or non-existent image ID.",
        )
    }

    fn permission_denied() -> Self {
        Self::new(
            ErrorCode::PermissionDenied,
            403,
            "You do not have permission to edit this specific image.",
        )
    }
}

impl From<ProviderError> for ServiceError {
    fn from(err: ProviderError) -> Self {
        let message = err.to_string();
        match err {
            ProviderError::Connection { .. } => {
                Self::new(ErrorCode::UpstreamConnectionError, 503, message)
            }
            ProviderError::Api { status, .. } => {
                let mut e = Self::new(ErrorCode::UpstreamApiError, status, message);
                e.data.upstream_status = Some(status);
                e
            }
            ProviderError::InvalidJson { .. } | ProviderError::MissingText => {
                Self::new(ErrorCode::InvalidResponseFormat, 500, message)
            }
            ProviderError::Blocked { reason } => {
                let mut e = Self::new(ErrorCode::Blocked, 400, message);
                e.data.block_reason = Some(reason);
                e
            }
            ProviderError::MissingCandidates => {
                let mut e = Self::new(ErrorCode::EmptyCandidates, 500, message);
                e.data.finish_reason = Some("UNKNOWN (Missing candidates array)".to_string());
                e
            }
            ProviderError::EmptyCandidates { finish_reason } => {
                let mut e = Self::new(ErrorCode::EmptyCandidates, 500, message);
                e.data.finish_reason = Some(finish_reason);
                e
            }
            ProviderError::NotConfigured(_) => Self::new(ErrorCode::ApiKeyMissing, 400, message),
        }
    }
}

/// Endpoint logic over a media store and an optional vision provider.
///
/// A missing provider means no API key is configured; generation then fails
/// with `api_key_missing` while updates and analysis keep working.
pub struct MetaService {
    store: Arc<dyn MediaStore>,
    provider: Option<Arc<dyn VisionProvider>>,
    prompt_template: Option<String>,
}

impl MetaService {
    pub fn new(store: Arc<dyn MediaStore>, provider: Option<Arc<dyn VisionProvider>>) -> Self {
        Self {
            store,
            provider,
            prompt_template: None,
        }
    }

    pub fn with_prompt_template(mut self, template: Option<String>) -> Self {
        self.prompt_template = template;
        self
    }

    pub fn store(&self) -> &dyn MediaStore {
        self.store.as_ref()
    }

    pub fn provider(&self) -> Option<&Arc<dyn VisionProvider>> {
        self.provider.as_ref()
    }

    /// Look up an editable image attachment.
    fn editable_image(&self, image_id: u64) -> Result<Attachment, ServiceError> {
        if image_id == 0 {
            return Err(ServiceError::invalid_request("Invalid image ID provided."));
        }
        let attachment = self
            .store
            .attachment(image_id)
            .filter(Attachment::is_image)
            .ok_or_else(ServiceError::invalid_image)?;
        if !attachment.editable {
            return Err(ServiceError::permission_denied());
        }
        Ok(attachment)
    }

    /// Generate a title and alt text for one image.
    pub async fn generate(&self, request: &GenerateRequest) -> Result<GeneratedMeta, ServiceError> {
        let attachment = self.editable_image(request.image_id)?;

        let provider = self.provider.as_ref().ok_or_else(|| {
            ServiceError::new(
                ErrorCode::ApiKeyMissing,
                400,
                "Gemini API Key is missing. Please configure it in Settings.",
            )
        })?;

        let data = self.store.read_file(attachment.id).map_err(|e| {
            tracing::error!(image_id = attachment.id, error = %e, "failed to read image file");
            ServiceError::new(ErrorCode::FileAccessError, 500, e.to_string())
        })?;

        let image = ImageInput {
            mime_type: mime_type_for(&attachment),
            data,
        };
        let prompt = render_prompt(
            self.prompt_template.as_deref(),
            &sanitize_text_field(&request.focus_keyword),
            &sanitize_text_field(&request.secondary_keyword),
        );

        tracing::info!(
            image_id = attachment.id,
            provider = provider.provider_name(),
            model = provider.model_name(),
            "generating image metadata"
        );

        let text = provider.generate(&prompt, &image).await.map_err(|e| {
            tracing::warn!(image_id = attachment.id, error = %e, "provider call failed");
            ServiceError::from(e)
        })?;

        let parsed = parse_generated_meta(&text).map_err(|failure| {
            tracing::warn!(
                image_id = attachment.id,
                json_error = %failure.json_error,
                "model output was not a title/alt object"
            );
            let mut e = ServiceError::new(
                ErrorCode::InvalidResponseFormat,
                500,
                failure.to_string(),
            );
            e.data.raw_text_snippet = Some(failure.raw_snippet);
            e.data.json_error = Some(failure.json_error);
            e
        })?;

        let meta = GeneratedMeta {
            title: sanitize_text_field(&parsed.title),
            alt: sanitize_text_field(&parsed.alt),
        };

        if meta.is_empty() {
            let mut e = ServiceError::new(
                ErrorCode::ReturnedEmpty,
                200,
                "AI returned an empty title and alt text.",
            );
            e.data.raw_text_snippet = Some(snippet(&text, 200));
            return Err(e);
        }

        Ok(meta)
    }

    /// Write a new title and/or alt text for one image.
    ///
    /// Fields are written independently; a failure on one does not stop the
    /// other, and every failure is reported in `data.errors`.
    pub fn update(&self, request: &UpdateRequest) -> Result<UpdateResponse, ServiceError> {
        let attachment = self.editable_image(request.image_id)?;

        if request.new_title.is_none() && request.new_alt.is_none() {
            return Err(ServiceError::new(
                ErrorCode::NothingToUpdate,
                400,
                "No new title or alt text provided for update.",
            ));
        }

        let mut errors = BTreeMap::new();

        if let Some(title) = &request.new_title {
            let title = sanitize_text_field(title);
            if let Err(e) = self.store.set_title(attachment.id, &title) {
                errors.insert("title".to_string(), format!("Failed to update title: {}", e));
            }
        }

        if let Some(alt) = &request.new_alt {
            let alt = sanitize_text_field(alt);
            if let Err(e) = self.store.set_alt(attachment.id, &alt) {
                errors.insert(
                    "alt".to_string(),
                    format!("Failed to update alt text: {}", e),
                );
            }
        }

        if !errors.is_empty() {
            tracing::error!(image_id = attachment.id, ?errors, "image metadata update failed");
            let mut e = ServiceError::new(
                ErrorCode::UpdateFailed,
                500,
                "One or more fields failed to update.",
            );
            e.data.errors = Some(errors);
            return Err(e);
        }

        let stored = self.store.attachment(attachment.id).unwrap_or(attachment);
        tracing::info!(image_id = stored.id, "image metadata updated");

        Ok(UpdateResponse {
            message: "Image metadata updated successfully.".to_string(),
            updated_title: stored.title,
            updated_alt: stored.alt,
        })
    }

    /// List the media-library images referenced by a page.
    ///
    /// URLs that do not resolve to an image attachment are dropped; each
    /// attachment appears once, at its first reference.
    pub fn analyze_page(&self, page_id: u64) -> Result<PageImagesResponse, ServiceError> {
        let references = extract_page(self.store.as_ref(), page_id)
            .ok_or_else(|| ServiceError::new(ErrorCode::PageNotFound, 404, "Page not found."))?;

        let mut seen = HashSet::new();
        let images: Vec<PageImage> = references
            .iter()
            .filter_map(|reference| {
                reference
                    .attachment_id
                    .or_else(|| self.store.find_attachment_by_url(&reference.url))
            })
            .filter(|id| seen.insert(*id))
            .filter_map(|id| self.store.attachment(id))
            .filter(Attachment::is_image)
            .map(|attachment| PageImage {
                image_id: attachment.id,
                filename: attachment.filename(),
                url: attachment.url,
                title: attachment.title,
                alt: attachment.alt,
            })
            .collect();

        tracing::debug!(
            page_id,
            references = references.len(),
            images = images.len(),
            "page analyzed"
        );

        Ok(PageImagesResponse { page_id, images })
    }
}

/// MIME type for the model: the stored one when it is an image type,
/// otherwise guessed from the file name or URL.
fn mime_type_for(attachment: &Attachment) -> String {
    if let Some(mime) = attachment
        .mime_type
        .as_deref()
        .filter(|m| m.starts_with("image/"))
    {
        return mime.to_string();
    }

    let name = attachment
        .file
        .as_deref()
        .and_then(Path::to_str)
        .unwrap_or(&attachment.url);
    let path = name.split(['?', '#']).next().unwrap_or(name);
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "jpg" | "jpeg" => "image/jpeg",
        _ => FALLBACK_MIME_TYPE,
    }
    .to_string()
}
