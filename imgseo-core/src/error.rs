//! Error taxonomy shared by the endpoint service, the retrying client and the
//! bulk orchestrator.
//!
//! The server reports failures as a machine-readable [`ErrorCode`] plus an
//! HTTP status. The client folds those into an [`ApiFailure`], whose variant
//! decides whether a call is retried, fails one item, or halts a whole batch.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::types::{ErrorBody, ErrorData};

/// Machine-readable error codes returned by the generate/update endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    Forbidden,
    InvalidImage,
    PermissionDenied,
    ApiKeyMissing,
    FileAccessError,
    UpstreamConnectionError,
    UpstreamApiError,
    InvalidResponseFormat,
    Blocked,
    EmptyCandidates,
    ReturnedEmpty,
    NothingToUpdate,
    UpdateFailed,
    PageNotFound,
    /// A code this build does not know about; classified by HTTP status.
    #[serde(other)]
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::InvalidImage => "invalid_image",
            ErrorCode::PermissionDenied => "permission_denied",
            ErrorCode::ApiKeyMissing => "api_key_missing",
            ErrorCode::FileAccessError => "file_access_error",
            ErrorCode::UpstreamConnectionError => "upstream_connection_error",
            ErrorCode::UpstreamApiError => "upstream_api_error",
            ErrorCode::InvalidResponseFormat => "invalid_response_format",
            ErrorCode::Blocked => "blocked",
            ErrorCode::EmptyCandidates => "empty_candidates",
            ErrorCode::ReturnedEmpty => "returned_empty",
            ErrorCode::NothingToUpdate => "nothing_to_update",
            ErrorCode::UpdateFailed => "update_failed",
            ErrorCode::PageNotFound => "page_not_found",
            ErrorCode::Unknown => "unknown",
        }
    }

    /// Classify a failure carrying this code and HTTP status.
    ///
    /// Known codes win over the status: an `invalid_response_format` sent
    /// with a 500 is still a format failure, not a transient one.
    pub fn class(&self, status: u16) -> ErrorClass {
        match self {
            ErrorCode::Forbidden | ErrorCode::ApiKeyMissing => ErrorClass::FatalAuth,
            ErrorCode::UpstreamConnectionError => ErrorClass::Transient,
            ErrorCode::InvalidResponseFormat | ErrorCode::EmptyCandidates => {
                ErrorClass::FatalFormat
            }
            ErrorCode::ReturnedEmpty => ErrorClass::SoftEmpty,
            ErrorCode::InvalidRequest
            | ErrorCode::InvalidImage
            | ErrorCode::PermissionDenied
            | ErrorCode::FileAccessError
            | ErrorCode::Blocked
            | ErrorCode::NothingToUpdate
            | ErrorCode::UpdateFailed
            | ErrorCode::PageNotFound => ErrorClass::FatalValidation,
            ErrorCode::UpstreamApiError | ErrorCode::Unknown => ErrorClass::from_status(status),
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse failure classes driving retry and halt decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Timeouts, 429, 5xx. Retried automatically.
    Transient,
    /// 401/403 or missing credentials. Never retried; halts a batch.
    FatalAuth,
    /// Bad input, unknown image, per-item permission. Fails one item.
    FatalValidation,
    /// Upstream output not usable as a title/alt pair. Fails one item.
    FatalFormat,
    /// Well-formed but empty result. Not retried, not a success either.
    SoftEmpty,
}

impl ErrorClass {
    pub fn from_status(status: u16) -> Self {
        match status {
            429 | 500..=504 => ErrorClass::Transient,
            401 | 403 => ErrorClass::FatalAuth,
            _ => ErrorClass::FatalValidation,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Transient)
    }
}

/// Structured detail attached to a validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureDetail {
    /// Per-field messages from a partially failed update.
    FieldErrors(BTreeMap<String, String>),
    /// Content-safety block reason reported by the AI provider.
    BlockReason(String),
    /// Why the provider stopped generating.
    FinishReason(String),
    /// Status reported by the AI provider itself.
    Upstream { status: u16 },
}

impl FailureDetail {
    fn from_data(data: &ErrorData) -> Option<Self> {
        if let Some(errors) = &data.errors {
            return Some(FailureDetail::FieldErrors(errors.clone()));
        }
        if let Some(reason) = &data.block_reason {
            return Some(FailureDetail::BlockReason(reason.clone()));
        }
        if let Some(reason) = &data.finish_reason {
            return Some(FailureDetail::FinishReason(reason.clone()));
        }
        data.upstream_status
            .map(|status| FailureDetail::Upstream { status })
    }

    fn describe(&self) -> String {
        match self {
            FailureDetail::FieldErrors(errors) => {
                let fields: Vec<String> = errors
                    .iter()
                    .map(|(field, msg)| format!("{}: {}", field, msg))
                    .collect();
                format!("Details: {}", fields.join("; "))
            }
            FailureDetail::BlockReason(reason) => format!("Block Reason: {}", reason),
            FailureDetail::FinishReason(reason) => format!("Finish Reason: {}", reason),
            FailureDetail::Upstream { status } => format!("Upstream status: {}", status),
        }
    }
}

/// A failed generate/update call, as seen by the caller after retries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiFailure {
    #[error("{reason}")]
    Transient { reason: String, status: Option<u16> },

    #[error("{message}")]
    FatalAuth {
        code: ErrorCode,
        message: String,
        status: Option<u16>,
    },

    #[error("{message}")]
    FatalValidation {
        code: ErrorCode,
        message: String,
        status: u16,
        detail: Option<FailureDetail>,
    },

    #[error("{message}")]
    FatalFormat {
        code: ErrorCode,
        message: String,
        status: Option<u16>,
        raw_snippet: Option<String>,
        parse_error: Option<String>,
    },

    #[error("{message}")]
    SoftEmpty { message: String },
}

impl ApiFailure {
    /// Build a failure from an error body returned by the server.
    pub fn from_error_body(body: ErrorBody, http_status: u16) -> Self {
        let status = if body.data.status == 0 {
            http_status
        } else {
            body.data.status
        };
        let ErrorBody {
            code,
            message,
            data,
        } = body;

        match code.class(status) {
            ErrorClass::Transient => ApiFailure::Transient {
                reason: message,
                status: Some(status),
            },
            ErrorClass::FatalAuth => ApiFailure::FatalAuth {
                code,
                message,
                status: Some(status),
            },
            ErrorClass::FatalValidation => ApiFailure::FatalValidation {
                code,
                message,
                status,
                detail: FailureDetail::from_data(&data),
            },
            ErrorClass::FatalFormat => ApiFailure::FatalFormat {
                code,
                message,
                status: Some(status),
                raw_snippet: data.raw_text_snippet,
                parse_error: data.json_error.or(data.finish_reason),
            },
            ErrorClass::SoftEmpty => ApiFailure::SoftEmpty { message },
        }
    }

    /// Build a failure from a bare HTTP status with no usable error body.
    pub fn from_status(status: u16, message: String) -> Self {
        match ErrorClass::from_status(status) {
            ErrorClass::Transient => ApiFailure::Transient {
                reason: message,
                status: Some(status),
            },
            ErrorClass::FatalAuth => ApiFailure::FatalAuth {
                code: ErrorCode::Unknown,
                message,
                status: Some(status),
            },
            _ => ApiFailure::FatalValidation {
                code: ErrorCode::Unknown,
                message,
                status,
                detail: None,
            },
        }
    }

    /// A network-level failure (connection refused, timeout).
    pub fn transport(reason: impl Into<String>) -> Self {
        ApiFailure::Transient {
            reason: reason.into(),
            status: None,
        }
    }

    /// A response the client could not make sense of.
    pub fn malformed(message: impl Into<String>, status: u16, raw: &str) -> Self {
        ApiFailure::FatalFormat {
            code: ErrorCode::InvalidResponseFormat,
            message: message.into(),
            status: Some(status),
            raw_snippet: Some(snippet(raw, 200)),
            parse_error: None,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ApiFailure::Transient { .. } => ErrorClass::Transient,
            ApiFailure::FatalAuth { .. } => ErrorClass::FatalAuth,
            ApiFailure::FatalValidation { .. } => ErrorClass::FatalValidation,
            ApiFailure::FatalFormat { .. } => ErrorClass::FatalFormat,
            ApiFailure::SoftEmpty { .. } => ErrorClass::SoftEmpty,
        }
    }

    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ApiFailure::Transient { .. } => None,
            ApiFailure::FatalAuth { code, .. }
            | ApiFailure::FatalValidation { code, .. }
            | ApiFailure::FatalFormat { code, .. } => Some(*code),
            ApiFailure::SoftEmpty { .. } => Some(ErrorCode::ReturnedEmpty),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiFailure::Transient { status, .. }
            | ApiFailure::FatalAuth { status, .. }
            | ApiFailure::FatalFormat { status, .. } => *status,
            ApiFailure::FatalValidation { status, .. } => Some(*status),
            ApiFailure::SoftEmpty { .. } => Some(200),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class().is_retryable()
    }

    /// Whether this failure means no remaining item in a batch can succeed:
    /// missing credentials, or any 401/403 regardless of code.
    pub fn halts_batch(&self) -> bool {
        matches!(self, ApiFailure::FatalAuth { .. })
            || matches!(self.status(), Some(401) | Some(403))
    }

    /// Message for display, with any structured detail appended.
    pub fn display_message(&self) -> String {
        match self {
            ApiFailure::FatalValidation {
                message,
                detail: Some(detail),
                ..
            } => format!("{} {}", message, detail.describe()),
            ApiFailure::FatalFormat {
                message,
                raw_snippet,
                parse_error,
                ..
            } => {
                let mut out = message.clone();
                if let Some(raw) = raw_snippet {
                    out.push_str(&format!(" Raw AI Response Snippet: {}", raw));
                }
                if let Some(err) = parse_error {
                    out.push_str(&format!(" (Parsing Error: {})", err));
                }
                out
            }
            other => other.to_string(),
        }
    }
}

/// First `max_chars` characters of `text`, on a char boundary.
pub fn snippet(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(code: ErrorCode, status: u16) -> ErrorBody {
        ErrorBody {
            code,
            message: "boom".to_string(),
            data: ErrorData {
                status,
                ..Default::default()
            },
        }
    }

    #[test]
    fn status_classification() {
        assert_eq!(ErrorClass::from_status(429), ErrorClass::Transient);
        assert_eq!(ErrorClass::from_status(500), ErrorClass::Transient);
        assert_eq!(ErrorClass::from_status(504), ErrorClass::Transient);
        assert_eq!(ErrorClass::from_status(505), ErrorClass::FatalValidation);
        assert_eq!(ErrorClass::from_status(401), ErrorClass::FatalAuth);
        assert_eq!(ErrorClass::from_status(403), ErrorClass::FatalAuth);
        assert_eq!(ErrorClass::from_status(404), ErrorClass::FatalValidation);
    }

    #[test]
    fn known_code_overrides_server_error_status() {
        let failure = ApiFailure::from_error_body(body(ErrorCode::InvalidResponseFormat, 500), 500);
        assert_eq!(failure.class(), ErrorClass::FatalFormat);
        assert!(!failure.is_retryable());
    }

    #[test]
    fn upstream_api_error_uses_upstream_status() {
        let quota = ApiFailure::from_error_body(body(ErrorCode::UpstreamApiError, 429), 429);
        assert!(quota.is_retryable());

        let forbidden = ApiFailure::from_error_body(body(ErrorCode::UpstreamApiError, 403), 403);
        assert!(forbidden.halts_batch());
    }

    #[test]
    fn missing_key_and_any_403_halt() {
        let missing = ApiFailure::from_error_body(body(ErrorCode::ApiKeyMissing, 400), 400);
        assert!(missing.halts_batch());

        let item = ApiFailure::from_error_body(body(ErrorCode::PermissionDenied, 403), 403);
        assert_eq!(item.class(), ErrorClass::FatalValidation);
        assert!(item.halts_batch());

        let not_found = ApiFailure::from_error_body(body(ErrorCode::InvalidImage, 404), 404);
        assert!(!not_found.halts_batch());
    }

    #[test]
    fn unknown_code_deserializes_and_falls_back_to_status() {
        let parsed: ErrorBody = serde_json::from_str(
            r#"{"code": "rest_cookie_invalid_nonce", "message": "Cookie check failed", "data": {"status": 403}}"#,
        )
        .unwrap();
        assert_eq!(parsed.code, ErrorCode::Unknown);

        let failure = ApiFailure::from_error_body(parsed, 403);
        assert!(failure.halts_batch());
    }

    #[test]
    fn display_message_appends_field_errors() {
        let mut errors = BTreeMap::new();
        errors.insert("alt".to_string(), "write failed".to_string());
        let mut b = body(ErrorCode::UpdateFailed, 500);
        b.data.errors = Some(errors);

        let failure = ApiFailure::from_error_body(b, 500);
        assert_eq!(failure.display_message(), "boom Details: alt: write failed");
    }

    #[test]
    fn snippet_respects_char_boundaries() {
        assert_eq!(snippet("héllo wörld", 4), "héll");
    }
}
