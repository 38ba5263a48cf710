pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod gemini;
pub mod http;
pub mod media;
pub mod orchestrator;
pub mod service;
pub mod text;
pub mod types;

pub use client::{MetaApi, MetaApiClient, RequestOutcome, RetryPolicy};
pub use config::{ClientSettings, ConfigError, ServerSettings};
pub use error::{ApiFailure, ErrorClass, ErrorCode, FailureDetail};
pub use extract::{
    extract_image_references, extract_page, extract_with_stats, normalize_url, ExtractionOutput,
};
pub use gemini::{create_provider, FakeProvider, GeminiProvider, ProviderError, VisionProvider};
pub use http::{
    ApiTransport, MockReply, MockTransport, ReqwestTransport, TransportBuilder, TransportError,
    TransportResponse,
};
pub use media::{Attachment, Library, LibraryStore, MediaStore, StoreError};
pub use orchestrator::{
    BulkAction, BulkError, BulkOrchestrator, BulkSummary, HaltReason, NoticeLevel, Operator,
    RowState, WorkRow,
};
pub use service::{MetaService, ServiceError};
pub use types::{
    ErrorBody, ErrorData, GenerateRequest, GeneratedMeta, ImageReference, PageImage,
    PageImagesResponse, SourceHint, UpdateRequest, UpdateResponse, WorkItem,
};
