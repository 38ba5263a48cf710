//! Image reference extraction from page markup.
//!
//! Extraction runs an ordered cascade of independent matchers over the raw
//! markup (and, for builder pages, the page's builder metadata). Every matcher
//! appends candidates; none short-circuits the others. The union is then
//! normalized and deduplicated, keeping first-seen order.
//!
//! Over-collection is expected: callers drop URLs that do not resolve to a
//! media attachment.

mod matchers;
mod meta;
pub mod serialized;

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use url::Url;

use crate::media::MediaStore;
use crate::text::decode_entities;
use crate::types::{ImageReference, SourceHint};

pub(crate) use matchers::MarkupInput;

/// File extensions treated as images everywhere in extraction.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// `-<w>x<h>` immediately before the extension, as added to resized copies.
static THUMBNAIL_SUFFIX_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)-\d+x\d+(\.(?:jpg|jpeg|png|gif|webp))$").expect("Invalid thumbnail regex")
});

/// A raw, not yet normalized, match produced by one matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Candidate {
    pub url: String,
    pub hint: SourceHint,
    pub attachment_id: Option<u64>,
}

impl Candidate {
    pub fn new(url: impl Into<String>, hint: SourceHint) -> Self {
        Self {
            url: url.into(),
            hint,
            attachment_id: None,
        }
    }

    pub fn attachment(url: String, id: u64, hint: SourceHint) -> Self {
        Self {
            url,
            hint,
            attachment_id: Some(id),
        }
    }
}

/// How many raw candidates one matcher contributed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatcherStats {
    pub matcher: &'static str,
    pub candidates: usize,
}

/// Extraction result with per-matcher statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionOutput {
    pub references: Vec<ImageReference>,
    pub raw_candidates: usize,
    pub matchers: Vec<MatcherStats>,
}

/// Extract image references from a page's markup.
///
/// `uses_builder` enables the page-builder shortcode cascade. Attachment ids
/// found in markup or metadata are resolved through `store`. Never fails:
/// unmatched or malformed markup yields fewer references.
pub fn extract_image_references(
    page_id: u64,
    markup: &str,
    uses_builder: bool,
    store: &dyn MediaStore,
) -> Vec<ImageReference> {
    extract_with_stats(page_id, markup, uses_builder, store).references
}

/// Like [`extract_image_references`], also reporting what each matcher found.
pub fn extract_with_stats(
    page_id: u64,
    markup: &str,
    uses_builder: bool,
    store: &dyn MediaStore,
) -> ExtractionOutput {
    let input = MarkupInput::new(page_id, markup, store);
    let mut candidates = Vec::new();
    let mut stats = Vec::new();

    for (name, matcher) in matchers::cascade(uses_builder) {
        let found = matcher(&input);
        stats.push(MatcherStats {
            matcher: name,
            candidates: found.len(),
        });
        candidates.extend(found);
    }

    let raw_candidates = candidates.len();
    let references = normalize_and_dedupe(candidates);

    tracing::debug!(
        page_id,
        uses_builder,
        raw_candidates,
        references = references.len(),
        "extracted image references"
    );

    ExtractionOutput {
        references,
        raw_candidates,
        matchers: stats,
    }
}

/// Extract image references from a page stored in `store`.
pub fn extract_page(store: &dyn MediaStore, page_id: u64) -> Option<Vec<ImageReference>> {
    let page = store.page(page_id)?;
    Some(extract_image_references(
        page_id,
        &page.content,
        page.uses_builder,
        store,
    ))
}

fn normalize_and_dedupe(candidates: Vec<Candidate>) -> Vec<ImageReference> {
    let mut references: Vec<ImageReference> = Vec::new();
    let mut index_by_url: HashMap<String, usize> = HashMap::new();

    for candidate in candidates {
        let Some(url) = normalize_url(&candidate.url) else {
            continue;
        };

        match index_by_url.get(&url) {
            Some(&idx) => {
                // Keep the first occurrence, but remember an id a later matcher resolved
                let existing = &mut references[idx];
                if existing.attachment_id.is_none() {
                    existing.attachment_id = candidate.attachment_id;
                }
            }
            None => {
                index_by_url.insert(url.clone(), references.len());
                references.push(ImageReference {
                    url,
                    attachment_id: candidate.attachment_id,
                    source_hint: candidate.hint,
                });
            }
        }
    }

    references
}

/// Normalize a candidate image URL.
///
/// Decodes HTML entities, trims, requires an absolute URL with a host, strips
/// a trailing `-<w>x<h>` thumbnail suffix from the file name, and drops the
/// query string and fragment. Returns `None` for anything not URL-shaped.
///
/// `https://example.com/img-150x150.jpg?v=2` becomes `https://example.com/img.jpg`.
pub fn normalize_url(raw: &str) -> Option<String> {
    let decoded = decode_entities(raw);
    let trimmed = decoded.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parsed = Url::parse(trimmed).ok()?;
    let host = parsed.host_str()?;
    let path = THUMBNAIL_SUFFIX_REGEX.replace(parsed.path(), "${1}");

    let mut normalized = format!("{}://{}", parsed.scheme(), host);
    if let Some(port) = parsed.port() {
        normalized.push_str(&format!(":{}", port));
    }
    normalized.push_str(&path);
    Some(normalized)
}

/// Whether the path of `value` (ignoring any query or fragment) ends with an
/// image extension.
pub fn has_image_extension(value: &str) -> bool {
    let path = value
        .split(['?', '#'])
        .next()
        .unwrap_or(value)
        .to_ascii_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .any(|ext| path.ends_with(&format!(".{}", ext)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{Attachment, Library, LibraryStore};

    fn store_with(attachments: &[(u64, &str)]) -> LibraryStore {
        LibraryStore::from_library(
            Library {
                attachments: attachments
                    .iter()
                    .map(|(id, url)| Attachment {
                        id: *id,
                        url: url.to_string(),
                        file: None,
                        mime_type: Some("image/jpeg".to_string()),
                        title: String::new(),
                        alt: String::new(),
                        editable: true,
                        modified_at: None,
                    })
                    .collect(),
                pages: vec![],
            },
            ".",
        )
    }

    fn urls(refs: &[ImageReference]) -> Vec<&str> {
        refs.iter().map(|r| r.url.as_str()).collect()
    }

    #[test]
    fn normalizes_thumbnail_and_query() {
        assert_eq!(
            normalize_url("https://example.com/img-150x150.jpg?v=2").as_deref(),
            Some("https://example.com/img.jpg")
        );
    }

    #[test]
    fn normalization_decodes_entities_and_trims() {
        assert_eq!(
            normalize_url("  https://example.com/a.png?x=1&amp;y=2#top ").as_deref(),
            Some("https://example.com/a.png")
        );
    }

    #[test]
    fn normalization_rejects_relative_and_garbage() {
        assert_eq!(normalize_url("/wp-content/uploads/a.jpg"), None);
        assert_eq!(normalize_url("not a url"), None);
        assert_eq!(normalize_url(""), None);
        assert_eq!(normalize_url("data:image/png;base64,AAAA"), None);
    }

    #[test]
    fn normalization_keeps_explicit_port_and_mid_path_dimensions() {
        assert_eq!(
            normalize_url("http://localhost:8080/uploads/800x600/photo-1024x768.webp").as_deref(),
            Some("http://localhost:8080/uploads/800x600/photo.webp")
        );
    }

    #[test]
    fn image_extension_ignores_query() {
        assert!(has_image_extension("https://x.com/a.JPG?ver=2"));
        assert!(!has_image_extension("https://x.com/a.svg"));
        assert!(!has_image_extension("https://x.com/jpg"));
    }

    #[test]
    fn end_to_end_img_tag_and_gallery() {
        let store = store_with(&[(42, "https://x.com/b.jpg")]);
        let markup = r#"<img src="https://x.com/a-100x100.png">
[et_pb_gallery gallery_ids="42" _builder_version="4.16"][/et_pb_gallery]"#;

        let refs = extract_image_references(1, markup, true, &store);

        assert_eq!(urls(&refs), vec!["https://x.com/a.png", "https://x.com/b.jpg"]);
        assert_eq!(refs[0].source_hint, SourceHint::StandardHtml);
        assert_eq!(refs[1].source_hint, SourceHint::BuilderGallery);
        assert_eq!(refs[1].attachment_id, Some(42));
    }

    #[test]
    fn same_image_in_different_forms_dedupes() {
        let store = store_with(&[]);
        let markup = r#"
            <img src="https://x.com/photo-300x200.jpg">
            <img src="https://x.com/photo.jpg?ver=5">
            <a href="https://x.com/photo.jpg#zoom">full size</a>
        "#;

        let refs = extract_image_references(1, markup, false, &store);
        assert_eq!(urls(&refs), vec!["https://x.com/photo.jpg"]);
    }

    #[test]
    fn extraction_is_idempotent() {
        let store = store_with(&[(5, "https://x.com/gallery-5.jpg")]);
        let markup = r#"
            <div style="background-image: url('https://x.com/bg.jpg')"></div>
            [et_pb_slide image="https://x.com/slide.png"][/et_pb_slide]
            <img src="https://x.com/a.jpg" srcset="https://x.com/a-300x300.jpg 300w, https://x.com/a-600x600.jpg 600w">
            [et_pb_gallery gallery_ids="5,6"][/et_pb_gallery]
        "#;

        let first = extract_image_references(3, markup, true, &store);
        let second = extract_image_references(3, markup, true, &store);
        assert_eq!(first, second);
        assert_eq!(
            urls(&first),
            vec![
                "https://x.com/a.jpg",
                "https://x.com/gallery-5.jpg",
                "https://x.com/slide.png",
                "https://x.com/bg.jpg",
            ]
        );
    }

    #[test]
    fn builder_shortcodes_ignored_without_builder_flag() {
        let store = store_with(&[(42, "https://x.com/b.jpg")]);
        let markup = r#"[et_pb_gallery gallery_ids="42"][/et_pb_gallery]"#;

        assert!(extract_image_references(1, markup, false, &store).is_empty());
        assert_eq!(extract_image_references(1, markup, true, &store).len(), 1);
    }

    #[test]
    fn stats_report_every_matcher() {
        let store = store_with(&[]);
        let output = extract_with_stats(1, r#"<img src="https://x.com/a.jpg">"#, false, &store);

        assert_eq!(output.references.len(), 1);
        // img tag plus the raw URL scan
        assert_eq!(output.raw_candidates, 2);
        assert!(output
            .matchers
            .iter()
            .any(|m| m.matcher == "img_tags" && m.candidates == 1));
        assert!(output.matchers.iter().all(|m| m.matcher != "builder_gallery"));
    }
}
