//! Image references stored in page-builder metadata.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::matchers::{resolve_attachment, MarkupInput};
use super::serialized::{self, MAX_DEPTH};
use super::Candidate;
use crate::media::MediaStore;
use crate::types::SourceHint;

/// Metadata keys written by the page builder and its add-ons.
pub const BUILDER_META_PREFIXES: &[&str] = &["_et_pb", "_et_module", "_divi_", "_dipi_"];

/// Key substrings that mark a numeric value as a probable attachment id.
const IMAGE_KEY_HINTS: &[&str] = &[
    "image",
    "img",
    "src",
    "url",
    "background",
    "bg",
    "photo",
    "picture",
    "thumbnail",
];

static META_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s'",\\]+\.(?:jpg|jpeg|png|gif|webp)"#)
        .expect("Invalid meta URL regex")
});

static IMAGE_VALUE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(?:jpg|jpeg|png|gif|webp)(?:\?.*)?$").expect("Invalid image value regex")
});

static EMBEDDED_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["\[,](\d+)["\],]"#).expect("Invalid embedded id regex"));

pub(crate) fn is_builder_meta_key(key: &str) -> bool {
    BUILDER_META_PREFIXES.iter().any(|p| key.starts_with(p))
}

fn key_suggests_image(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    IMAGE_KEY_HINTS.iter().any(|hint| key.contains(hint))
}

/// Scan every builder metadata value of the page.
///
/// Three passes per value: absolute image URLs anywhere in the text, a
/// depth-first walk of the decoded value when it is serialized, and bare
/// numbers that turn out to be image attachment ids.
pub(crate) fn builder_meta(input: &MarkupInput<'_>) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for entry in input.store.page_meta(input.page_id) {
        if !is_builder_meta_key(&entry.key) {
            continue;
        }

        candidates.extend(
            META_URL_REGEX
                .find_iter(&entry.value)
                .map(|m| Candidate::new(m.as_str(), SourceHint::MetaSerialized)),
        );

        if let Some(decoded @ (Value::Array(_) | Value::Object(_))) =
            serialized::decode(&entry.value)
        {
            walk(&decoded, None, 0, input.store, &mut candidates);
        }

        candidates.extend(embedded_image_ids(&entry.value, input.store));
    }

    candidates
}

/// Depth-first walk over a decoded metadata value, in stored key order.
/// Containers nested past [`MAX_DEPTH`] are not entered.
fn walk(
    value: &Value,
    key: Option<&str>,
    depth: usize,
    store: &dyn MediaStore,
    out: &mut Vec<Candidate>,
) {
    if depth > MAX_DEPTH {
        return;
    }
    let image_key = key.is_some_and(key_suggests_image);

    match value {
        Value::String(s) => {
            let url_like = s.starts_with('/') || s.to_ascii_lowercase().starts_with("http");
            if url_like && IMAGE_VALUE_REGEX.is_match(s) {
                out.push(Candidate::new(s.as_str(), SourceHint::MetaSerialized));
            } else if image_key && !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
                out.extend(resolve_attachment(store, s, SourceHint::MetaSerialized));
            }
        }
        Value::Number(n) if image_key => {
            if let Some(id) = n.as_u64() {
                out.extend(resolve_attachment(
                    store,
                    &id.to_string(),
                    SourceHint::MetaSerialized,
                ));
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, None, depth + 1, store, out);
            }
        }
        Value::Object(map) => {
            for (k, v) in map {
                walk(v, Some(k), depth + 1, store, out);
            }
        }
        _ => {}
    }
}

/// Quoted or list-delimited integers that name image attachments.
fn embedded_image_ids(raw: &str, store: &dyn MediaStore) -> Vec<Candidate> {
    EMBEDDED_ID_REGEX
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<u64>().ok())
        .filter(|&id| id > 0 && store.is_image_attachment(id))
        .filter_map(|id| {
            let url = store.attachment_url(id)?;
            Some(Candidate::attachment(url, id, SourceHint::MetaSerialized))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{Attachment, Library, LibraryStore, MetaEntry, Page};

    fn store(meta: Vec<(&str, &str)>) -> LibraryStore {
        let attachment = |id: u64, url: &str, mime: &str| Attachment {
            id,
            url: url.to_string(),
            file: None,
            mime_type: Some(mime.to_string()),
            title: String::new(),
            alt: String::new(),
            editable: true,
            modified_at: None,
        };
        LibraryStore::from_library(
            Library {
                attachments: vec![
                    attachment(21, "https://x.com/twenty-one.jpg", "image/jpeg"),
                    attachment(22, "https://x.com/manual.pdf", "application/pdf"),
                    attachment(23, "https://x.com/twenty-three.png", "image/png"),
                ],
                pages: vec![Page {
                    id: 9,
                    title: "Home".to_string(),
                    content: String::new(),
                    uses_builder: true,
                    meta: meta
                        .into_iter()
                        .map(|(k, v)| MetaEntry {
                            key: k.to_string(),
                            value: v.to_string(),
                        })
                        .collect(),
                }],
            },
            ".",
        )
    }

    fn run(store: &LibraryStore) -> Vec<String> {
        let input = MarkupInput::new(9, "", store);
        builder_meta(&input).into_iter().map(|c| c.url).collect()
    }

    #[test]
    fn ignores_non_builder_keys() {
        let store = store(vec![("_yoast_image", "https://x.com/seo.jpg")]);
        assert!(run(&store).is_empty());
    }

    #[test]
    fn finds_plain_urls_in_values() {
        let store = store(vec![("_et_pb_bg", "url(https://x.com/hero.jpg) center")]);
        assert_eq!(run(&store), vec!["https://x.com/hero.jpg"]);
    }

    #[test]
    fn walks_serialized_values_and_resolves_image_keyed_ids() {
        let store = store(vec![(
            "_dipi_carousel",
            r#"a:2:{s:8:"slide_bg";i:23;s:5:"items";a:1:{i:0;a:1:{s:5:"label";s:4:"Next";}}}"#,
        )]);
        assert_eq!(run(&store), vec!["https://x.com/twenty-three.png"]);
    }

    #[test]
    fn numeric_values_under_other_keys_are_not_walk_hits() {
        let store = store(vec![("_divi_layout", r#"{"columns": 21}"#)]);
        // Unquoted and not list-delimited on both sides: no embedded id either
        assert!(run(&store).is_empty());
    }

    #[test]
    fn embedded_ids_must_be_image_attachments() {
        let store = store(vec![("_et_pb_ids", "[21,22,404]")]);
        assert_eq!(run(&store), vec!["https://x.com/twenty-one.jpg"]);
    }

    #[test]
    fn json_values_are_walked() {
        let store = store(vec![(
            "_et_module_settings",
            r#"{"nested": {"photo": "/wp-content/uploads/p.webp?v=1"}}"#,
        )]);
        assert_eq!(run(&store), vec!["/wp-content/uploads/p.webp?v=1"]);
    }

    #[test]
    fn walk_follows_stored_key_order() {
        let store = store(vec![(
            "_dipi_slider",
            r#"a:2:{s:8:"z_bg_img";i:23;s:8:"a_bg_img";i:21;}"#,
        )]);
        assert_eq!(
            run(&store),
            vec!["https://x.com/twenty-three.png", "https://x.com/twenty-one.jpg"]
        );

        let decoded = serialized::decode(
            r#"a:2:{s:7:"z_image";s:20:"https://x.com/zz.jpg";s:7:"a_image";s:20:"https://x.com/aa.jpg";}"#,
        )
        .unwrap();
        let mut out = Vec::new();
        walk(&decoded, None, 0, &store, &mut out);
        let urls: Vec<&str> = out.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["https://x.com/zz.jpg", "https://x.com/aa.jpg"]);
    }

    #[test]
    fn deeply_nested_meta_is_skipped() {
        let deep = format!("{}N;{}", "a:1:{i:0;".repeat(20_000), "}".repeat(20_000));
        let store = store(vec![("_et_pb_deep", deep.as_str()), ("_et_pb_ids", "[21]")]);
        assert_eq!(run(&store), vec!["https://x.com/twenty-one.jpg"]);

        let mut nested = serde_json::json!({"bg_image": 23});
        for _ in 0..MAX_DEPTH + 5 {
            nested = serde_json::json!([nested]);
        }
        let mut out = Vec::new();
        walk(&nested, None, 0, &store, &mut out);
        assert!(out.is_empty());
    }
}
