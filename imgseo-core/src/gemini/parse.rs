//! Parsing the model's free-form text into a title/alt pair.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::error::snippet;
use crate::types::GeneratedMeta;

static LEADING_FENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^```(?:json)?\s*").expect("Invalid fence regex"));

static TRAILING_FENCE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*```$").expect("Invalid fence regex"));

/// Model text that is not a `{"title": "...", "alt": "..."}` object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("AI response was not in the expected JSON format {{\"title\": \"\", \"alt\": \"\"}}. (Error: {json_error}).")]
pub struct ParseFailure {
    /// First 200 characters of the raw model text.
    pub raw_snippet: String,
    pub json_error: String,
}

/// Parse model output into a title/alt pair.
///
/// Tolerates a code fence around the object and commentary before or after
/// it: only the text between the first `{` and the last `}` is parsed.
pub fn parse_generated_meta(text: &str) -> Result<GeneratedMeta, ParseFailure> {
    let raw = text.trim();
    let without_leading = LEADING_FENCE_REGEX.replace(raw, "");
    let cleaned = TRAILING_FENCE_REGEX.replace(&without_leading, "");
    let cleaned = cleaned.trim();

    let candidate = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(first), Some(last)) if last > first => &cleaned[first..=last],
        _ => {
            tracing::warn!("no JSON object found in model output, parsing cleaned text as-is");
            cleaned
        }
    };

    let failure = |json_error: String| ParseFailure {
        raw_snippet: snippet(raw, 200),
        json_error,
    };

    let value: Value = serde_json::from_str(candidate).map_err(|e| failure(e.to_string()))?;

    match (
        value.get("title").and_then(Value::as_str),
        value.get("alt").and_then(Value::as_str),
    ) {
        (Some(title), Some(alt)) => Ok(GeneratedMeta {
            title: title.to_string(),
            alt: alt.to_string(),
        }),
        _ => Err(failure(
            "missing or non-string \"title\"/\"alt\" field".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_object() {
        let meta = parse_generated_meta(r#"{"title": "Red bike", "alt": "A red bike on grass"}"#)
            .unwrap();
        assert_eq!(meta.title, "Red bike");
        assert_eq!(meta.alt, "A red bike on grass");
    }

    #[test]
    fn fenced_with_commentary() {
        let text = "```json\nSure! Here you go:\n{\"title\": \"T\", \"alt\": \"A\"}\nHope this helps.\n```";
        let meta = parse_generated_meta(text).unwrap();
        assert_eq!(meta, GeneratedMeta { title: "T".into(), alt: "A".into() });
    }

    #[test]
    fn braces_inside_values_are_kept() {
        let meta = parse_generated_meta(r#"{"title": "Set {A}", "alt": "x"}"#).unwrap();
        assert_eq!(meta.title, "Set {A}");
    }

    #[test]
    fn empty_strings_parse() {
        let meta = parse_generated_meta(r#"{"title": "", "alt": ""}"#).unwrap();
        assert!(meta.is_empty());
    }

    #[test]
    fn not_json_keeps_snippet() {
        let long = "I cannot describe this image. ".repeat(20);
        let err = parse_generated_meta(&long).unwrap_err();
        assert_eq!(err.raw_snippet.chars().count(), 200);
        assert!(!err.json_error.is_empty());
    }

    #[test]
    fn wrong_field_types_fail() {
        let err = parse_generated_meta(r#"{"title": 5, "alt": "x"}"#).unwrap_err();
        assert!(err.json_error.contains("title"));

        assert!(parse_generated_meta(r#"{"alt": "x"}"#).is_err());
        assert!(parse_generated_meta(r#"["title", "alt"]"#).is_err());
    }
}
