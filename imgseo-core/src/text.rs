//! Small text helpers: HTML entity decoding and text-field sanitizing.

use std::sync::LazyLock;

use regex::Regex;

static ENTITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(?:#[xX]([0-9a-fA-F]{1,6})|#([0-9]{1,7})|([a-zA-Z][a-zA-Z0-9]{1,7}));")
        .expect("Invalid entity regex")
});

/// Named entities that are decoded. Anything else is left as written.
const NAMED_ENTITIES: &[(&str, &str)] = &[
    ("amp", "&"),
    ("lt", "<"),
    ("gt", ">"),
    ("quot", "\""),
    ("apos", "'"),
    ("nbsp", " "),
    ("ndash", "\u{2013}"),
    ("mdash", "\u{2014}"),
    ("lsquo", "\u{2018}"),
    ("rsquo", "\u{2019}"),
    ("sbquo", "\u{201A}"),
    ("ldquo", "\u{201C}"),
    ("rdquo", "\u{201D}"),
    ("bdquo", "\u{201E}"),
    ("laquo", "\u{00AB}"),
    ("raquo", "\u{00BB}"),
    ("hellip", "\u{2026}"),
    ("bull", "\u{2022}"),
    ("middot", "\u{00B7}"),
    ("copy", "\u{00A9}"),
    ("reg", "\u{00AE}"),
    ("trade", "\u{2122}"),
    ("deg", "\u{00B0}"),
    ("times", "\u{00D7}"),
];

static TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("Invalid HTML tag regex"));

static SCRIPT_STYLE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style)[^>]*?>.*?</(?:script|style)>").expect("Invalid script regex")
});

static WHITESPACE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

/// Decode the HTML entities that show up in attribute values.
///
/// Every numeric reference (`&#39;`, `&#x27;`) is decoded; named ones only
/// when listed in [`NAMED_ENTITIES`]. One pass, so `&amp;quot;` stays `&quot;`.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }

    ENTITY_REGEX
        .replace_all(s, |caps: &regex::Captures| {
            let decoded = match (caps.get(1), caps.get(2), caps.get(3)) {
                (Some(hex), _, _) => u32::from_str_radix(hex.as_str(), 16)
                    .ok()
                    .and_then(char::from_u32)
                    .map(String::from),
                (_, Some(dec), _) => dec
                    .as_str()
                    .parse::<u32>()
                    .ok()
                    .and_then(char::from_u32)
                    .map(String::from),
                (_, _, Some(name)) => NAMED_ENTITIES
                    .iter()
                    .find(|(n, _)| *n == name.as_str())
                    .map(|(_, v)| v.to_string()),
                _ => None,
            };
            decoded.unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Reduce user or model supplied text to a single clean line.
///
/// Strips tags (dropping script/style bodies), collapses whitespace and trims.
pub fn sanitize_text_field(s: &str) -> String {
    let without_blocks = SCRIPT_STYLE_REGEX.replace_all(s, "");
    let without_tags = TAG_REGEX.replace_all(&without_blocks, "");
    let without_controls: String = without_tags
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .collect();
    WHITESPACE_REGEX
        .replace_all(&without_controls, " ")
        .trim()
        .to_string()
}
