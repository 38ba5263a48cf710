//! Named markup matchers.
//!
//! Each matcher looks for one markup shape and returns raw candidates. They
//! are composed by [`cascade`] and never depend on each other's output.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use super::{has_image_extension, meta, Candidate};
use crate::media::MediaStore;
use crate::text::decode_entities;
use crate::types::SourceHint;

pub(crate) type Matcher = fn(&MarkupInput<'_>) -> Vec<Candidate>;

/// Markup plus the collaborators matchers may consult.
pub(crate) struct MarkupInput<'a> {
    pub page_id: u64,
    pub markup: &'a str,
    pub document: Html,
    pub store: &'a dyn MediaStore,
}

impl<'a> MarkupInput<'a> {
    pub fn new(page_id: u64, markup: &'a str, store: &'a dyn MediaStore) -> Self {
        Self {
            page_id,
            markup,
            document: Html::parse_fragment(markup),
            store,
        }
    }
}

const STANDARD: &[(&str, Matcher)] = &[("img_tags", img_tags)];

const BUILDER: &[(&str, Matcher)] = &[
    ("builder_image_modules", builder_image_modules),
    ("builder_gallery", builder_gallery),
    ("builder_slides", builder_slides),
    ("builder_generic_modules", builder_generic_modules),
    ("builder_attribute_scan", builder_attribute_scan),
    ("builder_background_attributes", builder_background_attributes),
    ("builder_data_json", builder_data_json),
    ("carousel_span_hrefs", carousel_span_hrefs),
];

const COMMON: &[(&str, Matcher)] = &[
    ("inline_style_backgrounds", inline_style_backgrounds),
    ("wrapper_containers", wrapper_containers),
    ("srcset_urls", srcset_urls),
    ("raw_urls", raw_urls),
    ("builder_meta", meta::builder_meta),
];

/// Matchers in the order their candidates are concatenated.
pub(crate) fn cascade(uses_builder: bool) -> Vec<(&'static str, Matcher)> {
    let mut matchers = STANDARD.to_vec();
    if uses_builder {
        matchers.extend_from_slice(BUILDER);
    }
    matchers.extend_from_slice(COMMON);
    matchers
}

static IMG_SRC: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[src]").expect("Invalid selector"));

static SRCSET: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[srcset]").expect("Invalid selector"));

static WRAPPER_CONTAINERS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        r#"span[class*="dipi-carousel-image"], span[class*="divi-carousel-image"], div[class*="dipi"], [class*="divi-image-wrap"], [class*="divi-carousel-image"], [class*="et-pb-slider-image"]"#,
    )
    .expect("Invalid selector")
});

static CLASSED_CAROUSEL_IMG: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"img[class*="dipi-c-img"][src]"#).expect("Invalid selector")
});

static CAROUSEL_SPAN_HREF: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"span[class*="dipi-carousel-image"][href]"#).expect("Invalid selector")
});

static IMAGE_MODULE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[et_pb_image\b[^\]]*?\bsrc="([^"]+)""#).expect("Invalid image module regex")
});

static GALLERY_MODULE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[et_pb_gallery\b[^\]]*?\bgallery_ids="([^"]+)""#)
        .expect("Invalid gallery module regex")
});

static SLIDE_MODULE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[et_pb_slide\b[^\]]*?\bimage="([^"]+)""#).expect("Invalid slide module regex")
});

static GENERIC_MODULE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[et_pb_module\b[^\]]*?\bimage="([^"]+)""#)
        .expect("Invalid generic module regex")
});

static ANY_MODULE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[et_(?:pb|db)_[^\]]+\]").expect("Invalid module regex"));

/// Shortcode attributes that may carry an image URL or attachment id.
const MODULE_IMAGE_ATTRIBUTES: &[&str] = &[
    "image",
    "src",
    "logo",
    "portrait",
    "background_image",
    "bg_img",
    "image_src",
    "photo",
];

static MODULE_ATTRIBUTE_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    MODULE_IMAGE_ATTRIBUTES
        .iter()
        .map(|attr| {
            Regex::new(&format!(r#"(?:^|[\s\[]){}="([^"]+)""#, attr))
                .expect("Invalid attribute regex")
        })
        .collect()
});

static BACKGROUND_ATTRIBUTE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:background_image|bg_img|bg_image|background_url)="([^"]+)""#)
        .expect("Invalid background attribute regex")
});

static DATA_JSON_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)data-(?:autoplay|settings|items|json)=(?:"([^"]*)"|'([^']*)')"#)
        .expect("Invalid data attribute regex")
});

static JSON_IMAGE_FIELD_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)"(?:image|url|src)":\s*"(https?://[^"]+\.(?:jpg|jpeg|png|gif|webp))""#)
        .expect("Invalid JSON image regex")
});

static STYLE_ATTRIBUTE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bstyle\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("Invalid style regex")
});

static CSS_BACKGROUND_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)background(?:-image)?\s*:[^;]*?url\(\s*['"]?([^'")\s]+)['"]?\s*\)"#)
        .expect("Invalid background url regex")
});

static SRCSET_URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)https?://[^\s,]+").expect("Invalid srcset regex"));

static RAW_IMAGE_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s'"()<>\[\]]+\.(?:jpg|jpeg|png|gif|webp)(?:\?[^\s'"()<>\[\]]+)?"#)
        .expect("Invalid raw image regex")
});

fn capture_all(regex: &Regex, haystack: &str, hint: SourceHint) -> Vec<Candidate> {
    regex
        .captures_iter(haystack)
        .filter_map(|caps| caps.get(1))
        .map(|m| Candidate::new(m.as_str(), hint))
        .collect()
}

/// Resolve a textual attachment id through the media store.
pub(super) fn resolve_attachment(
    store: &dyn MediaStore,
    raw_id: &str,
    hint: SourceHint,
) -> Option<Candidate> {
    let id: u64 = raw_id.trim().parse().ok()?;
    if id == 0 {
        return None;
    }
    let url = store.attachment_url(id)?;
    Some(Candidate::attachment(url, id, hint))
}

/// `<img src>` anywhere in the markup.
pub(crate) fn img_tags(input: &MarkupInput<'_>) -> Vec<Candidate> {
    input
        .document
        .select(&IMG_SRC)
        .filter_map(|el| el.value().attr("src"))
        .map(|src| Candidate::new(src, SourceHint::StandardHtml))
        .collect()
}

/// `[et_pb_image src="..."]`
pub(crate) fn builder_image_modules(input: &MarkupInput<'_>) -> Vec<Candidate> {
    capture_all(&IMAGE_MODULE_REGEX, input.markup, SourceHint::BuilderModule)
}

/// `[et_pb_gallery gallery_ids="1,2,3"]`, each id resolved to its URL.
pub(crate) fn builder_gallery(input: &MarkupInput<'_>) -> Vec<Candidate> {
    GALLERY_MODULE_REGEX
        .captures_iter(input.markup)
        .filter_map(|caps| caps.get(1))
        .flat_map(|ids| ids.as_str().split(','))
        .filter_map(|id| resolve_attachment(input.store, id, SourceHint::BuilderGallery))
        .collect()
}

/// `[et_pb_slide image="..."]`
pub(crate) fn builder_slides(input: &MarkupInput<'_>) -> Vec<Candidate> {
    capture_all(&SLIDE_MODULE_REGEX, input.markup, SourceHint::BuilderSlider)
}

/// `[et_pb_module image="..."]`, used by third-party carousel modules.
pub(crate) fn builder_generic_modules(input: &MarkupInput<'_>) -> Vec<Candidate> {
    capture_all(&GENERIC_MODULE_REGEX, input.markup, SourceHint::BuilderModule)
}

/// Every builder module's image-ish attributes. A value counts when it has an
/// image extension, or is purely numeric and resolves as an attachment id.
pub(crate) fn builder_attribute_scan(input: &MarkupInput<'_>) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for module in ANY_MODULE_REGEX.find_iter(input.markup) {
        for regex in MODULE_ATTRIBUTE_REGEXES.iter() {
            let Some(value) = regex.captures(module.as_str()).and_then(|c| c.get(1)) else {
                continue;
            };
            let value = value.as_str();

            if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                candidates.extend(resolve_attachment(
                    input.store,
                    value,
                    SourceHint::BuilderModule,
                ));
            } else if has_image_extension(value) {
                candidates.push(Candidate::new(value, SourceHint::BuilderModule));
            }
        }
    }

    candidates
}

/// Background image attributes on builder shortcodes.
pub(crate) fn builder_background_attributes(input: &MarkupInput<'_>) -> Vec<Candidate> {
    capture_all(
        &BACKGROUND_ATTRIBUTE_REGEX,
        input.markup,
        SourceHint::BuilderBackground,
    )
}

/// Image URLs inside JSON carried by `data-settings`, `data-items` and similar.
pub(crate) fn builder_data_json(input: &MarkupInput<'_>) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for caps in DATA_JSON_REGEX.captures_iter(input.markup) {
        let Some(raw) = caps.get(1).or_else(|| caps.get(2)) else {
            continue;
        };
        let json = decode_entities(raw.as_str()).replace("\\/", "/");
        candidates.extend(
            JSON_IMAGE_FIELD_REGEX
                .captures_iter(&json)
                .filter_map(|c| c.get(1))
                .map(|m| Candidate::new(m.as_str(), SourceHint::BuilderModule)),
        );
    }
    candidates
}

/// Carousel spans that link the full-size image through `href`.
pub(crate) fn carousel_span_hrefs(input: &MarkupInput<'_>) -> Vec<Candidate> {
    input
        .document
        .select(&CAROUSEL_SPAN_HREF)
        .filter_map(|el| el.value().attr("href"))
        .map(|href| Candidate::new(href, SourceHint::BuilderSlider))
        .collect()
}

/// `background(-image): url(...)` inside inline `style` attributes.
pub(crate) fn inline_style_backgrounds(input: &MarkupInput<'_>) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for caps in STYLE_ATTRIBUTE_REGEX.captures_iter(input.markup) {
        let Some(style) = caps.get(1).or_else(|| caps.get(2)) else {
            continue;
        };
        let style = decode_entities(style.as_str());
        candidates.extend(
            CSS_BACKGROUND_URL_REGEX
                .captures_iter(&style)
                .filter_map(|c| c.get(1))
                .map(|m| Candidate::new(m.as_str(), SourceHint::InlineStyle)),
        );
    }
    candidates
}

/// First nested `<img src>` of each carousel/gallery wrapper container, plus
/// images carrying the carousel image class directly.
pub(crate) fn wrapper_containers(input: &MarkupInput<'_>) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = input
        .document
        .select(&WRAPPER_CONTAINERS)
        .filter_map(|container| container.select(&IMG_SRC).next())
        .filter_map(|img| img.value().attr("src"))
        .map(|src| Candidate::new(src, SourceHint::BuilderSlider))
        .collect();

    candidates.extend(
        input
            .document
            .select(&CLASSED_CAROUSEL_IMG)
            .filter_map(|img| img.value().attr("src"))
            .map(|src| Candidate::new(src, SourceHint::BuilderSlider)),
    );
    candidates
}

/// Every absolute URL inside `srcset` attributes.
pub(crate) fn srcset_urls(input: &MarkupInput<'_>) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for el in input.document.select(&SRCSET) {
        if let Some(srcset) = el.value().attr("srcset") {
            candidates.extend(
                SRCSET_URL_REGEX
                    .find_iter(srcset)
                    .map(|m| Candidate::new(m.as_str(), SourceHint::StandardHtml)),
            );
        }
    }
    candidates
}

/// Any bare absolute URL ending in an image extension.
pub(crate) fn raw_urls(input: &MarkupInput<'_>) -> Vec<Candidate> {
    RAW_IMAGE_URL_REGEX
        .find_iter(input.markup)
        .map(|m| Candidate::new(m.as_str(), SourceHint::RawScan))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{Attachment, Library, LibraryStore};

    fn store() -> LibraryStore {
        let attachment = |id: u64, url: &str| Attachment {
            id,
            url: url.to_string(),
            file: None,
            mime_type: Some("image/png".to_string()),
            title: String::new(),
            alt: String::new(),
            editable: true,
            modified_at: None,
        };
        LibraryStore::from_library(
            Library {
                attachments: vec![
                    attachment(10, "https://x.com/ten.png"),
                    attachment(11, "https://x.com/eleven.png"),
                ],
                pages: vec![],
            },
            ".",
        )
    }

    fn run(matcher: Matcher, markup: &str) -> Vec<String> {
        let store = store();
        let input = MarkupInput::new(1, markup, &store);
        matcher(&input).into_iter().map(|c| c.url).collect()
    }

    #[test]
    fn img_tags_capture_src_with_either_quote() {
        let found = run(
            img_tags,
            r#"<p><img class="a" src="https://x.com/1.jpg"> <IMG SRC='https://x.com/2.png' alt="x"></p>"#,
        );
        assert_eq!(found, vec!["https://x.com/1.jpg", "https://x.com/2.png"]);
    }

    #[test]
    fn image_module_src() {
        let found = run(
            builder_image_modules,
            r#"[et_pb_image src="https://x.com/hero.jpg" alt="Hero" _builder_version="4.1"][/et_pb_image]"#,
        );
        assert_eq!(found, vec!["https://x.com/hero.jpg"]);
    }

    #[test]
    fn gallery_ids_resolve_and_skip_unknown() {
        let found = run(
            builder_gallery,
            r#"[et_pb_gallery gallery_ids="10, 99,11" posts_number="4"][/et_pb_gallery]"#,
        );
        assert_eq!(found, vec!["https://x.com/ten.png", "https://x.com/eleven.png"]);
    }

    #[test]
    fn slide_image_does_not_match_background_image() {
        let found = run(
            builder_slides,
            r#"[et_pb_slide background_image="https://x.com/bg.jpg" image="https://x.com/fg.png"][/et_pb_slide]"#,
        );
        assert_eq!(found, vec!["https://x.com/fg.png"]);
    }

    #[test]
    fn generic_module_image() {
        let found = run(
            builder_generic_modules,
            r#"[et_pb_module image="https://x.com/c1.webp"][/et_pb_module]"#,
        );
        assert_eq!(found, vec!["https://x.com/c1.webp"]);
    }

    #[test]
    fn attribute_scan_accepts_extensions_and_numeric_ids() {
        let found = run(
            builder_attribute_scan,
            r#"[et_pb_team_member image_url="x" portrait="https://x.com/p.jpeg" logo="11" photo="not-an-image" src="https://x.com/doc.pdf"][/et_pb_team_member]"#,
        );
        assert_eq!(found, vec!["https://x.com/eleven.png", "https://x.com/p.jpeg"]);
    }

    #[test]
    fn background_attributes() {
        let found = run(
            builder_background_attributes,
            r#"[et_pb_section bg_img="https://x.com/s.jpg" background_url="https://x.com/u.png"]"#,
        );
        assert_eq!(found, vec!["https://x.com/s.jpg", "https://x.com/u.png"]);
    }

    #[test]
    fn data_json_urls_with_escaped_slashes() {
        let found = run(
            builder_data_json,
            r#"<div data-items="[{&quot;image&quot;: &quot;https:\/\/x.com\/j.jpg&quot;}]"></div><div data-settings='{"src": "https://x.com/k.png"}'></div>"#,
        );
        assert_eq!(found, vec!["https://x.com/j.jpg", "https://x.com/k.png"]);
    }

    #[test]
    fn carousel_span_href() {
        let found = run(
            carousel_span_hrefs,
            r#"<span class="dipi-carousel-image" href="https://x.com/full.jpg"><img src="https://x.com/full-300x300.jpg"></span>"#,
        );
        assert_eq!(found, vec!["https://x.com/full.jpg"]);
    }

    #[test]
    fn inline_style_all_background_forms() {
        let found = run(
            inline_style_backgrounds,
            r#"<div style="color: red; background-image: url('https://x.com/a.jpg')"></div>
               <section style='background: #fff url("https://x.com/b.png") no-repeat'></section>
               <div style="border: 0"></div>"#,
        );
        assert_eq!(found, vec!["https://x.com/a.jpg", "https://x.com/b.png"]);
    }

    #[test]
    fn wrapper_takes_first_nested_image() {
        let found = run(
            wrapper_containers,
            r#"<div class="et_pb_module divi-image-wrap"><a href="/"><img src="https://x.com/w1.jpg"></a><img src="https://x.com/w2.jpg"></div>
               <img class="dipi-c-img" src="https://x.com/c.jpg">"#,
        );
        assert_eq!(found, vec!["https://x.com/w1.jpg", "https://x.com/c.jpg"]);
    }

    #[test]
    fn srcset_every_url() {
        let found = run(
            srcset_urls,
            r#"<picture><source srcset="https://x.com/a-480x320.webp 480w, https://x.com/a.webp 960w"></picture>"#,
        );
        assert_eq!(found, vec!["https://x.com/a-480x320.webp", "https://x.com/a.webp"]);
    }

    #[test]
    fn raw_urls_anywhere() {
        let found = run(
            raw_urls,
            r#"Text https://x.com/a.JPG?x=1 and [gallery link="https://x.com/b.gif"] and https://x.com/page.html"#,
        );
        assert_eq!(found, vec!["https://x.com/a.JPG?x=1", "https://x.com/b.gif"]);
    }

    #[test]
    fn cascade_gates_builder_matchers() {
        let plain: Vec<_> = cascade(false).into_iter().map(|(name, _)| name).collect();
        let builder: Vec<_> = cascade(true).into_iter().map(|(name, _)| name).collect();

        assert_eq!(plain.first(), Some(&"img_tags"));
        assert!(!plain.contains(&"builder_gallery"));
        assert_eq!(builder[1], "builder_image_modules");
        assert_eq!(builder.last(), Some(&"builder_meta"));
        assert_eq!(builder.len(), plain.len() + BUILDER.len());
    }
}
