//! Prompt template for image title/alt generation.

/// Placeholder text used when a keyword is not given.
pub const NOT_PROVIDED: &str = "Not provided";

pub const DEFAULT_PROMPT: &str = r#"**Role:** You are an intelligent expert in Image SEO, specializing in writing accurate, accessible, and search-optimized descriptive text.

**Task:** Based on the provided image and specified keywords, generate effective and engaging title and alt text attributes.

**Context:**
*   **Image:** (Will be provided via API - Analyze the actual image content, do not describe this instruction.)
*   **Primary Keyword:** '{primary}' (If empty or 'Not provided', focus solely on accurately describing the image.)
*   **Secondary Keywords:** '{secondary}' (If empty or 'Not provided', ignore them.)

**Instructions:**
1.  **Accurate Analysis:** Understand the core visual content and important details of the provided image.
2.  **Title Attribute:**
    *   Create a concise and descriptive title (around 60-70 characters).
    *   Naturally incorporate the primary keyword '{primary}' if provided and visually relevant.
3.  **Alt Text Attribute:**
    *   Create a descriptive and helpful alt text (around 100-125 characters).
    *   **Clearly describe the image** for someone who cannot see it.
    *   **Naturally integrate the primary keyword '{primary}'** (if provided and not 'Not provided') *within the description's context*. Do not force it or list it separately.
    *   Try to naturally include one or two secondary keywords from '{secondary}' (if provided and not 'Not provided') *only if they accurately describe a relevant aspect of the image* and do not compromise the text's flow or sound like stuffing.
    *   Avoid starting with phrases like 'Image of...' or 'Picture showing...'.
4.  **Style:** Be intelligent and natural in your phrasing. Prioritize accurate and helpful description, followed by smart, non-excessive keyword integration (avoid keyword stuffing).
5.  **Output Format:** **Mandatory and Critical:** Your response MUST be a valid JSON object **only**. Do not include any introductory text, explanations, headers, or ```json``` markers before or after the JSON object. The object must contain exactly two string keys: `"title"` and `"alt"`.
    **Strict Example Format:** `{"title": "Final title here", "alt": "Final alt text here naturally including keywords"}`"#;

/// Fill `{primary}` and `{secondary}` in `template` (or the default prompt).
pub fn render_prompt(template: Option<&str>, primary: &str, secondary: &str) -> String {
    let template = template
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(DEFAULT_PROMPT);
    let primary = if primary.trim().is_empty() {
        NOT_PROVIDED
    } else {
        primary.trim()
    };
    let secondary = if secondary.trim().is_empty() {
        NOT_PROVIDED
    } else {
        secondary.trim()
    };

    template
        .replace("{primary}", primary)
        .replace("{secondary}", secondary)
}
