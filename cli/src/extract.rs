use std::path::Path;

use anyhow::{Context, Result};
use imgseo_core::extract::extract_with_stats;
use imgseo_core::media::{LibraryStore, MediaStore};

/// Extract image references from one page of a local library file.
/// Prints a table, or the full extraction output as JSON with `--json`.
pub fn extract(library: &Path, page_id: u64, json: bool) -> Result<()> {
    let store = LibraryStore::open(library)
        .with_context(|| format!("Failed to open library: {}", library.display()))?;
    let page = store
        .page(page_id)
        .with_context(|| format!("Page {} not found in {}", page_id, library.display()))?;

    let output = extract_with_stats(page_id, &page.content, page.uses_builder, &store);

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!(
        "Page {} ({}): {} references from {} raw candidates",
        page.id,
        if page.title.is_empty() { "untitled" } else { &page.title },
        output.references.len(),
        output.raw_candidates
    );
    for stats in output.matchers.iter().filter(|s| s.candidates > 0) {
        println!("  {:<24} {}", stats.matcher, stats.candidates);
    }
    println!();
    for reference in &output.references {
        let id = reference
            .attachment_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        let hint = serde_json::to_value(reference.source_hint)?;
        println!(
            "{:>8}  {:<20} {}",
            id,
            hint.as_str().unwrap_or_default(),
            reference.url
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn missing_page_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.json");
        fs::write(&path, r#"{"attachments": [], "pages": []}"#).unwrap();

        let err = extract(&path, 7, true).unwrap_err();
        assert!(err.to_string().contains("Page 7 not found"));
    }

    #[test]
    fn extracts_from_library_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.json");
        fs::write(
            &path,
            r#"{
                "attachments": [],
                "pages": [{"id": 3, "content": "<img src=\"https://x.com/a.png\">"}]
            }"#,
        )
        .unwrap();

        extract(&path, 3, false).unwrap();
    }
}
