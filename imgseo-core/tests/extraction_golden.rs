//! Golden tests for image reference extraction.
//!
//! Pages come from `fixtures/library.json`; each file in
//! `fixtures/extraction/` names a page and the references expected from it,
//! in order.

use imgseo_core::extract::extract_page;
use imgseo_core::media::LibraryStore;
use imgseo_core::types::ImageReference;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct TestCase {
    page_id: u64,
    expected: Vec<ImageReference>,
}

fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_test_cases() -> Vec<(String, TestCase)> {
    let dir = fixtures_dir().join("extraction");
    let mut cases = Vec::new();

    for entry in fs::read_dir(&dir).expect("Failed to read extraction fixtures") {
        let path = entry.expect("Failed to read directory entry").path();
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            let name = path.file_stem().unwrap().to_string_lossy().into_owned();
            let content = fs::read_to_string(&path)
                .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));
            let case: TestCase = serde_json::from_str(&content)
                .unwrap_or_else(|e| panic!("Failed to parse {}: {}", path.display(), e));
            cases.push((name, case));
        }
    }

    assert!(!cases.is_empty(), "No extraction fixtures found in {:?}", dir);
    cases.sort_by(|a, b| a.0.cmp(&b.0));
    cases
}

#[test]
fn golden_extraction() {
    let store = LibraryStore::open(&fixtures_dir().join("library.json"))
        .expect("Failed to open fixture library");
    let mut failures = Vec::new();

    for (name, case) in load_test_cases() {
        match extract_page(&store, case.page_id) {
            None => failures.push(format!("{}: page {} not found", name, case.page_id)),
            Some(actual) if actual != case.expected => failures.push(format!(
                "{}:\n  expected: {:#?}\n  actual:   {:#?}",
                name, case.expected, actual
            )),
            Some(_) => {}
        }
    }

    assert!(failures.is_empty(), "Golden mismatches:\n{}", failures.join("\n"));
}

#[test]
fn extraction_is_idempotent() {
    let store = LibraryStore::open(&fixtures_dir().join("library.json"))
        .expect("Failed to open fixture library");

    for (_, case) in load_test_cases() {
        let first = extract_page(&store, case.page_id);
        let second = extract_page(&store, case.page_id);
        assert_eq!(first, second);
    }
}
