//! Media library access.
//!
//! The host content system owns attachments, pages and page metadata. All
//! access goes through the [`MediaStore`] trait so the extractor and the
//! endpoint service can run against any backend. [`LibraryStore`] is a
//! JSON-document implementation used by the server and in tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extract::{has_image_extension, normalize_url};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Attachment {0} not found")]
    NotFound(u64),

    #[error("Attachment {id} has no file on disk")]
    NoFile { id: u64 },

    #[error("Image file does not exist at path: {0}")]
    FileMissing(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid library document: {0}")]
    Json(#[from] serde_json::Error),
}

/// A media-library entity with editable title and alt text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: u64,
    pub url: String,
    /// Path to the binary, relative to the library document's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub alt: String,
    /// False when the current operator may not edit this attachment.
    #[serde(default = "default_true")]
    pub editable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        match &self.mime_type {
            Some(mime) => mime.starts_with("image/"),
            None => has_image_extension(&self.url),
        }
    }

    pub fn filename(&self) -> String {
        self.file
            .as_ref()
            .and_then(|f| f.file_name())
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| "File not found".to_string())
    }
}

/// A stored page-metadata entry (key/value), as the page builder writes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaEntry {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// Whether the page was built with the page-builder shortcode dialect.
    #[serde(default)]
    pub uses_builder: bool,
    #[serde(default)]
    pub meta: Vec<MetaEntry>,
}

/// Serialized form of a whole media library.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Library {
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub pages: Vec<Page>,
}

/// Read/write access to attachments and pages owned by the host system.
pub trait MediaStore: Send + Sync {
    fn attachment(&self, id: u64) -> Option<Attachment>;

    /// Public URL of an attachment.
    fn attachment_url(&self, id: u64) -> Option<String> {
        self.attachment(id).map(|a| a.url)
    }

    /// Whether `id` names an image attachment.
    fn is_image_attachment(&self, id: u64) -> bool {
        self.attachment(id).map(|a| a.is_image()).unwrap_or(false)
    }

    /// Resolve a (possibly thumbnail-sized) URL back to its attachment.
    fn find_attachment_by_url(&self, url: &str) -> Option<u64>;

    fn page(&self, page_id: u64) -> Option<Page>;

    /// Metadata entries stored for a page.
    fn page_meta(&self, page_id: u64) -> Vec<MetaEntry> {
        self.page(page_id).map(|p| p.meta).unwrap_or_default()
    }

    fn set_title(&self, id: u64, title: &str) -> Result<(), StoreError>;

    /// Write alt text. Writing the current value is a successful no-op.
    fn set_alt(&self, id: u64, alt: &str) -> Result<(), StoreError>;

    fn read_file(&self, id: u64) -> Result<Vec<u8>, StoreError>;
}

/// A [`MediaStore`] backed by a JSON [`Library`] document.
///
/// When opened from a file, every write is persisted back to that file.
#[derive(Debug)]
pub struct LibraryStore {
    library: RwLock<Library>,
    path: Option<PathBuf>,
    base_dir: PathBuf,
}

impl LibraryStore {
    /// Create an in-memory store. Relative file paths resolve against `base_dir`.
    pub fn from_library(library: Library, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            library: RwLock::new(library),
            path: None,
            base_dir: base_dir.into(),
        }
    }

    /// Load a library document from disk.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let content = fs::read_to_string(path)?;
        let library: Library = serde_json::from_str(&content)?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        tracing::debug!(
            path = %path.display(),
            attachments = library.attachments.len(),
            pages = library.pages.len(),
            "loaded media library"
        );

        Ok(Self {
            library: RwLock::new(library),
            path: Some(path.to_path_buf()),
            base_dir,
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, Library> {
        self.library.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Library> {
        self.library.write().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, library: &Library) -> Result<(), StoreError> {
        if let Some(path) = &self.path {
            let content = serde_json::to_string_pretty(library)?;
            fs::write(path, content)?;
        }
        Ok(())
    }

    fn modify<F>(&self, id: u64, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Attachment) -> bool,
    {
        let mut library = self.write();
        let index = library
            .attachments
            .iter()
            .position(|a| a.id == id)
            .ok_or(StoreError::NotFound(id))?;

        // Edit a copy so a failed write leaves memory as it was on disk
        let mut attachment = library.attachments[index].clone();
        if !f(&mut attachment) {
            return Ok(());
        }
        attachment.modified_at = Some(Utc::now());

        if self.path.is_some() {
            let mut updated = library.clone();
            updated.attachments[index] = attachment.clone();
            self.persist(&updated)?;
        }
        library.attachments[index] = attachment;
        Ok(())
    }
}

impl MediaStore for LibraryStore {
    fn attachment(&self, id: u64) -> Option<Attachment> {
        self.read().attachments.iter().find(|a| a.id == id).cloned()
    }

    fn find_attachment_by_url(&self, url: &str) -> Option<u64> {
        let wanted = normalize_url(url)?;
        self.read()
            .attachments
            .iter()
            .find(|a| normalize_url(&a.url).as_deref() == Some(wanted.as_str()))
            .map(|a| a.id)
    }

    fn page(&self, page_id: u64) -> Option<Page> {
        self.read().pages.iter().find(|p| p.id == page_id).cloned()
    }

    fn set_title(&self, id: u64, title: &str) -> Result<(), StoreError> {
        self.modify(id, |a| {
            a.title = title.to_string();
            true
        })
    }

    fn set_alt(&self, id: u64, alt: &str) -> Result<(), StoreError> {
        self.modify(id, |a| {
            if a.alt == alt {
                return false;
            }
            a.alt = alt.to_string();
            true
        })
    }

    fn read_file(&self, id: u64) -> Result<Vec<u8>, StoreError> {
        let attachment = self.attachment(id).ok_or(StoreError::NotFound(id))?;
        let file = attachment.file.ok_or(StoreError::NoFile { id })?;
        let path = if file.is_absolute() {
            file
        } else {
            self.base_dir.join(file)
        };

        if !path.exists() {
            return Err(StoreError::FileMissing(path));
        }
        Ok(fs::read(&path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn attachment(id: u64, url: &str) -> Attachment {
        Attachment {
            id,
            url: url.to_string(),
            file: Some(PathBuf::from(format!("{}.jpg", id))),
            mime_type: Some("image/jpeg".to_string()),
            title: String::new(),
            alt: String::new(),
            editable: true,
            modified_at: None,
        }
    }

    #[test]
    fn finds_attachment_by_thumbnail_url() {
        let store = LibraryStore::from_library(
            Library {
                attachments: vec![attachment(7, "https://x.com/uploads/cat.jpg")],
                pages: vec![],
            },
            ".",
        );

        assert_eq!(
            store.find_attachment_by_url("https://x.com/uploads/cat-300x200.jpg?ver=3"),
            Some(7)
        );
        assert_eq!(store.find_attachment_by_url("https://x.com/uploads/dog.jpg"), None);
    }

    #[test]
    fn writes_persist_to_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("library.json");
        let library = Library {
            attachments: vec![attachment(1, "https://x.com/a.jpg")],
            pages: vec![],
        };
        fs::write(&path, serde_json::to_string(&library).unwrap()).unwrap();

        let store = LibraryStore::open(&path).unwrap();
        store.set_title(1, "New title").unwrap();
        store.set_alt(1, "New alt").unwrap();

        let reopened = LibraryStore::open(&path).unwrap();
        let a = reopened.attachment(1).unwrap();
        assert_eq!(a.title, "New title");
        assert_eq!(a.alt, "New alt");
        assert!(a.modified_at.is_some());
    }

    #[test]
    fn failed_write_keeps_previous_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("library.json");
        let mut a = attachment(1, "https://x.com/a.jpg");
        a.title = "Old title".to_string();
        let library = Library {
            attachments: vec![a],
            pages: vec![],
        };
        fs::write(&path, serde_json::to_string(&library).unwrap()).unwrap();
        let store = LibraryStore::open(&path).unwrap();

        // A directory in place of the file makes the write fail
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        assert!(matches!(store.set_title(1, "New title"), Err(StoreError::Io(_))));
        let a = store.attachment(1).unwrap();
        assert_eq!(a.title, "Old title");
        assert!(a.modified_at.is_none());
    }

    #[test]
    fn unchanged_alt_is_a_successful_no_op() {
        let mut a = attachment(1, "https://x.com/a.jpg");
        a.alt = "same".to_string();
        let store = LibraryStore::from_library(
            Library {
                attachments: vec![a],
                pages: vec![],
            },
            ".",
        );

        store.set_alt(1, "same").unwrap();
        assert!(store.attachment(1).unwrap().modified_at.is_none());
    }

    #[test]
    fn read_file_resolves_relative_paths() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("1.jpg"), b"jpeg-bytes").unwrap();
        let store = LibraryStore::from_library(
            Library {
                attachments: vec![attachment(1, "https://x.com/a.jpg")],
                pages: vec![],
            },
            dir.path(),
        );

        assert_eq!(store.read_file(1).unwrap(), b"jpeg-bytes");
        assert!(matches!(store.read_file(2), Err(StoreError::NotFound(2))));
    }

    #[test]
    fn read_file_reports_missing_file() {
        let dir = TempDir::new().unwrap();
        let store = LibraryStore::from_library(
            Library {
                attachments: vec![attachment(1, "https://x.com/a.jpg")],
                pages: vec![],
            },
            dir.path(),
        );

        assert!(matches!(store.read_file(1), Err(StoreError::FileMissing(_))));
    }
}
