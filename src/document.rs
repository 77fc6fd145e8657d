//! Core data model: documents, their pages and page images.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Stable identity of a document: its path relative to the input directory,
/// always with `/` separators so ids do not depend on the host platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build an id from a path relative to the input root.
    pub fn from_relative(path: &Path) -> Self {
        let parts: Vec<String> = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        Self(parts.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name (without a suffix) used for this document's artifacts.
    ///
    /// Nested ids are flattened so every artifact lives in the output root.
    /// `%` and `/` are percent-encoded, which keeps the mapping one-to-one:
    /// `scans/2024/a.pdf` → `scans%2F2024%2Fa.pdf`, while a file literally
    /// named `scans%2F2024%2Fa.pdf` becomes `scans%252F2024%252Fa.pdf`.
    pub fn artifact_name(&self) -> String {
        let mut name = String::with_capacity(self.0.len());
        for c in self.0.chars() {
            match c {
                '%' => name.push_str("%25"),
                '/' => name.push_str("%2F"),
                c => name.push(c),
            }
        }
        name
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The kinds of document the batch knows how to turn into pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Pdf,
    Docx,
    /// A single page image (`.png`, `.jpg`, `.jpeg`).
    Image,
    /// A directory of already-rasterised page images.
    ImageFolder,
}

impl DocumentKind {
    /// Classify a regular file by extension. Returns `None` for files the
    /// batch does not handle.
    pub fn from_file_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "docx" => Some(DocumentKind::Docx),
            "png" | "jpg" | "jpeg" => Some(DocumentKind::Image),
            _ => None,
        }
    }
}

/// A document discovered in the input directory.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: DocumentId,
    /// Absolute (or input-rooted) path to the file or image folder.
    pub path: PathBuf,
    pub kind: DocumentKind,
}

/// Encoded image bytes for one page, ready to be sent to the OCR service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

impl PageImage {
    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime_type: "image/png",
        }
    }

    pub fn jpeg(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime_type: "image/jpeg",
        }
    }

    /// Wrap bytes read from `path`, choosing the MIME type from its extension.
    pub fn from_file_bytes(path: &Path, bytes: Vec<u8>) -> Self {
        let is_jpeg = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| matches!(e.to_ascii_lowercase().as_str(), "jpg" | "jpeg"))
            .unwrap_or(false);
        if is_jpeg {
            Self::jpeg(bytes)
        } else {
            Self::png(bytes)
        }
    }
}

/// One page of a document, identified by `(document, index)`.
///
/// `index` is 0-based and order-significant: the assembled artifact lists
/// pages in ascending `index` regardless of when their OCR finished.
#[derive(Debug, Clone)]
pub struct PageRef {
    pub document: DocumentId,
    pub index: usize,
    pub image: Arc<PageImage>,
}

impl PageRef {
    pub fn new(document: DocumentId, index: usize, image: PageImage) -> Self {
        Self {
            document,
            index,
            image: Arc::new(image),
        }
    }

    /// 1-based page number, as shown to humans and in artifacts.
    pub fn page_num(&self) -> usize {
        self.index + 1
    }
}

/// Split a document's images into ordered [`PageRef`]s.
pub fn page_refs(document: &DocumentId, images: Vec<PageImage>) -> Vec<PageRef> {
    images
        .into_iter()
        .enumerate()
        .map(|(index, image)| PageRef::new(document.clone(), index, image))
        .collect()
}
