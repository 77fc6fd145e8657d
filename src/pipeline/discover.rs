//! Corpus discovery: enumerate the documents under an input directory.
//!
//! A document is one of:
//! - a `.pdf` or `.docx` file,
//! - a single `.png`/`.jpg`/`.jpeg` file in the input root,
//! - a sub-directory holding page images (the layout produced by a separate
//!   rasterisation pass, one folder per document).
//!
//! Everything else is ignored. Results are sorted by [`DocumentId`] so runs
//! over the same tree always visit documents in the same order.

use crate::document::{Document, DocumentId, DocumentKind};
use crate::error::BatchError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate `root` and return every document found under it.
pub fn discover_documents(root: &Path, recursive: bool) -> Result<Vec<Document>, BatchError> {
    if !root.exists() {
        return Err(BatchError::InputNotFound {
            path: root.to_path_buf(),
        });
    }
    if !root.is_dir() {
        return Err(BatchError::NotADirectory {
            path: root.to_path_buf(),
        });
    }

    let mut documents = Vec::new();
    walk(root, root, recursive, &mut documents)?;
    documents.sort_by(|a, b| a.id.cmp(&b.id));
    debug!("Discovered {} documents under {}", documents.len(), root.display());
    Ok(documents)
}

fn walk(
    root: &Path,
    dir: &Path,
    recursive: bool,
    documents: &mut Vec<Document>,
) -> Result<(), BatchError> {
    let read_err = |source: std::io::Error| BatchError::DiscoveryFailed {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(read_err)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    entries.sort();

    let mut holds_page_images = false;
    for path in entries {
        if is_hidden(&path) {
            continue;
        }
        if path.is_dir() {
            if recursive {
                walk(root, &path, recursive, documents)?;
            } else if dir == root {
                // Each direct child folder may still be one document's pages.
                image_folder(root, &path, documents)?;
            }
            continue;
        }

        match DocumentKind::from_file_path(&path) {
            Some(DocumentKind::Image) if dir != root => holds_page_images = true,
            Some(kind) => documents.push(Document {
                id: relative_id(root, &path)?,
                path,
                kind,
            }),
            None => debug!("Ignoring unsupported file {}", path.display()),
        }
    }

    if holds_page_images {
        documents.push(Document {
            id: relative_id(root, dir)?,
            path: dir.to_path_buf(),
            kind: DocumentKind::ImageFolder,
        });
    }
    Ok(())
}

/// Add `dir` as an image-folder document if it directly holds page images.
/// Nothing below `dir` is visited.
fn image_folder(root: &Path, dir: &Path, documents: &mut Vec<Document>) -> Result<(), BatchError> {
    let entries = std::fs::read_dir(dir).map_err(|source| BatchError::DiscoveryFailed {
        path: dir.to_path_buf(),
        source,
    })?;
    let holds_page_images = entries.filter_map(|e| e.ok()).map(|e| e.path()).any(|p| {
        !is_hidden(&p) && p.is_file() && DocumentKind::from_file_path(&p) == Some(DocumentKind::Image)
    });
    if holds_page_images {
        documents.push(Document {
            id: relative_id(root, dir)?,
            path: dir.to_path_buf(),
            kind: DocumentKind::ImageFolder,
        });
    }
    Ok(())
}

fn relative_id(root: &Path, path: &Path) -> Result<DocumentId, BatchError> {
    path.strip_prefix(root)
        .map(DocumentId::from_relative)
        .map_err(|e| BatchError::Internal(format!("{} outside input root: {e}", path.display())))
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// One run of digits or non-digits in a file name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum NaturalChunk {
    Number(u64),
    Text(String),
}

/// Sort key that orders embedded numbers numerically and text
/// case-insensitively: `page2` < `page10`.
pub fn natural_sort_key(name: &str) -> Vec<NaturalChunk> {
    let mut chunks = Vec::new();
    let mut digits = String::new();
    let mut text = String::new();

    for c in name.chars() {
        if c.is_ascii_digit() {
            if !text.is_empty() {
                chunks.push(NaturalChunk::Text(std::mem::take(&mut text)));
            }
            digits.push(c);
        } else {
            if !digits.is_empty() {
                chunks.push(number_chunk(&std::mem::take(&mut digits)));
            }
            text.extend(c.to_lowercase());
        }
    }
    if !digits.is_empty() {
        chunks.push(number_chunk(&digits));
    }
    if !text.is_empty() {
        chunks.push(NaturalChunk::Text(text));
    }
    chunks
}

fn number_chunk(digits: &str) -> NaturalChunk {
    digits
        .parse()
        .map(NaturalChunk::Number)
        .unwrap_or_else(|_| NaturalChunk::Text(digits.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn natural_order() {
        let mut names = vec!["page10.png", "page2.png", "Page1.png", "page2b.png"];
        names.sort_by_key(|n| natural_sort_key(n));
        assert_eq!(names, vec!["Page1.png", "page2.png", "page2b.png", "page10.png"]);
    }

    #[test]
    fn discovers_supported_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("b.pdf"));
        touch(&root.join("a.docx"));
        touch(&root.join("cover.png"));
        touch(&root.join("notes.txt"));
        touch(&root.join(".hidden.pdf"));
        touch(&root.join("nested/deeper/c.pdf"));
        touch(&root.join("scans/report/report_page1.png"));
        touch(&root.join("scans/report/report_page2.png"));

        let docs = discover_documents(root, true).unwrap();
        let ids: Vec<(&str, DocumentKind)> = docs.iter().map(|d| (d.id.as_str(), d.kind)).collect();
        assert_eq!(
            ids,
            vec![
                ("a.docx", DocumentKind::Docx),
                ("b.pdf", DocumentKind::Pdf),
                ("cover.png", DocumentKind::Image),
                ("nested/deeper/c.pdf", DocumentKind::Pdf),
                ("scans/report", DocumentKind::ImageFolder),
            ]
        );
    }

    #[test]
    fn non_recursive_stays_in_root() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("top.pdf"));
        touch(&dir.path().join("sub/inner.pdf"));

        let docs = discover_documents(dir.path(), false).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id.as_str(), "top.pdf");
    }

    #[test]
    fn non_recursive_keeps_top_level_image_folders() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("letter/page_1.png"));
        touch(&dir.path().join("letter/page_2.png"));
        touch(&dir.path().join("letter/deeper/other.pdf"));
        touch(&dir.path().join("empty/readme.txt"));
        touch(&dir.path().join("nested/deeper/scan.png"));

        let docs = discover_documents(dir.path(), false).unwrap();
        let ids: Vec<(&str, DocumentKind)> = docs.iter().map(|d| (d.id.as_str(), d.kind)).collect();
        assert_eq!(ids, vec![("letter", DocumentKind::ImageFolder)]);
    }

    #[test]
    fn missing_root_is_fatal() {
        let err = discover_documents(Path::new("/definitely/not/here"), true).unwrap_err();
        assert!(matches!(err, BatchError::InputNotFound { .. }));
    }

    #[test]
    fn file_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.pdf");
        touch(&file);
        let err = discover_documents(&file, true).unwrap_err();
        assert!(matches!(err, BatchError::NotADirectory { .. }));
    }
}
