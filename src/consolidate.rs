//! Flatten a directory tree into one folder, dropping byte-identical copies.
//!
//! Scanned corpora often arrive as nested exports where the same file shows
//! up under several folders. Before a batch run they can be gathered into a
//! single directory:
//!
//! - a file whose name is free in the output is copied as is;
//! - a file whose name is taken by identical content (SHA-256) is skipped;
//! - otherwise it is copied as `{stem}_{n}{ext}` with the first free `n`,
//!   unless one of the numbered candidates already holds identical content.

use crate::error::BatchError;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Counts reported by [`consolidate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConsolidationSummary {
    /// Files written to the output directory, renamed ones included.
    pub copied: usize,
    /// Files copied under a numbered name because the plain name held
    /// different content.
    pub conflicts_resolved: usize,
    /// Files not copied because identical content was already present.
    pub skipped_duplicates: usize,
}

/// Copy every file under `input` into the root of `output`.
///
/// With `recursive == false` only the files directly in `input` are copied.
pub fn consolidate(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    recursive: bool,
) -> Result<ConsolidationSummary, BatchError> {
    let input = input.as_ref();
    let output = output.as_ref();
    if !input.exists() {
        return Err(BatchError::InputNotFound {
            path: input.to_path_buf(),
        });
    }
    if !input.is_dir() {
        return Err(BatchError::NotADirectory {
            path: input.to_path_buf(),
        });
    }
    fs::create_dir_all(output).map_err(|e| BatchError::OutputDirFailed {
        path: output.to_path_buf(),
        source: e,
    })?;

    // Never re-ingest our own output when it lives inside the input tree.
    let output_canonical = fs::canonicalize(output).ok();
    let mut files = Vec::new();
    collect_files(input, recursive, output_canonical.as_deref(), &mut files)?;

    let mut summary = ConsolidationSummary::default();
    for src in files {
        place_file(&src, output, &mut summary)?;
    }

    info!(
        "Consolidated into {}: {} copied, {} renamed, {} duplicates skipped",
        output.display(),
        summary.copied,
        summary.conflicts_resolved,
        summary.skipped_duplicates
    );
    Ok(summary)
}

fn collect_files(
    dir: &Path,
    recursive: bool,
    skip_dir: Option<&Path>,
    files: &mut Vec<PathBuf>,
) -> Result<(), BatchError> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| BatchError::DiscoveryFailed {
            path: dir.to_path_buf(),
            source: e,
        })?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    entries.sort();

    for path in entries {
        if path.is_dir() {
            let is_output = skip_dir.is_some_and(|skip| {
                fs::canonicalize(&path).map(|p| p == skip).unwrap_or(false)
            });
            if recursive && !is_output {
                collect_files(&path, recursive, skip_dir, files)?;
            }
        } else if path.is_file() {
            files.push(path);
        }
    }
    Ok(())
}

fn place_file(src: &Path, output: &Path, summary: &mut ConsolidationSummary) -> Result<(), BatchError> {
    let Some(name) = src.file_name() else {
        return Ok(());
    };
    let name_path = Path::new(name);
    let stem = name_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = name_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut src_hash: Option<String> = None;
    let mut dest = output.join(name);
    let mut counter = 0usize;

    loop {
        if !dest.exists() {
            fs::copy(src, &dest).map_err(|e| BatchError::CopyFailed {
                from: src.to_path_buf(),
                to: dest.clone(),
                source: e,
            })?;
            summary.copied += 1;
            if counter > 0 {
                summary.conflicts_resolved += 1;
                info!("Conflict resolved: {} → {}", src.display(), dest.display());
            } else {
                debug!("Copied {}", src.display());
            }
            return Ok(());
        }

        let src_digest = match src_hash {
            Some(ref h) => h.clone(),
            None => {
                let h = file_sha256(src)?;
                src_hash = Some(h.clone());
                h
            }
        };
        if file_sha256(&dest)? == src_digest {
            summary.skipped_duplicates += 1;
            debug!("Skipped duplicate {} (same as {})", src.display(), dest.display());
            return Ok(());
        }

        counter += 1;
        dest = output.join(format!("{stem}_{counter}{ext}"));
    }
}

/// Hex SHA-256 of a file's contents, streamed.
pub fn file_sha256(path: &Path) -> Result<String, BatchError> {
    let read_err = |source: std::io::Error| BatchError::DiscoveryFailed {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(read_err)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(read_err)?;
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn flattens_and_dedups() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write(&src.path().join("a/report.pdf"), "one");
        write(&src.path().join("b/report.pdf"), "one");
        write(&src.path().join("c/report.pdf"), "two");
        write(&src.path().join("d/report.pdf"), "three");
        write(&src.path().join("e/report.pdf"), "two");
        write(&src.path().join("memo.docx"), "memo");

        let summary = consolidate(src.path(), out.path(), true).unwrap();
        assert_eq!(
            summary,
            ConsolidationSummary {
                copied: 4,
                conflicts_resolved: 2,
                skipped_duplicates: 2,
            }
        );
        assert_eq!(fs::read_to_string(out.path().join("report.pdf")).unwrap(), "one");
        assert_eq!(fs::read_to_string(out.path().join("report_1.pdf")).unwrap(), "two");
        assert_eq!(fs::read_to_string(out.path().join("report_2.pdf")).unwrap(), "three");
        assert!(out.path().join("memo.docx").exists());
    }

    #[test]
    fn non_recursive_ignores_subdirectories() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write(&src.path().join("top.pdf"), "x");
        write(&src.path().join("sub/inner.pdf"), "y");

        let summary = consolidate(src.path(), out.path(), false).unwrap();
        assert_eq!(summary.copied, 1);
        assert!(!out.path().join("inner.pdf").exists());
    }

    #[test]
    fn rerun_copies_nothing() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write(&src.path().join("a/x.txt"), "1");
        write(&src.path().join("b/x.txt"), "2");

        consolidate(src.path(), out.path(), true).unwrap();
        let again = consolidate(src.path(), out.path(), true).unwrap();
        assert_eq!(again.copied, 0);
        assert_eq!(again.skipped_duplicates, 2);
    }

    #[test]
    fn output_inside_input_is_not_reingested() {
        let src = tempfile::tempdir().unwrap();
        write(&src.path().join("a.pdf"), "a");
        let out = src.path().join("flat");

        consolidate(src.path(), &out, true).unwrap();
        let again = consolidate(src.path(), &out, true).unwrap();
        assert_eq!(again.skipped_duplicates, 1);
        assert_eq!(again.copied, 0);
    }

    #[test]
    fn hashes_are_hex_sha256() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"abc").unwrap();
        assert_eq!(
            file_sha256(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
