//! Deterministic assembly of page outcomes into one document artifact.
//!
//! ```text
//! --- page 1 ---
//! first page text
//!
//! --- page 2 ---
//! [OCR FAILED after 3 attempts: request timed out after 60s]
//! ```
//!
//! Pages are emitted in index order regardless of the order their OCR calls
//! finished. Failed pages keep their slot as a placeholder so the artifact
//! can be parsed later to find exactly which pages need another pass.

use crate::document::DocumentId;
use crate::output::{DocumentArtifact, PageOutcome};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

const FAILED_PREFIX: &str = "[OCR FAILED after ";

/// Page-boundary marker line for 1-based page `page_num`.
pub fn page_marker(page_num: usize) -> String {
    format!("--- page {page_num} ---")
}

/// Placeholder body for a page that never produced text.
pub fn failed_placeholder(attempts: u32, reason: &str) -> String {
    // Keep the placeholder on one line so it parses back unambiguously.
    let reason = reason.replace(['\r', '\n'], " ");
    format!("{FAILED_PREFIX}{attempts} attempts: {reason}]")
}

/// Build the artifact for a document with `page_count` pages.
///
/// A page index with no entry in `outcomes` is rendered as failed.
pub fn assemble(
    document: &DocumentId,
    page_count: usize,
    outcomes: &BTreeMap<usize, PageOutcome>,
) -> DocumentArtifact {
    let mut failed_pages = Vec::new();
    let blocks: Vec<String> = (0..page_count)
        .map(|index| {
            let page_num = index + 1;
            let body = match outcomes.get(&index) {
                Some(PageOutcome::Success { text, .. }) => text.clone(),
                Some(PageOutcome::Failed { reason, attempts }) => {
                    failed_pages.push(page_num);
                    failed_placeholder(*attempts, reason)
                }
                None => {
                    failed_pages.push(page_num);
                    failed_placeholder(0, "no outcome recorded")
                }
            };
            format!("{}\n{}\n", page_marker(page_num), body)
        })
        .collect();

    DocumentArtifact {
        document: document.clone(),
        text: blocks.join("\n"),
        page_count,
        failed_pages,
    }
}

/// One page recovered from a persisted artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPage {
    pub page_num: usize,
    pub text: String,
    pub failed: bool,
}

static RE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^--- page (\d+) ---\n").unwrap());

/// Split an artifact back into its pages.
pub fn parse_artifact(text: &str) -> Vec<ArtifactPage> {
    let markers: Vec<(usize, usize, usize)> = RE_MARKER
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let page_num = caps[1].parse().ok()?;
            Some((whole.start(), whole.end(), page_num))
        })
        .collect();

    markers
        .iter()
        .enumerate()
        .map(|(i, &(_, body_start, page_num))| {
            let body_end = markers.get(i + 1).map_or(text.len(), |next| next.0);
            let body = text[body_start..body_end].trim_end_matches('\n');
            ArtifactPage {
                page_num,
                text: body.to_string(),
                failed: body.starts_with(FAILED_PREFIX) && !body.contains('\n') && body.ends_with(']'),
            }
        })
        .collect()
}

/// Successful pages of an earlier partial artifact, as zero-attempt
/// outcomes keyed by page index.
///
/// Returns nothing unless the artifact lists exactly pages `1..=page_count`
/// in order; a document whose page count changed is processed from scratch.
pub fn reusable_outcomes(previous: &str, page_count: usize) -> BTreeMap<usize, PageOutcome> {
    let pages = parse_artifact(previous);
    let aligned = pages.len() == page_count
        && pages.iter().enumerate().all(|(i, p)| p.page_num == i + 1);
    if !aligned {
        return BTreeMap::new();
    }

    pages
        .into_iter()
        .filter(|p| !p.failed)
        .map(|p| {
            (
                p.page_num - 1,
                PageOutcome::Success {
                    text: p.text,
                    attempts: 0,
                },
            )
        })
        .collect()
}
