//! Result types: per-page outcomes, assembled artifacts and the batch report.

use crate::document::DocumentId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Result of dispatching one page to the OCR service. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PageOutcome {
    Success { text: String, attempts: u32 },
    Failed { reason: String, attempts: u32 },
}

impl PageOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PageOutcome::Success { .. })
    }

    /// Number of OCR calls made for this page. Zero for pages carried over
    /// from an earlier run's artifact.
    pub fn attempts(&self) -> u32 {
        match self {
            PageOutcome::Success { attempts, .. } | PageOutcome::Failed { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// The assembled text of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentArtifact {
    pub document: DocumentId,
    pub text: String,
    pub page_count: usize,
    /// 1-based numbers of pages rendered as failure placeholders.
    pub failed_pages: Vec<usize>,
}

impl DocumentArtifact {
    pub fn is_partial(&self) -> bool {
        !self.failed_pages.is_empty()
    }
}

/// Final status of one document in a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentStatus {
    Success,
    Partial { failed: usize },
    HardFailure { reason: String },
    /// Already complete from an earlier run; nothing dispatched.
    Skipped,
    /// A stop signal arrived before the document finished.
    Interrupted,
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentStatus::Success => f.write_str("success"),
            DocumentStatus::Partial { failed } => write!(f, "partial:{failed}_failed"),
            DocumentStatus::HardFailure { reason } => write!(f, "hard_failure:{reason}"),
            DocumentStatus::Skipped => f.write_str("skipped"),
            DocumentStatus::Interrupted => f.write_str("interrupted"),
        }
    }
}

/// One line of the batch report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentReport {
    pub document: DocumentId,
    pub status: DocumentStatus,
    /// Pages in the document, when they could be determined.
    pub pages: Option<usize>,
    /// Where the artifact was written, if one was.
    pub artifact: Option<PathBuf>,
}

impl fmt::Display for DocumentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.document, self.status)
    }
}

/// Outcome of a whole batch run. Every discovered document appears exactly once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub documents: Vec<DocumentReport>,
    /// Total OCR calls issued during this run, retries included.
    pub ocr_calls: u64,
    pub duration_ms: u64,
    /// True when the run ended because of a stop signal.
    pub stopped: bool,
}

impl BatchReport {
    pub fn status_of(&self, id: &str) -> Option<&DocumentStatus> {
        self.documents
            .iter()
            .find(|d| d.document.as_str() == id)
            .map(|d| &d.status)
    }

    fn count(&self, pred: impl Fn(&DocumentStatus) -> bool) -> usize {
        self.documents.iter().filter(|d| pred(&d.status)).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, DocumentStatus::Success))
    }

    pub fn partial(&self) -> usize {
        self.count(|s| matches!(s, DocumentStatus::Partial { .. }))
    }

    pub fn hard_failures(&self) -> usize {
        self.count(|s| matches!(s, DocumentStatus::HardFailure { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, DocumentStatus::Skipped))
    }

    pub fn interrupted(&self) -> usize {
        self.count(|s| matches!(s, DocumentStatus::Interrupted))
    }

    /// True when no document ended partial, failed or interrupted.
    pub fn is_clean(&self) -> bool {
        self.partial() + self.hard_failures() + self.interrupted() == 0
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for doc in &self.documents {
            writeln!(f, "{doc}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: &str, status: DocumentStatus) -> DocumentReport {
        DocumentReport {
            document: DocumentId::new(id),
            status,
            pages: None,
            artifact: None,
        }
    }

    #[test]
    fn status_lines_match_report_format() {
        assert_eq!(line("doc1", DocumentStatus::Success).to_string(), "doc1: success");
        assert_eq!(
            line("doc2", DocumentStatus::Partial { failed: 1 }).to_string(),
            "doc2: partial:1_failed"
        );
        assert_eq!(
            line(
                "doc3",
                DocumentStatus::HardFailure {
                    reason: "unsupported format: .xls".into()
                }
            )
            .to_string(),
            "doc3: hard_failure:unsupported format: .xls"
        );
    }

    #[test]
    fn report_counts_and_rendering() {
        let report = BatchReport {
            documents: vec![
                line("a", DocumentStatus::Success),
                line("b", DocumentStatus::Skipped),
                line("c", DocumentStatus::Partial { failed: 2 }),
            ],
            ..Default::default()
        };
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.partial(), 1);
        assert!(!report.is_clean());
        assert_eq!(report.to_string(), "a: success\nb: skipped\nc: partial:2_failed\n");
        assert_eq!(report.status_of("c"), Some(&DocumentStatus::Partial { failed: 2 }));
    }

    #[test]
    fn outcome_serialises_with_tag() {
        let json = serde_json::to_string(&PageOutcome::Failed {
            reason: "timed out after 60s".into(),
            attempts: 3,
        })
        .unwrap();
        assert!(json.contains("\"outcome\":\"failed\""), "got: {json}");
    }
}
