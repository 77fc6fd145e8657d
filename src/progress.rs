//! Progress reporting and graceful stop for batch runs.
//!
//! Two complementary ways to observe a run:
//!
//! * [`BatchProgressCallback`]: push-style events (document started, page
//!   finished, ...). The CLI forwards these to an indicatif progress bar.
//! * [`ProgressCounter`]: pull-style counters backed by atomics. Any thread
//!   can call [`ProgressCounter::snapshot`] at any time without blocking the
//!   dispatcher.
//!
//! [`StopHandle`] is the cooperative cancellation flag checked by the
//! dispatcher before every OCR attempt.
//!
//! # Example
//!
//! ```rust
//! use scan2text::{BatchProgressCallback, DocumentId};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     pages: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, _doc: &DocumentId, _page_num: usize, _text_len: usize) {
//!         self.pages.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//! ```

use crate::document::DocumentId;
use crate::output::{BatchReport, DocumentReport};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Called by the batch as it processes documents and pages.
///
/// Page events for different pages (and different documents) may arrive
/// concurrently from different tasks, in any order. Implementations must
/// protect shared mutable state themselves. All methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after discovery.
    ///
    /// # Arguments
    /// * `total_documents`: documents found in the input directory,
    ///   including ones that will be skipped
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called when a document's pages have been obtained and are about to
    /// be dispatched.
    fn on_document_start(&self, document: &DocumentId, total_pages: usize) {
        let _ = (document, total_pages);
    }

    /// Called when a page's OCR succeeds.
    ///
    /// # Arguments
    /// * `page_num`: 1-indexed page number
    /// * `text_len`: byte length of the extracted text
    fn on_page_complete(&self, document: &DocumentId, page_num: usize, text_len: usize) {
        let _ = (document, page_num, text_len);
    }

    /// Called when a page fails permanently (retries exhausted or a
    /// non-retryable error).
    fn on_page_error(&self, document: &DocumentId, page_num: usize, error: &str) {
        let _ = (document, page_num, error);
    }

    /// Called once per document with its final report line, skipped
    /// documents included.
    fn on_document_complete(&self, report: &DocumentReport) {
        let _ = report;
    }

    /// Called once at the end of the run.
    fn on_batch_complete(&self, report: &BatchReport) {
        let _ = report;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

/// Page counters shared between the dispatcher and observers.
#[derive(Debug, Default)]
pub struct ProgressCounter {
    completed: AtomicUsize,
    total: AtomicUsize,
    ocr_calls: AtomicU64,
}

/// A point-in-time view of [`ProgressCounter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Pages whose outcome (success or failure) is recorded.
    pub completed: usize,
    /// Pages handed to the dispatcher so far.
    pub total: usize,
}

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_total(&self, pages: usize) {
        self.total.fetch_add(pages, Ordering::Relaxed);
    }

    pub(crate) fn complete_page(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_call(&self) {
        self.ocr_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
        }
    }

    /// OCR calls issued so far, retries included.
    pub fn ocr_calls(&self) -> u64 {
        self.ocr_calls.load(Ordering::Relaxed)
    }
}

/// Cooperative stop flag. Cloning shares the flag.
///
/// Once stopped, no new OCR attempts start; calls already in flight are
/// allowed to finish or time out.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::DocumentStatus;
    use std::sync::Mutex;

    struct TrackingCallback {
        pages: AtomicUsize,
        errors: AtomicUsize,
        lines: Mutex<Vec<String>>,
    }

    impl BatchProgressCallback for TrackingCallback {
        fn on_page_complete(&self, _doc: &DocumentId, _page_num: usize, _text_len: usize) {
            self.pages.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_error(&self, _doc: &DocumentId, _page_num: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_complete(&self, report: &DocumentReport) {
            self.lines.lock().unwrap().push(report.to_string());
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        let id = DocumentId::new("a.pdf");
        cb.on_batch_start(2);
        cb.on_document_start(&id, 3);
        cb.on_page_complete(&id, 1, 42);
        cb.on_page_error(&id, 2, "timed out");
        cb.on_batch_complete(&BatchReport::default());
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            pages: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            lines: Mutex::new(Vec::new()),
        };
        let id = DocumentId::new("a.pdf");
        tracker.on_page_complete(&id, 1, 10);
        tracker.on_page_complete(&id, 2, 10);
        tracker.on_page_error(&id, 3, "HTTP 400");
        tracker.on_document_complete(&DocumentReport {
            document: id,
            status: DocumentStatus::Partial { failed: 1 },
            pages: Some(3),
            artifact: None,
        });

        assert_eq!(tracker.pages.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
        assert_eq!(*tracker.lines.lock().unwrap(), vec!["a.pdf: partial:1_failed"]);
    }

    #[test]
    fn counter_snapshot() {
        let counter = ProgressCounter::new();
        counter.add_total(5);
        counter.complete_page();
        counter.complete_page();
        counter.record_call();
        assert_eq!(
            counter.snapshot(),
            ProgressSnapshot {
                completed: 2,
                total: 5
            }
        );
        assert_eq!(counter.ocr_calls(), 1);
    }

    #[test]
    fn stop_handle_is_shared_between_clones() {
        let a = StopHandle::new();
        let b = a.clone();
        assert!(!b.is_stopped());
        a.stop();
        assert!(b.is_stopped());
    }
}
