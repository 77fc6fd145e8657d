//! Batch entry points: walk a corpus, OCR every document, persist artifacts.
//!
//! ## Per-document flow
//!
//! ```text
//! discover ─► already complete? ──yes──► skipped
//!                  │ no
//!                  ▼
//!             page source (spawn_blocking) ──err──► hard_failure
//!                  │
//!                  ▼
//!             reuse pages from an earlier .partial
//!                  │
//!                  ▼
//!             dispatch remaining pages ──stop──► interrupted
//!                  │
//!                  ▼
//!             assemble ─► persist ─► success | partial
//! ```
//!
//! Documents are processed a few at a time (`documents_in_flight`), all
//! sharing one [`ConcurrentDispatcher`], so `max_concurrency` bounds OCR
//! calls for the whole run. The report lists documents in discovery order.

use crate::config::{BatchConfig, PartialPolicy};
use crate::document::{page_refs, Document, DocumentKind, PageImage, PageRef};
use crate::error::{BatchError, PageSourceError, PersistenceError};
use crate::output::{BatchReport, DocumentArtifact, DocumentReport, DocumentStatus};
use crate::pipeline::assemble::{assemble, reusable_outcomes};
use crate::pipeline::discover::discover_documents;
use crate::pipeline::dispatch::ConcurrentDispatcher;
use crate::pipeline::ocr::{client_from_config, OcrClient};
use crate::pipeline::render::{read_image_folder, PageSource, RasterPageSource};
use crate::progress::{ProgressCounter, StopHandle};
use crate::tracker::{FsTracker, WorkUnitTracker};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// OCR every document under `input` and write one text artifact per
/// document into `output`.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// A [`BatchReport`] with one line per discovered document, even when some
/// documents failed.
///
/// # Errors
/// Only fatal problems abort the run:
/// - `input` is missing or not a directory
/// - `output` cannot be created
/// - the OCR provider cannot be constructed
pub async fn run(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &BatchConfig,
) -> Result<BatchReport, BatchError> {
    run_until_stopped(input, output, config, StopHandle::new()).await
}

/// [`run`], ending early once `stop` is triggered.
///
/// In-flight OCR calls finish; pages not yet started are abandoned and the
/// affected documents are reported `interrupted`.
pub async fn run_until_stopped(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &BatchConfig,
    stop: StopHandle,
) -> Result<BatchReport, BatchError> {
    let client = client_from_config(config)?;
    let source = Arc::new(RasterPageSource::from_config(config));
    BatchOrchestrator::new(config.clone(), source, client)
        .with_stop_handle(stop)
        .run(input.as_ref(), output.as_ref())
        .await
}

/// Drives one batch run over injectable collaborators.
pub struct BatchOrchestrator {
    config: BatchConfig,
    source: Arc<dyn PageSource>,
    client: Arc<dyn OcrClient>,
    tracker: Option<Arc<dyn WorkUnitTracker>>,
    stop: StopHandle,
    progress: Arc<ProgressCounter>,
}

impl BatchOrchestrator {
    pub fn new(config: BatchConfig, source: Arc<dyn PageSource>, client: Arc<dyn OcrClient>) -> Self {
        Self {
            config,
            source,
            client,
            tracker: None,
            stop: StopHandle::new(),
            progress: Arc::new(ProgressCounter::new()),
        }
    }

    /// Use `tracker` instead of an [`FsTracker`] over the output directory.
    pub fn with_tracker(mut self, tracker: Arc<dyn WorkUnitTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// Page counters for this orchestrator's runs. Poll
    /// [`ProgressCounter::snapshot`] from any task while [`run`](Self::run)
    /// is in progress; polling never blocks dispatch.
    pub fn progress(&self) -> Arc<ProgressCounter> {
        Arc::clone(&self.progress)
    }

    pub async fn run(&self, input: &Path, output: &Path) -> Result<BatchReport, BatchError> {
        let start = Instant::now();
        info!("Starting batch: {} → {}", input.display(), output.display());

        let documents = discover_documents(input, self.config.recursive)?;
        std::fs::create_dir_all(output).map_err(|e| BatchError::OutputDirFailed {
            path: output.to_path_buf(),
            source: e,
        })?;
        info!("Found {} documents", documents.len());

        let tracker: Arc<dyn WorkUnitTracker> = match self.tracker {
            Some(ref tracker) => Arc::clone(tracker),
            None => Arc::new(FsTracker::new(output)),
        };
        let calls_before = self.progress.ocr_calls();
        let dispatcher = ConcurrentDispatcher::from_config(Arc::clone(&self.client), &self.config)
            .with_stop_handle(self.stop.clone())
            .with_progress(Arc::clone(&self.progress));

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_start(documents.len());
        }

        // `buffered` keeps discovery order in the report while letting the
        // next documents start before the current one drains.
        let reports: Vec<DocumentReport> = stream::iter(documents)
            .map(|doc| self.process_document(doc, &dispatcher, &tracker))
            .buffered(self.config.documents_in_flight.max(1))
            .collect()
            .await;

        let report = BatchReport {
            documents: reports,
            ocr_calls: self.progress.ocr_calls() - calls_before,
            duration_ms: start.elapsed().as_millis() as u64,
            stopped: self.stop.is_stopped(),
        };

        info!(
            "Batch complete: {} succeeded, {} partial, {} failed, {} skipped, {} interrupted, {} OCR calls, {}ms",
            report.succeeded(),
            report.partial(),
            report.hard_failures(),
            report.skipped(),
            report.interrupted(),
            report.ocr_calls,
            report.duration_ms
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_complete(&report);
        }
        Ok(report)
    }

    async fn process_document(
        &self,
        doc: Document,
        dispatcher: &ConcurrentDispatcher,
        tracker: &Arc<dyn WorkUnitTracker>,
    ) -> DocumentReport {
        let report = self.process_document_inner(&doc, dispatcher, tracker).await;
        match report.status {
            DocumentStatus::HardFailure { ref reason } => {
                warn!(document = %doc.id, "Hard failure: {}", reason)
            }
            _ => info!("{}", report),
        }
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_document_complete(&report);
        }
        report
    }

    async fn process_document_inner(
        &self,
        doc: &Document,
        dispatcher: &ConcurrentDispatcher,
        tracker: &Arc<dyn WorkUnitTracker>,
    ) -> DocumentReport {
        let line = |status: DocumentStatus, pages: Option<usize>, artifact: Option<PathBuf>| {
            DocumentReport {
                document: doc.id.clone(),
                status,
                pages,
                artifact,
            }
        };

        if tracker.is_complete(&doc.id) {
            info!(document = %doc.id, "Skipping, artifact already present");
            return line(DocumentStatus::Skipped, None, None);
        }
        if self.stop.is_stopped() {
            return line(DocumentStatus::Interrupted, None, None);
        }

        // ── Step 1: Document → page images ───────────────────────────────
        let images = match self.load_pages(doc).await {
            Ok(images) if images.is_empty() => {
                return line(
                    DocumentStatus::HardFailure {
                        reason: "document has no pages".to_string(),
                    },
                    Some(0),
                    None,
                );
            }
            Ok(images) => images,
            Err(reason) => return line(DocumentStatus::HardFailure { reason }, None, None),
        };
        let pages = page_refs(&doc.id, images);
        let page_count = pages.len();

        // ── Step 2: Reuse pages from an earlier partial run ─────────────
        let mut outcomes = tracker
            .load_partial(&doc.id)
            .map(|previous| reusable_outcomes(&previous, page_count))
            .unwrap_or_default();
        let pending: Vec<PageRef> = pages
            .into_iter()
            .filter(|p| !outcomes.contains_key(&p.index))
            .collect();
        if !outcomes.is_empty() {
            info!(
                "{}: resuming, {} pages reused, {} to dispatch",
                doc.id,
                outcomes.len(),
                pending.len()
            );
        }

        if let Some(ref cb) = self.config.progress_callback {
            cb.on_document_start(&doc.id, page_count);
        }

        // ── Step 3: Dispatch ─────────────────────────────────────────────
        let dispatched = dispatcher.dispatch(&pending).await;
        if !dispatched.is_complete() {
            debug!(
                "{}: {} pages abandoned after stop",
                doc.id,
                dispatched.interrupted.len()
            );
            return line(DocumentStatus::Interrupted, Some(page_count), None);
        }
        outcomes.extend(dispatched.outcomes);

        // ── Step 4: Assemble and persist ─────────────────────────────────
        let artifact = assemble(&doc.id, page_count, &outcomes);
        let failed = artifact.failed_pages.len();
        match self.persist(artifact, tracker).await {
            Ok(path) => {
                let status = if failed == 0 {
                    DocumentStatus::Success
                } else {
                    DocumentStatus::Partial { failed }
                };
                line(status, Some(page_count), Some(path))
            }
            Err(reason) => line(DocumentStatus::HardFailure { reason }, Some(page_count), None),
        }
    }

    /// Run the page source off the async runtime.
    async fn load_pages(&self, doc: &Document) -> Result<Vec<PageImage>, String> {
        let source = Arc::clone(&self.source);
        let path = doc.path.clone();
        let kind = doc.kind;

        let converted = tokio::task::spawn_blocking(move || -> Result<Vec<PageImage>, PageSourceError> {
            match kind {
                DocumentKind::ImageFolder => read_image_folder(&path),
                kind => {
                    let bytes = std::fs::read(&path).map_err(|e| {
                        PageSourceError::ConversionError(format!("cannot read file: {e}"))
                    })?;
                    source.convert(&bytes, kind)
                }
            }
        })
        .await
        .map_err(|e| format!("page source panicked: {e}"))?;

        converted.map_err(|e| e.to_string())
    }

    /// Write the artifact according to the partial policy. Returns the path
    /// the artifact now lives at.
    async fn persist(
        &self,
        artifact: DocumentArtifact,
        tracker: &Arc<dyn WorkUnitTracker>,
    ) -> Result<PathBuf, String> {
        let tracker = Arc::clone(tracker);
        let commit = !artifact.is_partial() || self.config.partial_policy == PartialPolicy::Accept;

        tokio::task::spawn_blocking(move || -> Result<PathBuf, PersistenceError> {
            if commit {
                tracker.stage(&artifact)?;
                tracker.mark_complete(&artifact.document)
            } else {
                tracker.record_partial(&artifact)
            }
        })
        .await
        .map_err(|e| format!("persistence task panicked: {e}"))?
        .map_err(|e| e.to_string())
    }
}
