//! # scan2text
//!
//! Batch OCR for scanned document corpora using vision models.
//!
//! ## Why this crate?
//!
//! Archives of scanned letters, forms and reports carry no text layer.
//! Running a vision model over every page is easy for one file and tedious
//! for ten thousand: calls time out, servers fall over, and a crash halfway
//! through should not mean starting again. This crate walks a directory,
//! rasterises every document, sends pages to an OCR model under one global
//! concurrency bound, and writes one text file per document. Re-running over
//! the same directories only does the work that is still missing.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input dir
//!  │
//!  ├─ 1. Discover  PDFs, DOCX, images, folders of page images
//!  ├─ 2. Skip      documents whose artifact already exists
//!  ├─ 3. Render    pdfium / LibreOffice → page PNGs (spawn_blocking),
//!  │               optionally rotated upright with tesseract OSD
//!  ├─ 4. OCR       concurrent calls, bounded for the whole run, with retries
//!  ├─ 5. Assemble  page texts in page order, failed pages as placeholders
//!  └─ 6. Persist   staged write + atomic rename, then the batch report
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scan2text::{run, BatchConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Talks to an OpenAI-compatible server on localhost:5551 by default.
//!     let config = BatchConfig::builder().max_concurrency(5).build()?;
//!     let report = run("scans/", "text/", &config).await?;
//!     print!("{report}");
//!     Ok(())
//! }
//! ```
//!
//! ## Artifacts
//!
//! `scans/2024/a.pdf` becomes `text/2024%2Fa.pdf.txt`:
//!
//! ```text
//! --- page 1 ---
//! Dear Sir,
//!
//! --- page 2 ---
//! [OCR FAILED after 3 attempts: timed out after 60s]
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `scan2text` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! scan2text = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod consolidate;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod tracker;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{run, run_until_stopped, BatchOrchestrator};
pub use config::{BatchConfig, BatchConfigBuilder, PartialPolicy, PromptStyle};
pub use consolidate::{consolidate, ConsolidationSummary};
pub use document::{Document, DocumentId, DocumentKind, PageImage, PageRef};
pub use error::{BatchError, OcrError, PageSourceError, PersistenceError};
pub use output::{BatchReport, DocumentArtifact, DocumentReport, DocumentStatus, PageOutcome};
pub use pipeline::dispatch::{ConcurrentDispatcher, RetryPolicy};
pub use pipeline::ocr::{HttpOcrClient, OcrClient, ProviderOcrClient};
pub use pipeline::orient::OrientationCorrector;
pub use pipeline::render::{PageSource, RasterPageSource};
pub use progress::{
    BatchProgressCallback, NoopProgressCallback, ProgressCallback, ProgressCounter,
    ProgressSnapshot, StopHandle,
};
pub use tracker::{FsTracker, WorkUnitTracker};
