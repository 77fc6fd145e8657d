//! Pipeline stages for batch OCR.
//!
//! Each submodule implements one step. The batch driver in
//! [`crate::batch`] strings them together per document.
//!
//! ## Data Flow
//!
//! ```text
//! discover ──▶ render ──▶ dispatch ──▶ assemble
//! (walk dir)   (pages)    (OCR calls)  (ordered text)
//!                 │           │
//!              encode      ocr + postprocess
//! ```
//!
//! 1. [`discover`] - find documents under the input directory
//! 2. [`render`] - turn a document into page images; blocking, so it runs in
//!    `spawn_blocking`
//!    ([`orient`] optionally rotates rendered pages upright first)
//! 3. [`encode`] - PNG-encode rendered pages and wrap them for the request body
//! 4. [`ocr`] - one OCR call per page image; the only stage with network I/O
//! 5. [`dispatch`] - fan pages out under the run-wide concurrency bound, with
//!    retry and backoff
//! 6. [`postprocess`] - deterministic cleanup of model output
//! 7. [`assemble`] - join page texts in page order with boundary markers

pub mod assemble;
pub mod discover;
pub mod dispatch;
pub mod encode;
pub mod ocr;
pub mod orient;
pub mod postprocess;
pub mod render;
