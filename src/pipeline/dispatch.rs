//! Concurrent page dispatch: fan pages out to the OCR client under one
//! global concurrency bound, retry transient failures, and collect outcomes
//! keyed by page index.
//!
//! ## Concurrency bound
//!
//! A single [`ConcurrentDispatcher`] is created per batch run and cloned into
//! every document task. Clones share one `tokio::sync::Semaphore` with
//! `max_concurrency` permits; an OCR attempt holds a permit only while its
//! call is in flight. The bound therefore covers the whole run, not each
//! document, and a page waiting out its retry backoff does not occupy a slot.
//!
//! ## Ordering
//!
//! Outcomes arrive in completion order and are stored in a `BTreeMap` keyed
//! by page index. Nothing downstream ever sees arrival order.
//!
//! ## Retry Strategy
//!
//! Up to `max_retries + 1` attempts per page, with exponential backoff
//! (`retry_backoff_ms * 2^(retry - 1)`). Non-retryable errors (see
//! [`OcrError::is_retryable`]) fail the page after the attempt that raised
//! them. A failed page never affects its siblings.

use crate::config::BatchConfig;
use crate::document::{DocumentId, PageRef};
use crate::error::OcrError;
use crate::output::PageOutcome;
use crate::pipeline::ocr::OcrClient;
use crate::pipeline::postprocess::clean_ocr_text;
use crate::progress::{ProgressCallback, ProgressCounter, StopHandle};
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Attempt limits and timing for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub timeout: Duration,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &BatchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            timeout: Duration::from_secs(config.timeout_secs),
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        self.backoff
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
    }
}

/// Outcomes for one document's pages.
#[derive(Debug, Clone, Default)]
pub struct DispatchResult {
    /// Resolved pages, keyed by 0-based page index.
    pub outcomes: BTreeMap<usize, PageOutcome>,
    /// Indices of pages abandoned because a stop was requested.
    pub interrupted: Vec<usize>,
}

impl DispatchResult {
    /// True when every dispatched page has an outcome.
    pub fn is_complete(&self) -> bool {
        self.interrupted.is_empty()
    }
}

/// Dispatches page OCR under a run-wide concurrency bound.
#[derive(Clone)]
pub struct ConcurrentDispatcher {
    client: Arc<dyn OcrClient>,
    permits: Arc<Semaphore>,
    policy: RetryPolicy,
    progress: Arc<ProgressCounter>,
    stop: StopHandle,
    callback: Option<ProgressCallback>,
}

impl ConcurrentDispatcher {
    pub fn new(client: Arc<dyn OcrClient>, max_concurrency: usize, policy: RetryPolicy) -> Self {
        Self {
            client,
            permits: Arc::new(Semaphore::new(max_concurrency.max(1))),
            policy,
            progress: Arc::new(ProgressCounter::new()),
            stop: StopHandle::new(),
            callback: None,
        }
    }

    pub fn from_config(client: Arc<dyn OcrClient>, config: &BatchConfig) -> Self {
        let mut dispatcher = Self::new(client, config.max_concurrency, RetryPolicy::from_config(config));
        dispatcher.callback = config.progress_callback.clone();
        dispatcher
    }

    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// Count into `progress` instead of a private counter, so an observer
    /// that created it can poll while dispatch runs.
    pub fn with_progress(mut self, progress: Arc<ProgressCounter>) -> Self {
        self.progress = progress;
        self
    }

    /// Shared page counters; safe to poll from any thread while dispatching.
    pub fn progress(&self) -> Arc<ProgressCounter> {
        Arc::clone(&self.progress)
    }

    /// Run OCR for every page, returning one outcome per page that was not
    /// abandoned by a stop request.
    pub async fn dispatch(&self, pages: &[PageRef]) -> DispatchResult {
        self.progress.add_total(pages.len());

        // Every page future is polled at once; the semaphore, not the
        // stream, limits how many calls are actually in flight.
        let resolved: Vec<(usize, Option<PageOutcome>)> = stream::iter(pages)
            .map(|page| async move { (page.index, self.run_page(page).await) })
            .buffer_unordered(pages.len().max(1))
            .collect()
            .await;

        let mut result = DispatchResult::default();
        for (index, outcome) in resolved {
            match outcome {
                Some(outcome) => {
                    result.outcomes.insert(index, outcome);
                }
                None => result.interrupted.push(index),
            }
        }
        result.interrupted.sort_unstable();
        result
    }

    /// All attempts for one page. `None` means a stop arrived before the
    /// page resolved.
    async fn run_page(&self, page: &PageRef) -> Option<PageOutcome> {
        let max_attempts = self.policy.max_attempts();
        let mut last_err: Option<OcrError> = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let backoff = self.policy.backoff_for(attempt - 1);
                warn!(
                    document = %page.document,
                    "Page {}: retry {}/{} after {}ms",
                    page.page_num(),
                    attempt - 1,
                    self.policy.max_retries,
                    backoff.as_millis()
                );
                if !backoff.is_zero() {
                    sleep(backoff).await;
                }
            }

            if self.stop.is_stopped() {
                return None;
            }
            let Ok(_permit) = self.permits.acquire().await else {
                return None;
            };
            // A stop may have arrived while this page waited for a slot.
            if self.stop.is_stopped() {
                return None;
            }

            self.progress.record_call();
            let result = match tokio::time::timeout(
                self.policy.timeout,
                self.client.extract_text(&page.image, self.policy.timeout),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(OcrError::timeout(self.policy.timeout)),
            };

            match result {
                Ok(text) => {
                    let text = clean_ocr_text(&text);
                    debug!(document = %page.document, "Page {}: {} chars", page.page_num(), text.len());
                    self.page_done(&page.document, page.page_num(), Ok(text.len()));
                    return Some(PageOutcome::Success {
                        text,
                        attempts: attempt,
                    });
                }
                Err(e) if !e.is_retryable() => {
                    warn!(document = %page.document, "Page {}: not retrying: {}", page.page_num(), e);
                    return Some(self.failed(page, e, attempt));
                }
                Err(e) => {
                    warn!(
                        document = %page.document,
                        "Page {}: attempt {} failed: {}",
                        page.page_num(),
                        attempt,
                        e
                    );
                    last_err = Some(e);
                }
            }
        }

        let err = last_err.unwrap_or_else(|| OcrError::Transport("no attempt was made".into()));
        Some(self.failed(page, err, max_attempts))
    }

    fn failed(&self, page: &PageRef, err: OcrError, attempts: u32) -> PageOutcome {
        let reason = err.to_string();
        self.page_done(&page.document, page.page_num(), Err(&reason));
        PageOutcome::Failed { reason, attempts }
    }

    fn page_done(&self, document: &DocumentId, page_num: usize, result: Result<usize, &str>) {
        self.progress.complete_page();
        if let Some(ref cb) = self.callback {
            match result {
                Ok(len) => cb.on_page_complete(document, page_num, len),
                Err(e) => cb.on_page_error(document, page_num, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{page_refs, PageImage};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Fake client: page identity is the first image byte.
    #[derive(Default)]
    struct ScriptedClient {
        /// Errors to return, per page, before succeeding.
        failures: Mutex<HashMap<u8, Vec<OcrError>>>,
        calls: Mutex<HashMap<u8, u32>>,
        /// Later pages answer faster, so completion order is reversed.
        reverse_latency: bool,
    }

    impl ScriptedClient {
        fn failing(page: u8, errors: Vec<OcrError>) -> Self {
            let client = Self::default();
            client.failures.lock().unwrap().insert(page, errors);
            client
        }

        fn calls_for(&self, page: u8) -> u32 {
            *self.calls.lock().unwrap().get(&page).unwrap_or(&0)
        }
    }

    #[async_trait]
    impl OcrClient for ScriptedClient {
        async fn extract_text(&self, image: &PageImage, _timeout: Duration) -> Result<String, OcrError> {
            let page = image.bytes[0];
            *self.calls.lock().unwrap().entry(page).or_insert(0) += 1;
            if self.reverse_latency {
                sleep(Duration::from_millis(5 * (10 - page as u64))).await;
            }
            let next_err = self
                .failures
                .lock()
                .unwrap()
                .get_mut(&page)
                .and_then(|errs| if errs.is_empty() { None } else { Some(errs.remove(0)) });
            match next_err {
                Some(e) => Err(e),
                None => Ok(format!("text of page {page}")),
            }
        }
    }

    fn pages(n: u8) -> Vec<PageRef> {
        page_refs(
            &DocumentId::new("doc.pdf"),
            (0..n).map(|i| PageImage::png(vec![i])).collect(),
        )
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            timeout: Duration::from_secs(5),
            backoff: Duration::ZERO,
        }
    }

    fn transport() -> OcrError {
        OcrError::Transport("connection reset".into())
    }

    #[test]
    fn backoff_doubles() {
        let p = RetryPolicy {
            max_retries: 3,
            timeout: Duration::from_secs(1),
            backoff: Duration::from_millis(500),
        };
        assert_eq!(p.backoff_for(1), Duration::from_millis(500));
        assert_eq!(p.backoff_for(2), Duration::from_millis(1000));
        assert_eq!(p.backoff_for(3), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn outcomes_are_keyed_by_index_not_arrival() {
        let client = Arc::new(ScriptedClient {
            reverse_latency: true,
            ..Default::default()
        });
        let dispatcher = ConcurrentDispatcher::new(client, 5, policy(0));
        let result = dispatcher.dispatch(&pages(5)).await;

        assert!(result.is_complete());
        let texts: Vec<_> = result
            .outcomes
            .iter()
            .map(|(idx, o)| match o {
                PageOutcome::Success { text, .. } => (*idx, text.clone()),
                other => panic!("unexpected outcome {other:?}"),
            })
            .collect();
        for (i, (idx, text)) in texts.iter().enumerate() {
            assert_eq!(*idx, i);
            assert_eq!(*text, format!("text of page {i}"));
        }
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt() {
        let client = Arc::new(ScriptedClient::failing(0, vec![transport(), transport()]));
        let dispatcher = ConcurrentDispatcher::new(client.clone(), 2, policy(2));
        let result = dispatcher.dispatch(&pages(1)).await;

        assert_eq!(
            result.outcomes[&0],
            PageOutcome::Success {
                text: "text of page 0".into(),
                attempts: 3
            }
        );
        assert_eq!(client.calls_for(0), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries_plus_one() {
        let errors = vec![transport(); 10];
        let client = Arc::new(ScriptedClient::failing(0, errors));
        let dispatcher = ConcurrentDispatcher::new(client.clone(), 2, policy(3));
        let result = dispatcher.dispatch(&pages(1)).await;

        match &result.outcomes[&0] {
            PageOutcome::Failed { attempts, reason } => {
                assert_eq!(*attempts, 4);
                assert!(reason.contains("connection reset"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(client.calls_for(0), 4);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let client = Arc::new(ScriptedClient::failing(
            1,
            vec![OcrError::ServiceError {
                status: 400,
                body: "malformed".into(),
            }],
        ));
        let dispatcher = ConcurrentDispatcher::new(client.clone(), 2, policy(3));
        let result = dispatcher.dispatch(&pages(3)).await;

        assert!(matches!(result.outcomes[&1], PageOutcome::Failed { attempts: 1, .. }));
        assert_eq!(client.calls_for(1), 1);
        assert!(result.outcomes[&0].is_success());
        assert!(result.outcomes[&2].is_success());
    }

    /// Counts how many calls are in flight at once.
    struct GaugeClient {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl OcrClient for GaugeClient {
        async fn extract_text(&self, _image: &PageImage, _timeout: Duration) -> Result<String, OcrError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            sleep(Duration::from_millis(10)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok("ok".into())
        }
    }

    #[tokio::test]
    async fn concurrency_is_bounded_across_documents() {
        let client = Arc::new(GaugeClient {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let dispatcher = ConcurrentDispatcher::new(client.clone(), 3, policy(0));
        let a = pages(8);
        let b = page_refs(
            &DocumentId::new("other.pdf"),
            (0..8).map(|i| PageImage::png(vec![i])).collect(),
        );

        let d1 = dispatcher.clone();
        let (ra, rb) = tokio::join!(d1.dispatch(&a), dispatcher.dispatch(&b));
        assert_eq!(ra.outcomes.len() + rb.outcomes.len(), 16);
        assert!(client.peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(dispatcher.progress().snapshot().completed, 16);
        assert_eq!(dispatcher.progress().ocr_calls(), 16);
    }

    #[tokio::test]
    async fn stop_abandons_pages_that_have_not_started() {
        let client = Arc::new(ScriptedClient::default());
        let stop = StopHandle::new();
        stop.stop();
        let dispatcher = ConcurrentDispatcher::new(client.clone(), 2, policy(0)).with_stop_handle(stop);
        let result = dispatcher.dispatch(&pages(3)).await;

        assert!(result.outcomes.is_empty());
        assert_eq!(result.interrupted, vec![0, 1, 2]);
        assert_eq!(client.calls_for(0), 0);
    }

    /// Never answers; the dispatcher's own timeout must fire.
    struct HangingClient;

    #[async_trait]
    impl OcrClient for HangingClient {
        async fn extract_text(&self, _image: &PageImage, _timeout: Duration) -> Result<String, OcrError> {
            futures::future::pending::<()>().await;
            unreachable!()
        }
    }

    #[tokio::test]
    async fn hung_call_times_out() {
        let p = RetryPolicy {
            max_retries: 1,
            timeout: Duration::from_millis(20),
            backoff: Duration::ZERO,
        };
        let dispatcher = ConcurrentDispatcher::new(Arc::new(HangingClient), 1, p);
        let result = dispatcher.dispatch(&pages(1)).await;
        match &result.outcomes[&0] {
            PageOutcome::Failed { attempts, reason } => {
                assert_eq!(*attempts, 2);
                assert_eq!(reason, "timed out after 20ms");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
