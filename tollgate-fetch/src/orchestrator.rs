//! Paginated fetch orchestration.
//!
//! The [`FetchOrchestrator`] walks a result set page by page through a
//! [`PageSource`] and hands back a lazy [`RecordStream`]:
//!
//! - The first page is fetched alone. Once it reports `total_count`,
//!   further pages are scheduled at successive `page_size` offsets, up to
//!   the session's concurrency limit.
//! - A page shorter than requested does not end the walk. The rest of its
//!   range is requested again from `result_index + records.len()`.
//! - The walk ends at an empty page, the latest `total_count`, or the
//!   caller's cap, whichever comes first.
//! - Records are deduplicated by [`RecordKey`] within one walk.
//! - Ordered walks emit pages in ascending `result_index`; unordered walks
//!   emit pages as they arrive.
//! - A failing page stops scheduling. Pages already in flight finish, and
//!   the stream ends with a [`FetchError`] carrying the resume index.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, Stream, StreamExt};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tollgate_core::{FetchMetrics, FilterSet, PageRequest, PageResult, Record, RecordKey};
use tracing::{debug, info, warn};

use crate::context::{MAX_CONCURRENCY, SessionMetrics};
use crate::error::{FetchError, PartialResultError, SessionError};

/// Page events buffered between the driver and the consumer.
const EVENT_BUFFER: usize = 8;

// ============================================================================
// Page Source
// ============================================================================

/// Produces one page of results.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetches the page described by `request`.
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResult, SessionError>;
}

// ============================================================================
// Fetch Plan
// ============================================================================

/// Emission order of a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitOrder {
    /// Ascending `result_index`.
    #[default]
    Ordered,
    /// As pages arrive.
    Unordered,
}

/// What to fetch.
#[derive(Debug, Clone)]
pub struct FetchPlan {
    /// Search filters, passed through to every page.
    pub filter_set: FilterSet,
    /// Index of the first result.
    pub start_index: u64,
    /// Records per page.
    pub page_size: u32,
    /// Stop after this many records.
    pub max_results: Option<u64>,
    /// Emission order.
    pub order: EmitOrder,
}

impl FetchPlan {
    /// A plan from index zero with 250-record pages.
    pub fn new(filter_set: FilterSet) -> Self {
        Self {
            filter_set,
            start_index: 0,
            page_size: 250,
            max_results: None,
            order: EmitOrder::Ordered,
        }
    }

    /// Starts at `index`, e.g. a previous failure's resume index.
    pub fn starting_at(mut self, index: u64) -> Self {
        self.start_index = index;
        self
    }

    /// Sets the page size.
    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    /// Caps the number of records.
    pub fn max_results(mut self, max: u64) -> Self {
        self.max_results = Some(max);
        self
    }

    /// Sets the emission order.
    pub fn order(mut self, order: EmitOrder) -> Self {
        self.order = order;
        self
    }

    /// Clamps the page size into `1..=max_page_size`.
    fn clamped(mut self, max_page_size: u32) -> Self {
        let clamped = self.page_size.clamp(1, max_page_size.max(1));
        if clamped != self.page_size {
            warn!(
                requested = self.page_size,
                used = clamped,
                "Page size out of range, clamping"
            );
            self.page_size = clamped;
        }
        self
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Stops a walk from scheduling further pages.
///
/// Pages already in flight still complete and are emitted.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl CancellationSignal {
    /// Creates an untriggered signal.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Triggers the signal.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Returns true once triggered.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// How a walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Completion {
    /// The result set ran out.
    Exhausted,
    /// The caller's cap was reached.
    Capped,
    /// The caller cancelled. Restart from `resume_index` to continue.
    Cancelled {
        /// First result index not delivered.
        resume_index: u64,
    },
}

/// A finished walk.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Unique records in emission order.
    pub records: Vec<Record>,
    /// How the walk ended.
    pub completion: Completion,
    /// Session counters at the end of the walk.
    pub metrics: FetchMetrics,
}

// ============================================================================
// Record Stream
// ============================================================================

enum StreamEvent {
    Records {
        records: Vec<Record>,
        resume_index: u64,
    },
    Done(Completion),
    Failed(FetchError),
}

/// Lazy stream of unique records.
///
/// Ends with `None` on success or cancellation (see
/// [`completion`](Self::completion)), or with a single `Err` on failure.
/// Dropping the stream stops the walk.
pub struct RecordStream {
    events: mpsc::Receiver<StreamEvent>,
    buffered: VecDeque<Record>,
    completion: Option<Completion>,
    resume_index: u64,
    finished: bool,
    driver: JoinHandle<()>,
}

impl RecordStream {
    /// How the walk ended, once the stream has returned `None`.
    pub fn completion(&self) -> Option<Completion> {
        self.completion
    }
}

impl Stream for RecordStream {
    type Item = Result<Record, FetchError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(record) = this.buffered.pop_front() {
                return Poll::Ready(Some(Ok(record)));
            }
            if this.finished {
                return Poll::Ready(None);
            }

            match ready!(this.events.poll_recv(cx)) {
                Some(StreamEvent::Records {
                    records,
                    resume_index,
                }) => {
                    this.resume_index = resume_index;
                    this.buffered.extend(records);
                }
                Some(StreamEvent::Done(completion)) => {
                    this.completion = Some(completion);
                    this.finished = true;
                }
                Some(StreamEvent::Failed(err)) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(err)));
                }
                None => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(FetchError::Interrupted {
                        resume_index: this.resume_index,
                        reason: "fetch driver stopped".to_string(),
                    })));
                }
            }
        }
    }
}

impl Drop for RecordStream {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

impl std::fmt::Debug for RecordStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStream")
            .field("buffered", &self.buffered.len())
            .field("completion", &self.completion)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Fetch Orchestrator
// ============================================================================

/// Walks paginated result sets through a [`PageSource`].
pub struct FetchOrchestrator {
    source: Arc<dyn PageSource>,
    concurrency: usize,
    max_page_size: u32,
    record_key: RecordKey,
    metrics: Arc<SessionMetrics>,
    cancel: CancellationSignal,
}

impl FetchOrchestrator {
    /// Creates an orchestrator with concurrency 2 and 250-record pages.
    pub fn new(source: Arc<dyn PageSource>) -> Self {
        Self {
            source,
            concurrency: 2,
            max_page_size: 250,
            record_key: RecordKey::default(),
            metrics: Arc::new(SessionMetrics::default()),
            cancel: CancellationSignal::new(),
        }
    }

    /// Sets the in-flight page limit, clamped to `1..=3`.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        self
    }

    /// Sets the largest page the source accepts.
    pub fn with_max_page_size(mut self, max: u32) -> Self {
        self.max_page_size = max;
        self
    }

    /// Sets how records are identified for deduplication.
    pub fn with_record_key(mut self, key: RecordKey) -> Self {
        self.record_key = key;
        self
    }

    /// Shares a metrics sink.
    pub fn with_metrics(mut self, metrics: Arc<SessionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Uses a caller-held cancellation signal.
    pub fn with_cancellation(mut self, cancel: CancellationSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// The cancellation signal for walks started by this orchestrator.
    pub fn cancellation(&self) -> &CancellationSignal {
        &self.cancel
    }

    /// In-flight page limit.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Starts a walk and returns its record stream.
    ///
    /// Must be called within a tokio runtime.
    pub fn stream(&self, plan: FetchPlan) -> RecordStream {
        let plan = plan.clamped(self.max_page_size);
        info!(
            start = plan.start_index,
            page_size = plan.page_size,
            max_results = ?plan.max_results,
            concurrency = self.concurrency,
            order = ?plan.order,
            "Starting fetch"
        );

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let resume_index = plan.start_index;
        let driver = Driver {
            source: Arc::clone(&self.source),
            walk: Walk::new(&plan),
            plan,
            concurrency: self.concurrency,
            record_key: self.record_key.clone(),
            metrics: Arc::clone(&self.metrics),
            cancel: self.cancel.clone(),
            tx,
        };

        RecordStream {
            events: rx,
            buffered: VecDeque::new(),
            completion: None,
            resume_index,
            finished: false,
            driver: tokio::spawn(driver.run()),
        }
    }

    /// Walks the whole plan and collects the records.
    ///
    /// On failure the records delivered so far come back inside the error.
    pub async fn fetch_all(&self, plan: FetchPlan) -> Result<FetchOutcome, PartialResultError> {
        let mut stream = self.stream(plan);
        let mut records = Vec::new();

        while let Some(item) = stream.next().await {
            match item {
                Ok(record) => records.push(record),
                Err(source) => {
                    return Err(PartialResultError {
                        records,
                        resume_index: source.resume_index(),
                        source,
                    });
                }
            }
        }

        Ok(FetchOutcome {
            records,
            completion: stream.completion().unwrap_or(Completion::Exhausted),
            metrics: self.metrics.snapshot(),
        })
    }
}

impl std::fmt::Debug for FetchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchOrchestrator")
            .field("concurrency", &self.concurrency)
            .field("max_page_size", &self.max_page_size)
            .field("record_key", &self.record_key)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Walk
// ============================================================================

/// Page scheduling state.
#[derive(Debug)]
struct Walk {
    page_size: u32,
    cap_end: Option<u64>,
    next_offset: u64,
    next_seq: u64,
    total: Option<u64>,
    /// Index of the first empty page seen.
    boundary: Option<u64>,
    /// Unfilled tails of short pages below `next_offset`: offset to size.
    gaps: BTreeMap<u64, u32>,
    first_done: bool,
}

impl Walk {
    fn new(plan: &FetchPlan) -> Self {
        Self {
            page_size: plan.page_size,
            cap_end: plan
                .max_results
                .map(|max| plan.start_index.saturating_add(max)),
            next_offset: plan.start_index,
            next_seq: 0,
            total: None,
            boundary: None,
            gaps: BTreeMap::new(),
            first_done: false,
        }
    }

    /// Exclusive end of the walk as currently known.
    fn end(&self) -> u64 {
        [self.total, self.boundary, self.cap_end]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(u64::MAX)
    }

    fn has_more(&self) -> bool {
        self.next_offset < self.end() || self.first_gap().is_some()
    }

    /// Lowest gap still inside the walk.
    fn first_gap(&self) -> Option<(u64, u32)> {
        let end = self.end();
        self.gaps
            .iter()
            .next()
            .map(|(offset, size)| (*offset, *size))
            .filter(|(offset, _)| *offset < end)
    }

    /// Lowest result index not yet scheduled.
    fn unscheduled(&self) -> u64 {
        self.gaps
            .keys()
            .next()
            .map_or(self.next_offset, |gap| (*gap).min(self.next_offset))
    }

    /// Next page to schedule, if any.
    fn next_request(&mut self, filter_set: &FilterSet) -> Option<(u64, PageRequest)> {
        // Until the first page reports a total, it is the only page.
        if self.next_seq > 0 && !self.first_done {
            return None;
        }
        if let Some((offset, size)) = self.first_gap() {
            self.gaps.remove(&offset);
            let seq = self.next_seq;
            self.next_seq += 1;
            return Some((seq, PageRequest::new(offset, size, filter_set.clone())));
        }
        if self.next_offset >= self.end() {
            return None;
        }

        let mut size = u64::from(self.page_size);
        if let Some(cap_end) = self.cap_end {
            size = size.min(cap_end - self.next_offset);
        }
        // Bounded by page_size, which is a u32.
        let size = u32::try_from(size).unwrap_or(self.page_size);

        let request = PageRequest::new(self.next_offset, size, filter_set.clone());
        let seq = self.next_seq;
        self.next_offset += u64::from(size);
        self.next_seq += 1;
        Some((seq, request))
    }

    /// Folds a page result into the known end of the walk.
    fn observe(&mut self, request: &PageRequest, page: &PageResult) {
        self.first_done = true;
        if self.total != Some(page.total_count) {
            if self.total.is_some() {
                debug!(
                    previous = ?self.total,
                    total = page.total_count,
                    "Total count changed"
                );
            }
            self.total = Some(page.total_count);
        }

        let start = request.result_index;
        let len = page.len() as u64;
        let requested_end = start + u64::from(request.page_size);
        if len == 0 {
            self.boundary = Some(self.boundary.map_or(start, |b| b.min(start)));
        } else if len < u64::from(request.page_size) {
            let resume = start + len;
            if requested_end == self.next_offset {
                // Nothing scheduled past this page; continue right after it.
                self.next_offset = resume;
            } else {
                // Bounded by the requested size, which is a u32.
                let size = u32::try_from(requested_end - resume).unwrap_or(request.page_size);
                debug!(offset = resume, size, "Short page, refilling its tail");
                self.gaps.insert(resume, size);
            }
        }
    }

    /// Completion for a walk that ran to its end.
    fn completion(&self) -> Completion {
        match self.cap_end {
            Some(cap_end)
                if self.end() == cap_end
                    && self.boundary.is_none_or(|b| b > cap_end)
                    && self.total.is_none_or(|t| t > cap_end) =>
            {
                Completion::Capped
            }
            _ => Completion::Exhausted,
        }
    }
}

// ============================================================================
// Driver
// ============================================================================

type PageFuture = BoxFuture<'static, (u64, PageRequest, Result<PageResult, SessionError>)>;

/// Background task that schedules pages and feeds the stream.
struct Driver {
    source: Arc<dyn PageSource>,
    plan: FetchPlan,
    walk: Walk,
    concurrency: usize,
    record_key: RecordKey,
    metrics: Arc<SessionMetrics>,
    cancel: CancellationSignal,
    tx: mpsc::Sender<StreamEvent>,
}

/// Emission state of a running walk.
struct Emitter {
    /// Scheduled pages not yet delivered: sequence to result index.
    outstanding: BTreeMap<u64, u64>,
    /// Out-of-order pages held back in ordered mode, by result index.
    held: BTreeMap<u64, (u64, PageRequest, PageResult)>,
    /// Result index the next ordered page must start at.
    cursor: u64,
    seen: HashSet<String>,
    emitted: u64,
}

impl Emitter {
    fn new(start_index: u64) -> Self {
        Self {
            outstanding: BTreeMap::new(),
            held: BTreeMap::new(),
            cursor: start_index,
            seen: HashSet::new(),
            emitted: 0,
        }
    }

    /// First result index not delivered.
    fn resume_index(&self, walk: &Walk) -> u64 {
        let unscheduled = walk.unscheduled();
        self.outstanding
            .values()
            .copied()
            .min()
            .map_or(unscheduled, |index| index.min(unscheduled))
    }
}

impl Driver {
    fn fetch(&self, seq: u64, request: PageRequest) -> PageFuture {
        let source = Arc::clone(&self.source);
        async move {
            let result = source.fetch_page(&request).await;
            (seq, request, result)
        }
        .boxed()
    }

    async fn run(mut self) {
        let mut in_flight = FuturesUnordered::new();
        let mut out = Emitter::new(self.plan.start_index);
        let mut failure: Option<(u64, SessionError)> = None;
        let mut cancelled = false;

        loop {
            if !cancelled && self.cancel.is_cancelled() {
                info!("Fetch cancelled, draining in-flight pages");
                cancelled = true;
            }

            while failure.is_none() && !cancelled && in_flight.len() < self.concurrency {
                let Some((seq, request)) = self.walk.next_request(&self.plan.filter_set) else {
                    break;
                };
                debug!(
                    seq,
                    result_index = request.result_index,
                    size = request.page_size,
                    "Scheduling page"
                );
                out.outstanding.insert(seq, request.result_index);
                in_flight.push(self.fetch(seq, request));
            }

            let Some((seq, request, result)) = in_flight.next().await else {
                break;
            };

            match result {
                Ok(page) => {
                    self.metrics.record_page();
                    self.walk.observe(&request, &page);
                    let delivered = match self.plan.order {
                        EmitOrder::Ordered => {
                            out.held.insert(request.result_index, (seq, request, page));
                            self.flush_held(&mut out).await
                        }
                        EmitOrder::Unordered => self.deliver(&mut out, seq, request, page).await,
                    };
                    if !delivered {
                        debug!("Record stream dropped, stopping fetch");
                        return;
                    }
                }
                Err(err) => {
                    warn!(
                        result_index = request.result_index,
                        error = %err,
                        "Page failed, no further pages will be scheduled"
                    );
                    if failure.as_ref().is_none_or(|(s, _)| seq < *s) {
                        failure = Some((seq, err));
                    }
                }
            }
        }

        let resume_index = out.resume_index(&self.walk);
        let event = if let Some((_, source)) = failure {
            StreamEvent::Failed(FetchError::Aborted {
                resume_index,
                emitted: out.emitted,
                source,
            })
        } else if cancelled && self.walk.has_more() {
            StreamEvent::Done(Completion::Cancelled { resume_index })
        } else {
            StreamEvent::Done(self.walk.completion())
        };

        info!(
            emitted = out.emitted,
            pages = self.walk.next_seq,
            "Fetch finished"
        );
        let _ = self.tx.send(event).await;
    }

    /// Delivers held pages that start where the previous one ended.
    async fn flush_held(&self, out: &mut Emitter) -> bool {
        while let Some((seq, request, page)) = out.held.remove(&out.cursor) {
            out.cursor = request.result_index + page.len() as u64;
            if !self.deliver(out, seq, request, page).await {
                return false;
            }
        }
        true
    }

    /// Deduplicates a page and sends its records. Returns false once the
    /// consumer is gone.
    async fn deliver(
        &self,
        out: &mut Emitter,
        seq: u64,
        request: PageRequest,
        page: PageResult,
    ) -> bool {
        out.outstanding.remove(&seq);

        if self
            .walk
            .boundary
            .is_some_and(|boundary| request.result_index >= boundary && !page.is_empty())
        {
            debug!(
                result_index = request.result_index,
                "Dropping page past the end of the result set"
            );
            return true;
        }

        let mut records = Vec::with_capacity(page.records.len());
        for record in page.records {
            if self
                .plan
                .max_results
                .is_some_and(|max| out.emitted >= max)
            {
                break;
            }
            if out.seen.insert(self.record_key.key_for(&record)) {
                out.emitted += 1;
                records.push(record);
            } else {
                self.metrics.record_duplicate();
            }
        }

        if records.is_empty() {
            return true;
        }
        self.metrics.record_emitted(records.len() as u64);
        let resume_index = out.resume_index(&self.walk);
        self.tx
            .send(StreamEvent::Records {
                records,
                resume_index,
            })
            .await
            .is_ok()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Catalog of `total` records with ids `0..total`.
    #[derive(Default)]
    struct FakeCatalog {
        total: u64,
        /// Most records the catalog returns per page, whatever was asked.
        page_limit: Option<u64>,
        fail_at: Option<u64>,
        slow: HashMap<u64, Duration>,
        overrides: HashMap<u64, Vec<Value>>,
        cancel_at: Option<(u64, CancellationSignal)>,
        requests: Mutex<Vec<PageRequest>>,
    }

    impl FakeCatalog {
        fn new(total: u64) -> Self {
            Self {
                total,
                ..Self::default()
            }
        }

        fn requested(&self) -> Vec<(u64, u32)> {
            let mut requests: Vec<_> = self
                .requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| (r.result_index, r.page_size))
                .collect();
            requests.sort_unstable();
            requests
        }
    }

    #[async_trait]
    impl PageSource for FakeCatalog {
        async fn fetch_page(&self, request: &PageRequest) -> Result<PageResult, SessionError> {
            self.requests.lock().unwrap().push(request.clone());
            let index = request.result_index;

            if let Some(delay) = self.slow.get(&index) {
                tokio::time::sleep(*delay).await;
            }
            if let Some((at, signal)) = &self.cancel_at {
                if *at == index {
                    signal.cancel();
                }
            }
            if self.fail_at == Some(index) {
                return Err(SessionError::Unreachable {
                    attempts: 4,
                    last_error: "connection reset".to_string(),
                });
            }

            let values = match self.overrides.get(&index) {
                Some(values) => values.clone(),
                None => {
                    let size = self
                        .page_limit
                        .map_or(u64::from(request.page_size), |limit| {
                            limit.min(u64::from(request.page_size))
                        });
                    let end = (index + size).min(self.total);
                    (index..end).map(|id| json!({"id": id})).collect()
                }
            };
            Ok(PageResult::new(
                values.into_iter().map(Record::new).collect(),
                self.total,
            ))
        }
    }

    fn ids(records: &[Record]) -> Vec<u64> {
        records
            .iter()
            .map(|r| r.get("id").and_then(Value::as_u64).unwrap())
            .collect()
    }

    fn orchestrator(source: Arc<FakeCatalog>, concurrency: usize) -> FetchOrchestrator {
        FetchOrchestrator::new(source).with_concurrency(concurrency)
    }

    #[tokio::test]
    async fn test_walks_total_in_page_size_offsets() {
        for concurrency in [1, 2, 3] {
            let catalog = Arc::new(FakeCatalog::new(14_875));
            let outcome = orchestrator(catalog.clone(), concurrency)
                .fetch_all(FetchPlan::new(FilterSet::new()))
                .await
                .unwrap();

            let offsets: Vec<u64> = catalog.requested().iter().map(|(i, _)| *i).collect();
            let expected: Vec<u64> = (0..60).map(|p| p * 250).collect();
            assert_eq!(offsets, expected, "concurrency {concurrency}");
            assert_eq!(outcome.records.len(), 14_875);
            assert_eq!(ids(&outcome.records), (0..14_875).collect::<Vec<_>>());
            assert_eq!(outcome.completion, Completion::Exhausted);
            assert_eq!(outcome.metrics.pages_fetched, 60);
        }
    }

    #[tokio::test]
    async fn test_terminates_at_min_of_total_and_cap() {
        let cases = [
            (1_000, Some(600), 600, Completion::Capped),
            (400, Some(600), 400, Completion::Exhausted),
            (1_000, None, 1_000, Completion::Exhausted),
            (500, Some(500), 500, Completion::Exhausted),
        ];
        for (total, cap, expected, completion) in cases {
            let catalog = Arc::new(FakeCatalog::new(total));
            let mut plan = FetchPlan::new(FilterSet::new());
            if let Some(cap) = cap {
                plan = plan.max_results(cap);
            }
            let outcome = orchestrator(catalog, 2).fetch_all(plan).await.unwrap();

            assert_eq!(outcome.records.len() as u64, expected, "total {total} cap {cap:?}");
            assert_eq!(outcome.completion, completion, "total {total} cap {cap:?}");
        }
    }

    #[tokio::test]
    async fn test_cap_clips_last_page() {
        let catalog = Arc::new(FakeCatalog::new(10_000));
        orchestrator(catalog.clone(), 1)
            .fetch_all(FetchPlan::new(FilterSet::new()).max_results(600))
            .await
            .unwrap();

        assert_eq!(catalog.requested(), vec![(0, 250), (250, 250), (500, 100)]);
    }

    #[tokio::test]
    async fn test_zero_cap_fetches_nothing() {
        let catalog = Arc::new(FakeCatalog::new(100));
        let outcome = orchestrator(catalog.clone(), 2)
            .fetch_all(FetchPlan::new(FilterSet::new()).max_results(0))
            .await
            .unwrap();

        assert!(outcome.records.is_empty());
        assert!(catalog.requested().is_empty());
        assert_eq!(outcome.completion, Completion::Capped);
    }

    #[tokio::test]
    async fn test_duplicate_ids_are_dropped() {
        let mut catalog = FakeCatalog::new(500);
        let mut second: Vec<Value> = vec![json!({"id": 7})];
        second.extend((251..500).map(|id| json!({"id": id})));
        catalog.overrides.insert(250, second);
        let catalog = Arc::new(catalog);

        let outcome = orchestrator(catalog, 2)
            .fetch_all(FetchPlan::new(FilterSet::new()))
            .await
            .unwrap();

        let found = ids(&outcome.records);
        assert_eq!(found.iter().filter(|id| **id == 7).count(), 1);
        assert_eq!(found.len(), 499);
        assert_eq!(outcome.metrics.duplicates_dropped, 1);
    }

    #[tokio::test]
    async fn test_empty_result_set() {
        let catalog = Arc::new(FakeCatalog::new(0));
        let outcome = orchestrator(catalog.clone(), 3)
            .fetch_all(FetchPlan::new(FilterSet::new()))
            .await
            .unwrap();

        assert!(outcome.records.is_empty());
        assert_eq!(catalog.requested(), vec![(0, 250)]);
        assert_eq!(outcome.completion, Completion::Exhausted);
    }

    #[tokio::test]
    async fn test_short_page_continues_after_its_last_record() {
        let mut catalog = FakeCatalog::new(1_000);
        catalog
            .overrides
            .insert(250, (250..300).map(|id| json!({"id": id})).collect());
        let catalog = Arc::new(catalog);

        let outcome = orchestrator(catalog.clone(), 1)
            .fetch_all(FetchPlan::new(FilterSet::new()))
            .await
            .unwrap();

        assert_eq!(ids(&outcome.records), (0..1_000).collect::<Vec<_>>());
        assert_eq!(outcome.completion, Completion::Exhausted);
        assert_eq!(
            catalog.requested(),
            vec![(0, 250), (250, 250), (300, 250), (550, 250), (800, 250)]
        );
    }

    #[tokio::test]
    async fn test_smaller_provider_page_limit_walks_everything() {
        for concurrency in [1, 2, 3] {
            let mut catalog = FakeCatalog::new(1_000);
            catalog.page_limit = Some(100);
            let catalog = Arc::new(catalog);

            let outcome = orchestrator(catalog.clone(), concurrency)
                .fetch_all(FetchPlan::new(FilterSet::new()))
                .await
                .unwrap();

            assert_eq!(
                ids(&outcome.records),
                (0..1_000).collect::<Vec<_>>(),
                "concurrency {concurrency}"
            );
            assert_eq!(outcome.completion, Completion::Exhausted);
            assert_eq!(outcome.metrics.duplicates_dropped, 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_page_tail_is_refilled_before_later_pages_emit() {
        let mut catalog = FakeCatalog::new(750);
        catalog
            .overrides
            .insert(250, (250..400).map(|id| json!({"id": id})).collect());
        catalog.slow.insert(250, Duration::from_secs(1));
        let catalog = Arc::new(catalog);

        let outcome = orchestrator(catalog.clone(), 2)
            .fetch_all(FetchPlan::new(FilterSet::new()))
            .await
            .unwrap();

        assert_eq!(ids(&outcome.records), (0..750).collect::<Vec<_>>());
        assert!(catalog.requested().contains(&(400, 100)));
    }

    #[tokio::test]
    async fn test_failure_before_refill_resumes_at_gap() {
        let mut catalog = FakeCatalog::new(1_000);
        catalog
            .overrides
            .insert(0, (0..100).map(|id| json!({"id": id})).collect());
        catalog.fail_at = Some(100);
        let catalog = Arc::new(catalog);

        let err = orchestrator(catalog, 1)
            .fetch_all(FetchPlan::new(FilterSet::new()))
            .await
            .unwrap_err();

        assert_eq!(err.resume_index, 100);
        assert_eq!(err.records.len(), 100);
    }

    #[tokio::test]
    async fn test_cancel_after_fourth_page() {
        let signal = CancellationSignal::new();
        let mut catalog = FakeCatalog::new(1_000);
        catalog.cancel_at = Some((30, signal.clone()));
        let catalog = Arc::new(catalog);

        let outcome = orchestrator(catalog.clone(), 1)
            .with_cancellation(signal)
            .fetch_all(FetchPlan::new(FilterSet::new()).page_size(10))
            .await
            .unwrap();

        assert_eq!(ids(&outcome.records), (0..40).collect::<Vec<_>>());
        assert_eq!(catalog.requested().len(), 4);
        assert_eq!(
            outcome.completion,
            Completion::Cancelled { resume_index: 40 }
        );
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let catalog = Arc::new(FakeCatalog::new(1_000));
        let orchestrator = orchestrator(catalog.clone(), 2).with_max_page_size(100);
        orchestrator.cancellation().cancel();

        let outcome = orchestrator
            .fetch_all(FetchPlan::new(FilterSet::new()).starting_at(300))
            .await
            .unwrap();

        assert!(outcome.records.is_empty());
        assert!(catalog.requested().is_empty());
        assert_eq!(
            outcome.completion,
            Completion::Cancelled { resume_index: 300 }
        );
    }

    #[tokio::test]
    async fn test_page_failure_returns_partial_result() {
        let mut catalog = FakeCatalog::new(1_000);
        catalog.fail_at = Some(500);
        let catalog = Arc::new(catalog);

        let err = orchestrator(catalog.clone(), 1)
            .fetch_all(FetchPlan::new(FilterSet::new()))
            .await
            .unwrap_err();

        assert_eq!(err.resume_index, 500);
        assert_eq!(ids(&err.records), (0..500).collect::<Vec<_>>());
        assert!(matches!(
            err.source,
            FetchError::Aborted {
                emitted: 500,
                source: SessionError::Unreachable { .. },
                ..
            }
        ));
        // Nothing past the failure was scheduled.
        assert_eq!(catalog.requested().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_holds_back_later_pages_when_ordered() {
        let mut catalog = FakeCatalog::new(1_000);
        catalog.fail_at = Some(250);
        catalog.slow.insert(250, Duration::from_secs(2));
        let catalog = Arc::new(catalog);

        let err = orchestrator(catalog.clone(), 3)
            .fetch_all(FetchPlan::new(FilterSet::new()))
            .await
            .unwrap_err();

        assert_eq!(err.resume_index, 250);
        assert_eq!(ids(&err.records), (0..250).collect::<Vec<_>>());
        // In-flight pages finished, nothing new was scheduled.
        assert_eq!(catalog.requested(), vec![(0, 250), (250, 250), (500, 250), (750, 250)]);
    }

    #[tokio::test]
    async fn test_resume_from_index() {
        let catalog = Arc::new(FakeCatalog::new(1_000));
        let outcome = orchestrator(catalog.clone(), 2)
            .fetch_all(FetchPlan::new(FilterSet::new()).starting_at(500))
            .await
            .unwrap();

        assert_eq!(ids(&outcome.records), (500..1_000).collect::<Vec<_>>());
        assert_eq!(catalog.requested()[0], (500, 250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ordered_and_unordered_emission() {
        let build = || {
            let mut catalog = FakeCatalog::new(30);
            catalog.slow.insert(10, Duration::from_secs(5));
            Arc::new(catalog)
        };
        let plan = FetchPlan::new(FilterSet::new()).page_size(10);

        let ordered = orchestrator(build(), 2)
            .fetch_all(plan.clone())
            .await
            .unwrap();
        assert_eq!(ids(&ordered.records), (0..30).collect::<Vec<_>>());

        let unordered = orchestrator(build(), 2)
            .fetch_all(plan.order(EmitOrder::Unordered))
            .await
            .unwrap();
        let expected: Vec<u64> = (0..10).chain(20..30).chain(10..20).collect();
        assert_eq!(ids(&unordered.records), expected);
    }

    #[tokio::test]
    async fn test_page_size_is_clamped() {
        let catalog = Arc::new(FakeCatalog::new(100));
        orchestrator(catalog.clone(), 1)
            .fetch_all(FetchPlan::new(FilterSet::new()).page_size(1_000))
            .await
            .unwrap();
        assert_eq!(catalog.requested(), vec![(0, 250)]);

        let catalog = Arc::new(FakeCatalog::new(3));
        orchestrator(catalog.clone(), 1)
            .fetch_all(FetchPlan::new(FilterSet::new()).page_size(0))
            .await
            .unwrap();
        assert_eq!(catalog.requested(), vec![(0, 1), (1, 1), (2, 1)]);
    }

    #[test]
    fn test_concurrency_is_clamped() {
        let catalog = Arc::new(FakeCatalog::new(0));
        assert_eq!(orchestrator(catalog.clone(), 0).concurrency(), 1);
        assert_eq!(orchestrator(catalog, 9).concurrency(), 3);
    }

    #[tokio::test]
    async fn test_stream_yields_records_lazily() {
        let catalog = Arc::new(FakeCatalog::new(600));
        let orchestrator = orchestrator(catalog, 2);
        let mut stream = orchestrator.stream(FetchPlan::new(FilterSet::new()));

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.get("id"), Some(&json!(0)));
        assert!(stream.completion().is_none());

        let rest: Vec<_> = stream.by_ref().collect().await;
        assert_eq!(rest.len(), 599);
        assert_eq!(stream.completion(), Some(Completion::Exhausted));
    }
}
