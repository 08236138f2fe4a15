//! What to fetch, and when.
//!
//! [`LoadState`] does no I/O. It hands out [`FetchRange`]s and is told when
//! they finish; the panel turns ranges into [`Command`]s, the host executes
//! them against a [`HistoryService`] and feeds the [`Completion`]s back.

use std::future::Future;

use crate::config::ChartParams;
use crate::dataset::SampleStore;
use crate::error::Result;
use crate::wire::{decode_samples, ImageIndex, ImageIndexRequest, LastWrittenRequest, SampleRequest};

/// The RPC calls the chart makes against the history service.
pub trait HistoryService {
    /// Reply layout is described in [`crate::wire`].
    fn read_samples(&self, req: SampleRequest) -> impl Future<Output = Result<Vec<f64>>>;

    /// Time of the newest sample at or before `req.time`, per series.
    fn get_last_written(&self, req: LastWrittenRequest) -> impl Future<Output = Result<Vec<f64>>>;

    fn read_image_index(&self, req: ImageIndexRequest) -> impl Future<Output = Result<ImageIndex>>;

    /// Panel document from the key-value store.
    fn read_panel_config(&self, group: &str, panel: &str) -> impl Future<Output = Result<serde_json::Value>>;

    /// Image panel document from the key-value store.
    fn read_image_config(&self, image_set: &str) -> impl Future<Output = Result<serde_json::Value>>;
}

pub type RequestId = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Samples(SampleRequest),
    LastWritten(LastWrittenRequest),
    ImageIndex(ImageIndexRequest),
}

/// A request tagged with the panel generation that issued it.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub generation: u64,
    pub id: RequestId,
    pub request: Request,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Samples(Vec<f64>),
    LastWritten(Vec<f64>),
    ImageIndex(ImageIndex),
}

#[derive(Debug)]
pub struct Completion {
    pub generation: u64,
    pub id: RequestId,
    pub result: Result<Reply>,
}

/// Runs one command to completion.
pub async fn execute<S: HistoryService>(service: &S, cmd: Command) -> Completion {
    let result = match cmd.request {
        Request::Samples(req) => service.read_samples(req).await.map(Reply::Samples),
        Request::LastWritten(req) => service.get_last_written(req).await.map(Reply::LastWritten),
        Request::ImageIndex(req) => service.read_image_index(req).await.map(Reply::ImageIndex),
    };
    Completion {
        generation: cmd.generation,
        id: cmd.id,
        result,
    }
}

/// Splits `[start, end]` into consecutive pieces no longer than `max_span`.
pub fn chunk(start: f64, end: f64, max_span: f64) -> Vec<(f64, f64)> {
    if !(end >= start) || !(max_span > 0.0) {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut a = start;
    loop {
        let b = (a + max_span).min(end);
        out.push((a, b));
        if b >= end {
            break;
        }
        a = b;
    }
    out
}

/// Fetches `[start, end]` in bounded chunks and merges everything into the
/// store. Returns the number of new samples.
pub async fn ensure_range<S: HistoryService>(
    service: &S,
    store: &mut SampleStore,
    start: f64,
    end: f64,
    max_span: f64,
) -> Result<usize> {
    let keys = store.keys();
    let mut inserted = 0;
    for (a, b) in chunk(start, end, max_span) {
        log::debug!("ensure_range: fetching [{a}, {b}]");
        let buf = service.read_samples(SampleRequest::new(a, b, &keys)).await?;
        let decoded = decode_samples(&buf, keys.len())?;
        inserted += store.merge(&decoded);
    }
    Ok(inserted)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// One window of look-behind up to now, issued once at start.
    Initial,
    /// Paging further into the past.
    Backward,
    /// Tail poll for samples newer than the last one seen.
    Poll,
    /// Explicit range after a jump.
    Range,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchRange {
    pub id: RequestId,
    pub kind: FetchKind,
    pub start: f64,
    pub end: f64,
}

/// Bookkeeping for windowed loading.
///
/// Everything in `[t_min_requested, now]` has been asked for at least once.
/// `t_min_received` only ever moves back in time.
#[derive(Debug, Clone)]
pub struct LoadState {
    pub t_min_requested: f64,
    pub t_min_received: f64,
    pub last_timestamp_seen: f64,
    pub pending_request_count: usize,
    backward_in_flight: Option<RequestId>,
    /// Explicit ranges still out. Backfill waits rather than overlap them.
    ranges_in_flight: Vec<FetchRange>,
    initial_outstanding: usize,
    initial_issued: bool,
    initial_end: f64,
    poll_in_flight: bool,
    next_id: RequestId,
}

impl Default for LoadState {
    fn default() -> Self {
        LoadState {
            t_min_requested: f64::INFINITY,
            t_min_received: f64::INFINITY,
            last_timestamp_seen: f64::NEG_INFINITY,
            pending_request_count: 0,
            backward_in_flight: None,
            ranges_in_flight: Vec::new(),
            initial_outstanding: 0,
            initial_issued: false,
            initial_end: f64::NEG_INFINITY,
            poll_in_flight: false,
            next_id: 0,
        }
    }
}

impl LoadState {
    pub fn new() -> Self {
        Self::default()
    }

    fn issue(&mut self, kind: FetchKind, start: f64, end: f64) -> FetchRange {
        self.next_id += 1;
        self.pending_request_count += 1;
        FetchRange {
            id: self.next_id,
            kind,
            start,
            end,
        }
    }

    pub fn initial_done(&self) -> bool {
        self.initial_issued && self.initial_outstanding == 0
    }

    pub fn is_busy(&self) -> bool {
        self.pending_request_count > 0
    }

    pub fn backward_in_flight(&self) -> bool {
        self.backward_in_flight.is_some()
    }

    pub fn range_in_flight(&self) -> bool {
        !self.ranges_in_flight.is_empty()
    }

    /// Requests `[t_min - width, now]`, newest chunk first.
    pub fn initial(&mut self, t_min: f64, width: f64, now: f64, params: &ChartParams) -> Vec<FetchRange> {
        if self.initial_issued {
            return Vec::new();
        }
        let start = (t_min - width).max(params.history_floor);
        self.initial_issued = true;
        self.initial_end = now;
        self.t_min_requested = start;
        let ranges: Vec<FetchRange> = chunk(start, now, params.max_request_span)
            .into_iter()
            .rev()
            .map(|(a, b)| self.issue(FetchKind::Initial, a, b))
            .collect();
        self.initial_outstanding = ranges.len();
        log::debug!("initial load [{start}, {now}] in {} request(s)", ranges.len());
        ranges
    }

    /// One backward request if the window's left edge came within half a
    /// window of the oldest requested time. At most one is in flight, and
    /// none while an explicit range overlapping it is still out.
    pub fn backfill(&mut self, t_min: f64, width: f64, params: &ChartParams) -> Option<FetchRange> {
        if !self.initial_done() || self.backward_in_flight.is_some() {
            return None;
        }
        if !(t_min - width / 2.0 < self.t_min_requested) || self.t_min_requested <= params.history_floor {
            return None;
        }
        let end = self.t_min_requested;
        let start = (t_min - width)
            .max(end - params.max_request_span)
            .max(params.history_floor);
        if !(start < end) {
            return None;
        }
        if self.ranges_in_flight.iter().any(|p| p.start < end && start < p.end) {
            log::debug!("backfill [{start}, {end}] waits for an explicit range");
            return None;
        }
        self.t_min_requested = start;
        let r = self.issue(FetchKind::Backward, start, end);
        self.backward_in_flight = Some(r.id);
        log::debug!("backfill [{start}, {end}]");
        Some(r)
    }

    /// Tail request `[last_timestamp_seen, now]`, once the initial load is in.
    pub fn poll(&mut self, now: f64) -> Option<FetchRange> {
        if !self.initial_done() || self.poll_in_flight {
            return None;
        }
        let start = if self.last_timestamp_seen.is_finite() {
            self.last_timestamp_seen
        } else {
            self.initial_end
        };
        if !(now >= start) {
            return None;
        }
        self.poll_in_flight = true;
        Some(self.issue(FetchKind::Poll, start, now))
    }

    /// Chunks for an explicit range, for example after jumping to old data.
    pub fn range(&mut self, start: f64, end: f64, params: &ChartParams) -> Vec<FetchRange> {
        let start = start.max(params.history_floor);
        let ranges: Vec<FetchRange> = chunk(start, end, params.max_request_span)
            .into_iter()
            .rev()
            .map(|(a, b)| self.issue(FetchKind::Range, a, b))
            .collect();
        self.ranges_in_flight.extend(ranges.iter().copied());
        ranges
    }

    /// Records the outcome of `r`. `newest` is the newest timestamp in the
    /// store after merging.
    pub fn complete(&mut self, r: &FetchRange, ok: bool, newest: Option<f64>) {
        self.pending_request_count = self.pending_request_count.saturating_sub(1);
        match r.kind {
            FetchKind::Initial => {
                self.initial_outstanding = self.initial_outstanding.saturating_sub(1);
            }
            FetchKind::Backward => {
                if self.backward_in_flight == Some(r.id) {
                    self.backward_in_flight = None;
                }
            }
            FetchKind::Poll => self.poll_in_flight = false,
            FetchKind::Range => self.ranges_in_flight.retain(|p| p.id != r.id),
        }
        if ok {
            if matches!(r.kind, FetchKind::Initial | FetchKind::Backward | FetchKind::Range) {
                self.t_min_received = self.t_min_received.min(r.start);
            }
        } else if matches!(r.kind, FetchKind::Initial | FetchKind::Backward) && self.t_min_requested < r.end {
            // asked again by the next backfill
            self.t_min_requested = r.end;
        }
        if let Some(t) = newest {
            self.last_timestamp_seen = self.last_timestamp_seen.max(t);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ChartParams {
        ChartParams {
            max_request_span: 100.0,
            ..Default::default()
        }
    }

    #[test]
    fn chunks_cover_range() {
        assert_eq!(chunk(0.0, 250.0, 100.0), vec![(0.0, 100.0), (100.0, 200.0), (200.0, 250.0)]);
        assert_eq!(chunk(5.0, 5.0, 100.0), vec![(5.0, 5.0)]);
        assert!(chunk(5.0, 4.0, 100.0).is_empty());
    }

    #[test]
    fn initial_load_is_chunked_newest_first() {
        let mut s = LoadState::new();
        let r = s.initial(1000.0, 150.0, 1100.0, &params());
        assert_eq!(r.len(), 3);
        assert_eq!((r[0].start, r[0].end), (1050.0, 1100.0));
        assert!(r.iter().all(|r| r.end - r.start <= 100.0));
        assert_eq!(s.t_min_requested, 850.0);
        assert!(s.initial(1000.0, 150.0, 1100.0, &params()).is_empty());
        assert!(s.poll(1101.0).is_none());
        for x in &r {
            s.complete(x, true, Some(1099.0));
        }
        assert!(s.initial_done());
        assert_eq!(s.pending_request_count, 0);
        let p = s.poll(1101.0).unwrap();
        assert_eq!((p.start, p.end), (1099.0, 1101.0));
        assert!(s.poll(1102.0).is_none());
    }

    #[test]
    fn one_backward_request_at_a_time() {
        let mut s = LoadState::new();
        for r in s.initial(1000.0, 100.0, 1100.0, &params()) {
            s.complete(&r, true, None);
        }
        // window [850, 950], requested down to 900
        let b = s.backfill(850.0, 100.0, &params()).unwrap();
        assert_eq!((b.start, b.end), (800.0, 900.0));
        assert!(s.backfill(700.0, 100.0, &params()).is_none());
        s.complete(&b, true, None);
        let c = s.backfill(700.0, 100.0, &params()).unwrap();
        assert_eq!((c.start, c.end), (700.0, 800.0));
        assert!(c.end <= b.start);
        s.complete(&c, true, None);
        assert_eq!(s.t_min_received, 700.0);
        // margin holds now
        assert!(s.backfill(800.0, 100.0, &params()).is_none());
    }

    #[test]
    fn backfill_waits_for_overlapping_range() {
        let p = ChartParams::default();
        let mut s = LoadState::new();
        for r in s.initial(1000.0, 100.0, 1100.0, &p) {
            s.complete(&r, true, None);
        }
        // jumped to [500, 600]; backfill would ask for [400, 900]
        let jump = s.range(500.0, 600.0, &p);
        assert_eq!(jump.len(), 1);
        assert!(s.range_in_flight());
        assert!(s.backfill(500.0, 100.0, &p).is_none());
        assert_eq!(s.t_min_requested, 900.0);
        s.complete(&jump[0], true, None);
        assert!(!s.range_in_flight());
        let b = s.backfill(500.0, 100.0, &p).unwrap();
        assert_eq!((b.start, b.end), (400.0, 900.0));
        s.complete(&b, true, None);
        // a range elsewhere does not hold backfill up
        let far = s.range(100.0, 150.0, &p);
        let c = s.backfill(300.0, 100.0, &p).unwrap();
        assert_eq!((c.start, c.end), (200.0, 400.0));
        assert!(far.iter().all(|r| r.end < c.start));
    }

    #[test]
    fn backward_span_is_capped() {
        let mut s = LoadState::new();
        for r in s.initial(1000.0, 100.0, 1100.0, &params()) {
            s.complete(&r, true, None);
        }
        let b = s.backfill(0.0, 1000.0, &params()).unwrap();
        assert_eq!(b.end - b.start, 100.0);
    }

    #[test]
    fn failed_backfill_is_retried() {
        let mut s = LoadState::new();
        for r in s.initial(1000.0, 100.0, 1100.0, &params()) {
            s.complete(&r, true, None);
        }
        let b = s.backfill(850.0, 100.0, &params()).unwrap();
        s.complete(&b, false, None);
        assert_eq!(s.t_min_requested, 900.0);
        assert_eq!(s.t_min_received, 900.0);
        let again = s.backfill(850.0, 100.0, &params()).unwrap();
        assert_eq!((again.start, again.end), (b.start, b.end));
    }

    #[test]
    fn nothing_before_floor() {
        let p = ChartParams {
            history_floor: 880.0,
            ..params()
        };
        let mut s = LoadState::new();
        for r in s.initial(1000.0, 100.0, 1100.0, &p) {
            s.complete(&r, true, None);
        }
        let b = s.backfill(850.0, 100.0, &p).unwrap();
        assert_eq!(b.start, 880.0);
        s.complete(&b, true, None);
        assert!(s.backfill(700.0, 100.0, &p).is_none());
    }

    #[test]
    fn last_timestamp_never_regresses() {
        let mut s = LoadState::new();
        let r = s.initial(1000.0, 10.0, 1010.0, &params());
        s.complete(&r[0], true, Some(1005.0));
        let p = s.poll(1011.0).unwrap();
        s.complete(&p, true, Some(1003.0));
        assert_eq!(s.last_timestamp_seen, 1005.0);
    }
}
