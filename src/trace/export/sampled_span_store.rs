//! In-memory store of representative completed spans, for on-demand
//! debugging.
//!
//! For every registered span name the store keeps small ring buffers of
//! finalized snapshots: one ring per latency bucket for successful spans and
//! one ring per canonical error code for failed ones. The store hooks span
//! completion through [`StartEndHandler`]; classification happens
//! synchronously on the ending thread and is a binary search over nine
//! bucket boundaries.
//!
//! All state sits behind a single store-wide `RwLock`; queries copy ring
//! snapshots out under the read lock.

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use crate::trace::span_data::SpanData;
use crate::trace::{CanonicalCode, Span, StartEndHandler, TraceError};

const NUM_SAMPLES_PER_LATENCY_BUCKET: usize = 10;
const NUM_SAMPLES_PER_ERROR_BUCKET: usize = 5;
const NUM_ERROR_BUCKETS: usize = CanonicalCode::ALL.len() - 1;

/// The fixed latency ranges used to bucket successful spans.
///
/// Each bucket covers `[lower, upper)` nanoseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LatencyBucketBoundaries {
    /// [0, 10µs)
    ZeroMicros10,
    /// [10µs, 100µs)
    Micros10Micros100,
    /// [100µs, 1ms)
    Micros100Milli1,
    /// [1ms, 10ms)
    Milli1Milli10,
    /// [10ms, 100ms)
    Milli10Milli100,
    /// [100ms, 1s)
    Milli100Second1,
    /// [1s, 10s)
    Second1Second10,
    /// [10s, 100s)
    Second10Second100,
    /// [100s, ∞)
    Second100Max,
}

impl LatencyBucketBoundaries {
    /// All buckets, ordered by latency.
    pub const ALL: [LatencyBucketBoundaries; 9] = [
        LatencyBucketBoundaries::ZeroMicros10,
        LatencyBucketBoundaries::Micros10Micros100,
        LatencyBucketBoundaries::Micros100Milli1,
        LatencyBucketBoundaries::Milli1Milli10,
        LatencyBucketBoundaries::Milli10Milli100,
        LatencyBucketBoundaries::Milli100Second1,
        LatencyBucketBoundaries::Second1Second10,
        LatencyBucketBoundaries::Second10Second100,
        LatencyBucketBoundaries::Second100Max,
    ];

    /// The inclusive lower bound in nanoseconds.
    pub const fn latency_lower_ns(&self) -> u64 {
        match self {
            LatencyBucketBoundaries::ZeroMicros10 => 0,
            LatencyBucketBoundaries::Micros10Micros100 => 10_000,
            LatencyBucketBoundaries::Micros100Milli1 => 100_000,
            LatencyBucketBoundaries::Milli1Milli10 => 1_000_000,
            LatencyBucketBoundaries::Milli10Milli100 => 10_000_000,
            LatencyBucketBoundaries::Milli100Second1 => 100_000_000,
            LatencyBucketBoundaries::Second1Second10 => 1_000_000_000,
            LatencyBucketBoundaries::Second10Second100 => 10_000_000_000,
            LatencyBucketBoundaries::Second100Max => 100_000_000_000,
        }
    }

    /// The exclusive upper bound in nanoseconds.
    pub const fn latency_upper_ns(&self) -> u64 {
        match self {
            LatencyBucketBoundaries::ZeroMicros10 => 10_000,
            LatencyBucketBoundaries::Micros10Micros100 => 100_000,
            LatencyBucketBoundaries::Micros100Milli1 => 1_000_000,
            LatencyBucketBoundaries::Milli1Milli10 => 10_000_000,
            LatencyBucketBoundaries::Milli10Milli100 => 100_000_000,
            LatencyBucketBoundaries::Milli100Second1 => 1_000_000_000,
            LatencyBucketBoundaries::Second1Second10 => 10_000_000_000,
            LatencyBucketBoundaries::Second10Second100 => 100_000_000_000,
            LatencyBucketBoundaries::Second100Max => u64::MAX,
        }
    }

    /// The bucket a span of `latency_ns` falls into.
    pub fn for_latency(latency_ns: u64) -> Self {
        let idx = Self::ALL.partition_point(|bucket| latency_ns >= bucket.latency_upper_ns());
        Self::ALL[idx.min(Self::ALL.len() - 1)]
    }

    fn index(&self) -> usize {
        Self::ALL.iter().position(|bucket| bucket == self).unwrap()
    }
}

/// Selects successful spans by name and latency range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LatencyFilter {
    span_name: String,
    lower_latency_ns: u64,
    upper_latency_ns: u64,
    max_spans: usize,
}

impl LatencyFilter {
    /// Create a filter over `[lower_latency_ns, upper_latency_ns)`.
    ///
    /// `max_spans == 0` means no limit on the number of returned spans.
    pub fn new(
        span_name: impl Into<String>,
        lower_latency_ns: u64,
        upper_latency_ns: u64,
        max_spans: usize,
    ) -> Result<Self, TraceError> {
        if lower_latency_ns > upper_latency_ns {
            return Err(TraceError::InvalidArgument(
                "latency filter lower bound exceeds upper bound".into(),
            ));
        }
        Ok(LatencyFilter {
            span_name: span_name.into(),
            lower_latency_ns,
            upper_latency_ns,
            max_spans,
        })
    }
}

/// Selects failed spans by name and canonical code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorFilter {
    span_name: String,
    canonical_code: Option<CanonicalCode>,
    max_spans: usize,
}

impl ErrorFilter {
    /// Create a filter. `canonical_code == None` matches every non-OK code;
    /// `max_spans == 0` means no limit.
    pub fn new(
        span_name: impl Into<String>,
        canonical_code: Option<CanonicalCode>,
        max_spans: usize,
    ) -> Result<Self, TraceError> {
        if canonical_code == Some(CanonicalCode::Ok) {
            return Err(TraceError::InvalidArgument(
                "error filter cannot select the OK code".into(),
            ));
        }
        Ok(ErrorFilter {
            span_name: span_name.into(),
            canonical_code,
            max_spans,
        })
    }
}

/// Per-name sample counts returned by [`SampledSpanStore::summary`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PerSpanNameSummary {
    /// Spans with this name that have started but not ended.
    pub num_active_spans: u64,
    /// Stored sample counts per latency bucket, including empty buckets.
    pub num_latency_sampled_spans: HashMap<LatencyBucketBoundaries, usize>,
    /// Stored sample counts per error code, including empty buckets.
    pub num_error_sampled_spans: HashMap<CanonicalCode, usize>,
}

/// Summary of the store contents, per registered span name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Summary {
    /// One entry per registered name.
    pub per_span_name: HashMap<String, PerSpanNameSummary>,
}

#[derive(Debug)]
struct PerSpanNameSamples {
    num_active: u64,
    latency: [VecDeque<SpanData>; LatencyBucketBoundaries::ALL.len()],
    errors: [VecDeque<SpanData>; NUM_ERROR_BUCKETS],
}

impl PerSpanNameSamples {
    fn new() -> Self {
        PerSpanNameSamples {
            num_active: 0,
            latency: std::array::from_fn(|_| VecDeque::new()),
            errors: std::array::from_fn(|_| VecDeque::new()),
        }
    }

    fn add(&mut self, data: SpanData) {
        // A stored span always has a status and an end time.
        let status = match &data.status {
            Some(status) => status.clone(),
            None => return,
        };
        if status.is_ok() {
            let latency_ns = data.latency().map_or(0, |d| d.as_nanos() as u64);
            let bucket = LatencyBucketBoundaries::for_latency(latency_ns);
            push_sample(
                &mut self.latency[bucket.index()],
                data,
                NUM_SAMPLES_PER_LATENCY_BUCKET,
            );
        } else {
            let idx = status.canonical_code() as usize - 1;
            push_sample(&mut self.errors[idx], data, NUM_SAMPLES_PER_ERROR_BUCKET);
        }
    }
}

fn push_sample(ring: &mut VecDeque<SpanData>, data: SpanData, capacity: usize) {
    if ring.len() == capacity {
        ring.pop_front();
    }
    ring.push_back(data);
}

/// Stores a bounded, representative set of completed spans per registered
/// span name, split by latency bucket and by error code.
#[derive(Debug, Default)]
pub struct SampledSpanStore {
    state: RwLock<HashMap<String, PerSpanNameSamples>>,
}

impl SampledSpanStore {
    /// Create an empty store with no registered names.
    pub fn new() -> Self {
        SampledSpanStore::default()
    }

    /// Register span names for sampling. Already-registered names are left
    /// untouched.
    pub fn register_span_names<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.write_state();
        for name in names {
            state.entry(name.into()).or_insert_with(PerSpanNameSamples::new);
        }
    }

    /// Unregister span names, discarding their samples. Unknown names are
    /// ignored.
    pub fn unregister_span_names<'a, I>(&self, names: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut state = self.write_state();
        for name in names {
            state.remove(name);
        }
    }

    /// The names currently registered for sampling.
    pub fn registered_span_names(&self) -> Vec<String> {
        self.read_state().keys().cloned().collect()
    }

    /// Completed successful spans whose latency falls within the filter's
    /// `[lower, upper)` range. Order is unspecified.
    pub fn latency_sampled_spans(&self, filter: &LatencyFilter) -> Vec<SpanData> {
        let state = self.read_state();
        let samples = match state.get(&filter.span_name) {
            Some(samples) => samples,
            None => return Vec::new(),
        };
        let mut spans = Vec::new();
        for bucket in LatencyBucketBoundaries::ALL {
            if bucket.latency_upper_ns() <= filter.lower_latency_ns
                || bucket.latency_lower_ns() >= filter.upper_latency_ns
            {
                continue;
            }
            for data in &samples.latency[bucket.index()] {
                if filter.max_spans != 0 && spans.len() == filter.max_spans {
                    return spans;
                }
                let latency_ns = data.latency().map_or(0, |d| d.as_nanos() as u64);
                if latency_ns >= filter.lower_latency_ns && latency_ns < filter.upper_latency_ns {
                    spans.push(data.clone());
                }
            }
        }
        spans
    }

    /// Completed failed spans matching the filter's code, or any non-OK
    /// code when the filter leaves it unset. Order is unspecified.
    pub fn error_sampled_spans(&self, filter: &ErrorFilter) -> Vec<SpanData> {
        let state = self.read_state();
        let samples = match state.get(&filter.span_name) {
            Some(samples) => samples,
            None => return Vec::new(),
        };
        let mut spans = Vec::new();
        let rings: Vec<&VecDeque<SpanData>> = match filter.canonical_code {
            Some(code) => vec![&samples.errors[code as usize - 1]],
            None => samples.errors.iter().collect(),
        };
        for ring in rings {
            for data in ring {
                if filter.max_spans != 0 && spans.len() == filter.max_spans {
                    return spans;
                }
                spans.push(data.clone());
            }
        }
        spans
    }

    /// Active and stored sample counts per registered span name.
    pub fn summary(&self) -> Summary {
        let state = self.read_state();
        let per_span_name = state
            .iter()
            .map(|(name, samples)| {
                let num_latency_sampled_spans = LatencyBucketBoundaries::ALL
                    .iter()
                    .map(|bucket| (*bucket, samples.latency[bucket.index()].len()))
                    .collect();
                let num_error_sampled_spans = CanonicalCode::ALL
                    .iter()
                    .filter(|code| **code != CanonicalCode::Ok)
                    .map(|code| (*code, samples.errors[*code as usize - 1].len()))
                    .collect();
                (
                    name.clone(),
                    PerSpanNameSummary {
                        num_active_spans: samples.num_active,
                        num_latency_sampled_spans,
                        num_error_sampled_spans,
                    },
                )
            })
            .collect();
        Summary { per_span_name }
    }

    fn read_state(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<String, PerSpanNameSamples>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, PerSpanNameSamples>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StartEndHandler for SampledSpanStore {
    fn on_start(&self, span: &Span) {
        let mut state = self.write_state();
        if let Some(samples) = state.get_mut(span.name()) {
            samples.num_active += 1;
        }
    }

    fn on_end(&self, span: &Span) {
        let mut state = self.write_state();
        let Some(samples) = state.get_mut(span.name()) else {
            return;
        };
        samples.num_active = samples.num_active.saturating_sub(1);
        if let Ok(data) = span.to_span_data() {
            samples.add(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::testing::TestClock;
    use crate::time::{Clock, Timestamp, TimestampConverter};
    use crate::trace::{
        EndSpanOptions, SpanContext, SpanId, SpanOptions, Status, TraceId, TraceOptions,
        TraceParams,
    };

    const REGISTERED: &str = "MySpanName/1";
    const NOT_REGISTERED: &str = "MySpanName/2";

    struct Fixture {
        clock: Arc<TestClock>,
        store: Arc<SampledSpanStore>,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(SampledSpanStore::new());
            store.register_span_names([REGISTERED]);
            Fixture {
                clock: Arc::new(TestClock::new(Timestamp::new(12345, 54321))),
                store,
            }
        }

        fn create_span(&self, name: &str) -> Span {
            let clock: Arc<dyn Clock> = self.clock.clone();
            let converter = Arc::new(TimestampConverter::now(clock.as_ref()));
            Span::start(
                SpanContext::new(
                    TraceId::from(42u128),
                    SpanId::from(9u64),
                    TraceOptions::DEFAULT.with_sampled(true),
                ),
                SpanOptions::RECORD_EVENTS,
                name.into(),
                None,
                false,
                TraceParams::default(),
                self.store.clone(),
                converter,
                clock,
            )
        }

        fn end_span_with_latency(&self, name: &str, latency: Duration) {
            let span = self.create_span(name);
            self.clock.advance(latency);
            span.end();
        }

        fn end_span_with_error(&self, name: &str, code: CanonicalCode) {
            let span = self.create_span(name);
            self.clock.advance(Duration::from_micros(1));
            span.end_with_options(
                EndSpanOptions::builder()
                    .set_status(Status::new(code))
                    .build(),
            );
        }
    }

    #[test]
    fn bucket_classification_boundaries() {
        assert_eq!(
            LatencyBucketBoundaries::for_latency(0),
            LatencyBucketBoundaries::ZeroMicros10
        );
        assert_eq!(
            LatencyBucketBoundaries::for_latency(9_999),
            LatencyBucketBoundaries::ZeroMicros10
        );
        assert_eq!(
            LatencyBucketBoundaries::for_latency(10_000),
            LatencyBucketBoundaries::Micros10Micros100
        );
        assert_eq!(
            LatencyBucketBoundaries::for_latency(u64::MAX),
            LatencyBucketBoundaries::Second100Max
        );
    }

    #[test]
    fn registered_spans_land_in_every_latency_bucket() {
        let fixture = Fixture::new();
        for bucket in LatencyBucketBoundaries::ALL {
            fixture.end_span_with_latency(
                REGISTERED,
                Duration::from_nanos(bucket.latency_lower_ns()),
            );
        }

        let summary = fixture.store.summary();
        let per_name = &summary.per_span_name[REGISTERED];
        assert_eq!(per_name.num_latency_sampled_spans.len(), 9);
        for count in per_name.num_latency_sampled_spans.values() {
            assert_eq!(*count, 1);
        }
    }

    #[test]
    fn unregistered_spans_are_not_stored() {
        let fixture = Fixture::new();
        fixture.end_span_with_latency(NOT_REGISTERED, Duration::from_micros(20));

        let summary = fixture.store.summary();
        assert!(!summary.per_span_name.contains_key(NOT_REGISTERED));
        assert_eq!(summary.per_span_name.len(), 1);
    }

    #[test]
    fn latency_query_honors_half_open_range() {
        let fixture = Fixture::new();
        fixture.end_span_with_latency(REGISTERED, Duration::from_micros(20));

        let hit = LatencyFilter::new(REGISTERED, 15_000, 25_000, 0).unwrap();
        let spans = fixture.store.latency_sampled_spans(&hit);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, REGISTERED);

        // The upper bound is exclusive.
        let miss = LatencyFilter::new(REGISTERED, 15_000, 20_000, 0).unwrap();
        assert!(fixture.store.latency_sampled_spans(&miss).is_empty());

        // The lower bound is inclusive.
        let edge = LatencyFilter::new(REGISTERED, 20_000, 25_000, 0).unwrap();
        assert_eq!(fixture.store.latency_sampled_spans(&edge).len(), 1);
    }

    #[test]
    fn latency_query_respects_max_spans() {
        let fixture = Fixture::new();
        for _ in 0..4 {
            fixture.end_span_with_latency(REGISTERED, Duration::from_micros(20));
        }
        let filter = LatencyFilter::new(REGISTERED, 0, u64::MAX, 2).unwrap();
        assert_eq!(fixture.store.latency_sampled_spans(&filter).len(), 2);
    }

    #[test]
    fn latency_rings_drop_oldest_beyond_capacity() {
        let fixture = Fixture::new();
        for _ in 0..NUM_SAMPLES_PER_LATENCY_BUCKET + 5 {
            fixture.end_span_with_latency(REGISTERED, Duration::from_micros(20));
        }
        let filter = LatencyFilter::new(REGISTERED, 0, u64::MAX, 0).unwrap();
        assert_eq!(
            fixture.store.latency_sampled_spans(&filter).len(),
            NUM_SAMPLES_PER_LATENCY_BUCKET
        );
    }

    #[test]
    fn error_query_by_code_and_wildcard() {
        let fixture = Fixture::new();
        fixture.end_span_with_error(REGISTERED, CanonicalCode::Cancelled);

        let cancelled =
            ErrorFilter::new(REGISTERED, Some(CanonicalCode::Cancelled), 0).unwrap();
        assert_eq!(fixture.store.error_sampled_spans(&cancelled).len(), 1);

        let unknown = ErrorFilter::new(REGISTERED, Some(CanonicalCode::Unknown), 0).unwrap();
        assert!(fixture.store.error_sampled_spans(&unknown).is_empty());

        let any = ErrorFilter::new(REGISTERED, None, 0).unwrap();
        assert_eq!(fixture.store.error_sampled_spans(&any).len(), 1);
    }

    #[test]
    fn error_filter_rejects_ok() {
        assert!(ErrorFilter::new(REGISTERED, Some(CanonicalCode::Ok), 0).is_err());
    }

    #[test]
    fn register_unregister_is_idempotent() {
        let fixture = Fixture::new();
        fixture.store.register_span_names([REGISTERED]);
        fixture.end_span_with_latency(REGISTERED, Duration::from_micros(20));

        // Re-registering does not clear existing samples.
        fixture.store.register_span_names([REGISTERED]);
        let filter = LatencyFilter::new(REGISTERED, 0, u64::MAX, 0).unwrap();
        assert_eq!(fixture.store.latency_sampled_spans(&filter).len(), 1);

        fixture.store.unregister_span_names([REGISTERED]);
        fixture.store.unregister_span_names([REGISTERED]);
        assert!(fixture.store.latency_sampled_spans(&filter).is_empty());
        assert!(fixture.store.registered_span_names().is_empty());
    }

    #[test]
    fn active_spans_are_counted() {
        let fixture = Fixture::new();
        let open = fixture.create_span(REGISTERED);
        let _unregistered = fixture.create_span(NOT_REGISTERED);

        let summary = fixture.store.summary();
        assert_eq!(summary.per_span_name[REGISTERED].num_active_spans, 1);

        open.end();
        let summary = fixture.store.summary();
        assert_eq!(summary.per_span_name[REGISTERED].num_active_spans, 0);
    }
}
