//! The view aggregation engine.
//!
//! Measurements arrive on the event-queue worker and fan out to every view
//! subscribed to their measure. Each registered view owns a cumulative or
//! sliding-interval [`ViewState`] guarded by its own lock; registration and
//! lookup take the engine-wide lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use crate::internal::event_queue::{EventEntry, EventQueue};
use crate::stats::interval_bucket::IntervalBucket;
use crate::stats::mutable_aggregation::{new_mutable_aggregations, MutableAggregation};
use crate::stats::view::TagValues;
use crate::stats::{
    Aggregation, AggregationData, Measure, MeasureMap, StatsError, View, ViewData, ViewName,
    Window, WindowData,
};
use crate::tags::TagContext;
use crate::time::{Clock, Timestamp};

/// Configuration of the stats engine.
///
/// The base configuration rejects interval views; enabling them also picks
/// the number of interval buckets `N` (the window is tracked as `N + 1`
/// buckets, the newest of which contains the current time).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatsConfig {
    interval_views_enabled: bool,
    interval_buckets: u32,
}

/// Bounds for the interval bucket count `N`.
pub const MIN_INTERVAL_BUCKETS: u32 = 2;
/// Upper bound for the interval bucket count `N`.
pub const MAX_INTERVAL_BUCKETS: u32 = 20;
const DEFAULT_INTERVAL_BUCKETS: u32 = 4;

impl Default for StatsConfig {
    fn default() -> Self {
        StatsConfig {
            interval_views_enabled: false,
            interval_buckets: DEFAULT_INTERVAL_BUCKETS,
        }
    }
}

impl StatsConfig {
    /// Enable interval views with `n` buckets, `n` in
    /// [[`MIN_INTERVAL_BUCKETS`], [`MAX_INTERVAL_BUCKETS`]].
    pub fn with_interval_views(mut self, n: u32) -> Result<Self, StatsError> {
        if !(MIN_INTERVAL_BUCKETS..=MAX_INTERVAL_BUCKETS).contains(&n) {
            return Err(StatsError::InvalidArgument(format!(
                "interval bucket count {n} outside [{MIN_INTERVAL_BUCKETS}, {MAX_INTERVAL_BUCKETS}]"
            )));
        }
        self.interval_views_enabled = true;
        self.interval_buckets = n;
        Ok(self)
    }

    pub(crate) fn interval_views_enabled(&self) -> bool {
        self.interval_views_enabled
    }

    pub(crate) fn interval_buckets(&self) -> u32 {
        self.interval_buckets
    }
}

// Aggregation state of one registered view.
#[derive(Debug)]
enum ViewState {
    Cumulative(CumulativeViewState),
    Interval(IntervalViewState),
}

impl ViewState {
    fn new(view: &View, start: Timestamp, config: &StatsConfig) -> Self {
        match view.window() {
            Window::Cumulative => ViewState::Cumulative(CumulativeViewState {
                start,
                aggregations: view.aggregations().to_vec(),
                rows: HashMap::new(),
            }),
            Window::Interval(duration) => ViewState::Interval(IntervalViewState::new(
                view.aggregations().to_vec(),
                duration,
                config.interval_buckets() as usize,
                start,
            )),
        }
    }

    fn record(
        &mut self,
        tag_values: TagValues,
        value: f64,
        now: Timestamp,
    ) -> Result<(), StatsError> {
        match self {
            ViewState::Cumulative(state) => {
                state.record(tag_values, value);
                Ok(())
            }
            ViewState::Interval(state) => state.record(tag_values, value, now),
        }
    }

    fn view_data(&mut self, view: &View, now: Timestamp) -> Result<ViewData, StatsError> {
        match self {
            ViewState::Cumulative(state) => Ok(ViewData {
                view: view.clone(),
                aggregation_map: snapshot_rows(&state.rows),
                window_data: WindowData::Cumulative {
                    start: state.start,
                    end: now,
                },
            }),
            ViewState::Interval(state) => {
                let aggregation_map = state.combined_rows(now)?;
                Ok(ViewData {
                    view: view.clone(),
                    aggregation_map: snapshot_rows(&aggregation_map),
                    window_data: WindowData::Interval { end: now },
                })
            }
        }
    }
}

fn snapshot_rows(
    rows: &HashMap<TagValues, Vec<MutableAggregation>>,
) -> HashMap<TagValues, Vec<AggregationData>> {
    rows.iter()
        .map(|(tag_values, aggregations)| {
            (
                tag_values.clone(),
                aggregations.iter().map(MutableAggregation::snapshot).collect(),
            )
        })
        .collect()
}

// A single row map covering the view's whole lifetime. Snapshots never
// reset it.
#[derive(Debug)]
struct CumulativeViewState {
    start: Timestamp,
    aggregations: Vec<Aggregation>,
    rows: HashMap<TagValues, Vec<MutableAggregation>>,
}

impl CumulativeViewState {
    fn record(&mut self, tag_values: TagValues, value: f64) {
        let aggregations = &self.aggregations;
        let row = self
            .rows
            .entry(tag_values)
            .or_insert_with(|| new_mutable_aggregations(aggregations));
        for aggregation in row {
            aggregation.add(value);
        }
    }
}

// A queue of exactly `n + 1` buckets, each covering `interval / n`. The
// newest bucket always contains the current time; the oldest one partially
// overlaps the left edge of the window and is blended fractionally on
// snapshot.
#[derive(Debug)]
struct IntervalViewState {
    aggregations: Vec<Aggregation>,
    bucket_duration: Duration,
    num_buckets: usize,
    buckets: std::collections::VecDeque<IntervalBucket>,
}

impl IntervalViewState {
    fn new(
        aggregations: Vec<Aggregation>,
        interval: Duration,
        n: usize,
        start: Timestamp,
    ) -> Self {
        let mut state = IntervalViewState {
            aggregations,
            bucket_duration: interval / n as u32,
            num_buckets: n + 1,
            buckets: std::collections::VecDeque::with_capacity(n + 1),
        };
        // Seed with n buckets before `start` so the newest bucket is the
        // one currently in effect.
        state.shift_buckets(state.num_buckets, start);
        state
    }

    fn record(
        &mut self,
        tag_values: TagValues,
        value: f64,
        now: Timestamp,
    ) -> Result<(), StatsError> {
        self.refresh(now)?;
        // It is always the newest bucket that does the recording.
        self.buckets
            .back_mut()
            .expect("interval state always holds n + 1 buckets")
            .record(tag_values, value);
        Ok(())
    }

    // Pad new buckets and evict expired ones so the newest bucket contains
    // `now`.
    fn refresh(&mut self, now: Timestamp) -> Result<(), StatsError> {
        debug_assert_eq!(self.buckets.len(), self.num_buckets);
        let newest_start = self
            .buckets
            .back()
            .expect("interval state always holds n + 1 buckets")
            .start();
        if now < newest_start {
            return Err(StatsError::InvalidState(format!(
                "time went backwards: {now:?} is before the newest bucket at {newest_start:?}"
            )));
        }
        let elapsed = now.total_nanos() - newest_start.total_nanos();
        let pad = (elapsed / self.bucket_duration.as_nanos() as i128) as usize;
        self.shift_buckets(pad, now);
        Ok(())
    }

    fn shift_buckets(&mut self, pad: usize, now: Timestamp) {
        let total = self.bucket_duration * (self.num_buckets - 1) as u32;
        let mut pad = pad;
        let mut next_start = match self.buckets.back() {
            Some(newest) => newest.start().add_duration(self.bucket_duration),
            None => now.sub_duration(total),
        };
        if pad > self.num_buckets {
            // Everything expired; rebuild so the newest bucket starts at
            // `now`.
            next_start = now.sub_duration(total);
            pad = self.num_buckets;
        }
        for _ in 0..pad {
            self.buckets.push_back(IntervalBucket::new(
                next_start,
                self.bucket_duration,
                self.aggregations.clone(),
            ));
            next_start = next_start.add_duration(self.bucket_duration);
        }
        while self.buckets.len() > self.num_buckets {
            self.buckets.pop_front();
        }
    }

    // Blend every bucket into one row map: the oldest bucket contributes
    // the fraction of it still inside the window, all others contribute
    // whole.
    fn combined_rows(
        &mut self,
        now: Timestamp,
    ) -> Result<HashMap<TagValues, Vec<MutableAggregation>>, StatsError> {
        self.refresh(now)?;
        let fraction_tail = self
            .buckets
            .back()
            .expect("interval state always holds n + 1 buckets")
            .fraction(now);
        if !(0.0..=1.0).contains(&fraction_tail) {
            return Err(StatsError::InvalidState(format!(
                "tail bucket fraction {fraction_tail} outside [0.0, 1.0]"
            )));
        }
        let fraction_head = 1.0 - fraction_tail;

        let mut combined: HashMap<TagValues, Vec<MutableAggregation>> = HashMap::new();
        for (i, bucket) in self.buckets.iter().enumerate() {
            let fraction = if i == 0 { fraction_head } else { 1.0 };
            for (tag_values, aggregations) in bucket.rows() {
                let row = combined
                    .entry(tag_values.clone())
                    .or_insert_with(|| new_mutable_aggregations(&self.aggregations));
                for (accumulator, other) in row.iter_mut().zip(aggregations) {
                    accumulator.combine(other, fraction)?;
                }
            }
        }
        Ok(combined)
    }
}

// Registration state: which views exist, which measures they subscribe to,
// and the per-view aggregation states.
#[derive(Debug, Default)]
struct MeasureToViewMap {
    registered_views: HashMap<String, View>,
    registered_measures: HashMap<String, Measure>,
    views_for_measure: HashMap<String, Vec<String>>,
    view_states: HashMap<String, Mutex<ViewState>>,
}

impl MeasureToViewMap {
    fn register_view(
        &mut self,
        view: View,
        start: Timestamp,
        config: &StatsConfig,
    ) -> Result<(), StatsError> {
        if let Some(existing) = self.registered_views.get(view.name().as_str()) {
            return if *existing == view {
                Ok(())
            } else {
                Err(StatsError::InvalidArgument(format!(
                    "a different view named {} is already registered",
                    view.name()
                )))
            };
        }

        if let Window::Interval(_) = view.window() {
            if !config.interval_views_enabled() {
                return Err(StatsError::Unsupported(
                    "interval views are not enabled in this configuration".into(),
                ));
            }
            if let Some(aggregation) = view
                .aggregations()
                .iter()
                .find(|aggregation| !aggregation.supports_fractional_combine())
            {
                return Err(StatsError::Unsupported(format!(
                    "interval views cannot maintain {aggregation:?}: it does not support fractional combine"
                )));
            }
        }

        match self.registered_measures.get(view.measure().name()) {
            Some(existing) if existing != view.measure() => {
                return Err(StatsError::InvalidArgument(format!(
                    "a measure named {} is already registered with a different schema",
                    view.measure().name()
                )));
            }
            Some(_) => {}
            None => {
                self.registered_measures
                    .insert(view.measure().name().to_string(), view.measure().clone());
            }
        }

        let name = view.name().as_str().to_string();
        self.views_for_measure
            .entry(view.measure().name().to_string())
            .or_default()
            .push(name.clone());
        self.view_states
            .insert(name.clone(), Mutex::new(ViewState::new(&view, start, config)));
        self.registered_views.insert(name, view);
        Ok(())
    }

    fn record(&self, tags: &TagContext, measurements: &MeasureMap, now: Timestamp) {
        for measurement in measurements {
            let measure_name = measurement.measure.name();
            match self.registered_measures.get(measure_name) {
                Some(registered) if *registered == measurement.measure => {}
                Some(_) => {
                    census_debug!(
                        name: "Stats.MeasureSchemaMismatch",
                        measure = measure_name
                    );
                    continue;
                }
                // Measures nobody subscribed to are silently ignored so
                // instrumented libraries can run without configured views.
                None => continue,
            }
            let Some(view_names) = self.views_for_measure.get(measure_name) else {
                continue;
            };
            for view_name in view_names {
                let (Some(view), Some(state)) = (
                    self.registered_views.get(view_name),
                    self.view_states.get(view_name),
                ) else {
                    continue;
                };
                let tag_values = project_tags(tags, view);
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                if let Err(error) =
                    state.record(tag_values, measurement.value.as_f64(), now)
                {
                    census_warn!(
                        name: "Stats.RecordFailed",
                        view = view_name.as_str(),
                        error = error.to_string()
                    );
                }
            }
        }
    }

    fn view_data(&self, name: &ViewName, now: Timestamp) -> Result<ViewData, StatsError> {
        let (Some(view), Some(state)) = (
            self.registered_views.get(name.as_str()),
            self.view_states.get(name.as_str()),
        ) else {
            return Err(StatsError::InvalidArgument(format!(
                "no view named {name} is registered"
            )));
        };
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        state.view_data(view, now)
    }

    fn registered_views(&self) -> Vec<View> {
        self.registered_views.values().cloned().collect()
    }
}

// Project a tag context onto a view's columns, in column order, with `None`
// standing in for missing keys.
fn project_tags(tags: &TagContext, view: &View) -> TagValues {
    view.columns()
        .iter()
        .map(|column| tags.get(column).cloned())
        .collect()
}

/// Owner of all stats state; shared by the recorder façade and the view
/// manager.
#[derive(Debug)]
pub(crate) struct StatsManager {
    queue: Arc<EventQueue>,
    clock: Arc<dyn Clock>,
    config: StatsConfig,
    measure_to_view_map: RwLock<MeasureToViewMap>,
}

impl StatsManager {
    pub(crate) fn new(queue: Arc<EventQueue>, clock: Arc<dyn Clock>, config: StatsConfig) -> Self {
        StatsManager {
            queue,
            clock,
            config,
            measure_to_view_map: RwLock::new(MeasureToViewMap::default()),
        }
    }

    pub(crate) fn register_view(&self, view: View) -> Result<(), StatsError> {
        let start = self.clock.now();
        self.measure_to_view_map
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register_view(view, start, &self.config)
    }

    pub(crate) fn view_data(&self, name: &ViewName) -> Result<ViewData, StatsError> {
        let now = self.clock.now();
        self.measure_to_view_map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .view_data(name, now)
    }

    pub(crate) fn registered_views(&self) -> Vec<View> {
        self.measure_to_view_map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .registered_views()
    }

    pub(crate) fn record(self: &Arc<Self>, tags: TagContext, measurements: MeasureMap) {
        let entry = StatsEvent {
            manager: self.clone(),
            tags,
            measurements,
        };
        self.queue.enqueue(Box::new(entry));
    }

    fn record_now(&self, tags: &TagContext, measurements: &MeasureMap) {
        let now = self.clock.now();
        self.measure_to_view_map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .record(tags, measurements, now);
    }
}

// The event-queue entry carrying one recorded batch to the worker.
struct StatsEvent {
    manager: Arc<StatsManager>,
    tags: TagContext,
    measurements: MeasureMap,
}

impl EventEntry for StatsEvent {
    fn process(self: Box<Self>) {
        self.manager.record_now(&self.tags, &self.measurements);
    }
}

/// Registers views and serves their aggregated data.
#[derive(Clone, Debug)]
pub struct ViewManager {
    manager: Arc<StatsManager>,
}

impl ViewManager {
    pub(crate) fn new(manager: Arc<StatsManager>) -> Self {
        ViewManager { manager }
    }

    /// Register a view.
    ///
    /// Registering the identical view again is a no-op; registering a
    /// different view under an existing name fails.
    pub fn register_view(&self, view: View) -> Result<(), StatsError> {
        self.manager.register_view(view)
    }

    /// A snapshot of the data aggregated by the named view.
    pub fn view_data(&self, name: &ViewName) -> Result<ViewData, StatsError> {
        self.manager.view_data(name)
    }

    /// All currently registered views.
    pub fn registered_views(&self) -> Vec<View> {
        self.manager.registered_views()
    }
}
