//! The live span recorder.
//!
//! A `Span` is cheaply cloneable and shareable across threads: its identity
//! is immutable and all recording state sits behind a single per-span lock.
//! Nothing is recorded unless the span carries the
//! [`SpanOptions::RECORD_EVENTS`] option. Once [`Span::end`] has run the
//! span is frozen and further mutations are debug-logged no-ops.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::time::{Clock, TimestampConverter};
use crate::trace::span_data::{Attributes, Links, SpanData, TimedEvent, TimedEvents};
use crate::trace::{
    Annotation, AttributeValue, EvictedHashMap, EvictedQueue, Link, MessageEvent, SpanContext,
    SpanId, Status, TraceError, TraceParams,
};

/// Options for a span, set at construction time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SpanOptions(u8);

impl SpanOptions {
    const RECORD_EVENTS_BIT: u8 = 1;

    /// No options set; the span records nothing.
    pub const NONE: SpanOptions = SpanOptions(0);

    /// The span records attributes, annotations, events and links.
    pub const RECORD_EVENTS: SpanOptions = SpanOptions(Self::RECORD_EVENTS_BIT);

    /// Returns `true` if the span records events.
    pub const fn record_events(self) -> bool {
        self.0 & Self::RECORD_EVENTS_BIT != 0
    }

    /// These options with the record-events bit set or cleared.
    pub const fn with_record_events(self, record: bool) -> Self {
        if record {
            SpanOptions(self.0 | Self::RECORD_EVENTS_BIT)
        } else {
            SpanOptions(self.0 & !Self::RECORD_EVENTS_BIT)
        }
    }
}

/// Options passed to [`Span::end_with_options`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EndSpanOptions {
    status: Option<Status>,
}

impl EndSpanOptions {
    /// Start building end options.
    pub fn builder() -> EndSpanOptionsBuilder {
        EndSpanOptionsBuilder::default()
    }

    /// The status to end the span with, if overridden.
    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }
}

/// Builder for [`EndSpanOptions`].
#[derive(Debug, Default)]
pub struct EndSpanOptionsBuilder {
    options: EndSpanOptions,
}

impl EndSpanOptionsBuilder {
    /// End the span with the given status instead of [`Status::OK`].
    pub fn set_status(mut self, status: Status) -> Self {
        self.options.status = Some(status);
        self
    }

    /// Finish building.
    pub fn build(self) -> EndSpanOptions {
        self.options
    }
}

/// Callbacks invoked when a recording span starts and ends.
///
/// Both are called synchronously on the thread driving the span, so
/// implementations sit on the critical path: they must be fast and
/// thread-safe. The sampled span store hooks these to observe completed
/// spans.
pub trait StartEndHandler: Send + Sync + fmt::Debug {
    /// Called once after a recording span has been fully constructed.
    fn on_start(&self, span: &Span);

    /// Called exactly once when a recording span ends.
    fn on_end(&self, span: &Span);
}

/// A [`StartEndHandler`] that does nothing.
#[derive(Clone, Debug, Default)]
pub struct NoopStartEndHandler;

impl StartEndHandler for NoopStartEndHandler {
    fn on_start(&self, _span: &Span) {}

    fn on_end(&self, _span: &Span) {}
}

// Recording state, guarded by the span's lock. Containers are allocated on
// first use so non-recording paths stay cheap.
#[derive(Debug, Default)]
struct SpanState {
    attributes: Option<EvictedHashMap>,
    annotations: Option<EvictedQueue<(i64, Annotation)>>,
    message_events: Option<EvictedQueue<(i64, MessageEvent)>>,
    links: Option<EvictedQueue<Link>>,
    status: Option<Status>,
    end_nano_time: Option<i64>,
    has_been_ended: bool,
}

#[derive(Debug)]
struct SpanInner {
    context: SpanContext,
    options: SpanOptions,
    name: String,
    parent_span_id: Option<SpanId>,
    has_remote_parent: bool,
    trace_params: TraceParams,
    start_end_handler: Arc<dyn StartEndHandler>,
    clock: Arc<dyn Clock>,
    timestamp_converter: Arc<TimestampConverter>,
    start_nano_time: i64,
    state: Mutex<SpanState>,
}

/// Single timed operation within a trace.
#[derive(Clone, Debug)]
pub struct Span {
    inner: Arc<SpanInner>,
}

impl Span {
    /// Creates and starts a span. The converter must be the root span's so
    /// that events across the trace share one timeline.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn start(
        context: SpanContext,
        options: SpanOptions,
        name: String,
        parent_span_id: Option<SpanId>,
        has_remote_parent: bool,
        trace_params: TraceParams,
        start_end_handler: Arc<dyn StartEndHandler>,
        timestamp_converter: Arc<TimestampConverter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let start_nano_time = clock.now_nanos();
        let span = Span {
            inner: Arc::new(SpanInner {
                context,
                options,
                name,
                parent_span_id,
                has_remote_parent,
                trace_params,
                start_end_handler,
                clock,
                timestamp_converter,
                start_nano_time,
                state: Mutex::new(SpanState::default()),
            }),
        };
        // on_start runs after the span is fully constructed so handlers see
        // a complete value.
        if span.options().record_events() {
            span.inner.start_end_handler.on_start(&span);
        }
        span
    }

    /// The span's propagated identity.
    pub fn context(&self) -> &SpanContext {
        &self.inner.context
    }

    /// The span's options.
    pub fn options(&self) -> SpanOptions {
        self.inner.options
    }

    /// The displayed name of the span.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The parent's span id, `None` for a root span.
    pub fn parent_span_id(&self) -> Option<SpanId> {
        self.inner.parent_span_id
    }

    /// Whether the parent lives in a different process.
    pub fn has_remote_parent(&self) -> bool {
        self.inner.has_remote_parent
    }

    /// Whether `end` has been called.
    pub fn has_ended(&self) -> bool {
        self.lock_state().has_been_ended
    }

    pub(crate) fn timestamp_converter(&self) -> Arc<TimestampConverter> {
        self.inner.timestamp_converter.clone()
    }

    /// Merge attributes into the span's bounded attribute map.
    ///
    /// Eviction keeps the most recently touched entries.
    pub fn add_attributes<I>(&self, attributes: I)
    where
        I: IntoIterator<Item = (String, AttributeValue)>,
    {
        if !self.options().record_events() {
            return;
        }
        let mut state = self.lock_state();
        if state.has_been_ended {
            census_debug!(name: "Span.AddAttributesAfterEnd", span = self.name());
            return;
        }
        let capacity = self.inner.trace_params.max_attributes();
        let map = state
            .attributes
            .get_or_insert_with(|| EvictedHashMap::new(capacity));
        for (key, value) in attributes {
            map.insert(key, value);
        }
    }

    /// Read a single attribute, refreshing its recency in the bounded map.
    pub fn attribute(&self, key: &str) -> Option<AttributeValue> {
        if !self.options().record_events() {
            return None;
        }
        let mut state = self.lock_state();
        state
            .attributes
            .as_mut()
            .and_then(|attributes| attributes.get(key).cloned())
    }

    /// Append a timestamped annotation.
    pub fn add_annotation(&self, annotation: impl Into<Annotation>) {
        if !self.options().record_events() {
            return;
        }
        let now = self.inner.clock.now_nanos();
        let mut state = self.lock_state();
        if state.has_been_ended {
            census_debug!(name: "Span.AddAnnotationAfterEnd", span = self.name());
            return;
        }
        let capacity = self.inner.trace_params.max_annotations();
        state
            .annotations
            .get_or_insert_with(|| EvictedQueue::new(capacity))
            .push_back((now, annotation.into()));
    }

    /// Append a timestamped message event.
    pub fn add_message_event(&self, event: MessageEvent) {
        if !self.options().record_events() {
            return;
        }
        let now = self.inner.clock.now_nanos();
        let mut state = self.lock_state();
        if state.has_been_ended {
            census_debug!(name: "Span.AddMessageEventAfterEnd", span = self.name());
            return;
        }
        let capacity = self.inner.trace_params.max_message_events();
        state
            .message_events
            .get_or_insert_with(|| EvictedQueue::new(capacity))
            .push_back((now, event));
    }

    /// Append a timestamped network event. Alias for
    /// [`Span::add_message_event`] kept for the wire-level name.
    pub fn add_network_event(&self, event: MessageEvent) {
        self.add_message_event(event);
    }

    /// Append a link to another span.
    pub fn add_link(&self, link: Link) {
        if !self.options().record_events() {
            return;
        }
        let mut state = self.lock_state();
        if state.has_been_ended {
            census_debug!(name: "Span.AddLinkAfterEnd", span = self.name());
            return;
        }
        let capacity = self.inner.trace_params.max_links();
        state
            .links
            .get_or_insert_with(|| EvictedQueue::new(capacity))
            .push_back(link);
    }

    /// End the span with [`Status::OK`].
    pub fn end(&self) {
        self.end_with_options(EndSpanOptions::default());
    }

    /// End the span.
    ///
    /// The first call freezes the span, records the end time and invokes
    /// the start/end handler; subsequent calls are debug-logged no-ops.
    pub fn end_with_options(&self, options: EndSpanOptions) {
        if !self.options().record_events() {
            return;
        }
        {
            let mut state = self.lock_state();
            if state.has_been_ended {
                census_debug!(name: "Span.EndAfterEnd", span = self.name());
                return;
            }
            state.status = Some(options.status().cloned().unwrap_or(Status::OK));
            state.end_nano_time = Some(self.inner.clock.now_nanos());
            state.has_been_ended = true;
        }
        // The handler runs outside the span lock so it may snapshot the
        // span without deadlocking.
        self.inner.start_end_handler.on_end(self);
    }

    /// Returns an immutable snapshot of all the data recorded by this span.
    ///
    /// Fails with [`TraceError::InvalidState`] for spans without the
    /// [`SpanOptions::RECORD_EVENTS`] option.
    pub fn to_span_data(&self) -> Result<SpanData, TraceError> {
        if !self.options().record_events() {
            return Err(TraceError::InvalidState(
                "getting span data for a span without the record-events option".into(),
            ));
        }
        let converter = &self.inner.timestamp_converter;
        let state = self.lock_state();

        let attributes = match &state.attributes {
            Some(map) => Attributes {
                map: map.to_map(),
                dropped_count: map.dropped_count(),
            },
            None => Attributes {
                map: HashMap::new(),
                dropped_count: 0,
            },
        };

        Ok(SpanData {
            context: self.inner.context,
            parent_span_id: self.inner.parent_span_id,
            has_remote_parent: self.inner.has_remote_parent,
            name: self.inner.name.clone(),
            start_time: converter.convert_nano_time(self.inner.start_nano_time),
            attributes,
            annotations: timed_events(&state.annotations, converter),
            message_events: timed_events(&state.message_events, converter),
            links: match &state.links {
                Some(queue) => Links {
                    links: queue.iter().copied().collect(),
                    dropped_count: queue.dropped_count(),
                },
                None => Links::default(),
            },
            status: if state.has_been_ended {
                state.status.clone()
            } else {
                None
            },
            end_time: state
                .end_nano_time
                .map(|nanos| converter.convert_nano_time(nanos)),
        })
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SpanState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn timed_events<T: Clone>(
    queue: &Option<EvictedQueue<(i64, T)>>,
    converter: &TimestampConverter,
) -> TimedEvents<T> {
    match queue {
        Some(queue) => TimedEvents {
            events: queue
                .iter()
                .map(|(nanos, event)| TimedEvent {
                    timestamp: converter.convert_nano_time(*nanos),
                    event: event.clone(),
                })
                .collect(),
            dropped_count: queue.dropped_count(),
        },
        None => TimedEvents::default(),
    }
}
