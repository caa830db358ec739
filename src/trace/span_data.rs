//! Immutable snapshots of finished (or in-flight) spans, consumed by
//! exporters and the sampled span store.

use std::collections::HashMap;
use std::time::Duration;

use crate::time::Timestamp;
use crate::trace::{
    Annotation, AttributeValue, Link, MessageEvent, SpanContext, SpanId, Status,
};

/// The attributes recorded on a span, plus how many were dropped by the
/// bounded attribute map.
#[derive(Clone, Debug, PartialEq)]
pub struct Attributes {
    /// The surviving attributes.
    pub map: HashMap<String, AttributeValue>,
    /// Inserts no longer represented by an entry.
    pub dropped_count: u32,
}

/// An event plus the wall-clock time at which it was recorded.
#[derive(Clone, Debug, PartialEq)]
pub struct TimedEvent<T> {
    /// When the event was recorded.
    pub timestamp: Timestamp,
    /// The event itself.
    pub event: T,
}

/// The events of one kind recorded on a span, plus the drop count of their
/// bounded queue.
#[derive(Clone, Debug, PartialEq)]
pub struct TimedEvents<T> {
    /// The surviving events, oldest first.
    pub events: Vec<TimedEvent<T>>,
    /// Events pushed out of the bounded queue.
    pub dropped_count: u32,
}

impl<T> Default for TimedEvents<T> {
    fn default() -> Self {
        TimedEvents {
            events: Vec::new(),
            dropped_count: 0,
        }
    }
}

/// The links recorded on a span, plus their drop count.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Links {
    /// The surviving links, oldest first.
    pub links: Vec<Link>,
    /// Links pushed out of the bounded queue.
    pub dropped_count: u32,
}

/// A frozen copy of all the data collected by a span.
///
/// Monotonic event times have been converted to wall-clock [`Timestamp`]s
/// through the span's timestamp converter. `status` and `end_time` are
/// `None` until the span has ended.
#[derive(Clone, Debug, PartialEq)]
pub struct SpanData {
    /// The span's propagated identity.
    pub context: SpanContext,
    /// The parent's span id, `None` for a root span.
    pub parent_span_id: Option<SpanId>,
    /// Whether the parent lives in a different process.
    pub has_remote_parent: bool,
    /// The name of the span.
    pub name: String,
    /// When the span started.
    pub start_time: Timestamp,
    /// Recorded attributes.
    pub attributes: Attributes,
    /// Recorded annotations.
    pub annotations: TimedEvents<Annotation>,
    /// Recorded message events.
    pub message_events: TimedEvents<MessageEvent>,
    /// Recorded links.
    pub links: Links,
    /// The completion status, once ended.
    pub status: Option<Status>,
    /// When the span ended, once ended.
    pub end_time: Option<Timestamp>,
}

impl SpanData {
    /// The wall-clock latency of the span, or `None` if it has not ended.
    pub fn latency(&self) -> Option<Duration> {
        self.end_time
            .as_ref()
            .and_then(|end| end.duration_since(&self.start_time))
    }
}
