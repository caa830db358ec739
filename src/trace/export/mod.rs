//! Interfaces consumed by span exporters and debugging surfaces.

mod sampled_span_store;

pub use sampled_span_store::{
    ErrorFilter, LatencyBucketBoundaries, LatencyFilter, PerSpanNameSummary, SampledSpanStore,
    Summary,
};

pub use crate::trace::span_data::{Attributes, Links, SpanData, TimedEvent, TimedEvents};
