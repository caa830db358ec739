//! Distributed tracing: spans, samplers, bounded recording and the sampled
//! span store.
//!
//! A [`Tracer`] starts [`Span`]s. While live, a span records attributes,
//! annotations, message events and links into bounded containers; once
//! ended it is frozen and exposed to exporters as a
//! [`span_data::SpanData`] snapshot. Completed spans with registered names
//! are additionally retained by the [`export::SampledSpanStore`].

mod attribute;
mod config;
mod error;
mod evicted_hash_map;
mod evicted_queue;
mod id_generator;
mod sampler;
mod span;
mod span_context;
pub mod span_data;
mod status;
mod tracer;

pub mod export;

pub use attribute::{
    Annotation, AttributeValue, Link, LinkType, MessageEvent, MessageEventType,
};
pub use config::{TraceParams, TraceParamsBuilder};
pub use error::TraceError;
pub use evicted_hash_map::EvictedHashMap;
pub use evicted_queue::EvictedQueue;
pub use id_generator::{IdGenerator, RandomIdGenerator};
pub use sampler::{Sampler, ShouldSample};
pub use span::{
    EndSpanOptions, EndSpanOptionsBuilder, NoopStartEndHandler, Span, SpanOptions,
    StartEndHandler,
};
pub use span_context::{SpanContext, SpanId, TraceId, TraceOptions};
pub use status::{CanonicalCode, Status};
pub use tracer::{SpanBuilder, Tracer};
