//! Span construction.

use std::sync::{Arc, PoisonError, RwLock};

use crate::time::{Clock, TimestampConverter};
use crate::trace::{
    IdGenerator, Link, RandomIdGenerator, ShouldSample, Span, SpanContext, SpanOptions,
    StartEndHandler, TraceError, TraceOptions, TraceParams,
};

#[derive(Debug)]
struct TracerInner {
    clock: Arc<dyn Clock>,
    id_generator: Box<dyn IdGenerator>,
    start_end_handler: Arc<dyn StartEndHandler>,
    active_trace_params: RwLock<TraceParams>,
}

/// Starts spans.
///
/// The tracer owns the active [`TraceParams`], which can be swapped at
/// runtime; spans capture the params in effect when they start.
#[derive(Clone, Debug)]
pub struct Tracer {
    inner: Arc<TracerInner>,
}

impl Tracer {
    /// Create a tracer.
    pub fn new(
        clock: Arc<dyn Clock>,
        start_end_handler: Arc<dyn StartEndHandler>,
        trace_params: TraceParams,
    ) -> Self {
        Tracer {
            inner: Arc::new(TracerInner {
                clock,
                id_generator: Box::new(RandomIdGenerator::default()),
                start_end_handler,
                active_trace_params: RwLock::new(trace_params),
            }),
        }
    }

    /// The params spans started from now on will capture.
    pub fn active_trace_params(&self) -> TraceParams {
        self.inner
            .active_trace_params
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the active params. Running spans keep the params they
    /// started with.
    pub fn update_active_trace_params(&self, trace_params: TraceParams) {
        *self
            .inner
            .active_trace_params
            .write()
            .unwrap_or_else(PoisonError::into_inner) = trace_params;
    }

    /// Start building a root span.
    pub fn span_builder(&self, name: impl Into<String>) -> SpanBuilder<'_> {
        SpanBuilder {
            tracer: self,
            name: name.into(),
            parent: Parent::Root,
            sampler: None,
            record_events: None,
            links: Vec::new(),
        }
    }

    /// Start a span, as a child of `parent` when one is given.
    pub fn start_span(&self, name: impl Into<String>, parent: Option<&Span>) -> Result<Span, TraceError> {
        let mut builder = self.span_builder(name);
        if let Some(parent) = parent {
            builder = builder.with_parent(parent);
        }
        builder.start()
    }
}

// How a new span relates to an existing trace.
#[derive(Debug)]
enum Parent {
    Root,
    Local {
        context: SpanContext,
        converter: Arc<TimestampConverter>,
    },
    Remote(SpanContext),
}

/// Configures and starts a new [`Span`].
#[derive(Debug)]
pub struct SpanBuilder<'a> {
    tracer: &'a Tracer,
    name: String,
    parent: Parent,
    sampler: Option<Arc<dyn ShouldSample>>,
    record_events: Option<bool>,
    links: Vec<Link>,
}

impl SpanBuilder<'_> {
    /// Make the new span a child of a span in this process. The child
    /// reuses the parent's timestamp converter so the trace shares one
    /// timeline.
    pub fn with_parent(mut self, parent: &Span) -> Self {
        self.parent = Parent::Local {
            context: *parent.context(),
            converter: parent.timestamp_converter(),
        };
        self
    }

    /// Make the new span a child of a span in another process.
    pub fn with_remote_parent(mut self, parent: SpanContext) -> Self {
        self.parent = Parent::Remote(parent);
        self
    }

    /// Override the sampler for this span only.
    pub fn with_sampler<S: ShouldSample + 'static>(mut self, sampler: S) -> Self {
        self.sampler = Some(Arc::new(sampler));
        self
    }

    /// Record events even when the sampling decision is negative. Sampled
    /// spans always record.
    pub fn with_record_events(mut self, record_events: bool) -> Self {
        self.record_events = Some(record_events);
        self
    }

    /// Record links on the new span; linked sampled spans also influence
    /// probability sampling.
    pub fn with_links(mut self, links: Vec<Link>) -> Self {
        self.links = links;
        self
    }

    /// Start the span.
    pub fn start(self) -> Result<Span, TraceError> {
        if self.name.is_empty() {
            return Err(TraceError::InvalidArgument("span name is empty".into()));
        }
        let tracer = &self.tracer.inner;
        let trace_params = self.tracer.active_trace_params();

        let (parent_context, parent_converter, has_remote_parent) = match &self.parent {
            Parent::Root => (None, None, false),
            Parent::Local { context, converter } => (Some(*context), Some(converter.clone()), false),
            Parent::Remote(context) => (Some(*context), None, true),
        };

        let trace_id = match &parent_context {
            Some(parent) if parent.trace_id().is_valid() => parent.trace_id(),
            _ => tracer.id_generator.new_trace_id(),
        };
        let span_id = tracer.id_generator.new_span_id();

        let sampler = self
            .sampler
            .unwrap_or_else(|| trace_params.sampler().clone());
        let sampled = sampler.should_sample(
            parent_context.as_ref(),
            trace_id,
            span_id,
            &self.name,
            &self.links,
        );

        let trace_options = parent_context
            .map(|parent| parent.trace_options())
            .unwrap_or(TraceOptions::DEFAULT)
            .with_sampled(sampled);
        let context = SpanContext::new(trace_id, span_id, trace_options);

        let options = if sampled || self.record_events.unwrap_or(false) {
            SpanOptions::RECORD_EVENTS
        } else {
            SpanOptions::NONE
        };

        let converter = parent_converter
            .unwrap_or_else(|| Arc::new(TimestampConverter::now(tracer.clock.as_ref())));

        let span = Span::start(
            context,
            options,
            self.name,
            parent_context.map(|parent| parent.span_id()),
            has_remote_parent,
            trace_params,
            tracer.start_end_handler.clone(),
            converter,
            tracer.clock.clone(),
        );
        for link in self.links {
            span.add_link(link);
        }
        Ok(span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestClock;
    use crate::time::Timestamp;
    use crate::trace::{NoopStartEndHandler, Sampler, SpanId, TraceId};

    fn tracer_with(sampler: Sampler) -> Tracer {
        let params = TraceParams::builder().with_sampler(sampler).build().unwrap();
        Tracer::new(
            Arc::new(TestClock::new(Timestamp::new(1, 0))),
            Arc::new(NoopStartEndHandler),
            params,
        )
    }

    #[test]
    fn empty_name_is_rejected() {
        let tracer = tracer_with(Sampler::AlwaysSample);
        assert!(matches!(
            tracer.span_builder("").start(),
            Err(TraceError::InvalidArgument(_))
        ));
    }

    #[test]
    fn root_span_gets_fresh_valid_ids() {
        let tracer = tracer_with(Sampler::AlwaysSample);
        let span = tracer.span_builder("root").start().unwrap();
        assert!(span.context().is_valid());
        assert!(span.context().trace_options().is_sampled());
        assert!(span.options().record_events());
        assert_eq!(span.parent_span_id(), None);
        assert!(!span.has_remote_parent());
    }

    #[test]
    fn child_inherits_trace_id_and_parent_span_id() {
        let tracer = tracer_with(Sampler::AlwaysSample);
        let parent = tracer.span_builder("parent").start().unwrap();
        let child = tracer.start_span("child", Some(&parent)).unwrap();

        assert_eq!(child.context().trace_id(), parent.context().trace_id());
        assert_ne!(child.context().span_id(), parent.context().span_id());
        assert_eq!(child.parent_span_id(), Some(parent.context().span_id()));
        assert!(!child.has_remote_parent());
    }

    #[test]
    fn remote_parent_is_flagged() {
        let tracer = tracer_with(Sampler::AlwaysSample);
        let remote = SpanContext::new(
            TraceId::from(9u128),
            SpanId::from(8u64),
            TraceOptions::DEFAULT,
        );
        let span = tracer
            .span_builder("server_op")
            .with_remote_parent(remote)
            .start()
            .unwrap();
        assert!(span.has_remote_parent());
        assert_eq!(span.context().trace_id(), TraceId::from(9u128));
        assert_eq!(span.parent_span_id(), Some(SpanId::from(8u64)));
    }

    #[test]
    fn default_sampler_never_samples() {
        let tracer = Tracer::new(
            Arc::new(TestClock::new(Timestamp::new(1, 0))),
            Arc::new(NoopStartEndHandler),
            TraceParams::default(),
        );
        let span = tracer.span_builder("unsampled").start().unwrap();
        assert!(!span.context().trace_options().is_sampled());
        assert!(!span.options().record_events());
    }

    #[test]
    fn record_events_can_be_forced_without_sampling() {
        let tracer = tracer_with(Sampler::NeverSample);
        let span = tracer
            .span_builder("debug_op")
            .with_record_events(true)
            .start()
            .unwrap();
        assert!(!span.context().trace_options().is_sampled());
        assert!(span.options().record_events());
    }

    #[test]
    fn per_span_sampler_overrides_default() {
        let tracer = tracer_with(Sampler::NeverSample);
        let span = tracer
            .span_builder("important")
            .with_sampler(Sampler::AlwaysSample)
            .start()
            .unwrap();
        assert!(span.context().trace_options().is_sampled());
    }

    #[test]
    fn updated_params_apply_to_new_spans_only() {
        let tracer = tracer_with(Sampler::NeverSample);
        let before = tracer.span_builder("before").start().unwrap();
        tracer.update_active_trace_params(
            TraceParams::builder()
                .with_sampler(Sampler::AlwaysSample)
                .build()
                .unwrap(),
        );
        let after = tracer.span_builder("after").start().unwrap();

        assert!(!before.context().trace_options().is_sampled());
        assert!(after.context().trace_options().is_sampled());
    }
}
