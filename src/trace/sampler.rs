//! Sampling decisions for new spans.

use std::fmt;

use crate::trace::{Link, SpanContext, SpanId, TraceId};

/// The interface for deciding whether a new span should be sampled.
///
/// The decision is made once, at span start, from information available
/// before the span exists.
pub trait ShouldSample: Send + Sync + fmt::Debug {
    /// Returns `true` if the span being started should be sampled.
    fn should_sample(
        &self,
        parent_context: Option<&SpanContext>,
        trace_id: TraceId,
        span_id: SpanId,
        name: &str,
        parent_links: &[Link],
    ) -> bool;
}

/// Built-in sampling strategies.
///
/// For more complex scenarios implement [`ShouldSample`] directly.
#[derive(Clone, Debug)]
pub enum Sampler {
    /// Sample every span.
    AlwaysSample,
    /// Never sample a span.
    NeverSample,
    /// Sample a given fraction of traces, deterministically derived from
    /// the trace id. Children of sampled parents (and spans linked to a
    /// sampled span) are always sampled.
    Probability(f64),
}

impl Sampler {
    /// A probability sampler with `probability` clamped to `[0, 1]`.
    pub fn probability(probability: f64) -> Self {
        Sampler::Probability(probability.clamp(0.0, 1.0))
    }

    // The id-based threshold: a trace is sampled iff the lower 8 bytes of
    // its id, as an unsigned integer, fall below probability * 2^64.
    fn id_under_threshold(probability: f64, trace_id: TraceId) -> bool {
        if probability >= 1.0 {
            return true;
        }
        if probability <= 0.0 {
            return false;
        }
        let threshold = (probability * u64::MAX as f64) as u64;
        trace_id.lower_long() < threshold
    }
}

impl ShouldSample for Sampler {
    fn should_sample(
        &self,
        parent_context: Option<&SpanContext>,
        trace_id: TraceId,
        _span_id: SpanId,
        _name: &str,
        parent_links: &[Link],
    ) -> bool {
        match self {
            Sampler::AlwaysSample => true,
            Sampler::NeverSample => false,
            Sampler::Probability(probability) => {
                if parent_context.map_or(false, |parent| parent.trace_options().is_sampled()) {
                    return true;
                }
                if parent_links
                    .iter()
                    .any(|link| link.context().trace_options().is_sampled())
                {
                    return true;
                }
                Sampler::id_under_threshold(*probability, trace_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{LinkType, TraceOptions};

    fn span_context(sampled: bool) -> SpanContext {
        SpanContext::new(
            TraceId::from(1u128),
            SpanId::from(1u64),
            TraceOptions::DEFAULT.with_sampled(sampled),
        )
    }

    fn decide(sampler: &Sampler, parent: Option<&SpanContext>, trace_id: TraceId) -> bool {
        sampler.should_sample(parent, trace_id, SpanId::from(7u64), "span", &[])
    }

    #[test]
    fn always_and_never() {
        let id = TraceId::from(u128::MAX);
        assert!(decide(&Sampler::AlwaysSample, None, id));
        assert!(!decide(&Sampler::NeverSample, None, id));
        // Fixed strategies ignore the parent's decision.
        assert!(!decide(&Sampler::NeverSample, Some(&span_context(true)), id));
    }

    #[test]
    fn probability_honors_sampled_parent() {
        let sampler = Sampler::probability(0.0);
        assert!(decide(&sampler, Some(&span_context(true)), TraceId::from(1u128)));
        assert!(!decide(&sampler, Some(&span_context(false)), TraceId::from(1u128)));
    }

    #[test]
    fn probability_honors_sampled_link() {
        let sampler = Sampler::probability(0.0);
        let links = [Link::new(span_context(true), LinkType::ParentLinkedSpan)];
        assert!(sampler.should_sample(None, TraceId::from(1u128), SpanId::from(7u64), "span", &links));
    }

    #[test]
    fn probability_is_deterministic_in_trace_id() {
        let sampler = Sampler::probability(0.5);
        // Lower half of the id space is sampled, upper half is not.
        assert!(decide(&sampler, None, TraceId::from(1u128)));
        assert!(!decide(&sampler, None, TraceId::from(u64::MAX as u128)));
    }

    #[test]
    fn probability_bounds_clamp() {
        assert!(matches!(Sampler::probability(2.0), Sampler::Probability(p) if p == 1.0));
        assert!(matches!(Sampler::probability(-1.0), Sampler::Probability(p) if p == 0.0));
    }
}
