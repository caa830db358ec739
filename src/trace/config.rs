//! Global tracing configuration.

use std::sync::Arc;

use crate::trace::{Sampler, ShouldSample, TraceError};

const DEFAULT_MAX_ATTRIBUTES: u32 = 32;
const DEFAULT_MAX_ANNOTATIONS: u32 = 32;
const DEFAULT_MAX_MESSAGE_EVENTS: u32 = 128;
const DEFAULT_MAX_LINKS: u32 = 128;

/// Per-span recording limits and the default sampler.
///
/// All limits are strictly positive; the bounded span containers evict once
/// a limit is reached rather than growing.
#[derive(Clone, Debug)]
pub struct TraceParams {
    max_attributes: u32,
    max_annotations: u32,
    max_message_events: u32,
    max_links: u32,
    sampler: Arc<dyn ShouldSample>,
}

impl Default for TraceParams {
    fn default() -> Self {
        TraceParams {
            max_attributes: DEFAULT_MAX_ATTRIBUTES,
            max_annotations: DEFAULT_MAX_ANNOTATIONS,
            max_message_events: DEFAULT_MAX_MESSAGE_EVENTS,
            max_links: DEFAULT_MAX_LINKS,
            sampler: Arc::new(Sampler::NeverSample),
        }
    }
}

impl TraceParams {
    /// Start building params from the defaults.
    pub fn builder() -> TraceParamsBuilder {
        TraceParamsBuilder::default()
    }

    /// Start building params from this value.
    pub fn to_builder(&self) -> TraceParamsBuilder {
        TraceParamsBuilder {
            params: self.clone(),
        }
    }

    /// The maximum number of attributes kept per span.
    pub fn max_attributes(&self) -> u32 {
        self.max_attributes
    }

    /// The maximum number of annotations kept per span.
    pub fn max_annotations(&self) -> u32 {
        self.max_annotations
    }

    /// The maximum number of message events kept per span.
    pub fn max_message_events(&self) -> u32 {
        self.max_message_events
    }

    /// The maximum number of links kept per span.
    pub fn max_links(&self) -> u32 {
        self.max_links
    }

    /// The sampler consulted when a span has no explicit override.
    pub fn sampler(&self) -> &Arc<dyn ShouldSample> {
        &self.sampler
    }
}

/// Builder for [`TraceParams`].
#[derive(Debug, Default)]
pub struct TraceParamsBuilder {
    params: TraceParams,
}

impl TraceParamsBuilder {
    /// Specify the number of attributes kept per span.
    pub fn with_max_attributes(mut self, max_attributes: u32) -> Self {
        self.params.max_attributes = max_attributes;
        self
    }

    /// Specify the number of annotations kept per span.
    pub fn with_max_annotations(mut self, max_annotations: u32) -> Self {
        self.params.max_annotations = max_annotations;
        self
    }

    /// Specify the number of message events kept per span.
    pub fn with_max_message_events(mut self, max_message_events: u32) -> Self {
        self.params.max_message_events = max_message_events;
        self
    }

    /// Specify the number of links kept per span.
    pub fn with_max_links(mut self, max_links: u32) -> Self {
        self.params.max_links = max_links;
        self
    }

    /// Specify the default sampler.
    pub fn with_sampler<S: ShouldSample + 'static>(mut self, sampler: S) -> Self {
        self.params.sampler = Arc::new(sampler);
        self
    }

    /// Finish building, validating that every limit is positive.
    pub fn build(self) -> Result<TraceParams, TraceError> {
        let p = &self.params;
        if p.max_attributes == 0
            || p.max_annotations == 0
            || p.max_message_events == 0
            || p.max_links == 0
        {
            return Err(TraceError::InvalidArgument(
                "span limits must be positive".into(),
            ));
        }
        Ok(self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let params = TraceParams::default();
        assert_eq!(params.max_attributes(), 32);
        assert_eq!(params.max_annotations(), 32);
        assert_eq!(params.max_message_events(), 128);
        assert_eq!(params.max_links(), 128);
    }

    #[test]
    fn zero_limits_are_rejected() {
        assert!(TraceParams::builder().with_max_attributes(0).build().is_err());
        assert!(TraceParams::builder().with_max_links(0).build().is_err());
        assert!(TraceParams::builder().with_max_attributes(1).build().is_ok());
    }
}
