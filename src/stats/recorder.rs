//! The recording façade handed to instrumented code.

use std::sync::Arc;

use crate::stats::view_manager::StatsManager;
use crate::stats::MeasureMap;
use crate::tags::TagContext;

/// Records batches of measurements against a tag context.
///
/// `record` only packages the batch into an event-queue entry; aggregation
/// happens later on the queue's worker thread, so the caller never blocks
/// on the view engine.
#[derive(Clone, Debug)]
pub struct StatsRecorder {
    manager: Arc<StatsManager>,
}

impl StatsRecorder {
    pub(crate) fn new(manager: Arc<StatsManager>) -> Self {
        StatsRecorder { manager }
    }

    /// Record a batch of measurements labelled with `tags`.
    ///
    /// The context is captured by reference (contexts are immutable and
    /// cheap to clone); the batch is captured by value.
    pub fn record(&self, tags: &TagContext, measurements: MeasureMap) {
        if measurements.is_empty() {
            return;
        }
        self.manager.record(tags.clone(), measurements);
    }
}
