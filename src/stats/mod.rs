//! Stats collection: measures, views and their aggregation engine.
//!
//! Instrumented code defines [`Measure`]s and records [`MeasureMap`]
//! batches through the [`StatsRecorder`]; applications declare [`View`]s
//! over those measures through the [`ViewManager`] and read back
//! [`ViewData`] snapshots. Aggregation runs asynchronously on the event
//! queue's worker thread.

mod aggregation;
mod aggregation_data;
mod error;
mod interval_bucket;
mod measure;
mod mutable_aggregation;
mod recorder;
mod view;
mod view_manager;

use std::sync::Arc;

use crate::internal::event_queue::EventQueue;
use crate::time::Clock;

pub use aggregation::{Aggregation, BucketBoundaries};
pub use aggregation_data::AggregationData;
pub use error::StatsError;
pub use measure::{
    Measure, MeasureKind, MeasureMap, MeasureValue, Measurement, MAX_NAME_LENGTH,
};
pub use recorder::StatsRecorder;
pub use view::{TagValues, View, ViewData, ViewName, Window, WindowData};
pub use view_manager::{
    StatsConfig, ViewManager, MAX_INTERVAL_BUCKETS, MIN_INTERVAL_BUCKETS,
};

use view_manager::StatsManager;

/// The stats subsystem: a [`ViewManager`] and a [`StatsRecorder`] sharing
/// one aggregation engine.
#[derive(Clone, Debug)]
pub struct StatsComponent {
    view_manager: ViewManager,
    stats_recorder: StatsRecorder,
}

impl StatsComponent {
    /// Create the stats subsystem on top of the shared event queue and
    /// clock.
    pub fn new(queue: Arc<EventQueue>, clock: Arc<dyn Clock>, config: StatsConfig) -> Self {
        let manager = Arc::new(StatsManager::new(queue, clock, config));
        StatsComponent {
            view_manager: ViewManager::new(manager.clone()),
            stats_recorder: StatsRecorder::new(manager),
        }
    }

    /// The view registration and query surface.
    pub fn view_manager(&self) -> &ViewManager {
        &self.view_manager
    }

    /// The measurement recording surface.
    pub fn stats_recorder(&self) -> &StatsRecorder {
        &self.stats_recorder
    }
}
