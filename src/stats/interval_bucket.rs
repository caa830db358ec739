//! One time slice of an interval view's sliding window.

use std::collections::HashMap;
use std::time::Duration;

use crate::stats::mutable_aggregation::{new_mutable_aggregations, MutableAggregation};
use crate::stats::view::TagValues;
use crate::stats::Aggregation;
use crate::time::Timestamp;

/// A bucket covering `[start, start + duration)`, holding one accumulator
/// row per observed combination of column values.
#[derive(Debug)]
pub(crate) struct IntervalBucket {
    start: Timestamp,
    duration: Duration,
    aggregations: Vec<Aggregation>,
    rows: HashMap<TagValues, Vec<MutableAggregation>>,
}

impl IntervalBucket {
    pub(crate) fn new(start: Timestamp, duration: Duration, aggregations: Vec<Aggregation>) -> Self {
        IntervalBucket {
            start,
            duration,
            aggregations,
            rows: HashMap::new(),
        }
    }

    pub(crate) fn start(&self) -> Timestamp {
        self.start
    }

    pub(crate) fn record(&mut self, tag_values: TagValues, value: f64) {
        let aggregations = &self.aggregations;
        let row = self
            .rows
            .entry(tag_values)
            .or_insert_with(|| new_mutable_aggregations(aggregations));
        for aggregation in row {
            aggregation.add(value);
        }
    }

    /// How far `now` has progressed into this bucket, in `[0, 1]` when
    /// `now` lies within the bucket.
    pub(crate) fn fraction(&self, now: Timestamp) -> f64 {
        let elapsed = now.total_nanos() - self.start.total_nanos();
        elapsed as f64 / self.duration.as_nanos() as f64
    }

    pub(crate) fn rows(&self) -> &HashMap<TagValues, Vec<MutableAggregation>> {
        &self.rows
    }
}
