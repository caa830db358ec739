//! Views: declarations of how a measure is aggregated, and their data
//! snapshots.

use std::collections::HashMap;
use std::time::Duration;

use crate::stats::measure::validate_name;
use crate::stats::{Aggregation, AggregationData, Measure, StatsError};
use crate::tags::{TagKey, TagValue};
use crate::time::Timestamp;

/// The unique name of a view.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewName(String);

impl ViewName {
    /// Create a view name, validating the census naming rules.
    pub fn new(name: impl Into<String>) -> Result<Self, StatsError> {
        let name = name.into();
        validate_name(&name, "view")?;
        Ok(ViewName(name))
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ViewName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The time window a view aggregates over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Window {
    /// Aggregate everything since view registration; snapshots never reset.
    Cumulative,
    /// Aggregate over a sliding window of the given duration.
    Interval(Duration),
}

/// A declaration of how to aggregate a measure: which aggregations to
/// maintain, grouped by which tag keys, over which window.
#[derive(Clone, Debug, PartialEq)]
pub struct View {
    name: ViewName,
    description: String,
    measure: Measure,
    aggregations: Vec<Aggregation>,
    columns: Vec<TagKey>,
    window: Window,
}

impl View {
    /// Create a view.
    ///
    /// Columns must be distinct and at least one aggregation is required.
    pub fn new(
        name: ViewName,
        description: impl Into<String>,
        measure: Measure,
        aggregations: Vec<Aggregation>,
        columns: Vec<TagKey>,
        window: Window,
    ) -> Result<Self, StatsError> {
        if aggregations.is_empty() {
            return Err(StatsError::InvalidArgument(
                "view requires at least one aggregation".into(),
            ));
        }
        let mut seen = columns.to_vec();
        seen.sort();
        seen.dedup();
        if seen.len() != columns.len() {
            return Err(StatsError::InvalidArgument(
                "view columns contain duplicates".into(),
            ));
        }
        if let Window::Interval(duration) = window {
            if duration.is_zero() {
                return Err(StatsError::InvalidArgument(
                    "interval window duration must be positive".into(),
                ));
            }
        }
        Ok(View {
            name,
            description: description.into(),
            measure,
            aggregations,
            columns,
            window,
        })
    }

    /// The view's unique name.
    pub fn name(&self) -> &ViewName {
        &self.name
    }

    /// Human-readable description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The measure this view aggregates.
    pub fn measure(&self) -> &Measure {
        &self.measure
    }

    /// The aggregations maintained per cell.
    pub fn aggregations(&self) -> &[Aggregation] {
        &self.aggregations
    }

    /// The tag keys whose values define the aggregation cells.
    pub fn columns(&self) -> &[TagKey] {
        &self.columns
    }

    /// The aggregation window.
    pub fn window(&self) -> Window {
        self.window
    }
}

/// One row key in a view's data: the values of the view's columns, in
/// column order. A missing column projects to `None`, the "unknown/not set"
/// sentinel.
pub type TagValues = Vec<Option<TagValue>>;

/// The time window a [`ViewData`] snapshot covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowData {
    /// Data since the view was registered.
    Cumulative {
        /// When aggregation started.
        start: Timestamp,
        /// When the snapshot was taken.
        end: Timestamp,
    },
    /// Data over the sliding window ending at the snapshot time.
    Interval {
        /// When the snapshot was taken.
        end: Timestamp,
    },
}

/// A snapshot of everything a view has aggregated.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewData {
    /// The view this data belongs to.
    pub view: View,
    /// One entry per observed combination of column values, each holding
    /// one [`AggregationData`] per declared aggregation, in declaration
    /// order.
    pub aggregation_map: HashMap<TagValues, Vec<AggregationData>>,
    /// The window the snapshot covers.
    pub window_data: WindowData,
}
