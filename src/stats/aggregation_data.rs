//! Snapshots of aggregated values, one variant per aggregation kind.

/// The value of one aggregation in one cell of a view's data.
#[derive(Clone, Debug, PartialEq)]
pub enum AggregationData {
    /// The sum of the recorded values.
    Sum {
        /// The aggregated sum.
        sum: f64,
    },
    /// The number of recorded values.
    Count {
        /// The aggregated count.
        count: u64,
    },
    /// Bucket counts over the view's histogram boundaries.
    Histogram {
        /// One count per bucket, in boundary order.
        bucket_counts: Vec<u64>,
    },
    /// The extremes of the recorded values.
    Range {
        /// The minimum, `+∞` if nothing was recorded.
        min: f64,
        /// The maximum, `−∞` if nothing was recorded.
        max: f64,
    },
    /// The arithmetic mean of the recorded values.
    Mean {
        /// The mean, `0` if nothing was recorded.
        mean: f64,
        /// The number of recorded values.
        count: u64,
    },
    /// The population standard deviation of the recorded values.
    StdDev {
        /// The standard deviation, `0` if nothing was recorded.
        std_dev: f64,
    },
}
