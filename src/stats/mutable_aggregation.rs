//! Mutable accumulators behind the aggregation kinds.
//!
//! Each accumulator supports `add` for recording, `combine` for folding
//! another accumulator in with a weight (used when sliding-window snapshots
//! blend their oldest, partially-expired bucket), and `snapshot` to freeze
//! an [`AggregationData`]. Range and standard deviation cannot be scaled by
//! a fraction, so they accept only unit-weight combines.

use crate::stats::{Aggregation, AggregationData, BucketBoundaries, StatsError};

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum MutableAggregation {
    Sum {
        sum: f64,
    },
    Count {
        count: u64,
    },
    Histogram {
        boundaries: BucketBoundaries,
        bucket_counts: Vec<u64>,
    },
    Range {
        min: f64,
        max: f64,
    },
    Mean {
        sum: f64,
        count: u64,
    },
    // Welford's online algorithm.
    StdDev {
        count: u64,
        mean: f64,
        sum_of_squared_deviations: f64,
    },
}

impl MutableAggregation {
    /// An empty accumulator for the given aggregation kind.
    pub(crate) fn new(aggregation: &Aggregation) -> Self {
        match aggregation {
            Aggregation::Sum => MutableAggregation::Sum { sum: 0.0 },
            Aggregation::Count => MutableAggregation::Count { count: 0 },
            Aggregation::Histogram(boundaries) => MutableAggregation::Histogram {
                boundaries: boundaries.clone(),
                bucket_counts: vec![0; boundaries.num_buckets()],
            },
            Aggregation::Range => MutableAggregation::Range {
                min: f64::INFINITY,
                max: f64::NEG_INFINITY,
            },
            Aggregation::Mean => MutableAggregation::Mean { sum: 0.0, count: 0 },
            Aggregation::StdDev => MutableAggregation::StdDev {
                count: 0,
                mean: 0.0,
                sum_of_squared_deviations: 0.0,
            },
        }
    }

    /// Record a value.
    pub(crate) fn add(&mut self, value: f64) {
        match self {
            MutableAggregation::Sum { sum } => *sum += value,
            MutableAggregation::Count { count } => *count += 1,
            MutableAggregation::Histogram {
                boundaries,
                bucket_counts,
            } => bucket_counts[boundaries.bucket_for(value)] += 1,
            MutableAggregation::Range { min, max } => {
                if value < *min {
                    *min = value;
                }
                if value > *max {
                    *max = value;
                }
            }
            MutableAggregation::Mean { sum, count } => {
                *count += 1;
                *sum += value;
            }
            MutableAggregation::StdDev {
                count,
                mean,
                sum_of_squared_deviations,
            } => {
                *count += 1;
                let delta = value - *mean;
                *mean += delta / *count as f64;
                *sum_of_squared_deviations += delta * (value - *mean);
            }
        }
    }

    /// Fold `other` into this accumulator with the given weight.
    ///
    /// `fraction` must be within `[0, 1]`; counts are scaled with
    /// round-half-to-even. Range and StdDev only support `fraction == 1.0`
    /// and combining accumulators of different kinds (or histograms with
    /// different boundaries) is an error.
    pub(crate) fn combine(
        &mut self,
        other: &MutableAggregation,
        fraction: f64,
    ) -> Result<(), StatsError> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(StatsError::InvalidArgument(format!(
                "combine fraction {fraction} outside [0.0, 1.0]"
            )));
        }
        match (self, other) {
            (MutableAggregation::Sum { sum }, MutableAggregation::Sum { sum: other_sum }) => {
                *sum += fraction * other_sum;
            }
            (
                MutableAggregation::Count { count },
                MutableAggregation::Count { count: other_count },
            ) => {
                *count += scale_count(*other_count, fraction);
            }
            (
                MutableAggregation::Histogram {
                    boundaries,
                    bucket_counts,
                },
                MutableAggregation::Histogram {
                    boundaries: other_boundaries,
                    bucket_counts: other_counts,
                },
            ) => {
                if boundaries != other_boundaries {
                    return Err(StatsError::InvalidArgument(
                        "histogram bucket boundaries do not match".into(),
                    ));
                }
                for (count, other_count) in bucket_counts.iter_mut().zip(other_counts) {
                    *count += scale_count(*other_count, fraction);
                }
            }
            (
                MutableAggregation::Range { min, max },
                MutableAggregation::Range {
                    min: other_min,
                    max: other_max,
                },
            ) => {
                if fraction != 1.0 {
                    return Err(StatsError::Unsupported(
                        "range aggregation does not support fractional combine".into(),
                    ));
                }
                if *other_min < *min {
                    *min = *other_min;
                }
                if *other_max > *max {
                    *max = *other_max;
                }
            }
            (
                MutableAggregation::Mean { sum, count },
                MutableAggregation::Mean {
                    sum: other_sum,
                    count: other_count,
                },
            ) => {
                *count += scale_count(*other_count, fraction);
                *sum += fraction * other_sum;
            }
            (
                MutableAggregation::StdDev {
                    count,
                    mean,
                    sum_of_squared_deviations,
                },
                MutableAggregation::StdDev {
                    count: other_count,
                    mean: other_mean,
                    sum_of_squared_deviations: other_m2,
                },
            ) => {
                if fraction != 1.0 {
                    return Err(StatsError::Unsupported(
                        "stddev aggregation does not support fractional combine".into(),
                    ));
                }
                if *other_count == 0 {
                    return Ok(());
                }
                // Parallel Welford merge.
                let total = *count + *other_count;
                let delta = *other_mean - *mean;
                *sum_of_squared_deviations += *other_m2
                    + delta * delta * (*count as f64) * (*other_count as f64) / total as f64;
                *mean += delta * (*other_count as f64) / total as f64;
                *count = total;
            }
            _ => {
                return Err(StatsError::InvalidArgument(
                    "cannot combine aggregations of different kinds".into(),
                ));
            }
        }
        Ok(())
    }

    /// Freeze the current value.
    pub(crate) fn snapshot(&self) -> AggregationData {
        match self {
            MutableAggregation::Sum { sum } => AggregationData::Sum { sum: *sum },
            MutableAggregation::Count { count } => AggregationData::Count { count: *count },
            MutableAggregation::Histogram { bucket_counts, .. } => AggregationData::Histogram {
                bucket_counts: bucket_counts.clone(),
            },
            MutableAggregation::Range { min, max } => AggregationData::Range {
                min: *min,
                max: *max,
            },
            MutableAggregation::Mean { sum, count } => AggregationData::Mean {
                mean: if *count == 0 {
                    0.0
                } else {
                    *sum / *count as f64
                },
                count: *count,
            },
            MutableAggregation::StdDev {
                count,
                sum_of_squared_deviations,
                ..
            } => AggregationData::StdDev {
                std_dev: if *count == 0 {
                    0.0
                } else {
                    (sum_of_squared_deviations / *count as f64).sqrt()
                },
            },
        }
    }
}

fn scale_count(count: u64, fraction: f64) -> u64 {
    (fraction * count as f64).round_ties_even() as u64
}

/// Empty accumulators for a view's aggregation list.
pub(crate) fn new_mutable_aggregations(aggregations: &[Aggregation]) -> Vec<MutableAggregation> {
    aggregations.iter().map(MutableAggregation::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn added(aggregation: Aggregation, values: &[f64]) -> MutableAggregation {
        let mut mutable = MutableAggregation::new(&aggregation);
        for value in values {
            mutable.add(*value);
        }
        mutable
    }

    #[test]
    fn sum_add_and_snapshot() {
        let sum = added(Aggregation::Sum, &[10.0, 20.0, -5.0]);
        assert_eq!(sum.snapshot(), AggregationData::Sum { sum: 25.0 });
    }

    #[test]
    fn count_add_and_snapshot() {
        let count = added(Aggregation::Count, &[1.0, 1.0, 1.0]);
        assert_eq!(count.snapshot(), AggregationData::Count { count: 3 });
    }

    #[test]
    fn histogram_buckets_values() {
        let bounds = BucketBoundaries::new(vec![0.0, 10.0]).unwrap();
        let histogram = added(
            Aggregation::Histogram(bounds),
            &[-1.0, 0.0, 5.0, 10.0, f64::NAN],
        );
        assert_eq!(
            histogram.snapshot(),
            AggregationData::Histogram {
                bucket_counts: vec![1, 2, 2],
            }
        );
    }

    #[test]
    fn range_tracks_extremes() {
        let empty = MutableAggregation::new(&Aggregation::Range);
        assert_eq!(
            empty.snapshot(),
            AggregationData::Range {
                min: f64::INFINITY,
                max: f64::NEG_INFINITY,
            }
        );
        let range = added(Aggregation::Range, &[4.0, -2.0, 3.0]);
        assert_eq!(
            range.snapshot(),
            AggregationData::Range {
                min: -2.0,
                max: 4.0
            }
        );
    }

    #[test]
    fn mean_of_no_values_is_zero() {
        let empty = MutableAggregation::new(&Aggregation::Mean);
        assert_eq!(
            empty.snapshot(),
            AggregationData::Mean {
                mean: 0.0,
                count: 0
            }
        );
    }

    #[test]
    fn stddev_uses_welford() {
        let stddev = added(Aggregation::StdDev, &[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        match stddev.snapshot() {
            AggregationData::StdDev { std_dev } => assert!((std_dev - 2.0).abs() < 1e-9),
            other => panic!("unexpected snapshot {other:?}"),
        }
    }

    #[test]
    fn nan_propagates_into_sum_mean_stddev() {
        let sum = added(Aggregation::Sum, &[1.0, f64::NAN]);
        assert!(matches!(sum.snapshot(), AggregationData::Sum { sum } if sum.is_nan()));
        let mean = added(Aggregation::Mean, &[1.0, f64::NAN]);
        assert!(matches!(mean.snapshot(), AggregationData::Mean { mean, .. } if mean.is_nan()));
        let stddev = added(Aggregation::StdDev, &[1.0, f64::NAN]);
        assert!(
            matches!(stddev.snapshot(), AggregationData::StdDev { std_dev } if std_dev.is_nan())
        );
    }

    #[test]
    fn fractional_combine_scales_sums_and_counts() {
        let other_sum = added(Aggregation::Sum, &[100.0]);
        let mut sum = MutableAggregation::new(&Aggregation::Sum);
        sum.combine(&other_sum, 0.25).unwrap();
        assert_eq!(sum.snapshot(), AggregationData::Sum { sum: 25.0 });

        let other_count = added(Aggregation::Count, &[0.0; 10]);
        let mut count = MutableAggregation::new(&Aggregation::Count);
        count.combine(&other_count, 0.31).unwrap();
        assert_eq!(count.snapshot(), AggregationData::Count { count: 3 });
    }

    #[test]
    fn count_rounding_is_half_to_even() {
        let five = added(Aggregation::Count, &[0.0; 5]);
        let mut count = MutableAggregation::new(&Aggregation::Count);
        // 0.5 * 5 = 2.5 rounds to 2, not 3.
        count.combine(&five, 0.5).unwrap();
        assert_eq!(count.snapshot(), AggregationData::Count { count: 2 });

        let seven = added(Aggregation::Count, &[0.0; 7]);
        let mut count = MutableAggregation::new(&Aggregation::Count);
        // 0.5 * 7 = 3.5 rounds to 4.
        count.combine(&seven, 0.5).unwrap();
        assert_eq!(count.snapshot(), AggregationData::Count { count: 4 });
    }

    #[test]
    fn mean_combine_blends_sum_and_count() {
        let other = added(Aggregation::Mean, &[10.0, 20.0]);
        let mut mean = added(Aggregation::Mean, &[30.0]);
        mean.combine(&other, 1.0).unwrap();
        assert_eq!(
            mean.snapshot(),
            AggregationData::Mean {
                mean: 20.0,
                count: 3
            }
        );
    }

    #[test]
    fn histogram_combine_requires_matching_boundaries() {
        let bounds_a = BucketBoundaries::new(vec![0.0, 10.0]).unwrap();
        let bounds_b = BucketBoundaries::new(vec![0.0, 20.0]).unwrap();
        let mut histogram = MutableAggregation::new(&Aggregation::Histogram(bounds_a));
        let other = MutableAggregation::new(&Aggregation::Histogram(bounds_b));
        assert!(matches!(
            histogram.combine(&other, 1.0),
            Err(StatsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn range_and_stddev_reject_fractional_combine() {
        let mut range = MutableAggregation::new(&Aggregation::Range);
        let other_range = added(Aggregation::Range, &[1.0]);
        assert!(matches!(
            range.combine(&other_range, 0.5),
            Err(StatsError::Unsupported(_))
        ));
        range.combine(&other_range, 1.0).unwrap();
        assert_eq!(
            range.snapshot(),
            AggregationData::Range { min: 1.0, max: 1.0 }
        );

        let mut stddev = MutableAggregation::new(&Aggregation::StdDev);
        let other_stddev = added(Aggregation::StdDev, &[1.0]);
        assert!(matches!(
            stddev.combine(&other_stddev, 0.5),
            Err(StatsError::Unsupported(_))
        ));
    }

    #[test]
    fn stddev_unit_combine_merges_welford_state() {
        let values = [2.0f64, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let (left, right) = values.split_at(3);
        let mut merged = added(Aggregation::StdDev, left);
        merged.combine(&added(Aggregation::StdDev, right), 1.0).unwrap();
        match merged.snapshot() {
            AggregationData::StdDev { std_dev } => assert!((std_dev - 2.0).abs() < 1e-9),
            other => panic!("unexpected snapshot {other:?}"),
        }
    }

    #[test]
    fn mismatched_kinds_are_rejected() {
        let mut sum = MutableAggregation::new(&Aggregation::Sum);
        let count = MutableAggregation::new(&Aggregation::Count);
        assert!(matches!(
            sum.combine(&count, 1.0),
            Err(StatsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn out_of_range_fraction_is_rejected() {
        let mut sum = MutableAggregation::new(&Aggregation::Sum);
        let other = MutableAggregation::new(&Aggregation::Sum);
        assert!(sum.combine(&other, -0.1).is_err());
        assert!(sum.combine(&other, 1.1).is_err());
    }
}
