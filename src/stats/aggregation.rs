//! Aggregation descriptors: how a view summarizes its measure.

use crate::stats::StatsError;

/// Histogram bucket boundaries.
///
/// `n` boundaries define `n + 1` buckets; bucket `i` covers
/// `[boundaries[i-1], boundaries[i])` with open-ended buckets at both ends.
/// The comparison against a boundary is strict-less, so a value equal to
/// `boundaries[i]` falls into bucket `i + 1` and NaN falls into the final
/// bucket.
#[derive(Clone, Debug, PartialEq)]
pub struct BucketBoundaries {
    boundaries: Vec<f64>,
}

impl BucketBoundaries {
    /// Create boundaries, which must be strictly increasing.
    pub fn new(boundaries: Vec<f64>) -> Result<Self, StatsError> {
        if boundaries.windows(2).any(|pair| !(pair[0] < pair[1])) {
            return Err(StatsError::InvalidArgument(
                "bucket boundaries must be strictly increasing".into(),
            ));
        }
        Ok(BucketBoundaries { boundaries })
    }

    /// The boundary values.
    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }

    /// The number of buckets the boundaries define.
    pub fn num_buckets(&self) -> usize {
        self.boundaries.len() + 1
    }

    /// The index of the bucket `value` falls into.
    pub fn bucket_for(&self, value: f64) -> usize {
        for (i, boundary) in self.boundaries.iter().enumerate() {
            if value < *boundary {
                return i;
            }
        }
        self.boundaries.len()
    }
}

/// The summary statistic a view maintains per aggregation cell.
#[derive(Clone, Debug, PartialEq)]
pub enum Aggregation {
    /// The sum of the recorded values.
    Sum,
    /// The number of recorded values.
    Count,
    /// Bucket counts over the given boundaries.
    Histogram(BucketBoundaries),
    /// The minimum and maximum recorded value.
    Range,
    /// The arithmetic mean and count of the recorded values.
    Mean,
    /// The population standard deviation of the recorded values.
    StdDev,
}

impl Aggregation {
    /// Whether the aggregation supports being scaled by a fractional
    /// weight, as sliding-window snapshots require for their oldest bucket.
    pub fn supports_fractional_combine(&self) -> bool {
        !matches!(self, Aggregation::Range | Aggregation::StdDev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundaries_must_increase() {
        assert!(BucketBoundaries::new(vec![]).is_ok());
        assert!(BucketBoundaries::new(vec![0.0, 1.0, 2.0]).is_ok());
        assert!(BucketBoundaries::new(vec![0.0, 0.0]).is_err());
        assert!(BucketBoundaries::new(vec![1.0, 0.5]).is_err());
    }

    #[test]
    fn boundary_values_fall_upward() {
        let bounds = BucketBoundaries::new(vec![0.0, 10.0]).unwrap();
        assert_eq!(bounds.bucket_for(-0.1), 0);
        assert_eq!(bounds.bucket_for(0.0), 1);
        assert_eq!(bounds.bucket_for(9.9), 1);
        assert_eq!(bounds.bucket_for(10.0), 2);
        assert_eq!(bounds.bucket_for(f64::NAN), 2);
    }
}
