//! Measures and batches of measurements.

use crate::stats::StatsError;

/// The maximum length of a measure or view name.
pub const MAX_NAME_LENGTH: usize = 256;

pub(crate) fn validate_name(name: &str, what: &str) -> Result<(), StatsError> {
    if name.is_empty()
        || name.len() > MAX_NAME_LENGTH
        || !name.bytes().all(|b| (0x20..=0x7e).contains(&b))
    {
        return Err(StatsError::InvalidArgument(format!(
            "{what} name must be non-empty printable ASCII of at most {MAX_NAME_LENGTH} bytes"
        )));
    }
    Ok(())
}

/// The numeric kind of a measure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MeasureKind {
    /// 64-bit floating point values.
    Double,
    /// 64-bit signed integer values.
    Int64,
}

/// The definition of a quantity to be measured: a unique name plus a
/// description, unit and numeric kind.
///
/// Measure names are unique within a process; registering two views whose
/// measures share a name but differ otherwise is rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Measure {
    name: String,
    description: String,
    unit: String,
    kind: MeasureKind,
}

impl Measure {
    /// Define a double-valued measure.
    pub fn double(
        name: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
    ) -> Result<Self, StatsError> {
        Measure::new(name, description, unit, MeasureKind::Double)
    }

    /// Define an integer-valued measure.
    pub fn int64(
        name: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
    ) -> Result<Self, StatsError> {
        Measure::new(name, description, unit, MeasureKind::Int64)
    }

    fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
        kind: MeasureKind,
    ) -> Result<Self, StatsError> {
        let name = name.into();
        validate_name(&name, "measure")?;
        Ok(Measure {
            name,
            description: description.into(),
            unit: unit.into(),
            kind,
        })
    }

    /// The measure's unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The unit of the measured quantity.
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// The numeric kind.
    pub fn kind(&self) -> MeasureKind {
        self.kind
    }
}

/// A single measured value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MeasureValue {
    /// A double value.
    Double(f64),
    /// An integer value, widened to `f64` at aggregation time.
    Int64(i64),
}

impl MeasureValue {
    /// The value as an `f64`.
    pub fn as_f64(&self) -> f64 {
        match self {
            MeasureValue::Double(value) => *value,
            MeasureValue::Int64(value) => *value as f64,
        }
    }
}

/// One measured value for one measure.
#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    /// The measure being recorded against.
    pub measure: Measure,
    /// The measured value.
    pub value: MeasureValue,
}

/// A batch of measurements recorded together under one tag context.
///
/// The last value put for a given measure wins.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeasureMap {
    measurements: Vec<Measurement>,
}

impl MeasureMap {
    /// Start an empty batch.
    pub fn new() -> Self {
        MeasureMap::default()
    }

    /// Add a double value for `measure`.
    pub fn put_f64(self, measure: Measure, value: f64) -> Self {
        self.put(measure, MeasureValue::Double(value))
    }

    /// Add an integer value for `measure`.
    pub fn put_i64(self, measure: Measure, value: i64) -> Self {
        self.put(measure, MeasureValue::Int64(value))
    }

    fn put(mut self, measure: Measure, value: MeasureValue) -> Self {
        self.measurements
            .retain(|measurement| measurement.measure.name() != measure.name());
        self.measurements.push(Measurement { measure, value });
        self
    }

    /// Iterate over the batch.
    pub fn iter(&self) -> std::slice::Iter<'_, Measurement> {
        self.measurements.iter()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }
}

impl<'a> IntoIterator for &'a MeasureMap {
    type Item = &'a Measurement;
    type IntoIter = std::slice::Iter<'a, Measurement>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation() {
        assert!(Measure::double("", "d", "1").is_err());
        assert!(Measure::double("m\u{e9}tric", "d", "1").is_err());
        assert!(Measure::double("m".repeat(MAX_NAME_LENGTH), "d", "1").is_ok());
        assert!(Measure::double("m".repeat(MAX_NAME_LENGTH + 1), "d", "1").is_err());
    }

    #[test]
    fn last_put_wins() {
        let measure = Measure::double("latency", "request latency", "ms").unwrap();
        let map = MeasureMap::new()
            .put_f64(measure.clone(), 1.0)
            .put_f64(measure.clone(), 2.0);
        let values: Vec<f64> = map.iter().map(|m| m.value.as_f64()).collect();
        assert_eq!(values, vec![2.0]);
    }

    #[test]
    fn int_values_widen() {
        assert_eq!(MeasureValue::Int64(3).as_f64(), 3.0);
    }
}
