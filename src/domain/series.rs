// Uniform time-series result shape and the per-point transform
use serde::Serialize;

/// One series of the uniform result set: `datapoints` are
/// `[value, timestampMillis]` pairs in the order the store returned them.
#[derive(Debug, Clone, Serialize)]
pub struct TimeSeriesResult {
    pub target: String,
    pub datapoints: Vec<(f64, i64)>,
}

impl TimeSeriesResult {
    /// Build a result from raw `(value, unixSeconds)` points, applying the
    /// target's rescale and the second-to-millisecond conversion per point.
    pub fn from_points(target: impl Into<String>, points: &[(f64, f64)], mul: f64, add: f64) -> Self {
        Self {
            target: target.into(),
            datapoints: points
                .iter()
                .map(|&(value, seconds)| scale_point(value, seconds, mul, add))
                .collect(),
        }
    }
}

/// Rescale one raw point and convert its fractional-second timestamp to the
/// nearest integer millisecond (half rounds away from zero).
pub fn scale_point(value: f64, timestamp_secs: f64, mul: f64, add: f64) -> (f64, i64) {
    (value * mul + add, (timestamp_secs * 1000.0).round() as i64)
}
