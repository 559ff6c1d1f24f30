use serde::{Deserialize, Serialize};

/// Denominator of the dose-difference term of gamma.
///
/// There is no `Default`; every comparison has to state which
/// normalisation it uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// Percentage of a single global value (the reference maximum unless overridden).
    Global,
    /// Percentage of the reference value local to each evaluation point.
    Local,
}

/// What the accumulator does with a control point whose cumulative MU is
/// lower than its predecessor's.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegativeMuPolicy {
    /// Treat the segment as delivering zero MU and log a warning.
    #[default]
    Clip,
    /// Fail with [`Error::NonMonotonicMu`](crate::error::Error::NonMonotonicMu).
    Reject,
}

/// A dose or distance threshold, either a single value or a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Thresholds {
    Single(f64),
    Sweep(Vec<f64>),
}

impl Thresholds {
    pub fn values(&self) -> Vec<f64> {
        match self {
            Thresholds::Single(value) => vec![*value],
            Thresholds::Sweep(values) => values.clone(),
        }
    }
}

impl From<f64> for Thresholds {
    fn from(value: f64) -> Self {
        Thresholds::Single(value)
    }
}

impl From<Vec<f64>> for Thresholds {
    fn from(values: Vec<f64>) -> Self {
        Thresholds::Sweep(values)
    }
}

impl From<&[f64]> for Thresholds {
    fn from(values: &[f64]) -> Self {
        Thresholds::Sweep(values.to_vec())
    }
}
