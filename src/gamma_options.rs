use serde::{Deserialize, Serialize};

use crate::enums::{Normalization, Thresholds};
use crate::error::{Error, Result};

/// Bytes of scratch memory assumed per materialised reference sample and
/// dimension.
pub(crate) const BYTES_PER_SAMPLE_DIMENSION: u64 = 2 * 32;

pub const DEFAULT_MAX_CONCURRENT_CALC_POINTS: usize = 1 << 24;

/// Evaluate only `count` randomly chosen points, reproducibly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomSubset {
    pub count: usize,
    #[serde(default)]
    pub seed: u64,
}

/// Options of a gamma comparison.
///
/// `normalization` has no default and must always be given, also when
/// deserialising.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GammaOptions {
    /// Dose difference criterion, percent.
    pub dose_percent_threshold: Thresholds,
    /// Distance to agreement criterion, mm.
    pub distance_mm_threshold: Thresholds,
    pub normalization: Normalization,
    /// Evaluation points below this percentage of the global normalisation
    /// are excluded.
    #[serde(default = "default_lower_percent_dose_cutoff")]
    pub lower_percent_dose_cutoff: f64,
    /// Search shells are spaced `min(distance_mm_threshold) / interp_fraction` apart.
    #[serde(default = "default_interp_fraction")]
    pub interp_fraction: usize,
    /// Cap on reported gamma; also bounds the search radius to
    /// `max(distance_mm_threshold) * max_gamma`.
    #[serde(default)]
    pub max_gamma: Option<f64>,
    /// Value the global dose criterion is a percentage of. Defaults to the
    /// reference maximum.
    #[serde(default)]
    pub global_normalisation: Option<f64>,
    /// Stop searching a point once its gamma is strictly below one for
    /// every threshold pair that could still improve. Pass/fail is kept,
    /// the reported gamma of a passing point may no longer be the minimum.
    #[serde(default)]
    pub skip_once_passed: bool,
    #[serde(default)]
    pub random_subset: Option<RandomSubset>,
    /// Scratch memory the search may use, bytes.
    #[serde(default)]
    pub ram_available: Option<u64>,
    #[serde(default = "default_max_concurrent_calc_points")]
    pub max_concurrent_calc_points: usize,
    /// Worker threads. `None` uses every available core, `Some(1)` stays
    /// on the calling thread.
    #[serde(default)]
    pub num_threads: Option<usize>,
}

fn default_lower_percent_dose_cutoff() -> f64 {
    20.0
}

fn default_interp_fraction() -> usize {
    10
}

fn default_max_concurrent_calc_points() -> usize {
    DEFAULT_MAX_CONCURRENT_CALC_POINTS
}

impl GammaOptions {
    pub fn new(
        dose_percent_threshold: impl Into<Thresholds>,
        distance_mm_threshold: impl Into<Thresholds>,
        normalization: Normalization,
    ) -> Self {
        Self {
            dose_percent_threshold: dose_percent_threshold.into(),
            distance_mm_threshold: distance_mm_threshold.into(),
            normalization,
            lower_percent_dose_cutoff: default_lower_percent_dose_cutoff(),
            interp_fraction: default_interp_fraction(),
            max_gamma: None,
            global_normalisation: None,
            skip_once_passed: false,
            random_subset: None,
            ram_available: None,
            max_concurrent_calc_points: default_max_concurrent_calc_points(),
            num_threads: None,
        }
    }

    pub fn with_lower_percent_dose_cutoff(mut self, cutoff: f64) -> Self {
        self.lower_percent_dose_cutoff = cutoff;
        self
    }

    pub fn with_interp_fraction(mut self, interp_fraction: usize) -> Self {
        self.interp_fraction = interp_fraction;
        self
    }

    pub fn with_max_gamma(mut self, max_gamma: f64) -> Self {
        self.max_gamma = Some(max_gamma);
        self
    }

    pub fn with_global_normalisation(mut self, value: f64) -> Self {
        self.global_normalisation = Some(value);
        self
    }

    pub fn with_skip_once_passed(mut self, skip: bool) -> Self {
        self.skip_once_passed = skip;
        self
    }

    pub fn with_random_subset(mut self, count: usize, seed: u64) -> Self {
        self.random_subset = Some(RandomSubset { count, seed });
        self
    }

    pub fn with_ram_available(mut self, bytes: u64) -> Self {
        self.ram_available = Some(bytes);
        self
    }

    pub fn with_max_concurrent_calc_points(mut self, points: usize) -> Self {
        self.max_concurrent_calc_points = points;
        self
    }

    pub fn with_num_threads(mut self, threads: usize) -> Self {
        self.num_threads = Some(threads);
        self
    }

    pub(crate) fn dose_thresholds(&self) -> Vec<f64> {
        self.dose_percent_threshold.values()
    }

    pub(crate) fn distance_thresholds(&self) -> Vec<f64> {
        self.distance_mm_threshold.values()
    }

    /// Largest number of reference samples that may be materialised at once
    /// for a search in `dims` dimensions.
    pub(crate) fn sample_budget(&self, dims: usize) -> usize {
        let from_ram = self.ram_available.map(|bytes| {
            let per_sample = BYTES_PER_SAMPLE_DIMENSION * dims as u64;
            usize::try_from(bytes / per_sample).unwrap_or(usize::MAX)
        });
        match from_ram {
            Some(points) => points.min(self.max_concurrent_calc_points),
            None => self.max_concurrent_calc_points,
        }
    }

    /// Check every option before any computation starts.
    pub fn validate(&self) -> Result<()> {
        for (name, values) in [
            ("dose_percent_threshold", self.dose_thresholds()),
            ("distance_mm_threshold", self.distance_thresholds()),
        ] {
            if values.is_empty() {
                return Err(Error::InvalidOption {
                    name,
                    reason: "at least one threshold is required",
                });
            }
            if let Some(&value) = values.iter().find(|v| !v.is_finite() || **v <= 0.0) {
                return Err(Error::InvalidThreshold { name, value });
            }
        }

        if !self.lower_percent_dose_cutoff.is_finite() || self.lower_percent_dose_cutoff < 0.0 {
            return Err(Error::InvalidOption {
                name: "lower_percent_dose_cutoff",
                reason: "must be a non-negative finite percentage",
            });
        }
        if self.interp_fraction == 0 {
            return Err(Error::InvalidOption {
                name: "interp_fraction",
                reason: "must be at least one",
            });
        }
        if let Some(value) = self.max_gamma {
            if value.is_nan() || value <= 0.0 {
                return Err(Error::InvalidThreshold {
                    name: "max_gamma",
                    value,
                });
            }
        }
        if let Some(value) = self.global_normalisation {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::InvalidThreshold {
                    name: "global_normalisation",
                    value,
                });
            }
        }
        if self.random_subset.is_some_and(|subset| subset.count == 0) {
            return Err(Error::InvalidOption {
                name: "random_subset",
                reason: "count must be at least one",
            });
        }
        if self.ram_available == Some(0) || self.max_concurrent_calc_points == 0 {
            return Err(Error::InvalidOption {
                name: "max_concurrent_calc_points",
                reason: "the memory budget must be positive",
            });
        }
        if self.num_threads == Some(0) {
            return Err(Error::InvalidOption {
                name: "num_threads",
                reason: "must be at least one",
            });
        }
        Ok(())
    }
}
