use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::control_point::ControlPointSequence;
use crate::enums::NegativeMuPolicy;
use crate::error::{Error, Result};
use crate::grid::Grid;
use crate::rasterizer::segment_open_fraction;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetersetOptions {
    /// Samples per grid cell crossed by the fastest moving device.
    pub min_step_per_pixel: usize,
    pub negative_mu_policy: NegativeMuPolicy,
}

impl Default for MetersetOptions {
    fn default() -> Self {
        Self {
            min_step_per_pixel: 10,
            negative_mu_policy: NegativeMuPolicy::default(),
        }
    }
}

impl MetersetOptions {
    pub fn with_min_step_per_pixel(mut self, min_step_per_pixel: usize) -> Self {
        self.min_step_per_pixel = min_step_per_pixel;
        self
    }

    pub fn with_negative_mu_policy(mut self, policy: NegativeMuPolicy) -> Self {
        self.negative_mu_policy = policy;
        self
    }
}

/// Accumulate the MU density (MetersetMap) of a delivery on `grid`.
///
/// The first control point is the zero baseline; the MU delivered between
/// control points `i` and `i + 1` weights the open fraction of the aperture
/// moving between them. The result is co-indexed with `grid` and never
/// negative.
///
/// # Errors
///
/// Returns [`Error::InvalidSequence`] if the leaf pair count does not match
/// the grid, [`Error::InvalidOption`] for a zero `min_step_per_pixel`, and
/// [`Error::NonMonotonicMu`] when MU decreases under
/// [`NegativeMuPolicy::Reject`].
pub fn calc_metersetmap(
    grid: &Grid,
    sequence: &ControlPointSequence,
    options: &MetersetOptions,
) -> Result<Array2<f64>> {
    if sequence.leaf_pair_count() != grid.leaf_pair_count() {
        return Err(Error::InvalidSequence(format!(
            "sequence has {} leaf pairs but the grid has {}",
            sequence.leaf_pair_count(),
            grid.leaf_pair_count()
        )));
    }
    if options.min_step_per_pixel == 0 {
        return Err(Error::InvalidOption {
            name: "min_step_per_pixel",
            reason: "must be at least one",
        });
    }

    let sequence = sequence.remove_irrelevant_control_points();
    let control_points = sequence.control_points();
    let mut metersetmap = grid.zeros();

    for (index, delta) in sequence.mu_deltas().into_iter().enumerate() {
        let delta = match delta {
            d if d > 0.0 => d,
            d if d == 0.0 => continue,
            d => match options.negative_mu_policy {
                NegativeMuPolicy::Reject => {
                    return Err(Error::NonMonotonicMu {
                        index: index + 1,
                        delta: d,
                    });
                }
                NegativeMuPolicy::Clip => {
                    tracing::warn!(
                        control_point = index + 1,
                        delta = d,
                        "cumulative MU decreases, clipping segment to zero MU"
                    );
                    continue;
                }
            },
        };

        let open = segment_open_fraction(
            grid,
            &control_points[index],
            &control_points[index + 1],
            options.min_step_per_pixel,
        );
        metersetmap.scaled_add(delta, &open);
    }

    tracing::debug!(
        control_points = control_points.len(),
        total_mu = sequence.total_mu(),
        "metersetmap accumulated"
    );
    Ok(metersetmap)
}

/// One MU density per gantry angle, each restricted to the control points
/// within `tolerance` degrees of that angle.
///
/// With `allow_missing`, angles that no control point is near produce an
/// all-zero map.
pub fn metersetmaps_by_gantry(
    grid: &Grid,
    sequence: &ControlPointSequence,
    angles: &[f64],
    tolerance: f64,
    allow_missing: bool,
    options: &MetersetOptions,
) -> Result<Vec<Array2<f64>>> {
    sequence
        .split_by_gantry(angles, tolerance, allow_missing)?
        .iter()
        .map(|masked| match masked {
            Some(masked) => calc_metersetmap(grid, masked, options),
            None => Ok(grid.zeros()),
        })
        .collect()
}
