//! Open-fraction rasterization of MLC/jaw apertures.
//!
//! Every cell's value is the fraction of its area left open by the leaves
//! and jaws, computed by exact interval overlap. A moving aperture (a
//! segment between two control points) is sampled at equally spaced
//! instants and the per-instant open fractions are averaged.

use ndarray::{Array2, ArrayViewMut1};

use crate::control_point::ControlPoint;
use crate::grid::Grid;

const MIN_TIME_STEPS: usize = 10;

/// Open fraction of a single, static control point.
pub fn open_fraction(grid: &Grid, control_point: &ControlPoint) -> Array2<f64> {
    segment_open_fraction(grid, control_point, control_point, 1)
}

/// Number of instants at which a segment from `start` to `end` is sampled.
///
/// The device that travels furthest is sampled at least
/// `min_step_per_pixel` times per grid cell it crosses, with a floor of ten
/// samples. A segment whose aperture does not move needs only one.
pub fn time_steps(
    grid: &Grid,
    start: &ControlPoint,
    end: &ControlPoint,
    min_step_per_pixel: usize,
) -> usize {
    if start.same_aperture(end) {
        return 1;
    }
    let leaf_travel = start
        .mlc
        .iter()
        .flatten()
        .zip(end.mlc.iter().flatten())
        .map(|(a, b)| (b - a).abs());
    let jaw_travel = start.jaw.iter().zip(&end.jaw).map(|(a, b)| (b - a).abs());
    let max_travel = leaf_travel.chain(jaw_travel).fold(0.0, f64::max);

    let pixels = (max_travel / grid.resolution()).ceil() as usize;
    (pixels * min_step_per_pixel).max(MIN_TIME_STEPS)
}

/// Mean open fraction while the aperture moves linearly from `start` to `end`.
pub fn segment_open_fraction(
    grid: &Grid,
    start: &ControlPoint,
    end: &ControlPoint,
    min_step_per_pixel: usize,
) -> Array2<f64> {
    debug_assert_eq!(start.leaf_pair_count(), grid.leaf_pair_count());
    debug_assert_eq!(end.leaf_pair_count(), grid.leaf_pair_count());

    let steps = time_steps(grid, start, end, min_step_per_pixel);
    let resolution = grid.resolution();
    let mut open = grid.zeros();
    let mut leaf_intervals = vec![(0.0, 0.0); grid.leaf_pair_count()];

    for step in 0..steps {
        let t = if steps == 1 {
            0.0
        } else {
            step as f64 / (steps - 1) as f64
        };

        for (interval, (from, to)) in leaf_intervals
            .iter_mut()
            .zip(start.mlc.iter().zip(&end.mlc))
        {
            *interval = (-lerp(from[0], to[0], t), lerp(from[1], to[1], t));
        }
        let jaw_lo = -lerp(start.jaw[0], end.jaw[0], t);
        let jaw_hi = lerp(start.jaw[1], end.jaw[1], t);

        for (row, values) in open.outer_iter_mut().enumerate() {
            let weight = overlap_fraction(jaw_lo, jaw_hi, grid.leaf_axis()[row], resolution);
            if weight == 0.0 {
                continue;
            }
            let (lo, hi) = leaf_intervals[grid.row_leaf()[row]];
            accumulate_row(values, grid.travel_axis(), resolution, lo, hi, weight);
        }
    }

    open /= steps as f64;
    open
}

#[inline]
fn lerp(from: f64, to: f64, t: f64) -> f64 {
    (to - from).mul_add(t, from)
}

/// Fraction of the cell `[centre - res/2, centre + res/2]` inside `[lo, hi]`.
#[inline]
pub(crate) fn overlap_fraction(lo: f64, hi: f64, centre: f64, resolution: f64) -> f64 {
    let half = resolution / 2.0;
    ((hi.min(centre + half) - lo.max(centre - half)) / resolution).clamp(0.0, 1.0)
}

fn accumulate_row(
    mut values: ArrayViewMut1<'_, f64>,
    axis: &[f64],
    resolution: f64,
    lo: f64,
    hi: f64,
    weight: f64,
) {
    let half = resolution / 2.0;
    let (first_centre, last_centre) = (axis[0], axis[axis.len() - 1]);
    // Anything beyond the outermost cells cannot be seen by the grid.
    let lo = lo.max(first_centre - half);
    let hi = hi.min(last_centre + half);
    if hi <= lo {
        return;
    }

    let last_column = (axis.len() - 1) as f64;
    let first = ((lo - first_centre) / resolution + 0.5).floor().clamp(0.0, last_column) as usize;
    let last = ((hi - first_centre) / resolution + 0.5).floor().clamp(0.0, last_column) as usize;

    for column in first..=last {
        values[column] += weight * overlap_fraction(lo, hi, axis[column], resolution);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridConfig;
    use approx::assert_abs_diff_eq;

    fn single_leaf_grid() -> Grid {
        Grid::new(&GridConfig::new(vec![1.0]).with_max_leaf_gap(20.0)).unwrap()
    }

    fn leaf(a: f64, b: f64) -> ControlPoint {
        ControlPoint::new(0.0, 0.0, 0.0, vec![[a, b]], [0.5, 0.5])
    }

    #[test]
    fn test_static_leaf_matches_hand_computed_overlap() {
        let grid = single_leaf_grid();
        let open = open_fraction(&grid, &leaf(2.3, 3.1));

        let mut expected = [0.0; 21];
        expected[8] = 0.8;
        expected[9..13].fill(1.0);
        expected[13] = 0.6;
        for (value, expected) in open.row(0).iter().zip(expected) {
            assert_abs_diff_eq!(*value, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_moving_leaf_matches_reference_row() {
        let grid = single_leaf_grid();
        let start = leaf(2.3, 3.1);
        let end = leaf(0.0, 7.7);
        assert_eq!(time_steps(&grid, &start, &end, 10), 50);

        let open = segment_open_fraction(&grid, &start, &end, 10);
        let expected = [
            0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.144367, 0.564, 0.941633, 1.0, 1.0, 0.978776,
            0.798367, 0.585061, 0.372245, 0.159184, 0.006367, 0.0, 0.0,
        ];
        for (value, expected) in open.row(0).iter().zip(expected) {
            assert_abs_diff_eq!(*value, expected, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_closed_leaves_block_everything() {
        let grid = single_leaf_grid();
        assert_eq!(open_fraction(&grid, &leaf(-1.5, 1.5)).sum(), 0.0);
        assert_eq!(open_fraction(&grid, &leaf(-2.0, 1.0)).sum(), 0.0);
    }

    #[test]
    fn test_aperture_wider_than_grid_is_clipped() {
        let grid = single_leaf_grid();
        let open = open_fraction(&grid, &leaf(50.0, 50.0));
        assert!(open.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_jaw_partially_occludes_rows() {
        let grid = Grid::new(&GridConfig::new(vec![2.0, 2.0]).with_max_leaf_gap(6.0)).unwrap();
        let control_point = ControlPoint::new(
            0.0,
            0.0,
            0.0,
            vec![[1.0, 1.0], [1.0, 1.0]],
            [0.25, 1.5],
        );
        let open = open_fraction(&grid, &control_point);
        let centre = grid.travel_axis().len() / 2;
        let column: Vec<f64> = open.column(centre).to_vec();
        assert_eq!(column, vec![0.0, 0.25, 1.0, 0.5]);
    }

    #[test]
    fn test_open_fraction_is_bounded() {
        let grid = single_leaf_grid();
        let open = segment_open_fraction(&grid, &leaf(9.0, -3.0), &leaf(-4.0, 10.0), 10);
        assert!(open.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }
}
