//! Offsets sampled on the surface of a search shell around an evaluation
//! point.
//!
//! Points are spaced roughly `step` apart along the shell so that finer
//! steps give denser coverage at every radius.

use std::f64::consts::PI;

use crate::interpolator::MAX_DIMENSIONS;

/// Offsets at `distance` from the origin in `dims` dimensions, as
/// `[f64; 3]` with the unused trailing components zero.
pub fn shell_offsets(dims: usize, distance: f64, step: f64) -> Vec<[f64; MAX_DIMENSIONS]> {
    if distance == 0.0 {
        return vec![[0.0; MAX_DIMENSIONS]];
    }
    match dims {
        1 => vec![[-distance, 0.0, 0.0], [distance, 0.0, 0.0]],
        2 => circle(distance, step),
        _ => sphere(distance, step),
    }
}

fn circle(distance: f64, step: f64) -> Vec<[f64; MAX_DIMENSIONS]> {
    let count = (2.0 * PI * distance / step).floor() as usize + 2;
    (0..count)
        .map(|i| {
            let theta = 2.0 * PI * i as f64 / count as f64;
            [distance * theta.cos(), distance * theta.sin(), 0.0]
        })
        .collect()
}

fn sphere(distance: f64, step: f64) -> Vec<[f64; MAX_DIMENSIONS]> {
    let rows = (PI * distance / step).floor() as usize + 2;
    let mut offsets = Vec::new();
    for row in 0..rows {
        let elevation = PI * row as f64 / (rows - 1) as f64;
        let radius = distance * elevation.sin();
        let count = (2.0 * PI * radius / step).floor() as usize + 1;
        let z = distance * elevation.cos();
        offsets.extend((0..count).map(|i| {
            let azimuth = 2.0 * PI * i as f64 / count as f64;
            [radius * azimuth.cos(), radius * azimuth.sin(), z]
        }));
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn norm(offset: &[f64; 3]) -> f64 {
        offset.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    #[test]
    fn test_zero_distance_is_the_origin() {
        for dims in 1..=3 {
            assert_eq!(shell_offsets(dims, 0.0, 0.3), vec![[0.0; 3]]);
        }
    }

    #[test]
    fn test_offsets_lie_on_the_shell() {
        for dims in 1..=3 {
            for offset in shell_offsets(dims, 1.5, 0.3) {
                assert_abs_diff_eq!(norm(&offset), 1.5, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_point_counts() {
        assert_eq!(shell_offsets(1, 2.0, 0.3).len(), 2);
        // floor(2 * pi * 1 / 0.5) + 2
        assert_eq!(shell_offsets(2, 1.0, 0.5).len(), 14);
        // Poles contribute a single point each.
        let sphere = shell_offsets(3, 1.0, 0.5);
        assert_eq!(sphere.first().map(|o| o[2]), Some(1.0));
        assert_abs_diff_eq!(sphere[sphere.len() - 1][2], -1.0, epsilon = 1e-12);
    }
}
