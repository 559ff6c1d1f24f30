use crate::error::{Error, Result};
use crate::grid::Grid;
use crate::interpolator::{Interpolator, MAX_DIMENSIONS};

use ndarray::{Array2, ArrayD, IxDyn};
use rayon::prelude::*;

/// Values sampled on a rectilinear grid of one to three dimensions.
///
/// Axes are strictly increasing coordinates (mm), one per dimension, in
/// the same order as the dimensions of `values`.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    axes: Vec<Vec<f64>>,
    values: ArrayD<f64>,
    strides: Vec<usize>,
}

impl Dataset {
    /// Validate and wrap axes and values.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when there are not one to three axes,
    /// an axis is empty, non-finite or not strictly increasing, the values'
    /// shape differs from the axes lengths, or a value is not finite.
    pub fn new(axes: Vec<Vec<f64>>, values: ArrayD<f64>) -> Result<Self> {
        if axes.is_empty() || axes.len() > MAX_DIMENSIONS {
            return Err(Error::InvalidOption {
                name: "axes",
                reason: "between one and three axes are supported",
            });
        }
        for (index, axis) in axes.iter().enumerate() {
            Self::validate_axis(index, axis)?;
        }

        let expected: Vec<usize> = axes.iter().map(Vec::len).collect();
        if values.shape() != expected.as_slice() {
            return Err(Error::ShapeMismatch {
                expected,
                found: values.shape().to_vec(),
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidOption {
                name: "values",
                reason: "every value must be finite",
            });
        }

        let values = values.as_standard_layout().into_owned();
        let strides = Self::standard_strides(values.shape());
        Ok(Self {
            axes,
            values,
            strides,
        })
    }

    /// View an MU density map as a dataset over the grid's leaf-pair and
    /// travel axes.
    pub fn from_metersetmap(grid: &Grid, metersetmap: &Array2<f64>) -> Result<Self> {
        Self::new(
            vec![grid.leaf_axis().to_vec(), grid.travel_axis().to_vec()],
            metersetmap.clone().into_dyn(),
        )
    }

    fn validate_axis(index: usize, axis: &[f64]) -> Result<()> {
        if axis.is_empty() {
            return Err(Error::InvalidAxis {
                axis: index,
                reason: "axis is empty",
            });
        }
        if axis.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidAxis {
                axis: index,
                reason: "axis contains a non-finite coordinate",
            });
        }
        if axis.windows(2).any(|pair| pair[1] <= pair[0]) {
            return Err(Error::InvalidAxis {
                axis: index,
                reason: "axis must be strictly increasing",
            });
        }
        Ok(())
    }

    fn standard_strides(shape: &[usize]) -> Vec<usize> {
        let mut strides = vec![1; shape.len()];
        for dim in (0..shape.len().saturating_sub(1)).rev() {
            strides[dim] = strides[dim + 1] * shape[dim + 1];
        }
        strides
    }

    pub fn ndim(&self) -> usize {
        self.axes.len()
    }

    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn axes(&self) -> &[Vec<f64>] {
        &self.axes
    }

    pub fn values(&self) -> &ArrayD<f64> {
        &self.values
    }

    /// Values in row-major order.
    pub(crate) fn values_slice(&self) -> &[f64] {
        self.values
            .as_slice()
            .expect("dataset values are kept in standard layout")
    }

    /// Row-major element strides of `values`.
    pub(crate) fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Largest value.
    pub fn max_value(&self) -> f64 {
        self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Coordinates of the row-major `index`-th value.
    pub(crate) fn coordinates(&self, index: usize) -> [f64; MAX_DIMENSIONS] {
        let mut point = [0.0; MAX_DIMENSIONS];
        let mut remainder = index;
        for (dim, axis) in self.axes.iter().enumerate() {
            let position = remainder / self.strides[dim];
            remainder %= self.strides[dim];
            point[dim] = axis[position];
        }
        point
    }

    /// `(min, max)` coordinate of every axis.
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        self.axes
            .iter()
            .map(|axis| (axis[0], axis[axis.len() - 1]))
            .collect()
    }

    /// Resample onto axes with every interval split into `factor` equal
    /// sub-intervals, interpolating values linearly.
    pub fn resample(&self, factor: usize) -> Result<Self> {
        if factor == 0 {
            return Err(Error::InvalidOption {
                name: "interp_fraction",
                reason: "must be at least one",
            });
        }
        let axes: Vec<Vec<f64>> = self
            .axes
            .iter()
            .map(|axis| Self::refine_axis(axis, factor))
            .collect();
        let shape: Vec<usize> = axes.iter().map(Vec::len).collect();
        let strides = Self::standard_strides(&shape);
        let total: usize = shape.iter().product();

        let values: Vec<f64> = (0..total)
            .into_par_iter()
            .map(|index| {
                let mut point = [0.0; MAX_DIMENSIONS];
                let mut remainder = index;
                for (dim, axis) in axes.iter().enumerate() {
                    point[dim] = axis[remainder / strides[dim]];
                    remainder %= strides[dim];
                }
                Interpolator::linear(self, &point[..axes.len()]).unwrap_or(f64::NAN)
            })
            .collect();

        let values = ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|_| {
            Error::ShapeMismatch {
                expected: shape.clone(),
                found: vec![total],
            }
        })?;
        Self::new(axes, values)
    }

    fn refine_axis(axis: &[f64], factor: usize) -> Vec<f64> {
        let mut refined = Vec::with_capacity((axis.len() - 1) * factor + 1);
        for pair in axis.windows(2) {
            let step = (pair[1] - pair[0]) / factor as f64;
            refined.extend((0..factor).map(|k| pair[0] + k as f64 * step));
        }
        refined.push(axis[axis.len() - 1]);
        refined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array3};

    #[test]
    fn test_rejects_invalid_datasets() {
        let values = Array1::from(vec![1.0, 2.0]).into_dyn();
        assert!(matches!(
            Dataset::new(vec![vec![1.0, 1.0]], values.clone()),
            Err(Error::InvalidAxis { axis: 0, .. })
        ));
        assert!(matches!(
            Dataset::new(vec![vec![0.0, 1.0, 2.0]], values.clone()),
            Err(Error::ShapeMismatch { .. })
        ));
        assert!(matches!(
            Dataset::new(vec![], values.clone()),
            Err(Error::InvalidOption { name: "axes", .. })
        ));
        let nan = Array1::from(vec![1.0, f64::NAN]).into_dyn();
        assert!(matches!(
            Dataset::new(vec![vec![0.0, 1.0]], nan),
            Err(Error::InvalidOption { name: "values", .. })
        ));
    }

    #[test]
    fn test_coordinates_follow_row_major_order() {
        let axes = vec![vec![0.0, 1.0], vec![10.0, 20.0, 30.0], vec![-1.0, 1.0]];
        let dataset = Dataset::new(axes, Array3::zeros((2, 3, 2)).into_dyn()).unwrap();
        assert_eq!(dataset.coordinates(0), [0.0, 10.0, -1.0]);
        assert_eq!(dataset.coordinates(3), [0.0, 20.0, 1.0]);
        assert_eq!(dataset.coordinates(11), [1.0, 30.0, 1.0]);
    }

    #[test]
    fn test_resample_keeps_original_nodes() {
        let dataset = Dataset::new(
            vec![vec![0.0, 1.0, 3.0]],
            Array1::from(vec![0.0, 2.0, 6.0]).into_dyn(),
        )
        .unwrap();
        let fine = dataset.resample(2).unwrap();
        assert_eq!(fine.axes()[0], vec![0.0, 0.5, 1.0, 2.0, 3.0]);
        for (value, expected) in fine.values().iter().zip([0.0, 1.0, 2.0, 4.0, 6.0]) {
            assert_abs_diff_eq!(*value, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_from_metersetmap_uses_grid_axes() {
        let grid = Grid::new(&crate::grid::GridConfig::new(vec![2.0, 2.0]).with_max_leaf_gap(6.0))
            .unwrap();
        let dataset = Dataset::from_metersetmap(&grid, &grid.zeros()).unwrap();
        assert_eq!(dataset.shape(), &[4, 7]);
        assert_eq!(dataset.axes()[0], grid.leaf_axis());
        assert_eq!(dataset.max_value(), 0.0);
    }
}
