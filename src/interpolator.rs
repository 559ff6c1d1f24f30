use crate::dataset::Dataset;

pub(crate) const MAX_DIMENSIONS: usize = 3;

pub struct Interpolator;

impl Interpolator {
    /// Lower bracketing index of `position` on an ascending `axis` and the
    /// fractional distance towards the next sample. `None` outside the axis.
    #[inline]
    pub(crate) fn locate(axis: &[f64], position: f64) -> Option<(usize, f64)> {
        let last = axis.len() - 1;
        // Written this way round so that NaN positions are rejected too.
        if !(position >= axis[0] && position <= axis[last]) {
            return None;
        }
        if last == 0 {
            return Some((0, 0.0));
        }
        let index = axis
            .partition_point(|&sample| sample <= position)
            .saturating_sub(1)
            .min(last - 1);
        let fraction = (position - axis[index]) / (axis[index + 1] - axis[index]);
        Some((index, fraction))
    }

    /// Multilinear interpolation of `dataset` at `point`.
    ///
    /// Returns `None` when the point lies outside the dataset's axes. Corners
    /// with zero weight are never read, so a point on a grid node returns
    /// that node's value exactly.
    pub fn linear(dataset: &Dataset, point: &[f64]) -> Option<f64> {
        let dims = dataset.ndim();
        debug_assert_eq!(point.len(), dims);
        let values = dataset.values_slice();
        let strides = dataset.strides();

        let mut base = 0;
        let mut fractions = [0.0; MAX_DIMENSIONS];
        let mut steps = [0; MAX_DIMENSIONS];
        for (dim, axis) in dataset.axes().iter().enumerate() {
            let (index, fraction) = Self::locate(axis, point[dim])?;
            base += index * strides[dim];
            fractions[dim] = fraction;
            steps[dim] = if axis.len() > 1 { strides[dim] } else { 0 };
        }

        let mut result = 0.0;
        for corner in 0..(1usize << dims) {
            let mut weight = 1.0;
            let mut offset = base;
            for dim in 0..dims {
                if corner >> dim & 1 == 1 {
                    weight *= fractions[dim];
                    offset += steps[dim];
                } else {
                    weight *= 1.0 - fractions[dim];
                }
            }
            if weight != 0.0 {
                result = weight.mul_add(values[offset], result);
            }
        }
        Some(result)
    }
}
