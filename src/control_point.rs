use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One instant of a delivery.
///
/// Leaf and jaw positions are in mm and signed so that a positive value
/// retracts the device away from its opposing partner: a leaf pair
/// `[a, b]` leaves `[-a, b]` open, a jaw pair `[a, b]` leaves `[-a, b]`
/// open along the leaf-pair axis with `a` on the leaf-pair-0 side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlPoint {
    /// Cumulative monitor units delivered when this control point is reached.
    pub mu: f64,
    pub gantry: f64,
    pub collimator: f64,
    /// `[bank_a, bank_b]` per leaf pair.
    pub mlc: Vec<[f64; 2]>,
    pub jaw: [f64; 2],
}

impl ControlPoint {
    pub fn new(mu: f64, gantry: f64, collimator: f64, mlc: Vec<[f64; 2]>, jaw: [f64; 2]) -> Self {
        Self {
            mu,
            gantry,
            collimator,
            mlc,
            jaw,
        }
    }

    pub fn leaf_pair_count(&self) -> usize {
        self.mlc.len()
    }

    /// True when the aperture (leaves and jaws) is identical to `other`'s.
    pub fn same_aperture(&self, other: &ControlPoint) -> bool {
        self.mlc == other.mlc && self.jaw == other.jaw
    }

    fn is_finite(&self) -> bool {
        self.mu.is_finite()
            && self.gantry.is_finite()
            && self.collimator.is_finite()
            && self.jaw.iter().all(|v| v.is_finite())
            && self.mlc.iter().flatten().all(|v| v.is_finite())
    }
}

/// Smallest absolute difference between two angles in degrees.
pub fn angle_difference(a: f64, b: f64) -> f64 {
    ((a - b + 180.0).rem_euclid(360.0) - 180.0).abs()
}

/// An ordered, validated sequence of control points.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlPointSequence {
    control_points: Vec<ControlPoint>,
}

impl ControlPointSequence {
    /// Validate and wrap a list of control points.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSequence`] when the list is empty, when leaf
    /// pair counts differ between control points, or when any value is NaN
    /// or infinite.
    pub fn new(control_points: Vec<ControlPoint>) -> Result<Self> {
        let Some(first) = control_points.first() else {
            return Err(Error::InvalidSequence(
                "at least one control point is required".into(),
            ));
        };
        let leaf_pairs = first.leaf_pair_count();
        for (index, control_point) in control_points.iter().enumerate() {
            if control_point.leaf_pair_count() != leaf_pairs {
                return Err(Error::InvalidSequence(format!(
                    "control point {index} has {} leaf pairs, expected {leaf_pairs}",
                    control_point.leaf_pair_count()
                )));
            }
            if !control_point.is_finite() {
                return Err(Error::InvalidSequence(format!(
                    "control point {index} contains a non-finite value"
                )));
            }
        }
        Ok(Self { control_points })
    }

    /// Build a sequence from per-control-point columns, the layout log
    /// decoders and record databases hand over.
    pub fn from_columns(
        mu: &[f64],
        gantry: &[f64],
        collimator: &[f64],
        mlc: &[Vec<[f64; 2]>],
        jaw: &[[f64; 2]],
    ) -> Result<Self> {
        let len = mu.len();
        if [gantry.len(), collimator.len(), mlc.len(), jaw.len()]
            .iter()
            .any(|&other| other != len)
        {
            return Err(Error::InvalidSequence(format!(
                "column lengths differ: mu {len}, gantry {}, collimator {}, mlc {}, jaw {}",
                gantry.len(),
                collimator.len(),
                mlc.len(),
                jaw.len()
            )));
        }
        let control_points = (0..len)
            .map(|i| ControlPoint::new(mu[i], gantry[i], collimator[i], mlc[i].clone(), jaw[i]))
            .collect();
        Self::new(control_points)
    }

    pub fn len(&self) -> usize {
        self.control_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.control_points.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ControlPoint> {
        self.control_points.iter()
    }

    pub fn control_points(&self) -> &[ControlPoint] {
        &self.control_points
    }

    pub fn leaf_pair_count(&self) -> usize {
        self.control_points[0].leaf_pair_count()
    }

    /// MU delivered over the whole sequence.
    pub fn total_mu(&self) -> f64 {
        self.control_points[self.len() - 1].mu - self.control_points[0].mu
    }

    /// Discrete difference of cumulative MU; element `i` is the MU delivered
    /// while moving from control point `i` to `i + 1`.
    pub fn mu_deltas(&self) -> Vec<f64> {
        self.control_points
            .windows(2)
            .map(|pair| pair[1].mu - pair[0].mu)
            .collect()
    }

    /// Drop control points that deliver no MU on either side.
    ///
    /// The MU density of the result is identical to that of `self`.
    pub fn remove_irrelevant_control_points(&self) -> Self {
        let deltas = self.mu_deltas();
        let last = self.len() - 1;
        let kept: Vec<ControlPoint> = self
            .control_points
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let before = *i > 0 && deltas[i - 1] != 0.0;
                let after = *i < last && deltas[*i] != 0.0;
                before || after
            })
            .map(|(_, control_point)| control_point.clone())
            .collect();

        if kept.is_empty() {
            // Nothing is delivered; a lone control point keeps the sequence valid.
            return Self {
                control_points: vec![self.control_points[0].clone()],
            };
        }
        Self {
            control_points: kept,
        }
    }

    fn gantry_mask(&self, angle: f64, tolerance: f64) -> Vec<bool> {
        self.control_points
            .iter()
            .map(|cp| angle_difference(cp.gantry, angle) <= tolerance)
            .collect()
    }

    fn apply_mask(&self, mask: &[bool]) -> Result<Option<Self>> {
        let indices: Vec<usize> = (0..mask.len()).filter(|&i| mask[i]).collect();
        let Some(&first) = indices.first() else {
            return Ok(None);
        };
        if indices.windows(2).any(|pair| pair[1] != pair[0] + 1) {
            return Err(Error::InvalidSequence(
                "control points matching the gantry angle are not contiguous".into(),
            ));
        }

        let baseline = self.control_points[first].mu;
        let control_points = indices
            .iter()
            .map(|&i| {
                let mut control_point = self.control_points[i].clone();
                control_point.mu -= baseline;
                control_point
            })
            .collect();
        Ok(Some(Self { control_points }))
    }

    /// Keep only the control points within `tolerance` degrees of `angle`,
    /// with MU rebased so the first kept control point is zero.
    pub fn mask_by_gantry(&self, angle: f64, tolerance: f64) -> Result<Self> {
        validate_tolerance(tolerance)?;
        let mask = self.gantry_mask(angle, tolerance);
        self.apply_mask(&mask)?
            .ok_or(Error::GantryAngleNotFound(angle))
    }

    /// One masked sequence per requested gantry angle.
    ///
    /// With `allow_missing`, an angle no control point is near yields `None`
    /// instead of an error.
    pub fn split_by_gantry(
        &self,
        angles: &[f64],
        tolerance: f64,
        allow_missing: bool,
    ) -> Result<Vec<Option<Self>>> {
        validate_tolerance(tolerance)?;
        let masks: Vec<Vec<bool>> = angles
            .iter()
            .map(|&angle| self.gantry_mask(angle, tolerance))
            .collect();

        for index in 0..self.len() {
            if masks.iter().filter(|mask| mask[index]).count() > 1 {
                return Err(Error::OverlappingGantryAngles(index));
            }
        }

        angles
            .iter()
            .zip(&masks)
            .map(|(&angle, mask)| match self.apply_mask(mask)? {
                Some(sequence) => Ok(Some(sequence)),
                None if allow_missing => Ok(None),
                None => Err(Error::GantryAngleNotFound(angle)),
            })
            .collect()
    }
}

fn validate_tolerance(tolerance: f64) -> Result<()> {
    if !tolerance.is_finite() || tolerance < 0.0 {
        return Err(Error::InvalidOption {
            name: "gantry_tolerance",
            reason: "must be a non-negative finite number of degrees",
        });
    }
    Ok(())
}

impl<'a> IntoIterator for &'a ControlPointSequence {
    type Item = &'a ControlPoint;
    type IntoIter = std::slice::Iter<'a, ControlPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
