use crate::control_point::{ControlPoint, ControlPointSequence};
use crate::error::LoaderError;

use dicom::core::Tag;
use dicom::object::{InMemDicomObject, open_file};
use dicom_dictionary_std::tags;
use std::path::Path;

/// One beam of an RT Plan, ready for MU density accumulation.
#[derive(Debug, Clone, PartialEq)]
pub struct BeamDelivery {
    pub beam_number: i32,
    pub beam_name: Option<String>,
    /// Widths of the MLC leaf pairs in leaf-boundary order, mm.
    pub leaf_pair_widths: Vec<f64>,
    pub control_points: ControlPointSequence,
}

/// Reads beams of RT Plan objects.
///
/// Leaf pairs keep the order of the Leaf Position Boundaries, so leaf pair
/// zero is the one at the most negative boundary. MLC and jaw positions are
/// converted to open distances from the beam axis: `[-A, B]` per leaf pair
/// and `[-Y1, Y2]` for the jaws.
pub struct PlanLoader;

/// Attributes of a single control point as stored; absent ones are
/// inherited from the previous control point.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct StoredControlPoint {
    pub(crate) cumulative_weight: Option<f64>,
    pub(crate) gantry: Option<f64>,
    pub(crate) collimator: Option<f64>,
    pub(crate) mlc: Option<Vec<[f64; 2]>>,
    pub(crate) jaw: Option<[f64; 2]>,
}

impl PlanLoader {
    /// Load the `beam_index`-th beam (zero based) of an RT Plan file
    pub fn load_from_file(
        path: impl AsRef<Path>,
        beam_index: usize,
    ) -> Result<BeamDelivery, LoaderError> {
        let dicom_object = open_file(path.as_ref())?;
        Self::load_from_dicom_object(&dicom_object, beam_index)
    }

    /// Load the `beam_index`-th beam (zero based) of an RT Plan object
    ///
    /// # Errors
    ///
    /// Returns an error if the beam does not exist, it has no MLCX leaf
    /// boundaries or control points, its meterset cannot be found in the
    /// first fraction group, or the resulting control points are invalid.
    pub fn load_from_dicom_object(
        dicom_object: &InMemDicomObject,
        beam_index: usize,
    ) -> Result<BeamDelivery, LoaderError> {
        let beams = items(dicom_object, tags::BEAM_SEQUENCE, "BeamSequence")?;
        let beam = beams.get(beam_index).ok_or(LoaderError::BeamNotFound {
            index: beam_index,
            count: beams.len(),
        })?;

        let beam_number = beam
            .element(tags::BEAM_NUMBER)
            .ok()
            .and_then(|element| element.to_int::<i32>().ok())
            .ok_or(LoaderError::MissingAttribute("BeamNumber"))?;
        let beam_name = beam
            .element(tags::BEAM_NAME)
            .ok()
            .and_then(|element| element.to_str().ok())
            .map(|name| name.trim().to_string());

        let boundaries = Self::leaf_boundaries(beam)?;
        let leaf_pair_widths = leaf_pair_widths(&boundaries)?;
        let beam_meterset = Self::beam_meterset(dicom_object, beam_number)?;
        let final_weight = beam
            .element(tags::FINAL_CUMULATIVE_METERSET_WEIGHT)
            .ok()
            .and_then(|element| element.to_float64().ok());

        let stored = items(beam, tags::CONTROL_POINT_SEQUENCE, "ControlPointSequence")?
            .iter()
            .map(|item| Self::stored_control_point(item, leaf_pair_widths.len()))
            .collect::<Result<Vec<_>, _>>()?;
        let open_jaw = [-boundaries[0], boundaries[boundaries.len() - 1]];
        let control_points =
            resolve_control_points(&stored, beam_meterset, final_weight, open_jaw)?;

        tracing::info!(
            beam_number,
            control_points = control_points.len(),
            leaf_pairs = leaf_pair_widths.len(),
            beam_meterset,
            "loaded RT Plan beam"
        );
        Ok(BeamDelivery {
            beam_number,
            beam_name,
            leaf_pair_widths,
            control_points: ControlPointSequence::new(control_points)?,
        })
    }

    fn leaf_boundaries(beam: &InMemDicomObject) -> Result<Vec<f64>, LoaderError> {
        items(
            beam,
            tags::BEAM_LIMITING_DEVICE_SEQUENCE,
            "BeamLimitingDeviceSequence",
        )?
        .iter()
        .filter(|device| device_type(device).as_deref() == Some("MLCX"))
        .find_map(|device| {
            device
                .element(tags::LEAF_POSITION_BOUNDARIES)
                .ok()?
                .to_multi_float64()
                .ok()
        })
        .ok_or(LoaderError::MissingAttribute("LeafPositionBoundaries"))
    }

    fn beam_meterset(plan: &InMemDicomObject, beam_number: i32) -> Result<f64, LoaderError> {
        let fraction_groups = items(plan, tags::FRACTION_GROUP_SEQUENCE, "FractionGroupSequence")?;
        let referenced = fraction_groups
            .first()
            .ok_or(LoaderError::MissingAttribute("FractionGroupSequence"))?;
        items(
            referenced,
            tags::REFERENCED_BEAM_SEQUENCE,
            "ReferencedBeamSequence",
        )?
        .iter()
        .find(|item| {
            item.element(tags::REFERENCED_BEAM_NUMBER)
                .ok()
                .and_then(|element| element.to_int::<i32>().ok())
                == Some(beam_number)
        })
        .and_then(|item| item.element(tags::BEAM_METERSET).ok()?.to_float64().ok())
        .ok_or(LoaderError::MissingBeamMeterset(beam_number))
    }

    fn stored_control_point(
        item: &InMemDicomObject,
        leaf_pair_count: usize,
    ) -> Result<StoredControlPoint, LoaderError> {
        let float = |tag: Tag| {
            item.element(tag)
                .ok()
                .and_then(|element| element.to_float64().ok())
        };
        let mut stored = StoredControlPoint {
            cumulative_weight: float(tags::CUMULATIVE_METERSET_WEIGHT),
            gantry: float(tags::GANTRY_ANGLE),
            collimator: float(tags::BEAM_LIMITING_DEVICE_ANGLE),
            ..Default::default()
        };

        let Ok(positions) = item.element(tags::BEAM_LIMITING_DEVICE_POSITION_SEQUENCE) else {
            return Ok(stored);
        };
        for device in positions.items().unwrap_or_default() {
            let Some(values) = device
                .element(tags::LEAF_JAW_POSITIONS)
                .ok()
                .and_then(|element| element.to_multi_float64().ok())
            else {
                continue;
            };
            match device_type(device).as_deref() {
                Some("MLCX") => stored.mlc = Some(mlc_from_leaf_positions(&values, leaf_pair_count)?),
                Some("ASYMY" | "Y") => stored.jaw = Some(jaw_from_positions(&values)?),
                _ => {}
            }
        }
        Ok(stored)
    }
}

fn items<'a>(
    dicom_object: &'a InMemDicomObject,
    tag: Tag,
    name: &'static str,
) -> Result<&'a [InMemDicomObject], LoaderError> {
    dicom_object
        .element(tag)
        .ok()
        .and_then(|element| element.items())
        .ok_or(LoaderError::MissingAttribute(name))
}

fn device_type(device: &InMemDicomObject) -> Option<String> {
    device
        .element(tags::RT_BEAM_LIMITING_DEVICE_TYPE)
        .ok()?
        .to_str()
        .ok()
        .map(|value| value.trim().to_string())
}

/// Widths of the leaf pairs between consecutive boundaries.
pub(crate) fn leaf_pair_widths(boundaries: &[f64]) -> Result<Vec<f64>, LoaderError> {
    if boundaries.len() < 2 {
        return Err(LoaderError::MissingAttribute("LeafPositionBoundaries"));
    }
    let widths: Vec<f64> = boundaries.windows(2).map(|pair| pair[1] - pair[0]).collect();
    if widths.iter().any(|width| !(*width > 0.0)) {
        return Err(LoaderError::InvalidLeafJawPositions(
            "leaf position boundaries must be strictly increasing".to_string(),
        ));
    }
    Ok(widths)
}

/// Split MLCX positions (all A-bank leaves, then all B-bank leaves) into
/// per-pair `[-A, B]` open distances.
pub(crate) fn mlc_from_leaf_positions(
    positions: &[f64],
    leaf_pair_count: usize,
) -> Result<Vec<[f64; 2]>, LoaderError> {
    if positions.len() != 2 * leaf_pair_count {
        return Err(LoaderError::InvalidLeafJawPositions(format!(
            "expected {} MLCX positions, found {}",
            2 * leaf_pair_count,
            positions.len()
        )));
    }
    let (bank_a, bank_b) = positions.split_at(leaf_pair_count);
    Ok(bank_a.iter().zip(bank_b).map(|(a, b)| [-a, *b]).collect())
}

pub(crate) fn jaw_from_positions(positions: &[f64]) -> Result<[f64; 2], LoaderError> {
    match positions {
        [y1, y2] => Ok([-y1, *y2]),
        _ => Err(LoaderError::InvalidLeafJawPositions(format!(
            "expected 2 jaw positions, found {}",
            positions.len()
        ))),
    }
}

/// Fill in inherited attributes and convert cumulative meterset weights to
/// cumulative MU.
///
/// The first control point must state its weight, gantry angle and MLC
/// positions. A beam without Y jaws is given `open_jaw`.
pub(crate) fn resolve_control_points(
    stored: &[StoredControlPoint],
    beam_meterset: f64,
    final_weight: Option<f64>,
    open_jaw: [f64; 2],
) -> Result<Vec<ControlPoint>, LoaderError> {
    let final_weight = final_weight
        .or_else(|| stored.iter().rev().find_map(|point| point.cumulative_weight))
        .ok_or(LoaderError::MissingAttribute("CumulativeMetersetWeight"))?;
    if !(final_weight > 0.0) {
        return Err(LoaderError::MissingAttribute("FinalCumulativeMetersetWeight"));
    }

    let mut resolved: Vec<ControlPoint> = Vec::with_capacity(stored.len());
    for point in stored {
        let previous = resolved.last();
        let weight = point
            .cumulative_weight
            .ok_or(LoaderError::MissingAttribute("CumulativeMetersetWeight"))?;
        let gantry = point
            .gantry
            .or(previous.map(|p| p.gantry))
            .ok_or(LoaderError::MissingAttribute("GantryAngle"))?;
        let collimator = point
            .collimator
            .or(previous.map(|p| p.collimator))
            .unwrap_or(0.0);
        let mlc = match (&point.mlc, previous) {
            (Some(mlc), _) => mlc.clone(),
            (None, Some(previous)) => previous.mlc.clone(),
            (None, None) => return Err(LoaderError::MissingAttribute("LeafJawPositions (MLCX)")),
        };
        let jaw = point
            .jaw
            .or(previous.map(|p| p.jaw))
            .unwrap_or(open_jaw);

        resolved.push(ControlPoint::new(
            weight / final_weight * beam_meterset,
            gantry,
            collimator,
            mlc,
            jaw,
        ));
    }
    Ok(resolved)
}
