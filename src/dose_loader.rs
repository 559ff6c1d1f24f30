use crate::dataset::Dataset;
use crate::error::LoaderError;

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder},
};
use dicom_dictionary_std::tags;
use ndarray::{Array3, Axis, s};
use std::path::Path;

const IDENTITY_ORIENTATION: [f64; 6] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
const ORIENTATION_TOLERANCE: f64 = 1e-3;

/// Reads RT Dose objects into [`Dataset`]s.
///
/// Multi-frame doses become `(z, y, x)` datasets and single frames `(y, x)`
/// datasets, with coordinates in mm taken from Image Position (Patient),
/// Pixel Spacing and the Grid Frame Offset Vector. Values are the stored
/// pixel values multiplied by Dose Grid Scaling.
pub struct DoseLoader;

impl DoseLoader {
    /// Load an RT Dose file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Dataset, LoaderError> {
        let dicom_object = open_file(path.as_ref())?;
        Self::load_from_dicom_object(&dicom_object)
    }

    /// Load an RT Dose object
    ///
    /// # Errors
    ///
    /// Returns an error if a geometry attribute is missing, the grid is not
    /// axis aligned, or the pixel data cannot be decoded.
    pub fn load_from_dicom_object(
        dicom_object: &FileDicomObject<InMemDicomObject>,
    ) -> Result<Dataset, LoaderError> {
        let position = Self::floats(dicom_object, tags::IMAGE_POSITION_PATIENT, "ImagePositionPatient")?;
        let spacing = Self::floats(dicom_object, tags::PIXEL_SPACING, "PixelSpacing")?;
        if position.len() < 3 || spacing.len() < 2 {
            return Err(LoaderError::MissingAttribute("ImagePositionPatient/PixelSpacing"));
        }
        if let Ok(orientation) = Self::floats(
            dicom_object,
            tags::IMAGE_ORIENTATION_PATIENT,
            "ImageOrientationPatient",
        ) {
            check_orientation(&orientation)?;
        }
        let scaling = dicom_object
            .element(tags::DOSE_GRID_SCALING)
            .ok()
            .and_then(|element| element.to_float64().ok())
            .unwrap_or(1.0);

        let pixel_data = dicom_object.decode_pixel_data()?;
        let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
        let frames: Array3<f64> = pixel_data
            .to_ndarray_with_options::<f64>(&options)?
            .slice_move(s![.., .., .., 0]);
        let (frame_count, rows, columns) = frames.dim();

        let y = axis_from_origin(position[1], spacing[0], rows);
        let x = axis_from_origin(position[0], spacing[1], columns);
        let mut values = frames.mapv(|value| value * scaling);

        let dataset = if frame_count == 1 {
            Dataset::new(vec![y, x], values.index_axis_move(Axis(0), 0).into_dyn())?
        } else {
            let offsets = Self::floats(
                dicom_object,
                tags::GRID_FRAME_OFFSET_VECTOR,
                "GridFrameOffsetVector",
            )?;
            if offsets.len() != frame_count {
                return Err(LoaderError::MissingAttribute("GridFrameOffsetVector"));
            }
            let (z, flipped) = frame_axis(position[2], &offsets)?;
            if flipped {
                values.invert_axis(Axis(0));
            }
            Dataset::new(vec![z, y, x], values.into_dyn())?
        };

        tracing::info!(shape = ?dataset.shape(), scaling, "loaded RT Dose");
        Ok(dataset)
    }

    fn floats(
        dicom_object: &InMemDicomObject,
        tag: dicom::core::Tag,
        name: &'static str,
    ) -> Result<Vec<f64>, LoaderError> {
        dicom_object
            .element(tag)
            .ok()
            .and_then(|element| element.to_multi_float64().ok())
            .ok_or(LoaderError::MissingAttribute(name))
    }
}

/// `count` coordinates starting at `origin`, `spacing` apart.
fn axis_from_origin(origin: f64, spacing: f64, count: usize) -> Vec<f64> {
    (0..count)
        .map(|index| spacing.mul_add(index as f64, origin))
        .collect()
}

fn check_orientation(orientation: &[f64]) -> Result<(), LoaderError> {
    let aligned = orientation.len() == IDENTITY_ORIENTATION.len()
        && orientation
            .iter()
            .zip(IDENTITY_ORIENTATION)
            .all(|(value, expected)| (value - expected).abs() <= ORIENTATION_TOLERANCE);
    if aligned {
        Ok(())
    } else {
        Err(LoaderError::UnsupportedOrientation(orientation.to_vec()))
    }
}

/// Ascending z coordinates of the frames and whether the frame order had to
/// be reversed to get them.
///
/// Offsets starting at zero are relative to `origin_z`, otherwise they are
/// absolute coordinates.
fn frame_axis(origin_z: f64, offsets: &[f64]) -> Result<(Vec<f64>, bool), LoaderError> {
    let relative = offsets.first().is_some_and(|&first| first == 0.0);
    let mut z: Vec<f64> = offsets
        .iter()
        .map(|&offset| if relative { origin_z + offset } else { offset })
        .collect();

    if z.windows(2).all(|pair| pair[1] > pair[0]) {
        Ok((z, false))
    } else if z.windows(2).all(|pair| pair[1] < pair[0]) {
        z.reverse();
        Ok((z, true))
    } else {
        Err(LoaderError::InvalidFrameOffsets)
    }
}
