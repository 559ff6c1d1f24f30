use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Grid resolution must be a positive finite number, got {0}")]
    InvalidResolution(f64),

    #[error("Leaf pair widths must not be empty")]
    EmptyLeafPairWidths,

    #[error("Invalid grid configuration: {0}")]
    InvalidGrid(String),

    #[error("Threshold `{name}` must be a positive finite number, got {value}")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("Invalid option `{name}`: {reason}")]
    InvalidOption {
        name: &'static str,
        reason: &'static str,
    },

    #[error("Invalid axis {axis}: {reason}")]
    InvalidAxis { axis: usize, reason: &'static str },

    #[error("Values shape {found:?} does not match axes lengths {expected:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("Reference has {reference} dimensions but evaluation has {evaluation}")]
    DimensionMismatch { reference: usize, evaluation: usize },

    #[error("Invalid input sequence: {0}")]
    InvalidSequence(String),

    #[error("Cumulative MU decreases by {delta} at control point {index}")]
    NonMonotonicMu { index: usize, delta: f64 },

    #[error("No control point within tolerance of gantry angle {0}")]
    GantryAngleNotFound(f64),

    #[error("Gantry angle tolerance windows overlap at control point {0}")]
    OverlappingGantryAngles(usize),

    #[error("No valid comparison points")]
    NoValidPoints,

    #[error(
        "A single evaluation point needs {required} reference samples but the budget allows {budget}"
    )]
    ResourceBudget { required: usize, budget: usize },

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Failures while turning RT Dose and RT Plan objects into datasets and
/// control point sequences.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Missing or unreadable DICOM attribute {0}")]
    MissingAttribute(&'static str),

    #[error("Only axis-aligned dose grids are supported, got orientation {0:?}")]
    UnsupportedOrientation(Vec<f64>),

    #[error("Grid frame offsets must be strictly monotonic")]
    InvalidFrameOffsets,

    #[error("Beam index {index} is out of range for a plan with {count} beams")]
    BeamNotFound { index: usize, count: usize },

    #[error("No meterset found for beam number {0}")]
    MissingBeamMeterset(i32),

    #[error("Invalid leaf/jaw positions: {0}")]
    InvalidLeafJawPositions(String),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("Pixel data error: {0}")]
    PixelData(#[from] dicom::pixeldata::Error),

    #[error(transparent)]
    Core(#[from] Error),
}
