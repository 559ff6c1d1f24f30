//! # MetersetMap and gamma library
//!
//! This crate serves the numerical core of radiotherapy delivery QA: it turns
//! the control points of a treatment beam into an MU density map
//! (MetersetMap) and compares dose or MU density distributions with the
//! gamma index.
//!
//! MU densities are accumulated on a [`Grid`] built from the MLC leaf pair
//! widths. Between consecutive control points the leaves and jaws move
//! linearly; the aperture is sampled along the way and every grid cell
//! receives the delivered MU times the fraction of its area left open.
//! Control points come from any source (plan, machine log, delivery record)
//! as a [`ControlPointSequence`], or from an RT Plan through the
//! [`PlanLoader`].
//!
//! Gamma comparisons work on [`Dataset`]s of one to three dimensions, for
//! example an MU density via [`Dataset::from_metersetmap`] or an RT Dose
//! via the [`DoseLoader`]. The search runs over shells of growing radius,
//! in parallel using rayon when more than one worker is allowed, and stays
//! within a configurable memory budget. Results are bit for bit independent
//! of the number of workers.
//!
//! Positions are in mm, angles in degrees and MU densities in MU per cell.
//! The following conventions are assumed:
//!  - An MLC pair `[a, b]` leaves `[-a, b]` open along the travel axis
//!  - Jaws `[a, b]` leave `[-a, b]` open along the leaf-pair axis
//!  - Grid rows run along the leaf-pair axis starting at leaf pair zero
//!
//! The library logs through `tracing` and never installs a subscriber.
//!
//! # Examples
//!
//! ## Accumulating an MU density
//!
//! ```
//! # use metersetmap_gamma::{ControlPoint, ControlPointSequence, Grid, GridConfig, MetersetOptions, calc_metersetmap};
//! let grid = Grid::new(&GridConfig::new(vec![2.0, 2.0]).with_max_leaf_gap(6.0))
//!     .expect("should have built grid");
//! let sequence = ControlPointSequence::new(vec![
//!     ControlPoint::new(0.0, 0.0, 0.0, vec![[1.0, 1.0], [2.0, 2.0]], [1.5, 1.2]),
//!     ControlPoint::new(1.0, 0.0, 0.0, vec![[2.0, 2.0], [3.0, 3.0]], [1.5, 1.2]),
//! ])
//! .expect("should have accepted control points");
//! let metersetmap = calc_metersetmap(&grid, &sequence, &MetersetOptions::default())
//!     .expect("should have accumulated MU density");
//! assert_eq!(metersetmap.dim(), (4, 7));
//! ```
//!
//! ## Comparing an RT Dose against a reference
//!
//! ```no_run
//! # use metersetmap_gamma::{DoseLoader, GammaOptions, Normalization, gamma};
//! let reference = DoseLoader::load_from_file("reference.dcm").expect("should have loaded dose");
//! let evaluation = DoseLoader::load_from_file("evaluation.dcm").expect("should have loaded dose");
//! let options = GammaOptions::new(vec![2.0, 3.0], 3.0, Normalization::Global).with_max_gamma(2.0);
//! let sweep = gamma(&reference, &evaluation, &options).expect("should have compared doses");
//! for ((dose, distance), pass_rate) in sweep.pass_rates().expect("should have valid points") {
//!     println!("{dose} % / {distance} mm: {pass_rate:.1} %");
//! }
//! ```

pub mod control_point;
pub mod dataset;
pub mod dose_loader;
pub mod enums;
pub mod error;
pub mod gamma;
pub mod gamma_options;
pub mod grid;
mod interpolator;
pub mod metersetmap;
pub mod pass_rate;
pub mod plan_loader;
pub mod rasterizer;
mod shell;

pub use control_point::{ControlPoint, ControlPointSequence, angle_difference};
pub use dataset::Dataset;
pub use dose_loader::DoseLoader;
pub use enums::{NegativeMuPolicy, Normalization, Thresholds};
pub use error::{Error, LoaderError, Result};
pub use gamma::{GammaArray, GammaSweep, gamma, gamma_single};
pub use gamma_options::{GammaOptions, RandomSubset};
pub use grid::{Grid, GridCache, GridConfig};
pub use interpolator::Interpolator;
pub use metersetmap::{MetersetOptions, calc_metersetmap, metersetmaps_by_gantry};
pub use pass_rate::pass_rate;
pub use plan_loader::{BeamDelivery, PlanLoader};
