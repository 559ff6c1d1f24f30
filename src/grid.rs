use std::collections::HashMap;
use std::sync::Arc;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const DIVISIBILITY_TOLERANCE: f64 = 1e-9;

/// Collimator geometry and raster pitch from which a [`Grid`] is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Widths of the leaf pairs in mm, ordered from the leaf-pair-0 side.
    pub leaf_pair_widths: Vec<f64>,
    /// Largest opening between two opposing leaves in mm.
    pub max_leaf_gap: f64,
    /// Pitch of the raster in mm along both axes.
    pub grid_resolution: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            leaf_pair_widths: vec![5.0; 80],
            max_leaf_gap: 400.0,
            grid_resolution: 1.0,
        }
    }
}

impl GridConfig {
    pub fn new(leaf_pair_widths: Vec<f64>) -> Self {
        Self {
            leaf_pair_widths,
            ..Default::default()
        }
    }

    pub fn with_max_leaf_gap(mut self, max_leaf_gap: f64) -> Self {
        self.max_leaf_gap = max_leaf_gap;
        self
    }

    pub fn with_grid_resolution(mut self, grid_resolution: f64) -> Self {
        self.grid_resolution = grid_resolution;
        self
    }
}

/// Immutable raster onto which apertures are accumulated.
///
/// Rows run along the leaf-pair axis (ascending from the leaf-pair-0 side),
/// columns along the direction of leaf travel. Every row belongs to exactly
/// one leaf pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    resolution: f64,
    max_travel: f64,
    leaf_pair_widths: Vec<f64>,
    leaf_centres: Vec<f64>,
    leaf_axis: Vec<f64>,
    row_leaf: Vec<usize>,
    travel_axis: Vec<f64>,
}

impl Grid {
    /// Build the grid described by `config`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the resolution is not positive, the
    /// leaf pair widths are empty or not positive, or the resolution does not
    /// divide every leaf pair width and half the maximum leaf gap exactly.
    pub fn new(config: &GridConfig) -> Result<Self> {
        let resolution = config.grid_resolution;
        if !resolution.is_finite() || resolution <= 0.0 {
            return Err(Error::InvalidResolution(resolution));
        }
        if config.leaf_pair_widths.is_empty() {
            return Err(Error::EmptyLeafPairWidths);
        }
        if config
            .leaf_pair_widths
            .iter()
            .any(|width| !width.is_finite() || *width <= 0.0)
        {
            return Err(Error::InvalidGrid(
                "leaf pair widths must be positive and finite".into(),
            ));
        }
        if !config.max_leaf_gap.is_finite() || config.max_leaf_gap <= 0.0 {
            return Err(Error::InvalidGrid(format!(
                "maximum leaf gap must be positive and finite, got {}",
                config.max_leaf_gap
            )));
        }

        let max_travel = config.max_leaf_gap / 2.0;
        let travel_steps = Self::exact_steps(max_travel, resolution).ok_or_else(|| {
            Error::InvalidGrid(format!(
                "grid resolution {resolution} must divide half the maximum leaf gap ({max_travel}) exactly"
            ))
        })?;

        let mut row_leaf = Vec::new();
        for (leaf, &width) in config.leaf_pair_widths.iter().enumerate() {
            let rows = Self::exact_steps(width, resolution).ok_or_else(|| {
                Error::InvalidGrid(format!(
                    "grid resolution {resolution} must divide leaf pair width {width} exactly"
                ))
            })?;
            row_leaf.extend(std::iter::repeat_n(leaf, rows));
        }

        let total_width: f64 = config.leaf_pair_widths.iter().sum();
        let half_width = total_width / 2.0;

        let mut leaf_centres = Vec::with_capacity(config.leaf_pair_widths.len());
        let mut cumulative = 0.0;
        for &width in &config.leaf_pair_widths {
            leaf_centres.push(cumulative + width / 2.0 - half_width);
            cumulative += width;
        }

        let leaf_axis = (0..row_leaf.len())
            .map(|row| -half_width + (row as f64 + 0.5) * resolution)
            .collect();

        let travel_axis = (0..=2 * travel_steps)
            .map(|column| -max_travel + column as f64 * resolution)
            .collect();

        Ok(Self {
            resolution,
            max_travel,
            leaf_pair_widths: config.leaf_pair_widths.clone(),
            leaf_centres,
            leaf_axis,
            row_leaf,
            travel_axis,
        })
    }

    // Number of `step`s in `length`, provided it is a whole number.
    fn exact_steps(length: f64, step: f64) -> Option<usize> {
        let ratio = length / step;
        let rounded = ratio.round();
        let tolerance = DIVISIBILITY_TOLERANCE * rounded.max(1.0);
        ((ratio - rounded).abs() <= tolerance && rounded >= 1.0).then_some(rounded as usize)
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Furthest a leaf may travel from the central axis.
    pub fn max_travel(&self) -> f64 {
        self.max_travel
    }

    pub fn leaf_pair_widths(&self) -> &[f64] {
        &self.leaf_pair_widths
    }

    pub fn leaf_pair_count(&self) -> usize {
        self.leaf_pair_widths.len()
    }

    /// Centre of each leaf pair along the leaf-pair axis.
    pub fn leaf_centres(&self) -> &[f64] {
        &self.leaf_centres
    }

    /// Row centres along the leaf-pair axis.
    pub fn leaf_axis(&self) -> &[f64] {
        &self.leaf_axis
    }

    /// Column centres along the travel axis.
    pub fn travel_axis(&self) -> &[f64] {
        &self.travel_axis
    }

    /// Leaf pair owning each row.
    pub fn row_leaf(&self) -> &[usize] {
        &self.row_leaf
    }

    pub fn total_leaf_width(&self) -> f64 {
        self.leaf_pair_widths.iter().sum()
    }

    /// (rows, columns) of any map on this grid.
    pub fn dim(&self) -> (usize, usize) {
        (self.leaf_axis.len(), self.travel_axis.len())
    }

    pub fn zeros(&self) -> Array2<f64> {
        Array2::zeros(self.dim())
    }

    /// Physical area of every cell, with the outermost travel-axis cells
    /// clipped to `[-max_travel, max_travel]`.
    pub fn cell_areas(&self) -> Array2<f64> {
        let half = self.resolution / 2.0;
        let widths: Vec<f64> = self
            .travel_axis
            .iter()
            .map(|&x| (x + half).min(self.max_travel) - (x - half).max(-self.max_travel))
            .collect();
        Array2::from_shape_fn(self.dim(), |(_, column)| self.resolution * widths[column])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GridKey {
    leaf_pair_widths: Vec<u64>,
    max_leaf_gap: u64,
    grid_resolution: u64,
}

impl From<&GridConfig> for GridKey {
    fn from(config: &GridConfig) -> Self {
        Self {
            leaf_pair_widths: config.leaf_pair_widths.iter().map(|w| w.to_bits()).collect(),
            max_leaf_gap: config.max_leaf_gap.to_bits(),
            grid_resolution: config.grid_resolution.to_bits(),
        }
    }
}

/// Grids built once, up front, and shared by reference afterwards.
///
/// The cache is never mutated after [`GridCache::build`]; lookups for a
/// configuration that was not part of the build return `None`.
#[derive(Debug, Default)]
pub struct GridCache {
    grids: HashMap<GridKey, Arc<Grid>>,
}

impl GridCache {
    pub fn build<'a>(configs: impl IntoIterator<Item = &'a GridConfig>) -> Result<Self> {
        let mut grids = HashMap::new();
        for config in configs {
            let key = GridKey::from(config);
            if !grids.contains_key(&key) {
                grids.insert(key, Arc::new(Grid::new(config)?));
            }
        }
        tracing::debug!(grids = grids.len(), "grid cache built");
        Ok(Self { grids })
    }

    pub fn get(&self, config: &GridConfig) -> Option<Arc<Grid>> {
        self.grids.get(&GridKey::from(config)).cloned()
    }

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }
}
