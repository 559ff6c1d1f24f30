//! Gamma index comparison of two datasets.
//!
//! For every evaluation point the reference is searched on shells of
//! growing radius. On each shell the smallest dose difference is combined
//! with the shell radius into
//! `sqrt((dose_difference / dose_criterion)^2 + (radius / distance_criterion)^2)`
//! and the minimum over all shells is kept. A point stops searching once no
//! larger shell can lower its gamma for any threshold pair.

use ndarray::{ArrayD, IxDyn};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rayon::ThreadPool;
use rayon::prelude::*;
use web_time::Instant;

use crate::dataset::Dataset;
use crate::enums::Normalization;
use crate::error::{Error, Result};
use crate::gamma_options::GammaOptions;
use crate::interpolator::{Interpolator, MAX_DIMENSIONS};
use crate::pass_rate::pass_rate;
use crate::shell::shell_offsets;

/// Gamma value of every evaluation point.
///
/// Points that were not compared (below the dose cutoff, outside the random
/// subset, or without any reference sample in reach) hold NaN. Use
/// [`GammaArray::get`] or [`GammaArray::valid`] to read cells without
/// handling the sentinel by hand.
#[derive(Debug, Clone, PartialEq)]
pub struct GammaArray {
    values: ArrayD<f64>,
}

impl GammaArray {
    pub fn values(&self) -> &ArrayD<f64> {
        &self.values
    }

    pub fn into_values(self) -> ArrayD<f64> {
        self.values
    }

    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    /// Gamma at `index`, `None` when the point was excluded.
    pub fn get(&self, index: &[usize]) -> Option<f64> {
        self.values
            .get(IxDyn(index))
            .copied()
            .filter(|value| !value.is_nan())
    }

    /// Gamma of every compared point, in row-major order.
    pub fn valid(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied().filter(|value| !value.is_nan())
    }

    pub fn valid_count(&self) -> usize {
        self.valid().count()
    }

    pub fn pass_rate(&self) -> Result<f64> {
        pass_rate(self)
    }
}

/// One [`GammaArray`] per `(dose_percent_threshold, distance_mm_threshold)`
/// pair, dose-major.
#[derive(Debug, Clone, PartialEq)]
pub struct GammaSweep {
    entries: Vec<((f64, f64), GammaArray)>,
}

impl GammaSweep {
    pub fn get(&self, dose_percent_threshold: f64, distance_mm_threshold: f64) -> Option<&GammaArray> {
        self.entries
            .iter()
            .find(|((dose, distance), _)| {
                *dose == dose_percent_threshold && *distance == distance_mm_threshold
            })
            .map(|(_, gamma)| gamma)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(f64, f64), &GammaArray)> {
        self.entries.iter().map(|(key, gamma)| (key, gamma))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pass rate of every threshold pair.
    pub fn pass_rates(&self) -> Result<Vec<((f64, f64), f64)>> {
        self.entries
            .iter()
            .map(|(key, gamma)| Ok((*key, pass_rate(gamma)?)))
            .collect()
    }
}

impl IntoIterator for GammaSweep {
    type Item = ((f64, f64), GammaArray);
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Compare `evaluation` against `reference` for every threshold pair in
/// `options`.
///
/// # Errors
///
/// Configuration errors are reported before any search starts. Returns
/// [`Error::NoValidPoints`] when no evaluation point passes the lower dose
/// cutoff and [`Error::ResourceBudget`] when a single evaluation point's
/// shell does not fit in the memory budget.
pub fn gamma(reference: &Dataset, evaluation: &Dataset, options: &GammaOptions) -> Result<GammaSweep> {
    let started = Instant::now();
    let search = Search::new(reference, evaluation, options)?;
    tracing::info!(
        normalization = ?options.normalization,
        points = search.points.len(),
        evaluation_points = evaluation.len(),
        dose_thresholds = ?search.dose_percent,
        distance_thresholds = ?search.distance_thresholds,
        "gamma calculation started"
    );

    let executor = Executor::new(options.num_threads)?;
    let gammas = search.run(&executor, options)?;
    let sweep = search.into_sweep(&gammas, options.max_gamma)?;

    tracing::info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        "gamma calculation finished"
    );
    Ok(sweep)
}

/// [`gamma`] for a single dose and distance threshold.
pub fn gamma_single(
    reference: &Dataset,
    evaluation: &Dataset,
    options: &GammaOptions,
) -> Result<GammaArray> {
    if options.dose_thresholds().len() != 1 || options.distance_thresholds().len() != 1 {
        return Err(Error::InvalidOption {
            name: "dose_percent_threshold",
            reason: "a single dose and distance threshold is required",
        });
    }
    let mut sweep = gamma(reference, evaluation, options)?;
    Ok(sweep.entries.remove(0).1)
}

enum Executor {
    Sequential,
    Pool(ThreadPool),
    Global,
}

impl Executor {
    fn new(num_threads: Option<usize>) -> Result<Self> {
        Ok(match num_threads {
            Some(1) => Executor::Sequential,
            Some(threads) => Executor::Pool(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()?,
            ),
            None => Executor::Global,
        })
    }

    fn workers(&self) -> usize {
        match self {
            Executor::Sequential => 1,
            Executor::Pool(pool) => pool.current_num_threads(),
            Executor::Global => rayon::current_num_threads(),
        }
    }

    /// Call `f` on matching chunks of `active` and `out`.
    fn for_each_chunk<F>(&self, active: &[usize], out: &mut [f64], chunk_len: usize, f: F)
    where
        F: Fn(&[usize], &mut [f64]) + Sync,
    {
        let parallel = |out: &mut [f64]| {
            out.par_chunks_mut(chunk_len)
                .zip(active.par_chunks(chunk_len))
                .for_each(|(out, active)| f(active, out));
        };
        match self {
            Executor::Sequential => out
                .chunks_mut(chunk_len)
                .zip(active.chunks(chunk_len))
                .for_each(|(out, active)| f(active, out)),
            Executor::Pool(pool) => pool.install(|| parallel(out)),
            Executor::Global => parallel(out),
        }
    }
}

struct Search<'a> {
    reference: &'a Dataset,
    evaluation: &'a Dataset,
    dose_percent: Vec<f64>,
    distance_thresholds: Vec<f64>,
    /// Row-major indices of the evaluation points being compared.
    points: Vec<usize>,
    /// Denominator of the relative dose difference of every compared point.
    norms: Vec<f64>,
}

impl<'a> Search<'a> {
    fn new(reference: &'a Dataset, evaluation: &'a Dataset, options: &GammaOptions) -> Result<Self> {
        options.validate()?;
        if reference.ndim() != evaluation.ndim() {
            return Err(Error::DimensionMismatch {
                reference: reference.ndim(),
                evaluation: evaluation.ndim(),
            });
        }

        let global_normalisation = options
            .global_normalisation
            .unwrap_or_else(|| reference.max_value());
        if global_normalisation <= 0.0 {
            return Err(Error::InvalidThreshold {
                name: "global_normalisation",
                value: global_normalisation,
            });
        }

        let cutoff = options.lower_percent_dose_cutoff / 100.0 * global_normalisation;
        let values = evaluation.values_slice();
        let mut points: Vec<usize> = (0..values.len())
            .filter(|&index| values[index] >= cutoff)
            .collect();

        if let Some(subset) = options.random_subset {
            let mut rng = ChaCha8Rng::seed_from_u64(subset.seed);
            points.shuffle(&mut rng);
            points.truncate(subset.count);
            points.sort_unstable();
        }

        let dims = evaluation.ndim();
        let (points, norms): (Vec<usize>, Vec<f64>) = points
            .into_iter()
            .filter_map(|index| {
                let norm = match options.normalization {
                    Normalization::Global => global_normalisation,
                    Normalization::Local => {
                        let coordinates = evaluation.coordinates(index);
                        Interpolator::linear(reference, &coordinates[..dims])
                            .filter(|value| *value > 0.0)
                            .unwrap_or(values[index])
                    }
                };
                (norm > 0.0).then_some((index, norm))
            })
            .unzip();

        if points.is_empty() {
            return Err(Error::NoValidPoints);
        }

        Ok(Self {
            reference,
            evaluation,
            dose_percent: options.dose_thresholds(),
            distance_thresholds: options.distance_thresholds(),
            points,
            norms,
        })
    }

    fn pairs(&self) -> usize {
        self.dose_percent.len() * self.distance_thresholds.len()
    }

    /// Largest shell radius that can still reach a reference sample.
    fn domain_diameter(&self) -> f64 {
        self.reference
            .bounds()
            .iter()
            .zip(self.evaluation.bounds())
            .map(|(&(ref_min, ref_max), (eval_min, eval_max))| {
                let span = ref_max.max(eval_max) - ref_min.min(eval_min);
                span * span
            })
            .sum::<f64>()
            .sqrt()
    }

    /// Minimum gamma of every compared point and threshold pair, laid out
    /// point-major then dose-major. Infinite where no reference sample was
    /// reached.
    fn run(&self, executor: &Executor, options: &GammaOptions) -> Result<Vec<f64>> {
        let dims = self.reference.ndim();
        let pairs = self.pairs();
        let min_distance = self
            .distance_thresholds
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
        let max_distance = self.distance_thresholds.iter().copied().fold(0.0, f64::max);
        let step = min_distance / options.interp_fraction as f64;

        let diameter = self.domain_diameter();
        let limit = match options.max_gamma {
            Some(max_gamma) if max_gamma.is_finite() => (max_distance * max_gamma).min(diameter),
            _ => diameter,
        };

        let mut forced = self.distance_thresholds.clone();
        forced.sort_by(f64::total_cmp);
        forced.dedup();
        let mut forced = forced.into_iter().peekable();

        let budget = options.sample_budget(dims);
        if budget < options.max_concurrent_calc_points {
            tracing::warn!(
                budget,
                max_concurrent_calc_points = options.max_concurrent_calc_points,
                "available RAM reduces the number of concurrent reference samples"
            );
        }
        let workers = executor.workers();
        let sequential = Executor::Sequential;

        let mut gammas = vec![f64::INFINITY; self.points.len() * pairs];
        let mut searching = vec![true; self.points.len()];
        let mut distance = 0.0;

        while distance <= limit {
            let active: Vec<usize> = (0..self.points.len()).filter(|&p| searching[p]).collect();
            if active.is_empty() {
                break;
            }

            let offsets = shell_offsets(dims, distance, step);
            if offsets.len() > budget {
                return Err(Error::ResourceBudget {
                    required: offsets.len(),
                    budget,
                });
            }
            // A shell too large to give every worker a chunk runs on the
            // calling thread, one budget-sized chunk at a time.
            let (chunk_len, shell_executor) = if offsets.len() * workers <= budget {
                (budget / (offsets.len() * workers), executor)
            } else {
                (budget / offsets.len(), &sequential)
            };
            tracing::debug!(
                distance,
                active = active.len(),
                shell_points = offsets.len(),
                chunk_len,
                "searching shell"
            );

            let mut min_differences = vec![f64::INFINITY; active.len()];
            shell_executor.for_each_chunk(&active, &mut min_differences, chunk_len, |chunk, out| {
                self.search_chunk(chunk, &offsets, out)
            });

            for (&point, &difference) in active.iter().zip(&min_differences) {
                let current = &mut gammas[point * pairs..(point + 1) * pairs];
                if difference.is_finite() {
                    for (i, dose) in self.dose_percent.iter().enumerate() {
                        for (j, threshold) in self.distance_thresholds.iter().enumerate() {
                            let candidate =
                                (difference / (dose / 100.0)).hypot(distance / threshold);
                            let slot = &mut current[i * self.distance_thresholds.len() + j];
                            *slot = slot.min(candidate);
                        }
                    }
                }
                searching[point] = self.still_searching(current, distance, options.skip_once_passed);
            }

            distance += step;
            if let Some(&next) = forced.peek() {
                if distance >= next {
                    distance = next;
                    forced.next();
                }
            }
        }

        Ok(gammas)
    }

    fn still_searching(&self, current: &[f64], distance: f64, skip_once_passed: bool) -> bool {
        let n_distance = self.distance_thresholds.len();
        current.iter().enumerate().any(|(pair, &value)| {
            let reachable = distance / self.distance_thresholds[pair % n_distance];
            value > reachable && !(skip_once_passed && value < 1.0)
        })
    }

    /// Smallest relative dose difference on the shell around each point of
    /// `chunk`, infinite when the shell misses the reference entirely.
    fn search_chunk(&self, chunk: &[usize], offsets: &[[f64; MAX_DIMENSIONS]], out: &mut [f64]) {
        let dims = self.reference.ndim();
        let values = self.evaluation.values_slice();

        // Every reference sample of the chunk is held at once; the chunk
        // length keeps this within the sample budget.
        let mut samples = Vec::with_capacity(chunk.len() * offsets.len());
        for &point in chunk {
            let centre = self.evaluation.coordinates(self.points[point]);
            for offset in offsets {
                let mut position = [0.0; MAX_DIMENSIONS];
                for dim in 0..dims {
                    position[dim] = centre[dim] + offset[dim];
                }
                samples.push(
                    Interpolator::linear(self.reference, &position[..dims]).unwrap_or(f64::NAN),
                );
            }
        }

        for ((slot, &point), samples) in out
            .iter_mut()
            .zip(chunk)
            .zip(samples.chunks(offsets.len()))
        {
            let value = values[self.points[point]];
            let min_difference = samples
                .iter()
                .filter(|sample| !sample.is_nan())
                .map(|sample| (sample - value).abs())
                .fold(f64::INFINITY, f64::min);
            *slot = min_difference / self.norms[point];
        }
    }

    fn into_sweep(self, gammas: &[f64], max_gamma: Option<f64>) -> Result<GammaSweep> {
        let pairs = self.pairs();
        let shape = self.evaluation.shape().to_vec();
        let mut entries = Vec::with_capacity(pairs);

        for (i, &dose) in self.dose_percent.iter().enumerate() {
            for (j, &distance) in self.distance_thresholds.iter().enumerate() {
                let pair = i * self.distance_thresholds.len() + j;
                let mut flat = vec![f64::NAN; self.evaluation.len()];
                for (point, &index) in self.points.iter().enumerate() {
                    let value = gammas[point * pairs + pair];
                    if value.is_finite() {
                        flat[index] = max_gamma.map_or(value, |cap| value.min(cap));
                    }
                }
                let values = ArrayD::from_shape_vec(IxDyn(&shape), flat).map_err(|_| {
                    Error::ShapeMismatch {
                        expected: shape.clone(),
                        found: vec![self.evaluation.len()],
                    }
                })?;
                entries.push(((dose, distance), GammaArray { values }));
            }
        }
        Ok(GammaSweep { entries })
    }
}
