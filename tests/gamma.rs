use metersetmap_gamma::{
    Dataset, Error, GammaArray, GammaOptions, Normalization, gamma, gamma_single,
};
use ndarray::{Array2, Array3};

fn axis(count: usize, spacing: f64) -> Vec<f64> {
    (0..count).map(|i| i as f64 * spacing).collect()
}

fn gaussian(shift: f64, scale: f64) -> Dataset {
    let y = axis(21, 1.0);
    let x = axis(21, 1.0);
    let values = Array2::from_shape_fn((21, 21), |(i, j)| {
        let dy = y[i] - 10.0;
        let dx = x[j] - 10.0 - shift;
        scale * 100.0 * (-(dx * dx + dy * dy) / 32.0).exp()
    });
    Dataset::new(vec![y, x], values.into_dyn()).unwrap()
}

fn bits(gamma: &GammaArray) -> Vec<u64> {
    gamma.values().iter().map(|value| value.to_bits()).collect()
}

#[test]
fn identical_datasets_have_zero_gamma() {
    let dataset = gaussian(0.0, 1.0);
    for normalization in [Normalization::Global, Normalization::Local] {
        let options = GammaOptions::new(3.0, 3.0, normalization).with_max_gamma(2.0);
        let gamma = gamma_single(&dataset, &dataset, &options).unwrap();
        assert!(gamma.valid_count() > 0);
        assert!(gamma.valid().all(|value| value == 0.0));
        assert_eq!(gamma.pass_rate().unwrap(), 100.0);
    }
}

#[test]
fn identical_volumes_have_zero_gamma() {
    let values = Array3::from_shape_fn((5, 6, 7), |(k, i, j)| (10 + k + i + j) as f64);
    let dataset = Dataset::new(
        vec![axis(5, 2.0), axis(6, 1.5), axis(7, 1.0)],
        values.into_dyn(),
    )
    .unwrap();
    let options = GammaOptions::new(2.0, 2.0, Normalization::Global).with_max_gamma(1.5);
    let gamma = gamma_single(&dataset, &dataset, &options).unwrap();
    assert_eq!(gamma.shape(), &[5, 6, 7]);
    assert!(gamma.valid().all(|value| value == 0.0));
}

#[test]
fn pass_rate_grows_with_thresholds() {
    let reference = gaussian(0.0, 1.0);
    let evaluation = gaussian(1.5, 1.04);
    let doses = [1.0, 2.0, 3.0];
    let distances = [0.5, 1.0, 2.0];
    let options = GammaOptions::new(doses.to_vec(), distances.to_vec(), Normalization::Global)
        .with_lower_percent_dose_cutoff(10.0)
        .with_max_gamma(3.0);
    let sweep = gamma(&reference, &evaluation, &options).unwrap();
    assert_eq!(sweep.len(), 9);

    let rate = |dose: f64, distance: f64| sweep.get(dose, distance).unwrap().pass_rate().unwrap();
    for pair in doses.windows(2) {
        for &distance in &distances {
            assert!(rate(pair[1], distance) >= rate(pair[0], distance));
        }
    }
    for pair in distances.windows(2) {
        for &dose in &doses {
            assert!(rate(dose, pair[1]) >= rate(dose, pair[0]));
        }
    }
    assert!(rate(1.0, 0.5) < 100.0);
}

#[test]
fn results_do_not_depend_on_chunking_or_workers() {
    let reference = gaussian(0.0, 1.0);
    let evaluation = gaussian(0.7, 0.98);
    let options = GammaOptions::new(2.0, 3.0, Normalization::Local).with_max_gamma(2.0);

    let whole = gamma_single(&reference, &evaluation, &options.clone().with_num_threads(1)).unwrap();
    for threads in [1, 2, 4] {
        let chunked = options
            .clone()
            .with_num_threads(threads)
            .with_max_concurrent_calc_points(1000);
        let gamma = gamma_single(&reference, &evaluation, &chunked).unwrap();
        assert_eq!(bits(&gamma), bits(&whole));
    }
    let default_pool = gamma_single(&reference, &evaluation, &options).unwrap();
    assert_eq!(bits(&default_pool), bits(&whole));
}

#[test]
fn seeded_subset_is_reproducible() {
    let reference = gaussian(0.0, 1.0);
    let evaluation = gaussian(0.5, 1.01);
    let options = GammaOptions::new(3.0, 3.0, Normalization::Global)
        .with_max_gamma(2.0)
        .with_random_subset(40, 11);

    let first = gamma_single(&reference, &evaluation, &options.clone().with_num_threads(1)).unwrap();
    let second = gamma_single(&reference, &evaluation, &options.clone().with_num_threads(3)).unwrap();
    assert_eq!(first.valid_count(), 40);
    assert_eq!(bits(&first), bits(&second));

    let other_seed = gamma_single(&reference, &evaluation, &options.with_random_subset(40, 12)).unwrap();
    assert_ne!(bits(&first), bits(&other_seed));
}

#[test]
fn metersetmaps_can_be_compared() {
    use metersetmap_gamma::{ControlPoint, ControlPointSequence, Grid, GridConfig, MetersetOptions, calc_metersetmap};

    let grid = Grid::new(&GridConfig::new(vec![5.0; 6]).with_max_leaf_gap(30.0)).unwrap();
    let delivery = |opening: f64| {
        ControlPointSequence::new(vec![
            ControlPoint::new(0.0, 0.0, 0.0, vec![[opening, opening]; 6], [15.0, 15.0]),
            ControlPoint::new(10.0, 0.0, 0.0, vec![[opening, opening]; 6], [15.0, 15.0]),
        ])
        .unwrap()
    };
    let options = MetersetOptions::default();
    let planned = calc_metersetmap(&grid, &delivery(8.0), &options).unwrap();
    let delivered = calc_metersetmap(&grid, &delivery(8.0), &options).unwrap();

    let reference = Dataset::from_metersetmap(&grid, &planned).unwrap();
    let evaluation = Dataset::from_metersetmap(&grid, &delivered).unwrap();
    let gamma_options = GammaOptions::new(1.0, 1.0, Normalization::Global).with_max_gamma(2.0);
    let gamma = gamma_single(&reference, &evaluation, &gamma_options).unwrap();
    assert_eq!(gamma.pass_rate().unwrap(), 100.0);
}

#[test]
fn options_from_json() {
    let options: GammaOptions = serde_json::from_str(
        r#"{
            "dose_percent_threshold": 3,
            "distance_mm_threshold": [2, 3],
            "normalization": "global",
            "lower_percent_dose_cutoff": 10,
            "max_gamma": 2.0,
            "num_threads": 2
        }"#,
    )
    .unwrap();
    let dataset = gaussian(0.0, 1.0);
    let sweep = gamma(&dataset, &dataset, &options).unwrap();
    assert!(sweep.get(3.0, 2.0).is_some());
    assert!(sweep.get(3.0, 3.0).is_some());
    assert!(sweep.get(2.0, 3.0).is_none());
}

#[test]
fn sweeps_need_the_multi_threshold_entry_point() {
    let dataset = gaussian(0.0, 1.0);
    let options = GammaOptions::new(vec![2.0, 3.0], 3.0, Normalization::Global);
    assert!(matches!(
        gamma_single(&dataset, &dataset, &options),
        Err(Error::InvalidOption { .. })
    ));
}

#[test]
fn tight_budget_does_not_depend_on_workers() {
    let reference = gaussian(0.0, 1.0);
    let evaluation = gaussian(0.7, 0.98);
    let options = GammaOptions::new(2.0, 3.0, Normalization::Global)
        .with_max_gamma(2.0)
        .with_max_concurrent_calc_points(100);

    let single = gamma_single(&reference, &evaluation, &options.clone().with_num_threads(1)).unwrap();
    let pooled = gamma_single(&reference, &evaluation, &options.clone().with_num_threads(4)).unwrap();
    let unbounded = gamma_single(
        &reference,
        &evaluation,
        &options.with_max_concurrent_calc_points(1 << 24),
    )
    .unwrap();
    assert_eq!(bits(&single), bits(&pooled));
    assert_eq!(bits(&single), bits(&unbounded));
}

#[test]
fn available_ram_limits_the_budget_without_changing_results() {
    let reference = gaussian(0.0, 1.0);
    let evaluation = gaussian(0.5, 1.02);
    let options = GammaOptions::new(3.0, 2.0, Normalization::Local)
        .with_max_gamma(2.0)
        .with_num_threads(2);

    // 64 bytes per sample and dimension leaves room for 300 samples in 2D.
    let limited = options.clone().with_ram_available(64 * 2 * 300);
    let limited = gamma_single(&reference, &evaluation, &limited).unwrap();
    let unlimited = gamma_single(&reference, &evaluation, &options).unwrap();
    assert_eq!(bits(&limited), bits(&unlimited));

    let starved = options.with_ram_available(64 * 2);
    assert!(matches!(
        gamma_single(&reference, &evaluation, &starved),
        Err(Error::ResourceBudget { budget: 1, .. })
    ));
}
