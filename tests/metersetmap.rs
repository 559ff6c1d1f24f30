use approx::assert_abs_diff_eq;
use metersetmap_gamma::{
    ControlPoint, ControlPointSequence, Dataset, Grid, GridCache, GridConfig, MetersetOptions,
    calc_metersetmap,
};
use ndarray::Array2;

fn round2(map: &Array2<f64>) -> Array2<f64> {
    map.mapv(|value| (value * 100.0).round() / 100.0)
}

#[test]
fn moving_leaves_under_asymmetric_jaw() {
    let grid = Grid::new(&GridConfig::new(vec![2.0, 2.0]).with_max_leaf_gap(6.0)).unwrap();
    let sequence = ControlPointSequence::from_columns(
        &[0.0, 1.0],
        &[0.0, 0.0],
        &[0.0, 0.0],
        &[vec![[1.0, 1.0], [2.0, 2.0]], vec![[2.0, 2.0], [3.0, 3.0]]],
        &[[1.5, 1.2], [1.5, 1.2]],
    )
    .unwrap();

    let map = calc_metersetmap(&grid, &sequence, &MetersetOptions::default()).unwrap();
    let expected = ndarray::arr2(&[
        [0.0, 0.07, 0.43, 0.5, 0.43, 0.07, 0.0],
        [0.0, 0.14, 0.86, 1.0, 0.86, 0.14, 0.0],
        [0.14, 0.86, 1.0, 1.0, 1.0, 0.86, 0.14],
        [0.03, 0.17, 0.2, 0.2, 0.2, 0.17, 0.03],
    ]);

    assert_eq!(map.dim(), (4, 7));
    for (value, expected) in round2(&map).iter().zip(expected.iter()) {
        assert_abs_diff_eq!(*value, *expected, epsilon = 1e-9);
    }
}

#[test]
fn reordered_segments_give_the_same_map() {
    let grid = Grid::new(&GridConfig::new(vec![5.0; 4]).with_max_leaf_gap(40.0)).unwrap();
    let narrow = vec![[3.0, 4.0]; 4];
    let wide = vec![[10.0, 12.5]; 4];
    let jaw = [10.0, 10.0];

    let narrow_first = ControlPointSequence::new(vec![
        ControlPoint::new(0.0, 0.0, 0.0, narrow.clone(), jaw),
        ControlPoint::new(1.0, 0.0, 0.0, narrow.clone(), jaw),
        ControlPoint::new(1.0, 0.0, 0.0, wide.clone(), jaw),
        ControlPoint::new(3.0, 0.0, 0.0, wide.clone(), jaw),
    ])
    .unwrap();
    let wide_first = ControlPointSequence::new(vec![
        ControlPoint::new(0.0, 0.0, 0.0, wide.clone(), jaw),
        ControlPoint::new(2.0, 0.0, 0.0, wide, jaw),
        ControlPoint::new(2.0, 0.0, 0.0, narrow.clone(), jaw),
        ControlPoint::new(3.0, 0.0, 0.0, narrow, jaw),
    ])
    .unwrap();

    let options = MetersetOptions::default();
    let a = calc_metersetmap(&grid, &narrow_first, &options).unwrap();
    let b = calc_metersetmap(&grid, &wide_first, &options).unwrap();
    for (a, b) in a.iter().zip(b.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
    }
}

#[test]
fn open_field_covers_the_whole_grid() {
    let config = GridConfig::default();
    let grid = Grid::new(&config).unwrap();

    let total_area = grid.cell_areas().sum();
    assert_abs_diff_eq!(
        total_area,
        2.0 * grid.max_travel() * grid.total_leaf_width(),
        epsilon = 1e-6
    );

    let open = vec![[250.0, 250.0]; grid.leaf_pair_count()];
    let sequence = ControlPointSequence::new(vec![
        ControlPoint::new(0.0, 0.0, 0.0, open.clone(), [250.0, 250.0]),
        ControlPoint::new(2.0, 0.0, 0.0, open, [250.0, 250.0]),
    ])
    .unwrap();
    let map = calc_metersetmap(&grid, &sequence, &MetersetOptions::default()).unwrap();
    for value in map.iter() {
        assert_abs_diff_eq!(*value, 2.0, epsilon = 1e-12);
    }
}

#[test]
fn cached_grids_are_shared() {
    let configs = [
        GridConfig::default(),
        GridConfig::new(vec![2.0, 2.0]).with_max_leaf_gap(6.0),
    ];
    let cache = GridCache::build(&configs).unwrap();
    assert_eq!(cache.len(), 2);

    let grid = cache.get(&configs[1]).unwrap();
    assert_eq!(grid.dim(), (4, 7));
    assert!(cache.get(&GridConfig::new(vec![1.0])).is_none());

    let dataset = Dataset::from_metersetmap(&grid, &grid.zeros()).unwrap();
    assert_eq!(dataset.axes()[1], vec![-3.0, -2.0, -1.0, 0.0, 1.0, 2.0, 3.0]);
}
