mod util;
use util::*;

use mesh_field::algs::{per_block, reduction};
use mesh_field::prelude::*;
use std::sync::Arc;

#[test]
fn serial_reductions_over_composite() {
    let c = FieldArray::Composite(CompositeArray::from_blocks(vec![
        FieldArray::from(vec![1.0, 2.0]),
        FieldArray::None,
        FieldArray::from(vec![3.0]),
    ]));
    assert_eq!(flat(&reduction::sum(&c, None, None).unwrap()), vec![6.0]);
    assert_eq!(flat(&reduction::min(&c, None, None).unwrap()), vec![1.0]);
    assert_eq!(flat(&reduction::max(&c, None, None).unwrap()), vec![3.0]);
    assert_eq!(flat(&reduction::mean(&c, None, None).unwrap()), vec![2.0]);
    assert_eq!(flat(&reduction::count(&c, None, None).unwrap()), vec![3.0]);
}

#[test]
fn reductions_on_sentinel_stay_sentinel() {
    assert!(reduction::sum(&FieldArray::None, None, None).unwrap().is_none());
    assert!(reduction::max(&FieldArray::None, Some(0), None).unwrap().is_none());
    // Count of nothing is still a number.
    assert_eq!(
        flat(&reduction::count(&FieldArray::None, None, None).unwrap()),
        vec![0.0]
    );
}

#[test]
fn axis_semantics_on_vector_arrays() {
    let v = FieldArray::from(
        Values::from_shape_vec_f64(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap(),
    );
    // Per component.
    assert_eq!(
        flat(&reduction::sum(&v, Some(0), None).unwrap()),
        vec![5.0, 7.0, 9.0]
    );
    // Per tuple: local, shape preserved.
    assert_eq!(
        flat(&reduction::sum(&v, Some(1), None).unwrap()),
        vec![6.0, 15.0]
    );
    assert_eq!(
        flat(&reduction::mean(&v, Some(1), None).unwrap()),
        vec![2.0, 5.0]
    );
    assert!(matches!(
        reduction::sum(&v, Some(2), None),
        Err(MeshFieldError::UnsupportedIndex(_))
    ));
}

#[test]
fn global_sum_tolerates_ranks_without_data() {
    let results = on_ranks(3, |rank, comm| {
        let local = match rank {
            0 => FieldArray::from(vec![1.0, 2.0]),
            1 => FieldArray::None,
            _ => FieldArray::from(vec![3.0]),
        };
        flat(&reduction::sum(&local, None, Some(&comm)).unwrap())
    });
    assert_eq!(results, vec![vec![6.0]; 3]);
}

#[test]
fn global_mean_divides_by_global_count() {
    let results = on_ranks(2, |rank, comm| {
        let local = match rank {
            0 => FieldArray::from(vec![2.0, 4.0, 6.0]),
            _ => FieldArray::from(vec![8.0]),
        };
        flat(&reduction::mean(&local, None, Some(&comm)).unwrap())
    });
    assert_eq!(results, vec![vec![5.0]; 2]);
}

#[test]
fn global_per_component_min_over_vectors() {
    let results = on_ranks(2, |rank, comm| {
        let local = match rank {
            0 => FieldArray::from(
                Values::from_shape_vec_f64(&[2, 2], vec![1.0, 8.0, 3.0, 4.0]).unwrap(),
            ),
            _ => FieldArray::from(
                Values::from_shape_vec_f64(&[1, 2], vec![5.0, 2.0]).unwrap(),
            ),
        };
        flat(&reduction::min(&local, Some(0), Some(&comm)).unwrap())
    });
    assert_eq!(results, vec![vec![1.0, 2.0]; 2]);
}

#[test]
fn all_is_boolean_and_global() {
    let results = on_ranks(2, |rank, comm| {
        let local = match rank {
            0 => FieldArray::from(vec![1.0, 1.0]),
            _ => FieldArray::from(vec![0.0]),
        };
        let r = reduction::all(&local, None, Some(&comm)).unwrap();
        (r.as_data().unwrap().dtype(), flat(&r))
    });
    for (dtype, v) in results {
        assert_eq!(dtype, DType::Bool);
        assert_eq!(v, vec![0.0]);
    }
}

#[test]
fn shared_blocks_combine_across_ranks() {
    // Block 1 lives on both ranks; blocks 0 and 2 are rank-private.
    let results = on_ranks(2, |rank, comm| {
        let local = match rank {
            0 => FieldArray::Composite(CompositeArray::from_blocks(vec![
                FieldArray::from(vec![1.0, 2.0]),
                FieldArray::from(vec![3.0]),
                FieldArray::None,
            ])),
            _ => FieldArray::Composite(CompositeArray::from_blocks(vec![
                FieldArray::None,
                FieldArray::from(vec![4.0]),
                FieldArray::from(vec![5.0]),
            ])),
        };
        let sums = per_block::sum_per_block(&local, None, Some(&comm)).unwrap();
        let counts = per_block::count_per_block(&local, None, Some(&comm)).unwrap();
        let means = per_block::mean_per_block(&local, None, Some(&comm)).unwrap();
        (
            sums.as_composite().unwrap().blocks().to_vec(),
            flat(&counts),
            flat(&means),
        )
    });
    for (rank, (sums, counts, means)) in results.into_iter().enumerate() {
        // The shared block agrees on both ranks; private blocks stay local.
        assert_eq!(flat(&sums[1]), vec![7.0]);
        if rank == 0 {
            assert_eq!(flat(&sums[0]), vec![3.0]);
            assert!(sums[2].is_none());
            assert_eq!(counts, vec![2.0, 2.0]);
            assert_eq!(means, vec![1.5, 3.5]);
        } else {
            assert!(sums[0].is_none());
            assert_eq!(flat(&sums[2]), vec![5.0]);
            assert_eq!(counts, vec![2.0, 1.0]);
            assert_eq!(means, vec![3.5, 5.0]);
        }
    }
}

#[test]
fn aggregated_mesh_has_one_point_per_block() {
    let results = on_ranks(2, |rank, comm| {
        // Per-block centroids: block 1 present on both ranks.
        let centroids = match rank {
            0 => CompositeArray::from_blocks(vec![
                FieldArray::from(
                    Values::from_shape_vec_f64(&[1, 3], vec![0.0, 0.0, 0.0]).unwrap(),
                ),
                FieldArray::from(
                    Values::from_shape_vec_f64(&[1, 3], vec![1.0, 0.0, 0.0]).unwrap(),
                ),
            ]),
            _ => CompositeArray::from_blocks(vec![
                FieldArray::None,
                FieldArray::from(
                    Values::from_shape_vec_f64(&[1, 3], vec![1.0, 0.0, 0.0]).unwrap(),
                ),
            ]),
        };
        let avg = match rank {
            0 => FieldArray::Composite(CompositeArray::from_blocks(vec![
                FieldArray::from(vec![10.0]),
                FieldArray::from(vec![20.0]),
            ])),
            _ => FieldArray::Composite(CompositeArray::from_blocks(vec![
                FieldArray::None,
                FieldArray::from(vec![20.0]),
            ])),
        };
        let mesh = per_block::unstructured_from_composite_arrays(
            &centroids,
            &[("avg", &avg)],
            Some(&comm),
        )
        .unwrap();
        let ds = mesh.as_data_set().unwrap();
        (
            ds.number_of_points(),
            ds.attributes(Association::Point)
                .read()
                .get("avg")
                .map(|a| a.values().iter_real()),
        )
    });
    // Rank 0 owns both blocks (lowest rank with data); rank 1 emits none.
    assert_eq!(results[0].0, 2);
    assert_eq!(results[0].1.as_ref().unwrap(), &vec![10.0, 20.0]);
    assert_eq!(results[1].0, 0);
}

#[test]
#[serial_test::serial]
fn default_controller_is_serial_and_swappable() {
    let c = FieldArray::from(vec![1.0, 2.0, 3.0]);
    // No controller argument: the process-wide default applies.
    assert_eq!(flat(&reduction::sum(&c, None, None).unwrap()), vec![6.0]);

    let before = global_controller();
    assert!(!before.is_parallel());
    set_global_controller(Arc::new(SelfComm));
    assert_eq!(global_controller().size(), 1);
    assert_eq!(flat(&reduction::sum(&c, None, None).unwrap()), vec![6.0]);
    set_global_controller(before);
}
