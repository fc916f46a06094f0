mod util;
use util::*;

use mesh_field::prelude::*;
use proptest::prelude::*;

fn three_block() -> CompositeArray {
    CompositeArray::from_blocks(vec![
        FieldArray::from(vec![0.0, 1.0, 2.0]),
        FieldArray::None,
        FieldArray::from(vec![3.0, 4.0]),
    ])
}

#[test]
fn integer_index_crosses_block_boundaries() {
    let c = three_block();
    assert_eq!(flat(&c.get(&Index::Int(0)).unwrap()), vec![0.0]);
    assert_eq!(flat(&c.get(&Index::Int(3)).unwrap()), vec![3.0]);
    assert_eq!(flat(&c.get(&Index::Int(-1)).unwrap()), vec![4.0]);
    assert!(matches!(
        c.get(&Index::Int(5)),
        Err(MeshFieldError::IndexOutOfBounds { .. })
    ));
}

#[test]
fn slice_preserves_block_structure() {
    let c = three_block();
    let r = c.get(&Index::Slice(SliceSpec::range(1, 4))).unwrap();
    let rc = r.as_composite().unwrap();
    assert_eq!(rc.num_blocks(), 3);
    assert!(rc.blocks()[1].is_none());
    assert_eq!(flat(&r), vec![1.0, 2.0, 3.0]);
}

#[test]
fn negative_step_reverses_across_blocks() {
    let c = three_block();
    let r = c.get(&Index::Slice(SliceSpec::step_by(-2))).unwrap();
    assert_eq!(flat(&r), vec![4.0, 2.0, 0.0]);
}

#[test]
fn fancy_indexing_preserves_request_order() {
    let c = three_block();
    let r = c.get(&Index::Ints(vec![4, 0, 4, -2])).unwrap();
    assert_eq!(flat(&r), vec![4.0, 0.0, 4.0, 3.0]);
}

#[test]
fn mask_of_derived_comparison_selects_elements() {
    let c = three_block();
    let big = FieldArray::Composite(c.clone()).gt(&FieldArray::from(1.5));
    let Some(mask) = big.as_composite().cloned() else {
        panic!("expected composite mask");
    };
    let r = c.get(&Index::Composite(mask)).unwrap();
    assert_eq!(flat(&r), vec![2.0, 3.0, 4.0]);
}

#[test]
fn wrong_length_mask_is_rejected() {
    let c = three_block();
    let mask = Values::from_vec_f64(vec![1.0, 0.0]).astype(DType::Bool);
    assert!(matches!(
        c.get(&Index::Mask(mask)),
        Err(MeshFieldError::ShapeMismatch { .. })
    ));
}

#[test]
fn mask_assignment_writes_through_blocks() {
    let mut c = three_block();
    let mask = Values::from_vec_f64(vec![0.0, 1.0, 0.0, 1.0, 0.0]).astype(DType::Bool);
    c.set(&Index::Mask(mask), &FieldArray::from(9.0)).unwrap();
    assert_eq!(flat(&FieldArray::Composite(c)), vec![0.0, 9.0, 2.0, 9.0, 4.0]);
}

#[test]
fn assignment_skips_absent_blocks() {
    let mut c = three_block();
    c.set(&Index::Slice(SliceSpec::all()), &FieldArray::from(1.0))
        .unwrap();
    assert!(c.blocks()[1].is_none());
    assert_eq!(flat(&FieldArray::Composite(c)), vec![1.0; 5]);
}

#[test]
fn composite_lookup_is_rebound_per_call() {
    let root = two_block("t", vec![1.0, 2.0], vec![3.0]);
    let Wrapped::Composite(c) = wrap(&root) else {
        panic!("expected composite");
    };
    let arr = c.point_data().lookup("t");
    assert_eq!(arr.len(), 3);
    assert_eq!(arr.shape(), vec![3]);
    // Same wrapper, same values; the binding is fresh each call.
    let again = c.point_data().lookup("t");
    assert_eq!(flat(&again), flat(&arr));
    // An array replaced through a leaf's own view shows up on re-lookup.
    let first = root.as_composite().unwrap().leaves()[0].1.clone();
    let Wrapped::PointSet(leaf) = wrap(&first) else {
        panic!("expected point set");
    };
    leaf.point_data()
        .append(&FieldArray::from(vec![8.0, 9.0]), "t")
        .unwrap();
    assert_eq!(flat(&c.point_data().lookup("t")), vec![8.0, 9.0, 3.0]);
}

#[test]
fn lookup_union_covers_partial_names() {
    let a = point_set("t", vec![1.0]);
    let b = point_set("u", vec![2.0]);
    let root = composite(vec![Some(a), Some(b)]);
    let Wrapped::Composite(c) = wrap(&root) else {
        panic!("expected composite");
    };
    // "t" exists only on the first leaf; the other block is the sentinel.
    let t = c.point_data().lookup("t");
    let tc = t.as_composite().unwrap();
    assert_eq!(tc.num_blocks(), 2);
    assert!(tc.blocks()[1].is_none());
    assert_eq!(flat(&t), vec![1.0]);
    let mut keys = c.point_data().keys();
    keys.sort();
    assert_eq!(keys, vec!["t".to_string(), "u".to_string()]);
}

#[test]
fn tuple_index_reaches_components() {
    let c = CompositeArray::from_blocks(vec![
        FieldArray::from(
            Values::from_shape_vec_f64(&[2, 3], vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap(),
        ),
        FieldArray::from(Values::from_shape_vec_f64(&[1, 3], vec![6.0, 7.0, 8.0]).unwrap()),
    ]);
    assert_eq!(
        flat(&c.get(&Index::Tuple(vec![Index::Int(2), Index::Int(1)])).unwrap()),
        vec![7.0]
    );
    let col = c
        .get(&Index::Tuple(vec![
            Index::Slice(SliceSpec::all()),
            Index::Int(0),
        ]))
        .unwrap();
    assert_eq!(flat(&col), vec![0.0, 3.0, 6.0]);
}

fn reference_slice(data: &[f64], spec: SliceSpec) -> Vec<f64> {
    let len = data.len() as i64;
    let step = spec.step.unwrap_or(1);
    let (lo, hi) = if step > 0 { (0, len) } else { (-1, len - 1) };
    let clamp = |v: i64| (if v < 0 { v + len } else { v }).clamp(lo, hi);
    let start = spec
        .start
        .map(clamp)
        .unwrap_or(if step > 0 { 0 } else { len - 1 });
    let stop = spec
        .stop
        .map(clamp)
        .unwrap_or(if step > 0 { len } else { -1 });
    let mut out = Vec::new();
    let mut k = start;
    while (step > 0 && k < stop) || (step < 0 && k > stop) {
        out.push(data[k as usize]);
        k += step;
    }
    out
}

proptest! {
    #[test]
    fn composite_slicing_matches_flat_slicing(
        split in 0usize..=6,
        data in proptest::collection::vec(-10.0f64..10.0, 0..=6),
        start in proptest::option::of(-8i64..8),
        stop in proptest::option::of(-8i64..8),
        step in proptest::option::of((-3i64..=3).prop_filter("nonzero", |s| *s != 0)),
    ) {
        let split = split.min(data.len());
        let c = CompositeArray::from_blocks(vec![
            FieldArray::from(data[..split].to_vec()),
            FieldArray::from(data[split..].to_vec()),
        ]);
        let spec = SliceSpec { start, stop, step };
        let got = flat(&c.get(&Index::Slice(spec)).unwrap());
        prop_assert_eq!(got, reference_slice(&data, spec));
    }

    #[test]
    fn fancy_indexing_matches_direct_lookup(
        data in proptest::collection::vec(-10.0f64..10.0, 1..=8),
        picks in proptest::collection::vec(0usize..8, 0..=8),
    ) {
        let n = data.len();
        let picks: Vec<i64> = picks.into_iter().map(|p| (p % n) as i64).collect();
        let split = n / 2;
        let c = CompositeArray::from_blocks(vec![
            FieldArray::from(data[..split].to_vec()),
            FieldArray::from(data[split..].to_vec()),
        ]);
        let got = flat(&c.get(&Index::Ints(picks.clone())).unwrap());
        let want: Vec<f64> = picks.iter().map(|&i| data[i as usize]).collect();
        prop_assert_eq!(got, want);
    }
}
