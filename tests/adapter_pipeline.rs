mod util;
use util::*;

use mesh_field::algs::elementwise;
use mesh_field::dataset::ghost;
use mesh_field::prelude::*;

#[test]
fn read_compute_append_round_trip() {
    let handle = point_set("pressure", vec![1.0, 2.0, 3.0]);
    let Wrapped::PointSet(ds) = wrap(&handle) else {
        panic!("expected point set");
    };

    let p = ds.point_data().lookup("pressure");
    // Reads alias native storage until something writes.
    assert_eq!(p.as_data().unwrap().native_name().unwrap(), "pressure");

    let doubled = &(&p * FieldArray::from(2.0)) + FieldArray::from(1.0);
    assert_eq!(flat(&doubled), vec![3.0, 5.0, 7.0]);
    // Computed arrays keep provenance but no native back-reference.
    assert!(doubled.as_data().unwrap().dataset().is_some());
    assert!(doubled.as_data().unwrap().native().is_none());

    ds.point_data().append(&doubled, "doubled").unwrap();
    assert_eq!(flat(&ds.point_data().lookup("doubled")), vec![3.0, 5.0, 7.0]);
    assert_eq!(
        ds.point_data().keys(),
        vec!["pressure".to_string(), "doubled".to_string()]
    );
}

#[test]
fn missing_attribute_never_poisons_a_pipeline() {
    let handle = point_set("pressure", vec![1.0, 2.0]);
    let Wrapped::PointSet(ds) = wrap(&handle) else {
        panic!("expected point set");
    };
    let ghost_levels = ds.point_data().lookup("ghosts");
    assert!(ghost_levels.is_none());

    let masked = &ds.point_data().lookup("pressure") * &ghost_levels;
    assert!(masked.is_none());
    assert!(elementwise::sqrt(&masked).is_none());
    // Appending the sentinel is a no-op, not an error.
    ds.point_data().append(&masked, "masked").unwrap();
    assert!(!ds.point_data().contains("masked"));
}

#[test]
fn scalar_append_broadcast_fills() {
    let handle = point_set("pressure", vec![1.0, 2.0, 3.0]);
    let Wrapped::PointSet(ds) = wrap(&handle) else {
        panic!("expected point set");
    };
    ds.point_data()
        .append(&FieldArray::from(7.5), "uniform")
        .unwrap();
    assert_eq!(flat(&ds.point_data().lookup("uniform")), vec![7.5, 7.5, 7.5]);
}

#[test]
fn table_columns_and_counts() {
    let handle = table(&[("a", vec![1.0, 2.0]), ("b", vec![3.0, 4.0])]);
    let Wrapped::Table(t) = wrap(&handle) else {
        panic!("expected table");
    };
    assert_eq!(t.number_of_rows(), 2);
    assert_eq!(t.number_of_columns(), 2);
    let ratio = &t.row_data().lookup("a") / &t.row_data().lookup("b");
    assert_eq!(flat(&ratio), vec![1.0 / 3.0, 0.5]);
}

#[test]
fn ufunc_catalog_dispatches_by_name() {
    let a = FieldArray::from(vec![1.0, 4.0, 9.0]);
    let r = elementwise::apply_ufunc("sqrt", &a).unwrap();
    assert_eq!(flat(&r), vec![1.0, 2.0, 3.0]);
    assert!(matches!(
        elementwise::apply_ufunc("gradient", &a),
        Err(MeshFieldError::UnsupportedUfunc(_))
    ));
}

#[test]
fn nan_mask_carries_existing_ghosts_forward() {
    let handle = point_set("t", vec![1.0, f64::NAN, 3.0]);
    let Wrapped::PointSet(ds) = wrap(&handle) else {
        panic!("expected point set");
    };
    let existing = FieldArray::from(Values::from_vec_i64(vec![
        ghost::DUPLICATE_POINT as i64,
        0,
        0,
    ]))
    .astype(DType::Byte);
    ds.point_data().append(&existing, "ghost_points").unwrap();

    let mask = elementwise::make_point_mask_from_nans(
        &ds.point_data().lookup("t"),
        &ds.point_data().lookup("ghost_points"),
    )
    .unwrap();
    assert_eq!(mask.as_data().unwrap().dtype(), DType::Byte);
    assert_eq!(
        flat(&mask),
        vec![
            ghost::DUPLICATE_POINT as f64,
            ghost::HIDDEN_POINT as f64,
            0.0
        ]
    );
}

#[test]
fn pass_data_shallow_copies_arrays() {
    let src = point_set("t", vec![1.0, 2.0]);
    let dst = point_set("u", vec![0.0, 0.0]);
    let (Wrapped::PointSet(s), Wrapped::PointSet(d)) = (wrap(&src), wrap(&dst)) else {
        panic!("expected point sets");
    };
    d.point_data().pass_data(&s.point_data());
    assert!(d.point_data().contains("t"));
    assert!(d.point_data().contains("u"));
    assert_eq!(flat(&d.point_data().lookup("t")), vec![1.0, 2.0]);
}
