mod util;
use util::*;

use mesh_field::algs::reduction;
use mesh_field::prelude::*;

#[test]
fn marshalled_dataset_survives_transport() {
    let original = two_block("t", vec![1.0, 2.0], vec![3.0]);
    let envelope = marshal(&original).unwrap();

    // The envelope is what actually crosses a rank boundary.
    let bytes = bincode::serialize(&envelope).unwrap();
    let received: MarshalEnvelope = bincode::deserialize(&bytes).unwrap();

    let restored = unmarshal(&received).unwrap();
    let (Wrapped::Composite(a), Wrapped::Composite(b)) = (wrap(&original), wrap(&restored))
    else {
        panic!("expected composites");
    };
    assert_eq!(b.number_of_points(), a.number_of_points());
    assert_eq!(flat(&b.point_data().lookup("t")), flat(&a.point_data().lookup("t")));
    assert_eq!(
        flat(&reduction::sum(&b.point_data().lookup("t"), None, None).unwrap()),
        vec![6.0]
    );
}

#[test]
fn unmarshalled_buffers_are_independent() {
    let original = point_set("t", vec![1.0, 2.0]);
    let restored = unmarshal(&marshal(&original).unwrap()).unwrap();

    let Wrapped::PointSet(r) = wrap(&restored) else {
        panic!("expected point set");
    };
    r.point_data()
        .append(&FieldArray::from(vec![9.0, 9.0]), "t")
        .unwrap();

    let Wrapped::PointSet(o) = wrap(&original) else {
        panic!("expected point set");
    };
    assert_eq!(flat(&o.point_data().lookup("t")), vec![1.0, 2.0]);
    assert_eq!(flat(&r.point_data().lookup("t")), vec![9.0, 9.0]);
}
