#![allow(dead_code)]
use mesh_field::dataset::composite::composite_from_blocks;
use mesh_field::dataset::handle::points_from_triples;
use mesh_field::prelude::*;
use std::sync::Arc;

/// Point set with `values` stored as per-point array `name` and matching
/// explicit points on the x axis.
pub fn point_set(name: &str, values: Vec<f64>) -> Arc<DataObjectHandle> {
    let ds = DataSetHandle::new(DataSetKind::PointSet);
    let coords: Vec<[f64; 3]> = (0..values.len()).map(|i| [i as f64, 0.0, 0.0]).collect();
    ds.set_points(points_from_triples(&coords));
    ds.attributes(Association::Point)
        .write()
        .insert(NativeArray::new(name, Values::from_vec_f64(values)));
    Arc::new(DataObjectHandle::DataSet(ds))
}

/// Table with one real column per `(name, values)` pair.
pub fn table(columns: &[(&str, Vec<f64>)]) -> Arc<DataObjectHandle> {
    let ds = DataSetHandle::new(DataSetKind::Table);
    for (name, values) in columns {
        ds.attributes(Association::Row)
            .write()
            .insert(NativeArray::new(*name, Values::from_vec_f64(values.clone())));
    }
    Arc::new(DataObjectHandle::DataSet(ds))
}

/// Composite root over `blocks`, `None` slots kept empty.
pub fn composite(blocks: Vec<Option<Arc<DataObjectHandle>>>) -> Arc<DataObjectHandle> {
    composite_from_blocks(blocks)
}

/// Two-block composite of point sets with per-point array `name`.
pub fn two_block(name: &str, a: Vec<f64>, b: Vec<f64>) -> Arc<DataObjectHandle> {
    composite(vec![Some(point_set(name, a)), Some(point_set(name, b))])
}

/// Flatten an adapter array to real values.
pub fn flat(a: &FieldArray) -> Vec<f64> {
    a.to_values().expect("contiguous").iter_real()
}

/// Run `f` on every rank of an in-process `size`-rank group and collect the
/// per-rank results in rank order.
pub fn on_ranks<T, F>(size: usize, f: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(usize, LocalComm) -> T + Send + Sync + 'static,
{
    let f = Arc::new(f);
    let handles: Vec<_> = LocalComm::group(size)
        .into_iter()
        .enumerate()
        .map(|(rank, comm)| {
            let f = f.clone();
            std::thread::spawn(move || f(rank, comm))
        })
        .collect();
    handles
        .into_iter()
        .map(|h| h.join().expect("rank thread"))
        .collect()
}
