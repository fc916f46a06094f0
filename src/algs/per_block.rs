//! Per-block reductions and the block aggregator.
//!
//! Where [`crate::algs::reduction`] folds a composite into one value, the
//! functions here keep one result per block. Blocks are keyed by their flat
//! index in the composite tree, so a block split across ranks (same flat
//! index, data on several ranks) is detected with a presence-count SUM
//! all-reduce and its partial results combined; blocks owned by a single
//! rank keep their local result untouched.
//!
//! [`unstructured_from_composite_arrays`] turns per-block values into an
//! unstructured mesh with one point per block, assigning each shared block
//! to the lowest rank holding it.

use crate::adapter::array::FieldArray;
use crate::adapter::composite::CompositeArray;
use crate::algs::controller::{global_controller, Controller, ReduceOp};
use crate::algs::reduction::{serial_reduce, ReduceSpec, MAX_SPEC, MIN_SPEC, SUM_SPEC};
use crate::dataset::handle::ElementCounts;
use crate::dataset::{Association, DataObjectHandle, DataSetHandle, DataSetKind, NativeArray};
use crate::error::MeshFieldError;
use crate::values::Values;
use std::sync::Arc;

/// Flat tree indices of a composite array's blocks: from the owning dataset
/// when one is attached, positional otherwise.
fn block_ids(c: &CompositeArray) -> Vec<usize> {
    if let Some(ds) = c.dataset() {
        if let Some(comp) = ds.as_composite() {
            let ids: Vec<usize> = comp.leaves().iter().map(|(i, _)| *i).collect();
            if ids.len() == c.num_blocks() {
                return ids;
            }
        }
    }
    (0..c.num_blocks()).collect()
}

fn per_block_local(
    c: &CompositeArray,
    axis: Option<usize>,
    spec: &ReduceSpec,
) -> Result<Vec<FieldArray>, MeshFieldError> {
    c.blocks()
        .iter()
        .map(|b| match b {
            FieldArray::None => Ok(FieldArray::None),
            other => serial_reduce(other, axis, spec),
        })
        .collect()
}

fn per_block_reduce(
    a: &FieldArray,
    axis: Option<usize>,
    controller: Option<&dyn Controller>,
    spec: &ReduceSpec,
) -> Result<FieldArray, MeshFieldError> {
    let FieldArray::Composite(c) = a else {
        // A plain array is one block.
        return serial_reduce(a, axis, spec);
    };
    let mut local = per_block_local(c, axis, spec)?;

    let owned;
    let ctrl: &dyn Controller = match controller {
        Some(c) => c,
        None => {
            owned = global_controller();
            owned.as_ref()
        }
    };
    if !ctrl.is_parallel() {
        return Ok(FieldArray::Composite(c.derived(local)));
    }

    let ids = block_ids(c);
    let max_id = ids.iter().copied().max().map_or(-1, |m| m as i64);
    let flat_count = ctrl.allreduce_i64(&[max_id + 1], ReduceOp::Max)[0].max(0) as usize;
    if flat_count == 0 {
        return Ok(FieldArray::Composite(c.derived(local)));
    }

    // Which blocks have data on more than one rank?
    let mut presence = vec![0i64; flat_count];
    for (pos, &id) in ids.iter().enumerate() {
        if !local[pos].is_none() {
            presence[id] = 1;
        }
    }
    let counts = ctrl.allreduce_i64(&presence, ReduceOp::Sum);
    if !counts.iter().any(|&n| n >= 2) {
        return Ok(FieldArray::Composite(c.derived(local)));
    }

    // Agree on the per-block result size, then exchange one flat buffer
    // holding every shared block's value (defaults where a rank lacks it).
    let local_size = local
        .iter()
        .filter_map(|b| b.as_data().map(|d| d.values().size()))
        .max()
        .unwrap_or(0);
    let size = ctrl.allreduce_i64(&[local_size as i64], ReduceOp::Max)[0] as usize;
    if size == 0 {
        return Ok(FieldArray::Composite(c.derived(local)));
    }
    let mut buffer = vec![spec.default; flat_count * size];
    for (pos, &id) in ids.iter().enumerate() {
        if counts[id] < 2 {
            continue;
        }
        if let Some(d) = local[pos].as_data() {
            let flat = d.values().iter_real();
            buffer[id * size..id * size + flat.len()].copy_from_slice(&flat);
        }
    }
    let reduced = ctrl.allreduce_f64(&buffer, spec.op);

    for (pos, &id) in ids.iter().enumerate() {
        if counts[id] < 2 {
            continue;
        }
        let Some(d) = local[pos].as_data() else { continue };
        let shape = d.shape().to_vec();
        let vals =
            Values::from_vec_f64(reduced[id * size..id * size + d.values().size()].to_vec())
                .reshape(&shape)?;
        let dtype = d.dtype();
        let combined = if spec.coerce_real {
            vals
        } else {
            vals.astype(dtype)
        };
        local[pos] = FieldArray::Data(crate::adapter::array::DataArray::computed(combined, d));
    }
    Ok(FieldArray::Composite(c.derived(local)))
}

/// Per-block sum; one result per block, shared blocks combined across
/// ranks.
///
/// # Errors
/// Propagates kernel failures; see [`crate::algs::reduction::sum`].
pub fn sum_per_block(
    a: &FieldArray,
    axis: Option<usize>,
    controller: Option<&dyn Controller>,
) -> Result<FieldArray, MeshFieldError> {
    per_block_reduce(a, axis, controller, &SUM_SPEC)
}

/// Per-block minimum.
///
/// # Errors
/// Propagates kernel failures; see [`crate::algs::reduction::min`].
pub fn min_per_block(
    a: &FieldArray,
    axis: Option<usize>,
    controller: Option<&dyn Controller>,
) -> Result<FieldArray, MeshFieldError> {
    per_block_reduce(a, axis, controller, &MIN_SPEC)
}

/// Per-block maximum.
///
/// # Errors
/// Propagates kernel failures; see [`crate::algs::reduction::max`].
pub fn max_per_block(
    a: &FieldArray,
    axis: Option<usize>,
    controller: Option<&dyn Controller>,
) -> Result<FieldArray, MeshFieldError> {
    per_block_reduce(a, axis, controller, &MAX_SPEC)
}

/// Per-block element count, summed over ranks for shared blocks.
///
/// # Errors
/// `UnsupportedIndex` for an axis other than `None` or `0`.
pub fn count_per_block(
    a: &FieldArray,
    axis: Option<usize>,
    controller: Option<&dyn Controller>,
) -> Result<FieldArray, MeshFieldError> {
    let FieldArray::Composite(c) = a else {
        return crate::algs::reduction::count(a, axis, controller);
    };
    let counted = c.try_map_blocks(|b| {
        let Some(d) = b.as_data() else {
            return Ok(FieldArray::None);
        };
        let n = match axis {
            None => d.values().size(),
            Some(0) => d.values().leading_len(),
            Some(_) => {
                return Err(MeshFieldError::UnsupportedIndex(
                    "count supports axis 0 only",
                ));
            }
        };
        Ok(FieldArray::from(Values::real_scalar(n as f64)))
    })?;
    per_block_reduce(&FieldArray::Composite(counted), None, controller, &SUM_SPEC)
}

/// Per-block mean: per-block sum over per-block count.
///
/// # Errors
/// See [`sum_per_block`] and [`count_per_block`].
pub fn mean_per_block(
    a: &FieldArray,
    axis: Option<usize>,
    controller: Option<&dyn Controller>,
) -> Result<FieldArray, MeshFieldError> {
    let total = sum_per_block(a, axis, controller)?;
    let n = count_per_block(a, axis, controller)?;
    total.binary(&n, crate::values::BinOp::Div)
}

/// Build an unstructured mesh with one point per block from per-block
/// composite arrays.
///
/// `centroids` supplies the point coordinates (one `(x, y, z)` tuple per
/// block); each `(name, array)` pair contributes one point-data array from
/// its block values. A block held by several ranks is emitted by the lowest
/// rank with data, so the union over ranks has every block exactly once.
///
/// # Errors
/// `ShapeMismatch` when a block's centroid does not reduce to three
/// components.
pub fn unstructured_from_composite_arrays(
    centroids: &CompositeArray,
    arrays: &[(&str, &FieldArray)],
    controller: Option<&dyn Controller>,
) -> Result<Arc<DataObjectHandle>, MeshFieldError> {
    let owned;
    let ctrl: &dyn Controller = match controller {
        Some(c) => c,
        None => {
            owned = global_controller();
            owned.as_ref()
        }
    };
    let ids = block_ids(centroids);
    let blocks = centroids.blocks();

    let owned_blocks: Vec<usize> = if ctrl.is_parallel() {
        let max_id = ids.iter().copied().max().map_or(-1, |m| m as i64);
        let flat_count = ctrl.allreduce_i64(&[max_id + 1], ReduceOp::Max)[0].max(0) as usize;
        let mut claim = vec![i64::MAX; flat_count];
        for (pos, &id) in ids.iter().enumerate() {
            if !blocks[pos].is_none() {
                claim[id] = ctrl.rank() as i64;
            }
        }
        let owner = ctrl.allreduce_i64(&claim, ReduceOp::Min);
        ids.iter()
            .enumerate()
            .filter(|&(pos, &id)| owner[id] == ctrl.rank() as i64 && !blocks[pos].is_none())
            .map(|(pos, _)| pos)
            .collect()
    } else {
        ids.iter()
            .enumerate()
            .filter(|(pos, _)| !blocks[*pos].is_none())
            .map(|(pos, _)| pos)
            .collect()
    };

    let mut coords = Vec::with_capacity(owned_blocks.len() * 3);
    for &pos in &owned_blocks {
        let tuple = blocks[pos].to_values()?.iter_real();
        if tuple.len() < 3 {
            return Err(MeshFieldError::ShapeMismatch {
                left: vec![3],
                right: vec![tuple.len()],
            });
        }
        coords.extend_from_slice(&tuple[..3]);
    }

    let mesh = DataSetHandle::new(DataSetKind::UnstructuredMesh);
    let n = owned_blocks.len();
    mesh.set_points(NativeArray::new(
        "Points",
        Values::from_shape_vec_f64(&[n, 3], coords)?,
    ));
    mesh.set_counts(ElementCounts {
        points: n,
        ..ElementCounts::default()
    });

    for (name, array) in arrays {
        let Some(ca) = array.as_composite() else {
            continue;
        };
        let ab = ca.blocks();
        let comps = ab
            .iter()
            .filter_map(|b| b.as_data().map(|d| d.values().size()))
            .max()
            .unwrap_or(1);
        let mut flat = Vec::with_capacity(n * comps);
        for &pos in &owned_blocks {
            match ab.get(pos).and_then(|b| b.as_data()) {
                Some(d) => {
                    let mut row = d.values().iter_real();
                    row.resize(comps, f64::NAN);
                    flat.extend_from_slice(&row);
                }
                None => flat.extend(std::iter::repeat(f64::NAN).take(comps)),
            }
        }
        let shape: Vec<usize> = if comps == 1 { vec![n] } else { vec![n, comps] };
        mesh.attributes(Association::Point)
            .write()
            .insert(NativeArray::new(*name, Values::from_shape_vec_f64(&shape, flat)?));
    }

    Ok(Arc::new(DataObjectHandle::DataSet(mesh)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::controller::{LocalComm, SelfComm};
    use std::thread;

    fn blocks_of(a: &FieldArray) -> Vec<Option<f64>> {
        a.as_composite()
            .unwrap()
            .blocks()
            .iter()
            .map(|b| b.scalar())
            .collect()
    }

    #[test]
    fn serial_per_block_keeps_structure() {
        let c = FieldArray::Composite(CompositeArray::from_blocks(vec![
            FieldArray::from(vec![1.0, 3.0]),
            FieldArray::None,
            FieldArray::from(vec![10.0]),
        ]));
        let s = sum_per_block(&c, None, Some(&SelfComm)).unwrap();
        assert_eq!(blocks_of(&s), vec![Some(4.0), None, Some(10.0)]);
        let m = max_per_block(&c, None, Some(&SelfComm)).unwrap();
        assert_eq!(blocks_of(&m), vec![Some(3.0), None, Some(10.0)]);
        let n = count_per_block(&c, Some(0), Some(&SelfComm)).unwrap();
        assert_eq!(blocks_of(&n), vec![Some(2.0), None, Some(1.0)]);
    }

    #[test]
    fn per_block_results_flatten_to_one_array() {
        let c = FieldArray::Composite(CompositeArray::from_blocks(vec![
            FieldArray::from(vec![1.0, 3.0]),
            FieldArray::from(vec![10.0]),
        ]));
        let s = sum_per_block(&c, None, Some(&SelfComm)).unwrap();
        assert_eq!(s.to_values().unwrap().iter_real(), vec![4.0, 10.0]);
        let n = count_per_block(&c, None, Some(&SelfComm)).unwrap();
        assert_eq!(n.to_values().unwrap().iter_real(), vec![2.0, 1.0]);
    }

    #[test]
    fn shared_blocks_combine_across_ranks() {
        // Block 0 lives on both ranks, block 1 only on rank 1.
        let group = LocalComm::group(2);
        let handles: Vec<_> = group
            .into_iter()
            .map(|c| {
                thread::spawn(move || {
                    let blocks = if c.rank() == 0 {
                        vec![FieldArray::from(vec![1.0, 2.0]), FieldArray::None]
                    } else {
                        vec![FieldArray::from(vec![4.0]), FieldArray::from(vec![7.0])]
                    };
                    let a = FieldArray::Composite(CompositeArray::from_blocks(blocks));
                    let s = sum_per_block(&a, None, Some(&c)).unwrap();
                    let n = count_per_block(&a, None, Some(&c)).unwrap();
                    let m = mean_per_block(&a, None, Some(&c)).unwrap();
                    (blocks_of(&s), blocks_of(&n), blocks_of(&m))
                })
            })
            .collect();
        let mut results = Vec::new();
        for h in handles {
            results.push(h.join().unwrap());
        }
        for (rank, (s, n, m)) in results.into_iter().enumerate() {
            // Shared block 0 is combined on every rank that has it.
            assert_eq!(s[0], Some(7.0));
            assert_eq!(n[0], Some(3.0));
            assert_eq!(m[0], Some(7.0 / 3.0));
            if rank == 0 {
                assert_eq!(s[1], None);
            } else {
                // Unshared block 1 keeps its local value.
                assert_eq!(s[1], Some(7.0));
                assert_eq!(n[1], Some(1.0));
            }
        }
    }

    #[test]
    fn aggregator_emits_one_point_per_block() {
        let centroids = CompositeArray::from_blocks(vec![
            FieldArray::from(vec![0.0, 0.0, 0.0]),
            FieldArray::None,
            FieldArray::from(vec![1.0, 2.0, 3.0]),
        ]);
        let masses = FieldArray::Composite(CompositeArray::from_blocks(vec![
            FieldArray::from(5.0),
            FieldArray::None,
            FieldArray::from(7.0),
        ]));
        let mesh = unstructured_from_composite_arrays(
            &centroids,
            &[("mass", &masses)],
            Some(&SelfComm),
        )
        .unwrap();
        let ds = mesh.as_data_set().unwrap();
        assert_eq!(ds.number_of_points(), 2);
        let mass = ds
            .attributes(Association::Point)
            .read()
            .get("mass")
            .unwrap()
            .values()
            .clone();
        assert_eq!(mass.iter_real(), vec![5.0, 7.0]);
    }

    #[test]
    fn aggregator_assigns_shared_blocks_to_lowest_rank() {
        let group = LocalComm::group(2);
        let handles: Vec<_> = group
            .into_iter()
            .map(|c| {
                thread::spawn(move || {
                    // Block 0 on both ranks; block 1 only on rank 1.
                    let blocks = if c.rank() == 0 {
                        vec![FieldArray::from(vec![0.0, 0.0, 0.0]), FieldArray::None]
                    } else {
                        vec![
                            FieldArray::from(vec![0.0, 0.0, 0.0]),
                            FieldArray::from(vec![9.0, 0.0, 0.0]),
                        ]
                    };
                    let centroids = CompositeArray::from_blocks(blocks);
                    let mesh =
                        unstructured_from_composite_arrays(&centroids, &[], Some(&c)).unwrap();
                    mesh.as_data_set().unwrap().number_of_points()
                })
            })
            .collect();
        let counts: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        // Rank 0 owns the shared block; rank 1 owns only its private block.
        assert_eq!(counts, vec![1, 1]);
    }
}
