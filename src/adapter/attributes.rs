//! Attribute views over one dataset's named arrays.
//!
//! An [`AttributeView`] is the adapter-side face of one attribute container:
//! lookups produce [`FieldArray`]s with full provenance (or the sentinel when
//! the name is absent), and [`AttributeView::append`] stores adapter arrays
//! back as native arrays, normalizing scalars, short arrays and third-order
//! tensors on the way in.

use crate::adapter::array::{DataArray, FieldArray};
use crate::dataset::{Association, DataObjectHandle, NativeArray};
use crate::error::MeshFieldError;
use crate::values::{DType, Values};
use std::sync::Arc;

/// What to do when an append cannot allocate its replicated buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AppendPolicy {
    /// Log the failure and leave the container unchanged.
    #[default]
    LogAndSkip,
    /// Surface the failure to the caller.
    Error,
}

/// Convert a native array into an adapter array with provenance.
///
/// Nine-component arrays are presented as `(n, 3, 3)` third-order tensors
/// with the last two axes swapped, matching the storage orientation rule in
/// [`prepare_for_storage`].
pub(crate) fn native_to_field(
    native: &NativeArray,
    dataset: &Arc<DataObjectHandle>,
    association: Association,
) -> FieldArray {
    let raw = native.values();
    let values = if raw.ndim() == 2 && raw.shape()[1] == 9 {
        let n = raw.shape()[0];
        match raw.reshape(&[n, 3, 3]) {
            Ok(t) => t.transpose_last_two(),
            Err(_) => raw.clone(),
        }
    } else {
        raw.clone()
    };
    FieldArray::Data(DataArray::from_native(
        values,
        dataset,
        association,
        native.clone(),
    ))
}

/// Normalize an adapter buffer for native storage.
///
/// `expected` is the tuple count the association calls for, when known:
/// scalars are filled to that length and shorter arrays are replicated
/// row-wise. `(n, 3, 3)` tensors are re-oriented by their strides so a
/// read-modify-write round trip reproduces the original buffer, then
/// flattened to `(n, 9)`.
///
/// # Errors
/// `AllocationFailed` when the replicated size overflows.
pub(crate) fn prepare_for_storage(
    values: &Values,
    expected: Option<usize>,
) -> Result<Values, MeshFieldError> {
    let mut v = values.clone();

    if let Some(n) = expected {
        if v.ndim() == 0 {
            let total = n;
            let flat: Vec<f64> = std::iter::repeat(v.iter_real()[0]).take(total).collect();
            v = Values::from_shape_vec_f64(&[n], flat)?.astype(v.dtype());
        } else if v.leading_len() != n {
            // Replicate the whole array per tuple.
            let comps = v.size();
            let total = n
                .checked_mul(comps)
                .ok_or(MeshFieldError::AllocationFailed {
                    elements: usize::MAX,
                })?;
            let row = v.iter_real();
            let mut flat = Vec::new();
            flat.try_reserve_exact(total)
                .map_err(|_| MeshFieldError::AllocationFailed { elements: total })?;
            for _ in 0..n {
                flat.extend_from_slice(&row);
            }
            let shape: Vec<usize> = if comps == 1 {
                vec![n]
            } else {
                let mut s = vec![n];
                s.extend_from_slice(v.shape());
                s
            };
            v = Values::from_shape_vec_f64(&shape, flat)?.astype(v.dtype());
        }
    }

    if v.ndim() == 3 {
        let st = v.strides();
        let row_major = st[1] == 3 && st[2] == 1;
        let column_major = st[1] == 1 && st[2] == 3 && !v.is_contiguous();
        if row_major || column_major {
            v = v.transpose_last_two();
        }
    }
    if !v.is_contiguous() {
        v = v.to_contiguous();
    }
    if v.ndim() == 3 {
        let s = v.shape().to_vec();
        v = v.reshape(&[s[0], s[1] * s[2]])?;
    }
    Ok(v)
}

/// View over the attribute container of one association of one dataset.
///
/// For a composite dataset this view reaches the root field-data container
/// (the composite's global data); per-leaf access goes through
/// [`crate::adapter::composite_attributes::CompositeAttributes`].
#[derive(Clone)]
pub struct AttributeView {
    dataset: Arc<DataObjectHandle>,
    association: Association,
    policy: AppendPolicy,
}

impl AttributeView {
    /// View over `dataset`'s arrays for `association`.
    pub fn new(dataset: Arc<DataObjectHandle>, association: Association) -> Self {
        AttributeView {
            dataset,
            association,
            policy: AppendPolicy::default(),
        }
    }

    /// Override the append failure policy.
    pub fn with_policy(mut self, policy: AppendPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Association this view serves.
    #[inline]
    pub fn association(&self) -> Association {
        self.association
    }

    /// The viewed dataset.
    pub fn dataset(&self) -> &Arc<DataObjectHandle> {
        &self.dataset
    }

    fn with_container<R>(&self, f: impl FnOnce(&crate::dataset::AttributeContainer) -> R) -> R {
        match self.dataset.as_ref() {
            DataObjectHandle::DataSet(ds) => f(&ds.attributes(self.association).read()),
            DataObjectHandle::Composite(c) => f(&c.global_data().read()),
        }
    }

    fn with_container_mut<R>(
        &self,
        f: impl FnOnce(&mut crate::dataset::AttributeContainer) -> R,
    ) -> R {
        match self.dataset.as_ref() {
            DataObjectHandle::DataSet(ds) => f(&mut ds.attributes(self.association).write()),
            DataObjectHandle::Composite(c) => f(&mut c.global_data().write()),
        }
    }

    /// Array under `name`, or the sentinel when absent.
    pub fn lookup(&self, name: &str) -> FieldArray {
        self.with_container(|c| match c.get(name) {
            Some(native) => native_to_field(native, &self.dataset, self.association),
            None => FieldArray::None,
        })
    }

    /// Array at insertion position `index`.
    pub fn lookup_index(&self, index: usize) -> FieldArray {
        self.with_container(|c| match c.get_index(index) {
            Some(native) => native_to_field(native, &self.dataset, self.association),
            None => FieldArray::None,
        })
    }

    /// True when an array is stored under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.with_container(|c| c.get(name).is_some())
    }

    /// Array names in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.with_container(|c| c.keys())
    }

    /// Number of stored arrays.
    pub fn len(&self) -> usize {
        self.with_container(|c| c.len())
    }

    /// True when no arrays are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of `(name, array)` pairs in insertion order.
    pub fn iter(&self) -> Vec<(String, FieldArray)> {
        self.keys()
            .into_iter()
            .map(|k| {
                let a = self.lookup(&k);
                (k, a)
            })
            .collect()
    }

    /// Remove the array under `name`.
    pub fn remove(&self, name: &str) -> bool {
        self.with_container_mut(|c| c.remove(name).is_some())
    }

    /// Store `value` under `name`, normalizing it for native storage.
    ///
    /// The sentinel appends nothing. Composite values are concatenated
    /// first. Scalars are filled to the association's tuple count and
    /// shorter arrays replicated per tuple; `(n, 3, 3)` tensors are
    /// re-oriented and flattened to nine components.
    ///
    /// # Errors
    /// `AllocationFailed` under [`AppendPolicy::Error`] when the replicated
    /// buffer cannot be sized; under the default policy the failure is
    /// logged and the container left unchanged. Concatenation failures for
    /// composite values propagate as `ShapeMismatch`.
    pub fn append(&self, value: &FieldArray, name: &str) -> Result<(), MeshFieldError> {
        let values = match value {
            FieldArray::None => return Ok(()),
            FieldArray::Data(d) => d.values().clone(),
            FieldArray::Composite(c) => c.to_values()?,
        };
        let expected = match self.dataset.as_ref() {
            DataObjectHandle::DataSet(ds) => ds.expected_count(self.association),
            DataObjectHandle::Composite(_) => None,
        };
        // A scalar with no known tuple count is stored as a single value.
        let expected = match (expected, values.ndim()) {
            (None, 0) => Some(1),
            (e, _) => e,
        };
        match prepare_for_storage(&values, expected) {
            Ok(stored) => {
                self.with_container_mut(|c| c.insert(NativeArray::new(name, stored)));
                Ok(())
            }
            Err(e @ MeshFieldError::AllocationFailed { .. }) => match self.policy {
                AppendPolicy::LogAndSkip => {
                    log::error!("unable to allocate array {name:?}: {e}");
                    Ok(())
                }
                AppendPolicy::Error => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Shallow-copy every array of `other` into this view's container.
    pub fn pass_data(&self, other: &AttributeView) {
        let arrays: Vec<NativeArray> =
            other.with_container(|c| c.iter().cloned().collect());
        self.with_container_mut(|c| {
            for a in arrays {
                c.insert(a);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::handle::points_from_triples;
    use crate::dataset::{DataSetHandle, DataSetKind};

    fn point_set(n: usize) -> Arc<DataObjectHandle> {
        let ds = DataSetHandle::new(DataSetKind::PointSet);
        let coords: Vec<[f64; 3]> = (0..n).map(|i| [i as f64, 0.0, 0.0]).collect();
        ds.set_points(points_from_triples(&coords));
        Arc::new(DataObjectHandle::DataSet(ds))
    }

    #[test]
    fn lookup_missing_yields_sentinel() {
        let view = AttributeView::new(point_set(2), Association::Point);
        assert!(view.lookup("absent").is_none());
        assert!(!view.contains("absent"));
    }

    #[test]
    fn append_then_lookup_shares_buffer() {
        let view = AttributeView::new(point_set(3), Association::Point);
        view.append(&FieldArray::from(vec![1.0, 2.0, 3.0]), "temp")
            .unwrap();
        let a = view.lookup("temp");
        let d = a.as_data().unwrap();
        assert_eq!(d.native_name().unwrap(), "temp");
        assert!(d.dataset().is_some());
        assert_eq!(view.keys(), vec!["temp".to_string()]);
    }

    #[test]
    fn scalar_append_fills_to_tuple_count() {
        let view = AttributeView::new(point_set(4), Association::Point);
        view.append(&FieldArray::from(7.0), "uniform").unwrap();
        let a = view.lookup("uniform");
        assert_eq!(a.shape(), vec![4]);
        assert_eq!(a.to_values().unwrap().iter_real(), vec![7.0; 4]);
    }

    #[test]
    fn short_array_append_replicates_rows() {
        let view = AttributeView::new(point_set(3), Association::Point);
        view.append(&FieldArray::from(vec![1.0, 2.0]), "pair").unwrap();
        let a = view.lookup("pair");
        assert_eq!(a.shape(), vec![3, 2]);
        assert_eq!(
            a.to_values().unwrap().iter_real(),
            vec![1.0, 2.0, 1.0, 2.0, 1.0, 2.0]
        );
    }

    #[test]
    fn tensor_round_trip_preserves_values() {
        let view = AttributeView::new(point_set(2), Association::Point);
        let t = Values::from_shape_vec_f64(
            &[2, 3, 3],
            (0..18).map(|i| i as f64).collect(),
        )
        .unwrap();
        view.append(&FieldArray::from(t.clone()), "tensor").unwrap();
        // Stored flat as nine components.
        let stored = view
            .dataset()
            .as_data_set()
            .unwrap()
            .attributes(Association::Point)
            .read()
            .get("tensor")
            .unwrap()
            .values()
            .clone();
        assert_eq!(stored.shape(), &[2, 9]);
        // Read back as (2, 3, 3) with the same element values.
        let back = view.lookup("tensor");
        assert_eq!(back.shape(), vec![2, 3, 3]);
        assert_eq!(back.to_values().unwrap().iter_real(), t.iter_real());
    }

    #[test]
    fn append_sentinel_is_noop() {
        let view = AttributeView::new(point_set(2), Association::Point);
        view.append(&FieldArray::None, "ghost").unwrap();
        assert!(view.is_empty());
    }

    #[test]
    fn pass_data_shares_arrays() {
        let src = AttributeView::new(point_set(2), Association::Point);
        src.append(&FieldArray::from(vec![1.0, 2.0]), "t").unwrap();
        let dst = AttributeView::new(point_set(2), Association::Point);
        dst.pass_data(&src);
        assert_eq!(dst.keys(), vec!["t".to_string()]);
    }
}
