//! Iteration over composite leaves.
//!
//! [`CompositeIter`] walks one composite's non-empty leaves in traversal
//! order, yielding wrapped datasets. [`MultiCompositeIter`] zips several
//! structurally matching composites, pairing leaves by traversal position,
//! which is how read-from-one-write-to-another pipelines walk an input and
//! its structure copy together.

use crate::adapter::wrap::{wrap, Wrapped};
use crate::dataset::DataObjectHandle;
use std::sync::Arc;

/// Iterator over the non-empty leaves of one composite, wrapped.
pub struct CompositeIter {
    leaves: Vec<(usize, Arc<DataObjectHandle>)>,
    pos: usize,
}

impl CompositeIter {
    /// Iterator over `handle`'s leaves; a non-composite handle yields
    /// itself once.
    pub fn new(handle: &Arc<DataObjectHandle>) -> Self {
        let leaves = match handle.as_composite() {
            Some(c) => c.leaves(),
            None => vec![(0, handle.clone())],
        };
        CompositeIter { leaves, pos: 0 }
    }

    /// Flat index of the leaf the iterator will yield next.
    pub fn next_flat_index(&self) -> Option<usize> {
        self.leaves.get(self.pos).map(|(i, _)| *i)
    }
}

impl Iterator for CompositeIter {
    type Item = Wrapped;

    fn next(&mut self) -> Option<Wrapped> {
        let (_, leaf) = self.leaves.get(self.pos)?;
        let wrapped = wrap(leaf);
        self.pos += 1;
        Some(wrapped)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.leaves.len() - self.pos;
        (n, Some(n))
    }
}

impl ExactSizeIterator for CompositeIter {}

/// Zip iterator over several composites of the same structure.
///
/// Stops at the shortest leaf list; pairing is by traversal position, so
/// callers are expected to hand in a dataset and its structure copies.
pub struct MultiCompositeIter {
    leaves: Vec<Vec<Arc<DataObjectHandle>>>,
    pos: usize,
}

impl MultiCompositeIter {
    /// Zip the leaves of `handles`.
    pub fn new(handles: &[Arc<DataObjectHandle>]) -> Self {
        let leaves = handles
            .iter()
            .map(|h| match h.as_composite() {
                Some(c) => c.leaves().into_iter().map(|(_, l)| l).collect(),
                None => vec![h.clone()],
            })
            .collect();
        MultiCompositeIter { leaves, pos: 0 }
    }
}

impl Iterator for MultiCompositeIter {
    type Item = Vec<Wrapped>;

    fn next(&mut self) -> Option<Vec<Wrapped>> {
        if self.leaves.is_empty() {
            return None;
        }
        let mut out = Vec::with_capacity(self.leaves.len());
        for group in &self.leaves {
            out.push(wrap(group.get(self.pos)?));
        }
        self.pos += 1;
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::array::FieldArray;
    use crate::dataset::composite::composite_from_blocks;
    use crate::dataset::handle::points_from_triples;
    use crate::dataset::{Association, DataSetHandle, DataSetKind};

    fn point_leaf(n: usize) -> Arc<DataObjectHandle> {
        let ds = DataSetHandle::new(DataSetKind::PointSet);
        let coords: Vec<[f64; 3]> = (0..n).map(|i| [i as f64, 0.0, 0.0]).collect();
        ds.set_points(points_from_triples(&coords));
        Arc::new(DataObjectHandle::DataSet(ds))
    }

    #[test]
    fn iteration_skips_empty_slots() {
        let root = composite_from_blocks(vec![
            Some(point_leaf(1)),
            None,
            Some(point_leaf(2)),
        ]);
        let mut it = CompositeIter::new(&root);
        assert_eq!(it.len(), 2);
        assert_eq!(it.next_flat_index(), Some(0));
        assert!(it.next().is_some());
        assert_eq!(it.next_flat_index(), Some(2));
        assert!(it.next().is_some());
        assert!(it.next().is_none());
    }

    #[test]
    fn zip_walks_structure_copies_in_step() {
        let src = composite_from_blocks(vec![Some(point_leaf(2)), Some(point_leaf(1))]);
        let dst = Arc::new(DataObjectHandle::Composite(
            src.as_composite().unwrap().copy_structure(),
        ));
        for pair in MultiCompositeIter::new(&[src.clone(), dst.clone()]) {
            let [input, output] = &pair[..] else {
                panic!("two composites zipped");
            };
            output
                .attributes(Association::Point)
                .append(&FieldArray::from(1.0), "one")
                .unwrap();
            assert_eq!(input.handle().as_data_set().unwrap().kind(), DataSetKind::PointSet);
        }
        let copied = dst.as_composite().unwrap().leaves();
        assert_eq!(copied.len(), 2);
        for (_, leaf) in copied {
            assert!(leaf
                .as_data_set()
                .unwrap()
                .attributes(Association::Point)
                .read()
                .get("one")
                .is_some());
        }
    }
}
