//! Attribute views spanning every leaf of a composite dataset.
//!
//! A [`CompositeAttributes`] view presents the union of the per-leaf
//! attribute names for one association. Lookups yield lazily bound
//! [`CompositeArray`]s whose blocks alias native storage; the binding is
//! rebuilt per lookup so a view never outlives the arrays it was built
//! from. Appends distribute blockwise.

use crate::adapter::array::FieldArray;
use crate::adapter::attributes::{AppendPolicy, AttributeView};
use crate::adapter::composite::CompositeArray;
use crate::dataset::{Association, DataObjectHandle};
use crate::error::MeshFieldError;
use itertools::Itertools;
use std::sync::Arc;

/// Union view over one association of every leaf of a composite dataset.
pub struct CompositeAttributes {
    dataset: Arc<DataObjectHandle>,
    association: Association,
}

impl CompositeAttributes {
    /// View over `dataset`'s leaves for `association`.
    pub fn new(dataset: Arc<DataObjectHandle>, association: Association) -> Self {
        CompositeAttributes {
            dataset,
            association,
        }
    }

    /// Association this view serves.
    #[inline]
    pub fn association(&self) -> Association {
        self.association
    }

    fn leaf_views(&self) -> Vec<AttributeView> {
        match self.dataset.as_composite() {
            Some(c) => c
                .leaves()
                .into_iter()
                .filter(|(_, leaf)| match leaf.as_data_set() {
                    Some(ds) => ds.kind().supports(self.association),
                    None => false,
                })
                .map(|(_, leaf)| AttributeView::new(leaf, self.association))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Union of leaf array names, in first-seen traversal order.
    pub fn keys(&self) -> Vec<String> {
        self.leaf_views()
            .iter()
            .flat_map(AttributeView::keys)
            .unique()
            .collect()
    }

    /// True when any leaf stores an array under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.leaf_views().iter().any(|v| v.contains(name))
    }

    /// Number of distinct array names.
    pub fn len(&self) -> usize {
        self.keys().len()
    }

    /// True when no leaf stores any array.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Composite array under `name`, or the sentinel when no leaf has it.
    ///
    /// The binding is rebuilt on every call, so an array stored through a
    /// leaf-level view between two lookups is visible to the second one.
    /// Blocks materialize lazily and alias native storage.
    pub fn lookup(&self, name: &str) -> FieldArray {
        if !self.contains(name) {
            return FieldArray::None;
        }
        FieldArray::Composite(CompositeArray::from_dataset(
            &self.dataset,
            self.association,
            name,
        ))
    }

    /// Snapshot of `(name, array)` pairs.
    pub fn iter(&self) -> Vec<(String, FieldArray)> {
        self.keys()
            .into_iter()
            .map(|k| {
                let a = self.lookup(&k);
                (k, a)
            })
            .collect()
    }

    /// Store `value` under `name` on every leaf.
    ///
    /// A composite value distributes block by block (absent blocks append
    /// nothing to their leaf); any other value is appended to every leaf
    /// unchanged.
    ///
    /// # Errors
    /// `BlockCountMismatch` when a composite value's block count differs
    /// from the number of eligible leaves; per-leaf storage failures
    /// propagate per [`AttributeView::append`].
    pub fn append(&self, value: &FieldArray, name: &str) -> Result<(), MeshFieldError> {
        self.append_with_policy(value, name, AppendPolicy::default())
    }

    /// [`CompositeAttributes::append`] with an explicit failure policy.
    pub fn append_with_policy(
        &self,
        value: &FieldArray,
        name: &str,
        policy: AppendPolicy,
    ) -> Result<(), MeshFieldError> {
        if value.is_none() {
            return Ok(());
        }
        let views = self.leaf_views();
        match value {
            FieldArray::Composite(c) => {
                let blocks = c.blocks();
                if blocks.len() != views.len() {
                    return Err(MeshFieldError::BlockCountMismatch {
                        left: views.len(),
                        right: blocks.len(),
                    });
                }
                for (view, block) in views.iter().zip(blocks.iter()) {
                    view.clone().with_policy(policy).append(block, name)?;
                }
            }
            other => {
                for view in &views {
                    view.clone().with_policy(policy).append(other, name)?;
                }
            }
        }
        Ok(())
    }

    /// Shallow-copy every array of `other` into the matching leaves.
    ///
    /// Leaves are paired by traversal position; structure is expected to
    /// match, surplus leaves on either side are ignored.
    pub fn pass_data(&self, other: &CompositeAttributes) {
        for (dst, src) in self.leaf_views().iter().zip(other.leaf_views().iter()) {
            dst.pass_data(src);
        }
    }
}
