//! Composite block tree.
//!
//! A composite dataset is an ordered tree of blocks, each either empty, a
//! leaf dataset or a nested composite. Blocks carry stable *flat indices*
//! assigned in pre-order over every slot (empty slots consume an index, as do
//! nested composite slots); the per-block reduction engine keys its
//! cross-rank exchanges on these indices.

use crate::dataset::attributes::AttributeContainer;
use crate::dataset::handle::{DataObjectHandle, DataSetHandle, DataSetKind};
use parking_lot::RwLock;
use std::sync::Arc;

/// A tree of dataset blocks with a field-data container at the root
/// (the composite's "global data").
#[derive(Debug, Default)]
pub struct CompositeHandle {
    blocks: RwLock<Vec<Option<Arc<DataObjectHandle>>>>,
    field_data: RwLock<AttributeContainer>,
}

impl CompositeHandle {
    /// Empty composite.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of top-level block slots.
    pub fn num_blocks(&self) -> usize {
        self.blocks.read().len()
    }

    /// The block in slot `i`, if present.
    pub fn block(&self, i: usize) -> Option<Arc<DataObjectHandle>> {
        self.blocks.read().get(i).cloned().flatten()
    }

    /// Store `block` in slot `i`, growing the slot vector as needed.
    pub fn set_block(&self, i: usize, block: Option<Arc<DataObjectHandle>>) {
        let mut blocks = self.blocks.write();
        if blocks.len() <= i {
            blocks.resize(i + 1, None);
        }
        blocks[i] = block;
    }

    /// Root field-data container (global data).
    pub fn global_data(&self) -> &RwLock<AttributeContainer> {
        &self.field_data
    }

    /// Non-empty leaf datasets with their flat indices, in traversal order.
    pub fn leaves(&self) -> Vec<(usize, Arc<DataObjectHandle>)> {
        let mut out = Vec::new();
        let mut next = 0usize;
        self.collect_leaves(&mut next, &mut out);
        out
    }

    fn collect_leaves(&self, next: &mut usize, out: &mut Vec<(usize, Arc<DataObjectHandle>)>) {
        for slot in self.blocks.read().iter() {
            let flat = *next;
            *next += 1;
            match slot {
                None => {}
                Some(obj) => match obj.as_ref() {
                    DataObjectHandle::DataSet(_) => out.push((flat, obj.clone())),
                    DataObjectHandle::Composite(c) => c.collect_leaves(next, out),
                },
            }
        }
    }

    /// Flat index one past the last slot of the tree.
    pub fn flat_len(&self) -> usize {
        let mut next = 0usize;
        let mut out = Vec::new();
        self.collect_leaves(&mut next, &mut out);
        next
    }

    /// Same tree shape with fresh empty datasets of matching kinds.
    ///
    /// This is the "copy structure" step multi-composite pipelines rely on:
    /// iterate the source and the copy together, reading from one and
    /// writing to the other.
    pub fn copy_structure(&self) -> CompositeHandle {
        let out = CompositeHandle::new();
        {
            let blocks = self.blocks.read();
            let mut target = out.blocks.write();
            for slot in blocks.iter() {
                target.push(match slot {
                    None => None,
                    Some(obj) => Some(Arc::new(match obj.as_ref() {
                        DataObjectHandle::DataSet(ds) => {
                            DataObjectHandle::DataSet(DataSetHandle::new(ds.kind()))
                        }
                        DataObjectHandle::Composite(c) => {
                            DataObjectHandle::Composite(c.copy_structure())
                        }
                    })),
                });
            }
        }
        out
    }
}

/// Convenience: a flat composite from leaf datasets, `None` for empty slots.
pub fn composite_from_blocks(
    blocks: Vec<Option<Arc<DataObjectHandle>>>,
) -> Arc<DataObjectHandle> {
    let c = CompositeHandle::new();
    for (i, b) in blocks.into_iter().enumerate() {
        c.set_block(i, b);
    }
    Arc::new(DataObjectHandle::Composite(c))
}
