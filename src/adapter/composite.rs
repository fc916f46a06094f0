//! Composite arrays and the composite indexing engine.
//!
//! A [`CompositeArray`] presents the per-block arrays of a composite dataset
//! as one logical array over the concatenated leading axis. Blocks are
//! materialized lazily from the owning dataset on first access and cached;
//! empty partitions appear as `FieldArray::None` blocks and contribute zero
//! length.
//!
//! The [`Index`] type is the one request language for reads and writes on
//! both plain and composite arrays: integers, slices with Python `indices`
//! semantics, integer lists, boolean masks, composite indices and tuples.

use crate::adapter::array::{DataArray, FieldArray};
use crate::adapter::attributes::native_to_field;
use crate::dataset::{Association, DataObjectHandle};
use crate::error::MeshFieldError;
use crate::values::{self, BinOp, DType, Values};
use once_cell::sync::OnceCell;
use std::sync::{Arc, Weak};

/// `start:stop:step` with Python slice semantics (negatives from the end,
/// out-of-range bounds clamped, omitted fields defaulted by step sign).
#[derive(Clone, Copy, Debug, Default)]
pub struct SliceSpec {
    pub start: Option<i64>,
    pub stop: Option<i64>,
    pub step: Option<i64>,
}

impl SliceSpec {
    /// `start:stop` with unit step.
    pub fn range(start: i64, stop: i64) -> Self {
        SliceSpec {
            start: Some(start),
            stop: Some(stop),
            step: None,
        }
    }

    /// The full-axis slice `:`.
    pub fn all() -> Self {
        SliceSpec::default()
    }

    /// `::step`.
    pub fn step_by(step: i64) -> Self {
        SliceSpec {
            start: None,
            stop: None,
            step: Some(step),
        }
    }

    /// Resolve against an axis length, Python `slice.indices` style.
    ///
    /// For a negative step the returned stop may be `-1`, meaning the walk
    /// runs past index zero.
    ///
    /// # Errors
    /// `UnsupportedIndex` for a step of zero.
    pub(crate) fn resolve(&self, len: usize) -> Result<(i64, i64, i64), MeshFieldError> {
        let len = len as i64;
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err(MeshFieldError::UnsupportedIndex("slice step of zero"));
        }
        let (lo, hi) = if step > 0 { (0, len) } else { (-1, len - 1) };
        let clamp = |v: i64| (if v < 0 { v + len } else { v }).clamp(lo, hi);
        let start = match self.start {
            Some(v) => clamp(v),
            None => {
                if step > 0 {
                    0
                } else {
                    len - 1
                }
            }
        };
        let stop = match self.stop {
            Some(v) => clamp(v),
            None => {
                if step > 0 {
                    len
                } else {
                    -1
                }
            }
        };
        Ok((start, stop, step))
    }

    /// Selected indices over an axis of length `len`, in walk order.
    pub(crate) fn indices(&self, len: usize) -> Result<Vec<usize>, MeshFieldError> {
        let (start, stop, step) = self.resolve(len)?;
        Ok(block_intersection(start, stop, step, 0, len))
    }
}

/// One index request.
#[derive(Clone, Debug)]
pub enum Index {
    /// Single global element; negatives count from the end.
    Int(i64),
    /// Slice over the leading axis.
    Slice(SliceSpec),
    /// Explicit global indices, in order, possibly repeated.
    Ints(Vec<i64>),
    /// Boolean mask: 1-D over the leading axis, or full-shape (flat result).
    Mask(Values),
    /// Per-block indices for a composite target.
    Composite(CompositeArray),
    /// Leading index followed by per-axis tail indices.
    Tuple(Vec<Index>),
}

fn normalize(i: i64, len: usize) -> Result<usize, MeshFieldError> {
    let n = len as i64;
    let k = if i < 0 { i + n } else { i };
    if k < 0 || k >= n {
        return Err(MeshFieldError::IndexOutOfBounds { index: i, len });
    }
    Ok(k as usize)
}

/// Local indices of `start:stop:step` falling inside `[offset, offset+size)`,
/// in walk order.
fn block_intersection(start: i64, stop: i64, step: i64, offset: usize, size: usize) -> Vec<usize> {
    let off = offset as i64;
    let end = (offset + size) as i64;
    let mut out = Vec::new();
    if step > 0 {
        let mut k = if start >= off {
            start
        } else {
            start + ((off - start + step - 1) / step) * step
        };
        let hi = stop.min(end);
        while k < hi {
            out.push((k - off) as usize);
            k += step;
        }
    } else {
        let s = -step;
        let mut k = if start <= end - 1 {
            start
        } else {
            start - ((start - (end - 1) + s - 1) / s) * s
        };
        let lo = stop.max(off - 1);
        while k > lo {
            out.push((k - off) as usize);
            k -= s;
        }
    }
    out
}

/// Apply tail indices to successive axes of a plain buffer, starting at
/// `axis`. Integer indices remove their axis; slices and index lists keep it.
fn index_axes(v: &Values, mut axis: usize, rest: &[Index]) -> Result<Values, MeshFieldError> {
    let mut v = v.clone();
    for part in rest {
        if axis >= v.ndim() {
            return Err(MeshFieldError::UnsupportedIndex("too many tuple indices"));
        }
        let len = v.shape()[axis];
        match part {
            Index::Int(i) => {
                let k = normalize(*i, len)?;
                v = v.index_at(axis, k);
            }
            Index::Slice(s) => {
                let ids = s.indices(len)?;
                v = v.select_at(axis, &ids);
                axis += 1;
            }
            Index::Ints(ids) => {
                let local: Vec<usize> = ids
                    .iter()
                    .map(|&i| normalize(i, len))
                    .collect::<Result<_, _>>()?;
                v = v.select_at(axis, &local);
                axis += 1;
            }
            _ => {
                return Err(MeshFieldError::UnsupportedIndex(
                    "tail tuple indices must be integers, slices or index lists",
                ));
            }
        }
    }
    Ok(v)
}

/// The virtual concatenation of per-block arrays of a composite dataset.
///
/// Cheap to clone; the block list is materialized at most once per array.
#[derive(Clone, Debug, Default)]
pub struct CompositeArray {
    blocks: OnceCell<Vec<FieldArray>>,
    dataset: Weak<DataObjectHandle>,
    name: Option<String>,
    association: Association,
}

impl CompositeArray {
    /// Composite array over explicit blocks; the association is taken from
    /// the first present block.
    pub fn from_blocks(blocks: Vec<FieldArray>) -> Self {
        let association = blocks
            .iter()
            .find(|b| !b.is_none())
            .map(|b| b.association())
            .unwrap_or(Association::Field);
        let cell = OnceCell::new();
        let _ = cell.set(blocks);
        CompositeArray {
            blocks: cell,
            dataset: Weak::new(),
            name: None,
            association,
        }
    }

    /// Lazy composite array: blocks are looked up under `name` in every leaf
    /// of `dataset` on first access.
    pub fn from_dataset(
        dataset: &Arc<DataObjectHandle>,
        association: Association,
        name: impl Into<String>,
    ) -> Self {
        CompositeArray {
            blocks: OnceCell::new(),
            dataset: Arc::downgrade(dataset),
            name: Some(name.into()),
            association,
        }
    }

    /// Same provenance, different blocks. Used for every derived result.
    pub(crate) fn derived(&self, blocks: Vec<FieldArray>) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(blocks);
        CompositeArray {
            blocks: cell,
            dataset: self.dataset.clone(),
            name: None,
            association: self.association,
        }
    }

    /// The per-block arrays, materializing from the dataset if needed.
    ///
    /// A dropped dataset yields an empty block list (and a log warning)
    /// rather than an error; every read on the result then behaves like an
    /// empty composite.
    pub fn blocks(&self) -> &[FieldArray] {
        self.blocks.get_or_init(|| self.materialize())
    }

    fn materialize(&self) -> Vec<FieldArray> {
        let Some(name) = self.name.as_deref() else {
            return Vec::new();
        };
        let Some(ds) = self.dataset.upgrade() else {
            log::warn!("composite array {name:?} outlived its dataset");
            return Vec::new();
        };
        let Some(comp) = ds.as_composite() else {
            return Vec::new();
        };
        comp.leaves()
            .into_iter()
            .map(|(_, leaf)| match leaf.as_data_set() {
                Some(l) if l.kind().supports(self.association) => {
                    match l.attributes(self.association).read().get(name) {
                        Some(native) => native_to_field(native, &leaf, self.association),
                        None => FieldArray::None,
                    }
                }
                _ => FieldArray::None,
            })
            .collect()
    }

    fn blocks_mut(&mut self) -> &mut Vec<FieldArray> {
        if self.blocks.get().is_none() {
            let blocks = self.materialize();
            let _ = self.blocks.set(blocks);
        }
        self.blocks.get_mut().expect("materialized above")
    }

    /// Association tag shared by the blocks.
    #[inline]
    pub fn association(&self) -> Association {
        self.association
    }

    /// Name the blocks were looked up under, for lazily bound arrays.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Owning dataset, if lazily bound and still alive.
    pub fn dataset(&self) -> Option<Arc<DataObjectHandle>> {
        self.dataset.upgrade()
    }

    pub(crate) fn dataset_weak(&self) -> Weak<DataObjectHandle> {
        self.dataset.clone()
    }

    fn partition(&self) -> (Vec<usize>, Vec<usize>, usize) {
        let blocks = self.blocks();
        let mut sizes = Vec::with_capacity(blocks.len());
        let mut offsets = Vec::with_capacity(blocks.len());
        let mut total = 0usize;
        for b in blocks {
            offsets.push(total);
            let n = b.len();
            sizes.push(n);
            total += n;
        }
        (sizes, offsets, total)
    }

    /// Total leading-axis length over all blocks.
    pub fn len(&self) -> usize {
        self.blocks().iter().map(|b| b.len()).sum()
    }

    /// True when every block is absent or empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of block slots.
    pub fn num_blocks(&self) -> usize {
        self.blocks().len()
    }

    /// Logical shape: total leading length plus the common tail.
    pub fn shape(&self) -> Vec<usize> {
        let total = self.len();
        match self.blocks().iter().find(|b| !b.is_none()) {
            Some(b) => {
                let mut s = b.shape();
                if s.is_empty() {
                    s = vec![0];
                }
                s[0] = total;
                s
            }
            None => vec![0],
        }
    }

    /// Element type of the first present block.
    pub fn dtype(&self) -> Option<DType> {
        self.blocks().iter().find_map(|b| match b {
            FieldArray::Data(d) => Some(d.dtype()),
            _ => None,
        })
    }

    /// Blockwise dtype conversion.
    pub fn astype(&self, dtype: DType) -> CompositeArray {
        self.derived(self.blocks().iter().map(|b| b.astype(dtype)).collect())
    }

    /// Blockwise map; absent blocks stay absent.
    pub(crate) fn map_blocks(&self, f: impl Fn(&FieldArray) -> FieldArray) -> CompositeArray {
        self.derived(
            self.blocks()
                .iter()
                .map(|b| if b.is_none() { FieldArray::None } else { f(b) })
                .collect(),
        )
    }

    /// Fallible blockwise map.
    pub(crate) fn try_map_blocks(
        &self,
        f: impl Fn(&FieldArray) -> Result<FieldArray, MeshFieldError>,
    ) -> Result<CompositeArray, MeshFieldError> {
        let blocks = self
            .blocks()
            .iter()
            .map(|b| if b.is_none() { Ok(FieldArray::None) } else { f(b) })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.derived(blocks))
    }

    /// Concatenate all present blocks into one contiguous buffer (a copy).
    ///
    /// # Errors
    /// `ShapeMismatch` when block tails differ.
    pub fn to_values(&self) -> Result<Values, MeshFieldError> {
        let parts: Vec<Values> = self
            .blocks()
            .iter()
            .filter_map(|b| b.as_data().map(|d| d.values().clone()))
            .collect();
        if parts.is_empty() {
            return Ok(Values::from_vec_f64(vec![]));
        }
        values::concat(&parts)
    }

    /// True when any element equals `v`.
    pub fn contains(&self, v: f64) -> bool {
        self.blocks().iter().any(|b| match b {
            FieldArray::Data(d) => d.values().iter_real().contains(&v),
            _ => false,
        })
    }

    /// Iterate elements across blocks in traversal order.
    pub fn iter(&self) -> RowIter<'_> {
        RowIter {
            arr: self,
            front: 0,
            back: self.len(),
        }
    }

    /// Read under an index request.
    ///
    /// # Errors
    /// `IndexOutOfBounds` for out-of-range element indices (including any
    /// integer index on an all-empty composite), `ShapeMismatch` for a mask
    /// whose shape is neither the leading length nor the full shape,
    /// `BlockCountMismatch` for a composite index of different structure,
    /// `UnsupportedIndex` for malformed requests.
    pub fn get(&self, index: &Index) -> Result<FieldArray, MeshFieldError> {
        let (sizes, offsets, total) = self.partition();
        let blocks = self.blocks();
        match index {
            Index::Int(i) => {
                let k = normalize(*i, total)?;
                let b = offsets.partition_point(|&o| o <= k) - 1;
                match &blocks[b] {
                    FieldArray::Data(d) => Ok(FieldArray::Data(DataArray::computed(
                        d.values().index_row(k - offsets[b]),
                        d,
                    ))),
                    // A zero-size block cannot contain k.
                    _ => Err(MeshFieldError::IndexOutOfBounds {
                        index: *i,
                        len: total,
                    }),
                }
            }
            Index::Slice(s) => {
                let (start, stop, step) = s.resolve(total)?;
                let n = blocks.len();
                let mut out = vec![FieldArray::None; n];
                for (i, block) in blocks.iter().enumerate() {
                    let pos = if step > 0 { i } else { n - 1 - i };
                    if let FieldArray::Data(d) = block {
                        let idx = block_intersection(start, stop, step, offsets[i], sizes[i]);
                        out[pos] =
                            FieldArray::Data(DataArray::computed(d.values().select_rows(&idx), d));
                    }
                }
                Ok(FieldArray::Composite(self.derived(out)))
            }
            Index::Ints(ids) => {
                let mut parts = Vec::with_capacity(ids.len());
                for &i in ids {
                    let k = normalize(i, total)?;
                    let b = offsets.partition_point(|&o| o <= k) - 1;
                    match &blocks[b] {
                        FieldArray::Data(d) => {
                            parts.push(d.values().select_rows(&[k - offsets[b]]));
                        }
                        _ => {
                            return Err(MeshFieldError::IndexOutOfBounds {
                                index: i,
                                len: total,
                            });
                        }
                    }
                }
                if parts.is_empty() {
                    return Ok(FieldArray::Data(DataArray::new(Values::from_vec_f64(
                        vec![],
                    ))));
                }
                let vals = values::concat(&parts)?;
                Ok(self.wrap_data(vals))
            }
            Index::Mask(m) => self.get_mask(m, &offsets, &sizes, total),
            Index::Composite(ci) => {
                let other = ci.blocks();
                if other.len() != blocks.len() {
                    return Err(MeshFieldError::BlockCountMismatch {
                        left: blocks.len(),
                        right: other.len(),
                    });
                }
                let mut out = Vec::with_capacity(blocks.len());
                for (block, idx) in blocks.iter().zip(other.iter()) {
                    out.push(match (block, idx) {
                        (FieldArray::Data(d), FieldArray::Data(i)) => {
                            FieldArray::Data(DataArray::computed(
                                apply_block_index(d.values(), i.values())?,
                                d,
                            ))
                        }
                        _ => FieldArray::None,
                    });
                }
                Ok(FieldArray::Composite(self.derived(out)))
            }
            Index::Tuple(parts) => {
                let Some((first, rest)) = parts.split_first() else {
                    return Err(MeshFieldError::UnsupportedIndex("empty tuple index"));
                };
                match first {
                    Index::Int(_) => {
                        let row = self.get(first)?;
                        match row {
                            FieldArray::Data(d) => Ok(FieldArray::Data(DataArray::computed(
                                index_axes(d.values(), 0, rest)?,
                                &d,
                            ))),
                            _ => Ok(FieldArray::None),
                        }
                    }
                    Index::Slice(_) => {
                        let sliced = self.get(first)?;
                        match sliced {
                            FieldArray::Composite(c) => {
                                Ok(FieldArray::Composite(c.try_map_blocks(|b| match b {
                                    FieldArray::Data(d) => Ok(FieldArray::Data(
                                        DataArray::computed(index_axes(d.values(), 1, rest)?, d),
                                    )),
                                    _ => Ok(FieldArray::None),
                                })?))
                            }
                            other => Ok(other),
                        }
                    }
                    _ => Err(MeshFieldError::UnsupportedIndex(
                        "tuple index must start with an integer or slice",
                    )),
                }
            }
        }
    }

    fn wrap_data(&self, values: Values) -> FieldArray {
        let mut d = DataArray::new(values).with_association(self.association);
        if let Some(like) = self.blocks().iter().find_map(|b| b.as_data()) {
            d = DataArray::computed(d.into_values(), like);
        }
        FieldArray::Data(d)
    }

    fn get_mask(
        &self,
        m: &Values,
        offsets: &[usize],
        sizes: &[usize],
        total: usize,
    ) -> Result<FieldArray, MeshFieldError> {
        if m.dtype() != DType::Bool {
            return Err(MeshFieldError::UnsupportedIndex("mask index must be boolean"));
        }
        let blocks = self.blocks();
        if m.ndim() == 1 && m.leading_len() == total {
            let flags: Vec<bool> = m.as_bool().iter().copied().collect();
            let mut parts = Vec::new();
            for (i, block) in blocks.iter().enumerate() {
                if let FieldArray::Data(d) = block {
                    parts.push(
                        d.values()
                            .mask_rows(&flags[offsets[i]..offsets[i] + sizes[i]])?,
                    );
                }
            }
            if parts.is_empty() {
                return Ok(FieldArray::Data(DataArray::new(Values::from_vec_f64(
                    vec![],
                ))));
            }
            return Ok(self.wrap_data(values::concat(&parts)?));
        }
        if m.shape() == self.shape().as_slice() {
            // Full-shape mask: flat element selection, like numpy.
            let mut parts = Vec::new();
            for (i, block) in blocks.iter().enumerate() {
                if let FieldArray::Data(d) = block {
                    let rows: Vec<usize> = (offsets[i]..offsets[i] + sizes[i]).collect();
                    let part_mask = m.select_rows(&rows).as_bool();
                    parts.push(d.values().mask_flat(&part_mask)?);
                }
            }
            if parts.is_empty() {
                return Ok(FieldArray::Data(DataArray::new(Values::from_vec_f64(
                    vec![],
                ))));
            }
            return Ok(self.wrap_data(values::concat(&parts)?));
        }
        Err(MeshFieldError::ShapeMismatch {
            left: self.shape(),
            right: m.shape().to_vec(),
        })
    }

    /// Write under an index request. Absent blocks are skipped silently; an
    /// absent (`None`) value is a no-op.
    ///
    /// # Errors
    /// Same classification as [`CompositeArray::get`]; additionally
    /// `UnsupportedIndex` for tuple assignments deeper than whole rows or
    /// single elements.
    pub fn set(&mut self, index: &Index, value: &FieldArray) -> Result<(), MeshFieldError> {
        if value.is_none() {
            return Ok(());
        }
        let (sizes, offsets, total) = self.partition();
        match index {
            Index::Int(i) => {
                let k = normalize(*i, total)?;
                let b = offsets.partition_point(|&o| o <= k) - 1;
                let local = k - offsets[b];
                let src = value.to_values()?;
                if let FieldArray::Data(d) = &mut self.blocks_mut()[b] {
                    d.values_mut().write_rows(&[local], &src)?;
                }
                Ok(())
            }
            Index::Slice(s) => {
                let (start, stop, step) = s.resolve(total)?;
                let value_blocks = value.as_composite().map(|c| c.blocks().to_vec());
                if let Some(vb) = &value_blocks {
                    if vb.len() != sizes.len() {
                        return Err(MeshFieldError::BlockCountMismatch {
                            left: sizes.len(),
                            right: vb.len(),
                        });
                    }
                }
                let flat = if value_blocks.is_none() {
                    Some(value.to_values()?)
                } else {
                    None
                };
                for (i, block) in self.blocks_mut().iter_mut().enumerate() {
                    let idx = block_intersection(start, stop, step, offsets[i], sizes[i]);
                    if idx.is_empty() {
                        continue;
                    }
                    let FieldArray::Data(d) = block else { continue };
                    match (&value_blocks, &flat) {
                        (Some(vb), _) => {
                            if let FieldArray::Data(v) = &vb[i] {
                                d.values_mut().write_rows(&idx, v.values())?;
                            }
                        }
                        (None, Some(src)) => d.values_mut().write_rows(&idx, src)?,
                        (None, None) => unreachable!("one source form chosen above"),
                    }
                }
                Ok(())
            }
            Index::Ints(ids) => {
                let src = value.to_values()?;
                let per_position = src.ndim() > 0 && src.leading_len() == ids.len();
                for (j, &i) in ids.iter().enumerate() {
                    let k = normalize(i, total)?;
                    let b = offsets.partition_point(|&o| o <= k) - 1;
                    let local = k - offsets[b];
                    let piece = if per_position { src.index_row(j) } else { src.clone() };
                    if let FieldArray::Data(d) = &mut self.blocks_mut()[b] {
                        d.values_mut().write_rows(&[local], &piece)?;
                    }
                }
                Ok(())
            }
            Index::Mask(m) => self.set_mask(m, value, &offsets, &sizes, total),
            Index::Composite(ci) => {
                let idx_blocks = ci.blocks().to_vec();
                if idx_blocks.len() != sizes.len() {
                    return Err(MeshFieldError::BlockCountMismatch {
                        left: sizes.len(),
                        right: idx_blocks.len(),
                    });
                }
                let value_blocks = value.as_composite().map(|c| c.blocks().to_vec());
                if let Some(vb) = &value_blocks {
                    if vb.len() != sizes.len() {
                        return Err(MeshFieldError::BlockCountMismatch {
                            left: sizes.len(),
                            right: vb.len(),
                        });
                    }
                }
                let flat = if value_blocks.is_none() {
                    Some(value.to_values()?)
                } else {
                    None
                };
                for (i, block) in self.blocks_mut().iter_mut().enumerate() {
                    let (FieldArray::Data(d), FieldArray::Data(ix)) = (block, &idx_blocks[i])
                    else {
                        continue;
                    };
                    let src = match (&value_blocks, &flat) {
                        (Some(vb), _) => match &vb[i] {
                            FieldArray::Data(v) => v.values().clone(),
                            _ => continue,
                        },
                        (None, Some(s)) => s.clone(),
                        (None, None) => unreachable!("one source form chosen above"),
                    };
                    let rows = block_index_rows(d.values(), ix.values())?;
                    d.values_mut().write_rows(&rows, &src)?;
                }
                Ok(())
            }
            Index::Tuple(parts) => {
                let Some((Index::Int(i), rest)) = parts.split_first() else {
                    return Err(MeshFieldError::UnsupportedIndex(
                        "tuple assignment must start with an integer",
                    ));
                };
                let k = normalize(*i, total)?;
                let b = offsets.partition_point(|&o| o <= k) - 1;
                let local = k - offsets[b];
                let src = value.to_values()?;
                let mut tail = Vec::with_capacity(rest.len());
                for part in rest {
                    match part {
                        Index::Int(j) => tail.push(*j),
                        _ => {
                            return Err(MeshFieldError::UnsupportedIndex(
                                "tuple assignment supports integer indices only",
                            ));
                        }
                    }
                }
                if let FieldArray::Data(d) = &mut self.blocks_mut()[b] {
                    if tail.len() + 1 > d.values().ndim() {
                        return Err(MeshFieldError::UnsupportedIndex("too many tuple indices"));
                    }
                    let mut ix = vec![local];
                    for (axis, &j) in tail.iter().enumerate() {
                        let len = d.values().shape()[axis + 1];
                        ix.push(normalize(j, len)?);
                    }
                    if ix.len() == d.values().ndim() {
                        d.values_mut().write_element(&ix, &src)?;
                    } else if ix.len() == 1 {
                        d.values_mut().write_rows(&[local], &src)?;
                    } else {
                        return Err(MeshFieldError::UnsupportedIndex(
                            "partial tuple assignment",
                        ));
                    }
                }
                Ok(())
            }
        }
    }

    fn set_mask(
        &mut self,
        m: &Values,
        value: &FieldArray,
        offsets: &[usize],
        sizes: &[usize],
        total: usize,
    ) -> Result<(), MeshFieldError> {
        if m.dtype() != DType::Bool {
            return Err(MeshFieldError::UnsupportedIndex("mask index must be boolean"));
        }
        if m.ndim() == 1 && m.leading_len() == total {
            let flags: Vec<bool> = m.as_bool().iter().copied().collect();
            let src = value.to_values()?;
            let selected_total = flags.iter().filter(|&&f| f).count();
            let segmented = src.ndim() > 0 && src.leading_len() == selected_total;
            let mut consumed = 0usize;
            for (i, block) in self.blocks_mut().iter_mut().enumerate() {
                let local: Vec<usize> = flags[offsets[i]..offsets[i] + sizes[i]]
                    .iter()
                    .enumerate()
                    .filter(|&(_, &f)| f)
                    .map(|(j, _)| j)
                    .collect();
                if local.is_empty() {
                    continue;
                }
                let FieldArray::Data(d) = block else { continue };
                if segmented {
                    let rows: Vec<usize> = (consumed..consumed + local.len()).collect();
                    let piece = src.select_rows(&rows);
                    d.values_mut().write_rows(&local, &piece)?;
                } else {
                    d.values_mut().write_rows(&local, &src)?;
                }
                consumed += local.len();
            }
            return Ok(());
        }
        if m.shape() == self.shape().as_slice() {
            let src = value.to_values()?;
            for (i, block) in self.blocks_mut().iter_mut().enumerate() {
                let FieldArray::Data(d) = block else { continue };
                let rows: Vec<usize> = (offsets[i]..offsets[i] + sizes[i]).collect();
                let part_mask = m.select_rows(&rows).as_bool();
                d.values_mut().write_where(&part_mask, &src)?;
            }
            return Ok(());
        }
        Err(MeshFieldError::ShapeMismatch {
            left: self.shape(),
            right: m.shape().to_vec(),
        })
    }

    /// Pairwise binary combination: composite against composite goes block
    /// by block, everything else broadcasts into each block. `swapped` means
    /// this composite is the right operand.
    pub(crate) fn binary(
        &self,
        other: &FieldArray,
        op: BinOp,
        swapped: bool,
    ) -> Result<FieldArray, MeshFieldError> {
        let blocks = self.blocks();
        let out = match other {
            FieldArray::Composite(o) => {
                let ob = o.blocks();
                if ob.len() != blocks.len() {
                    return Err(MeshFieldError::BlockCountMismatch {
                        left: blocks.len(),
                        right: ob.len(),
                    });
                }
                blocks
                    .iter()
                    .zip(ob.iter())
                    .map(|(a, b)| {
                        let (l, r) = if swapped { (b, a) } else { (a, b) };
                        l.binary(r, op)
                    })
                    .collect::<Result<Vec<_>, _>>()?
            }
            _ => blocks
                .iter()
                .map(|a| {
                    let (l, r) = if swapped { (other, a) } else { (a, other) };
                    l.binary(r, op)
                })
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(FieldArray::Composite(self.derived(out)))
    }
}

/// Apply one block's index array (integer fancy index or boolean mask) to a
/// block buffer.
fn apply_block_index(v: &Values, idx: &Values) -> Result<Values, MeshFieldError> {
    if idx.dtype() == DType::Bool {
        if idx.shape() == v.shape() {
            return v.mask_flat(&idx.as_bool());
        }
        let flags: Vec<bool> = idx.as_bool().iter().copied().collect();
        return v.mask_rows(&flags);
    }
    let rows = block_index_rows(v, idx)?;
    Ok(v.select_rows(&rows))
}

/// Row positions selected by one block's index array.
fn block_index_rows(v: &Values, idx: &Values) -> Result<Vec<usize>, MeshFieldError> {
    let len = v.leading_len();
    if idx.dtype() == DType::Bool {
        return Ok(idx
            .as_bool()
            .iter()
            .enumerate()
            .filter(|&(_, &f)| f)
            .map(|(i, _)| i)
            .collect());
    }
    idx.as_int()
        .iter()
        .map(|&i| normalize(i, len))
        .collect()
}

/// Double-ended iterator over the elements of a composite array.
pub struct RowIter<'a> {
    arr: &'a CompositeArray,
    front: usize,
    back: usize,
}

impl Iterator for RowIter<'_> {
    type Item = FieldArray;

    fn next(&mut self) -> Option<FieldArray> {
        if self.front >= self.back {
            return None;
        }
        let row = self.arr.get(&Index::Int(self.front as i64)).ok()?;
        self.front += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.back - self.front;
        (n, Some(n))
    }
}

impl DoubleEndedIterator for RowIter<'_> {
    fn next_back(&mut self) -> Option<FieldArray> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        self.arr.get(&Index::Int(self.back as i64)).ok()
    }
}

impl FieldArray {
    /// Read under an index request; the sentinel yields the sentinel.
    ///
    /// # Errors
    /// See [`CompositeArray::get`]; plain arrays reject composite indices
    /// with `UnsupportedIndex`.
    pub fn get(&self, index: &Index) -> Result<FieldArray, MeshFieldError> {
        match self {
            FieldArray::None => Ok(FieldArray::None),
            FieldArray::Composite(c) => c.get(index),
            FieldArray::Data(d) => {
                let v = d.values();
                let len = v.leading_len();
                let out = match index {
                    Index::Int(i) => v.index_row(normalize(*i, len)?),
                    Index::Slice(s) => v.select_rows(&s.indices(len)?),
                    Index::Ints(ids) => {
                        let local: Vec<usize> = ids
                            .iter()
                            .map(|&i| normalize(i, len))
                            .collect::<Result<_, _>>()?;
                        v.select_rows(&local)
                    }
                    Index::Mask(m) => {
                        if m.dtype() != DType::Bool {
                            return Err(MeshFieldError::UnsupportedIndex(
                                "mask index must be boolean",
                            ));
                        }
                        if m.shape() == v.shape() && m.ndim() > 1 {
                            v.mask_flat(&m.as_bool())?
                        } else {
                            let flags: Vec<bool> = m.as_bool().iter().copied().collect();
                            v.mask_rows(&flags)?
                        }
                    }
                    Index::Tuple(parts) => index_axes(v, 0, parts)?,
                    Index::Composite(_) => {
                        return Err(MeshFieldError::UnsupportedIndex(
                            "composite index on a plain array",
                        ));
                    }
                };
                Ok(FieldArray::Data(DataArray::computed(out, d)))
            }
        }
    }

    /// Write under an index request; writes to the sentinel are no-ops.
    ///
    /// # Errors
    /// See [`CompositeArray::set`].
    pub fn set(&mut self, index: &Index, value: &FieldArray) -> Result<(), MeshFieldError> {
        if value.is_none() {
            return Ok(());
        }
        match self {
            FieldArray::None => Ok(()),
            FieldArray::Composite(c) => c.set(index, value),
            FieldArray::Data(d) => {
                let len = d.values().leading_len();
                let src = value.to_values()?;
                let rows: Vec<usize> = match index {
                    Index::Int(i) => vec![normalize(*i, len)?],
                    Index::Slice(s) => s.indices(len)?,
                    Index::Ints(ids) => ids
                        .iter()
                        .map(|&i| normalize(i, len))
                        .collect::<Result<_, _>>()?,
                    Index::Mask(m) => {
                        if m.dtype() != DType::Bool {
                            return Err(MeshFieldError::UnsupportedIndex(
                                "mask index must be boolean",
                            ));
                        }
                        if m.shape() == d.values().shape() && m.ndim() > 1 {
                            let mask = m.as_bool();
                            return d.values_mut().write_where(&mask, &src);
                        }
                        m.as_bool()
                            .iter()
                            .enumerate()
                            .filter(|&(_, &f)| f)
                            .map(|(i, _)| i)
                            .collect()
                    }
                    _ => {
                        return Err(MeshFieldError::UnsupportedIndex(
                            "unsupported assignment index on a plain array",
                        ));
                    }
                };
                d.values_mut().write_rows(&rows, &src)
            }
        }
    }
}
