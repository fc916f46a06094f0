//! Adapter array types: the `FieldArray` sum type and `DataArray` provenance.
//!
//! `FieldArray` has three variants: the absorbing `None` sentinel for absent
//! partitions, a `Data` array carrying provenance (weak owning dataset,
//! association, optional native back-reference), and a `Composite` array
//! aggregating per-block arrays. Keeping all three in one sum type keeps
//! block-level pattern matching ergonomic and gives the sentinel full
//! operator closure for free.
//!
//! The operator set is bound once: every `std::ops` impl and comparison
//! method funnels into [`FieldArray::binary`], which applies
//! reshape-append-ones and dtype promotion before delegating to the numeric
//! kernel.

use crate::adapter::composite::CompositeArray;
use crate::dataset::{Association, DataObjectHandle, NativeArray};
use crate::error::MeshFieldError;
use crate::values::{self, BinOp, DType, Values};
use std::sync::{Arc, Weak};

/// Numeric array with provenance.
#[derive(Clone, Debug)]
pub struct DataArray {
    values: Values,
    association: Association,
    dataset: Weak<DataObjectHandle>,
    source: Option<NativeArray>,
}

impl DataArray {
    /// Array from a raw buffer, with Field association and no provenance.
    pub fn new(values: Values) -> Self {
        DataArray {
            values,
            association: Association::Field,
            dataset: Weak::new(),
            source: None,
        }
    }

    /// Array read from a native array of a dataset.
    ///
    /// The native back-reference is kept only while the buffer is actually
    /// shared; computed results never carry one.
    pub fn from_native(
        values: Values,
        dataset: &Arc<DataObjectHandle>,
        association: Association,
        source: NativeArray,
    ) -> Self {
        let source = if values.data_ptr() == source.values().data_ptr() {
            Some(source)
        } else {
            None
        };
        DataArray {
            values,
            association,
            dataset: Arc::downgrade(dataset),
            source,
        }
    }

    /// Computed array inheriting provenance (dataset, association) but no
    /// native back-reference.
    pub(crate) fn computed(values: Values, like: &DataArray) -> Self {
        DataArray {
            values,
            association: like.association,
            dataset: like.dataset.clone(),
            source: None,
        }
    }

    /// The numeric buffer.
    #[inline]
    pub fn values(&self) -> &Values {
        &self.values
    }

    /// Consume into the numeric buffer.
    pub fn into_values(self) -> Values {
        self.values
    }

    /// Mutable buffer access for the indexing engine's write paths.
    ///
    /// Writing detaches the native back-reference: a shared buffer is
    /// copy-on-write, so after a write the array may no longer alias the
    /// native storage.
    pub(crate) fn values_mut(&mut self) -> &mut Values {
        self.source = None;
        &mut self.values
    }

    /// Association tag (immutable once assigned).
    #[inline]
    pub fn association(&self) -> Association {
        self.association
    }

    /// Builder-style association override for freshly constructed arrays.
    pub fn with_association(mut self, association: Association) -> Self {
        self.association = association;
        self
    }

    /// Owning dataset, if still alive.
    pub fn dataset(&self) -> Option<Arc<DataObjectHandle>> {
        self.dataset.upgrade()
    }

    pub(crate) fn dataset_weak(&self) -> Weak<DataObjectHandle> {
        self.dataset.clone()
    }

    /// Native array this was produced from, while the buffer is shared.
    pub fn native(&self) -> Option<&NativeArray> {
        self.source.as_ref()
    }

    /// Name of the native array backing this one.
    ///
    /// # Errors
    /// [`MeshFieldError::MissingNativeAttribute`] when the array was computed
    /// (no native back-reference survives a reallocation).
    pub fn native_name(&self) -> Result<&str, MeshFieldError> {
        self.source
            .as_ref()
            .map(|n| n.name())
            .ok_or(MeshFieldError::MissingNativeAttribute("name"))
    }

    /// Shape of the buffer.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    /// Element type.
    #[inline]
    pub fn dtype(&self) -> DType {
        self.values.dtype()
    }

    /// Reallocating dtype conversion; drops the native back-reference.
    pub fn astype(&self, dtype: DType) -> DataArray {
        DataArray {
            values: self.values.astype(dtype),
            association: self.association,
            dataset: self.dataset.clone(),
            source: None,
        }
    }
}

/// Append trailing length-1 axes to the lower-rank operand when both are
/// non-scalar and share a leading length, so `vec / magnitude(vec)` style
/// expressions broadcast.
pub fn reshape_append_ones(a: &Values, b: &Values) -> (Values, Values) {
    let (na, nb) = (a.ndim(), b.ndim());
    if na == 0 || nb == 0 || na == nb || a.shape()[0] != b.shape()[0] {
        return (a.clone(), b.clone());
    }
    if na < nb {
        (a.append_ones(nb - na), b.clone())
    } else {
        (a.clone(), b.append_ones(na - nb))
    }
}

/// The adapter's array value: absent, present, or composite.
#[derive(Clone, Debug, Default)]
pub enum FieldArray {
    /// Absorbing sentinel for a partition that has no array under a name.
    #[default]
    None,
    /// A present array with provenance.
    Data(DataArray),
    /// Virtual concatenation of per-block arrays.
    Composite(CompositeArray),
}

impl FieldArray {
    /// True for the sentinel.
    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, FieldArray::None)
    }

    /// The present array, if any.
    pub fn as_data(&self) -> Option<&DataArray> {
        match self {
            FieldArray::Data(d) => Some(d),
            _ => None,
        }
    }

    /// The composite array, if any.
    pub fn as_composite(&self) -> Option<&CompositeArray> {
        match self {
            FieldArray::Composite(c) => Some(c),
            _ => None,
        }
    }

    /// Logical shape: `[0]` for the sentinel, buffer shape for data,
    /// `[Σ blocks, tail…]` for composites.
    pub fn shape(&self) -> Vec<usize> {
        match self {
            FieldArray::None => vec![0],
            FieldArray::Data(d) => d.shape().to_vec(),
            FieldArray::Composite(c) => c.shape(),
        }
    }

    /// Logical leading-axis length.
    pub fn len(&self) -> usize {
        match self {
            FieldArray::None => 0,
            FieldArray::Data(d) => d.values().leading_len(),
            FieldArray::Composite(c) => c.len(),
        }
    }

    /// True when no elements are present.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldArray::None => true,
            FieldArray::Data(d) => d.values().size() == 0,
            FieldArray::Composite(c) => c.len() == 0,
        }
    }

    /// Association tag; Field for the sentinel.
    pub fn association(&self) -> Association {
        match self {
            FieldArray::None => Association::Field,
            FieldArray::Data(d) => d.association(),
            FieldArray::Composite(c) => c.association(),
        }
    }

    /// Materialize to one contiguous buffer (always a copy for composites).
    ///
    /// # Errors
    /// Block tails that cannot be concatenated surface as `ShapeMismatch`.
    pub fn to_values(&self) -> Result<Values, MeshFieldError> {
        match self {
            FieldArray::None => Ok(Values::from_vec_f64(vec![])),
            FieldArray::Data(d) => Ok(d.values().clone()),
            FieldArray::Composite(c) => c.to_values(),
        }
    }

    /// Scalar view of a single-element array.
    pub fn scalar(&self) -> Option<f64> {
        match self {
            FieldArray::Data(d) if d.values().size() == 1 => {
                d.values().iter_real().first().copied()
            }
            _ => None,
        }
    }

    /// dtype conversion; sentinel stays sentinel, composites convert
    /// blockwise.
    pub fn astype(&self, dtype: DType) -> FieldArray {
        match self {
            FieldArray::None => FieldArray::None,
            FieldArray::Data(d) => FieldArray::Data(d.astype(dtype)),
            FieldArray::Composite(c) => FieldArray::Composite(c.astype(dtype)),
        }
    }

    /// Single entry point for binary operations.
    ///
    /// The sentinel absorbs every operator; composite operands combine
    /// pairwise by block; scalar or plain-array operands broadcast into
    /// every block; reshape-append-ones runs before the kernel dispatch.
    ///
    /// # Errors
    /// `ShapeMismatch` when broadcasting fails, `BlockCountMismatch` for
    /// composite operands of differing structure, `DTypeError` for bitwise
    /// or shift operations on real operands.
    pub fn binary(&self, other: &FieldArray, op: BinOp) -> Result<FieldArray, MeshFieldError> {
        match (self, other) {
            (FieldArray::None, _) | (_, FieldArray::None) => Ok(FieldArray::None),
            (FieldArray::Composite(a), _) => a.binary(other, op, false),
            (_, FieldArray::Composite(b)) => b.binary(self, op, true),
            (FieldArray::Data(a), FieldArray::Data(b)) => {
                let (x, y) = reshape_append_ones(a.values(), b.values());
                let out = values::binary(&x, &y, op)?;
                let like = if a.dataset().is_some() { a } else { b };
                Ok(FieldArray::Data(DataArray::computed(out, like)))
            }
        }
    }

    fn binary_or_panic(&self, other: &FieldArray, op: BinOp) -> FieldArray {
        match self.binary(other, op) {
            Ok(r) => r,
            Err(e) => panic!("field array operation failed: {e}"),
        }
    }

    /// Element-wise `<`.
    pub fn lt(&self, other: &FieldArray) -> FieldArray {
        self.binary_or_panic(other, BinOp::Lt)
    }

    /// Element-wise `<=`.
    pub fn le(&self, other: &FieldArray) -> FieldArray {
        self.binary_or_panic(other, BinOp::Le)
    }

    /// Element-wise `>`.
    pub fn gt(&self, other: &FieldArray) -> FieldArray {
        self.binary_or_panic(other, BinOp::Gt)
    }

    /// Element-wise `>=`.
    pub fn ge(&self, other: &FieldArray) -> FieldArray {
        self.binary_or_panic(other, BinOp::Ge)
    }

    /// Element-wise `==`.
    pub fn elem_eq(&self, other: &FieldArray) -> FieldArray {
        self.binary_or_panic(other, BinOp::Eq)
    }

    /// Element-wise `!=`.
    pub fn elem_ne(&self, other: &FieldArray) -> FieldArray {
        self.binary_or_panic(other, BinOp::Ne)
    }

    /// Element-wise power.
    pub fn pow(&self, other: &FieldArray) -> FieldArray {
        self.binary_or_panic(other, BinOp::Pow)
    }
}

impl From<f64> for FieldArray {
    fn from(v: f64) -> Self {
        FieldArray::Data(DataArray::new(Values::real_scalar(v)))
    }
}

impl From<i64> for FieldArray {
    fn from(v: i64) -> Self {
        FieldArray::Data(DataArray::new(Values::int_scalar(v)))
    }
}

impl From<Vec<f64>> for FieldArray {
    fn from(v: Vec<f64>) -> Self {
        FieldArray::Data(DataArray::new(Values::from_vec_f64(v)))
    }
}

impl From<Vec<i64>> for FieldArray {
    fn from(v: Vec<i64>) -> Self {
        FieldArray::Data(DataArray::new(Values::from_vec_i64(v)))
    }
}

impl From<Values> for FieldArray {
    fn from(v: Values) -> Self {
        FieldArray::Data(DataArray::new(v))
    }
}

impl From<DataArray> for FieldArray {
    fn from(d: DataArray) -> Self {
        FieldArray::Data(d)
    }
}

impl From<CompositeArray> for FieldArray {
    fn from(c: CompositeArray) -> Self {
        FieldArray::Composite(c)
    }
}

macro_rules! impl_field_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl std::ops::$trait for &FieldArray {
            type Output = FieldArray;
            /// # Panics
            /// Panics on broadcast or dtype failure, like the underlying
            /// numeric kernel's operators.
            fn $method(self, rhs: &FieldArray) -> FieldArray {
                self.binary_or_panic(rhs, $op)
            }
        }
        impl std::ops::$trait<FieldArray> for &FieldArray {
            type Output = FieldArray;
            fn $method(self, rhs: FieldArray) -> FieldArray {
                self.binary_or_panic(&rhs, $op)
            }
        }
    };
}

impl_field_op!(Add, add, BinOp::Add);
impl_field_op!(Sub, sub, BinOp::Sub);
impl_field_op!(Mul, mul, BinOp::Mul);
impl_field_op!(Div, div, BinOp::Div);
impl_field_op!(Rem, rem, BinOp::Rem);
impl_field_op!(BitAnd, bitand, BinOp::BitAnd);
impl_field_op!(BitOr, bitor, BinOp::BitOr);
impl_field_op!(BitXor, bitxor, BinOp::BitXor);
impl_field_op!(Shl, shl, BinOp::Shl);
impl_field_op!(Shr, shr, BinOp::Shr);

impl std::ops::Neg for &FieldArray {
    type Output = FieldArray;
    fn neg(self) -> FieldArray {
        match self {
            FieldArray::None => FieldArray::None,
            FieldArray::Data(d) => {
                FieldArray::Data(DataArray::computed(values::negate(d.values()), d))
            }
            FieldArray::Composite(c) => FieldArray::Composite(c.map_blocks(|b| match b {
                FieldArray::Data(d) => {
                    FieldArray::Data(DataArray::computed(values::negate(d.values()), d))
                }
                _ => FieldArray::None,
            })),
        }
    }
}

static_assertions::assert_impl_all!(FieldArray: Send, Sync);
static_assertions::assert_impl_all!(DataArray: Send, Sync);
