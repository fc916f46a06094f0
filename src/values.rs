//! Numeric kernel glue: dtype-tagged n-dimensional buffers.
//!
//! `Values` is the tagged union carried by every array in the adapter layer.
//! It wraps `ndarray::ArcArray` so buffers are shared on clone and only
//! copied when a computation needs to write (the buffer-sharing invariant the
//! adapter's native back-references depend on).
//!
//! Binary operations follow NumPy broadcasting rules via an explicit
//! co-broadcast so that comparisons, bitwise ops and arithmetic all go
//! through a single code path.

use crate::error::MeshFieldError;
use ndarray::{ArcArray, Array, ArrayD, ArrayViewD, Axis, IxDyn, Zip};

/// Shared dynamic-dimensional array.
pub type ArcD<A> = ArcArray<A, IxDyn>;

/// Element type of a [`Values`] buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DType {
    /// 64-bit float.
    Real,
    /// 64-bit signed integer.
    Int,
    /// Unsigned byte (ghost masks).
    Byte,
    /// Boolean (comparison results, masks).
    Bool,
}

impl DType {
    /// True for Int, Byte and Bool.
    #[inline]
    pub fn is_integral(self) -> bool {
        !matches!(self, DType::Real)
    }
}

/// Tagged numeric buffer over real, integer, byte or boolean elements.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Values {
    /// Real-valued buffer.
    Real(ArcD<f64>),
    /// Integer buffer (connectivity, cell types, fancy indices).
    Int(ArcD<i64>),
    /// Byte buffer (ghost arrays).
    Byte(ArcD<u8>),
    /// Boolean buffer (masks).
    Bool(ArcD<bool>),
}

/// Binary operations routed through [`binary`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    /// `a + b`
    Add,
    /// `a - b`
    Sub,
    /// `a * b`
    Mul,
    /// `a / b` (always real)
    Div,
    /// `a mod b` with NumPy sign semantics
    Rem,
    /// `a ** b` (always real)
    Pow,
    /// Bitwise and
    BitAnd,
    /// Bitwise or
    BitOr,
    /// Bitwise xor
    BitXor,
    /// Left shift
    Shl,
    /// Right shift
    Shr,
    /// `a < b`
    Lt,
    /// `a <= b`
    Le,
    /// `a > b`
    Gt,
    /// `a >= b`
    Ge,
    /// `a == b` element-wise
    Eq,
    /// `a != b` element-wise
    Ne,
}

impl Values {
    /// Element type tag.
    #[inline]
    pub fn dtype(&self) -> DType {
        match self {
            Values::Real(_) => DType::Real,
            Values::Int(_) => DType::Int,
            Values::Byte(_) => DType::Byte,
            Values::Bool(_) => DType::Bool,
        }
    }

    /// Shape of the buffer.
    #[inline]
    pub fn shape(&self) -> &[usize] {
        match self {
            Values::Real(a) => a.shape(),
            Values::Int(a) => a.shape(),
            Values::Byte(a) => a.shape(),
            Values::Bool(a) => a.shape(),
        }
    }

    /// Number of dimensions.
    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Total element count.
    #[inline]
    pub fn size(&self) -> usize {
        self.shape().iter().product()
    }

    /// Length along the leading axis; a zero-dimensional buffer counts as 1.
    #[inline]
    pub fn leading_len(&self) -> usize {
        self.shape().first().copied().unwrap_or(1)
    }

    /// True for zero-dimensional (scalar-like) buffers.
    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.ndim() == 0
    }

    /// Element strides in units of the element size.
    #[inline]
    pub fn strides(&self) -> &[isize] {
        match self {
            Values::Real(a) => a.strides(),
            Values::Int(a) => a.strides(),
            Values::Byte(a) => a.strides(),
            Values::Bool(a) => a.strides(),
        }
    }

    /// True when the buffer is row-major contiguous.
    #[inline]
    pub fn is_contiguous(&self) -> bool {
        match self {
            Values::Real(a) => a.is_standard_layout(),
            Values::Int(a) => a.is_standard_layout(),
            Values::Byte(a) => a.is_standard_layout(),
            Values::Bool(a) => a.is_standard_layout(),
        }
    }

    /// Zero-dimensional real scalar.
    pub fn real_scalar(v: f64) -> Values {
        Values::Real(Array::from_elem(IxDyn(&[]), v).into_shared())
    }

    /// Zero-dimensional integer scalar.
    pub fn int_scalar(v: i64) -> Values {
        Values::Int(Array::from_elem(IxDyn(&[]), v).into_shared())
    }

    /// 1-D real buffer.
    pub fn from_vec_f64(v: Vec<f64>) -> Values {
        let n = v.len();
        Values::Real(Array::from_shape_vec(IxDyn(&[n]), v).expect("1-D shape").into_shared())
    }

    /// 1-D integer buffer.
    pub fn from_vec_i64(v: Vec<i64>) -> Values {
        let n = v.len();
        Values::Int(Array::from_shape_vec(IxDyn(&[n]), v).expect("1-D shape").into_shared())
    }

    /// Real buffer with the given shape (row-major element order).
    pub fn from_shape_vec_f64(shape: &[usize], v: Vec<f64>) -> Result<Values, MeshFieldError> {
        Array::from_shape_vec(IxDyn(shape), v)
            .map(|a| Values::Real(a.into_shared()))
            .map_err(|_| MeshFieldError::ShapeMismatch {
                left: shape.to_vec(),
                right: vec![],
            })
    }

    /// View of this buffer cast to real, cloning cheaply when already real.
    pub fn as_real(&self) -> ArcD<f64> {
        match self {
            Values::Real(a) => a.clone(),
            Values::Int(a) => a.mapv(|x| x as f64).into_shared(),
            Values::Byte(a) => a.mapv(|x| x as f64).into_shared(),
            Values::Bool(a) => a.mapv(|x| x as i64 as f64).into_shared(),
        }
    }

    /// This buffer cast to integers.
    pub fn as_int(&self) -> ArcD<i64> {
        match self {
            Values::Real(a) => a.mapv(|x| x as i64).into_shared(),
            Values::Int(a) => a.clone(),
            Values::Byte(a) => a.mapv(|x| x as i64).into_shared(),
            Values::Bool(a) => a.mapv(|x| x as i64).into_shared(),
        }
    }

    /// Truthiness of every element.
    pub fn as_bool(&self) -> ArcD<bool> {
        match self {
            Values::Real(a) => a.mapv(|x| x != 0.0).into_shared(),
            Values::Int(a) => a.mapv(|x| x != 0).into_shared(),
            Values::Byte(a) => a.mapv(|x| x != 0).into_shared(),
            Values::Bool(a) => a.clone(),
        }
    }

    /// Reallocating dtype conversion.
    pub fn astype(&self, dtype: DType) -> Values {
        match dtype {
            DType::Real => Values::Real(self.as_real().to_owned().into_shared()),
            DType::Int => Values::Int(self.as_int().to_owned().into_shared()),
            DType::Byte => {
                let a = self.as_int().mapv(|x| x as u8);
                Values::Byte(a.into_shared())
            }
            DType::Bool => Values::Bool(self.as_bool().to_owned().into_shared()),
        }
    }

    /// Insert `count` trailing length-1 axes.
    pub fn append_ones(&self, count: usize) -> Values {
        fn grow<A: Clone>(a: &ArcD<A>, count: usize) -> ArcD<A> {
            let mut out = a.clone();
            for _ in 0..count {
                let axis = out.ndim();
                out = out.insert_axis(Axis(axis));
            }
            out
        }
        match self {
            Values::Real(a) => Values::Real(grow(a, count)),
            Values::Int(a) => Values::Int(grow(a, count)),
            Values::Byte(a) => Values::Byte(grow(a, count)),
            Values::Bool(a) => Values::Bool(grow(a, count)),
        }
    }

    /// Insert a single length-1 axis at `axis`.
    pub fn expand_dims(&self, axis: usize) -> Values {
        match self {
            Values::Real(a) => Values::Real(a.clone().insert_axis(Axis(axis))),
            Values::Int(a) => Values::Int(a.clone().insert_axis(Axis(axis))),
            Values::Byte(a) => Values::Byte(a.clone().insert_axis(Axis(axis))),
            Values::Bool(a) => Values::Bool(a.clone().insert_axis(Axis(axis))),
        }
    }

    /// Copying reshape in row-major element order.
    pub fn reshape(&self, shape: &[usize]) -> Result<Values, MeshFieldError> {
        let total: usize = shape.iter().product();
        if total != self.size() {
            return Err(MeshFieldError::ShapeMismatch {
                left: self.shape().to_vec(),
                right: shape.to_vec(),
            });
        }
        fn go<A: Clone>(a: &ArcD<A>, shape: &[usize]) -> ArcD<A> {
            let flat: Vec<A> = a.iter().cloned().collect();
            Array::from_shape_vec(IxDyn(shape), flat)
                .expect("element count checked")
                .into_shared()
        }
        Ok(match self {
            Values::Real(a) => Values::Real(go(a, shape)),
            Values::Int(a) => Values::Int(go(a, shape)),
            Values::Byte(a) => Values::Byte(go(a, shape)),
            Values::Bool(a) => Values::Bool(go(a, shape)),
        })
    }

    /// Swap the last two axes (tensor-orientation rule).
    pub fn transpose_last_two(&self) -> Values {
        let n = self.ndim();
        debug_assert!(n >= 2);
        let mut order: Vec<usize> = (0..n).collect();
        order.swap(n - 2, n - 1);
        fn go<A: Clone>(a: &ArcD<A>, order: &[usize]) -> ArcD<A> {
            a.clone().permuted_axes(IxDyn(order))
        }
        match self {
            Values::Real(a) => Values::Real(go(a, &order)),
            Values::Int(a) => Values::Int(go(a, &order)),
            Values::Byte(a) => Values::Byte(go(a, &order)),
            Values::Bool(a) => Values::Bool(go(a, &order)),
        }
    }

    /// Row-major contiguous copy.
    pub fn to_contiguous(&self) -> Values {
        fn go<A: Clone>(a: &ArcD<A>) -> ArcD<A> {
            let flat: Vec<A> = a.iter().cloned().collect();
            Array::from_shape_vec(IxDyn(a.shape()), flat)
                .expect("same element count")
                .into_shared()
        }
        match self {
            Values::Real(a) => Values::Real(go(a)),
            Values::Int(a) => Values::Int(go(a)),
            Values::Byte(a) => Values::Byte(go(a)),
            Values::Bool(a) => Values::Bool(go(a)),
        }
    }

    /// One row along the leading axis, keeping the tail shape.
    pub fn index_row(&self, i: usize) -> Values {
        fn go<A: Clone>(a: &ArcD<A>, i: usize) -> ArcD<A> {
            a.index_axis(Axis(0), i).to_owned().into_shared()
        }
        match self {
            Values::Real(a) => Values::Real(go(a, i)),
            Values::Int(a) => Values::Int(go(a, i)),
            Values::Byte(a) => Values::Byte(go(a, i)),
            Values::Bool(a) => Values::Bool(go(a, i)),
        }
    }

    /// Rows along the leading axis in the order given by `idx`.
    pub fn select_rows(&self, idx: &[usize]) -> Values {
        match self {
            Values::Real(a) => Values::Real(a.select(Axis(0), idx).into_shared()),
            Values::Int(a) => Values::Int(a.select(Axis(0), idx).into_shared()),
            Values::Byte(a) => Values::Byte(a.select(Axis(0), idx).into_shared()),
            Values::Bool(a) => Values::Bool(a.select(Axis(0), idx).into_shared()),
        }
    }

    /// Elements selected by a flat boolean mask of the same shape.
    pub fn mask_flat(&self, mask: &ArcD<bool>) -> Result<Values, MeshFieldError> {
        if mask.shape() != self.shape() {
            return Err(MeshFieldError::ShapeMismatch {
                left: self.shape().to_vec(),
                right: mask.shape().to_vec(),
            });
        }
        fn go<A: Clone>(a: &ArcD<A>, mask: &ArcD<bool>) -> ArcD<A> {
            let picked: Vec<A> = a
                .iter()
                .zip(mask.iter())
                .filter(|&(_, &m)| m)
                .map(|(v, _)| v.clone())
                .collect();
            let n = picked.len();
            Array::from_shape_vec(IxDyn(&[n]), picked)
                .expect("1-D shape")
                .into_shared()
        }
        Ok(match self {
            Values::Real(a) => Values::Real(go(a, mask)),
            Values::Int(a) => Values::Int(go(a, mask)),
            Values::Byte(a) => Values::Byte(go(a, mask)),
            Values::Bool(a) => Values::Bool(go(a, mask)),
        })
    }

    /// Rows along the leading axis where `mask` is true.
    pub fn mask_rows(&self, mask: &[bool]) -> Result<Values, MeshFieldError> {
        if mask.len() != self.leading_len() {
            return Err(MeshFieldError::ShapeMismatch {
                left: self.shape().to_vec(),
                right: vec![mask.len()],
            });
        }
        let idx: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter(|&(_, &m)| m)
            .map(|(i, _)| i)
            .collect();
        Ok(self.select_rows(&idx))
    }

    /// Overwrite the rows named by `idx` with `src`.
    ///
    /// `src` may be scalar-like (filled into every selected row), carry one
    /// row per selected index, or be a single tail-shaped row broadcast to
    /// all of them. `src` is cast to this buffer's dtype first.
    pub fn write_rows(&mut self, idx: &[usize], src: &Values) -> Result<(), MeshFieldError> {
        let src = if src.dtype() == self.dtype() {
            src.clone()
        } else {
            src.astype(self.dtype())
        };
        let per_row = src.ndim() > 0 && src.leading_len() == idx.len() && idx.len() > 0;
        fn go<A: Clone>(
            dst: &mut ArcD<A>,
            idx: &[usize],
            src: &ArcD<A>,
            per_row: bool,
        ) -> Result<(), MeshFieldError> {
            for (j, &i) in idx.iter().enumerate() {
                let mut row = dst.index_axis_mut(Axis(0), i);
                let piece = if per_row {
                    src.index_axis(Axis(0), j).to_owned()
                } else {
                    src.to_owned().into_dyn()
                };
                let view = piece.broadcast(row.raw_dim()).ok_or_else(|| {
                    MeshFieldError::ShapeMismatch {
                        left: row.shape().to_vec(),
                        right: piece.shape().to_vec(),
                    }
                })?;
                row.assign(&view);
            }
            Ok(())
        }
        match (self, &src) {
            (Values::Real(d), Values::Real(s)) => go(d, idx, s, per_row),
            (Values::Int(d), Values::Int(s)) => go(d, idx, s, per_row),
            (Values::Byte(d), Values::Byte(s)) => go(d, idx, s, per_row),
            (Values::Bool(d), Values::Bool(s)) => go(d, idx, s, per_row),
            _ => unreachable!("src cast to dst dtype above"),
        }
    }

    /// One hyperplane along an arbitrary axis (the axis is removed).
    pub fn index_at(&self, axis: usize, i: usize) -> Values {
        fn go<A: Clone>(a: &ArcD<A>, axis: usize, i: usize) -> ArcD<A> {
            a.index_axis(Axis(axis), i).to_owned().into_shared()
        }
        match self {
            Values::Real(a) => Values::Real(go(a, axis, i)),
            Values::Int(a) => Values::Int(go(a, axis, i)),
            Values::Byte(a) => Values::Byte(go(a, axis, i)),
            Values::Bool(a) => Values::Bool(go(a, axis, i)),
        }
    }

    /// Hyperplanes along an arbitrary axis in the order given by `idx`.
    pub fn select_at(&self, axis: usize, idx: &[usize]) -> Values {
        match self {
            Values::Real(a) => Values::Real(a.select(Axis(axis), idx).into_shared()),
            Values::Int(a) => Values::Int(a.select(Axis(axis), idx).into_shared()),
            Values::Byte(a) => Values::Byte(a.select(Axis(axis), idx).into_shared()),
            Values::Bool(a) => Values::Bool(a.select(Axis(axis), idx).into_shared()),
        }
    }

    /// Overwrite one element, addressed by a full index, with a one-element
    /// source cast to this buffer's dtype.
    pub fn write_element(&mut self, ix: &[usize], src: &Values) -> Result<(), MeshFieldError> {
        if src.size() != 1 {
            return Err(MeshFieldError::ShapeMismatch {
                left: vec![1],
                right: src.shape().to_vec(),
            });
        }
        let src = src.astype(self.dtype());
        fn first<A: Clone>(a: &ArcD<A>) -> A {
            a.iter().next().cloned().expect("one element")
        }
        match (self, &src) {
            (Values::Real(d), Values::Real(s)) => d[IxDyn(ix)] = first(s),
            (Values::Int(d), Values::Int(s)) => d[IxDyn(ix)] = first(s),
            (Values::Byte(d), Values::Byte(s)) => d[IxDyn(ix)] = first(s),
            (Values::Bool(d), Values::Bool(s)) => d[IxDyn(ix)] = first(s),
            _ => unreachable!("src cast to dst dtype above"),
        }
        Ok(())
    }

    /// Overwrite every element selected by a same-shaped boolean mask with a
    /// one-element source.
    pub fn write_where(&mut self, mask: &ArcD<bool>, src: &Values) -> Result<(), MeshFieldError> {
        if mask.shape() != self.shape() {
            return Err(MeshFieldError::ShapeMismatch {
                left: self.shape().to_vec(),
                right: mask.shape().to_vec(),
            });
        }
        if src.size() != 1 {
            return Err(MeshFieldError::ShapeMismatch {
                left: vec![1],
                right: src.shape().to_vec(),
            });
        }
        let src = src.astype(self.dtype());
        fn go<A: Clone>(d: &mut ArcD<A>, mask: &ArcD<bool>, v: A) {
            for (e, &m) in d.iter_mut().zip(mask.iter()) {
                if m {
                    *e = v.clone();
                }
            }
        }
        match (self, &src) {
            (Values::Real(d), Values::Real(s)) => go(d, mask, s.iter().next().copied().expect("one element")),
            (Values::Int(d), Values::Int(s)) => go(d, mask, s.iter().next().copied().expect("one element")),
            (Values::Byte(d), Values::Byte(s)) => go(d, mask, s.iter().next().copied().expect("one element")),
            (Values::Bool(d), Values::Bool(s)) => go(d, mask, s.iter().next().copied().expect("one element")),
            _ => unreachable!("src cast to dst dtype above"),
        }
        Ok(())
    }

    /// Flat iteration as real values (tests, aggregation).
    pub fn iter_real(&self) -> Vec<f64> {
        self.as_real().iter().copied().collect()
    }

    /// Pointer to the first element, for buffer-sharing checks.
    pub fn data_ptr(&self) -> *const u8 {
        match self {
            Values::Real(a) => a.as_ptr() as *const u8,
            Values::Int(a) => a.as_ptr() as *const u8,
            Values::Byte(a) => a.as_ptr() as *const u8,
            Values::Bool(a) => a.as_ptr() as *const u8,
        }
    }
}

/// NumPy-rule broadcast shape of two operand shapes.
pub(crate) fn broadcast_shape(a: &[usize], b: &[usize]) -> Result<Vec<usize>, MeshFieldError> {
    let n = a.len().max(b.len());
    let mut out = vec![0usize; n];
    for i in 0..n {
        let da = if i < n - a.len() { 1 } else { a[i - (n - a.len())] };
        let db = if i < n - b.len() { 1 } else { b[i - (n - b.len())] };
        out[i] = if da == db || db == 1 {
            da
        } else if da == 1 {
            db
        } else {
            return Err(MeshFieldError::ShapeMismatch {
                left: a.to_vec(),
                right: b.to_vec(),
            });
        };
    }
    Ok(out)
}

fn zip2<A, B, C>(
    a: &ArcD<A>,
    b: &ArcD<B>,
    f: impl Fn(&A, &B) -> C,
) -> Result<ArcD<C>, MeshFieldError>
where
    A: Clone,
    B: Clone,
    C: Clone,
{
    let shape = broadcast_shape(a.shape(), b.shape())?;
    let mismatch = || MeshFieldError::ShapeMismatch {
        left: a.shape().to_vec(),
        right: b.shape().to_vec(),
    };
    let av: ArrayViewD<'_, A> = a.broadcast(IxDyn(&shape)).ok_or_else(mismatch)?;
    let bv: ArrayViewD<'_, B> = b.broadcast(IxDyn(&shape)).ok_or_else(mismatch)?;
    let out: ArrayD<C> = Zip::from(&av).and(&bv).map_collect(|x, y| f(x, y));
    Ok(out.into_shared())
}

/// NumPy mod: result takes the sign of the divisor.
#[inline]
fn real_mod(p: f64, q: f64) -> f64 {
    if q == 0.0 { f64::NAN } else { p - q * (p / q).floor() }
}

#[inline]
fn int_mod(p: i64, q: i64) -> i64 {
    if q == 0 {
        return 0;
    }
    let r = p % q;
    if r != 0 && (r < 0) != (q < 0) { r + q } else { r }
}

/// Single entry point for all binary operations, with dtype promotion.
///
/// Comparisons yield Bool; `/` and `**` always yield Real; `+ - * %` and
/// shifts stay Int when both operands are integral; bitwise ops keep Byte
/// for Byte pairs and Bool for Bool pairs, promoting to Int otherwise.
pub(crate) fn binary(a: &Values, b: &Values, op: BinOp) -> Result<Values, MeshFieldError> {
    use BinOp::*;
    match op {
        Lt | Le | Gt | Ge | Eq | Ne => {
            let (x, y) = (a.as_real(), b.as_real());
            let r = zip2(&x, &y, |&p, &q| match op {
                Lt => p < q,
                Le => p <= q,
                Gt => p > q,
                Ge => p >= q,
                Eq => p == q,
                _ => p != q,
            })?;
            Ok(Values::Bool(r))
        }
        BitAnd | BitOr | BitXor => match (a, b) {
            (Values::Bool(x), Values::Bool(y)) => {
                let r = zip2(x, y, |&p, &q| match op {
                    BitAnd => p & q,
                    BitOr => p | q,
                    _ => p ^ q,
                })?;
                Ok(Values::Bool(r))
            }
            (Values::Byte(x), Values::Byte(y)) => {
                let r = zip2(x, y, |&p, &q| match op {
                    BitAnd => p & q,
                    BitOr => p | q,
                    _ => p ^ q,
                })?;
                Ok(Values::Byte(r))
            }
            _ => {
                if !a.dtype().is_integral() || !b.dtype().is_integral() {
                    return Err(MeshFieldError::DTypeError(
                        "bitwise operation requires integral operands",
                    ));
                }
                let (x, y) = (a.as_int(), b.as_int());
                let r = zip2(&x, &y, |&p, &q| match op {
                    BitAnd => p & q,
                    BitOr => p | q,
                    _ => p ^ q,
                })?;
                Ok(Values::Int(r))
            }
        },
        Shl | Shr => {
            if !a.dtype().is_integral() || !b.dtype().is_integral() {
                return Err(MeshFieldError::DTypeError(
                    "shift operation requires integral operands",
                ));
            }
            let (x, y) = (a.as_int(), b.as_int());
            let r = zip2(&x, &y, |&p, &q| match op {
                Shl => p.wrapping_shl(q as u32),
                _ => p.wrapping_shr(q as u32),
            })?;
            Ok(Values::Int(r))
        }
        Div | Pow => {
            let (x, y) = (a.as_real(), b.as_real());
            let r = zip2(&x, &y, |&p, &q| match op {
                Div => p / q,
                _ => p.powf(q),
            })?;
            Ok(Values::Real(r))
        }
        Add | Sub | Mul | Rem => {
            if a.dtype().is_integral() && b.dtype().is_integral() {
                let (x, y) = (a.as_int(), b.as_int());
                let r = zip2(&x, &y, |&p, &q| match op {
                    Add => p.wrapping_add(q),
                    Sub => p.wrapping_sub(q),
                    Mul => p.wrapping_mul(q),
                    _ => int_mod(p, q),
                })?;
                Ok(Values::Int(r))
            } else {
                let (x, y) = (a.as_real(), b.as_real());
                let r = zip2(&x, &y, |&p, &q| match op {
                    Add => p + q,
                    Sub => p - q,
                    Mul => p * q,
                    _ => real_mod(p, q),
                })?;
                Ok(Values::Real(r))
            }
        }
    }
}

/// Real-valued map over any dtype.
pub(crate) fn map_real(v: &Values, f: impl Fn(f64) -> f64) -> Values {
    Values::Real(v.as_real().mapv(f).into_shared())
}

/// Negation preserving integral dtype.
pub(crate) fn negate(v: &Values) -> Values {
    match v {
        Values::Real(a) => Values::Real(a.mapv(|x| -x).into_shared()),
        _ => Values::Int(v.as_int().mapv(|x| -x).into_shared()),
    }
}

/// NaN test; false everywhere for integral dtypes.
pub(crate) fn isnan(v: &Values) -> Values {
    match v {
        Values::Real(a) => Values::Bool(a.mapv(f64::is_nan).into_shared()),
        _ => Values::Bool(v.as_bool().mapv(|_| false).into_shared()),
    }
}

/// Element-wise logical not of truthiness.
pub(crate) fn logical_not(v: &Values) -> Values {
    Values::Bool(v.as_bool().mapv(|x| !x).into_shared())
}

/// Concatenate along the leading axis, promoting to a common dtype.
/// A 0-d part contributes one element.
pub(crate) fn concat(parts: &[Values]) -> Result<Values, MeshFieldError> {
    if parts.is_empty() {
        return Ok(Values::Real(Array::zeros(IxDyn(&[0])).into_shared()));
    }
    let promoted: Vec<Values>;
    let parts: &[Values] = if parts.iter().any(|p| p.ndim() == 0) {
        promoted = parts
            .iter()
            .map(|p| if p.ndim() == 0 { p.reshape(&[1]) } else { Ok(p.clone()) })
            .collect::<Result<_, _>>()?;
        &promoted
    } else {
        parts
    };
    let dtype = parts[0].dtype();
    let uniform = parts.iter().all(|p| p.dtype() == dtype);
    let target = if uniform { dtype } else { DType::Real };
    fn cat<A: Clone>(arrays: Vec<ArcD<A>>) -> Result<ArcD<A>, MeshFieldError> {
        let views: Vec<_> = arrays.iter().map(|a| a.view()).collect();
        ndarray::concatenate(Axis(0), &views)
            .map(|a| a.into_shared())
            .map_err(|_| MeshFieldError::ShapeMismatch {
                left: arrays.first().map(|a| a.shape().to_vec()).unwrap_or_default(),
                right: arrays.last().map(|a| a.shape().to_vec()).unwrap_or_default(),
            })
    }
    match target {
        DType::Real => cat(parts.iter().map(Values::as_real).collect()).map(Values::Real),
        DType::Int => cat(parts.iter().map(Values::as_int).collect()).map(Values::Int),
        DType::Bool => cat(parts.iter().map(Values::as_bool).collect()).map(Values::Bool),
        DType::Byte => {
            let arrays: Vec<ArcD<u8>> = parts
                .iter()
                .map(|p| match p {
                    Values::Byte(a) => a.clone(),
                    other => other.as_int().mapv(|x| x as u8).into_shared(),
                })
                .collect();
            cat(arrays).map(Values::Byte)
        }
    }
}
