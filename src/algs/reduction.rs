//! Reductions over adapter arrays, serial and rank-parallel.
//!
//! Each reduction is one [`ReduceSpec`]: the fold operation doubles as the
//! per-buffer kernel, the cross-block combiner and the cross-rank
//! all-reduce operation. The parallel path is a two-phase exchange: ranks
//! first MAX-all-reduce their local result dimensions (padded to two,
//! zero-filled when a rank has no data), then all-reduce the values
//! themselves, with ranks lacking data contributing the operation's
//! default so they receive the group result like everyone else.
//!
//! Reducing along `axis == 1` is local to each tuple and never involves
//! the controller; on composites it returns a composite of per-block
//! results.

use crate::adapter::array::{DataArray, FieldArray};
use crate::algs::controller::{global_controller, Controller, ReduceOp};
use crate::error::MeshFieldError;
use crate::values::{ArcD, DType, Values};
use ndarray::{Array, Axis, IxDyn, Zip};

/// Strategy record for one reduction.
#[derive(Clone, Copy, Debug)]
pub struct ReduceSpec {
    /// Fold operation, also used block-to-block and rank-to-rank.
    pub op: ReduceOp,
    /// Contribution of a rank with no data.
    pub default: f64,
    /// Coerce the result to real, regardless of input dtype.
    pub coerce_real: bool,
    /// Fold truthiness and return a boolean result.
    pub bool_result: bool,
}

pub(crate) const SUM_SPEC: ReduceSpec = ReduceSpec {
    op: ReduceOp::Sum,
    default: 0.0,
    coerce_real: true,
    bool_result: false,
};

pub(crate) const MIN_SPEC: ReduceSpec = ReduceSpec {
    op: ReduceOp::Min,
    default: f64::INFINITY,
    coerce_real: false,
    bool_result: false,
};

pub(crate) const MAX_SPEC: ReduceSpec = ReduceSpec {
    op: ReduceOp::Max,
    default: f64::NEG_INFINITY,
    coerce_real: false,
    bool_result: false,
};

const ALL_SPEC: ReduceSpec = ReduceSpec {
    op: ReduceOp::LogicalAnd,
    default: 1.0,
    coerce_real: false,
    bool_result: true,
};

fn fold_f64(op: ReduceOp) -> fn(f64, f64) -> f64 {
    match op {
        ReduceOp::Sum => |a, b| a + b,
        ReduceOp::Min => f64::min,
        ReduceOp::Max => f64::max,
        ReduceOp::LogicalAnd => |a, b| {
            if a != 0.0 && b != 0.0 {
                1.0
            } else {
                0.0
            }
        },
    }
}

fn identity_f64(op: ReduceOp) -> f64 {
    match op {
        ReduceOp::Sum => 0.0,
        ReduceOp::Min => f64::INFINITY,
        ReduceOp::Max => f64::NEG_INFINITY,
        ReduceOp::LogicalAnd => 1.0,
    }
}

fn scalar0(v: f64) -> ArcD<f64> {
    Array::from_elem(IxDyn(&[]), v).into_shared()
}

/// Fold one buffer over an axis (or everything).
pub(crate) fn reduce_kernel(
    v: &Values,
    axis: Option<usize>,
    spec: &ReduceSpec,
) -> Result<Values, MeshFieldError> {
    if let Some(ax) = axis {
        if v.ndim() > 0 && ax >= v.ndim() {
            return Err(MeshFieldError::UnsupportedIndex(
                "reduction axis out of range",
            ));
        }
    }
    let a = v.as_real();
    let f = fold_f64(spec.op);
    let init = identity_f64(spec.op);
    let a = if spec.bool_result {
        a.mapv(|x| if x != 0.0 { 1.0 } else { 0.0 }).into_shared()
    } else {
        a
    };
    let folded = match axis {
        // A zero-dimensional buffer has no axis to remove; fold everything.
        Some(ax) if v.ndim() > 0 => a
            .fold_axis(Axis(ax), init, |&acc, &x| f(acc, x))
            .into_shared(),
        _ => scalar0(a.iter().fold(init, |acc, &x| f(acc, x))),
    };
    Ok(restore_dtype(Values::Real(folded), v.dtype(), spec))
}

fn restore_dtype(result: Values, input: DType, spec: &ReduceSpec) -> Values {
    if spec.bool_result {
        result.astype(DType::Bool)
    } else if spec.coerce_real || input == DType::Real {
        result
    } else {
        result.astype(DType::Int)
    }
}

/// Element-wise combine of two same-shaped partial results.
fn combine(a: &Values, b: &Values, spec: &ReduceSpec) -> Result<Values, MeshFieldError> {
    if a.shape() != b.shape() {
        return Err(MeshFieldError::ShapeMismatch {
            left: a.shape().to_vec(),
            right: b.shape().to_vec(),
        });
    }
    let f = fold_f64(spec.op);
    let (ra, rb) = (a.as_real(), b.as_real());
    let out = Zip::from(&ra).and(&rb).map_collect(|&x, &y| f(x, y));
    Ok(restore_dtype(
        Values::Real(out.into_shared()),
        a.dtype(),
        spec,
    ))
}

/// Serial reduction: folds a plain buffer, folds composite blocks together
/// (axis `None`/`0`), or reduces per block (axis `1`).
pub(crate) fn serial_reduce(
    a: &FieldArray,
    axis: Option<usize>,
    spec: &ReduceSpec,
) -> Result<FieldArray, MeshFieldError> {
    match a {
        FieldArray::None => Ok(FieldArray::None),
        FieldArray::Data(d) => Ok(FieldArray::Data(DataArray::computed(
            reduce_kernel(d.values(), axis, spec)?,
            d,
        ))),
        FieldArray::Composite(c) => {
            if axis == Some(1) {
                return Ok(FieldArray::Composite(
                    c.try_map_blocks(|b| serial_reduce(b, axis, spec))?,
                ));
            }
            let mut acc: Option<(Values, DataArray)> = None;
            for b in c.blocks() {
                let FieldArray::Data(d) = b else { continue };
                let part = reduce_kernel(d.values(), axis, spec)?;
                acc = Some(match acc {
                    None => (part, d.clone()),
                    Some((prev, like)) => (combine(&prev, &part, spec)?, like),
                });
            }
            Ok(match acc {
                None => FieldArray::None,
                Some((v, like)) => FieldArray::Data(DataArray::computed(v, &like)),
            })
        }
    }
}

/// Encode a local result's shape for the dimension exchange.
fn encode_dims(local: &FieldArray) -> [f64; 2] {
    match local {
        FieldArray::Data(d) => {
            let s = d.shape();
            match s.len() {
                0 => [1.0, 0.0],
                1 => [s[0] as f64, 0.0],
                _ => [s[0] as f64, s[1..].iter().product::<usize>() as f64],
            }
        }
        _ => [0.0, 0.0],
    }
}

fn global_reduce(
    a: &FieldArray,
    axis: Option<usize>,
    controller: Option<&dyn Controller>,
    spec: &ReduceSpec,
) -> Result<FieldArray, MeshFieldError> {
    let local = serial_reduce(a, axis, spec)?;
    if axis == Some(1) {
        return Ok(local);
    }
    let owned;
    let ctrl: &dyn Controller = match controller {
        Some(c) => c,
        None => {
            owned = global_controller();
            owned.as_ref()
        }
    };
    if !ctrl.is_parallel() {
        return Ok(local);
    }

    // Phase one: agree on the result size.
    let dims = ctrl.allreduce_f64(&encode_dims(&local), ReduceOp::Max);
    let d0 = dims[0] as usize;
    let d1 = dims[1] as usize;
    if d0 == 0 {
        return Ok(FieldArray::None);
    }
    let n = d0 * d1.max(1);

    // Phase two: exchange values, defaults standing in for missing data.
    let buffer = match &local {
        FieldArray::Data(d) => {
            let mut flat = d.values().iter_real();
            if spec.bool_result {
                for x in &mut flat {
                    *x = if *x != 0.0 { 1.0 } else { 0.0 };
                }
            }
            flat.resize(n, spec.default);
            flat
        }
        _ => vec![spec.default; n],
    };
    let reduced = ctrl.allreduce_f64(&buffer, spec.op);

    let shape: Vec<usize> = match &local {
        FieldArray::Data(d) => d.shape().to_vec(),
        _ => {
            if axis.is_none() && n == 1 {
                vec![]
            } else if d1 == 0 {
                vec![d0]
            } else {
                vec![d0, d1]
            }
        }
    };
    let out = Values::from_vec_f64(reduced).reshape(&shape)?;
    let dtype = match &local {
        FieldArray::Data(d) => d.dtype(),
        _ => DType::Real,
    };
    let out = restore_dtype(out, dtype, spec);
    Ok(match &local {
        FieldArray::Data(d) => FieldArray::Data(DataArray::computed(out, d)),
        _ => FieldArray::Data(DataArray::new(out)),
    })
}

/// Sum over all elements (`axis == None`), per component (`axis == 0`) or
/// per tuple (`axis == 1`); real-valued, parallel-aware.
///
/// # Errors
/// `UnsupportedIndex` for an axis beyond the array rank; `ShapeMismatch`
/// when composite block results cannot be combined.
pub fn sum(
    a: &FieldArray,
    axis: Option<usize>,
    controller: Option<&dyn Controller>,
) -> Result<FieldArray, MeshFieldError> {
    global_reduce(a, axis, controller, &SUM_SPEC)
}

/// Minimum, with the same axis semantics as [`sum`].
///
/// # Errors
/// See [`sum`].
pub fn min(
    a: &FieldArray,
    axis: Option<usize>,
    controller: Option<&dyn Controller>,
) -> Result<FieldArray, MeshFieldError> {
    global_reduce(a, axis, controller, &MIN_SPEC)
}

/// Maximum, with the same axis semantics as [`sum`].
///
/// # Errors
/// See [`sum`].
pub fn max(
    a: &FieldArray,
    axis: Option<usize>,
    controller: Option<&dyn Controller>,
) -> Result<FieldArray, MeshFieldError> {
    global_reduce(a, axis, controller, &MAX_SPEC)
}

/// True where every element (all ranks included) is truthy; boolean result.
///
/// # Errors
/// See [`sum`].
pub fn all(
    a: &FieldArray,
    axis: Option<usize>,
    controller: Option<&dyn Controller>,
) -> Result<FieldArray, MeshFieldError> {
    global_reduce(a, axis, controller, &ALL_SPEC)
}

/// Element count: total elements for `axis == None`, tuple count for
/// `axis == 0`, summed over ranks.
///
/// # Errors
/// `UnsupportedIndex` for any other axis.
pub fn count(
    a: &FieldArray,
    axis: Option<usize>,
    controller: Option<&dyn Controller>,
) -> Result<FieldArray, MeshFieldError> {
    let local: usize = match axis {
        None => match a {
            FieldArray::None => 0,
            FieldArray::Data(d) => d.values().size(),
            FieldArray::Composite(c) => c
                .blocks()
                .iter()
                .filter_map(|b| b.as_data().map(|d| d.values().size()))
                .sum(),
        },
        Some(0) => a.len(),
        Some(_) => {
            return Err(MeshFieldError::UnsupportedIndex(
                "count supports axis 0 only",
            ));
        }
    };
    let owned;
    let ctrl: &dyn Controller = match controller {
        Some(c) => c,
        None => {
            owned = global_controller();
            owned.as_ref()
        }
    };
    let total = if ctrl.is_parallel() {
        ctrl.allreduce_i64(&[local as i64], ReduceOp::Sum)[0]
    } else {
        local as i64
    };
    Ok(FieldArray::from(Values::int_scalar(total)))
}

/// Arithmetic mean with the same axis semantics as [`sum`]; real-valued.
///
/// # Errors
/// See [`sum`].
pub fn mean(
    a: &FieldArray,
    axis: Option<usize>,
    controller: Option<&dyn Controller>,
) -> Result<FieldArray, MeshFieldError> {
    let total = sum(a, axis, controller)?;
    let denom = match axis {
        Some(1) => {
            // Per-tuple mean divides by the component count, a local figure.
            let cols = match a {
                FieldArray::Data(d) if d.values().ndim() > 1 => d.shape()[1],
                FieldArray::Composite(c) => {
                    let s = c.shape();
                    if s.len() > 1 { s[1] } else { 1 }
                }
                _ => 1,
            };
            FieldArray::from(cols as f64)
        }
        _ => count(a, axis, controller)?.astype(DType::Real),
    };
    total.binary(&denom, crate::values::BinOp::Div)
}

/// Population variance (`Σ(x − μ)² / n`) with the same axis semantics as
/// [`sum`]; real-valued.
///
/// # Errors
/// See [`sum`].
pub fn var(
    a: &FieldArray,
    axis: Option<usize>,
    controller: Option<&dyn Controller>,
) -> Result<FieldArray, MeshFieldError> {
    let mu = mean(a, axis, controller)?;
    let dev = a.binary(&mu, crate::values::BinOp::Sub)?;
    let sq = dev.binary(&dev, crate::values::BinOp::Mul)?;
    mean(&sq, axis, controller)
}

/// Population standard deviation; real-valued.
///
/// # Errors
/// See [`sum`].
pub fn std(
    a: &FieldArray,
    axis: Option<usize>,
    controller: Option<&dyn Controller>,
) -> Result<FieldArray, MeshFieldError> {
    Ok(crate::algs::elementwise::sqrt(&var(a, axis, controller)?))
}
