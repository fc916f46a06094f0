//! Element-wise algorithms lifted over adapter arrays.
//!
//! Every function here follows the same lifting rules: the sentinel
//! propagates (an absent partition stays absent), composite arrays map
//! block by block, and results inherit the operand's association and
//! dataset. The one deliberate exception is [`bitwise_or`], where the
//! sentinel acts as the identity so ghost masks accumulate across arrays
//! that may be absent on some partitions.

use crate::adapter::array::{DataArray, FieldArray};
use crate::dataset::ghost;
use crate::error::MeshFieldError;
use crate::values::{self, BinOp, DType, Values};

/// Lift a buffer-level unary function over a field array.
pub fn apply_unary(a: &FieldArray, f: &dyn Fn(&Values) -> Values) -> FieldArray {
    match a {
        FieldArray::None => FieldArray::None,
        FieldArray::Data(d) => FieldArray::Data(DataArray::computed(f(d.values()), d)),
        FieldArray::Composite(c) => FieldArray::Composite(c.map_blocks(|b| match b {
            FieldArray::Data(d) => FieldArray::Data(DataArray::computed(f(d.values()), d)),
            _ => FieldArray::None,
        })),
    }
}

macro_rules! real_unary {
    ($(#[$doc:meta])* $name:ident, $f:expr) => {
        $(#[$doc])*
        pub fn $name(a: &FieldArray) -> FieldArray {
            apply_unary(a, &|v| values::map_real(v, $f))
        }
    };
}

real_unary!(/// Element-wise absolute value.
    abs, f64::abs);
real_unary!(/// Element-wise square root.
    sqrt, f64::sqrt);
real_unary!(/// Element-wise natural exponential.
    exp, f64::exp);
real_unary!(/// Element-wise natural logarithm.
    log, f64::ln);
real_unary!(/// Element-wise base-10 logarithm.
    log10, f64::log10);
real_unary!(/// Element-wise sine.
    sin, f64::sin);
real_unary!(/// Element-wise cosine.
    cos, f64::cos);
real_unary!(/// Element-wise tangent.
    tan, f64::tan);
real_unary!(/// Element-wise arcsine.
    arcsin, f64::asin);
real_unary!(/// Element-wise arccosine.
    arccos, f64::acos);
real_unary!(/// Element-wise arctangent.
    arctan, f64::atan);
real_unary!(/// Element-wise hyperbolic sine.
    sinh, f64::sinh);
real_unary!(/// Element-wise hyperbolic cosine.
    cosh, f64::cosh);
real_unary!(/// Element-wise hyperbolic tangent.
    tanh, f64::tanh);
real_unary!(/// Element-wise inverse hyperbolic sine.
    arcsinh, f64::asinh);
real_unary!(/// Element-wise inverse hyperbolic cosine.
    arccosh, f64::acosh);
real_unary!(/// Element-wise inverse hyperbolic tangent.
    arctanh, f64::atanh);
real_unary!(/// Element-wise reciprocal.
    reciprocal, |x| 1.0 / x);
real_unary!(/// Element-wise square.
    square, |x| x * x);
real_unary!(/// Element-wise floor.
    floor, f64::floor);
real_unary!(/// Element-wise ceiling.
    ceil, f64::ceil);
real_unary!(/// Element-wise rounding to the nearest even integer.
    rint, |x: f64| {
        let r = x.round();
        if (x - x.trunc()).abs() == 0.5 && r % 2.0 != 0.0 {
            r - x.signum()
        } else {
            r
        }
    });

/// Element-wise negation.
pub fn negative(a: &FieldArray) -> FieldArray {
    apply_unary(a, &values::negate)
}

/// Element-wise NaN test, boolean result.
pub fn isnan(a: &FieldArray) -> FieldArray {
    apply_unary(a, &values::isnan)
}

/// Element-wise logical negation of truthiness.
pub fn logical_not(a: &FieldArray) -> FieldArray {
    apply_unary(a, &values::logical_not)
}

/// Insert a length-1 axis at `axis`.
pub fn expand_dims(a: &FieldArray, axis: usize) -> FieldArray {
    apply_unary(a, &|v| v.expand_dims(axis))
}

macro_rules! binary_fn {
    ($(#[$doc:meta])* $name:ident, $op:expr) => {
        $(#[$doc])*
        ///
        /// # Errors
        /// Propagates broadcast and dtype failures from the kernel.
        pub fn $name(a: &FieldArray, b: &FieldArray) -> Result<FieldArray, MeshFieldError> {
            a.binary(b, $op)
        }
    };
}

binary_fn!(/// Element-wise addition.
    add, BinOp::Add);
binary_fn!(/// Element-wise subtraction.
    subtract, BinOp::Sub);
binary_fn!(/// Element-wise multiplication.
    multiply, BinOp::Mul);
binary_fn!(/// Element-wise real division.
    divide, BinOp::Div);
binary_fn!(/// Element-wise modulo with the divisor's sign.
    remainder, BinOp::Rem);
binary_fn!(/// Element-wise power, real result.
    power, BinOp::Pow);
binary_fn!(/// Element-wise bitwise AND of integral operands.
    bitwise_and, BinOp::BitAnd);
binary_fn!(/// Element-wise bitwise XOR of integral operands.
    bitwise_xor, BinOp::BitXor);
binary_fn!(/// Element-wise left shift of integral operands.
    left_shift, BinOp::Shl);
binary_fn!(/// Element-wise right shift of integral operands.
    right_shift, BinOp::Shr);

/// Element-wise bitwise OR, with the sentinel as identity.
///
/// Composite operands OR block by block; a block absent on one side passes
/// the other side's block through unchanged.
///
/// # Errors
/// `BlockCountMismatch` for composite operands of differing structure,
/// `DTypeError` for real operands.
pub fn bitwise_or(a: &FieldArray, b: &FieldArray) -> Result<FieldArray, MeshFieldError> {
    match (a, b) {
        (FieldArray::None, other) | (other, FieldArray::None) => Ok(other.clone()),
        (FieldArray::Composite(ca), FieldArray::Composite(cb)) => {
            let (ba, bb) = (ca.blocks(), cb.blocks());
            if ba.len() != bb.len() {
                return Err(MeshFieldError::BlockCountMismatch {
                    left: ba.len(),
                    right: bb.len(),
                });
            }
            let blocks = ba
                .iter()
                .zip(bb.iter())
                .map(|(x, y)| bitwise_or(x, y))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(FieldArray::Composite(ca.derived(blocks)))
        }
        (FieldArray::Composite(ca), other) => {
            let blocks = ca
                .blocks()
                .iter()
                .map(|x| bitwise_or(x, other))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(FieldArray::Composite(ca.derived(blocks)))
        }
        (other, FieldArray::Composite(cb)) => {
            let blocks = cb
                .blocks()
                .iter()
                .map(|y| bitwise_or(other, y))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(FieldArray::Composite(cb.derived(blocks)))
        }
        _ => a.binary(b, BinOp::BitOr),
    }
}

/// Dispatch a unary algorithm by name.
///
/// # Errors
/// [`MeshFieldError::UnsupportedUfunc`] for a name with no registered
/// implementation.
pub fn apply_ufunc(name: &str, a: &FieldArray) -> Result<FieldArray, MeshFieldError> {
    let f: fn(&FieldArray) -> FieldArray = match name {
        "abs" => abs,
        "sqrt" => sqrt,
        "exp" => exp,
        "log" => log,
        "log10" => log10,
        "sin" => sin,
        "cos" => cos,
        "tan" => tan,
        "arcsin" => arcsin,
        "arccos" => arccos,
        "arctan" => arctan,
        "sinh" => sinh,
        "cosh" => cosh,
        "tanh" => tanh,
        "arcsinh" => arcsinh,
        "arccosh" => arccosh,
        "arctanh" => arctanh,
        "negative" => negative,
        "reciprocal" => reciprocal,
        "square" => square,
        "floor" => floor,
        "ceil" => ceil,
        "rint" => rint,
        "isnan" => isnan,
        "logical_not" => logical_not,
        other => return Err(MeshFieldError::UnsupportedUfunc(other.to_string())),
    };
    Ok(f(a))
}

fn make_mask_from_nans(
    array: &FieldArray,
    ghosts: &FieldArray,
    hidden_bit: u8,
) -> Result<FieldArray, MeshFieldError> {
    let nan_bits = isnan(array)
        .astype(DType::Byte)
        .binary(&FieldArray::from(i64::from(hidden_bit)), BinOp::Mul)?
        .astype(DType::Byte);
    bitwise_or(&nan_bits, ghosts).map(|m| m.astype(DType::Byte))
}

/// Ghost-point bits hiding every NaN element of `array`, OR-ed into the
/// existing ghost array (which may be the sentinel).
///
/// # Errors
/// Propagates broadcast failures between the NaN mask and the ghost array.
pub fn make_point_mask_from_nans(
    array: &FieldArray,
    ghosts: &FieldArray,
) -> Result<FieldArray, MeshFieldError> {
    make_mask_from_nans(array, ghosts, ghost::HIDDEN_POINT)
}

/// Ghost-cell bits hiding every NaN element of `array`, OR-ed into the
/// existing ghost array (which may be the sentinel).
///
/// # Errors
/// Propagates broadcast failures between the NaN mask and the ghost array.
pub fn make_cell_mask_from_nans(
    array: &FieldArray,
    ghosts: &FieldArray,
) -> Result<FieldArray, MeshFieldError> {
    make_mask_from_nans(array, ghosts, ghost::HIDDEN_CELL)
}
