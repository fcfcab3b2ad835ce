//! Constant semantics shared by folding and simulation.
//!
//! Every operator has one deterministic interpretation over arbitrary
//! precision integers. Constant folding in the value algebra and the
//! simulator's evaluation nodes both go through these functions so the two
//! can never disagree.

use num_bigint::{BigInt, BigUint};
use num_traits::{One, Signed, Zero};

use crate::shape::Shape;
use crate::value::Op;

/// All-ones mask of `width` bits.
fn mask(width: u32) -> BigInt {
    (BigInt::one() << (width as usize)) - 1
}

/// Truncate `value` into `shape` using two's complement wraparound, reading
/// the result back under the shape's signedness.
pub fn truncate(value: &BigInt, shape: Shape) -> BigInt {
    let width = shape.width();
    if width == 0 {
        return BigInt::zero();
    }
    let bits = value & mask(width);
    if shape.is_signed() && !(&bits & (BigInt::one() << (width as usize - 1))).is_zero() {
        bits - (BigInt::one() << (width as usize))
    } else {
        bits
    }
}

/// The raw two's complement bit pattern of `value` in `width` bits.
pub fn to_bits(value: &BigInt, width: u32) -> BigUint {
    if width == 0 {
        return BigUint::zero();
    }
    (value & mask(width))
        .to_biguint()
        .unwrap_or_else(BigUint::zero)
}

/// Read a bit pattern back as an integer under `shape`.
pub fn from_bits(bits: &BigUint, shape: Shape) -> BigInt {
    truncate(&BigInt::from(bits.clone()), shape)
}

/// Floor division. Division by zero yields zero; the pipeline never traps.
pub fn floor_div(a: &BigInt, b: &BigInt) -> BigInt {
    if b.is_zero() {
        return BigInt::zero();
    }
    let q = a / b;
    let r = a % b;
    if !r.is_zero() && (r.is_negative() != b.is_negative()) {
        q - 1
    } else {
        q
    }
}

/// Floor modulo: the result takes the sign of the divisor. Modulo by zero
/// yields zero.
pub fn floor_rem(a: &BigInt, b: &BigInt) -> BigInt {
    if b.is_zero() {
        return BigInt::zero();
    }
    let r = a % b;
    if !r.is_zero() && (r.is_negative() != b.is_negative()) {
        r + b
    } else {
        r
    }
}

fn bool_int(v: bool) -> BigInt {
    if v { BigInt::one() } else { BigInt::zero() }
}

/// Apply `op` to already-interpreted operand values.
///
/// Operands carry their shapes because the reductions need the operand
/// width. The result is the mathematically exact value; the caller truncates
/// it into the operator's inferred result shape (which also realizes
/// `as_signed`/`as_unsigned` reinterpretation).
pub fn eval_op(op: Op, args: &[(BigInt, Shape)]) -> BigInt {
    match op {
        Op::Add => &args[0].0 + &args[1].0,
        Op::Sub => &args[0].0 - &args[1].0,
        Op::Neg => -&args[0].0,
        Op::Mul => &args[0].0 * &args[1].0,
        Op::Div => floor_div(&args[0].0, &args[1].0),
        Op::Rem => floor_rem(&args[0].0, &args[1].0),
        Op::Eq => bool_int(args[0].0 == args[1].0),
        Op::Ne => bool_int(args[0].0 != args[1].0),
        Op::Lt => bool_int(args[0].0 < args[1].0),
        Op::Le => bool_int(args[0].0 <= args[1].0),
        Op::Gt => bool_int(args[0].0 > args[1].0),
        Op::Ge => bool_int(args[0].0 >= args[1].0),
        Op::And => &args[0].0 & &args[1].0,
        Op::Or => &args[0].0 | &args[1].0,
        Op::Xor => &args[0].0 ^ &args[1].0,
        Op::Not => -&args[0].0 - 1,
        Op::Shl => {
            let amount = biguint_usize(&args[1].0);
            &args[0].0 << amount
        }
        Op::Shr => {
            let amount = biguint_usize(&args[1].0);
            &args[0].0 >> amount
        }
        Op::All => {
            let width = args[0].1.width();
            let bits = to_bits(&args[0].0, width);
            bool_int(width == 0 || bits == to_bits(&(-BigInt::one()), width))
        }
        Op::Any | Op::Bool => {
            bool_int(!to_bits(&args[0].0, args[0].1.width()).is_zero())
        }
        Op::XorReduce => {
            let bits = to_bits(&args[0].0, args[0].1.width());
            bool_int(bits.count_ones() % 2 == 1)
        }
        Op::AsSigned | Op::AsUnsigned => args[0].0.clone(),
        Op::Mux => {
            if !to_bits(&args[0].0, args[0].1.width()).is_zero() {
                args[1].0.clone()
            } else {
                args[2].0.clone()
            }
        }
    }
}

/// Shift amounts are unsigned by construction and bounded by the expression
/// width ceiling, so they always fit a machine word.
fn biguint_usize(v: &BigInt) -> usize {
    use num_traits::ToPrimitive;
    v.to_usize().unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> BigInt {
        BigInt::from(v)
    }

    #[test]
    fn test_truncate_unsigned() {
        assert_eq!(truncate(&int(300), Shape::unsigned(8)), int(44));
        assert_eq!(truncate(&int(-1), Shape::unsigned(4)), int(15));
        assert_eq!(truncate(&int(7), Shape::unsigned(0)), int(0));
    }

    #[test]
    fn test_truncate_signed() {
        assert_eq!(truncate(&int(200), Shape::signed(8)), int(-56));
        assert_eq!(truncate(&int(-1), Shape::signed(4)), int(-1));
        assert_eq!(truncate(&int(8), Shape::signed(4)), int(-8));
        assert_eq!(truncate(&int(7), Shape::signed(4)), int(7));
    }

    #[test]
    fn test_floor_division() {
        assert_eq!(floor_div(&int(7), &int(2)), int(3));
        assert_eq!(floor_div(&int(-7), &int(2)), int(-4));
        assert_eq!(floor_div(&int(7), &int(-2)), int(-4));
        assert_eq!(floor_div(&int(-7), &int(-2)), int(3));
        assert_eq!(floor_div(&int(7), &int(0)), int(0));
        assert_eq!(floor_rem(&int(7), &int(2)), int(1));
        assert_eq!(floor_rem(&int(-7), &int(2)), int(1));
        assert_eq!(floor_rem(&int(7), &int(-2)), int(-1));
        assert_eq!(floor_rem(&int(7), &int(0)), int(0));
    }

    #[test]
    fn test_reductions() {
        let u4 = Shape::unsigned(4);
        assert_eq!(eval_op(Op::All, &[(int(15), u4)]), int(1));
        assert_eq!(eval_op(Op::All, &[(int(7), u4)]), int(0));
        assert_eq!(eval_op(Op::Any, &[(int(0), u4)]), int(0));
        assert_eq!(eval_op(Op::Any, &[(int(8), u4)]), int(1));
        assert_eq!(eval_op(Op::XorReduce, &[(int(0b0110), u4)]), int(0));
        assert_eq!(eval_op(Op::XorReduce, &[(int(0b0111), u4)]), int(1));
        // All bits of a signed -1 are set.
        assert_eq!(eval_op(Op::All, &[(int(-1), Shape::signed(4))]), int(1));
    }

    #[test]
    fn test_mux_and_compare() {
        let u4 = Shape::unsigned(4);
        let args = [(int(2), u4), (int(10), u4), (int(20), u4)];
        assert_eq!(eval_op(Op::Mux, &args), int(10));
        let args = [(int(0), u4), (int(10), u4), (int(20), u4)];
        assert_eq!(eval_op(Op::Mux, &args), int(20));
        assert_eq!(eval_op(Op::Lt, &[(int(-1), Shape::signed(2)), (int(1), u4)]), int(1));
    }
}
