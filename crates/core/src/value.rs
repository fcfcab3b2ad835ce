//! The value algebra: immutable expression DAGs with shape inference.
//!
//! Values are cheap structural nodes. Signals are the only leaves with
//! identity; everything else compares structurally. Construction is
//! width-checked, and any node whose operands are all constants folds to a
//! constant of the inferred shape at construction time.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use num_bigint::BigInt;
use num_traits::Zero;
use serde::Serialize;
use tracing::warn;

use crate::error::ShapeError;
use crate::eval;
use crate::shape::{MAX_WIDTH, Shape, bits_for};

/// A source location captured at a DSL call site, carried through to
/// diagnostics and netlist attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SrcLoc {
    pub file: &'static str,
    pub line: u32,
}

impl SrcLoc {
    #[track_caller]
    pub fn caller() -> SrcLoc {
        let loc = std::panic::Location::caller();
        SrcLoc { file: loc.file(), line: loc.line() }
    }
}

impl std::fmt::Display for SrcLoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

// ============================================================================
//                                 SIGNALS
// ============================================================================

pub type SignalId = u64;

static NEXT_SIGNAL_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
pub struct SignalData {
    id: SignalId,
    name: String,
    shape: Shape,
    init: BigInt,
    reset_less: bool,
    src_loc: SrcLoc,
}

/// A named storage element with stable identity.
///
/// Cloning a `Signal` clones the reference, not the signal: two clones
/// compare equal and address the same storage. Ids are allocated
/// monotonically at creation time and participate in deterministic
/// ordering throughout the pipeline.
#[derive(Debug, Clone)]
pub struct Signal(Rc<SignalData>);

impl Signal {
    /// A fresh unsigned or signed signal with a generated `sig$<id>` name
    /// and an all-zero init value.
    #[track_caller]
    pub fn new(shape: impl Into<Shape>) -> Signal {
        SignalBuilder::at(shape.into(), SrcLoc::caller()).build()
    }

    #[track_caller]
    pub fn named(shape: impl Into<Shape>, name: &str) -> Signal {
        SignalBuilder::at(shape.into(), SrcLoc::caller()).name(name).build()
    }

    #[track_caller]
    pub fn builder(shape: impl Into<Shape>) -> SignalBuilder {
        SignalBuilder::at(shape.into(), SrcLoc::caller())
    }

    pub fn id(&self) -> SignalId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn shape(&self) -> Shape {
        self.0.shape
    }

    pub fn width(&self) -> u32 {
        self.0.shape.width()
    }

    /// The value this signal holds out of reset (and before any driver
    /// takes effect).
    pub fn init(&self) -> &BigInt {
        &self.0.init
    }

    pub fn is_reset_less(&self) -> bool {
        self.0.reset_less
    }

    pub fn src_loc(&self) -> SrcLoc {
        self.0.src_loc
    }

    pub fn value(&self) -> Value {
        Value::Signal(self.clone())
    }
}

impl PartialEq for Signal {
    fn eq(&self, other: &Signal) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Signal {}

impl std::hash::Hash for Signal {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl PartialOrd for Signal {
    fn partial_cmp(&self, other: &Signal) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Signal {
    fn cmp(&self, other: &Signal) -> std::cmp::Ordering {
        self.0.id.cmp(&other.0.id)
    }
}

/// Configuration for signal construction.
pub struct SignalBuilder {
    shape: Shape,
    name: Option<String>,
    init: BigInt,
    reset_less: bool,
    src_loc: SrcLoc,
}

impl SignalBuilder {
    fn at(shape: Shape, src_loc: SrcLoc) -> SignalBuilder {
        SignalBuilder {
            shape,
            name: None,
            init: BigInt::zero(),
            reset_less: false,
            src_loc,
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn init(mut self, init: impl Into<BigInt>) -> Self {
        self.init = init.into();
        self
    }

    /// A reset-less signal keeps its value through a synchronous reset.
    pub fn reset_less(mut self) -> Self {
        self.reset_less = true;
        self
    }

    pub fn build(self) -> Signal {
        let id = NEXT_SIGNAL_ID.fetch_add(1, Ordering::SeqCst);
        let init = eval::truncate(&self.init, self.shape);
        Signal(Rc::new(SignalData {
            id,
            name: self.name.unwrap_or_else(|| format!("sig${}", id)),
            shape: self.shape,
            init,
            reset_less: self.reset_less,
            src_loc: self.src_loc,
        }))
    }
}

// ============================================================================
//                                OPERATORS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Op {
    Add,
    Sub,
    Neg,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Xor,
    Not,
    Shl,
    Shr,
    All,
    Any,
    XorReduce,
    Bool,
    AsSigned,
    AsUnsigned,
    Mux,
}

impl Op {
    fn symbol(&self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Sub | Op::Neg => "-",
            Op::Mul => "*",
            Op::Div => "//",
            Op::Rem => "%",
            Op::Eq => "==",
            Op::Ne => "!=",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::And => "&",
            Op::Or => "|",
            Op::Xor => "^",
            Op::Not => "~",
            Op::Shl => "<<",
            Op::Shr => ">>",
            Op::All => "all",
            Op::Any => "any",
            Op::XorReduce => "xor",
            Op::Bool => "bool",
            Op::AsSigned => "as_signed",
            Op::AsUnsigned => "as_unsigned",
            Op::Mux => "mux",
        }
    }
}

/// Result shape of `op` applied to operands of the given shapes.
///
/// The rules are local: the result depends only on the operand shapes.
/// Operands are conceptually extended to the result width, zero-extended
/// when unsigned and sign-extended when signed.
fn op_shape(op: Op, shapes: &[Shape]) -> Result<Shape, ShapeError> {
    let either = |a: Shape, b: Shape| a.is_signed() || b.is_signed();
    let wide = match op {
        Op::Add | Op::Sub => {
            let (a, b) = (shapes[0], shapes[1]);
            (a.width().max(b.width()) as u64 + 1, either(a, b))
        }
        Op::Neg => (shapes[0].width() as u64 + 1, true),
        Op::Mul => {
            let (a, b) = (shapes[0], shapes[1]);
            (a.width() as u64 + b.width() as u64, either(a, b))
        }
        Op::Div | Op::Rem => {
            let (a, b) = (shapes[0], shapes[1]);
            (a.width() as u64 + either(a, b) as u64, either(a, b))
        }
        Op::Eq | Op::Ne | Op::Lt | Op::Le | Op::Gt | Op::Ge => (1, false),
        Op::And | Op::Or | Op::Xor => {
            let (a, b) = (shapes[0], shapes[1]);
            (a.width().max(b.width()) as u64, either(a, b))
        }
        Op::Not => (shapes[0].width() as u64, shapes[0].is_signed()),
        Op::Shl => {
            let (a, b) = (shapes[0], shapes[1]);
            if b.is_signed() {
                return Err(ShapeError::SignedShiftAmount);
            }
            if b.width() >= 32 {
                return Err(ShapeError::WidthCeiling { width: u64::MAX });
            }
            (a.width() as u64 + (1u64 << b.width()) - 1, a.is_signed())
        }
        Op::Shr => {
            let (a, b) = (shapes[0], shapes[1]);
            if b.is_signed() {
                return Err(ShapeError::SignedShiftAmount);
            }
            (a.width() as u64, a.is_signed())
        }
        Op::All | Op::Any | Op::XorReduce | Op::Bool => (1, false),
        Op::AsSigned => (shapes[0].width() as u64, true),
        Op::AsUnsigned => (shapes[0].width() as u64, false),
        Op::Mux => {
            let (a, b) = (shapes[1], shapes[2]);
            (a.width().max(b.width()) as u64, either(a, b))
        }
    };
    let (width, signed) = wide;
    if width > MAX_WIDTH as u64 {
        return Err(ShapeError::WidthCeiling { width });
    }
    Ok(Shape::new(width as u32, signed))
}

// ============================================================================
//                                  VALUES
// ============================================================================

/// An immutable expression node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Const(ConstValue),
    Signal(Signal),
    Op {
        op: Op,
        args: Vec<Value>,
        shape: Shape,
    },
    Slice {
        base: Box<Value>,
        start: u32,
        stop: u32,
    },
    Part {
        base: Box<Value>,
        offset: Box<Value>,
        width: u32,
        stride: u32,
    },
    Concat(Vec<Value>),
    Replicate {
        base: Box<Value>,
        count: u32,
    },
    ArrayProxy {
        elems: Vec<Value>,
        index: Box<Value>,
    },
    /// The clock of a named domain, resolved during net assembly.
    ClockSignal(String),
    /// The reset of a named domain. With `allow_reset_less` set, a domain
    /// without a reset reads as constant zero instead of erroring.
    ResetSignal {
        domain: String,
        allow_reset_less: bool,
    },
    /// Unconstrained constant chosen by a formal verification solver.
    AnyConst(Shape),
    /// Unconstrained per-cycle value chosen by a formal verification solver.
    AnyValue(Shape),
    /// One on the first simulation cycle, zero afterwards.
    Initial,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstValue {
    pub value: BigInt,
    pub shape: Shape,
}

impl Value {
    /// A constant with an explicitly declared shape; the value is truncated
    /// into it.
    pub fn constant(value: impl Into<BigInt>, shape: impl Into<Shape>) -> Value {
        let shape = shape.into();
        let value = eval::truncate(&value.into(), shape);
        Value::Const(ConstValue { value, shape })
    }

    /// A constant whose shape is inferred from the value: `5` is
    /// `unsigned(3)`, `-5` is `signed(4)`.
    pub fn int(value: i64) -> Value {
        let shape = Shape::new(bits_for(value, value < 0), value < 0);
        Value::constant(value, shape)
    }

    /// A constant shaped by the half-open range `[lo, hi)`.
    ///
    /// Using the exclusive bound itself as the value is the classic
    /// off-by-one; it warns and truncates.
    pub fn const_for_range(value: i64, lo: i64, hi: i64) -> Value {
        let shape = Shape::for_range(lo, hi);
        if value == hi {
            warn!(
                value,
                lo, hi, "constant equals the exclusive upper bound of its range"
            );
        }
        Value::constant(value, shape)
    }

    pub fn clock(domain: &str) -> Value {
        Value::ClockSignal(domain.to_string())
    }

    pub fn reset(domain: &str, allow_reset_less: bool) -> Value {
        Value::ResetSignal { domain: domain.to_string(), allow_reset_less }
    }

    pub fn any_const(shape: impl Into<Shape>) -> Value {
        Value::AnyConst(shape.into())
    }

    pub fn any_value(shape: impl Into<Shape>) -> Value {
        Value::AnyValue(shape.into())
    }

    pub fn initial() -> Value {
        Value::Initial
    }

    /// The inferred shape of this expression.
    pub fn shape(&self) -> Shape {
        match self {
            Value::Const(c) => c.shape,
            Value::Signal(s) => s.shape(),
            Value::Op { shape, .. } => *shape,
            Value::Slice { start, stop, .. } => Shape::unsigned(stop - start),
            Value::Part { width, .. } => Shape::unsigned(*width),
            Value::Concat(parts) => {
                Shape::unsigned(parts.iter().map(|p| p.shape().width()).sum())
            }
            Value::Replicate { base, count } => {
                Shape::unsigned(base.shape().width() * count)
            }
            Value::ArrayProxy { elems, .. } => {
                let mut shape = elems[0].shape();
                for e in &elems[1..] {
                    shape = Shape::cover(shape, e.shape());
                }
                shape
            }
            Value::ClockSignal(_) | Value::ResetSignal { .. } | Value::Initial => {
                Shape::unsigned(1)
            }
            Value::AnyConst(shape) | Value::AnyValue(shape) => *shape,
        }
    }

    pub fn len(&self) -> u32 {
        self.shape().width()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read a constant-castable value back as an integer. Constant folding
    /// at construction guarantees that any value built from constants via
    /// concatenation, slicing and replication is already a `Const`.
    pub fn as_const(&self) -> Option<&BigInt> {
        match self {
            Value::Const(c) => Some(&c.value),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Operator construction
    // ------------------------------------------------------------------

    fn op(op: Op, args: Vec<Value>) -> Result<Value, ShapeError> {
        let shapes: Vec<Shape> = args.iter().map(|a| a.shape()).collect();
        let shape = op_shape(op, &shapes)?;
        let consts: Option<Vec<(BigInt, Shape)>> = args
            .iter()
            .map(|a| match a {
                Value::Const(c) => Some((c.value.clone(), c.shape)),
                _ => None,
            })
            .collect();
        if let Some(consts) = consts {
            let value = eval::eval_op(op, &consts);
            return Ok(Value::constant(value, shape));
        }
        Ok(Value::Op { op, args, shape })
    }

    pub fn add(&self, other: &Value) -> Result<Value, ShapeError> {
        Value::op(Op::Add, vec![self.clone(), other.clone()])
    }

    pub fn sub(&self, other: &Value) -> Result<Value, ShapeError> {
        Value::op(Op::Sub, vec![self.clone(), other.clone()])
    }

    pub fn neg(&self) -> Result<Value, ShapeError> {
        Value::op(Op::Neg, vec![self.clone()])
    }

    pub fn mul(&self, other: &Value) -> Result<Value, ShapeError> {
        Value::op(Op::Mul, vec![self.clone(), other.clone()])
    }

    /// Floor division. Division by zero yields zero.
    pub fn div(&self, other: &Value) -> Result<Value, ShapeError> {
        Value::op(Op::Div, vec![self.clone(), other.clone()])
    }

    /// Floor modulo; the result takes the sign of the divisor.
    pub fn rem(&self, other: &Value) -> Result<Value, ShapeError> {
        Value::op(Op::Rem, vec![self.clone(), other.clone()])
    }

    pub fn eq(&self, other: &Value) -> Result<Value, ShapeError> {
        Value::op(Op::Eq, vec![self.clone(), other.clone()])
    }

    pub fn ne(&self, other: &Value) -> Result<Value, ShapeError> {
        Value::op(Op::Ne, vec![self.clone(), other.clone()])
    }

    pub fn lt(&self, other: &Value) -> Result<Value, ShapeError> {
        Value::op(Op::Lt, vec![self.clone(), other.clone()])
    }

    pub fn le(&self, other: &Value) -> Result<Value, ShapeError> {
        Value::op(Op::Le, vec![self.clone(), other.clone()])
    }

    pub fn gt(&self, other: &Value) -> Result<Value, ShapeError> {
        Value::op(Op::Gt, vec![self.clone(), other.clone()])
    }

    pub fn ge(&self, other: &Value) -> Result<Value, ShapeError> {
        Value::op(Op::Ge, vec![self.clone(), other.clone()])
    }

    pub fn and(&self, other: &Value) -> Result<Value, ShapeError> {
        Value::op(Op::And, vec![self.clone(), other.clone()])
    }

    pub fn or(&self, other: &Value) -> Result<Value, ShapeError> {
        Value::op(Op::Or, vec![self.clone(), other.clone()])
    }

    pub fn xor(&self, other: &Value) -> Result<Value, ShapeError> {
        Value::op(Op::Xor, vec![self.clone(), other.clone()])
    }

    pub fn not(&self) -> Result<Value, ShapeError> {
        Value::op(Op::Not, vec![self.clone()])
    }

    /// Variable left shift. The amount must be unsigned; the result width
    /// `w + 2**amount_width - 1` is checked against the expression ceiling.
    pub fn shl(&self, amount: &Value) -> Result<Value, ShapeError> {
        Value::op(Op::Shl, vec![self.clone(), amount.clone()])
    }

    /// Variable right shift, arithmetic for signed values.
    pub fn shr(&self, amount: &Value) -> Result<Value, ShapeError> {
        Value::op(Op::Shr, vec![self.clone(), amount.clone()])
    }

    /// One iff every bit is set.
    pub fn all(&self) -> Result<Value, ShapeError> {
        Value::op(Op::All, vec![self.clone()])
    }

    /// One iff any bit is set.
    pub fn any(&self) -> Result<Value, ShapeError> {
        Value::op(Op::Any, vec![self.clone()])
    }

    /// Parity of the set bits.
    pub fn xor_reduce(&self) -> Result<Value, ShapeError> {
        Value::op(Op::XorReduce, vec![self.clone()])
    }

    /// One iff the value is nonzero.
    pub fn bool(&self) -> Result<Value, ShapeError> {
        Value::op(Op::Bool, vec![self.clone()])
    }

    pub fn as_signed(&self) -> Result<Value, ShapeError> {
        Value::op(Op::AsSigned, vec![self.clone()])
    }

    pub fn as_unsigned(&self) -> Result<Value, ShapeError> {
        Value::op(Op::AsUnsigned, vec![self.clone()])
    }

    pub fn mux(sel: &Value, a: &Value, b: &Value) -> Result<Value, ShapeError> {
        Value::op(Op::Mux, vec![sel.clone(), a.clone(), b.clone()])
    }

    /// Absolute value: identity for unsigned values, `Mux(v >= 0, v, -v)`
    /// for signed ones.
    pub fn abs(&self) -> Result<Value, ShapeError> {
        if !self.shape().is_signed() {
            return Ok(self.clone());
        }
        let non_negative = self.ge(&Value::int(0))?;
        Value::mux(&non_negative, self, &self.neg()?)
    }

    // ------------------------------------------------------------------
    // Sequence construction
    // ------------------------------------------------------------------

    /// The bits `[start, stop)`, unsigned.
    pub fn slice(&self, start: u32, stop: u32) -> Result<Value, ShapeError> {
        let width = self.shape().width();
        if start > stop {
            return Err(ShapeError::ReversedSlice { start, stop });
        }
        if stop > width {
            return Err(ShapeError::SliceOutOfBounds { start, stop, width });
        }
        if let Value::Const(c) = self {
            let bits = eval::to_bits(&c.value, c.shape.width());
            let sliced = (bits >> start as usize)
                & eval::to_bits(&BigInt::from(-1), stop - start);
            return Ok(Value::constant(
                BigInt::from(sliced),
                Shape::unsigned(stop - start),
            ));
        }
        Ok(Value::Slice { base: Box::new(self.clone()), start, stop })
    }

    /// A single bit; negative indices count back from the most significant
    /// end.
    pub fn bit(&self, index: i64) -> Result<Value, ShapeError> {
        let width = self.shape().width();
        let resolved = if index < 0 { index + width as i64 } else { index };
        if resolved < 0 || resolved >= width as i64 {
            return Err(ShapeError::BitOutOfBounds { index, width });
        }
        self.slice(resolved as u32, resolved as u32 + 1)
    }

    /// Every bit as a separate one-bit value, least significant first.
    pub fn iter_bits(&self) -> Vec<Value> {
        (0..self.shape().width())
            .map(|i| {
                self.slice(i, i + 1)
                    .unwrap_or_else(|_| Value::constant(0, Shape::unsigned(1)))
            })
            .collect()
    }

    /// Concatenation, least significant part first; the result is unsigned.
    pub fn cat<I>(parts: I) -> Result<Value, ShapeError>
    where
        I: IntoIterator<Item = Value>,
    {
        let parts: Vec<Value> = parts.into_iter().collect();
        let width: u64 = parts.iter().map(|p| p.shape().width() as u64).sum();
        if width > MAX_WIDTH as u64 {
            return Err(ShapeError::WidthCeiling { width });
        }
        let consts: Option<Vec<&ConstValue>> = parts
            .iter()
            .map(|p| match p {
                Value::Const(c) => Some(c),
                _ => None,
            })
            .collect();
        if let Some(consts) = consts {
            let mut bits = num_bigint::BigUint::zero();
            let mut offset = 0usize;
            for c in consts {
                bits |= eval::to_bits(&c.value, c.shape.width()) << offset;
                offset += c.shape.width() as usize;
            }
            return Ok(Value::constant(BigInt::from(bits), Shape::unsigned(width as u32)));
        }
        Ok(Value::Concat(parts))
    }

    /// `count` copies of this value concatenated together, unsigned.
    pub fn replicate(&self, count: u32) -> Result<Value, ShapeError> {
        let width = self.shape().width() as u64 * count as u64;
        if width > MAX_WIDTH as u64 {
            return Err(ShapeError::WidthCeiling { width });
        }
        if let Value::Const(_) = self {
            return Value::cat(std::iter::repeat_n(self.clone(), count as usize));
        }
        Ok(Value::Replicate { base: Box::new(self.clone()), count })
    }

    /// Dynamic bit select: the `width` bits starting at bit `offset`.
    /// Reads past the end are zero.
    pub fn bit_select(&self, offset: &Value, width: u32) -> Result<Value, ShapeError> {
        self.part(offset, width, 1)
    }

    /// Dynamic word select: the `index`-th aligned `width`-bit word.
    pub fn word_select(&self, index: &Value, width: u32) -> Result<Value, ShapeError> {
        self.part(index, width, width)
    }

    fn part(&self, offset: &Value, width: u32, stride: u32) -> Result<Value, ShapeError> {
        if stride == 0 {
            return Err(ShapeError::ZeroStride);
        }
        if offset.shape().is_signed() {
            return Err(ShapeError::SignedPartOffset);
        }
        if width as u64 > MAX_WIDTH as u64 {
            return Err(ShapeError::WidthCeiling { width: width as u64 });
        }
        Ok(Value::Part {
            base: Box::new(self.clone()),
            offset: Box::new(offset.clone()),
            width,
            stride,
        })
    }

    /// An element of `elems` selected by a runtime index. The result shape
    /// covers every element; an out-of-range index reads as zero.
    pub fn array<I>(elems: I, index: &Value) -> Result<Value, ShapeError>
    where
        I: IntoIterator<Item = Value>,
    {
        let elems: Vec<Value> = elems.into_iter().collect();
        if elems.is_empty() {
            return Err(ShapeError::EmptyArray);
        }
        if index.shape().is_signed() {
            return Err(ShapeError::SignedArrayIndex);
        }
        Ok(Value::ArrayProxy { elems, index: Box::new(index.clone()) })
    }

    /// Constant left shift: widens by `amount` bits. A negative amount
    /// shifts right instead.
    pub fn shift_left(&self, amount: i64) -> Result<Value, ShapeError> {
        if amount < 0 {
            return self.shift_right(-amount);
        }
        let signed = self.shape().is_signed();
        let shifted = Value::cat([
            Value::constant(0, Shape::unsigned(amount as u32)),
            self.clone(),
        ])?;
        if signed { shifted.as_signed() } else { Ok(shifted) }
    }

    /// Constant right shift, arithmetic for signed values. A negative
    /// amount shifts left instead.
    pub fn shift_right(&self, amount: i64) -> Result<Value, ShapeError> {
        if amount < 0 {
            return self.shift_left(-amount);
        }
        let width = self.shape().width();
        let signed = self.shape().is_signed();
        let drop = (amount as u64).min(width as u64) as u32;
        let sliced = self.slice(drop, width)?;
        if signed && drop < width {
            sliced.as_signed()
        } else {
            Ok(sliced)
        }
    }

    /// Rotate towards the most significant end by `amount` bits.
    pub fn rotate_left(&self, amount: u32) -> Result<Value, ShapeError> {
        let width = self.shape().width();
        if width == 0 {
            return Ok(self.clone());
        }
        let amount = amount % width;
        Value::cat([self.slice(width - amount, width)?, self.slice(0, width - amount)?])
    }

    /// Rotate towards the least significant end by `amount` bits.
    pub fn rotate_right(&self, amount: u32) -> Result<Value, ShapeError> {
        let width = self.shape().width();
        if width == 0 {
            return Ok(self.clone());
        }
        let amount = amount % width;
        Value::cat([self.slice(amount, width)?, self.slice(0, amount)?])
    }

    /// One iff this value matches any of `patterns`; with no patterns the
    /// result is constant zero.
    pub fn matches(&self, patterns: &[Pattern]) -> Result<Value, ShapeError> {
        match_value(self, patterns)
    }

    /// Cast this value to `width` bits: truncate from the top, or extend
    /// according to the value's own signedness. The result is unsigned raw
    /// bits, suitable for splicing into assignment targets.
    pub fn resize(&self, width: u32) -> Result<Value, ShapeError> {
        let own = self.shape().width();
        if own == width {
            return if self.shape().is_signed() { self.as_unsigned() } else { Ok(self.clone()) };
        }
        if own > width {
            return self.slice(0, width);
        }
        let pad = width - own;
        if self.shape().is_signed() && own > 0 {
            let sign = self.bit(own as i64 - 1)?;
            Value::cat([self.clone(), sign.replicate(pad)?])
        } else {
            Value::cat([self.clone(), Value::constant(0, Shape::unsigned(pad))])
        }
    }
}

impl From<Signal> for Value {
    fn from(signal: Signal) -> Value {
        Value::Signal(signal)
    }
}

impl From<&Signal> for Value {
    fn from(signal: &Signal) -> Value {
        Value::Signal(signal.clone())
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Const(c) => write!(f, "{}[{}]", c.value, c.shape),
            Value::Signal(s) => write!(f, "{}", s.name()),
            Value::Op { op, args, .. } => match args.len() {
                1 => write!(f, "({} {})", op.symbol(), args[0]),
                2 => write!(f, "({} {} {})", args[0], op.symbol(), args[1]),
                _ => write!(f, "mux({}, {}, {})", args[0], args[1], args[2]),
            },
            Value::Slice { base, start, stop } => write!(f, "{}[{}:{}]", base, start, stop),
            Value::Part { base, offset, width, stride } => {
                write!(f, "{}[{}*{} +: {}]", base, offset, stride, width)
            }
            Value::Concat(parts) => {
                write!(f, "cat(")?;
                for (i, p) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ")")
            }
            Value::Replicate { base, count } => write!(f, "rep({}, {})", base, count),
            Value::ArrayProxy { elems, index } => {
                write!(f, "array[{}]({} elems)", index, elems.len())
            }
            Value::ClockSignal(domain) => write!(f, "clk({})", domain),
            Value::ResetSignal { domain, .. } => write!(f, "rst({})", domain),
            Value::AnyConst(shape) => write!(f, "anyconst[{}]", shape),
            Value::AnyValue(shape) => write!(f, "anyvalue[{}]", shape),
            Value::Initial => write!(f, "initial"),
        }
    }
}

// ============================================================================
//                                 PATTERNS
// ============================================================================

/// A case pattern: an integer compared for equality, or a bit string of
/// `0`/`1`/`-` characters matched most-significant-bit first with `-` as a
/// wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Pattern {
    Int(BigInt),
    Bits(String),
}

impl Pattern {
    pub fn int(value: impl Into<BigInt>) -> Pattern {
        Pattern::Int(value.into())
    }

    /// Parse a bit pattern; whitespace is ignored.
    pub fn bits(pattern: &str) -> Result<Pattern, ShapeError> {
        let stripped: String = pattern.chars().filter(|c| !c.is_whitespace()).collect();
        if !stripped.chars().all(|c| matches!(c, '0' | '1' | '-')) {
            return Err(ShapeError::BadPattern { pattern: pattern.to_string() });
        }
        Ok(Pattern::Bits(stripped))
    }

    pub fn width(&self) -> Option<u32> {
        match self {
            Pattern::Int(_) => None,
            Pattern::Bits(s) => Some(s.len() as u32),
        }
    }
}

/// Lower a pattern list into the OR of the individual pattern matches
/// against `test`. Shared by the `matches` operator and the netlist
/// builder's switch lowering.
pub fn match_value(test: &Value, patterns: &[Pattern]) -> Result<Value, ShapeError> {
    let one_bit = Shape::unsigned(1);
    if patterns.is_empty() {
        return Ok(Value::constant(0, one_bit));
    }
    let width = test.shape().width();
    let mut result: Option<Value> = None;
    for pattern in patterns {
        let term = match pattern {
            Pattern::Int(v) => {
                let cast = Value::constant(v.clone(), test.shape());
                if cast.as_const() != Some(v) {
                    warn!(
                        pattern = %v,
                        width, "integer pattern does not fit the switch test and was truncated"
                    );
                }
                test.eq(&cast)?
            }
            Pattern::Bits(s) => bits_term(test, s, width)?,
        };
        result = Some(match result {
            None => term,
            Some(acc) => acc.or(&term)?,
        });
    }
    Ok(result.unwrap_or_else(|| Value::constant(0, one_bit)))
}

/// One term of a bit-string match: `(test & mask) == value` over the raw
/// bits of `test`.
fn bits_term(test: &Value, pattern: &str, width: u32) -> Result<Value, ShapeError> {
    let mut chars: Vec<char> = pattern.chars().collect();
    if chars.len() as u32 != width {
        warn!(pattern, width, "pattern width does not match the switch test");
    }
    if chars.len() as u32 > width {
        let excess = chars.len() - width as usize;
        if chars[..excess].iter().any(|&c| c == '1') {
            return Ok(Value::constant(0, Shape::unsigned(1)));
        }
        chars.drain(..excess);
    }
    while (chars.len() as u32) < width {
        chars.insert(0, '0');
    }
    let mut mask = BigInt::zero();
    let mut value = BigInt::zero();
    for (i, c) in chars.iter().enumerate() {
        let bit = width as usize - 1 - i;
        match c {
            '0' => mask.set_bit(bit as u64, true),
            '1' => {
                mask.set_bit(bit as u64, true);
                value.set_bit(bit as u64, true);
            }
            _ => {}
        }
    }
    if mask.is_zero() {
        return Ok(Value::constant(1, Shape::unsigned(1)));
    }
    let raw = if test.shape().is_signed() { test.as_unsigned()? } else { test.clone() };
    let masked = raw.and(&Value::constant(mask, Shape::unsigned(width)))?;
    masked.eq(&Value::constant(value, Shape::unsigned(width)))
}

// ============================================================================
//                          ASSIGNMENT TARGET ANALYSIS
// ============================================================================

/// True iff `v` may appear on the left-hand side of an assignment: built
/// only from signals, slices, parts, concatenations, and array proxies of
/// assignable elements.
pub fn is_assignable(v: &Value) -> bool {
    match v {
        Value::Signal(_) => true,
        Value::Slice { base, .. } | Value::Part { base, .. } => is_assignable(base),
        Value::Concat(parts) => parts.iter().all(is_assignable),
        Value::ArrayProxy { elems, .. } => elems.iter().all(is_assignable),
        _ => false,
    }
}

/// The set of `(signal id, bit index)` pairs an assignable expression may
/// write. Dynamic part selects cover their full addressable span; array
/// proxies take the union over all elements.
pub fn target_bits(v: &Value) -> BTreeSet<(SignalId, u32)> {
    let mut out = BTreeSet::new();
    collect_target_bits(v, 0, v.shape().width(), &mut out);
    out
}

fn collect_target_bits(v: &Value, lo: u32, hi: u32, out: &mut BTreeSet<(SignalId, u32)>) {
    if lo >= hi {
        return;
    }
    match v {
        Value::Signal(s) => {
            for bit in lo..hi.min(s.width()) {
                out.insert((s.id(), bit));
            }
        }
        Value::Slice { base, start, .. } => {
            collect_target_bits(base, start + lo, start + hi, out);
        }
        Value::Part { base, .. } => {
            collect_target_bits(base, 0, base.shape().width(), out);
        }
        Value::Concat(parts) => {
            let mut offset = 0u32;
            for part in parts {
                let w = part.shape().width();
                let part_lo = lo.max(offset).saturating_sub(offset);
                let part_hi = hi.min(offset + w).saturating_sub(offset);
                collect_target_bits(part, part_lo, part_hi, out);
                offset += w;
            }
        }
        Value::ArrayProxy { elems, .. } => {
            for elem in elems {
                collect_target_bits(elem, lo.min(elem.shape().width()), hi.min(elem.shape().width()), out);
            }
        }
        _ => {}
    }
}

/// Every signal referenced anywhere in `v`, keyed by id.
pub fn signals_of(v: &Value, out: &mut BTreeMap<SignalId, Signal>) {
    match v {
        Value::Signal(s) => {
            out.entry(s.id()).or_insert_with(|| s.clone());
        }
        Value::Slice { base, .. } | Value::Replicate { base, .. } => signals_of(base, out),
        Value::Part { base, offset, .. } => {
            signals_of(base, out);
            signals_of(offset, out);
        }
        Value::Op { args, .. } => {
            for arg in args {
                signals_of(arg, out);
            }
        }
        Value::Concat(parts) => {
            for part in parts {
                signals_of(part, out);
            }
        }
        Value::ArrayProxy { elems, index } => {
            for elem in elems {
                signals_of(elem, out);
            }
            signals_of(index, out);
        }
        _ => {}
    }
}

/// Rebuild `v` with `f` applied at every node, top down: when `f` returns a
/// replacement the replacement is used as-is, otherwise recursion continues
/// into the children. Replacements nested inside operators must preserve
/// the width of what they replace.
pub fn rewrite<F>(v: &Value, f: &F) -> Value
where
    F: Fn(&Value) -> Option<Value>,
{
    if let Some(replacement) = f(v) {
        return replacement;
    }
    match v {
        Value::Op { op, args, shape } => Value::Op {
            op: *op,
            args: args.iter().map(|a| rewrite(a, f)).collect(),
            shape: *shape,
        },
        Value::Slice { base, start, stop } => Value::Slice {
            base: Box::new(rewrite(base, f)),
            start: *start,
            stop: *stop,
        },
        Value::Part { base, offset, width, stride } => Value::Part {
            base: Box::new(rewrite(base, f)),
            offset: Box::new(rewrite(offset, f)),
            width: *width,
            stride: *stride,
        },
        Value::Concat(parts) => {
            Value::Concat(parts.iter().map(|p| rewrite(p, f)).collect())
        }
        Value::Replicate { base, count } => Value::Replicate {
            base: Box::new(rewrite(base, f)),
            count: *count,
        },
        Value::ArrayProxy { elems, index } => Value::ArrayProxy {
            elems: elems.iter().map(|e| rewrite(e, f)).collect(),
            index: Box::new(rewrite(index, f)),
        },
        other => other.clone(),
    }
}
