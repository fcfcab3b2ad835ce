//! Compiled evaluation nodes.
//!
//! A `Node` is a slot-resolved expression: every signal reference has been
//! replaced by an index into the value store, and memory reads address a
//! memory block directly. Evaluation produces the raw bit pattern of the
//! node's shape and shares its operator semantics with constant folding
//! through `weft_core::eval`.

use num_bigint::{BigInt, BigUint};
use num_traits::{ToPrimitive, Zero};
use weft_core::{Op, Shape, eval};

/// Backing storage of one memory block.
#[derive(Debug)]
pub struct MemState {
    pub rows: Vec<BigUint>,
    pub width: u32,
}

#[derive(Debug, Clone)]
pub(crate) enum Node {
    Const { bits: BigUint, shape: Shape },
    Slot { index: usize, shape: Shape },
    Op { op: Op, args: Vec<Node>, shape: Shape },
    Slice { base: Box<Node>, start: u32, stop: u32 },
    Part { base: Box<Node>, offset: Box<Node>, width: u32, stride: u32 },
    Concat(Vec<Node>),
    Replicate { base: Box<Node>, count: u32 },
    ArrayIndex { elems: Vec<Node>, index: Box<Node>, shape: Shape },
    /// The row of a memory block selected by a combinational address; rows
    /// out of range read as zero.
    MemRow { memory: usize, addr: Box<Node>, width: u32 },
}

impl Node {
    pub(crate) fn shape(&self) -> Shape {
        match self {
            Node::Const { shape, .. }
            | Node::Slot { shape, .. }
            | Node::Op { shape, .. }
            | Node::ArrayIndex { shape, .. } => *shape,
            Node::Slice { start, stop, .. } => Shape::unsigned(stop - start),
            Node::Part { width, .. } => Shape::unsigned(*width),
            Node::Concat(parts) => {
                Shape::unsigned(parts.iter().map(|p| p.shape().width()).sum())
            }
            Node::Replicate { base, count } => {
                Shape::unsigned(base.shape().width() * count)
            }
            Node::MemRow { width, .. } => Shape::unsigned(*width),
        }
    }

    /// Evaluate to the raw bit pattern of this node's shape.
    pub(crate) fn eval(&self, store: &[BigUint], memories: &[MemState]) -> BigUint {
        match self {
            Node::Const { bits, .. } => bits.clone(),
            Node::Slot { index, .. } => store[*index].clone(),
            Node::Op { op, args, shape } => {
                let interpreted: Vec<(BigInt, Shape)> = args
                    .iter()
                    .map(|a| {
                        let s = a.shape();
                        (eval::from_bits(&a.eval(store, memories), s), s)
                    })
                    .collect();
                let result = eval::eval_op(*op, &interpreted);
                eval::to_bits(&result, shape.width())
            }
            Node::Slice { base, start, stop } => {
                let bits = base.eval(store, memories);
                mask_bits(bits >> (*start as usize), stop - start)
            }
            Node::Part { base, offset, width, stride } => {
                let bits = base.eval(store, memories);
                let position = offset
                    .eval(store, memories)
                    .to_usize()
                    .unwrap_or(usize::MAX)
                    .saturating_mul(*stride as usize);
                mask_bits(bits >> position, *width)
            }
            Node::Concat(parts) => {
                let mut bits = BigUint::zero();
                let mut position = 0usize;
                for part in parts {
                    bits |= part.eval(store, memories) << position;
                    position += part.shape().width() as usize;
                }
                bits
            }
            Node::Replicate { base, count } => {
                let part = base.eval(store, memories);
                let width = base.shape().width() as usize;
                let mut bits = BigUint::zero();
                for i in 0..*count as usize {
                    bits |= &part << (i * width);
                }
                bits
            }
            Node::ArrayIndex { elems, index, shape } => {
                let i = index.eval(store, memories).to_usize().unwrap_or(usize::MAX);
                match elems.get(i) {
                    Some(elem) => {
                        // Extend the element into the covering shape.
                        let value = eval::from_bits(&elem.eval(store, memories), elem.shape());
                        eval::to_bits(&value, shape.width())
                    }
                    None => BigUint::zero(),
                }
            }
            Node::MemRow { memory, addr, width } => {
                let row = addr.eval(store, memories).to_usize().unwrap_or(usize::MAX);
                match memories[*memory].rows.get(row) {
                    Some(bits) => mask_bits(bits.clone(), *width),
                    None => BigUint::zero(),
                }
            }
        }
    }

    /// Record every store slot this node reads. Memory rows are not slots;
    /// they only change on clock edges.
    pub(crate) fn deps(&self, out: &mut Vec<usize>) {
        match self {
            Node::Const { .. } => {}
            Node::Slot { index, .. } => out.push(*index),
            Node::Op { args, .. } => {
                for arg in args {
                    arg.deps(out);
                }
            }
            Node::Slice { base, .. } | Node::Replicate { base, .. } => base.deps(out),
            Node::Part { base, offset, .. } => {
                base.deps(out);
                offset.deps(out);
            }
            Node::Concat(parts) => {
                for part in parts {
                    part.deps(out);
                }
            }
            Node::ArrayIndex { elems, index, .. } => {
                for elem in elems {
                    elem.deps(out);
                }
                index.deps(out);
            }
            Node::MemRow { addr, .. } => addr.deps(out),
        }
    }
}

fn mask_bits(bits: BigUint, width: u32) -> BigUint {
    bits & eval::to_bits(&BigInt::from(-1), width)
}
