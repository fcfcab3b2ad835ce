//! Weft Core: the in-memory IR of the Weft hardware description language.
//!
//! This crate holds everything a design is made of before elaboration:
//!
//! - `shape`: bit widths and signedness, with casting from ranges and
//!   enumerations
//! - `value`: immutable expression DAGs with shape inference and constant
//!   folding
//! - `eval`: the shared constant semantics behind folding and simulation
//! - `stmt`: assignments, switches, prints, and verification properties
//! - `domain`: clock domains
//! - `module`: the scoped statement builder (`if`/`switch`/FSM scopes)
//! - `memory`, `instance`: primitive leaves carried through the pipeline
//! - `elab`: the capability every design node implements
//!
//! The companion crates lower this IR: `weft-compiler` elaborates and
//! solves it into a netlist, `weft-sim` compiles the netlist into an
//! evaluation graph.

pub mod domain;
pub mod elab;
pub mod error;
pub mod eval;
pub mod instance;
pub mod memory;
pub mod module;
pub mod shape;
pub mod stmt;
pub mod value;

pub use domain::{COMB, ClockDomain, ClockDomainBuilder, ClockEdge};
pub use elab::{ElabResult, Elaboratable};
pub use error::{BuildError, DomainError, ShapeError};
pub use instance::{Dir, Instance, IoBufferInstance, IoPort, ParamValue};
pub use memory::{Memory, MemoryData, ReadPort, WritePort};
pub use module::{DomainStmts, Module, ModuleData};
pub use shape::{MAX_WIDTH, Shape, bits_for};
pub use stmt::{PropertyKind, Statement, SwitchCase, placeholder_count};
pub use value::{
    ConstValue, Op, Pattern, Signal, SignalBuilder, SignalId, SrcLoc, Value, is_assignable,
    match_value, rewrite, signals_of, target_bits,
};
