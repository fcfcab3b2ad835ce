//! Error types for the core IR.
//!
//! Each subsystem reports through its own enum so that callers can match on
//! the failure class; everything implements `std::error::Error` and converts
//! upward with `From` so `?` composes across the pipeline.

use crate::shape::MAX_WIDTH;

/// Error raised when a value construction is dimensionally meaningless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    /// Slice bounds are reversed (`start > stop`).
    ReversedSlice { start: u32, stop: u32 },
    /// Slice bounds extend past the width of the sliced value.
    SliceOutOfBounds { start: u32, stop: u32, width: u32 },
    /// Single-bit index out of range.
    BitOutOfBounds { index: i64, width: u32 },
    /// An inferred width exceeds the expression-width ceiling.
    WidthCeiling { width: u64 },
    /// The amount operand of a variable shift must be unsigned.
    SignedShiftAmount,
    /// The offset operand of a dynamic part-select must be unsigned.
    SignedPartOffset,
    /// A dynamic part-select stride must be at least one.
    ZeroStride,
    /// The index operand of an array proxy must be unsigned.
    SignedArrayIndex,
    /// An array proxy needs at least one element.
    EmptyArray,
    /// A bit pattern contained a character other than `0`, `1`, `-`.
    BadPattern { pattern: String },
}

impl std::fmt::Display for ShapeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShapeError::ReversedSlice { start, stop } => {
                write!(f, "slice start {} is greater than stop {}", start, stop)
            }
            ShapeError::SliceOutOfBounds { start, stop, width } => {
                write!(
                    f,
                    "slice [{}:{}] is out of bounds for a {}-bit value",
                    start, stop, width
                )
            }
            ShapeError::BitOutOfBounds { index, width } => {
                write!(f, "bit index {} is out of bounds for a {}-bit value", index, width)
            }
            ShapeError::WidthCeiling { width } => {
                write!(
                    f,
                    "inferred width {} exceeds the {}-bit expression ceiling",
                    width, MAX_WIDTH
                )
            }
            ShapeError::SignedShiftAmount => {
                write!(f, "shift amount must be unsigned")
            }
            ShapeError::SignedPartOffset => {
                write!(f, "part-select offset must be unsigned")
            }
            ShapeError::SignedArrayIndex => {
                write!(f, "array index must be unsigned")
            }
            ShapeError::ZeroStride => write!(f, "part-select stride must be at least 1"),
            ShapeError::EmptyArray => write!(f, "array must have at least one element"),
            ShapeError::BadPattern { pattern } => {
                write!(
                    f,
                    "pattern {:?} must consist of only '0', '1', '-' characters",
                    pattern
                )
            }
        }
    }
}

impl std::error::Error for ShapeError {}

/// Error raised when two drivers contend for the same storage.
///
/// Reported either while statements are being added to a module, or later
/// during net assembly when drivers from different fragments collide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A signal bit is assigned in two different clock domains.
    DriverConflict {
        signal: String,
        bit: u32,
        first: String,
        second: String,
    },
    /// A driver or clock/reset reference names a domain that is not in scope.
    UnknownDomain { name: String },
    /// Two clock domains with the same name are visible in one scope.
    DuplicateDomain { name: String },
    /// `ResetSignal` was requested for a domain that has no reset.
    ResetlessDomain { name: String },
    /// `ClockSignal`/`ResetSignal` cannot refer to the combinational domain.
    CombDomain,
}

impl std::fmt::Display for DomainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DomainError::DriverConflict { signal, bit, first, second } => {
                write!(
                    f,
                    "signal {:?} bit {} is driven from domain {:?} and domain {:?}",
                    signal, bit, first, second
                )
            }
            DomainError::UnknownDomain { name } => {
                write!(f, "domain {:?} is not defined in this scope or any parent", name)
            }
            DomainError::DuplicateDomain { name } => {
                write!(f, "domain {:?} is defined more than once in the same scope", name)
            }
            DomainError::ResetlessDomain { name } => {
                write!(f, "domain {:?} has no reset signal", name)
            }
            DomainError::CombDomain => {
                write!(f, "the combinational domain has no clock or reset")
            }
        }
    }
}

impl std::error::Error for DomainError {}

/// Structural error in module construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// The left-hand side of an assignment is not an assignable value.
    NotAssignable { what: String },
    /// `exit_scope` was called with no open scope.
    UnbalancedScope,
    /// `enter_elif`/`enter_else` without a preceding `enter_if` at this level.
    OrphanElif,
    OrphanElse,
    /// `enter_case`/`enter_default` outside an open switch.
    CaseOutsideSwitch,
    /// A statement was added directly inside a switch, outside any case.
    StatementInSwitch,
    /// A statement was added directly inside an FSM, outside any state.
    StatementInFsm,
    /// `enter_state`, `fsm_next` or `fsm_ongoing` outside an open FSM.
    OutsideFsm,
    /// The same state name was opened twice in one FSM.
    DuplicateState { fsm: String, state: String },
    /// A state was referenced by `fsm_next`/`fsm_ongoing` or as the initial
    /// state but never defined.
    UndefinedState { fsm: String, state: String },
    /// An FSM was closed without any states.
    EmptyFsm { fsm: String },
    /// Two submodules were added under the same name.
    DuplicateSubmodule { name: String },
    /// `comb` cannot be redeclared and domain names must be unique.
    BadDomainDeclaration { name: String },
    /// A print format string has a different number of `{}` placeholders
    /// than arguments.
    PlaceholderMismatch { format: String, args: usize },
    /// A memory port was configured inconsistently.
    BadMemoryPort { what: String },
    Shape(ShapeError),
    Domain(DomainError),
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::NotAssignable { what } => {
                write!(f, "cannot assign to {}", what)
            }
            BuildError::UnbalancedScope => write!(f, "exit_scope called with no open scope"),
            BuildError::OrphanElif => write!(f, "enter_elif must follow an if or elif arm"),
            BuildError::OrphanElse => write!(f, "enter_else must follow an if or elif arm"),
            BuildError::CaseOutsideSwitch => {
                write!(f, "enter_case/enter_default must be directly inside a switch")
            }
            BuildError::StatementInSwitch => {
                write!(f, "statements inside a switch must be placed in a case")
            }
            BuildError::StatementInFsm => {
                write!(f, "statements inside an FSM must be placed in a state")
            }
            BuildError::OutsideFsm => {
                write!(f, "state operations must be used inside an open FSM")
            }
            BuildError::DuplicateState { fsm, state } => {
                write!(f, "FSM {:?} defines state {:?} more than once", fsm, state)
            }
            BuildError::UndefinedState { fsm, state } => {
                write!(f, "FSM {:?} references undefined state {:?}", fsm, state)
            }
            BuildError::EmptyFsm { fsm } => write!(f, "FSM {:?} has no states", fsm),
            BuildError::DuplicateSubmodule { name } => {
                write!(f, "a submodule named {:?} already exists", name)
            }
            BuildError::BadDomainDeclaration { name } => {
                write!(f, "cannot declare clock domain {:?}", name)
            }
            BuildError::PlaceholderMismatch { format, args } => {
                write!(
                    f,
                    "format string {:?} does not take {} argument(s)",
                    format, args
                )
            }
            BuildError::BadMemoryPort { what } => write!(f, "invalid memory port: {}", what),
            BuildError::Shape(e) => write!(f, "{}", e),
            BuildError::Domain(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for BuildError {}

impl From<ShapeError> for BuildError {
    fn from(e: ShapeError) -> Self {
        BuildError::Shape(e)
    }
}

impl From<DomainError> for BuildError {
    fn from(e: DomainError) -> Self {
        BuildError::Domain(e)
    }
}
