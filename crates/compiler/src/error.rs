//! Compilation error types.
//!
//! `CompileError` is the umbrella the pipeline surfaces: construction
//! errors from the core IR, domain and driver conflicts found during net
//! assembly, and elaboration failures. `From` impls let every stage
//! propagate with `?`.

use weft_core::{BuildError, DomainError, ShapeError};

/// Error raised while expanding the design tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElabError {
    /// A chain of `Delegate` results never reached a module or leaf.
    DelegationTooDeep { path: String, depth: usize },
    /// An instance parameter held a value that is not an integer, string,
    /// or constant-castable value.
    BadParameter { instance: String, parameter: String },
}

impl std::fmt::Display for ElabError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElabError::DelegationTooDeep { path, depth } => {
                write!(
                    f,
                    "elaboration of {:?} delegated {} times without producing a module",
                    path, depth
                )
            }
            ElabError::BadParameter { instance, parameter } => {
                write!(f, "instance {:?} parameter {:?} is not constant", instance, parameter)
            }
        }
    }
}

impl std::error::Error for ElabError {}

/// Any failure of the compilation pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    Shape(ShapeError),
    Build(BuildError),
    Domain(DomainError),
    Elab(ElabError),
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Shape(e) => write!(f, "shape error: {}", e),
            CompileError::Build(e) => write!(f, "build error: {}", e),
            CompileError::Domain(e) => write!(f, "domain error: {}", e),
            CompileError::Elab(e) => write!(f, "elaboration error: {}", e),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<ShapeError> for CompileError {
    fn from(e: ShapeError) -> Self {
        CompileError::Shape(e)
    }
}

impl From<BuildError> for CompileError {
    fn from(e: BuildError) -> Self {
        CompileError::Build(e)
    }
}

impl From<DomainError> for CompileError {
    fn from(e: DomainError) -> Self {
        CompileError::Domain(e)
    }
}

impl From<ElabError> for CompileError {
    fn from(e: ElabError) -> Self {
        CompileError::Elab(e)
    }
}
