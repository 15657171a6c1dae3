//! Error kinds of the transformation operations.
//!
//! Each operation has its own closed set of failures. They are returned
//! together with the id the operation was asked about, see [`ExplorerError`].

use std::fmt;

use derive_more::{Display, Error};
use magnifier_ir::InlineFailure;

use crate::id::ValueId;

#[derive(Clone, Debug, PartialEq, Eq, Display, Error)]
pub enum InlineError {
    #[display("Instruction not found")]
    InstructionNotFound,
    #[display("Not a CallBase instruction")]
    NotACallBaseInstruction,
    #[display("Cannot resolve function")]
    CannotResolveFunction,
    #[display("Inlining variadic function is yet to be supported")]
    VariadicFunction,
    #[display("Resolve function type mismatch")]
    ResolveFunctionTypeMismatch,
    #[display("Inline operation failed: {_0}")]
    InlineOperationFailed(#[error(source)] InlineFailure),
}

#[derive(Clone, Debug, PartialEq, Eq, Display, Error)]
pub enum DevirtualizeError {
    #[display("Instruction not found")]
    InstructionNotFound,
    #[display("Not a CallBase instruction")]
    NotACallBaseInstruction,
    #[display("Function not found")]
    FunctionNotFound,
    #[display("Not an indirect call")]
    NotAIndirectCall,
    #[display("Argument number mismatch")]
    ArgNumMismatch,
}

#[derive(Clone, Debug, PartialEq, Eq, Display, Error)]
pub enum SubstitutionError {
    #[display("Id not found")]
    IdNotFound,
    #[display("Incorrect type")]
    IncorrectType,
    #[display("Cannot use function id")]
    CannotUseFunctionId,
}

#[derive(Clone, Debug, PartialEq, Eq, Display, Error)]
pub enum OptimizationError {
    #[display("Invalid optimization level")]
    InvalidOptimizationLevel,
    #[display("Id not found")]
    IdNotFound,
}

#[derive(Clone, Debug, PartialEq, Eq, Display, Error)]
pub enum DeletionError {
    #[display("Id not found")]
    IdNotFound,
    #[display("Function is still in use")]
    FunctionInUse,
}

#[derive(Clone, Debug, PartialEq, Eq, Display, Error)]
pub enum DecompileError {
    #[display("Id not found")]
    IdNotFound,
    #[display("Decompiler failed: {_0}")]
    DecompilerFailed(#[error(not(source))] String),
}

/// An operation failure paired with the id the operation was given.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExplorerError<E> {
    pub id: ValueId,
    pub error: E,
}

impl<E> ExplorerError<E> {
    pub fn new(id: ValueId, error: E) -> Self {
        Self { id, error }
    }
}

impl<E: fmt::Display> fmt::Display for ExplorerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (id: {})", self.error, self.id)
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ExplorerError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

pub type ExplorerResult<T, E> = Result<T, ExplorerError<E>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explorer_errors_name_the_id() {
        let err = ExplorerError::new(42, InlineError::NotACallBaseInstruction);
        assert_eq!(err.to_string(), "Not a CallBase instruction (id: 42)");

        let failure = InlineFailure::CalleeTooLarge { insts: 9, limit: 4 };
        let err = ExplorerError::new(7, InlineError::InlineOperationFailed(failure));
        assert_eq!(
            err.to_string(),
            "Inline operation failed: callee has 9 instructions, limit is 4 (id: 7)"
        );
    }
}
