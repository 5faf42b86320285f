//! Compiler Error Types
//!
//! Three kinds of failure can abort a compilation:
//!
//! - `IrConstruction`: the circuit or an expression was built with
//!   inconsistent types. Always a bug in the plan-to-circuit translation.
//! - `Unimplemented`: the plan uses a construct that has no circuit lowering.
//! - `Invariant`: rewrite bookkeeping went wrong (unbalanced scopes etc.).

use thiserror::Error;

/// Compilation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// Type or shape mismatch while building IR
    #[error("IR construction error: {0}")]
    IrConstruction(String),

    /// Plan construct with no circuit lowering
    #[error("Unimplemented: {reason} (at {node})")]
    Unimplemented { node: String, reason: String },

    /// Internal bookkeeping violation inside a pass
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
}

impl CompileError {
    pub fn construction(message: impl Into<String>) -> Self {
        CompileError::IrConstruction(message.into())
    }

    pub fn unimplemented(node: impl std::fmt::Debug, reason: impl Into<String>) -> Self {
        CompileError::Unimplemented {
            node: format!("{node:?}"),
            reason: reason.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        CompileError::Invariant(message.into())
    }

    /// True for errors caused by a miscompiled IR rather than by the input plan
    pub fn is_internal(&self) -> bool {
        !matches!(self, CompileError::Unimplemented { .. })
    }
}

/// Result type for compilation operations
pub type CompileResult<T> = Result<T, CompileError>;
