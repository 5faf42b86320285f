//! Read-only traversal of a circuit.
//!
//! `Circuit::accept` calls `preorder` then `postorder` on every operator in
//! declaration order; returning `false` from `preorder` skips `postorder` for
//! that operator. Inputs are always visited before their consumers.

use super::{Circuit, Operator};
use crate::error::CompileResult;

pub trait CircuitVisitor {
    fn preorder_circuit(&mut self, _circuit: &Circuit) -> CompileResult<()> {
        Ok(())
    }

    fn postorder_circuit(&mut self, _circuit: &Circuit) -> CompileResult<()> {
        Ok(())
    }

    fn preorder(&mut self, _op: &Operator) -> CompileResult<bool> {
        Ok(true)
    }

    fn postorder(&mut self, _op: &Operator) -> CompileResult<()> {
        Ok(())
    }
}
