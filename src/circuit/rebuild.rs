//! Copy-on-write reconstruction of a circuit.
//!
//! A rebuilding pass walks the original circuit in declaration order and,
//! for each operator, either copies it (rewired to the replacements of its
//! inputs) or emits something else and records it as the replacement.
//!
//! ```text
//! original:  s ─► a ─► b ─► sink        replace(a, a')
//! rebuilt:   s ─► a' ─► b' ─► sink'     b and sink are rewired by `copy`
//! ```
//!
//! Replacements are keyed by output name, which is unique within a circuit.

use super::{Circuit, Operator, OperatorRef};
use crate::error::CompileResult;
use std::collections::HashMap;
use std::sync::Arc;

pub struct CircuitRebuilder<'a> {
    original: &'a Circuit,
    result: Circuit,
    remap: HashMap<String, OperatorRef>,
}

impl<'a> CircuitRebuilder<'a> {
    pub fn new(original: &'a Circuit) -> Self {
        let mut result = Circuit::new(original.name());
        for declaration in original.declarations() {
            result.declarations.push(declaration.clone());
        }
        CircuitRebuilder {
            original,
            result,
            remap: HashMap::new(),
        }
    }

    /// Rebuild `circuit`, handing every operator to `visit` in declaration order
    pub fn rebuild<F>(circuit: &'a Circuit, mut visit: F) -> CompileResult<Circuit>
    where
        F: FnMut(&mut CircuitRebuilder<'a>, &OperatorRef) -> CompileResult<()>,
    {
        let mut rebuilder = CircuitRebuilder::new(circuit);
        for op in circuit.all_operators() {
            visit(&mut rebuilder, op)?;
        }
        Ok(rebuilder.finish())
    }

    /// The operator now standing for `op`
    pub fn mapped(&self, op: &OperatorRef) -> OperatorRef {
        self.remap
            .get(op.output_name())
            .cloned()
            .unwrap_or_else(|| Arc::clone(op))
    }

    pub fn mapped_inputs(&self, op: &Operator) -> Vec<OperatorRef> {
        op.inputs().iter().map(|input| self.mapped(input)).collect()
    }

    /// `op` reading from the replacements of its inputs
    pub fn rewire(&self, op: &OperatorRef) -> CompileResult<OperatorRef> {
        op.with_inputs(self.mapped_inputs(op), false)
    }

    /// Add an operator to the rebuilt circuit
    pub fn emit(&mut self, op: OperatorRef) -> CompileResult<()> {
        self.result.add(op)
    }

    /// Make consumers of `old` read from `new` instead
    pub fn replace(&mut self, old: &Operator, new: OperatorRef) {
        self.remap.insert(old.output_name().to_string(), new);
    }

    /// Keep `op`, rewired to the replacements of its inputs
    pub fn copy(&mut self, op: &OperatorRef) -> CompileResult<()> {
        let rewired = self.rewire(op)?;
        self.emit(Arc::clone(&rewired))?;
        self.replace(op, rewired);
        Ok(())
    }

    /// Whether `op` has been emitted into the rebuilt circuit
    pub fn emitted(&self, op: &Operator) -> bool {
        self.result.contains(op.output_name())
    }

    /// The rebuilt circuit, or a copy of the original when nothing changed
    pub fn finish(self) -> Circuit {
        if self.result.same_operators(self.original) {
            self.original.clone()
        } else {
            self.result
        }
    }
}
